//! Copy two device-local sources side by side into one host-visible buffer and check each half.

use icdprobe_core::scenario::MultiCopy;

fn main() {
    debug::run_scenario(&mut MultiCopy::default());
}
