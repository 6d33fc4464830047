//! Fill a host-visible buffer with a pattern and check every word.

use icdprobe_core::scenario::BufferFill;

fn main() {
    debug::run_scenario(&mut BufferFill::default());
}
