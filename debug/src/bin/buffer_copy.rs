//! Fill a device-local buffer, copy it to a host-visible one, and compare.

use icdprobe_core::scenario::BufferCopy;

fn main() {
    debug::run_scenario(&mut BufferCopy::default());
}
