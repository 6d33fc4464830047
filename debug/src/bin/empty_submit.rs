//! Submit one empty command buffer and wait for its fence.

use icdprobe_core::scenario::EmptySubmit;

fn main() {
    debug::run_scenario(&mut EmptySubmit);
}
