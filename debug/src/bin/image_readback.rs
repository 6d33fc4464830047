//! Map a linear 256x256 RGBA8 image after a submission and save it as PNG.
//!
//! Pass `--clear` to clear the image to opaque green first and check every texel.

use icdprobe_core::scenario::ImageReadback;

fn main() {
    debug::init_logging();
    let config = debug::config_or_exit();
    let mut scenario = ImageReadback::new(&config.output_dir);
    if std::env::args().skip(1).any(|arg| arg == "--clear") {
        scenario = scenario.with_clear([0.0, 1.0, 0.0, 1.0]);
    }
    match icdprobe_core::run(&config, &mut scenario) {
        Ok(report) => println!(
            "{} on {}: wrote {}, {} texel mismatch(es)",
            report.scenario,
            report.device_name,
            scenario.output_path().display(),
            report.total_mismatches()
        ),
        Err(err) => debug::exit_with(err),
    }
}
