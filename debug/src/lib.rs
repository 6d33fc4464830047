//! Shared plumbing for the driver check programs.

use icdprobe_core::{HarnessConfig, HarnessError, RunReport, Scenario};

pub fn init_logging() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
}

/// Configuration from the environment; a bad value ends the process with the configuration code.
pub fn config_or_exit() -> HarnessConfig {
    HarnessConfig::from_env().unwrap_or_else(|err| exit_with(err))
}

pub fn exit_with(err: HarnessError) -> ! {
    log::error!("{}", err);
    eprintln!("error: {}", err);
    std::process::exit(err.exit_code())
}

/// Run one scenario against the configured driver and print its outcome. Exits non-zero on any
/// fatal error.
pub fn run_scenario(scenario: &mut dyn Scenario) -> RunReport {
    init_logging();
    let config = config_or_exit();
    log::info!("driver: {}", config.driver_path.display());
    match icdprobe_core::run(&config, scenario) {
        Ok(report) => {
            println!(
                "{} on {}: {} word(s) checked, {} mismatch(es), {} handle(s) released",
                report.scenario,
                report.device_name,
                report.checked(),
                report.total_mismatches(),
                report.teardown.released.len()
            );
            report
        }
        Err(err) => exit_with(err),
    }
}
