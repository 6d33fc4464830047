//! Open the driver, print its root entry point and `vkCreateInstance`, close it.

fn main() {
    debug::init_logging();
    let config = debug::config_or_exit();
    match icdprobe_core::probe::probe(&config) {
        Ok(report) => {
            println!(
                "{} = {:#x}",
                report.root_symbol.to_string_lossy(),
                report.root_address
            );
            if let Some(address) = report.create_instance_address() {
                println!("vkCreateInstance = {:#x}", address);
            }
        }
        Err(err) => debug::exit_with(err),
    }
}
