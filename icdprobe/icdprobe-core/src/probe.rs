//! Smallest possible check of a driver: open it, resolve the root entry point, ask it for
//! `vkCreateInstance`, close it.

use crate::config::HarnessConfig;
use crate::dispatch::{self, DispatchScope, ProcTable, GLOBAL_COMMANDS};
use crate::error::HarnessError;
use crate::loader::Driver;
use std::ffi::CStr;
use std::path::PathBuf;

#[derive(Debug, Clone)]
pub struct EntryPointReport {
    pub library: Option<PathBuf>,
    pub root_symbol: &'static CStr,
    pub root_address: usize,
    pub global_table: ProcTable,
}

impl EntryPointReport {
    pub fn create_instance_address(&self) -> Option<usize> {
        self.global_table.get(c"vkCreateInstance").map(|f| f as usize)
    }
}

pub fn probe(config: &HarnessConfig) -> Result<EntryPointReport, HarnessError> {
    let driver = Driver::load(&config.driver_path, config.instance_mode.root_symbol())?;
    probe_driver(driver)
}

/// Resolve the global table from `driver`, then close it. A null `vkCreateInstance` fails.
pub fn probe_driver(driver: Driver) -> Result<EntryPointReport, HarnessError> {
    let root = driver.root();
    let table = ProcTable::resolve(DispatchScope::Global, GLOBAL_COMMANDS, |name| unsafe {
        dispatch::resolve_global(root, name)
    });
    let report = EntryPointReport {
        library: driver.library_path().map(PathBuf::from),
        root_symbol: driver.root_symbol(),
        root_address: root as usize,
        global_table: table,
    };
    log::info!(
        "{} = {:#x}",
        report.root_symbol.to_string_lossy(),
        report.root_address
    );
    match report.create_instance_address() {
        Some(address) => log::info!("vkCreateInstance = {:#x}", address),
        None => log::error!("vkCreateInstance = NULL"),
    }
    let checked = report.global_table.check_required();
    driver.close()?;
    checked.map(|()| report)
}
