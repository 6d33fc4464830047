//! Dynamic driver loader: maps the ICD shared object and hands out its root entry point.

use crate::error::HarnessError;
use ash::vk;
use std::ffi::{c_void, CStr};
use std::path::{Path, PathBuf};

/// A mapped driver library. Every pointer resolved from it dies with it.
pub struct DriverLibrary {
    library: libloading::Library,
    path: PathBuf,
}

impl DriverLibrary {
    /// Map the shared object with immediate binding.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, HarnessError> {
        let path = path.as_ref().to_path_buf();
        log::info!("opening {}", path.display());
        let library = unsafe { open(&path) }.map_err(|source| HarnessError::DriverLoad {
            path: path.clone(),
            source,
        })?;
        Ok(Self { library, path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Resolve a `vkGetInstanceProcAddr`-shaped root symbol.
    pub fn resolve_root(&self, symbol: &CStr) -> Result<vk::PFN_vkGetInstanceProcAddr, HarnessError> {
        let missing = || HarnessError::SymbolMissing {
            scope: crate::dispatch::DispatchScope::Library,
            name: symbol.to_string_lossy().into_owned(),
        };
        let address = unsafe {
            let sym: libloading::Symbol<*const c_void> = self
                .library
                .get(symbol.to_bytes_with_nul())
                .map_err(|_| missing())?;
            *sym
        };
        if address.is_null() {
            return Err(missing());
        }
        log::info!("{} = {:p}", symbol.to_string_lossy(), address);
        Ok(unsafe { std::mem::transmute::<*const c_void, vk::PFN_vkGetInstanceProcAddr>(address) })
    }

    pub fn close(self) -> Result<(), HarnessError> {
        log::info!("closing {}", self.path.display());
        self.library.close().map_err(HarnessError::DriverClose)
    }
}

impl std::fmt::Debug for DriverLibrary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DriverLibrary")
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}

#[cfg(unix)]
unsafe fn open(path: &Path) -> Result<libloading::Library, libloading::Error> {
    use libloading::os::unix::{Library, RTLD_LOCAL, RTLD_NOW};
    Library::open(Some(path), RTLD_NOW | RTLD_LOCAL).map(Into::into)
}

#[cfg(not(unix))]
unsafe fn open(path: &Path) -> Result<libloading::Library, libloading::Error> {
    libloading::Library::new(path)
}

/// The driver under test: its root entry point plus the library keeping it alive.
pub struct Driver {
    library: Option<DriverLibrary>,
    root: vk::PFN_vkGetInstanceProcAddr,
    root_symbol: &'static CStr,
}

impl Driver {
    /// Load `path` and resolve `root_symbol` from it.
    pub fn load(path: impl AsRef<Path>, root_symbol: &'static CStr) -> Result<Self, HarnessError> {
        let library = DriverLibrary::load(path)?;
        let root = library.resolve_root(root_symbol)?;
        Ok(Self {
            library: Some(library),
            root,
            root_symbol,
        })
    }

    /// Wrap an entry point that is already linked into the process.
    ///
    /// # Safety
    /// `root` must behave as `vkGetInstanceProcAddr` for as long as the driver is used.
    pub unsafe fn from_entry_point(root: vk::PFN_vkGetInstanceProcAddr, root_symbol: &'static CStr) -> Self {
        Self {
            library: None,
            root,
            root_symbol,
        }
    }

    pub fn root(&self) -> vk::PFN_vkGetInstanceProcAddr {
        self.root
    }

    pub fn root_symbol(&self) -> &'static CStr {
        self.root_symbol
    }

    pub fn library_path(&self) -> Option<&Path> {
        self.library.as_ref().map(DriverLibrary::path)
    }

    /// Keep the library mapped for the rest of the process.
    pub fn leak(self) {
        if let Some(library) = self.library {
            log::warn!("leaving {} mapped", library.path.display());
            std::mem::forget(library);
        }
    }

    /// Unmap the library, if any. Nothing resolved from it may be used afterwards.
    pub fn close(self) -> Result<(), HarnessError> {
        match self.library {
            Some(library) => library.close(),
            None => Ok(()),
        }
    }
}

impl std::fmt::Debug for Driver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Driver")
            .field("library", &self.library)
            .field("root_symbol", &self.root_symbol)
            .finish()
    }
}
