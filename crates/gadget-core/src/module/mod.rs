//! Gadget module resolution and loading.
//!
//! A gadget is resolved by file-name convention under an ordered list of
//! install locations ([`SearchPaths`]) and loaded through one of two
//! sources: factories registered in-process (builtin, the way hosts embed
//! their own gadgets and tests supply mocks) or dynamic libraries opened
//! with `libloading` ([`abi`]). Both end up as a [`LoadedModule`] wrapping a
//! [`GadgetModule`] trait object, so the manager never cares which path a
//! module arrived through.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use log::{debug, error};

use crate::error::ModuleError;
use crate::manager::GadgetManager;
use crate::request::Request;
use crate::types::{DisplayOption, GadgetEvent, GadgetId, GadgetMode, KeyEvent, Layout};

pub mod abi;

#[cfg(test)]
mod tests;

/// The operation table every gadget module implements.
///
/// Operations receive the manager so that module code can call back in
/// (create a child gadget, ask to be destroyed, send a result); the
/// reentrancy rules in the manager make that safe at any point. All
/// operations except `on_create` default to no-ops, mirroring the optional
/// slots of the raw table.
pub trait GadgetModule {
    /// Static display options, declared once at init.
    fn options(&self) -> DisplayOption {
        DisplayOption::default()
    }

    /// Produce the visual root. Returning `None` aborts this instance's
    /// creation; the rest of the tree is unaffected.
    fn on_create(
        &mut self,
        man: &mut GadgetManager,
        id: GadgetId,
        mode: GadgetMode,
        request: &Request,
    ) -> Option<Layout>;

    fn on_start(&mut self, _man: &mut GadgetManager, _id: GadgetId, _request: &Request) {}

    fn on_pause(&mut self, _man: &mut GadgetManager, _id: GadgetId, _request: &Request) {}

    fn on_resume(&mut self, _man: &mut GadgetManager, _id: GadgetId, _request: &Request) {}

    /// Destruction has been requested; a chance to begin async cleanup.
    fn on_destroying(&mut self, _man: &mut GadgetManager, _id: GadgetId, _request: &Request) {}

    fn on_destroy(&mut self, _man: &mut GadgetManager, _id: GadgetId, _request: &Request) {}

    fn on_message(
        &mut self,
        _man: &mut GadgetManager,
        _id: GadgetId,
        _msg: &Request,
        _request: &Request,
    ) {
    }

    fn on_event(
        &mut self,
        _man: &mut GadgetManager,
        _id: GadgetId,
        _event: GadgetEvent,
        _request: &Request,
    ) {
    }

    fn on_key_event(
        &mut self,
        _man: &mut GadgetManager,
        _id: GadgetId,
        _event: KeyEvent,
        _request: &Request,
    ) {
    }
}

/// A resolved module: the operation table plus load diagnostics.
pub struct LoadedModule {
    name: String,
    /// Base address of the mapped library, best effort. Diagnostic only.
    addr: Option<String>,
    ops: Box<dyn GadgetModule>,
}

impl LoadedModule {
    pub(crate) fn new(name: &str, addr: Option<String>, ops: Box<dyn GadgetModule>) -> Self {
        LoadedModule {
            name: name.to_owned(),
            addr,
            ops,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn address(&self) -> Option<&str> {
        self.addr.as_deref()
    }

    pub fn options(&self) -> DisplayOption {
        self.ops.options()
    }

    pub(crate) fn ops_mut(&mut self) -> &mut dyn GadgetModule {
        &mut *self.ops
    }
}

/// Ordered list of directories probed when resolving a gadget name.
#[derive(Debug, Clone)]
pub struct SearchPaths {
    roots: Vec<PathBuf>,
}

const SYSTEM_GADGET_DIR: &str = "/usr/ug/lib";
const LEGACY_GADGET_DIR: &str = "/opt/usr/ug/lib";

impl SearchPaths {
    /// Package-private directories (when a package identity is known),
    /// then the system read-only directory, then the legacy root.
    pub fn standard(package: Option<&str>) -> Self {
        let mut roots = Vec::new();
        if let Some(pkg) = package {
            roots.push(PathBuf::from(format!("/usr/apps/{pkg}/lib/ug")));
            roots.push(PathBuf::from(format!("/opt/apps/{pkg}/lib/ug")));
        }
        roots.push(PathBuf::from(SYSTEM_GADGET_DIR));
        roots.push(PathBuf::from(LEGACY_GADGET_DIR));
        SearchPaths { roots }
    }

    pub fn with_roots(roots: impl IntoIterator<Item = PathBuf>) -> Self {
        SearchPaths {
            roots: roots.into_iter().collect(),
        }
    }

    /// Library file name a gadget resolves to, per platform.
    pub fn file_name(name: &str) -> String {
        format!(
            "{}gadget-{}{}",
            std::env::consts::DLL_PREFIX,
            name,
            std::env::consts::DLL_SUFFIX
        )
    }

    /// Every candidate path for `name`, in probe order. Pure; touches no
    /// filesystem.
    pub fn candidates(&self, name: &str) -> Vec<PathBuf> {
        let file = Self::file_name(name);
        self.roots.iter().map(|root| root.join(&file)).collect()
    }

    /// First candidate that exists on disk.
    pub fn resolve(&self, name: &str) -> Option<PathBuf> {
        self.candidates(name).into_iter().find(|p| p.is_file())
    }
}

impl Default for SearchPaths {
    fn default() -> Self {
        Self::standard(None)
    }
}

type ModuleFactory = Box<dyn Fn() -> Box<dyn GadgetModule>>;

/// Resolves gadget names to loadable modules.
pub struct ModuleLoader {
    search: SearchPaths,
    builtin: HashMap<String, ModuleFactory>,
}

impl ModuleLoader {
    pub fn new(search: SearchPaths) -> Self {
        ModuleLoader {
            search,
            builtin: HashMap::new(),
        }
    }

    /// Loader over the standard install locations.
    pub fn standard() -> Self {
        Self::new(SearchPaths::default())
    }

    pub fn search(&self) -> &SearchPaths {
        &self.search
    }

    /// Register an in-process gadget under `name`. Builtins shadow
    /// same-named libraries on disk.
    pub fn register_builtin(
        &mut self,
        name: impl Into<String>,
        factory: impl Fn() -> Box<dyn GadgetModule> + 'static,
    ) {
        self.builtin.insert(name.into(), Box::new(factory));
    }

    /// Whether `name` would resolve, without opening anything.
    pub fn exists(&self, name: &str) -> bool {
        self.builtin.contains_key(name) || self.search.resolve(name).is_some()
    }

    pub fn load(&self, name: &str) -> Result<LoadedModule, ModuleError> {
        if let Some(factory) = self.builtin.get(name) {
            debug!("module '{name}': builtin");
            return Ok(LoadedModule::new(name, None, factory()));
        }

        let path = self.search.resolve(name).ok_or_else(|| {
            error!("module '{name}': no candidate exists");
            ModuleError::NotFound {
                name: name.to_owned(),
            }
        })?;
        let module = abi::load_dynamic(&path, name)?;
        debug!(
            "module '{name}': loaded from {} at {}",
            path.display(),
            module.address().unwrap_or("<unknown>")
        );
        Ok(module)
    }
}

/// Base address the library got mapped at, read from the process memory
/// map. Observational only; never required for correctness.
#[cfg(target_os = "linux")]
fn mapped_address(path: &Path) -> Option<String> {
    let maps = std::fs::read_to_string("/proc/self/maps").ok()?;
    let needle = path.to_str()?;
    maps.lines()
        .find(|line| line.ends_with(needle))
        .and_then(|line| line.split('-').next())
        .map(|base| format!("0x{base}"))
}

#[cfg(not(target_os = "linux"))]
fn mapped_address(_path: &Path) -> Option<String> {
    None
}
