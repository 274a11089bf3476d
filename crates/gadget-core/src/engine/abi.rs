//! The C ABI between the manager and a dynamically loaded display engine.
//!
//! Same shape as the module ABI: the library exports
//! [`ENGINE_INIT_SYMBOL`] filling a [`RawEngineOps`] table, the wrapper
//! forwards the safe trait calls through it, and the optional
//! [`ENGINE_EXIT_SYMBOL`] runs on drop.

use std::ffi::c_void;
use std::os::raw::c_int;
use std::panic::{self, AssertUnwindSafe};
use std::path::Path;

use libloading::{Library, Symbol};
use log::{error, warn};

use super::{DisplayEngine, EngineRequest, Transition};
use crate::error::ModuleError;
use crate::manager::GadgetManager;
use crate::module::abi::RawLayout;
use crate::types::{GadgetId, Layout, Window};

pub const ENGINE_INIT_SYMBOL: &str = "gadget_engine_init";
pub const ENGINE_EXIT_SYMBOL: &str = "gadget_engine_exit";

/// Raw transition codes returned by the destroy slot.
pub const TRANSITION_IMMEDIATE: u32 = 0;
pub const TRANSITION_ANIMATED: u32 = 1;

/// Raw request codes.
pub const REQUEST_CONFORMANT: u32 = 0;

pub type EngineCreateFn =
    unsafe extern "C" fn(man: *mut c_void, id: u64, priv_data: *mut c_void) -> *mut c_void;

/// `fv_top` is the raw id of the fullview top, `0` when absent.
pub type EngineDestroyFn =
    unsafe extern "C" fn(man: *mut c_void, id: u64, fv_top: u64, priv_data: *mut c_void) -> u32;

pub type EngineRequestFn =
    unsafe extern "C" fn(man: *mut c_void, id: u64, req: u32, priv_data: *mut c_void) -> *mut c_void;

#[repr(C)]
pub struct RawEngineOps {
    pub create: Option<EngineCreateFn>,
    pub destroy: Option<EngineDestroyFn>,
    pub request: Option<EngineRequestFn>,
    pub reserved: [*mut c_void; 3],
    pub priv_data: *mut c_void,
}

impl Default for RawEngineOps {
    fn default() -> Self {
        RawEngineOps {
            create: None,
            destroy: None,
            request: None,
            reserved: [std::ptr::null_mut(); 3],
            priv_data: std::ptr::null_mut(),
        }
    }
}

pub type EngineInitFn = unsafe extern "C" fn(ops: *mut RawEngineOps) -> c_int;
pub type EngineExitFn = unsafe extern "C" fn(ops: *mut RawEngineOps);

pub fn request_to_raw(req: EngineRequest) -> u32 {
    match req {
        EngineRequest::Conformant => REQUEST_CONFORMANT,
    }
}

pub fn request_from_raw(raw: u32) -> Option<EngineRequest> {
    match raw {
        REQUEST_CONFORMANT => Some(EngineRequest::Conformant),
        _ => None,
    }
}

struct DynDisplayEngine {
    ops: RawEngineOps,
    library: Option<Library>,
}

pub(crate) fn load_dynamic_engine(path: &Path) -> Result<Box<dyn DisplayEngine>, ModuleError> {
    let library = unsafe { Library::new(path) }.map_err(|e| ModuleError::LoadFailure {
        path: path.to_path_buf(),
        source: e,
    })?;

    let mut ops = RawEngineOps::default();
    {
        let init: Symbol<EngineInitFn> =
            unsafe { library.get(b"gadget_engine_init\0") }.map_err(|e| {
                ModuleError::SymbolMissing {
                    path: path.to_path_buf(),
                    symbol: ENGINE_INIT_SYMBOL,
                    source: e,
                }
            })?;
        match panic::catch_unwind(AssertUnwindSafe(|| unsafe { init(&mut ops) })) {
            Ok(0) => {}
            Ok(code) => {
                return Err(ModuleError::InitFailure {
                    name: path.display().to_string(),
                    code,
                });
            }
            Err(_) => {
                error!("display engine init panicked");
                return Err(ModuleError::InitFailure {
                    name: path.display().to_string(),
                    code: -1,
                });
            }
        }
    }

    Ok(Box::new(DynDisplayEngine {
        ops,
        library: Some(library),
    }))
}

impl DynDisplayEngine {
    fn guarded<R>(&self, what: &str, f: impl FnOnce() -> R) -> Option<R> {
        match panic::catch_unwind(AssertUnwindSafe(f)) {
            Ok(out) => Some(out),
            Err(_) => {
                error!("display engine panicked in '{what}'");
                None
            }
        }
    }
}

impl DisplayEngine for DynDisplayEngine {
    fn create(&mut self, man: &mut GadgetManager, id: GadgetId) -> Option<Layout> {
        let create = self.ops.create?;
        let man_ptr = man as *mut GadgetManager as *mut c_void;
        let priv_data = self.ops.priv_data;
        let ptr = self.guarded("create", || unsafe { create(man_ptr, id.raw(), priv_data) })?;
        if ptr.is_null() {
            None
        } else {
            Some(Layout::new(RawLayout(ptr)))
        }
    }

    fn destroy(
        &mut self,
        man: &mut GadgetManager,
        id: GadgetId,
        fv_top: Option<GadgetId>,
    ) -> Transition {
        let Some(destroy) = self.ops.destroy else {
            return Transition::Immediate;
        };
        let man_ptr = man as *mut GadgetManager as *mut c_void;
        let top_raw = fv_top.map_or(0, GadgetId::raw);
        let priv_data = self.ops.priv_data;
        match self.guarded("destroy", || unsafe {
            destroy(man_ptr, id.raw(), top_raw, priv_data)
        }) {
            Some(TRANSITION_ANIMATED) => Transition::Animated,
            // a panicking engine must not leave the instance undead
            _ => Transition::Immediate,
        }
    }

    fn request(
        &mut self,
        man: &mut GadgetManager,
        id: Option<GadgetId>,
        req: EngineRequest,
    ) -> Option<Window> {
        let slot = self.ops.request?;
        let man_ptr = man as *mut GadgetManager as *mut c_void;
        let id_raw = id.map_or(0, GadgetId::raw);
        let priv_data = self.ops.priv_data;
        let ptr = self.guarded("request", || unsafe {
            slot(man_ptr, id_raw, request_to_raw(req), priv_data)
        })?;
        if ptr.is_null() {
            None
        } else {
            Some(Window::new(RawLayout(ptr)))
        }
    }
}

impl Drop for DynDisplayEngine {
    fn drop(&mut self) {
        let Some(library) = self.library.take() else {
            return;
        };
        {
            let exit: Result<Symbol<EngineExitFn>, _> =
                unsafe { library.get(b"gadget_engine_exit\0") };
            match exit {
                Ok(exit) => {
                    let ops = &mut self.ops as *mut RawEngineOps;
                    if panic::catch_unwind(AssertUnwindSafe(|| unsafe { exit(ops) })).is_err() {
                        error!("display engine panicked in exit");
                    }
                }
                Err(e) => warn!("engine exit symbol not found: {e}"),
            }
        }
        drop(library);
    }
}
