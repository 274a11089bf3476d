//! The C ABI between the manager and dynamically loaded gadget modules.
//!
//! A gadget library exports [`MODULE_INIT_SYMBOL`], which receives a zeroed
//! [`RawModuleOps`] and fills in its operation slots; a nonzero return
//! aborts the load and the library is closed before the error surfaces.
//! [`DynGadgetModule`] wraps the filled table behind the safe
//! [`GadgetModule`] trait, catching panics at every crossing, and invokes
//! the optional [`MODULE_EXIT_SYMBOL`] when dropped.

use std::ffi::c_void;
use std::os::raw::c_int;
use std::panic::{self, AssertUnwindSafe};
use std::path::Path;

use libloading::{Library, Symbol};
use log::{error, warn};

use super::{mapped_address, GadgetModule, LoadedModule};
use crate::error::ModuleError;
use crate::manager::GadgetManager;
use crate::request::Request;
use crate::types::{
    DisplayOption, GadgetEvent, GadgetId, GadgetMode, IndicatorPolicy, KeyEvent, Layout,
};

pub const MODULE_INIT_SYMBOL: &str = "gadget_module_init";
pub const MODULE_EXIT_SYMBOL: &str = "gadget_module_exit";

pub type CreateFn = unsafe extern "C" fn(
    man: *mut c_void,
    id: u64,
    mode: u32,
    request: *const c_void,
    priv_data: *mut c_void,
) -> *mut c_void;

pub type LifecycleFn =
    unsafe extern "C" fn(man: *mut c_void, id: u64, request: *const c_void, priv_data: *mut c_void);

pub type MessageFn = unsafe extern "C" fn(
    man: *mut c_void,
    id: u64,
    msg: *const c_void,
    request: *const c_void,
    priv_data: *mut c_void,
);

pub type EventFn = unsafe extern "C" fn(
    man: *mut c_void,
    id: u64,
    event: u32,
    request: *const c_void,
    priv_data: *mut c_void,
);

/// Operation table a module fills in at init. Unset slots are skipped.
#[repr(C)]
pub struct RawModuleOps {
    pub create: Option<CreateFn>,
    pub start: Option<LifecycleFn>,
    pub pause: Option<LifecycleFn>,
    pub resume: Option<LifecycleFn>,
    pub destroy: Option<LifecycleFn>,
    pub message: Option<MessageFn>,
    pub event: Option<EventFn>,
    pub key_event: Option<EventFn>,
    pub destroying: Option<LifecycleFn>,
    pub reserved: [*mut c_void; 3],
    /// Module-private pointer handed back on every call.
    pub priv_data: *mut c_void,
    /// Raw display options, see [`option_from_raw`].
    pub opt: u32,
}

impl Default for RawModuleOps {
    fn default() -> Self {
        RawModuleOps {
            create: None,
            start: None,
            pause: None,
            resume: None,
            destroy: None,
            message: None,
            event: None,
            key_event: None,
            destroying: None,
            reserved: [std::ptr::null_mut(); 3],
            priv_data: std::ptr::null_mut(),
            opt: 0,
        }
    }
}

pub type ModuleInitFn = unsafe extern "C" fn(ops: *mut RawModuleOps) -> c_int;
pub type ModuleExitFn = unsafe extern "C" fn(ops: *mut RawModuleOps);

/// Visual-root pointer returned by an ABI module's create slot, carried
/// opaquely inside a [`Layout`].
#[derive(Debug, Clone, Copy)]
pub struct RawLayout(pub *mut c_void);

// --- raw encodings -------------------------------------------------------

pub fn mode_to_raw(mode: GadgetMode) -> u32 {
    match mode {
        GadgetMode::Fullview => 0,
        GadgetMode::Frameview => 1,
    }
}

pub fn mode_from_raw(raw: u32) -> Option<GadgetMode> {
    match raw {
        0 => Some(GadgetMode::Fullview),
        1 => Some(GadgetMode::Frameview),
        _ => None,
    }
}

pub fn event_to_raw(event: GadgetEvent) -> u32 {
    match event {
        GadgetEvent::LowMemory => 1,
        GadgetEvent::LowBattery => 2,
        GadgetEvent::LangChange => 3,
        GadgetEvent::RotatePortrait => 4,
        GadgetEvent::RotatePortraitUpsidedown => 5,
        GadgetEvent::RotateLandscape => 6,
        GadgetEvent::RotateLandscapeUpsidedown => 7,
        GadgetEvent::RegionChange => 8,
    }
}

pub fn event_from_raw(raw: u32) -> Option<GadgetEvent> {
    match raw {
        1 => Some(GadgetEvent::LowMemory),
        2 => Some(GadgetEvent::LowBattery),
        3 => Some(GadgetEvent::LangChange),
        4 => Some(GadgetEvent::RotatePortrait),
        5 => Some(GadgetEvent::RotatePortraitUpsidedown),
        6 => Some(GadgetEvent::RotateLandscape),
        7 => Some(GadgetEvent::RotateLandscapeUpsidedown),
        8 => Some(GadgetEvent::RegionChange),
        _ => None,
    }
}

pub fn key_event_to_raw(event: KeyEvent) -> u32 {
    match event {
        KeyEvent::End => 1,
    }
}

pub fn key_event_from_raw(raw: u32) -> Option<KeyEvent> {
    match raw {
        1 => Some(KeyEvent::End),
        _ => None,
    }
}

const OPT_INDICATOR_MASK: u32 = 0x07;
const OPT_OVERLAP: u32 = 0x08;

pub fn option_to_raw(opt: DisplayOption) -> u32 {
    let indicator = match opt.indicator {
        IndicatorPolicy::Enable => 0,
        IndicatorPolicy::PortraitOnly => 1,
        IndicatorPolicy::LandscapeOnly => 2,
        IndicatorPolicy::Disable => 3,
        IndicatorPolicy::Manual => 4,
    };
    indicator | if opt.overlap { OPT_OVERLAP } else { 0 }
}

/// Unknown indicator bits fall back to the enable policy.
pub fn option_from_raw(raw: u32) -> DisplayOption {
    let indicator = match raw & OPT_INDICATOR_MASK {
        0 => IndicatorPolicy::Enable,
        1 => IndicatorPolicy::PortraitOnly,
        2 => IndicatorPolicy::LandscapeOnly,
        3 => IndicatorPolicy::Disable,
        4 => IndicatorPolicy::Manual,
        _ => IndicatorPolicy::Enable,
    };
    DisplayOption {
        indicator,
        overlap: raw & OPT_OVERLAP != 0,
    }
}

// --- plugin-side helpers -------------------------------------------------

/// Rebuild the typed instance handle from its raw ABI value.
pub fn id_from_raw(raw: u64) -> GadgetId {
    GadgetId::from_raw(raw)
}

/// Recover the manager reference passed through the ABI.
///
/// # Safety
/// `man` must be the pointer the manager handed to this operation, used
/// only for the duration of the call, and plugin and host must be built
/// against the same `gadget-core`.
pub unsafe fn manager_mut<'a>(man: *mut c_void) -> Option<&'a mut GadgetManager> {
    unsafe { (man as *mut GadgetManager).as_mut() }
}

/// Recover a request reference passed through the ABI.
///
/// # Safety
/// Same contract as [`manager_mut`].
pub unsafe fn request_ref<'a>(request: *const c_void) -> Option<&'a Request> {
    unsafe { (request as *const Request).as_ref() }
}

// --- dynamic module wrapper ----------------------------------------------

/// A gadget loaded from a shared library. Keeps the library mapped for the
/// lifetime of the wrapper; unloading happens exactly once, on drop.
struct DynGadgetModule {
    ops: RawModuleOps,
    library: Option<Library>,
}

pub(crate) fn load_dynamic(path: &Path, name: &str) -> Result<LoadedModule, ModuleError> {
    let library = unsafe { Library::new(path) }.map_err(|e| ModuleError::LoadFailure {
        path: path.to_path_buf(),
        source: e,
    })?;

    let mut ops = RawModuleOps::default();
    {
        let init: Symbol<ModuleInitFn> =
            unsafe { library.get(b"gadget_module_init\0") }.map_err(|e| {
                ModuleError::SymbolMissing {
                    path: path.to_path_buf(),
                    symbol: MODULE_INIT_SYMBOL,
                    source: e,
                }
            })?;
        // The library (and with it the table we just filled) is dropped
        // before any init failure is reported.
        match panic::catch_unwind(AssertUnwindSafe(|| unsafe { init(&mut ops) })) {
            Ok(0) => {}
            Ok(code) => {
                return Err(ModuleError::InitFailure {
                    name: name.to_owned(),
                    code,
                });
            }
            Err(_) => {
                error!("module '{name}': init panicked");
                return Err(ModuleError::InitFailure {
                    name: name.to_owned(),
                    code: -1,
                });
            }
        }
    }

    let addr = mapped_address(path);
    Ok(LoadedModule::new(
        name,
        addr,
        Box::new(DynGadgetModule {
            ops,
            library: Some(library),
        }),
    ))
}

impl DynGadgetModule {
    fn guarded<R>(&self, what: &str, f: impl FnOnce() -> R) -> Option<R> {
        match panic::catch_unwind(AssertUnwindSafe(f)) {
            Ok(out) => Some(out),
            Err(_) => {
                error!("gadget module panicked in '{what}'");
                None
            }
        }
    }
}

impl GadgetModule for DynGadgetModule {
    fn options(&self) -> DisplayOption {
        option_from_raw(self.ops.opt)
    }

    fn on_create(
        &mut self,
        man: &mut GadgetManager,
        id: GadgetId,
        mode: GadgetMode,
        request: &Request,
    ) -> Option<Layout> {
        let create = self.ops.create?;
        let man_ptr = man as *mut GadgetManager as *mut c_void;
        let req_ptr = request as *const Request as *const c_void;
        let priv_data = self.ops.priv_data;
        let ptr = self.guarded("create", || unsafe {
            create(man_ptr, id.raw(), mode_to_raw(mode), req_ptr, priv_data)
        })?;
        if ptr.is_null() {
            None
        } else {
            Some(Layout::new(RawLayout(ptr)))
        }
    }

    fn on_start(&mut self, man: &mut GadgetManager, id: GadgetId, request: &Request) {
        self.lifecycle("start", self.ops.start, man, id, request);
    }

    fn on_pause(&mut self, man: &mut GadgetManager, id: GadgetId, request: &Request) {
        self.lifecycle("pause", self.ops.pause, man, id, request);
    }

    fn on_resume(&mut self, man: &mut GadgetManager, id: GadgetId, request: &Request) {
        self.lifecycle("resume", self.ops.resume, man, id, request);
    }

    fn on_destroying(&mut self, man: &mut GadgetManager, id: GadgetId, request: &Request) {
        self.lifecycle("destroying", self.ops.destroying, man, id, request);
    }

    fn on_destroy(&mut self, man: &mut GadgetManager, id: GadgetId, request: &Request) {
        self.lifecycle("destroy", self.ops.destroy, man, id, request);
    }

    fn on_message(&mut self, man: &mut GadgetManager, id: GadgetId, msg: &Request, request: &Request) {
        let Some(message) = self.ops.message else {
            return;
        };
        let man_ptr = man as *mut GadgetManager as *mut c_void;
        let msg_ptr = msg as *const Request as *const c_void;
        let req_ptr = request as *const Request as *const c_void;
        let priv_data = self.ops.priv_data;
        let _ = self.guarded("message", || unsafe {
            message(man_ptr, id.raw(), msg_ptr, req_ptr, priv_data)
        });
    }

    fn on_event(&mut self, man: &mut GadgetManager, id: GadgetId, event: GadgetEvent, request: &Request) {
        let Some(slot) = self.ops.event else {
            return;
        };
        let man_ptr = man as *mut GadgetManager as *mut c_void;
        let req_ptr = request as *const Request as *const c_void;
        let priv_data = self.ops.priv_data;
        let _ = self.guarded("event", || unsafe {
            slot(man_ptr, id.raw(), event_to_raw(event), req_ptr, priv_data)
        });
    }

    fn on_key_event(&mut self, man: &mut GadgetManager, id: GadgetId, event: KeyEvent, request: &Request) {
        let Some(slot) = self.ops.key_event else {
            return;
        };
        let man_ptr = man as *mut GadgetManager as *mut c_void;
        let req_ptr = request as *const Request as *const c_void;
        let priv_data = self.ops.priv_data;
        let _ = self.guarded("key_event", || unsafe {
            slot(man_ptr, id.raw(), key_event_to_raw(event), req_ptr, priv_data)
        });
    }
}

impl DynGadgetModule {
    fn lifecycle(
        &self,
        what: &str,
        slot: Option<LifecycleFn>,
        man: &mut GadgetManager,
        id: GadgetId,
        request: &Request,
    ) {
        let Some(f) = slot else {
            return;
        };
        let man_ptr = man as *mut GadgetManager as *mut c_void;
        let req_ptr = request as *const Request as *const c_void;
        let priv_data = self.ops.priv_data;
        let _ = self.guarded(what, || unsafe { f(man_ptr, id.raw(), req_ptr, priv_data) });
    }
}

impl Drop for DynGadgetModule {
    fn drop(&mut self) {
        let Some(library) = self.library.take() else {
            return;
        };
        {
            let exit: Result<Symbol<ModuleExitFn>, _> =
                unsafe { library.get(b"gadget_module_exit\0") };
            match exit {
                Ok(exit) => {
                    let ops = &mut self.ops as *mut RawModuleOps;
                    if panic::catch_unwind(AssertUnwindSafe(|| unsafe { exit(ops) })).is_err() {
                        error!("gadget module panicked in exit");
                    }
                }
                Err(e) => warn!("module exit symbol not found: {e}"),
            }
        }
        drop(library);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_raw_codes_are_rejected() {
        assert_eq!(mode_from_raw(2), None);
        assert_eq!(event_from_raw(0), None);
        assert_eq!(event_from_raw(9), None);
        assert_eq!(key_event_from_raw(0), None);
    }

    #[test]
    fn option_encoding_carries_overlap_and_policy() {
        let opt = DisplayOption {
            indicator: IndicatorPolicy::LandscapeOnly,
            overlap: true,
        };
        let raw = option_to_raw(opt);
        assert_eq!(raw, 0x02 | 0x08);
        assert_eq!(option_from_raw(raw), opt);
        // unknown indicator bits degrade to the default policy
        assert_eq!(option_from_raw(0x07).indicator, IndicatorPolicy::Enable);
    }
}
