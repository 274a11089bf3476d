//! The "hello" gadget: the smallest complete module exporting the raw
//! operation table.
//!
//! Its visual root is a plain `String`; the End key asks the caller to
//! close it. Build it as a cdylib and install it under the gadget search
//! path as `libgadget-hello.so` (the loader resolves by that file-name
//! convention, not by the cargo artifact name).

use std::ffi::c_void;
use std::os::raw::c_int;
use std::ptr;

use log::info;

use gadget_core::module::abi::{
    self, event_from_raw, id_from_raw, key_event_from_raw, option_to_raw, RawModuleOps,
};
use gadget_core::types::{DisplayOption, KeyEvent};

/// Per-load module state, owned through `priv_data`.
struct HelloState {
    layout: *mut c_void,
}

unsafe fn state<'a>(priv_data: *mut c_void) -> Option<&'a mut HelloState> {
    unsafe { (priv_data as *mut HelloState).as_mut() }
}

unsafe extern "C" fn on_create(
    _man: *mut c_void,
    id: u64,
    _mode: u32,
    request: *const c_void,
    priv_data: *mut c_void,
) -> *mut c_void {
    let Some(state) = (unsafe { state(priv_data) }) else {
        return ptr::null_mut();
    };
    let greeting = unsafe { abi::request_ref(request) }
        .and_then(|r| r.get("greeting").map(str::to_owned))
        .unwrap_or_else(|| "hello gadget".to_owned());
    info!("hello-gadget {}: create ({greeting})", id_from_raw(id));

    let layout = Box::into_raw(Box::new(greeting)) as *mut c_void;
    state.layout = layout;
    layout
}

unsafe extern "C" fn on_start(_man: *mut c_void, id: u64, _request: *const c_void, _priv: *mut c_void) {
    info!("hello-gadget {}: start", id_from_raw(id));
}

unsafe extern "C" fn on_pause(_man: *mut c_void, id: u64, _request: *const c_void, _priv: *mut c_void) {
    info!("hello-gadget {}: pause", id_from_raw(id));
}

unsafe extern "C" fn on_resume(_man: *mut c_void, id: u64, _request: *const c_void, _priv: *mut c_void) {
    info!("hello-gadget {}: resume", id_from_raw(id));
}

unsafe extern "C" fn on_destroying(
    _man: *mut c_void,
    id: u64,
    _request: *const c_void,
    _priv: *mut c_void,
) {
    info!("hello-gadget {}: destroying", id_from_raw(id));
}

unsafe extern "C" fn on_destroy(
    _man: *mut c_void,
    id: u64,
    _request: *const c_void,
    priv_data: *mut c_void,
) {
    info!("hello-gadget {}: destroy", id_from_raw(id));
    if let Some(state) = unsafe { state(priv_data) } {
        if !state.layout.is_null() {
            drop(unsafe { Box::from_raw(state.layout as *mut String) });
            state.layout = ptr::null_mut();
        }
    }
}

unsafe extern "C" fn on_message(
    _man: *mut c_void,
    id: u64,
    msg: *const c_void,
    _request: *const c_void,
    _priv: *mut c_void,
) {
    let text = unsafe { abi::request_ref(msg) }
        .and_then(|m| m.get("text").map(str::to_owned))
        .unwrap_or_default();
    info!("hello-gadget {}: message '{text}'", id_from_raw(id));
}

unsafe extern "C" fn on_event(
    _man: *mut c_void,
    id: u64,
    event: u32,
    _request: *const c_void,
    _priv: *mut c_void,
) {
    info!(
        "hello-gadget {}: event {:?}",
        id_from_raw(id),
        event_from_raw(event)
    );
}

unsafe extern "C" fn on_key_event(
    man: *mut c_void,
    id: u64,
    event: u32,
    _request: *const c_void,
    _priv: *mut c_void,
) {
    if key_event_from_raw(event) != Some(KeyEvent::End) {
        return;
    }
    // End means "close me": ask the caller to destroy this instance
    if let Some(man) = unsafe { abi::manager_mut(man) } {
        let _ = man.destroy_me(id_from_raw(id));
    }
}

/// Entry symbol the module loader resolves.
///
/// # Safety
/// `ops` must point to a zeroed [`RawModuleOps`] owned by the loader.
#[no_mangle]
pub unsafe extern "C" fn gadget_module_init(ops: *mut RawModuleOps) -> c_int {
    let Some(ops) = (unsafe { ops.as_mut() }) else {
        return -1;
    };
    ops.create = Some(on_create);
    ops.start = Some(on_start);
    ops.pause = Some(on_pause);
    ops.resume = Some(on_resume);
    ops.destroy = Some(on_destroy);
    ops.destroying = Some(on_destroying);
    ops.message = Some(on_message);
    ops.event = Some(on_event);
    ops.key_event = Some(on_key_event);
    ops.priv_data = Box::into_raw(Box::new(HelloState {
        layout: ptr::null_mut(),
    })) as *mut c_void;
    ops.opt = option_to_raw(DisplayOption::default());
    0
}

/// Exit symbol, invoked best-effort before the library is closed.
///
/// # Safety
/// `ops` must be the table previously filled by [`gadget_module_init`].
#[no_mangle]
pub unsafe extern "C" fn gadget_module_exit(ops: *mut RawModuleOps) {
    let Some(ops) = (unsafe { ops.as_mut() }) else {
        return;
    };
    if !ops.priv_data.is_null() {
        drop(unsafe { Box::from_raw(ops.priv_data as *mut HelloState) });
        ops.priv_data = ptr::null_mut();
    }
}
