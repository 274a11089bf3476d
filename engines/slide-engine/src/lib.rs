//! A display engine that simulates slide transitions.
//!
//! The real thing would hand the gadget's visual root to the toolkit's
//! animator; this one walks the layout sub-machine (`Init` →
//! `ShowEffect` → `Show` → `HideEffect` → `Hide`) and signals completion
//! straight back to the manager, which turns the signal into deferred
//! work on its idle queue. Only the actual top of the fullview stack is
//! animated; everything else tears down immediately. Install as
//! `libgadget-display-engine.so` on the well-known engine path.

use std::collections::HashMap;
use std::ffi::c_void;
use std::os::raw::c_int;
use std::ptr;

use log::{debug, info};

use gadget_core::engine::abi::{RawEngineOps, TRANSITION_ANIMATED, TRANSITION_IMMEDIATE};
use gadget_core::module::abi::{id_from_raw, manager_mut};
use gadget_core::types::LayoutState;

/// Effect container tracking per engine load, keyed by raw gadget id.
struct SlideState {
    effects: HashMap<u64, *mut c_void>,
}

unsafe fn state<'a>(priv_data: *mut c_void) -> Option<&'a mut SlideState> {
    unsafe { (priv_data as *mut SlideState).as_mut() }
}

unsafe extern "C" fn on_create(man: *mut c_void, id: u64, priv_data: *mut c_void) -> *mut c_void {
    let Some(state) = (unsafe { state(priv_data) }) else {
        return ptr::null_mut();
    };
    let Some(man) = (unsafe { manager_mut(man) }) else {
        return ptr::null_mut();
    };
    let gadget = id_from_raw(id);

    // respect a disable_effect() request
    if man.layout_state(gadget) == Some(LayoutState::NoEffect) {
        debug!("slide-engine: {gadget} shown without effect");
        man.notify_show_finished(gadget);
    } else {
        man.set_layout_state(gadget, LayoutState::ShowEffect);
        info!("slide-engine: sliding {gadget} in");
        man.set_layout_state(gadget, LayoutState::Show);
        man.notify_show_finished(gadget);
    }

    let effect = Box::into_raw(Box::new(format!("slide-effect-{id}"))) as *mut c_void;
    state.effects.insert(id, effect);
    effect
}

unsafe extern "C" fn on_destroy(
    man: *mut c_void,
    id: u64,
    fv_top: u64,
    priv_data: *mut c_void,
) -> u32 {
    let gadget = id_from_raw(id);
    if let Some(state) = unsafe { state(priv_data) } {
        if let Some(effect) = state.effects.remove(&id) {
            drop(unsafe { Box::from_raw(effect as *mut String) });
        }
    }
    let Some(man) = (unsafe { manager_mut(man) }) else {
        return TRANSITION_IMMEDIATE;
    };

    // only the visible top gets a farewell animation
    if fv_top == id && man.layout_state(gadget) != Some(LayoutState::NoEffect) {
        man.set_layout_state(gadget, LayoutState::HideEffect);
        info!("slide-engine: sliding {gadget} out");
        man.set_layout_state(gadget, LayoutState::Hide);
        man.notify_hide_finished(gadget);
        TRANSITION_ANIMATED
    } else {
        debug!("slide-engine: tearing {gadget} down without effect");
        TRANSITION_IMMEDIATE
    }
}

unsafe extern "C" fn on_request(
    _man: *mut c_void,
    _id: u64,
    _req: u32,
    _priv_data: *mut c_void,
) -> *mut c_void {
    // no real toolkit behind this engine, so no conformant to offer
    ptr::null_mut()
}

/// Entry symbol the engine loader resolves.
///
/// # Safety
/// `ops` must point to a zeroed [`RawEngineOps`] owned by the loader.
#[no_mangle]
pub unsafe extern "C" fn gadget_engine_init(ops: *mut RawEngineOps) -> c_int {
    let Some(ops) = (unsafe { ops.as_mut() }) else {
        return -1;
    };
    ops.create = Some(on_create);
    ops.destroy = Some(on_destroy);
    ops.request = Some(on_request);
    ops.priv_data = Box::into_raw(Box::new(SlideState {
        effects: HashMap::new(),
    })) as *mut c_void;
    0
}

/// Exit symbol, invoked best-effort before the library is closed.
///
/// # Safety
/// `ops` must be the table previously filled by [`gadget_engine_init`].
#[no_mangle]
pub unsafe extern "C" fn gadget_engine_exit(ops: *mut RawEngineOps) {
    let Some(ops) = (unsafe { ops.as_mut() }) else {
        return;
    };
    if !ops.priv_data.is_null() {
        let state = unsafe { Box::from_raw(ops.priv_data as *mut SlideState) };
        for effect in state.effects.into_values() {
            drop(unsafe { Box::from_raw(effect as *mut String) });
        }
        ops.priv_data = ptr::null_mut();
    }
}
