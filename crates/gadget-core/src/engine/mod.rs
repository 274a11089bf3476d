//! The display-engine adapter: the narrow interface through which the
//! manager asks an (optional) toolkit plugin to animate show/hide
//! transitions around a gadget's visual root.
//!
//! The engine is resolved once, from a single well-known library path, with
//! the same dynamic-loading mechanism as gadget modules; its absence
//! degrades gracefully to the no-animation path. Completion is signalled
//! back through [`GadgetManager::notify_show_finished`] and
//! [`GadgetManager::notify_hide_finished`], never by reentering
//! finalization on the engine's stack frame.
//!
//! [`GadgetManager::notify_show_finished`]: crate::manager::GadgetManager::notify_show_finished
//! [`GadgetManager::notify_hide_finished`]: crate::manager::GadgetManager::notify_hide_finished

use std::path::Path;

use log::debug;

use crate::error::ModuleError;
use crate::manager::GadgetManager;
use crate::types::{GadgetId, Layout, Window};

pub mod abi;

/// Well-known install path of the display-engine library.
pub const ENGINE_LIBRARY_PATH: &str = "/usr/lib/libgadget-display-engine.so";

/// How a requested hide transition will complete.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// A transition is (or has already been) signalled through
    /// `notify_hide_finished`; the manager must not finalize on its own.
    Animated,
    /// No transition; the manager schedules finalization itself.
    Immediate,
}

/// Auxiliary queries the manager forwards to the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineRequest {
    /// The host conformant container.
    Conformant,
}

/// Operations the manager invokes on the engine.
pub trait DisplayEngine {
    /// Wrap `id`'s visual root in a transition container and return it.
    /// The engine owns the `layout_state` sub-machine from here on and
    /// signals `notify_show_finished` when the show transition ends.
    fn create(&mut self, man: &mut GadgetManager, id: GadgetId) -> Option<Layout>;

    /// Begin tearing down `id`'s visuals. Only the actual top of the
    /// fullview stack gets an animated transition; `fv_top` is `None` when
    /// a frameview instance is being destroyed.
    fn destroy(&mut self, man: &mut GadgetManager, id: GadgetId, fv_top: Option<GadgetId>)
        -> Transition;

    fn request(
        &mut self,
        man: &mut GadgetManager,
        id: Option<GadgetId>,
        req: EngineRequest,
    ) -> Option<Window>;
}

/// Host-chrome indicator (status bar) control.
pub trait IndicatorPanel {
    fn is_enabled(&self) -> bool;
    fn set_enabled(&mut self, enabled: bool);
}

/// Engine from the well-known path, or `None` when it is not installed.
pub fn load_default() -> Option<Box<dyn DisplayEngine>> {
    let path = Path::new(ENGINE_LIBRARY_PATH);
    if !path.is_file() {
        debug!("no display engine at {ENGINE_LIBRARY_PATH}, transitions disabled");
        return None;
    }
    match load_from(path) {
        Ok(engine) => Some(engine),
        Err(e) => {
            log::warn!("display engine load failed, transitions disabled: {e}");
            None
        }
    }
}

/// Engine from an explicit path.
pub fn load_from(path: &Path) -> Result<Box<dyn DisplayEngine>, ModuleError> {
    abi::load_dynamic_engine(path)
}
