//! The public facade: the only surface host applications (and, through the
//! manager reference handed to their operations, gadget modules) touch.
//!
//! Every method validates its arguments (emptiness, handle liveness) and
//! forwards to the [`GadgetManager`]. Failures are ordinary [`GadgetError`]
//! results; nothing here terminates the host.

use log::error;

use crate::engine;
use crate::error::{GadgetError, Result};
use crate::instance::GadgetCallbacks;
use crate::manager::GadgetManager;
use crate::module::ModuleLoader;
use crate::request::{Request, ResultCode};
use crate::types::{
    DisplayOption, GadgetEvent, GadgetId, GadgetMode, GadgetState, KeyEvent, Layout, Window,
};

/// Entry point of the library: one initialized gadget context per host
/// window.
pub struct UiGadget {
    man: GadgetManager,
}

impl UiGadget {
    /// Initialize with the host window and the application's base indicator
    /// option. Modules resolve through the standard install locations and
    /// the display engine is probed at its well-known path (its absence
    /// just disables transitions).
    pub fn init(window: Window, base_opt: DisplayOption) -> Self {
        let mut man = GadgetManager::new(window, base_opt, ModuleLoader::standard());
        if let Some(eng) = engine::load_default() {
            man.set_engine(eng);
        }
        UiGadget { man }
    }

    /// Initialize with an explicit loader; nothing is probed implicitly.
    pub fn init_with(window: Window, base_opt: DisplayOption, loader: ModuleLoader) -> Self {
        UiGadget {
            man: GadgetManager::new(window, base_opt, loader),
        }
    }

    /// Load and attach a gadget. `parent` of `None` targets the root; the
    /// returned handle stays valid until destruction completes.
    pub fn create(
        &mut self,
        parent: Option<GadgetId>,
        name: &str,
        mode: GadgetMode,
        request: &Request,
        cbs: GadgetCallbacks,
    ) -> Result<GadgetId> {
        if name.is_empty() {
            error!("create failed: empty gadget name");
            return Err(GadgetError::InvalidArgument("empty gadget name".into()));
        }
        self.man.load(parent, name, mode, request, cbs)
    }

    pub fn pause(&mut self) -> Result<()> {
        self.man.pause()
    }

    pub fn resume(&mut self) -> Result<()> {
        self.man.resume()
    }

    pub fn pause_gadget(&mut self, id: GadgetId) -> Result<()> {
        self.man.pause_gadget(id)
    }

    pub fn resume_gadget(&mut self, id: GadgetId) -> Result<()> {
        self.man.resume_gadget(id)
    }

    pub fn destroy(&mut self, id: GadgetId) -> Result<()> {
        self.man.destroy(id)
    }

    pub fn destroy_all(&mut self) -> Result<()> {
        self.man.destroy_all()
    }

    pub fn layout(&self, id: GadgetId) -> Result<Option<&Layout>> {
        self.man.layout(id)
    }

    pub fn parent_layout(&self, id: GadgetId) -> Result<Option<&Layout>> {
        self.man.parent_layout(id)
    }

    pub fn mode(&self, id: GadgetId) -> Result<GadgetMode> {
        self.man.mode(id)
    }

    pub fn state(&self, id: GadgetId) -> GadgetState {
        self.man.state(id)
    }

    pub fn send_event(&mut self, event: GadgetEvent) -> Result<()> {
        self.man.send_event(event)
    }

    pub fn send_key_event(&mut self, event: KeyEvent) -> Result<()> {
        self.man.send_key_event(event)
    }

    pub fn send_message(&mut self, id: GadgetId, msg: &Request) -> Result<()> {
        self.man.send_message(id, msg)
    }

    pub fn send_result(&mut self, id: GadgetId, reply: Option<&Request>) -> Result<()> {
        self.man.send_result(id, reply)
    }

    pub fn send_result_full(
        &mut self,
        id: GadgetId,
        reply: Option<&Request>,
        code: ResultCode,
    ) -> Result<()> {
        self.man.send_result_full(id, reply, code)
    }

    pub fn disable_effect(&mut self, id: GadgetId) -> Result<()> {
        self.man.disable_effect(id)
    }

    /// Whether a gadget binary (or builtin registration) resolves for
    /// `name`, without loading it.
    pub fn is_installed(&self, name: &str) -> bool {
        self.man.module_exists(name)
    }

    pub fn window(&self) -> Window {
        self.man.window()
    }

    pub fn conformant(&mut self) -> Option<Window> {
        self.man.conformant()
    }

    /// Drain deferred work (destroy finalization, pause/resume walks,
    /// event broadcasts). Call from the event loop's idle phase.
    pub fn dispatch_pending(&mut self) -> usize {
        self.man.run_pending()
    }

    /// The underlying manager, for hosts that install engines, indicator
    /// panels or builtin modules after init.
    pub fn manager(&self) -> &GadgetManager {
        &self.man
    }

    pub fn manager_mut(&mut self) -> &mut GadgetManager {
        &mut self.man
    }
}
