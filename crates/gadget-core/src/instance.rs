//! The per-gadget instance record and the caller callback set.

use std::collections::VecDeque;

use crate::manager::GadgetManager;
use crate::module::LoadedModule;
use crate::request::Request;
use crate::types::{DisplayOption, GadgetId, GadgetMode, GadgetState, Layout, LayoutState};

pub type LayoutCb = Box<dyn FnMut(&mut GadgetManager, GadgetId, GadgetMode)>;
pub type ResultCb = Box<dyn FnMut(&mut GadgetManager, GadgetId, Option<&Request>)>;
pub type DestroyCb = Box<dyn FnMut(&mut GadgetManager, GadgetId)>;
pub type EndCb = Box<dyn FnMut(&mut GadgetManager, GadgetId)>;

/// Callbacks the creating caller registers for one instance.
///
/// `layout` fires once the visual root exists, `result` on
/// `send_result[_full]`, `destroy` when the gadget asks its caller to
/// destroy it, and `end` when destruction has fully finished.
#[derive(Default)]
pub struct GadgetCallbacks {
    pub layout: Option<LayoutCb>,
    pub result: Option<ResultCb>,
    pub destroy: Option<DestroyCb>,
    pub end: Option<EndCb>,
}

impl GadgetCallbacks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_layout(mut self, f: impl FnMut(&mut GadgetManager, GadgetId, GadgetMode) + 'static) -> Self {
        self.layout = Some(Box::new(f));
        self
    }

    pub fn on_result(
        mut self,
        f: impl FnMut(&mut GadgetManager, GadgetId, Option<&Request>) + 'static,
    ) -> Self {
        self.result = Some(Box::new(f));
        self
    }

    pub fn on_destroy(mut self, f: impl FnMut(&mut GadgetManager, GadgetId) + 'static) -> Self {
        self.destroy = Some(Box::new(f));
        self
    }

    pub fn on_end(mut self, f: impl FnMut(&mut GadgetManager, GadgetId) + 'static) -> Self {
        self.end = Some(Box::new(f));
        self
    }
}

/// One loaded gadget: identity, lifecycle state, tree links, the owning
/// module handle and the retained request payload.
///
/// The record lives in the manager's arena and is only ever addressed by
/// [`GadgetId`]; `module` and the callbacks are temporarily moved out while
/// plugin code runs so that it can reenter the manager.
pub(crate) struct GadgetInstance {
    pub(crate) name: String,
    pub(crate) state: GadgetState,
    pub(crate) mode: GadgetMode,
    pub(crate) opt: DisplayOption,

    pub(crate) parent: Option<GadgetId>,
    /// Most-recent-first: later lookups care about the newest child.
    pub(crate) children: VecDeque<GadgetId>,

    pub(crate) module: Option<LoadedModule>,
    pub(crate) cbs: GadgetCallbacks,
    pub(crate) request: Request,

    pub(crate) layout: Option<Layout>,
    pub(crate) effect_layout: Option<Layout>,
    pub(crate) layout_state: LayoutState,

    pub(crate) destroy_me: bool,
    /// A hide transition is in flight; finalization must wait for it.
    pub(crate) effect_pending: bool,
}

impl GadgetInstance {
    pub(crate) fn new(
        name: &str,
        mode: GadgetMode,
        opt: DisplayOption,
        module: LoadedModule,
        request: Request,
        cbs: GadgetCallbacks,
    ) -> Self {
        GadgetInstance {
            name: name.to_owned(),
            state: GadgetState::Ready,
            mode,
            opt,
            parent: None,
            children: VecDeque::new(),
            module: Some(module),
            cbs,
            request,
            layout: None,
            effect_layout: None,
            layout_state: LayoutState::Init,
            destroy_me: false,
            effect_pending: false,
        }
    }

    /// The synthetic root standing in for the host application: already
    /// running, no module, the host window as its layout.
    pub(crate) fn root(opt: DisplayOption, layout: Option<Layout>) -> Self {
        GadgetInstance {
            name: "<root>".to_owned(),
            state: GadgetState::Running,
            mode: GadgetMode::Fullview,
            opt,
            parent: None,
            children: VecDeque::new(),
            module: None,
            cbs: GadgetCallbacks::default(),
            request: Request::new(),
            layout,
            effect_layout: None,
            layout_state: LayoutState::Init,
            destroy_me: false,
            effect_pending: false,
        }
    }
}
