//! Shared fixtures for the manager tests: a recording mock module, a
//! recording indicator panel, and a step-driven display engine whose
//! transitions complete only when the test says so.

use std::cell::RefCell;
use std::rc::Rc;

use crate::engine::{DisplayEngine, EngineRequest, IndicatorPanel, Transition};
use crate::instance::GadgetCallbacks;
use crate::manager::GadgetManager;
use crate::module::{GadgetModule, ModuleLoader, SearchPaths};
use crate::request::Request;
use crate::types::{
    DisplayOption, GadgetEvent, GadgetId, GadgetMode, KeyEvent, Layout, LayoutState, Window,
};

mod destroy_tests;
mod stack_tests;

/// Shared log of module callback invocations, `"name:op"` per entry.
#[derive(Clone, Default)]
pub(super) struct CallLog(Rc<RefCell<Vec<String>>>);

impl CallLog {
    pub fn push(&self, entry: impl Into<String>) {
        self.0.borrow_mut().push(entry.into());
    }

    pub fn entries(&self) -> Vec<String> {
        self.0.borrow().clone()
    }

    pub fn count(&self, entry: &str) -> usize {
        self.0.borrow().iter().filter(|e| *e == entry).count()
    }

    /// Index of the first occurrence, panicking when absent.
    pub fn position(&self, entry: &str) -> usize {
        self.entries()
            .iter()
            .position(|e| e == entry)
            .unwrap_or_else(|| panic!("'{entry}' not in {:?}", self.entries()))
    }

    pub fn clear(&self) {
        self.0.borrow_mut().clear();
    }
}

type EventHook = Rc<dyn Fn(&mut GadgetManager, GadgetId, GadgetEvent)>;
type KeyHook = Rc<dyn Fn(&mut GadgetManager, GadgetId, KeyEvent)>;

pub(super) struct MockModule {
    pub name: &'static str,
    pub log: CallLog,
    pub opt: DisplayOption,
    pub fail_create: bool,
    pub event_hook: Option<EventHook>,
    pub key_hook: Option<KeyHook>,
}

impl MockModule {
    pub fn basic(name: &'static str, log: CallLog) -> Self {
        MockModule {
            name,
            log,
            opt: DisplayOption::default(),
            fail_create: false,
            event_hook: None,
            key_hook: None,
        }
    }
}

impl GadgetModule for MockModule {
    fn options(&self) -> DisplayOption {
        self.opt
    }

    fn on_create(
        &mut self,
        _man: &mut GadgetManager,
        _id: GadgetId,
        _mode: GadgetMode,
        _request: &Request,
    ) -> Option<Layout> {
        self.log.push(format!("{}:create", self.name));
        if self.fail_create {
            None
        } else {
            Some(Layout::new(format!("{}-layout", self.name)))
        }
    }

    fn on_start(&mut self, _man: &mut GadgetManager, _id: GadgetId, _request: &Request) {
        self.log.push(format!("{}:start", self.name));
    }

    fn on_pause(&mut self, _man: &mut GadgetManager, _id: GadgetId, _request: &Request) {
        self.log.push(format!("{}:pause", self.name));
    }

    fn on_resume(&mut self, _man: &mut GadgetManager, _id: GadgetId, _request: &Request) {
        self.log.push(format!("{}:resume", self.name));
    }

    fn on_destroying(&mut self, _man: &mut GadgetManager, _id: GadgetId, _request: &Request) {
        self.log.push(format!("{}:destroying", self.name));
    }

    fn on_destroy(&mut self, _man: &mut GadgetManager, _id: GadgetId, _request: &Request) {
        self.log.push(format!("{}:destroy", self.name));
    }

    fn on_message(
        &mut self,
        _man: &mut GadgetManager,
        _id: GadgetId,
        msg: &Request,
        request: &Request,
    ) {
        self.log.push(format!(
            "{}:message:{}:{}",
            self.name,
            msg.get("text").unwrap_or("-"),
            request.get("text").unwrap_or("-"),
        ));
    }

    fn on_event(
        &mut self,
        man: &mut GadgetManager,
        id: GadgetId,
        event: GadgetEvent,
        _request: &Request,
    ) {
        self.log.push(format!("{}:event:{event:?}", self.name));
        if let Some(hook) = self.event_hook.clone() {
            (*hook)(man, id, event);
        }
    }

    fn on_key_event(
        &mut self,
        man: &mut GadgetManager,
        id: GadgetId,
        event: KeyEvent,
        _request: &Request,
    ) {
        self.log.push(format!("{}:key:{event:?}", self.name));
        if let Some(hook) = self.key_hook.clone() {
            (*hook)(man, id, event);
        }
    }
}

/// Indicator panel that records every state it is put in.
#[derive(Clone, Default)]
pub(super) struct PanelState {
    pub current: Rc<RefCell<bool>>,
    pub history: Rc<RefCell<Vec<bool>>>,
}

pub(super) struct RecordingPanel(pub PanelState);

impl IndicatorPanel for RecordingPanel {
    fn is_enabled(&self) -> bool {
        *self.0.current.borrow()
    }

    fn set_enabled(&mut self, enabled: bool) {
        *self.0.current.borrow_mut() = enabled;
        self.0.history.borrow_mut().push(enabled);
    }
}

/// Engine whose transitions only complete when the test calls
/// `notify_show_finished` / `notify_hide_finished` itself.
#[derive(Clone, Default)]
pub(super) struct EngineState {
    pub shows: Rc<RefCell<Vec<GadgetId>>>,
    pub hides: Rc<RefCell<Vec<GadgetId>>>,
}

pub(super) struct StepEngine {
    pub state: EngineState,
    /// Animate every hide, not only the stack top.
    pub animate_all: bool,
}

impl DisplayEngine for StepEngine {
    fn create(&mut self, man: &mut GadgetManager, id: GadgetId) -> Option<Layout> {
        man.set_layout_state(id, LayoutState::ShowEffect);
        self.state.shows.borrow_mut().push(id);
        Some(Layout::new("effect"))
    }

    fn destroy(
        &mut self,
        man: &mut GadgetManager,
        id: GadgetId,
        fv_top: Option<GadgetId>,
    ) -> Transition {
        if self.animate_all || fv_top == Some(id) {
            man.set_layout_state(id, LayoutState::HideEffect);
            self.state.hides.borrow_mut().push(id);
            Transition::Animated
        } else {
            Transition::Immediate
        }
    }

    fn request(
        &mut self,
        _man: &mut GadgetManager,
        _id: Option<GadgetId>,
        req: EngineRequest,
    ) -> Option<Window> {
        match req {
            EngineRequest::Conformant => Some(Window::new("conformant")),
        }
    }
}

/// Manager with the given gadget names registered as recording builtins.
pub(super) fn manager_with(names: &[&'static str], log: &CallLog) -> GadgetManager {
    let mut loader = ModuleLoader::new(SearchPaths::with_roots(Vec::new()));
    for &name in names {
        let log = log.clone();
        loader.register_builtin(name, move || Box::new(MockModule::basic(name, log.clone())));
    }
    GadgetManager::new(Window::new("test-window"), DisplayOption::default(), loader)
}

pub(super) fn cbs() -> GadgetCallbacks {
    GadgetCallbacks::new()
}

pub(super) fn fv_stack(man: &GadgetManager) -> Vec<GadgetId> {
    man.fv_list.iter().copied().collect()
}

pub(super) fn instance_count(man: &GadgetManager) -> usize {
    man.instances.len()
}
