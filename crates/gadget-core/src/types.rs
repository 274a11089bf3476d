//! Core value types shared across the crate: instance handles, the
//! lifecycle and layout state machines, display modes and options, and the
//! opaque handles exchanged with the host toolkit.

use std::any::Any;
use std::fmt;
use std::rc::Rc;

/// Stable handle of one gadget instance inside a [`GadgetManager`] arena.
///
/// Ids are never reused within one manager; a stale id simply stops
/// resolving once the instance has been freed.
///
/// [`GadgetManager`]: crate::manager::GadgetManager
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct GadgetId(pub(crate) u64);

impl GadgetId {
    /// Raw numeric value, used on the module ABI.
    pub fn raw(self) -> u64 {
        self.0
    }

    pub(crate) fn from_raw(raw: u64) -> Self {
        GadgetId(raw)
    }
}

impl fmt::Display for GadgetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Lifecycle state of a gadget instance.
///
/// `Invalid` is never stored; it is the diagnostic answer for ids that do
/// not resolve to any instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GadgetState {
    Ready,
    Created,
    Running,
    Stopped,
    Destroying,
    PendingDestroy,
    Destroyed,
    Invalid,
}

/// Display mode, fixed at creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GadgetMode {
    /// Occupies the top-level visual stack and gets transition animation.
    Fullview,
    /// Embedded inline in the parent's layout; never stacked or animated.
    Frameview,
}

/// Animation sub-state of an instance's visual root, driven by the display
/// engine. Independent of [`GadgetState`]; `Destroyed` may only be reached
/// after this machine has signalled hide completion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LayoutState {
    Init,
    Show,
    ShowEffect,
    Hide,
    HideEffect,
    Destroy,
    NoEffect,
}

/// System events broadcast to the whole gadget tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GadgetEvent {
    LowMemory,
    LowBattery,
    LangChange,
    RotatePortrait,
    RotatePortraitUpsidedown,
    RotateLandscape,
    RotateLandscapeUpsidedown,
    RegionChange,
}

impl GadgetEvent {
    /// `Some(is_landscape)` for rotation events, `None` otherwise.
    pub fn rotation(self) -> Option<bool> {
        match self {
            GadgetEvent::RotatePortrait | GadgetEvent::RotatePortraitUpsidedown => Some(false),
            GadgetEvent::RotateLandscape | GadgetEvent::RotateLandscapeUpsidedown => Some(true),
            _ => None,
        }
    }
}

/// Key events, delivered only to the fullview top instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyEvent {
    End,
}

/// Indicator (status bar) visibility policy of one gadget.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum IndicatorPolicy {
    #[default]
    Enable,
    PortraitOnly,
    LandscapeOnly,
    Disable,
    /// The gadget manages the indicator itself; the manager never touches it.
    Manual,
}

/// Static display options a module declares once at init.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DisplayOption {
    pub indicator: IndicatorPolicy,
    /// Let the gadget's content overlap the indicator area.
    pub overlap: bool,
}

/// Owned, opaque handle to a visual root produced by a module's create
/// callback. The manager never looks inside; hosts and engines downcast it
/// back to whatever their toolkit uses.
pub struct Layout(Box<dyn Any>);

impl Layout {
    pub fn new<T: 'static>(content: T) -> Self {
        Layout(Box::new(content))
    }

    pub fn downcast_ref<T: 'static>(&self) -> Option<&T> {
        self.0.downcast_ref()
    }

    pub fn downcast_mut<T: 'static>(&mut self) -> Option<&mut T> {
        self.0.downcast_mut()
    }
}

impl fmt::Debug for Layout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Layout(..)")
    }
}

/// Clonable opaque handle to the host window (and to the conformant
/// container returned by the display engine).
#[derive(Clone)]
pub struct Window(Rc<dyn Any>);

impl Window {
    pub fn new<T: 'static>(content: T) -> Self {
        Window(Rc::new(content))
    }

    pub fn downcast_ref<T: 'static>(&self) -> Option<&T> {
        self.0.downcast_ref()
    }
}

impl fmt::Debug for Window {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Window(..)")
    }
}
