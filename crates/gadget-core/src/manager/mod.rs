//! The gadget manager: the in-process registry of loaded instances, the
//! parent/child ownership tree, the fullview stack, and every lifecycle
//! algorithm (create, start, pause, resume, event broadcast, message
//! delivery, destruction) with its reentrancy bookkeeping.
//!
//! ## Deferred work
//!
//! Destruction finalization, pause/resume propagation and event broadcast
//! never run inside the caller's stack frame; they are enqueued as [`Job`]s
//! and executed when the host drains the queue with
//! [`GadgetManager::run_pending`] (its event loop's idle phase). A callback
//! invoked from inside a tree-mutating API call therefore never observes a
//! half-mutated tree.
//!
//! ## Reentrancy
//!
//! Module operations and caller callbacks receive `&mut GadgetManager` and
//! may reenter any public operation. Traversals are wrapped in a
//! `walk_scope` that keeps the `walking` counter balanced on every exit
//! path; `destroy_all` requested while a traversal is on the stack is
//! deferred and runs exactly once, when the counter returns to zero.

use std::collections::{HashMap, VecDeque};

use log::{debug, error};

use crate::engine::{DisplayEngine, EngineRequest, IndicatorPanel, Transition};
use crate::error::{GadgetError, Result};
use crate::instance::{GadgetCallbacks, GadgetInstance};
use crate::module::{GadgetModule, ModuleLoader};
use crate::request::{Request, ResultCode, RESULT_DATA_KEY};
use crate::types::{
    DisplayOption, GadgetEvent, GadgetId, GadgetMode, GadgetState, IndicatorPolicy, KeyEvent,
    Layout, LayoutState, Window,
};

#[cfg(test)]
mod tests;

/// Work deferred to the host event loop's idle phase.
enum Job {
    Start(GadgetId),
    Pause(GadgetId),
    Resume(GadgetId),
    Broadcast(GadgetEvent),
    Finalize(GadgetId),
}

/// The tree engine. Owns every [`GadgetInstance`], the fullview stack and
/// the deferred-job queue; constructed once by the facade and torn down by
/// dropping it (or explicitly with [`destroy_all`](Self::destroy_all)).
pub struct GadgetManager {
    instances: HashMap<GadgetId, GadgetInstance>,
    next_id: u64,

    root: Option<GadgetId>,
    /// Fullview stack, most-recent-first; the front receives key events
    /// and owns the indicator policy.
    fv_list: VecDeque<GadgetId>,

    window: Window,
    conformant: Option<Window>,
    base_opt: DisplayOption,

    last_rotation: GadgetEvent,
    is_landscape: bool,

    walking: u32,
    destroy_all_pending: bool,

    engine: Option<Box<dyn DisplayEngine>>,
    indicator: Option<Box<dyn IndicatorPanel>>,
    loader: ModuleLoader,

    jobs: VecDeque<Job>,
}

impl GadgetManager {
    pub fn new(window: Window, base_opt: DisplayOption, loader: ModuleLoader) -> Self {
        GadgetManager {
            instances: HashMap::new(),
            next_id: 1,
            root: None,
            fv_list: VecDeque::new(),
            window,
            conformant: None,
            base_opt,
            last_rotation: GadgetEvent::RotatePortrait,
            is_landscape: false,
            walking: 0,
            destroy_all_pending: false,
            engine: None,
            indicator: None,
            loader,
            jobs: VecDeque::new(),
        }
    }

    pub fn set_engine(&mut self, engine: Box<dyn DisplayEngine>) {
        self.engine = Some(engine);
    }

    pub fn has_engine(&self) -> bool {
        self.engine.is_some()
    }

    pub fn set_indicator_panel(&mut self, panel: Box<dyn IndicatorPanel>) {
        self.indicator = Some(panel);
    }

    pub fn loader(&self) -> &ModuleLoader {
        &self.loader
    }

    pub fn loader_mut(&mut self) -> &mut ModuleLoader {
        &mut self.loader
    }

    // --- queries ---------------------------------------------------------

    /// Liveness check: the id resolves to an instance that is attached to
    /// the tree and not destroyed. The root itself is deliberately not
    /// "found": it belongs to the host, not to any caller.
    pub fn exists(&self, id: GadgetId) -> bool {
        let Some(root) = self.root else {
            return false;
        };
        if self
            .inst(id)
            .map_or(true, |i| i.state == GadgetState::Destroyed)
        {
            return false;
        }
        self.found_under(root, id)
    }

    /// Current fullview top, if any (may be the root).
    pub fn fv_top(&self) -> Option<GadgetId> {
        self.fv_list.front().copied()
    }

    /// Lifecycle state, `Invalid` when the id resolves to nothing.
    pub fn state(&self, id: GadgetId) -> GadgetState {
        self.inst(id).map_or(GadgetState::Invalid, |i| i.state)
    }

    pub fn mode(&self, id: GadgetId) -> Result<GadgetMode> {
        if !self.exists(id) {
            return Err(GadgetError::InvalidHandle(id));
        }
        self.inst(id)
            .map(|i| i.mode)
            .ok_or(GadgetError::InvalidHandle(id))
    }

    pub fn layout(&self, id: GadgetId) -> Result<Option<&Layout>> {
        if !self.exists(id) {
            return Err(GadgetError::InvalidHandle(id));
        }
        Ok(self.inst(id).and_then(|i| i.layout.as_ref()))
    }

    pub fn parent_layout(&self, id: GadgetId) -> Result<Option<&Layout>> {
        if !self.exists(id) {
            return Err(GadgetError::InvalidHandle(id));
        }
        let parent = self.inst(id).and_then(|i| i.parent);
        Ok(parent
            .and_then(|p| self.inst(p))
            .and_then(|p| p.layout.as_ref()))
    }

    pub fn effect_layout(&self, id: GadgetId) -> Option<&Layout> {
        self.inst(id).and_then(|i| i.effect_layout.as_ref())
    }

    pub fn layout_state(&self, id: GadgetId) -> Option<LayoutState> {
        self.inst(id).map(|i| i.layout_state)
    }

    /// Engines drive the animation sub-machine through this.
    pub fn set_layout_state(&mut self, id: GadgetId, state: LayoutState) {
        if let Some(inst) = self.inst_mut(id) {
            inst.layout_state = state;
        }
    }

    pub fn window(&self) -> Window {
        self.window.clone()
    }

    /// The host conformant container, fetched lazily from the engine and
    /// cached.
    pub fn conformant(&mut self) -> Option<Window> {
        if self.conformant.is_none() {
            let fetched =
                self.with_engine(|eng, man| eng.request(man, None, EngineRequest::Conformant));
            self.conformant = fetched.flatten();
        }
        self.conformant.clone()
    }

    pub fn module_exists(&self, name: &str) -> bool {
        self.loader.exists(name)
    }

    // --- load / create ---------------------------------------------------

    /// Load `name`, clone the request, attach under `parent` (root when
    /// `None`) and run the creation sequence. On any failure every trace of
    /// the instance is released before the error is reported.
    pub fn load(
        &mut self,
        parent: Option<GadgetId>,
        name: &str,
        mode: GadgetMode,
        request: &Request,
        cbs: GadgetCallbacks,
    ) -> Result<GadgetId> {
        let module = self.loader.load(name)?;
        let opt = module.options();
        let inst = GadgetInstance::new(name, mode, opt, module, request.clone(), cbs);
        let id = self.insert(inst);

        match self.add(parent, id) {
            Ok(()) => Ok(id),
            Err(e) => {
                error!("load of '{name}' failed: {e}");
                // unload the module, drop the payload, forget the id
                self.instances.remove(&id);
                Err(e)
            }
        }
    }

    /// Link `id` under `parent` and run the creation sequence; pushes
    /// fullview instances onto the stack on success.
    fn add(&mut self, parent: Option<GadgetId>, id: GadgetId) -> Result<()> {
        let parent_id = self.ensure_root(parent)?;

        match self.inst(parent_id) {
            None => return Err(GadgetError::InvalidHandle(parent_id)),
            Some(p)
                if p.destroy_me
                    || matches!(
                        p.state,
                        GadgetState::Destroying
                            | GadgetState::PendingDestroy
                            | GadgetState::Destroyed
                    ) =>
            {
                return Err(GadgetError::InvalidState(format!(
                    "parent {parent_id} is being destroyed"
                )));
            }
            Some(_) => {}
        }

        // prepend: most-recently-added child comes first
        if let Some(inst) = self.inst_mut(id) {
            inst.parent = Some(parent_id);
        }
        if let Some(p) = self.inst_mut(parent_id) {
            p.children.push_front(id);
        }

        self.create_instance(id)?;

        if self.inst(id).map(|i| i.mode) == Some(GadgetMode::Fullview) {
            self.fv_list.push_front(id);
        }
        Ok(())
    }

    /// The §creation sequence: module create, engine wrap, caller layout
    /// callback, indicator policy, cached-rotation replay, start.
    fn create_instance(&mut self, id: GadgetId) -> Result<()> {
        let (name, mode) = match self.inst(id) {
            Some(i) if i.state == GadgetState::Ready => (i.name.clone(), i.mode),
            Some(_) => return Err(GadgetError::InvalidState(format!("{id} is not ready"))),
            None => return Err(GadgetError::InvalidHandle(id)),
        };

        if let Some(inst) = self.inst_mut(id) {
            inst.state = GadgetState::Created;
        }

        let layout = self
            .with_module(id, |m, man, req| m.on_create(man, id, mode, req))
            .flatten();
        let Some(layout) = layout else {
            // the one fatal-by-design condition, fatal only to this instance
            error!("gadget '{name}' produced no layout, aborting its creation");
            self.unlink(id);
            return Err(GadgetError::CreateFailed { name });
        };
        if let Some(inst) = self.inst_mut(id) {
            inst.layout = Some(layout);
        }

        if mode == GadgetMode::Fullview {
            let effect = self.with_engine(|eng, man| eng.create(man, id)).flatten();
            if let Some(effect) = effect {
                if let Some(inst) = self.inst_mut(id) {
                    inst.effect_layout = Some(effect);
                }
            }
        }

        self.invoke_layout_cb(id);
        self.apply_option(id);

        // the new subtree catches up on the cached orientation
        let rotation = self.last_rotation;
        self.walk_scope(|man| man.event_walk(id, rotation));

        // fullview instances behind a show transition start when the
        // engine signals completion
        let gated = mode == GadgetMode::Fullview
            && self.inst(id).map_or(false, |i| i.effect_layout.is_some());
        if !gated {
            self.start_instance(id);
        }

        self.dump_tree();
        Ok(())
    }

    fn ensure_root(&mut self, parent: Option<GadgetId>) -> Result<GadgetId> {
        if let Some(root) = self.root {
            return Ok(parent.unwrap_or(root));
        }
        if let Some(p) = parent {
            error!("add failed: parent {p} given before any root exists");
            return Err(GadgetError::InvalidArgument(
                "parent must be empty before a root exists".into(),
            ));
        }
        let layout = Some(Layout::new(self.window.clone()));
        let id = self.insert(GadgetInstance::root(self.base_opt, layout));
        self.root = Some(id);
        self.fv_list.push_front(id);
        Ok(id)
    }

    fn start_instance(&mut self, id: GadgetId) {
        match self.inst_mut(id) {
            Some(inst) if inst.state == GadgetState::Created => {
                inst.state = GadgetState::Running;
            }
            _ => return,
        }
        let _ = self.with_module(id, |m, man, req| m.on_start(man, id, req));
    }

    // --- destruction ------------------------------------------------------

    /// Request destruction of `id` and (bottom-up) of its whole subtree.
    /// The actual teardown is asynchronous: it completes when the hide
    /// transition finishes, or on the next [`run_pending`](Self::run_pending)
    /// drain without an engine.
    pub fn destroy(&mut self, id: GadgetId) -> Result<()> {
        if !self.exists(id) {
            error!("destroy failed: invalid gadget {id}");
            return Err(GadgetError::InvalidHandle(id));
        }
        if self.inst(id).map_or(false, |i| i.destroy_me) {
            error!("destroy failed: gadget {id} is already on destroying");
            return Err(GadgetError::AlreadyDestroying(id));
        }

        // children first, so a parent never goes down while a child lives
        let kids = self.children_of(id);
        for c in kids {
            if self.exists(c) && !self.inst(c).map_or(true, |i| i.destroy_me) {
                let _ = self.destroy(c);
            }
        }

        self.mark_destroying(id);
        self.preupdate_indicator(id);

        let mode = match self.inst(id) {
            Some(i) => i.mode,
            None => return Ok(()), // freed by a reentrant callback
        };

        if self.engine.is_some() {
            if mode == GadgetMode::Fullview {
                if let Some(inst) = self.inst_mut(id) {
                    inst.effect_pending = true;
                }
                let top = self.fv_top();
                let tr = self
                    .with_engine(|eng, man| eng.destroy(man, id, top))
                    .unwrap_or(Transition::Immediate);
                if tr == Transition::Immediate {
                    if let Some(inst) = self.inst_mut(id) {
                        inst.effect_pending = false;
                    }
                    self.enqueue(Job::Finalize(id));
                }
            } else {
                let _ = self.with_engine(|eng, man| eng.destroy(man, id, None));
                self.enqueue(Job::Finalize(id));
            }
        } else {
            self.enqueue(Job::Finalize(id));
        }
        Ok(())
    }

    /// Tear down the whole tree. Deferred until the stack unwinds when a
    /// traversal is in progress; immediate otherwise.
    pub fn destroy_all(&mut self) -> Result<()> {
        if self.root.is_none() {
            error!("destroy_all failed: no root");
            return Err(GadgetError::InvalidState("no root".into()));
        }
        if self.walking > 0 {
            debug!("destroy_all deferred: traversal in progress");
            self.destroy_all_pending = true;
        } else {
            self.teardown_tree();
        }
        Ok(())
    }

    /// A module asks its caller to destroy it; only forwards to the
    /// caller's destroy callback.
    pub fn destroy_me(&mut self, id: GadgetId) -> Result<()> {
        if !self.exists(id) {
            return Err(GadgetError::InvalidHandle(id));
        }
        if matches!(
            self.state(id),
            GadgetState::Destroying | GadgetState::PendingDestroy
        ) {
            return Err(GadgetError::AlreadyDestroying(id));
        }
        if self.inst(id).map_or(true, |i| i.cbs.destroy.is_none()) {
            error!("destroy_me failed: no destroy callback for {id}");
            return Err(GadgetError::InvalidState(
                "destroy callback not registered".into(),
            ));
        }
        self.invoke_destroy_cb(id);
        Ok(())
    }

    /// Mark the whole subtree `Destroying` before any notification fires,
    /// then deliver the destroying notifications children-first.
    fn mark_destroying(&mut self, id: GadgetId) {
        let mut subtree = Vec::new();
        self.postorder_into(id, &mut subtree);

        let mut fresh = Vec::new();
        for node in subtree {
            if let Some(inst) = self.inst_mut(node) {
                if inst.destroy_me {
                    continue;
                }
                inst.destroy_me = true;
                inst.state = GadgetState::Destroying;
                fresh.push(node);
            }
        }
        for node in fresh {
            let _ = self.with_module(node, |m, man, req| m.on_destroying(man, node, req));
        }
    }

    /// If destroying `id` dethrones the fullview top, apply the next top's
    /// indicator policy now, before any animation starts.
    fn preupdate_indicator(&mut self, doomed_root: GadgetId) {
        let Some(top) = self.fv_top() else {
            return;
        };
        let mut doomed = Vec::new();
        self.postorder_into(doomed_root, &mut doomed);
        if !doomed.contains(&top) {
            return;
        }
        let next = self
            .fv_list
            .iter()
            .copied()
            .find(|fv| !doomed.contains(fv));
        if let Some(next) = next {
            self.apply_option(next);
        }
    }

    fn teardown_tree(&mut self) {
        if let Some(root) = self.root {
            self.finalize(root, true);
        }
    }

    fn finalize(&mut self, id: GadgetId, force: bool) {
        self.walk_scope(|man| man.finalize_inner(id, force));
    }

    /// The terminal transition: free children first, then invoke the
    /// module's destroy callback, notify the caller, detach and release.
    /// A parent whose children still have hide transitions in flight parks
    /// in `PendingDestroy` until the last one frees (unless `force`d, at
    /// full teardown).
    fn finalize_inner(&mut self, id: GadgetId, force: bool) {
        match self.state(id) {
            GadgetState::Created
            | GadgetState::Running
            | GadgetState::Stopped
            | GadgetState::Destroying
            | GadgetState::PendingDestroy => {}
            _ => return,
        }

        for c in self.children_of(id) {
            let animating = self.inst(c).map_or(false, |i| i.effect_pending);
            if animating && !force {
                continue;
            }
            self.finalize_inner(c, force);
        }
        let children_left = self.inst(id).map_or(0, |i| i.children.len());
        if children_left > 0 && !force {
            debug!("gadget {id} pending destroy: {children_left} child(ren) still animating");
            if let Some(inst) = self.inst_mut(id) {
                inst.state = GadgetState::PendingDestroy;
            }
            return;
        }

        let (mode, parent) = match self.inst_mut(id) {
            Some(inst) => {
                inst.state = GadgetState::Destroyed;
                (inst.mode, inst.parent)
            }
            None => return,
        };

        let _ = self.with_module(id, |m, man, req| m.on_destroy(man, id, req));
        self.invoke_end_cb(id);
        self.unlink(id);
        if mode == GadgetMode::Fullview {
            self.fv_remove(id);
        }
        // releases the module (unload), the payload and the layouts
        self.instances.remove(&id);
        if self.root == Some(id) {
            self.root = None;
        }

        // a parked parent leaves once its last child is gone
        if let Some(p) = parent {
            let ready = self
                .inst(p)
                .map_or(false, |i| {
                    i.state == GadgetState::PendingDestroy && i.children.is_empty()
                });
            if ready {
                self.enqueue(Job::Finalize(p));
            }
        }

        self.dump_tree();
    }

    /// Engine signal: the show transition of `id` finished.
    pub fn notify_show_finished(&mut self, id: GadgetId) {
        if self.state(id) == GadgetState::Created {
            self.enqueue(Job::Start(id));
        }
    }

    /// Engine signal: the hide transition of `id` finished; finalization
    /// may proceed (on the next drain, never on this stack frame).
    pub fn notify_hide_finished(&mut self, id: GadgetId) {
        let Some(inst) = self.inst_mut(id) else {
            return;
        };
        inst.effect_pending = false;
        self.enqueue(Job::Finalize(id));
    }

    // --- pause / resume ---------------------------------------------------

    /// Pause the whole tree (host going to background). Deferred to the
    /// idle drain.
    pub fn pause(&mut self) -> Result<()> {
        let root = self.require_root("pause")?;
        self.enqueue(Job::Pause(root));
        Ok(())
    }

    pub fn resume(&mut self) -> Result<()> {
        let root = self.require_root("resume")?;
        self.enqueue(Job::Resume(root));
        Ok(())
    }

    /// Pause one live subtree.
    pub fn pause_gadget(&mut self, id: GadgetId) -> Result<()> {
        if !self.exists(id) {
            return Err(GadgetError::InvalidHandle(id));
        }
        self.enqueue(Job::Pause(id));
        Ok(())
    }

    pub fn resume_gadget(&mut self, id: GadgetId) -> Result<()> {
        if !self.exists(id) {
            return Err(GadgetError::InvalidHandle(id));
        }
        self.enqueue(Job::Resume(id));
        Ok(())
    }

    /// Post-order: every descendant observes the pause before its parent's
    /// own callback runs.
    fn pause_inner(&mut self, id: GadgetId) {
        match self.inst_mut(id) {
            Some(inst) if inst.state == GadgetState::Running => {
                inst.state = GadgetState::Stopped;
            }
            _ => return,
        }
        for c in self.children_of(id) {
            self.pause_inner(c);
        }
        let _ = self.with_module(id, |m, man, req| m.on_pause(man, id, req));
    }

    /// Post-order like pause; a still-`Created` node short-circuits to its
    /// start transition instead.
    fn resume_inner(&mut self, id: GadgetId) {
        match self.state(id) {
            GadgetState::Created => {
                self.start_instance(id);
                return;
            }
            GadgetState::Stopped => {}
            _ => return,
        }
        if let Some(inst) = self.inst_mut(id) {
            inst.state = GadgetState::Running;
        }
        for c in self.children_of(id) {
            self.resume_inner(c);
        }
        let _ = self.with_module(id, |m, man, req| m.on_resume(man, id, req));
    }

    // --- events / messages ------------------------------------------------

    /// Broadcast a system event to the whole tree (deferred). Rotation
    /// additionally updates the cached orientation and the fullview top's
    /// indicator policy immediately.
    pub fn send_event(&mut self, event: GadgetEvent) -> Result<()> {
        if let Some(landscape) = event.rotation() {
            self.last_rotation = event;
            self.is_landscape = landscape;
        }
        self.require_root("send_event")?;
        self.enqueue(Job::Broadcast(event));

        if event.rotation().is_some() {
            if let Some(top) = self.fv_top() {
                if let Some(policy) = self.inst(top).map(|i| i.opt.indicator) {
                    self.indicator_update(policy, Some(event));
                }
            }
        }
        Ok(())
    }

    /// Key events go to the fullview top only: directional input for the
    /// focused view, not a broadcast.
    pub fn send_key_event(&mut self, event: KeyEvent) -> Result<()> {
        let top = match self.fv_top() {
            Some(top) if self.exists(top) => top,
            _ => {
                error!("send_key_event failed: fullview top is invalid");
                return Err(GadgetError::InvalidState("fullview top is invalid".into()));
            }
        };
        self.with_module(top, |m, man, req| m.on_key_event(man, top, event, req))
            .ok_or_else(|| GadgetError::InvalidState("fullview top has no module".into()))
    }

    /// Deliver a cloned payload to exactly one instance.
    pub fn send_message(&mut self, id: GadgetId, msg: &Request) -> Result<()> {
        if !self.exists(id) {
            error!("send_message failed: invalid gadget {id}");
            return Err(GadgetError::InvalidHandle(id));
        }
        let dup = msg.clone();
        let _ = self.with_module(id, |m, man, req| m.on_message(man, id, &dup, req));
        Ok(())
    }

    /// Forward a result to the caller's result callback.
    pub fn send_result(&mut self, id: GadgetId, reply: Option<&Request>) -> Result<()> {
        self.deliver_result(id, reply.cloned())
    }

    /// Like [`send_result`](Self::send_result), with the launch-request
    /// result code recorded under [`RESULT_DATA_KEY`].
    pub fn send_result_full(
        &mut self,
        id: GadgetId,
        reply: Option<&Request>,
        code: ResultCode,
    ) -> Result<()> {
        let mut dup = reply.cloned().unwrap_or_default();
        dup.set(RESULT_DATA_KEY, code.code().to_string());
        self.deliver_result(id, Some(dup))
    }

    fn deliver_result(&mut self, id: GadgetId, reply: Option<Request>) -> Result<()> {
        if !self.exists(id) {
            error!("send_result failed: invalid gadget {id}");
            return Err(GadgetError::InvalidHandle(id));
        }
        if self.inst(id).map_or(true, |i| i.cbs.result.is_none()) {
            error!("send_result failed: no result callback for {id}");
            return Err(GadgetError::InvalidState(
                "result callback not registered".into(),
            ));
        }
        self.invoke_result_cb(id, reply.as_ref());
        Ok(())
    }

    /// Opt out of transition animation; only valid before the first show.
    pub fn disable_effect(&mut self, id: GadgetId) -> Result<()> {
        let Some(inst) = self.inst_mut(id) else {
            return Err(GadgetError::InvalidHandle(id));
        };
        if inst.layout_state != LayoutState::Init {
            error!("disable_effect failed: gadget {id} has already been shown");
            return Err(GadgetError::InvalidState(
                "gadget has already been shown".into(),
            ));
        }
        inst.layout_state = LayoutState::NoEffect;
        Ok(())
    }

    // --- idle queue -------------------------------------------------------

    /// Drain the deferred-job queue; the host calls this from its event
    /// loop's idle phase. Jobs enqueued by running jobs are drained too.
    pub fn run_pending(&mut self) -> usize {
        let mut ran = 0;
        while let Some(job) = self.jobs.pop_front() {
            match job {
                Job::Start(id) => self.start_instance(id),
                Job::Pause(id) => self.walk_scope(|man| man.pause_inner(id)),
                Job::Resume(id) => self.walk_scope(|man| man.resume_inner(id)),
                Job::Broadcast(event) => {
                    if let Some(root) = self.root {
                        self.walk_scope(|man| man.event_walk(root, event));
                    }
                }
                Job::Finalize(id) => self.finalize(id, false),
            }
            ran += 1;
        }
        ran
    }

    pub fn has_pending(&self) -> bool {
        !self.jobs.is_empty()
    }

    fn enqueue(&mut self, job: Job) {
        self.jobs.push_back(job);
    }

    // --- traversal plumbing ----------------------------------------------

    /// Balanced `walking` accounting for every traversal; the deferred
    /// destroy-all runs here, once the outermost scope releases.
    fn walk_scope<R>(&mut self, f: impl FnOnce(&mut Self) -> R) -> R {
        self.walking += 1;
        let out = f(self);
        self.walking -= 1;
        if self.walking == 0 && self.destroy_all_pending {
            self.destroy_all_pending = false;
            self.teardown_tree();
        }
        out
    }

    /// Post-order event delivery: the subtree hears it before the node.
    fn event_walk(&mut self, id: GadgetId, event: GadgetEvent) {
        if self.inst(id).is_none() {
            return;
        }
        for c in self.children_of(id) {
            self.event_walk(c, event);
        }
        let _ = self.with_module(id, |m, man, req| m.on_event(man, id, event, req));
    }

    fn inst(&self, id: GadgetId) -> Option<&GadgetInstance> {
        self.instances.get(&id)
    }

    fn inst_mut(&mut self, id: GadgetId) -> Option<&mut GadgetInstance> {
        self.instances.get_mut(&id)
    }

    fn insert(&mut self, inst: GadgetInstance) -> GadgetId {
        let id = GadgetId::from_raw(self.next_id);
        self.next_id += 1;
        self.instances.insert(id, inst);
        id
    }

    /// Snapshot of the child ids; traversals iterate over this so that
    /// reentrant mutation can at worst make an id stop resolving.
    fn children_of(&self, id: GadgetId) -> Vec<GadgetId> {
        self.inst(id)
            .map(|i| i.children.iter().copied().collect())
            .unwrap_or_default()
    }

    fn postorder_into(&self, id: GadgetId, out: &mut Vec<GadgetId>) {
        if let Some(inst) = self.inst(id) {
            for &c in &inst.children {
                self.postorder_into(c, out);
            }
            out.push(id);
        }
    }

    fn found_under(&self, parent: GadgetId, target: GadgetId) -> bool {
        let Some(inst) = self.inst(parent) else {
            return false;
        };
        inst.children
            .iter()
            .any(|&c| c == target || self.found_under(c, target))
    }

    fn unlink(&mut self, id: GadgetId) {
        let parent = self.inst(id).and_then(|i| i.parent);
        if let Some(p) = parent {
            if let Some(pi) = self.inst_mut(p) {
                pi.children.retain(|c| *c != id);
            }
        }
        if let Some(inst) = self.inst_mut(id) {
            inst.parent = None;
        }
    }

    fn fv_remove(&mut self, id: GadgetId) {
        let was_top = self.fv_top() == Some(id);
        self.fv_list.retain(|fv| *fv != id);
        if was_top {
            if let Some(next) = self.fv_top() {
                self.apply_option(next);
            }
        }
    }

    fn require_root(&self, what: &str) -> Result<GadgetId> {
        self.root.ok_or_else(|| {
            error!("{what} failed: no root");
            GadgetError::InvalidState("no root".into())
        })
    }

    // --- module / engine / callback dispatch ------------------------------

    /// Run a module operation with the manager reborrowed for reentrancy.
    /// The module is moved out of the arena for the duration of the call;
    /// if the instance was freed while plugin code ran (destroy-all from a
    /// callback), the module simply drops (and unloads) here.
    fn with_module<R>(
        &mut self,
        id: GadgetId,
        f: impl FnOnce(&mut dyn GadgetModule, &mut Self, &Request) -> R,
    ) -> Option<R> {
        let (mut module, request) = {
            let inst = self.inst_mut(id)?;
            let module = inst.module.take()?;
            (module, inst.request.clone())
        };
        let out = f(module.ops_mut(), self, &request);
        if let Some(inst) = self.inst_mut(id) {
            inst.module = Some(module);
        } else {
            debug!("gadget {id} freed during a module call; unloading its module");
        }
        Some(out)
    }

    fn with_engine<R>(
        &mut self,
        f: impl FnOnce(&mut dyn DisplayEngine, &mut Self) -> R,
    ) -> Option<R> {
        let mut engine = self.engine.take()?;
        let out = f(&mut *engine, self);
        if self.engine.is_none() {
            self.engine = Some(engine);
        }
        Some(out)
    }

    fn invoke_layout_cb(&mut self, id: GadgetId) {
        let Some(mut cb) = self.inst_mut(id).and_then(|i| i.cbs.layout.take()) else {
            return;
        };
        let Some(mode) = self.inst(id).map(|i| i.mode) else {
            return;
        };
        cb(self, id, mode);
        if let Some(inst) = self.inst_mut(id) {
            inst.cbs.layout = Some(cb);
        }
    }

    fn invoke_result_cb(&mut self, id: GadgetId, reply: Option<&Request>) {
        let Some(mut cb) = self.inst_mut(id).and_then(|i| i.cbs.result.take()) else {
            return;
        };
        cb(self, id, reply);
        if let Some(inst) = self.inst_mut(id) {
            inst.cbs.result = Some(cb);
        }
    }

    fn invoke_destroy_cb(&mut self, id: GadgetId) {
        let Some(mut cb) = self.inst_mut(id).and_then(|i| i.cbs.destroy.take()) else {
            return;
        };
        cb(self, id);
        if let Some(inst) = self.inst_mut(id) {
            inst.cbs.destroy = Some(cb);
        }
    }

    fn invoke_end_cb(&mut self, id: GadgetId) {
        let Some(mut cb) = self.inst_mut(id).and_then(|i| i.cbs.end.take()) else {
            return;
        };
        cb(self, id);
        if let Some(inst) = self.inst_mut(id) {
            inst.cbs.end = Some(cb);
        }
    }

    // --- indicator --------------------------------------------------------

    /// Apply `id`'s indicator policy (fullview only).
    fn apply_option(&mut self, id: GadgetId) {
        let Some((mode, policy)) = self.inst(id).map(|i| (i.mode, i.opt.indicator)) else {
            return;
        };
        if mode == GadgetMode::Fullview {
            self.indicator_update(policy, None);
        }
    }

    fn indicator_update(&mut self, policy: IndicatorPolicy, event: Option<GadgetEvent>) {
        let landscape = self.is_landscape;
        let Some(panel) = self.indicator.as_mut() else {
            debug!("indicator update skipped: no panel");
            return;
        };
        let enabled = match policy {
            // on plain (re)application the indicator comes up; on a
            // rotation it keeps whatever state the panel reports
            IndicatorPolicy::Enable => event.is_none() || panel.is_enabled(),
            IndicatorPolicy::PortraitOnly => !landscape,
            IndicatorPolicy::LandscapeOnly => landscape,
            IndicatorPolicy::Disable => false,
            // the gadget drives the indicator itself
            IndicatorPolicy::Manual => return,
        };
        panel.set_enabled(enabled);
    }

    // --- diagnostics ------------------------------------------------------

    fn dump_tree(&self) {
        if !log::log_enabled!(log::Level::Debug) {
            return;
        }
        let Some(root) = self.root else {
            return;
        };
        debug!("============ gadget tree ============");
        self.dump_node(root, 0);
    }

    fn dump_node(&self, id: GadgetId, depth: usize) {
        let Some(inst) = self.inst(id) else {
            return;
        };
        debug!(
            "{}{} {} [{}] {:?}",
            "  ".repeat(depth),
            id,
            inst.name,
            if inst.mode == GadgetMode::Fullview { 'F' } else { 'f' },
            inst.state,
        );
        for &c in &inst.children {
            self.dump_node(c, depth + 1);
        }
    }
}
