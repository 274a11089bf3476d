use super::*;
use crate::error::GadgetError;
use crate::request::Request;
use crate::types::{GadgetMode, GadgetState};

#[test]
fn second_destroy_request_is_rejected() {
    let log = CallLog::default();
    let mut man = manager_with(&["hello"], &log);

    let id = man
        .load(None, "hello", GadgetMode::Fullview, &Request::new(), cbs())
        .unwrap();
    man.destroy(id).unwrap();

    // not yet finalized, but already marked
    assert_eq!(man.state(id), GadgetState::Destroying);
    assert!(matches!(
        man.destroy(id),
        Err(GadgetError::AlreadyDestroying(_))
    ));

    man.run_pending();
    assert!(matches!(man.destroy(id), Err(GadgetError::InvalidHandle(_))));
}

#[test]
fn subtree_is_marked_before_callbacks_and_freed_bottom_up() {
    let log = CallLog::default();
    let mut man = manager_with(&["p", "c", "gc"], &log);

    let p = man
        .load(None, "p", GadgetMode::Frameview, &Request::new(), cbs())
        .unwrap();
    let c = man
        .load(Some(p), "c", GadgetMode::Frameview, &Request::new(), cbs())
        .unwrap();
    let gc = man
        .load(Some(c), "gc", GadgetMode::Frameview, &Request::new(), cbs())
        .unwrap();
    log.clear();

    man.destroy(p).unwrap();

    // the whole subtree is marked synchronously
    for id in [p, c, gc] {
        assert_eq!(man.state(id), GadgetState::Destroying);
    }
    assert_eq!(log.count("p:destroy"), 0, "teardown is deferred");

    man.run_pending();

    // children observe teardown before their parent
    assert!(log.position("gc:destroy") < log.position("c:destroy"));
    assert!(log.position("c:destroy") < log.position("p:destroy"));
    assert_eq!(instance_count(&man), 1);
}

#[test]
fn parent_parks_in_pending_destroy_until_children_finish_hiding() {
    let log = CallLog::default();
    let mut man = manager_with(&["p", "c"], &log);
    let engine = EngineState::default();
    man.set_engine(Box::new(StepEngine {
        state: engine.clone(),
        animate_all: true,
    }));

    let p = man
        .load(None, "p", GadgetMode::Fullview, &Request::new(), cbs())
        .unwrap();
    let c = man
        .load(Some(p), "c", GadgetMode::Fullview, &Request::new(), cbs())
        .unwrap();

    man.destroy(p).unwrap();
    assert_eq!(engine.hides.borrow().as_slice(), &[c, p]);

    // the parent's hide completes first: it must wait for the child
    man.notify_hide_finished(p);
    man.run_pending();
    assert_eq!(man.state(p), GadgetState::PendingDestroy);
    assert_eq!(man.state(c), GadgetState::Destroying);
    assert_eq!(log.count("p:destroy"), 0);

    // the child frees and re-queues the parent, exactly once
    man.notify_hide_finished(c);
    man.run_pending();
    assert_eq!(man.state(p), GadgetState::Invalid);
    assert_eq!(man.state(c), GadgetState::Invalid);
    assert_eq!(log.count("c:destroy"), 1);
    assert_eq!(log.count("p:destroy"), 1);
    assert_eq!(instance_count(&man), 1);
}

#[test]
fn destroy_all_when_idle_tears_down_synchronously() {
    let log = CallLog::default();
    let mut man = manager_with(&["a", "b"], &log);

    man.load(None, "a", GadgetMode::Fullview, &Request::new(), cbs())
        .unwrap();
    man.load(None, "b", GadgetMode::Frameview, &Request::new(), cbs())
        .unwrap();

    man.destroy_all().unwrap();

    assert_eq!(instance_count(&man), 0, "no idle drain needed");
    assert_eq!(man.fv_top(), None);
    assert_eq!(log.count("a:destroy"), 1);
    assert_eq!(log.count("b:destroy"), 1);

    // the root is gone too, until the next add re-creates it
    assert!(matches!(
        man.destroy_all(),
        Err(GadgetError::InvalidState(_))
    ));
    let id = man
        .load(None, "a", GadgetMode::Fullview, &Request::new(), cbs())
        .expect("tree grows back lazily");
    assert_eq!(man.state(id), GadgetState::Running);
}

#[test]
fn destroy_all_does_not_wait_for_animations() {
    let log = CallLog::default();
    let mut man = manager_with(&["a"], &log);
    let engine = EngineState::default();
    man.set_engine(Box::new(StepEngine {
        state: engine.clone(),
        animate_all: true,
    }));

    let a = man
        .load(None, "a", GadgetMode::Fullview, &Request::new(), cbs())
        .unwrap();
    man.destroy(a).unwrap();
    assert_eq!(engine.hides.borrow().as_slice(), &[a]);

    // host termination: the in-flight hide is not awaited
    man.destroy_all().unwrap();
    assert_eq!(instance_count(&man), 0);
    assert_eq!(log.count("a:destroy"), 1);

    // the straggler completion signal must be harmless
    man.notify_hide_finished(a);
    man.run_pending();
    assert_eq!(log.count("a:destroy"), 1);
}

#[test]
fn gadgets_cannot_attach_under_a_dying_parent() {
    let log = CallLog::default();
    let mut man = manager_with(&["p", "c"], &log);
    let engine = EngineState::default();
    man.set_engine(Box::new(StepEngine {
        state: engine,
        animate_all: true,
    }));

    let p = man
        .load(None, "p", GadgetMode::Fullview, &Request::new(), cbs())
        .unwrap();
    man.destroy(p).unwrap();
    assert_eq!(man.state(p), GadgetState::Destroying);

    let err = man
        .load(Some(p), "c", GadgetMode::Frameview, &Request::new(), cbs())
        .unwrap_err();
    assert!(matches!(err, GadgetError::InvalidState(_)));
    assert_eq!(log.count("c:create"), 0);
}

#[test]
fn frameview_destroy_with_engine_skips_the_animation() {
    let log = CallLog::default();
    let mut man = manager_with(&["frame"], &log);
    let engine = EngineState::default();
    man.set_engine(Box::new(StepEngine {
        state: engine.clone(),
        animate_all: false,
    }));

    let id = man
        .load(None, "frame", GadgetMode::Frameview, &Request::new(), cbs())
        .unwrap();
    man.destroy(id).unwrap();

    assert!(engine.hides.borrow().is_empty(), "frameview never animates");
    man.run_pending();
    assert_eq!(log.count("frame:destroy"), 1);
    assert_eq!(instance_count(&man), 1);
}
