use super::*;
use crate::error::GadgetError;
use crate::request::Request;
use crate::types::{GadgetEvent, GadgetMode, GadgetState, IndicatorPolicy, KeyEvent};

#[test]
fn fullview_stack_orders_most_recent_first_and_promotes() {
    let log = CallLog::default();
    let mut man = manager_with(&["p", "c"], &log);

    let p = man
        .load(None, "p", GadgetMode::Fullview, &Request::new(), cbs())
        .unwrap();
    let root = fv_stack(&man)[1];
    let c = man
        .load(Some(p), "c", GadgetMode::Fullview, &Request::new(), cbs())
        .unwrap();

    assert_eq!(fv_stack(&man), vec![c, p, root]);
    assert_eq!(man.fv_top(), Some(c));

    man.destroy(c).unwrap();
    man.run_pending();
    assert_eq!(fv_stack(&man), vec![p, root]);
    assert_eq!(man.fv_top(), Some(p));

    man.destroy(p).unwrap();
    man.run_pending();
    assert_eq!(fv_stack(&man), vec![root]);
    assert_eq!(man.state(root), GadgetState::Running);
}

#[test]
fn key_events_reach_only_the_fullview_top() {
    let log = CallLog::default();
    let mut man = manager_with(&["top", "below", "frame"], &log);

    let below = man
        .load(None, "below", GadgetMode::Fullview, &Request::new(), cbs())
        .unwrap();
    let top = man
        .load(None, "top", GadgetMode::Fullview, &Request::new(), cbs())
        .unwrap();
    let _frame = man
        .load(Some(top), "frame", GadgetMode::Frameview, &Request::new(), cbs())
        .unwrap();
    log.clear();

    man.send_key_event(KeyEvent::End).unwrap();
    assert_eq!(log.count("top:key:End"), 1);
    assert_eq!(log.count("below:key:End"), 0);
    assert_eq!(log.count("frame:key:End"), 0);

    man.destroy(top).unwrap();
    man.run_pending();
    log.clear();

    man.send_key_event(KeyEvent::End).unwrap();
    assert_eq!(log.count("below:key:End"), 1);

    // with only the (module-less) root left, delivery must fail cleanly
    man.destroy(below).unwrap();
    man.run_pending();
    assert!(matches!(
        man.send_key_event(KeyEvent::End),
        Err(GadgetError::InvalidState(_))
    ));
}

#[test]
fn indicator_follows_the_top_instances_policy() {
    let log = CallLog::default();
    let mut man = manager_with(&[], &log);
    let panel = PanelState::default();
    man.set_indicator_panel(Box::new(RecordingPanel(panel.clone())));
    {
        let log = log.clone();
        man.loader_mut().register_builtin("portrait-only", move || {
            let mut m = MockModule::basic("portrait-only", log.clone());
            m.opt.indicator = IndicatorPolicy::PortraitOnly;
            Box::new(m)
        });
    }

    man.load(None, "portrait-only", GadgetMode::Fullview, &Request::new(), cbs())
        .unwrap();
    // portrait at creation time, so the indicator comes up
    assert!(*panel.current.borrow());

    // rotation updates the top's policy immediately, before the broadcast
    man.send_event(GadgetEvent::RotateLandscape).unwrap();
    assert!(!*panel.current.borrow());

    man.send_event(GadgetEvent::RotatePortrait).unwrap();
    assert!(*panel.current.borrow());
}

#[test]
fn destroying_the_top_applies_the_next_policy_before_the_animation() {
    let log = CallLog::default();
    let mut man = manager_with(&[], &log);
    let panel = PanelState::default();
    man.set_indicator_panel(Box::new(RecordingPanel(panel.clone())));
    let engine = EngineState::default();
    man.set_engine(Box::new(StepEngine {
        state: engine.clone(),
        animate_all: false,
    }));
    for (name, policy) in [
        ("enabled", IndicatorPolicy::Enable),
        ("disabled", IndicatorPolicy::Disable),
    ] {
        let log = log.clone();
        man.loader_mut().register_builtin(name, move || {
            let mut m = MockModule::basic(name, log.clone());
            m.opt.indicator = policy;
            Box::new(m)
        });
    }

    let below = man
        .load(None, "enabled", GadgetMode::Fullview, &Request::new(), cbs())
        .unwrap();
    let top = man
        .load(None, "disabled", GadgetMode::Fullview, &Request::new(), cbs())
        .unwrap();
    assert!(!*panel.current.borrow(), "top disables the indicator");

    man.destroy(top).unwrap();

    // hide transition still running, yet the next top's policy already won
    assert_eq!(man.state(top), GadgetState::Destroying);
    assert!(*panel.current.borrow());
    assert_eq!(engine.hides.borrow().as_slice(), &[top]);

    man.notify_hide_finished(top);
    man.run_pending();
    assert_eq!(man.fv_top(), Some(below));
}

#[test]
fn conformant_is_fetched_lazily_and_cached() {
    let log = CallLog::default();
    let mut man = manager_with(&[], &log);
    assert!(man.conformant().is_none(), "no engine, no conformant");

    man.set_engine(Box::new(StepEngine {
        state: EngineState::default(),
        animate_all: false,
    }));
    let first = man.conformant().expect("engine provides the conformant");
    assert!(first.downcast_ref::<&str>().is_some());
    assert!(man.conformant().is_some());
}
