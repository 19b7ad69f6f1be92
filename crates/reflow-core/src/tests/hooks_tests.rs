use std::cell::{Cell, RefCell};
use std::rc::Rc;
use std::sync::Arc;

use super::support::*;

use crate::hooks::{
    use_callback, use_effect, use_layout_effect, use_memo, use_reducer, use_ref, use_state,
    Cleanup, Deps, Dispatch, StateSetter,
};
use crate::{deps, HostOp, Props, RenderError, Runtime, VNode};

thread_local! {
    static LOG: RefCell<Vec<&'static str>> = RefCell::new(Vec::new());
    static SETTER: RefCell<Option<StateSetter<i64>>> = RefCell::new(None);
    static REF_IDS: RefCell<Vec<usize>> = RefCell::new(Vec::new());
    static COMPUTES: Cell<usize> = Cell::new(0);
    static DISPATCH: RefCell<Option<Dispatch<i64, i64>>> = RefCell::new(None);
}

fn log(entry: &'static str) {
    LOG.with(|log| log.borrow_mut().push(entry));
}

fn take_log() -> Vec<&'static str> {
    LOG.with(|log| std::mem::take(&mut *log.borrow_mut()))
}

fn capture_setter(set: &StateSetter<i64>) {
    SETTER.with(|slot| *slot.borrow_mut() = Some(set.clone()));
}

fn stored_setter() -> StateSetter<i64> {
    SETTER.with(|slot| slot.borrow().clone().expect("setter missing"))
}

fn ref_identity(_props: &Props) -> Result<VNode, RenderError> {
    let (n, set) = use_state(|| 0i64);
    capture_setter(&set);
    let slot = use_ref(|| 0u8);
    REF_IDS.with(|ids| ids.borrow_mut().push(Rc::as_ptr(&slot) as usize));
    Ok(VNode::text(n.to_string()))
}

#[test]
fn cells_keep_identity_across_renders() {
    REF_IDS.with(|ids| ids.borrow_mut().clear());
    let mut harness = Harness::new();
    harness
        .show(VNode::function(ref_identity, Props::new()))
        .unwrap();
    stored_setter().set(1);
    harness.settle().unwrap();
    stored_setter().set(2);
    harness.settle().unwrap();

    let ids = REF_IDS.with(|ids| ids.borrow().clone());
    assert_eq!(ids.len(), 3);
    assert!(ids.iter().all(|&p| p == ids[0]));
    assert_eq!(harness.text(), "2");
}

fn memoized(_props: &Props) -> Result<VNode, RenderError> {
    let (n, set) = use_state(|| 0i64);
    capture_setter(&set);
    let bucket = n / 10;
    let label = use_memo(deps![bucket], move || {
        COMPUTES.with(|c| c.set(c.get() + 1));
        format!("bucket {bucket}")
    });
    Ok(VNode::text(format!("{label}/{n}")))
}

#[test]
fn memo_recomputes_only_when_deps_change() {
    COMPUTES.with(|c| c.set(0));
    let mut harness = Harness::new();
    harness
        .show(VNode::function(memoized, Props::new()))
        .unwrap();
    assert_eq!(COMPUTES.with(|c| c.get()), 1);

    // same bucket: cached value
    stored_setter().set(3);
    harness.settle().unwrap();
    assert_eq!(COMPUTES.with(|c| c.get()), 1);
    assert_eq!(harness.text(), "bucket 0/3");

    // bucket changes: recompute
    stored_setter().set(12);
    harness.settle().unwrap();
    assert_eq!(COMPUTES.with(|c| c.get()), 2);
    assert_eq!(harness.text(), "bucket 1/12");
}

fn always_recomputing(_props: &Props) -> Result<VNode, RenderError> {
    let (n, set) = use_state(|| 0i64);
    capture_setter(&set);
    let value = use_memo(Deps::always(), || {
        COMPUTES.with(|c| c.set(c.get() + 1));
        0u8
    });
    let _ = value;
    Ok(VNode::text(n.to_string()))
}

#[test]
fn a_missing_dependency_list_recomputes_every_render() {
    COMPUTES.with(|c| c.set(0));
    let mut harness = Harness::new();
    harness
        .show(VNode::function(always_recomputing, Props::new()))
        .unwrap();
    stored_setter().set(1);
    harness.settle().unwrap();
    assert_eq!(COMPUTES.with(|c| c.get()), 2);
}

fn effectful(_props: &Props) -> Result<VNode, RenderError> {
    log("render");
    use_layout_effect(deps![], || {
        log("layout");
        Ok(Cleanup::none())
    });
    use_effect(deps![], || {
        log("paint");
        Ok(Cleanup::new(|| {
            log("paint-cleanup");
            Ok(())
        }))
    });
    Ok(VNode::text("fx"))
}

#[test]
fn layout_effects_run_at_commit_and_paint_effects_after_paint() {
    take_log();
    let mut harness = Harness::new();
    harness
        .mount(VNode::function(effectful, Props::new()))
        .unwrap();
    // commit has run, paint has not
    assert_eq!(take_log(), vec!["render", "layout"]);

    harness.renderer().flush_paint_effects().unwrap();
    assert_eq!(take_log(), vec!["paint"]);
}

fn tracking(_props: &Props) -> Result<VNode, RenderError> {
    let (n, set) = use_state(|| 0i64);
    capture_setter(&set);
    use_effect(deps![n], move || {
        log("effect");
        Ok(Cleanup::new(move || {
            log("cleanup");
            Ok(())
        }))
    });
    Ok(VNode::text(n.to_string()))
}

#[test]
fn an_effect_reruns_cleanup_first_when_deps_change() {
    take_log();
    let mut harness = Harness::new();
    harness
        .show(VNode::function(tracking, Props::new()))
        .unwrap();
    assert_eq!(take_log(), vec!["effect"]);

    stored_setter().set(1);
    harness.settle().unwrap();
    assert_eq!(take_log(), vec!["cleanup", "effect"]);
}

fn tracking_logged(_props: &Props) -> Result<VNode, RenderError> {
    log("render");
    let (n, set) = use_state(|| 0i64);
    capture_setter(&set);
    use_effect(deps![n], move || {
        log("effect");
        Ok(Cleanup::none())
    });
    Ok(VNode::text(n.to_string()))
}

#[test]
fn pending_paint_effects_run_before_the_next_render_of_the_instance() {
    take_log();
    let clock = Arc::new(TestClock::default());
    let runtime = Runtime::default();
    runtime.set_clock(clock);
    let mut harness = Harness::with_runtime(runtime);
    harness
        .mount(VNode::function(tracking_logged, Props::new()))
        .unwrap();
    assert_eq!(take_log(), vec!["render"]);

    // no paint flush happens; the re-render itself drains the pending
    // effect before user code runs again
    stored_setter().set(1);
    harness.renderer().flush().unwrap();

    assert_eq!(take_log(), vec!["effect", "render"]);
}

#[test]
fn paint_effects_flush_after_the_fallback_deadline() {
    take_log();
    let clock = Arc::new(TestClock::default());
    let runtime = Runtime::default();
    runtime.set_clock(clock.clone());
    let mut harness = Harness::with_runtime(runtime);
    harness
        .mount(VNode::function(effectful, Props::new()))
        .unwrap();
    take_log();

    clock.advance(crate::PAINT_FALLBACK_MS + 1);
    harness.renderer().flush().unwrap();

    assert_eq!(take_log(), vec!["paint"]);
}

fn doubly_effectful(_props: &Props) -> Result<VNode, RenderError> {
    use_effect(deps![], || {
        Ok(Cleanup::new(|| {
            log("first-cleanup");
            Ok(())
        }))
    });
    use_effect(deps![], || {
        Ok(Cleanup::new(|| {
            log("second-cleanup");
            Ok(())
        }))
    });
    Ok(VNode::text("fx"))
}

#[test]
fn unmount_runs_cleanups_once_in_registration_order() {
    take_log();
    let mut harness = Harness::new();
    harness
        .show(VNode::function(doubly_effectful, Props::new()))
        .unwrap();
    take_log();

    harness.renderer().unmount().unwrap();
    assert_eq!(take_log(), vec!["first-cleanup", "second-cleanup"]);

    // nothing left to run
    harness.renderer().flush_paint_effects().unwrap();
    assert_eq!(take_log(), Vec::<&str>::new());
}

fn failing_cleanup(_props: &Props) -> Result<VNode, RenderError> {
    use_effect(deps![], || {
        Ok(Cleanup::new(|| Err(RenderError::msg("cleanup boom"))))
    });
    use_effect(deps![], || {
        Ok(Cleanup::new(|| {
            log("survivor");
            Ok(())
        }))
    });
    Ok(VNode::text("fx"))
}

#[test]
fn a_failing_cleanup_does_not_stop_the_rest() {
    take_log();
    let mut harness = Harness::new();
    harness
        .show(VNode::function(failing_cleanup, Props::new()))
        .unwrap();
    take_log();

    let result = harness.renderer().unmount();
    assert!(result.is_err());
    assert_eq!(take_log(), vec!["survivor"]);
}

fn reduced(_props: &Props) -> Result<VNode, RenderError> {
    log("render");
    fn clamp_add(state: &i64, delta: i64) -> i64 {
        (state + delta).min(10)
    }
    let (n, dispatch) = use_reducer(clamp_add, || 9i64);
    DISPATCH.with(|slot| *slot.borrow_mut() = Some(dispatch.clone()));
    Ok(VNode::text(n.to_string()))
}

#[test]
fn reducer_dispatch_rerenders_only_on_change() {
    take_log();
    let mut harness = Harness::new();
    harness.show(VNode::function(reduced, Props::new())).unwrap();
    assert_eq!(take_log(), vec!["render"]);

    let dispatch = DISPATCH.with(|slot| slot.borrow().clone().unwrap());
    dispatch.dispatch(1);
    harness.settle().unwrap();
    assert_eq!(harness.text(), "10");
    assert_eq!(take_log(), vec!["render"]);

    // clamped: the reduced value equals the current one
    dispatch.dispatch(5);
    harness.settle().unwrap();
    assert_eq!(take_log(), Vec::<&str>::new());
}

fn stable_callback(_props: &Props) -> Result<VNode, RenderError> {
    let (n, set) = use_state(|| 0i64);
    capture_setter(&set);
    let on_click = use_callback(deps![], |_| {});
    Ok(VNode::element("button")
        .handler("click", on_click)
        .child(n.to_string())
        .build())
}

#[test]
fn a_stable_callback_keeps_the_host_listener_untouched() {
    let mut harness = Harness::new();
    harness
        .show(VNode::function(stable_callback, Props::new()))
        .unwrap();
    harness.take_ops();

    stored_setter().set(4);
    harness.settle().unwrap();

    let listener_ops = harness
        .take_ops()
        .into_iter()
        .filter(|op| matches!(op, HostOp::AddListener { .. } | HostOp::RemoveListener { .. }))
        .count();
    assert_eq!(listener_ops, 0);
}

#[cfg(debug_assertions)]
fn miscounting(_props: &Props) -> Result<VNode, RenderError> {
    let (n, set) = use_state(|| 0i64);
    capture_setter(&set);
    if n > 0 {
        let _ = use_ref(|| 0u8);
    }
    Ok(VNode::text(n.to_string()))
}

#[cfg(debug_assertions)]
#[test]
#[should_panic(expected = "different number of hook calls")]
fn a_changed_hook_count_is_flagged_in_debug_builds() {
    let mut harness = Harness::new();
    harness
        .show(VNode::function(miscounting, Props::new()))
        .unwrap();
    stored_setter().set(1);
    harness.settle().unwrap();
}
