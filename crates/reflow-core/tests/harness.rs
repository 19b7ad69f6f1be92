//! End-to-end scenarios driven through the installable harness.

use std::cell::RefCell;

use reflow_core::{
    state_map, use_state, Component, ComponentCtx, Props, PropValue, RenderError, StateMap,
    StateSetter, VNode,
};
use reflow_testing::prelude::*;

thread_local! {
    static SETTER: RefCell<Option<StateSetter<i64>>> = RefCell::new(None);
}

fn counter(props: &Props) -> Result<VNode, RenderError> {
    let start = props.get("start").and_then(PropValue::as_int).unwrap_or(0);
    let (count, set) = use_state(|| start);
    SETTER.with(|slot| *slot.borrow_mut() = Some(set.clone()));
    Ok(VNode::element("div")
        .child(count.to_string())
        .child(VNode::element("button").on("click", move |_| set.update(|n| n + 1)))
        .build())
}

#[test]
fn counter_round_trip() {
    let mut harness = Harness::new();
    harness
        .show(VNode::function(counter, Props::new().attr("start", 5)))
        .unwrap();
    assert_eq!(harness.text(), "5");
    let button = harness.find("button").unwrap();
    harness.take_ops();

    harness.click(button);
    harness.settle().unwrap();

    assert_eq!(harness.text(), "6");
    assert_eq!(harness.find("button"), Some(button));
    let ops = harness.take_ops();
    assert_eq!(count_removes(&ops), 0);
    assert_eq!(count_creates(&ops), 0);
}

#[derive(Default)]
struct Guard;

impl Component for Guard {
    fn render(&self, ctx: &ComponentCtx) -> Result<VNode, RenderError> {
        if ctx
            .state_value("failed")
            .and_then(|v| v.as_bool())
            .unwrap_or(false)
        {
            return Ok(VNode::text("fallback"));
        }
        let props = ctx.props();
        Ok(VNode::fragment_slots(props.child_slots().to_vec()))
    }

    fn derive_state_from_error(&self, _error: &RenderError) -> Option<StateMap> {
        Some(state_map([("failed", true)]))
    }
}

fn faulty(_props: &Props) -> Result<VNode, RenderError> {
    Err(RenderError::msg("boom"))
}

#[test]
fn a_guarded_failure_stays_internal() {
    let mut harness = Harness::new();
    harness
        .show(VNode::stateful::<Guard>(
            Props::new().child(VNode::function(faulty, Props::new())),
        ))
        .unwrap();
    assert_eq!(harness.text(), "fallback");
}

fn keyed_list(keys: &[&str]) -> VNode {
    VNode::element("ul")
        .children(
            keys.iter()
                .map(|k| VNode::element("li").key(k).child(*k).build()),
        )
        .build()
}

#[test]
fn reordering_a_keyed_list_only_moves() {
    let mut harness = Harness::new();
    harness.show(keyed_list(&["a", "b", "c"])).unwrap();
    harness.take_ops();

    harness.show(keyed_list(&["c", "a", "b"])).unwrap();

    let ops = harness.take_ops();
    assert_eq!(count_moves(&ops), 2, "ops: {ops:?}");
    assert_eq!(count_creates(&ops), 0);
    assert_eq!(count_removes(&ops), 0);
    assert_eq!(harness.text(), "cab");
}
