use std::cell::{Cell, RefCell};
use std::collections::HashMap;

use super::support::*;

use crate::hooks::{use_state, StateSetter};
use crate::{
    Component, ComponentCtx, EventHandler, HostAdapter, HostId, HostOp, Props, PropValue,
    RenderError, VNode,
};

fn keyed_item(tag: &str, key: &str, text: &str) -> VNode {
    VNode::element(tag).key(key).child(text).build()
}

fn list(keys: &[&str]) -> VNode {
    VNode::element("ul")
        .children(keys.iter().map(|k| keyed_item("li", k, k)))
        .build()
}

fn child_ids(harness: &mut Harness, parent: HostId) -> Vec<HostId> {
    HostAdapter::children(harness.renderer().host(), parent).unwrap()
}

#[test]
fn keyed_permutation_produces_only_moves() {
    let mut harness = Harness::new();
    harness.show(list(&["a", "b", "c"])).unwrap();
    harness.take_ops();

    harness.show(list(&["c", "a", "b"])).unwrap();

    let ops = harness.take_ops();
    assert_eq!(count_moves(&ops), 2, "ops: {ops:?}");
    assert_eq!(count_removes(&ops), 0);
    assert_eq!(count_creates(&ops), 0);
    assert_eq!(count_inserts(&ops), 0);
    assert_eq!(harness.text(), "cab");
}

#[test]
fn removing_one_keyed_child_leaves_the_rest_untouched() {
    let mut harness = Harness::new();
    harness.show(list(&["x", "y", "z"])).unwrap();
    let ul = harness.find("ul").unwrap();
    let before = child_ids(&mut harness, ul);
    harness.take_ops();

    harness.show(list(&["x", "z"])).unwrap();

    let ops = harness.take_ops();
    assert_eq!(count_removes(&ops), 1, "ops: {ops:?}");
    assert_eq!(count_moves(&ops), 0);
    assert_eq!(count_creates(&ops), 0);
    let after = child_ids(&mut harness, ul);
    assert_eq!(after, vec![before[0], before[2]]);
}

thread_local! {
    static UNMOUNTS: RefCell<Vec<String>> = RefCell::new(Vec::new());
}

#[derive(Default)]
struct Tracked;

impl Component for Tracked {
    fn render(&self, ctx: &ComponentCtx) -> Result<VNode, RenderError> {
        let props = ctx.props();
        let name = props
            .get("name")
            .and_then(PropValue::as_str)
            .unwrap_or("?")
            .to_owned();
        Ok(VNode::text(name))
    }

    fn will_unmount(&mut self) -> Result<(), RenderError> {
        UNMOUNTS.with(|log| log.borrow_mut().push("tracked".to_owned()));
        Ok(())
    }
}

fn tracked_list(names: &[&str]) -> VNode {
    VNode::element("div")
        .children(names.iter().map(|n| {
            VNode::stateful::<Tracked>(Props::new().attr("name", *n)).with_key(*n)
        }))
        .build()
}

#[test]
fn removing_a_keyed_component_unmounts_exactly_that_instance() {
    UNMOUNTS.with(|log| log.borrow_mut().clear());
    let mut harness = Harness::new();
    harness.show(tracked_list(&["one", "two", "three"])).unwrap();
    assert_eq!(harness.text(), "onetwothree");

    harness.show(tracked_list(&["one", "three"])).unwrap();

    assert_eq!(UNMOUNTS.with(|log| log.borrow().len()), 1);
    assert_eq!(harness.text(), "onethree");
}

thread_local! {
    static ITEM_SETTERS: RefCell<HashMap<String, StateSetter<i64>>> =
        RefCell::new(HashMap::new());
}

fn item(props: &Props) -> Result<VNode, RenderError> {
    let name = props
        .get("name")
        .and_then(PropValue::as_str)
        .unwrap_or("?")
        .to_owned();
    let (value, set) = use_state(|| 0i64);
    ITEM_SETTERS.with(|slots| slots.borrow_mut().insert(name.clone(), set));
    Ok(VNode::text(format!("{name}={value};")))
}

fn item_list(names: &[&str]) -> VNode {
    VNode::element("div")
        .children(
            names
                .iter()
                .map(|n| VNode::function(item, Props::new().attr("name", *n)).with_key(*n)),
        )
        .build()
}

#[test]
fn hook_state_survives_a_keyed_reorder() {
    ITEM_SETTERS.with(|slots| slots.borrow_mut().clear());
    let mut harness = Harness::new();
    harness.show(item_list(&["a", "b"])).unwrap();

    ITEM_SETTERS.with(|slots| slots.borrow()["b"].set(9));
    harness.settle().unwrap();
    assert_eq!(harness.text(), "a=0;b=9;");

    harness.show(item_list(&["b", "a"])).unwrap();
    harness.settle().unwrap();

    assert_eq!(harness.text(), "b=9;a=0;");
}

#[test]
fn a_hole_keeps_sibling_identity() {
    let mut harness = Harness::new();
    let before = VNode::element("ul")
        .child(keyed_item("li", "a", "a"))
        .hole()
        .child(keyed_item("li", "c", "c"))
        .build();
    harness.show(before).unwrap();
    let ul = harness.find("ul").unwrap();
    let initial = child_ids(&mut harness, ul);
    assert_eq!(initial.len(), 2);
    harness.take_ops();

    let after = VNode::element("ul")
        .child(keyed_item("li", "a", "a"))
        .child(keyed_item("li", "b", "b"))
        .child(keyed_item("li", "c", "c"))
        .build();
    harness.show(after).unwrap();

    let ops = harness.take_ops();
    assert_eq!(count_creates(&ops), 2, "ops: {ops:?}");
    assert_eq!(count_removes(&ops), 0);
    let current = child_ids(&mut harness, ul);
    assert_eq!(current.len(), 3);
    // the child occupying the slot after the hole was not remounted
    assert_eq!(current[0], initial[0]);
    assert_eq!(current[2], initial[1]);
    assert_eq!(harness.text(), "abc");
}

#[test]
fn an_unchanged_description_skips_the_subtree_entirely() {
    let mut harness = Harness::new();
    let cached = VNode::element("div").child("cached").build();
    harness
        .show(VNode::element("section").child(cached.clone()).build())
        .unwrap();
    harness.take_ops();

    harness
        .show(VNode::element("section").child(cached).build())
        .unwrap();

    assert!(harness.take_ops().is_empty());
}

#[test]
fn text_changes_update_in_place() {
    let mut harness = Harness::new();
    harness
        .show(VNode::element("p").child("one").build())
        .unwrap();
    harness.take_ops();

    harness
        .show(VNode::element("p").child("two").build())
        .unwrap();

    let ops = harness.take_ops();
    assert_eq!(ops.len(), 1, "ops: {ops:?}");
    assert!(matches!(ops[0], HostOp::SetText { .. }));
    assert_eq!(harness.text(), "two");
}

#[test]
fn attribute_reconciliation_adds_removes_and_updates() {
    let mut harness = Harness::new();
    harness
        .show(
            VNode::element("div")
                .attr("id", "fixed")
                .attr("class", "a")
                .style("color", "red")
                .style("margin", "1px")
                .build(),
        )
        .unwrap();
    let div = harness.find("div").unwrap();
    harness.take_ops();

    harness
        .show(
            VNode::element("div")
                .attr("id", "fixed")
                .attr("class", "b")
                .attr("title", "hey")
                .style("color", "blue")
                .style("margin", "1px")
                .build(),
        )
        .unwrap();

    let ops = harness.take_ops();
    let attr_sets = ops
        .iter()
        .filter(|op| matches!(op, HostOp::SetAttribute { .. }))
        .count();
    let style_sets: Vec<_> = ops
        .iter()
        .filter_map(|op| match op {
            HostOp::SetStyle { property, .. } => Some(property.clone()),
            _ => None,
        })
        .collect();
    // id unchanged: only class and title written; only the changed
    // style property touched
    assert_eq!(attr_sets, 2, "ops: {ops:?}");
    assert_eq!(style_sets, vec![std::rc::Rc::from("color")]);
    assert_eq!(
        harness.renderer().host().attr(div, "title"),
        Some(PropValue::from("hey"))
    );

    harness
        .show(VNode::element("div").attr("id", "fixed").build())
        .unwrap();
    let ops = harness.take_ops();
    let removed = ops
        .iter()
        .filter(|op| matches!(op, HostOp::RemoveAttribute { .. }))
        .count();
    assert_eq!(removed, 3, "ops: {ops:?}");
}

#[test]
fn an_unchanged_listener_is_left_alone() {
    let hits = std::rc::Rc::new(Cell::new(0usize));
    let hits_in = hits.clone();
    let handler = EventHandler::new(move |_| hits_in.set(hits_in.get() + 1));

    let mut harness = Harness::new();
    harness
        .show(
            VNode::element("button")
                .handler("click", handler.clone())
                .child("go")
                .build(),
        )
        .unwrap();
    harness.take_ops();

    harness
        .show(
            VNode::element("button")
                .handler("click", handler)
                .child("go")
                .build(),
        )
        .unwrap();

    let listener_ops = harness
        .take_ops()
        .into_iter()
        .filter(|op| matches!(op, HostOp::AddListener { .. } | HostOp::RemoveListener { .. }))
        .count();
    assert_eq!(listener_ops, 0);

    let button = harness.find("button").unwrap();
    harness.click(button);
    assert_eq!(hits.get(), 1);
}

fn pair(_props: &Props) -> Result<VNode, RenderError> {
    Ok(VNode::fragment([
        VNode::element("em").child("first").build(),
        VNode::element("strong").child("second").build(),
    ]))
}

#[test]
fn multi_host_component_output_keeps_following_siblings_in_order() {
    let mut harness = Harness::new();
    harness
        .show(
            VNode::element("main")
                .child(VNode::function(pair, Props::new()))
                .child(VNode::element("footer").child("tail").build())
                .build(),
        )
        .unwrap();

    let main = harness.find("main").unwrap();
    let children = child_ids(&mut harness, main);
    let tags: Vec<_> = children
        .iter()
        .map(|&id| harness.renderer().host().tag_of(id).unwrap().to_string())
        .collect();
    assert_eq!(tags, vec!["em", "strong", "footer"]);
    assert_eq!(harness.text(), "firstsecondtail");
}

#[test]
fn hydration_adopts_existing_markup() {
    let mut harness = Harness::new();
    let container = harness.container();
    let (div, _text, extra) = {
        let host = harness.renderer().host_mut();
        let div = host.create_element("div", None).unwrap();
        let text = host.create_text("hello").unwrap();
        host.append(div, text).unwrap();
        host.append(container, div).unwrap();
        let extra = host.create_element("span", None).unwrap();
        host.append(container, extra).unwrap();
        host.take_ops();
        (div, text, extra)
    };

    harness
        .hydrate(
            VNode::element("div")
                .on("click", |_| {})
                .child("hello")
                .build(),
        )
        .unwrap();

    let ops = harness.take_ops();
    assert_eq!(count_creates(&ops), 0, "ops: {ops:?}");
    assert!(harness.renderer().host().has_listener(div, "click"));
    // the unclaimed pre-existing sibling is gone
    let children = child_ids(&mut harness, container);
    assert_eq!(children, vec![div]);
    assert!(!children.contains(&extra));
    assert_eq!(harness.text(), "hello");
}

#[test]
fn hydration_corrects_mismatched_text() {
    let mut harness = Harness::new();
    let container = harness.container();
    {
        let host = harness.renderer().host_mut();
        let div = host.create_element("div", None).unwrap();
        let text = host.create_text("stale").unwrap();
        host.append(div, text).unwrap();
        host.append(container, div).unwrap();
        host.take_ops();
    }

    harness
        .hydrate(VNode::element("div").child("fresh").build())
        .unwrap();

    assert_eq!(harness.text(), "fresh");
    let ops = harness.take_ops();
    assert_eq!(count_creates(&ops), 0, "ops: {ops:?}");
}
