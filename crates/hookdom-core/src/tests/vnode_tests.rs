use super::*;

fn label(_props: &Props) -> Element {
    Ok(VNode::text("label"))
}

fn button(_props: &Props) -> Element {
    Ok(VNode::text("button"))
}

#[test]
fn component_identity_follows_render_function() {
    let a = Component::new(label);
    let b = Component::new(label);
    let c = Component::new(button);
    assert!(a.same_type(&b));
    assert!(!a.same_type(&c));
    assert!(a.name().ends_with("label"));
}

#[test]
fn keyed_keeps_kind_and_props() {
    let node = VNode::element("li", Props::new().attr("class", "row")).keyed("a");
    assert_eq!(node.key(), Some(&Key::from("a")));
    assert!(matches!(node.kind(), VNodeKind::Element(tag) if &**tag == "li"));
    assert_eq!(node.props().get("class").and_then(PropValue::as_str), Some("row"));
}

#[test]
fn keyed_on_shared_node_leaves_original_untouched() {
    let original = VNode::text("x");
    let copy = original.clone();
    let keyed = copy.keyed(7);
    assert_eq!(original.key(), None);
    assert_eq!(keyed.key(), Some(&Key::Int(7)));
}

#[test]
fn host_type_matches_on_tag_and_text() {
    let div = VNode::element("div", Props::new());
    let other_div = VNode::element("div", Props::new().attr("id", "x"));
    let span = VNode::element("span", Props::new());
    assert!(div.same_host_type(&other_div));
    assert!(!div.same_host_type(&span));
    assert!(VNode::text("a").same_host_type(&VNode::text("b")));
    assert!(!VNode::text("a").same_host_type(&div));
    let component = VNode::component(label, Props::new());
    assert!(!component.same_host_type(&component.clone()));
}

#[test]
fn float_props_compare_by_bits() {
    assert_eq!(PropValue::Float(f64::NAN), PropValue::Float(f64::NAN));
    assert_ne!(PropValue::Float(0.0), PropValue::Float(-0.0));
    assert_ne!(PropValue::Int(1), PropValue::Float(1.0));
}

#[test]
fn handlers_compare_by_identity() {
    let handler = EventHandler::new(|_| {});
    let same = handler.clone();
    let other = EventHandler::new(|_| {});
    assert_eq!(PropValue::from(handler.clone()), PropValue::from(same));
    assert_ne!(PropValue::from(handler), PropValue::from(other));
}

#[test]
fn attribute_equality_ignores_children_and_order() {
    let a = Props::new()
        .attr("id", "x")
        .attr("hidden", true)
        .child(VNode::text("one"));
    let b = Props::new().attr("hidden", true).attr("id", "x");
    assert!(a.same_attributes(&b));
    assert!(!a.same_attributes(&b.clone().attr("id", "y")));
}

#[test]
fn opaque_values_downcast() {
    let value = PropValue::Opaque(std::rc::Rc::new(41u32));
    assert_eq!(value.downcast_ref::<u32>(), Some(&41));
    assert_eq!(value.downcast_ref::<i32>(), None);
}

#[test]
fn large_indices_keep_distinct_keys() {
    assert_eq!(Key::from(3usize), Key::Int(3));
    let top = Key::from(usize::MAX);
    assert!(matches!(&top, Key::Str(value) if **value == *usize::MAX.to_string()));
    assert_ne!(top, Key::from(usize::MAX - 1));
    assert_ne!(top, Key::Int(-1));
}
