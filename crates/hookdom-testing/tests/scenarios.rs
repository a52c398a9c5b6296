use std::cell::{Cell, RefCell};
use std::rc::Rc;

use hookdom_core::{HostId, SetState};
use hookdom_testing::prelude::*;

type Log = Rc<RefCell<Vec<String>>>;
type Slot<T> = Rc<RefCell<Option<T>>>;

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn tracked(log: &Log, name: &'static str) -> VNode {
    let log = Rc::clone(log);
    VNode::component(
        move |_| {
            let log = Rc::clone(&log);
            use_effect(deps![], move || {
                log.borrow_mut().push(format!("mount {name}"));
                Cleanup::new(move || log.borrow_mut().push(format!("cleanup {name}")))
            })?;
            Ok(VNode::element("i", Props::new().child(VNode::text(name))))
        },
        Props::new(),
    )
}

fn keyed_list(keys: &[&'static str]) -> VNode {
    VNode::element(
        "ul",
        Props::new().children(
            keys.iter()
                .map(|&key| VNode::element("li", Props::new().child(VNode::text(key))).keyed(key)),
        ),
    )
}

fn children(rule: &RenderTestRule, node: HostId) -> Vec<HostId> {
    rule.host().children(node).to_vec()
}

#[test]
fn mounting_a_paragraph_serializes_it() {
    init_logging();
    let mut rule = RenderTestRule::new();
    let staged = rule
        .stage(VNode::element("p", Props::new().child(VNode::text("Hello"))))
        .expect("stage")
        .kinds();
    assert_eq!(staged, vec![MutationKind::Place]);
    assert_eq!(rule.html(), "");

    rule.commit().expect("commit");
    assert_eq!(rule.html(), "<p>Hello</p>");
}

#[test]
fn text_update_targets_only_the_text_node() {
    init_logging();
    let mut rule = RenderTestRule::new();
    rule.set_content(VNode::element("p", Props::new().child(VNode::text("Hello"))))
        .expect("mount");
    let p = rule.root_node().expect("paragraph");
    let text = rule.host().children(p)[0];

    let records = rule
        .stage(VNode::element("p", Props::new().child(VNode::text("World"))))
        .expect("stage");
    assert_eq!(records.kinds(), vec![MutationKind::Update]);
    assert_eq!(records.records()[0].target(), text);

    rule.commit().expect("commit");
    assert_eq!(rule.html(), "<p>World</p>");
    assert_eq!(rule.root_node(), Some(p));
    assert_eq!(rule.host().children(p), [text]);
}

#[test]
fn keyed_reorder_keeps_node_identity() {
    init_logging();
    let mut rule = RenderTestRule::new();
    rule.set_content(keyed_list(&["a", "b", "c"])).expect("mount");
    let ul = rule.root_node().expect("list");
    let before = children(&rule, ul);

    rule.set_content(keyed_list(&["b", "a", "c"])).expect("reorder");
    let after = children(&rule, ul);
    assert_eq!(rule.html(), "<ul><li>b</li><li>a</li><li>c</li></ul>");
    assert_eq!(after[1], before[0]);
    assert_eq!(after, vec![before[1], before[0], before[2]]);
}

#[test]
fn three_synchronous_increments_render_once() {
    init_logging();
    let setter: Slot<SetState<i32>> = Slot::default();
    let renders = Rc::new(Cell::new(0));
    let (captured, counted) = (Rc::clone(&setter), Rc::clone(&renders));
    let counter = VNode::component(
        move |_| {
            counted.set(counted.get() + 1);
            let (count, set) = use_state(|| 0)?;
            *captured.borrow_mut() = Some(set);
            Ok(VNode::element("output", Props::new().child(VNode::text(count.to_string()))))
        },
        Props::new(),
    );
    let mut rule = RenderTestRule::new();
    rule.set_content(counter).expect("mount");
    let commits = rule.commit_count();

    let set = setter.borrow().clone().expect("setter");
    for _ in 0..3 {
        set.update(|prev| prev + 1);
    }
    assert_eq!(rule.flush_requests(), 1);
    assert_eq!(renders.get(), 1);

    rule.pump_until_idle().expect("flush");
    assert_eq!(renders.get(), 2);
    assert_eq!(rule.commit_count(), commits + 1);
    assert_eq!(rule.html(), "<output>3</output>");
}

#[test]
fn unmount_runs_pending_cleanup_before_removal() {
    init_logging();
    let log = Log::default();
    let mut rule = RenderTestRule::new();
    rule.set_content(tracked(&log, "timer")).expect("mount");
    rule.pump_until_idle().expect("effects");
    let node = rule.root_node().expect("host node");
    assert_eq!(*log.borrow(), ["mount timer"]);

    rule.root().reconcile(None).expect("stage unmount");
    assert_eq!(*log.borrow(), ["mount timer", "cleanup timer"]);
    assert_eq!(rule.host().parent(node), Some(rule.container()));

    rule.commit().expect("commit");
    assert!(!rule.host().contains(node));
    rule.pump_until_idle().expect("idle");
    assert_eq!(*log.borrow(), ["mount timer", "cleanup timer"]);
}

#[test]
fn state_hook_outside_render_is_a_context_error() {
    assert!(matches!(use_state(|| 0), Err(HookError::Context)));
    assert!(matches!(use_ref(|| 0), Err(HookError::Context)));
    assert_eq!(
        use_effect(deps![], Cleanup::none),
        Err(HookError::Context)
    );
}

#[test]
fn mismatched_pairs_replace_after_cleanups() {
    init_logging();
    let subtree = |log: &Log, tag: &'static str| {
        VNode::element(
            tag,
            Props::new()
                .attr("class", "old")
                .child(tracked(log, "first"))
                .child(VNode::element("b", Props::new().child(tracked(log, "second")))),
        )
    };
    let cases: Vec<(&str, Box<dyn Fn() -> VNode>)> = vec![
        ("tag", Box::new(|| VNode::element("section", Props::new().attr("class", "old")))),
        ("text", Box::new(|| VNode::text("plain"))),
    ];
    for (name, next) in cases {
        let log = Log::default();
        let mut rule = RenderTestRule::new();
        rule.set_content(subtree(&log, "div")).expect("mount");
        rule.pump_until_idle().expect("effects");

        let kinds = rule.stage(next()).expect("stage").kinds();
        assert_eq!(kinds, vec![MutationKind::Replace], "{name}");
        assert_eq!(
            *log.borrow(),
            ["mount first", "mount second", "cleanup first", "cleanup second"],
            "{name}"
        );
        rule.commit().expect("commit");
    }

    let mut rule = RenderTestRule::new();
    rule.set_content(VNode::text("plain")).expect("mount");
    let kinds = rule.stage(VNode::element("p", Props::new())).expect("stage").kinds();
    assert_eq!(kinds, vec![MutationKind::Replace]);
}

#[test]
fn unchanged_props_stage_no_updates() {
    init_logging();
    let card = || {
        VNode::element(
            "article",
            Props::new()
                .attr("class", "card")
                .attr("data-id", 7)
                .attr("hidden", false)
                .child(VNode::element("h2", Props::new().child(VNode::text("Title"))))
                .child(keyed_list(&["x", "y"])),
        )
    };
    let mut rule = RenderTestRule::new();
    rule.set_content(card()).expect("mount");
    for _ in 0..3 {
        let kinds = rule.stage(card()).expect("stage").kinds();
        assert!(!kinds.contains(&MutationKind::Update), "{kinds:?}");
        assert!(!kinds.contains(&MutationKind::Replace), "{kinds:?}");
        rule.commit().expect("commit");
    }
}

#[test]
fn every_permutation_of_four_keys_reuses_nodes() {
    init_logging();
    const KEYS: [&str; 4] = ["a", "b", "c", "d"];
    let mut rule = RenderTestRule::new();
    rule.set_content(keyed_list(&KEYS)).expect("mount");
    let ul = rule.root_node().expect("list");
    let original = children(&rule, ul);

    // Heap's algorithm, iterative
    let mut order = [0usize, 1, 2, 3];
    let mut counters = [0usize; 4];
    let mut visited = 1;
    let mut i = 0;
    while i < order.len() {
        if counters[i] < i {
            if i % 2 == 0 {
                order.swap(0, i);
            } else {
                order.swap(counters[i], i);
            }
            let keys: Vec<&'static str> = order.iter().map(|&index| KEYS[index]).collect();
            rule.set_content(keyed_list(&keys)).expect("permute");

            let expected: Vec<HostId> = order.iter().map(|&index| original[index]).collect();
            assert_eq!(children(&rule, ul), expected, "{keys:?}");
            let markup: String = keys.iter().map(|key| format!("<li>{key}</li>")).collect();
            assert_eq!(rule.host().inner_html(ul), markup);

            visited += 1;
            counters[i] += 1;
            i = 0;
        } else {
            counters[i] = 0;
            i += 1;
        }
    }
    assert_eq!(visited, 24);
    assert_eq!(rule.root_node(), Some(ul));
}

#[test]
fn queued_updates_fold_left_in_one_commit() {
    init_logging();
    let setter: Slot<SetState<Vec<u32>>> = Slot::default();
    let renders = Rc::new(Cell::new(0));
    let (captured, counted) = (Rc::clone(&setter), Rc::clone(&renders));
    let history = VNode::component(
        move |_| {
            counted.set(counted.get() + 1);
            let (items, set) = use_state(Vec::<u32>::new)?;
            *captured.borrow_mut() = Some(set);
            let joined: Vec<String> = items.iter().map(u32::to_string).collect();
            Ok(VNode::text(joined.join(",")))
        },
        Props::new(),
    );
    let mut rule = RenderTestRule::new();
    rule.set_content(history).expect("mount");
    let commits = rule.commit_count();

    let set = setter.borrow().clone().expect("setter");
    let mut expected: Vec<u32> = Vec::new();
    for n in 1..=6u32 {
        if n == 4 {
            set.set(vec![40]);
            expected = vec![40];
        } else {
            set.update(move |items| {
                let mut next = items.clone();
                next.push(n);
                next
            });
            expected.push(n);
        }
    }
    rule.pump_until_idle().expect("flush");

    assert_eq!(renders.get(), 2);
    assert_eq!(rule.commit_count(), commits + 1);
    let joined: Vec<String> = expected.iter().map(u32::to_string).collect();
    assert_eq!(rule.html(), joined.join(","));
}

#[test]
fn once_effect_survives_rerenders_until_unmount() {
    init_logging();
    let log = Log::default();
    let setter: Slot<SetState<u32>> = Slot::default();
    let (effect_log, captured) = (Rc::clone(&log), Rc::clone(&setter));
    let widget = VNode::component(
        move |_| {
            let (ticks, set) = use_state(|| 0u32)?;
            *captured.borrow_mut() = Some(set);
            let log = Rc::clone(&effect_log);
            use_effect(deps![], move || {
                log.borrow_mut().push("run".to_string());
                Cleanup::new(move || log.borrow_mut().push("cleanup".to_string()))
            })?;
            Ok(VNode::text(ticks.to_string()))
        },
        Props::new(),
    );
    let mut rule = RenderTestRule::new();
    rule.set_content(widget).expect("mount");
    rule.pump_until_idle().expect("effects");

    let set = setter.borrow().clone().expect("setter");
    for round in 1..=5u32 {
        set.set(round);
        rule.pump_until_idle().expect("state render");
        rule.rerender().expect("parent render");
        rule.pump_until_idle().expect("idle");
        assert_eq!(rule.html(), round.to_string());
        assert_eq!(*log.borrow(), ["run"]);
    }

    rule.unmount().expect("unmount");
    rule.pump_until_idle().expect("idle");
    assert_eq!(*log.borrow(), ["run", "cleanup"]);
}

#[test]
fn todo_list_driven_by_events() {
    init_logging();
    enum Action {
        Add(&'static str),
        Toggle(usize),
    }
    #[derive(Clone)]
    struct Todo {
        id: usize,
        label: &'static str,
        done: bool,
    }

    fn todo_app(_: &Props) -> Element {
        let (todos, dispatch) = use_reducer(
            |todos: &Vec<Todo>, action: Action| {
                let mut next = todos.clone();
                match action {
                    Action::Add(label) => next.push(Todo {
                        id: next.len(),
                        label,
                        done: false,
                    }),
                    Action::Toggle(id) => {
                        if let Some(todo) = next.iter_mut().find(|todo| todo.id == id) {
                            todo.done = !todo.done;
                        }
                    }
                }
                next
            },
            Vec::new,
        )?;
        let adder = dispatch.clone();
        let rows = todos.iter().map(|todo| {
            let toggle = dispatch.clone();
            let id = todo.id;
            VNode::element(
                "li",
                Props::new()
                    .attr("class", if todo.done { "done" } else { "open" })
                    .on("click", move |_| toggle.dispatch(Action::Toggle(id)))
                    .child(VNode::text(todo.label)),
            )
            .keyed(todo.id)
        });
        Ok(VNode::element(
            "div",
            Props::new()
                .child(VNode::element(
                    "button",
                    Props::new().on("click", move |event: &Event| {
                        let label = match event.detail.as_ref().and_then(|detail| detail.as_str()) {
                            Some("milk") => "milk",
                            _ => "bread",
                        };
                        adder.dispatch(Action::Add(label));
                    }),
                ))
                .child(VNode::element("ul", Props::new().children(rows))),
        ))
    }

    let mut rule = RenderTestRule::new();
    rule.set_content(VNode::component(todo_app, Props::new())).expect("mount");
    let button = rule.find_by_tag("button")[0];

    assert!(rule.dispatch(button, Event::new("click")));
    assert!(rule.dispatch(button, Event::new("click").with_detail("milk")));
    rule.pump_until_idle().expect("adds");
    assert_eq!(
        rule.host().inner_html(rule.find_by_tag("ul")[0]),
        "<li class=\"open\">bread</li><li class=\"open\">milk</li>"
    );

    let rows = rule.find_by_tag("li");
    let text = rule.host().children(rows[1])[0];
    // events bubble from the text node to the row handler
    assert!(rule.dispatch(text, Event::new("click")));
    rule.pump_until_idle().expect("toggle");
    assert_eq!(rule.find_by_tag("li"), rows);
    assert_eq!(
        rule.host().attribute(rows[1], "class").and_then(|value| value.as_str()),
        Some("done")
    );
    assert!(!rule.dispatch(text, Event::new("keydown")));
}
