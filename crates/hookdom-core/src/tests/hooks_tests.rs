use super::*;
use crate::runtime::Runtime;
use crate::vnode::{Component, Element, Props, VNodeKind};
use slotmap::SlotMap;
use std::cell::Cell;

struct Harness {
    runtime: Runtime,
    id: InstanceId,
    instance: ComponentInstance,
}

impl Harness {
    fn new<F>(render: F) -> Self
    where
        F: Fn(&Props) -> Element + 'static,
    {
        let mut ids: SlotMap<InstanceId, ()> = SlotMap::with_key();
        let mut mounts: SlotMap<crate::instance::MountId, ()> = SlotMap::with_key();
        let instance =
            ComponentInstance::new(Component::new(render), Props::new(), 0, mounts.insert(()), 0);
        Self {
            runtime: Runtime::default(),
            id: ids.insert(()),
            instance,
        }
    }

    fn render(&mut self) -> Result<RenderOutput, HookError> {
        render_instance(self.id, &mut self.instance, &self.runtime.handle())
    }

    /// Renders, treats the output as committed and runs its effects right away.
    fn render_text(&mut self) -> String {
        let output = self.render().expect("render");
        for mut effect in output.effects {
            effect.record_deps();
            effect.run();
        }
        text_of(&output.node)
    }
}

fn text_of(node: &VNode) -> String {
    match node.kind() {
        VNodeKind::Text(value) => value.to_string(),
        other => panic!("expected text, got {other:?}"),
    }
}

#[test]
fn hooks_outside_render_fail_with_context_error() {
    assert_eq!(use_state(|| 0).err(), Some(HookError::Context));
    assert_eq!(use_ref(|| 0).err(), Some(HookError::Context));
    assert_eq!(
        use_effect(Deps::always(), Cleanup::none).err(),
        Some(HookError::Context)
    );
    assert_eq!(current_instance(), Err(HookError::Context));
}

#[test]
fn context_is_cleared_after_render_even_on_error() {
    let mut harness = Harness::new(|_| {
        current_instance()?;
        Err(HookError::Context)
    });
    assert!(harness.render().is_err());
    assert_eq!(current_instance(), Err(HookError::Context));
}

#[test]
fn queued_state_updates_apply_in_call_order() {
    let setter: Rc<RefCell<Option<SetState<i32>>>> = Rc::default();
    let captured = Rc::clone(&setter);
    let mut harness = Harness::new(move |_| {
        let (value, set) = use_state(|| 1)?;
        *captured.borrow_mut() = Some(set);
        Ok(VNode::text(value.to_string()))
    });
    assert_eq!(harness.render_text(), "1");

    let set = setter.borrow().clone().expect("setter captured");
    set.update(|value| value + 1);
    set.set(10);
    set.update(|value| value * 3);
    assert!(harness.runtime.has_dirty());
    assert_eq!(harness.runtime.take_dirty(), vec![harness.id]);
    assert_eq!(harness.render_text(), "30");
}

#[test]
fn setter_is_stable_across_renders() {
    let seen: Rc<RefCell<Vec<SetState<u8>>>> = Rc::default();
    let captured = Rc::clone(&seen);
    let mut harness = Harness::new(move |_| {
        let (_, set) = use_state(|| 0u8)?;
        captured.borrow_mut().push(set);
        Ok(VNode::text(""))
    });
    harness.render_text();
    harness.render_text();
    let seen = seen.borrow();
    assert_eq!(seen[0], seen[1]);
}

#[test]
fn setter_after_teardown_is_ignored() {
    let setter: Rc<RefCell<Option<SetState<i32>>>> = Rc::default();
    let captured = Rc::clone(&setter);
    let mut harness = Harness::new(move |_| {
        let (_, set) = use_state(|| 0)?;
        *captured.borrow_mut() = Some(set);
        Ok(VNode::text(""))
    });
    harness.render_text();
    harness.instance.teardown();

    let set = setter.borrow().clone().expect("setter captured");
    set.set(5);
    assert!(!harness.runtime.has_dirty());
}

#[test]
fn reducer_folds_actions() {
    enum Action {
        Add(i32),
        Reset,
    }
    let dispatch: Rc<RefCell<Option<Dispatch<Action>>>> = Rc::default();
    let captured = Rc::clone(&dispatch);
    let mut harness = Harness::new(move |_| {
        let (total, send) = use_reducer(
            |total: &i32, action: Action| match action {
                Action::Add(amount) => total + amount,
                Action::Reset => 0,
            },
            || 0,
        )?;
        *captured.borrow_mut() = Some(send);
        Ok(VNode::text(total.to_string()))
    });
    assert_eq!(harness.render_text(), "0");

    let send = dispatch.borrow().clone().expect("dispatch captured");
    send.dispatch(Action::Add(4));
    send.dispatch(Action::Reset);
    send.dispatch(Action::Add(2));
    send.dispatch(Action::Add(3));
    assert_eq!(harness.render_text(), "5");
}

#[test]
fn changing_hook_count_is_an_order_error() {
    let extra = Rc::new(Cell::new(false));
    let toggle = Rc::clone(&extra);
    let mut harness = Harness::new(move |_| {
        use_state(|| 0)?;
        if toggle.get() {
            use_ref(|| ())?;
        }
        Ok(VNode::text(""))
    });
    harness.render_text();
    extra.set(true);
    assert_eq!(
        harness.render().err(),
        Some(HookError::Order {
            expected: 1,
            found: 2
        })
    );
}

#[test]
fn swapping_hook_kinds_is_a_slot_error() {
    let swapped = Rc::new(Cell::new(false));
    let toggle = Rc::clone(&swapped);
    let mut harness = Harness::new(move |_| {
        if toggle.get() {
            use_ref(|| 0)?;
        } else {
            use_state(|| 0)?;
        }
        Ok(VNode::text(""))
    });
    harness.render_text();
    swapped.set(true);
    assert_eq!(
        harness.render().err(),
        Some(HookError::SlotKind {
            index: 0,
            expected: "use_ref",
            found: "use_state"
        })
    );
}

#[test]
fn slots_survive_a_failed_render() {
    let fail = Rc::new(Cell::new(false));
    let toggle = Rc::clone(&fail);
    let mut harness = Harness::new(move |_| {
        let counter = use_ref(|| 0)?;
        counter.with_mut(|count| *count += 1);
        if toggle.get() {
            return Err(HookError::Context);
        }
        Ok(VNode::text(counter.get().to_string()))
    });
    assert_eq!(harness.render_text(), "1");
    fail.set(true);
    assert!(harness.render().is_err());
    fail.set(false);
    assert_eq!(harness.render_text(), "3");
}

#[test]
fn effect_with_empty_deps_runs_once() {
    let runs = Rc::new(Cell::new(0));
    let cleanups = Rc::new(Cell::new(0));
    let (r, c) = (Rc::clone(&runs), Rc::clone(&cleanups));
    let mut harness = Harness::new(move |_| {
        let (r, c) = (Rc::clone(&r), Rc::clone(&c));
        use_effect(deps![], move || {
            r.set(r.get() + 1);
            Cleanup::new(move || c.set(c.get() + 1))
        })?;
        Ok(VNode::text(""))
    });
    for _ in 0..4 {
        harness.render_text();
    }
    assert_eq!(runs.get(), 1);
    assert_eq!(cleanups.get(), 0);

    harness.instance.teardown();
    harness.instance.teardown();
    assert_eq!(cleanups.get(), 1);
}

#[test]
fn effect_reruns_when_deps_change_and_cleans_up_first() {
    let log: Rc<RefCell<Vec<String>>> = Rc::default();
    let input = Rc::new(Cell::new(1));
    let (captured_log, captured_input) = (Rc::clone(&log), Rc::clone(&input));
    let mut harness = Harness::new(move |_| {
        let value = captured_input.get();
        let log = Rc::clone(&captured_log);
        use_effect(deps![value], move || {
            log.borrow_mut().push(format!("run {value}"));
            let log = Rc::clone(&log);
            Cleanup::new(move || log.borrow_mut().push(format!("cleanup {value}")))
        })?;
        Ok(VNode::text(""))
    });
    harness.render_text();
    harness.render_text();
    input.set(2);
    harness.render_text();
    assert_eq!(*log.borrow(), ["run 1", "cleanup 1", "run 2"]);
}

#[test]
fn uncommitted_effect_keeps_previous_deps() {
    let log: Rc<RefCell<Vec<i32>>> = Rc::default();
    let input = Rc::new(Cell::new(0));
    let (captured_log, captured_input) = (Rc::clone(&log), Rc::clone(&input));
    let mut harness = Harness::new(move |_| {
        let value = captured_input.get();
        let log = Rc::clone(&captured_log);
        use_effect(deps![value], move || {
            log.borrow_mut().push(value);
            Cleanup::none()
        })?;
        Ok(VNode::text(""))
    });
    harness.render_text();

    input.set(1);
    let dropped = harness.render().expect("render");
    assert_eq!(dropped.effects.len(), 1);
    drop(dropped);

    harness.render_text();
    harness.render_text();
    assert_eq!(*log.borrow(), [0, 1]);
}

#[test]
fn always_deps_run_every_render() {
    let runs = Rc::new(Cell::new(0));
    let captured = Rc::clone(&runs);
    let mut harness = Harness::new(move |_| {
        let runs = Rc::clone(&captured);
        use_effect(Deps::always(), move || {
            runs.set(runs.get() + 1);
            Cleanup::none()
        })?;
        Ok(VNode::text(""))
    });
    for _ in 0..3 {
        harness.render_text();
    }
    assert_eq!(runs.get(), 3);
}

#[test]
fn pending_effect_of_torn_down_instance_is_skipped() {
    let runs = Rc::new(Cell::new(0));
    let captured = Rc::clone(&runs);
    let mut harness = Harness::new(move |_| {
        let runs = Rc::clone(&captured);
        use_effect(deps![], move || {
            runs.set(runs.get() + 1);
            Cleanup::none()
        })?;
        Ok(VNode::text(""))
    });
    let output = harness.render().expect("render");
    harness.instance.teardown();
    for effect in output.effects {
        assert!(!effect.run());
    }
    assert_eq!(runs.get(), 0);
}

#[test]
fn deps_compare_by_length_value_and_type() {
    assert!(deps![1, "a"].changed_from(&deps![1]));
    assert!(!deps![1, "a"].changed_from(&deps![1, "a"]));
    assert!(deps![1u8].changed_from(&deps![1i32]));
    assert!(deps![2].changed_from(&deps![1]));
    assert!(Deps::always().changed_from(&Deps::always()));
    assert!(!Deps::once().changed_from(&deps![]));
}

#[test]
fn memo_recomputes_only_on_change() {
    let computed = Rc::new(Cell::new(0));
    let input = Rc::new(Cell::new(2));
    let (c, i) = (Rc::clone(&computed), Rc::clone(&input));
    let mut harness = Harness::new(move |_| {
        let base = i.get();
        let c = Rc::clone(&c);
        let squared = use_memo(deps![base], move || {
            c.set(c.get() + 1);
            base * base
        })?;
        Ok(VNode::text(squared.to_string()))
    });
    assert_eq!(harness.render_text(), "4");
    assert_eq!(harness.render_text(), "4");
    input.set(3);
    assert_eq!(harness.render_text(), "9");
    assert_eq!(computed.get(), 2);
}

#[test]
fn callback_identity_is_kept_while_deps_match() {
    let handlers: Rc<RefCell<Vec<EventHandler>>> = Rc::default();
    let captured = Rc::clone(&handlers);
    let mut harness = Harness::new(move |_| {
        let handler = use_callback(deps![], |_| {})?;
        captured.borrow_mut().push(handler);
        Ok(VNode::text(""))
    });
    harness.render_text();
    harness.render_text();
    let handlers = handlers.borrow();
    assert!(handlers[0].ptr_eq(&handlers[1]));
}

#[test]
fn ref_is_identical_and_never_marks_dirty() {
    let refs: Rc<RefCell<Vec<Ref<String>>>> = Rc::default();
    let captured = Rc::clone(&refs);
    let mut harness = Harness::new(move |_| {
        let note = use_ref(String::new)?;
        note.with_mut(|note| note.push('x'));
        captured.borrow_mut().push(note);
        Ok(VNode::text(""))
    });
    harness.render_text();
    harness.render_text();
    let refs = refs.borrow();
    assert!(refs[0].ptr_eq(&refs[1]));
    assert_eq!(refs[1].get(), "xx");
    refs[0].set("reset".into());
    assert!(!harness.runtime.has_dirty());
}
