//! Hook slot runtime.
//!
//! Hooks address per-instance storage by call order. The engine installs a
//! frame for exactly one instance around each component render
//! ([`CurrentInstance::set`] / [`CurrentInstance::clear`]); a hook called with
//! no frame installed fails with [`HookError::Context`], and a render whose hook
//! count differs from the first one fails with [`HookError::Order`].

use std::any::{type_name, Any};
use std::cell::RefCell;
use std::collections::VecDeque;
use std::fmt;
use std::mem;
use std::rc::{Rc, Weak};

use crate::instance::{ComponentInstance, InstanceId};
use crate::runtime::RuntimeHandle;
use crate::vnode::{Event, EventHandler, VNode};
use crate::HookError;

thread_local! {
    static HOOK_FRAMES: RefCell<Vec<HookFrame>> = const { RefCell::new(Vec::new()) };
}

struct HookFrame {
    instance: InstanceId,
    runtime: RuntimeHandle,
    slots: Vec<HookSlot>,
    cursor: usize,
    effects: Vec<PassiveEffect>,
}

/// One ordered unit of per-instance state.
#[derive(Clone)]
pub(crate) enum HookSlot {
    State(Rc<dyn Any>),
    Reducer(Rc<dyn Any>),
    Effect(Rc<RefCell<EffectCell>>),
    Ref(Rc<dyn Any>),
    Memo(Rc<dyn Any>),
}

impl HookSlot {
    fn kind_name(&self) -> &'static str {
        match self {
            HookSlot::State(_) => "use_state",
            HookSlot::Reducer(_) => "use_reducer",
            HookSlot::Effect(_) => "use_effect",
            HookSlot::Ref(_) => "use_ref",
            HookSlot::Memo(_) => "use_memo",
        }
    }
}

struct SlotClaim {
    index: usize,
    existing: Option<HookSlot>,
    instance: InstanceId,
    runtime: RuntimeHandle,
}

impl SlotClaim {
    fn mismatch(&self, expected: &'static str, found: &'static str) -> HookError {
        HookError::SlotKind {
            index: self.index,
            expected,
            found,
        }
    }
}

fn claim_slot() -> Result<SlotClaim, HookError> {
    HOOK_FRAMES.with(|frames| {
        let mut frames = frames.borrow_mut();
        let frame = frames.last_mut().ok_or(HookError::Context)?;
        let index = frame.cursor;
        frame.cursor += 1;
        Ok(SlotClaim {
            index,
            existing: frame.slots.get(index).cloned(),
            instance: frame.instance,
            runtime: frame.runtime.clone(),
        })
    })
}

fn install_slot(index: usize, slot: HookSlot) -> Result<(), HookError> {
    HOOK_FRAMES.with(|frames| {
        let mut frames = frames.borrow_mut();
        let frame = frames.last_mut().ok_or(HookError::Context)?;
        let len = frame.slots.len();
        if index == len {
            frame.slots.push(slot);
        } else if index < len {
            frame.slots[index] = slot;
        } else {
            return Err(HookError::Order {
                expected: len,
                found: index,
            });
        }
        Ok(())
    })
}

fn defer_effect(effect: PassiveEffect) -> Result<(), HookError> {
    HOOK_FRAMES.with(|frames| {
        let mut frames = frames.borrow_mut();
        let frame = frames.last_mut().ok_or(HookError::Context)?;
        frame.effects.push(effect);
        Ok(())
    })
}

/// The instance whose render is in progress on this thread.
pub fn current_instance() -> Result<InstanceId, HookError> {
    HOOK_FRAMES.with(|frames| {
        frames
            .borrow()
            .last()
            .map(|frame| frame.instance)
            .ok_or(HookError::Context)
    })
}

/// Hook context for one component render.
///
/// Dropping the guard without calling [`CurrentInstance::clear`] (early
/// return or unwinding) still uninstalls the frame and hands the slots back.
pub(crate) struct CurrentInstance<'a> {
    instance: &'a mut ComponentInstance,
    installed: bool,
}

impl<'a> CurrentInstance<'a> {
    /// Installs `instance` as the hook target with its slot cursor at 0.
    pub(crate) fn set(
        id: InstanceId,
        instance: &'a mut ComponentInstance,
        runtime: &RuntimeHandle,
    ) -> Self {
        let slots = mem::take(&mut instance.hook_slots);
        HOOK_FRAMES.with(|frames| {
            frames.borrow_mut().push(HookFrame {
                instance: id,
                runtime: runtime.clone(),
                slots,
                cursor: 0,
                effects: Vec::new(),
            })
        });
        Self {
            instance,
            installed: true,
        }
    }

    /// Uninstalls the frame and checks the hook count against the first render.
    pub(crate) fn clear(mut self) -> Result<Vec<PassiveEffect>, HookError> {
        self.installed = false;
        let (cursor, effects) = self.uninstall();
        match self.instance.expected_slot_count {
            None => self.instance.expected_slot_count = Some(cursor),
            Some(expected) if expected != cursor => {
                return Err(HookError::Order {
                    expected,
                    found: cursor,
                })
            }
            Some(_) => {}
        }
        Ok(effects)
    }

    fn uninstall(&mut self) -> (usize, Vec<PassiveEffect>) {
        match HOOK_FRAMES.with(|frames| frames.borrow_mut().pop()) {
            Some(frame) => {
                self.instance.hook_slots = frame.slots;
                (frame.cursor, frame.effects)
            }
            None => (0, Vec::new()),
        }
    }
}

impl Drop for CurrentInstance<'_> {
    fn drop(&mut self) {
        if self.installed {
            self.uninstall();
        }
    }
}

/// Result of one component render: its output and the effects it deferred.
pub(crate) struct RenderOutput {
    pub(crate) node: VNode,
    pub(crate) effects: Vec<PassiveEffect>,
}

/// Invokes the instance's component with its current props inside a hook context.
pub(crate) fn render_instance(
    id: InstanceId,
    instance: &mut ComponentInstance,
    runtime: &RuntimeHandle,
) -> Result<RenderOutput, HookError> {
    let component = instance.component.clone();
    let props = instance.props.clone();
    let scope = CurrentInstance::set(id, instance, runtime);
    let result = component.render(&props);
    let node = match result {
        Ok(node) => node,
        Err(err) => {
            drop(scope);
            return Err(err);
        }
    };
    let effects = scope.clear()?;
    instance.renders += 1;
    log::trace!("rendered {} ({} effect(s) deferred)", component.name(), effects.len());
    Ok(RenderOutput { node, effects })
}

// ---------------------------------------------------------------------------
// state / reducer

enum StateAction<T> {
    Replace(T),
    Update(Box<dyn FnOnce(&T) -> T>),
}

pub(crate) struct StateCell<T> {
    value: RefCell<T>,
    pending: RefCell<VecDeque<StateAction<T>>>,
}

impl<T: Clone> StateCell<T> {
    fn new(value: T) -> Self {
        Self {
            value: RefCell::new(value),
            pending: RefCell::new(VecDeque::new()),
        }
    }

    /// Applies queued actions in enqueue order and returns the settled value.
    fn resolve(&self) -> T {
        loop {
            let action = self.pending.borrow_mut().pop_front();
            let Some(action) = action else { break };
            let next = match action {
                StateAction::Replace(value) => value,
                StateAction::Update(update) => update(&*self.value.borrow()),
            };
            *self.value.borrow_mut() = next;
        }
        self.value.borrow().clone()
    }
}

/// Update-dispatch handle returned by [`use_state`]. Stable across renders.
pub struct SetState<T> {
    cell: Weak<StateCell<T>>,
    instance: InstanceId,
    runtime: RuntimeHandle,
}

impl<T: 'static> SetState<T> {
    pub fn set(&self, value: T) {
        self.enqueue(StateAction::Replace(value));
    }

    /// Queues `update(previous)`; updates queued in one turn apply in call order.
    pub fn update(&self, update: impl FnOnce(&T) -> T + 'static) {
        self.enqueue(StateAction::Update(Box::new(update)));
    }

    fn enqueue(&self, action: StateAction<T>) {
        match self.cell.upgrade() {
            Some(cell) => {
                cell.pending.borrow_mut().push_back(action);
                self.runtime.schedule_update(self.instance);
            }
            None => log::debug!("dropping state update for unmounted {:?}", self.instance),
        }
    }
}

impl<T> Clone for SetState<T> {
    fn clone(&self) -> Self {
        Self {
            cell: self.cell.clone(),
            instance: self.instance,
            runtime: self.runtime.clone(),
        }
    }
}

impl<T> PartialEq for SetState<T> {
    fn eq(&self, other: &Self) -> bool {
        Weak::ptr_eq(&self.cell, &other.cell)
    }
}

impl<T> fmt::Debug for SetState<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SetState")
            .field("instance", &self.instance)
            .field("mounted", &(self.cell.strong_count() > 0))
            .finish()
    }
}

/// Per-instance state. Returns the value after draining queued updates and a
/// stable setter that queues further updates and marks the instance dirty.
pub fn use_state<T: Clone + 'static>(
    init: impl FnOnce() -> T,
) -> Result<(T, SetState<T>), HookError> {
    let claim = claim_slot()?;
    let cell = match &claim.existing {
        Some(HookSlot::State(any)) => any
            .clone()
            .downcast::<StateCell<T>>()
            .map_err(|_| claim.mismatch(type_name::<T>(), "use_state of another type"))?,
        Some(other) => return Err(claim.mismatch("use_state", other.kind_name())),
        None => {
            let cell = Rc::new(StateCell::new(init()));
            install_slot(claim.index, HookSlot::State(cell.clone()))?;
            cell
        }
    };
    let value = cell.resolve();
    let setter = SetState {
        cell: Rc::downgrade(&cell),
        instance: claim.instance,
        runtime: claim.runtime,
    };
    Ok((value, setter))
}

trait ActionSink<A> {
    fn push(&self, action: A);
}

struct ReducerCell<S, A> {
    value: RefCell<S>,
    pending: RefCell<VecDeque<A>>,
}

impl<S: Clone, A> ReducerCell<S, A> {
    fn resolve(&self, reducer: &dyn Fn(&S, A) -> S) -> S {
        loop {
            let action = self.pending.borrow_mut().pop_front();
            let Some(action) = action else { break };
            let next = reducer(&*self.value.borrow(), action);
            *self.value.borrow_mut() = next;
        }
        self.value.borrow().clone()
    }
}

impl<S, A> ActionSink<A> for ReducerCell<S, A> {
    fn push(&self, action: A) {
        self.pending.borrow_mut().push_back(action);
    }
}

/// Action dispatcher returned by [`use_reducer`]. Stable across renders.
pub struct Dispatch<A> {
    sink: Weak<dyn ActionSink<A>>,
    instance: InstanceId,
    runtime: RuntimeHandle,
}

impl<A: 'static> Dispatch<A> {
    pub fn dispatch(&self, action: A) {
        match self.sink.upgrade() {
            Some(sink) => {
                sink.push(action);
                self.runtime.schedule_update(self.instance);
            }
            None => log::debug!("dropping action for unmounted {:?}", self.instance),
        }
    }
}

impl<A> Clone for Dispatch<A> {
    fn clone(&self) -> Self {
        Self {
            sink: self.sink.clone(),
            instance: self.instance,
            runtime: self.runtime.clone(),
        }
    }
}

impl<A> PartialEq for Dispatch<A> {
    fn eq(&self, other: &Self) -> bool {
        Weak::ptr_eq(&self.sink, &other.sink)
    }
}

impl<A> fmt::Debug for Dispatch<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dispatch")
            .field("instance", &self.instance)
            .finish()
    }
}

/// Like [`use_state`], but queued actions are folded through `reducer`.
///
/// The reducer passed on the current render is the one applied.
pub fn use_reducer<S, A>(
    reducer: impl Fn(&S, A) -> S,
    init: impl FnOnce() -> S,
) -> Result<(S, Dispatch<A>), HookError>
where
    S: Clone + 'static,
    A: 'static,
{
    let claim = claim_slot()?;
    let cell = match &claim.existing {
        Some(HookSlot::Reducer(any)) => any
            .clone()
            .downcast::<ReducerCell<S, A>>()
            .map_err(|_| claim.mismatch(type_name::<S>(), "use_reducer of another type"))?,
        Some(other) => return Err(claim.mismatch("use_reducer", other.kind_name())),
        None => {
            let cell = Rc::new(ReducerCell {
                value: RefCell::new(init()),
                pending: RefCell::new(VecDeque::<A>::new()),
            });
            install_slot(claim.index, HookSlot::Reducer(cell.clone()))?;
            cell
        }
    };
    let value = cell.resolve(&reducer);
    let sink: Rc<dyn ActionSink<A>> = cell;
    let dispatch = Dispatch {
        sink: Rc::downgrade(&sink),
        instance: claim.instance,
        runtime: claim.runtime,
    };
    Ok((value, dispatch))
}

// ---------------------------------------------------------------------------
// dependencies

/// A dependency list element, compared by the `PartialEq` of its concrete type.
pub trait Dependency: Any {
    fn same_as(&self, other: &dyn Dependency) -> bool;
    fn as_any(&self) -> &dyn Any;
}

impl<T: PartialEq + 'static> Dependency for T {
    fn same_as(&self, other: &dyn Dependency) -> bool {
        other
            .as_any()
            .downcast_ref::<T>()
            .is_some_and(|other| other == self)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Dependency list of an effect or memo.
///
/// `Always` re-runs on every render; an empty list runs once; otherwise a
/// re-run happens when the length or any element changes.
pub enum Deps {
    Always,
    List(Vec<Box<dyn Dependency>>),
}

impl Deps {
    pub fn always() -> Self {
        Deps::Always
    }

    pub fn once() -> Self {
        Deps::List(Vec::new())
    }

    pub fn with<T: PartialEq + 'static>(self, value: T) -> Self {
        let mut list = match self {
            Deps::Always => Vec::new(),
            Deps::List(list) => list,
        };
        list.push(Box::new(value));
        Deps::List(list)
    }

    pub(crate) fn changed_from(&self, previous: &Deps) -> bool {
        match (previous, self) {
            (Deps::List(previous), Deps::List(next)) => {
                previous.len() != next.len()
                    || previous
                        .iter()
                        .zip(next)
                        .any(|(previous, next)| !(**previous).same_as(&**next))
            }
            _ => true,
        }
    }
}

impl fmt::Debug for Deps {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Deps::Always => f.write_str("Deps::Always"),
            Deps::List(list) => write!(f, "Deps::List(len = {})", list.len()),
        }
    }
}

/// Builds a [`Deps`] list: `deps![]` runs once, `deps![a, b]` tracks `a` and `b`.
#[macro_export]
macro_rules! deps {
    () => {
        $crate::Deps::once()
    };
    ($($dep:expr),+ $(,)?) => {
        $crate::Deps::once()$(.with($dep))+
    };
}

// ---------------------------------------------------------------------------
// effects

/// Teardown returned by an effect body.
#[derive(Default)]
pub struct Cleanup(Option<Box<dyn FnOnce()>>);

impl Cleanup {
    pub fn none() -> Self {
        Cleanup(None)
    }

    pub fn new(cleanup: impl FnOnce() + 'static) -> Self {
        Cleanup(Some(Box::new(cleanup)))
    }

    fn into_inner(self) -> Option<Box<dyn FnOnce()>> {
        self.0
    }
}

impl fmt::Debug for Cleanup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Cleanup({})", if self.0.is_some() { "some" } else { "none" })
    }
}

pub(crate) struct EffectCell {
    deps: Option<Deps>,
    pub(crate) cleanup: Option<Box<dyn FnOnce()>>,
    pub(crate) alive: bool,
}

impl EffectCell {
    fn new() -> Self {
        Self {
            deps: None,
            cleanup: None,
            alive: true,
        }
    }

    fn should_run(&self, next: &Deps) -> bool {
        match &self.deps {
            None => true,
            Some(previous) => next.changed_from(previous),
        }
    }
}

/// Effect work deferred until the enclosing commit has returned.
pub(crate) struct PassiveEffect {
    instance: InstanceId,
    cell: Rc<RefCell<EffectCell>>,
    /// Dependencies that scheduled this run; stored in the slot once committed.
    deps: Option<Deps>,
    body: Box<dyn FnOnce() -> Cleanup>,
}

impl PassiveEffect {
    /// Marks the dependencies as seen. Called when the render that scheduled
    /// this effect is committed, so an aborted render leaves the slot as it was.
    pub(crate) fn record_deps(&mut self) {
        if let Some(deps) = self.deps.take() {
            self.cell.borrow_mut().deps = Some(deps);
        }
    }

    /// Runs the prior cleanup then the body. Skipped when the owner was unmounted.
    pub(crate) fn run(self) -> bool {
        let prior = {
            let mut cell = self.cell.borrow_mut();
            if !cell.alive {
                log::trace!("skipping effect of unmounted {:?}", self.instance);
                return false;
            }
            cell.cleanup.take()
        };
        if let Some(cleanup) = prior {
            cleanup();
        }
        let cleanup = (self.body)().into_inner();
        let orphaned = {
            let mut cell = self.cell.borrow_mut();
            if cell.alive {
                cell.cleanup = cleanup;
                None
            } else {
                cleanup
            }
        };
        if let Some(cleanup) = orphaned {
            cleanup();
        }
        true
    }
}

/// Schedules `effect` to run after the current commit when `deps` changed.
///
/// The previous cleanup, if any, runs right before the new body.
pub fn use_effect<F>(deps: Deps, effect: F) -> Result<(), HookError>
where
    F: FnOnce() -> Cleanup + 'static,
{
    let claim = claim_slot()?;
    let cell = match &claim.existing {
        Some(HookSlot::Effect(cell)) => cell.clone(),
        Some(other) => return Err(claim.mismatch("use_effect", other.kind_name())),
        None => {
            let cell = Rc::new(RefCell::new(EffectCell::new()));
            install_slot(claim.index, HookSlot::Effect(cell.clone()))?;
            cell
        }
    };
    let must_run = cell.borrow().should_run(&deps);
    if must_run {
        defer_effect(PassiveEffect {
            instance: claim.instance,
            cell,
            deps: Some(deps),
            body: Box::new(effect),
        })?;
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// refs and memos

/// Persistent mutable box; writes never trigger a render.
pub struct Ref<T> {
    inner: Rc<RefCell<T>>,
}

impl<T> Ref<T> {
    pub fn set(&self, value: T) {
        *self.inner.borrow_mut() = value;
    }

    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        f(&self.inner.borrow())
    }

    pub fn with_mut<R>(&self, f: impl FnOnce(&mut T) -> R) -> R {
        f(&mut self.inner.borrow_mut())
    }

    pub fn ptr_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }
}

impl<T: Clone> Ref<T> {
    pub fn get(&self) -> T {
        self.inner.borrow().clone()
    }
}

impl<T> Clone for Ref<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<T> PartialEq for Ref<T> {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

impl<T: fmt::Debug> fmt::Debug for Ref<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Ref").field(&*self.inner.borrow()).finish()
    }
}

pub fn use_ref<T: 'static>(init: impl FnOnce() -> T) -> Result<Ref<T>, HookError> {
    let claim = claim_slot()?;
    let inner = match &claim.existing {
        Some(HookSlot::Ref(any)) => any
            .clone()
            .downcast::<RefCell<T>>()
            .map_err(|_| claim.mismatch(type_name::<T>(), "use_ref of another type"))?,
        Some(other) => return Err(claim.mismatch("use_ref", other.kind_name())),
        None => {
            let inner = Rc::new(RefCell::new(init()));
            install_slot(claim.index, HookSlot::Ref(inner.clone()))?;
            inner
        }
    };
    Ok(Ref { inner })
}

struct MemoCell<T> {
    value: RefCell<T>,
    deps: RefCell<Deps>,
}

/// Cached derived value, recomputed synchronously when `deps` changed.
pub fn use_memo<T: Clone + 'static>(
    deps: Deps,
    compute: impl FnOnce() -> T,
) -> Result<T, HookError> {
    let claim = claim_slot()?;
    match &claim.existing {
        Some(HookSlot::Memo(any)) => {
            let cell = any
                .clone()
                .downcast::<MemoCell<T>>()
                .map_err(|_| claim.mismatch(type_name::<T>(), "use_memo of another type"))?;
            let stale = deps.changed_from(&cell.deps.borrow());
            if stale {
                let value = compute();
                *cell.value.borrow_mut() = value;
                *cell.deps.borrow_mut() = deps;
            }
            let value = cell.value.borrow().clone();
            Ok(value)
        }
        Some(other) => Err(claim.mismatch("use_memo", other.kind_name())),
        None => {
            let value = compute();
            let cell = Rc::new(MemoCell {
                value: RefCell::new(value.clone()),
                deps: RefCell::new(deps),
            });
            install_slot(claim.index, HookSlot::Memo(cell))?;
            Ok(value)
        }
    }
}

/// Event handler that keeps its identity while `deps` are unchanged, so host
/// attribute diffing sees no change.
pub fn use_callback(
    deps: Deps,
    handler: impl Fn(&Event) + 'static,
) -> Result<EventHandler, HookError> {
    use_memo(deps, || EventHandler::new(handler))
}

#[cfg(test)]
#[path = "tests/hooks_tests.rs"]
mod tests;
