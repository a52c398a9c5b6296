use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::mem;
use std::rc::{Rc, Weak};
use std::sync::Arc;

use crate::collections::ordered::IndexSet;
use crate::hooks::PassiveEffect;
use crate::instance::InstanceId;
use crate::platform::RuntimeScheduler;

struct RuntimeInner {
    scheduler: Arc<dyn RuntimeScheduler>,
    dirty: RefCell<IndexSet<InstanceId>>,
    tick_requested: Cell<bool>,
    passive: RefCell<VecDeque<PassiveEffect>>,
}

impl RuntimeInner {
    fn new(scheduler: Arc<dyn RuntimeScheduler>) -> Self {
        Self {
            scheduler,
            dirty: RefCell::new(IndexSet::default()),
            tick_requested: Cell::new(false),
            passive: RefCell::new(VecDeque::new()),
        }
    }

    fn request_tick(&self) {
        if !self.tick_requested.replace(true) {
            log::trace!("requesting flush from host");
            self.scheduler.schedule_flush();
        }
    }

    fn schedule_update(&self, instance: InstanceId) {
        self.dirty.borrow_mut().insert(instance);
        self.request_tick();
    }

    fn take_dirty(&self) -> Vec<InstanceId> {
        let dirty = mem::take(&mut *self.dirty.borrow_mut());
        self.tick_requested.set(false);
        dirty.into_iter().collect()
    }

    fn has_dirty(&self) -> bool {
        !self.dirty.borrow().is_empty()
    }

    fn enqueue_passive(&self, effects: Vec<PassiveEffect>) {
        if effects.is_empty() {
            return;
        }
        self.passive.borrow_mut().extend(effects);
        self.request_tick();
    }

    fn take_passive(&self) -> VecDeque<PassiveEffect> {
        let passive = mem::take(&mut *self.passive.borrow_mut());
        self.tick_requested.set(self.has_dirty());
        passive
    }

    fn has_passive(&self) -> bool {
        !self.passive.borrow().is_empty()
    }
}

/// Shared scheduling state: the dirty set and the passive-effect queue.
#[derive(Clone)]
pub struct Runtime {
    inner: Rc<RuntimeInner>,
}

impl Runtime {
    pub fn new(scheduler: Arc<dyn RuntimeScheduler>) -> Self {
        Self {
            inner: Rc::new(RuntimeInner::new(scheduler)),
        }
    }

    pub fn handle(&self) -> RuntimeHandle {
        RuntimeHandle(Rc::downgrade(&self.inner))
    }

    pub fn has_dirty(&self) -> bool {
        self.inner.has_dirty()
    }

    pub fn has_passive_effects(&self) -> bool {
        self.inner.has_passive()
    }

    /// Snapshot of the dirty set, cleared in the same step.
    ///
    /// Instances marked dirty afterwards land in a fresh set for the next flush.
    pub(crate) fn take_dirty(&self) -> Vec<InstanceId> {
        self.inner.take_dirty()
    }

    /// Marks instances dirty again after a flush stopped before reaching them.
    pub(crate) fn requeue(&self, instances: impl IntoIterator<Item = InstanceId>) {
        for instance in instances {
            self.inner.schedule_update(instance);
        }
    }

    pub(crate) fn enqueue_passive(&self, effects: Vec<PassiveEffect>) {
        self.inner.enqueue_passive(effects);
    }

    pub(crate) fn take_passive(&self) -> VecDeque<PassiveEffect> {
        self.inner.take_passive()
    }
}

impl Default for Runtime {
    fn default() -> Self {
        Self::new(Arc::new(DefaultScheduler))
    }
}

#[derive(Default)]
pub struct DefaultScheduler;

impl RuntimeScheduler for DefaultScheduler {
    fn schedule_flush(&self) {}
}

/// Non-owning handle held by state setters; a dropped runtime turns updates into no-ops.
#[derive(Clone)]
pub struct RuntimeHandle(Weak<RuntimeInner>);

impl RuntimeHandle {
    pub fn schedule_update(&self, instance: InstanceId) {
        match self.0.upgrade() {
            Some(inner) => inner.schedule_update(instance),
            None => log::debug!("runtime dropped; ignoring update for {instance:?}"),
        }
    }

    pub fn has_dirty(&self) -> bool {
        self.0
            .upgrade()
            .map(|inner| inner.has_dirty())
            .unwrap_or(false)
    }

    pub fn is_alive(&self) -> bool {
        self.0.strong_count() > 0
    }

    pub(crate) fn enqueue_passive(&self, effects: Vec<PassiveEffect>) {
        match self.0.upgrade() {
            Some(inner) => inner.enqueue_passive(effects),
            None => log::debug!("runtime dropped; discarding {} passive effect(s)", effects.len()),
        }
    }
}

#[cfg(test)]
#[path = "tests/runtime_tests.rs"]
mod tests;
