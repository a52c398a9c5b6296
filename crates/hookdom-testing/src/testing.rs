use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use hookdom_core::{
    EngineConfig, Event, HostAdapter, HostId, MemoryHost, MutationQueue, RenderError, Root,
    Runtime, RuntimeHandle, RuntimeScheduler, VNode,
};

/// Scheduler that only counts flush requests; the test drives flushes itself.
#[derive(Debug, Default)]
pub struct RecordingScheduler {
    requests: AtomicUsize,
}

impl RecordingScheduler {
    pub fn requests(&self) -> usize {
        self.requests.load(Ordering::SeqCst)
    }
}

impl RuntimeScheduler for RecordingScheduler {
    fn schedule_flush(&self) {
        self.requests.fetch_add(1, Ordering::SeqCst);
    }
}

/// Headless harness for exercising component trees in tests.
///
/// `RenderTestRule` owns a [`Root`] over a [`MemoryHost`] container and
/// exposes helpers for driving flushes, reading the produced markup and
/// firing events at host nodes without a real platform behind it.
pub struct RenderTestRule {
    root: Root<MemoryHost>,
    scheduler: Arc<RecordingScheduler>,
    content: Option<VNode>,
}

impl RenderTestRule {
    pub fn new() -> Self {
        Self::with_config(EngineConfig::default())
    }

    pub fn with_config(config: EngineConfig) -> Self {
        let scheduler = Arc::new(RecordingScheduler::default());
        let runtime = Runtime::new(scheduler.clone());
        let mut host = MemoryHost::new();
        let container = host.create_element("root");
        Self {
            root: Root::with_runtime(host, container, runtime).with_config(config),
            scheduler,
            content: None,
        }
    }

    /// Installs `content` and renders it.
    pub fn set_content(&mut self, content: VNode) -> Result<(), RenderError> {
        self.content = Some(content);
        self.rerender()
    }

    /// Renders the installed content again from the root.
    pub fn rerender(&mut self) -> Result<(), RenderError> {
        match &self.content {
            Some(content) => self.root.render(content),
            None => Ok(()),
        }
    }

    /// Stages `content` without committing, for assertions on the mutation queue.
    pub fn stage(&mut self, content: VNode) -> Result<&MutationQueue, RenderError> {
        self.root.reconcile(Some(&content))?;
        self.content = Some(content);
        Ok(self.root.pending_mutations())
    }

    pub fn commit(&mut self) -> Result<usize, RenderError> {
        self.root.commit()
    }

    /// Flushes and runs passive effects until nothing is pending.
    pub fn pump_until_idle(&mut self) -> Result<usize, RenderError> {
        self.root.run_until_idle()
    }

    pub fn unmount(&mut self) -> Result<(), RenderError> {
        self.content = None;
        self.root.unmount()
    }

    pub fn has_content(&self) -> bool {
        self.content.is_some()
    }

    /// Markup of everything rendered under the container.
    pub fn html(&self) -> String {
        self.root.host().inner_html(self.root.container())
    }

    pub fn root_node(&self) -> Option<HostId> {
        self.root.root_node()
    }

    pub fn host(&self) -> &MemoryHost {
        self.root.host()
    }

    pub fn container(&self) -> HostId {
        self.root.container()
    }

    pub fn root(&mut self) -> &mut Root<MemoryHost> {
        &mut self.root
    }

    pub fn runtime_handle(&self) -> RuntimeHandle {
        self.root.runtime_handle()
    }

    pub fn flush_requests(&self) -> usize {
        self.scheduler.requests()
    }

    pub fn commit_count(&self) -> usize {
        self.root.commit_count()
    }

    /// Host nodes with `tag`, in document order.
    pub fn find_by_tag(&self, tag: &str) -> Vec<HostId> {
        let host = self.root.host();
        let mut found = Vec::new();
        let mut stack: Vec<HostId> = host
            .children(self.root.container())
            .iter()
            .rev()
            .copied()
            .collect();
        while let Some(node) = stack.pop() {
            if host.tag(node) == Some(tag) {
                found.push(node);
            }
            stack.extend(host.children(node).iter().rev().copied());
        }
        found
    }

    /// Delivers `event` to the nearest handler at or above `target`.
    ///
    /// Returns whether a handler was found. Updates it issues are left pending.
    pub fn dispatch(&mut self, target: HostId, event: Event) -> bool {
        let mut current = Some(target);
        while let Some(node) = current {
            if let Some(handler) = self.root.host().handler(node, &event.name) {
                log::trace!("dispatching {} at host node {node}", event.name);
                handler.call(&event);
                return true;
            }
            if node == self.root.container() {
                break;
            }
            current = self.root.host().parent(node);
        }
        false
    }

    /// Dispatches `event_name` on the first node with `tag`.
    pub fn fire(&mut self, tag: &str, event_name: &str) -> bool {
        match self.find_by_tag(tag).first() {
            Some(&node) => self.dispatch(node, Event::new(event_name)),
            None => false,
        }
    }
}

impl Default for RenderTestRule {
    fn default() -> Self {
        Self::new()
    }
}

/// Convenience helper for tests that only need temporary access to a
/// `RenderTestRule`.
pub fn run_test_render<R>(f: impl FnOnce(&mut RenderTestRule) -> R) -> R {
    let mut rule = RenderTestRule::new();
    f(&mut rule)
}
