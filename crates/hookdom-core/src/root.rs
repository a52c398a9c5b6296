//! Root controller: owns the host, the runtime and the committed tree.

use crate::config::EngineConfig;
use crate::host::{HostAdapter, HostId};
use crate::instance::MountId;
use crate::mutation::MutationQueue;
use crate::reconcile::Reconciler;
use crate::runtime::{Runtime, RuntimeHandle};
use crate::vnode::VNode;
use crate::RenderError;

pub struct Root<H: HostAdapter> {
    host: H,
    container: HostId,
    runtime: Runtime,
    reconciler: Reconciler,
    current: Option<MountId>,
    config: EngineConfig,
    commits: usize,
}

impl<H: HostAdapter> Root<H> {
    /// Root over `container`, an existing node of `host`, with a no-op scheduler.
    pub fn new(host: H, container: HostId) -> Self {
        Self::with_runtime(host, container, Runtime::default())
    }

    pub fn with_runtime(host: H, container: HostId, runtime: Runtime) -> Self {
        let reconciler = Reconciler::new(runtime.handle());
        Self {
            host,
            container,
            runtime,
            reconciler,
            current: None,
            config: EngineConfig::default(),
            commits: 0,
        }
    }

    pub fn with_config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    /// Stages the changes that turn the committed tree into `next`.
    ///
    /// `None` unmounts. On failure nothing is staged and the host tree keeps
    /// its last committed state.
    pub fn reconcile(&mut self, next: Option<&VNode>) -> Result<(), RenderError> {
        self.reconciler.begin_pass();
        match self
            .reconciler
            .reconcile(&mut self.host, self.container, self.current, next)
        {
            Ok(current) => {
                self.current = current;
                Ok(())
            }
            Err(err) => {
                log::error!("render aborted: {err}");
                Err(err)
            }
        }
    }

    /// Applies the staged mutations in one pass.
    pub fn commit(&mut self) -> Result<usize, RenderError> {
        let applied = self.reconciler.commit(&mut self.host)?;
        self.commits += 1;
        Ok(applied)
    }

    pub fn render(&mut self, next: &VNode) -> Result<(), RenderError> {
        self.reconcile(Some(next))?;
        self.commit().map(|_| ())
    }

    pub fn unmount(&mut self) -> Result<(), RenderError> {
        self.reconcile(None)?;
        self.commit().map(|_| ())
    }

    /// Records staged by the last `reconcile` and not yet committed.
    pub fn pending_mutations(&self) -> &MutationQueue {
        self.reconciler.mutations()
    }

    /// Re-renders every dirty instance, shallowest first, committing after each.
    ///
    /// Returns the number of instances rendered. Updates raised while flushing
    /// land in the next flush. If one instance fails, the instances after it
    /// stay dirty.
    pub fn flush(&mut self) -> Result<usize, RenderError> {
        let dirty = self.runtime.take_dirty();
        if dirty.is_empty() {
            return Ok(0);
        }
        let mut order: Vec<_> = dirty
            .into_iter()
            .filter_map(|id| self.reconciler.instance_depth(id).map(|depth| (depth, id)))
            .collect();
        order.sort_by_key(|&(depth, _)| depth);

        self.reconciler.begin_pass();
        let mut rendered = 0;
        for (index, &(_, id)) in order.iter().enumerate() {
            let result = match self.reconciler.rerender(&mut self.host, id) {
                Ok(true) => self.commit().map(|_| rendered += 1),
                Ok(false) => Ok(()),
                Err(err) => Err(err),
            };
            if let Err(err) = result {
                log::error!("update of {id:?} aborted: {err}");
                let remaining = &order[index + 1..];
                if !remaining.is_empty() {
                    log::debug!("requeueing {} dirty instance(s)", remaining.len());
                }
                self.runtime.requeue(remaining.iter().map(|&(_, id)| id));
                return Err(err);
            }
        }
        log::debug!("flush rendered {rendered} instance(s)");
        Ok(rendered)
    }

    /// Runs the passive effects queued so far, in queue order.
    ///
    /// Effects queued while this runs wait for the next call.
    pub fn run_passive_effects(&mut self) -> usize {
        let mut ran = 0;
        for effect in self.runtime.take_passive() {
            if effect.run() {
                ran += 1;
            }
        }
        if ran > 0 {
            log::debug!("ran {ran} passive effect(s)");
        }
        ran
    }

    /// One scheduling turn: flush, then passive effects.
    pub fn tick(&mut self) -> Result<bool, RenderError> {
        let rendered = self.flush()?;
        let ran = self.run_passive_effects();
        Ok(rendered > 0 || ran > 0)
    }

    /// Ticks until no work remains and returns the number of ticks.
    pub fn run_until_idle(&mut self) -> Result<usize, RenderError> {
        let mut passes = 0;
        while self.has_pending_work() {
            if passes >= self.config.max_flush_passes {
                return Err(RenderError::FlushLimit { passes });
            }
            self.tick()?;
            passes += 1;
        }
        Ok(passes)
    }

    pub fn has_pending_work(&self) -> bool {
        self.runtime.has_dirty() || self.runtime.has_passive_effects()
    }

    pub fn host(&self) -> &H {
        &self.host
    }

    pub fn host_mut(&mut self) -> &mut H {
        &mut self.host
    }

    pub fn container(&self) -> HostId {
        self.container
    }

    /// Top host node of the committed tree.
    pub fn root_node(&self) -> Option<HostId> {
        self.current
            .and_then(|mount| self.reconciler.host_of(mount).ok())
    }

    /// Mounted position of the committed tree.
    pub fn current(&self) -> Option<MountId> {
        self.current
    }

    pub fn reconciler(&self) -> &Reconciler {
        &self.reconciler
    }

    pub fn runtime(&self) -> &Runtime {
        &self.runtime
    }

    pub fn runtime_handle(&self) -> RuntimeHandle {
        self.runtime.handle()
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Number of commits applied since the root was created.
    pub fn commit_count(&self) -> usize {
        self.commits
    }
}

#[cfg(test)]
#[path = "tests/root_tests.rs"]
mod tests;
