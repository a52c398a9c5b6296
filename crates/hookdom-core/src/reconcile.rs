//! Diff engine.
//!
//! [`Reconciler::reconcile`] compares a mounted position against a new
//! [`VNode`] and stages the host changes in a [`MutationQueue`]; the host tree
//! itself is only touched to assemble detached subtrees. [`Reconciler::commit`]
//! applies the staged records and hands deferred effects to the runtime.

use std::collections::VecDeque;
use std::mem;

use slotmap::SlotMap;

use crate::collections::map::{HashMap, HashSet};
use crate::collections::ordered::IndexMap;
use crate::hooks::{render_instance, PassiveEffect};
use crate::host::{HostAdapter, HostId};
use crate::instance::{ComponentInstance, InstanceId, MountId, Placement};
use crate::mutation::{Mutation, MutationQueue};
use crate::runtime::RuntimeHandle;
use crate::vnode::{Attributes, Component, Key, VNode, VNodeKind};
use crate::{HostError, RenderError};

/// What the engine remembers about one mounted tree position.
#[derive(Clone)]
struct Mounted {
    vnode: VNode,
    /// Host node for element and text positions.
    host: Option<HostId>,
    /// Backing instance for component positions.
    instance: Option<InstanceId>,
    /// Expanded child of a component position.
    rendered: Option<MountId>,
    children: Vec<MountId>,
}

impl Mounted {
    fn host(vnode: VNode, host: HostId, children: Vec<MountId>) -> Self {
        Self {
            vnode,
            host: Some(host),
            instance: None,
            rendered: None,
            children,
        }
    }

    fn component(vnode: VNode) -> Self {
        Self {
            vnode,
            host: None,
            instance: None,
            rendered: None,
            children: Vec::new(),
        }
    }
}

/// A position the pass in progress took out of the tree.
enum Retired {
    /// The position and everything under it.
    Subtree(MountId),
    /// Only the component position; its expanded child stays mounted.
    Instance(MountId),
}

/// Arena changes made by the pass in progress.
///
/// Retired positions are torn down only once the pass succeeds. If it fails,
/// the snapshots put back every record the pass touched and the positions it
/// created are dropped, so the arena matches the last committed host tree.
#[derive(Default)]
struct PassJournal {
    queue_start: usize,
    effects_start: usize,
    created_mounts: Vec<MountId>,
    created_instances: Vec<InstanceId>,
    mounts: HashMap<MountId, Mounted>,
    instances: HashMap<InstanceId, Placement>,
    retired: Vec<Retired>,
}

pub struct Reconciler {
    mounts: SlotMap<MountId, Mounted>,
    instances: SlotMap<InstanceId, ComponentInstance>,
    queue: MutationQueue,
    staged_effects: Vec<PassiveEffect>,
    rendered_in_pass: HashSet<InstanceId>,
    journal: PassJournal,
    runtime: RuntimeHandle,
}

impl Reconciler {
    pub fn new(runtime: RuntimeHandle) -> Self {
        Self {
            mounts: SlotMap::with_key(),
            instances: SlotMap::with_key(),
            queue: MutationQueue::new(),
            staged_effects: Vec::new(),
            rendered_in_pass: HashSet::default(),
            journal: PassJournal::default(),
            runtime,
        }
    }

    /// Diffs the position `old` (or nothing) against `new` (or nothing) under
    /// `parent` and returns the position that now represents `new`.
    ///
    /// `(None, None)` is a no-op. On error nothing from this call stays
    /// staged and the mounted tree is left as it was.
    pub fn reconcile(
        &mut self,
        host: &mut dyn HostAdapter,
        parent: HostId,
        old: Option<MountId>,
        new: Option<&VNode>,
    ) -> Result<Option<MountId>, RenderError> {
        self.open_journal();
        let result = self.reconcile_at(host, parent, old, new, 0);
        self.close_journal(host, result)
    }

    /// Applies every staged record, then queues the effects collected while
    /// rendering. On a host failure the queue is still drained and the effects
    /// are dropped, so their dependencies count as unseen.
    pub fn commit(&mut self, host: &mut dyn HostAdapter) -> Result<usize, HostError> {
        let applied = self.queue.commit(host);
        let mut effects = mem::take(&mut self.staged_effects);
        match applied {
            Ok(count) => {
                for effect in &mut effects {
                    effect.record_deps();
                }
                self.runtime.enqueue_passive(effects);
                Ok(count)
            }
            Err(err) => {
                log::error!("commit failed, {} effect(s) dropped: {err}", effects.len());
                Err(err)
            }
        }
    }

    pub fn mutations(&self) -> &MutationQueue {
        &self.queue
    }

    /// Host node of a mounted position, following component expansions.
    pub fn host_of(&self, mount: MountId) -> Result<HostId, RenderError> {
        let mut current = mount;
        loop {
            let mounted = self.mounts.get(current).ok_or(RenderError::MissingMount)?;
            if let Some(host) = mounted.host {
                return Ok(host);
            }
            current = mounted.rendered.ok_or(RenderError::MissingMount)?;
        }
    }

    pub fn mount_count(&self) -> usize {
        self.mounts.len()
    }

    pub fn instance_count(&self) -> usize {
        self.instances.len()
    }

    pub fn is_mounted(&self, instance: InstanceId) -> bool {
        self.instances.contains_key(instance)
    }

    /// Number of completed renders of `instance`.
    pub fn render_count(&self, instance: InstanceId) -> Option<usize> {
        self.instances.get(instance).map(|instance| instance.renders)
    }

    /// Instance backing the component position `mount`.
    pub fn instance_at(&self, mount: MountId) -> Option<InstanceId> {
        self.mounts.get(mount)?.instance
    }

    pub(crate) fn instance_depth(&self, instance: InstanceId) -> Option<usize> {
        self.instances.get(instance).map(|instance| instance.depth)
    }

    /// Starts a render pass; instances rendered from here on are not rendered
    /// again by [`Reconciler::rerender`] until the next pass.
    pub(crate) fn begin_pass(&mut self) {
        self.rendered_in_pass.clear();
    }

    /// Re-renders a dirty instance in place. Returns `false` when the instance
    /// was unmounted or already rendered in this pass.
    pub(crate) fn rerender(
        &mut self,
        host: &mut dyn HostAdapter,
        id: InstanceId,
    ) -> Result<bool, RenderError> {
        if self.rendered_in_pass.contains(&id) {
            log::trace!("{id:?} already rendered in this pass");
            return Ok(false);
        }
        if !self.instances.contains_key(id) {
            log::debug!("skipping update of unmounted {id:?}");
            return Ok(false);
        }
        self.open_journal();
        let result = self.rerender_in_place(host, id);
        self.close_journal(host, result).map(|()| true)
    }

    fn rerender_in_place(
        &mut self,
        host: &mut dyn HostAdapter,
        id: InstanceId,
    ) -> Result<(), RenderError> {
        let instance = self.instances.get(id).ok_or(RenderError::MissingInstance)?;
        let (mount, parent, depth, previous) = (
            instance.mount,
            instance.host_parent,
            instance.depth,
            instance.last_rendered,
        );
        let child = self.render(id)?;
        let rendered = self.reconcile_at(host, parent, previous, Some(&child), depth + 1)?;
        self.link_rendered(id, mount, rendered)
    }

    fn open_journal(&mut self) {
        self.journal = PassJournal {
            queue_start: self.queue.len(),
            effects_start: self.staged_effects.len(),
            ..PassJournal::default()
        };
    }

    fn close_journal<T>(
        &mut self,
        host: &mut dyn HostAdapter,
        result: Result<T, RenderError>,
    ) -> Result<T, RenderError> {
        let journal = mem::take(&mut self.journal);
        match result {
            Ok(value) => {
                self.settle(journal);
                Ok(value)
            }
            Err(err) => {
                self.roll_back(host, journal);
                Err(err)
            }
        }
    }

    /// Tears down retired positions in the order the pass retired them.
    fn settle(&mut self, journal: PassJournal) {
        for retired in journal.retired {
            match retired {
                Retired::Subtree(mount) => self.unmount_subtree(mount),
                Retired::Instance(mount) => self.unmount_instance_only(mount),
            }
        }
    }

    /// Drops what an aborted pass staged and restores what it touched.
    fn roll_back(&mut self, host: &mut dyn HostAdapter, journal: PassJournal) {
        for record in self.queue.split_off(journal.queue_start) {
            if let Some(node) = record.attaches() {
                host.release(node);
            }
        }
        self.staged_effects.truncate(journal.effects_start);
        for id in journal.created_instances {
            self.instances.remove(id);
        }
        for mount in journal.created_mounts {
            self.mounts.remove(mount);
        }
        for (mount, snapshot) in journal.mounts {
            if let Some(mounted) = self.mounts.get_mut(mount) {
                *mounted = snapshot;
            }
        }
        for (id, placement) in journal.instances {
            if let Some(instance) = self.instances.get_mut(id) {
                instance.restore(placement);
            }
        }
        log::debug!(
            "pass rolled back, {} retired position(s) kept",
            journal.retired.len()
        );
    }

    /// Mutable access to a mounted record, snapshotted on first touch in a pass.
    fn mount_mut(&mut self, mount: MountId) -> Result<&mut Mounted, RenderError> {
        let mounted = self.mounts.get_mut(mount).ok_or(RenderError::MissingMount)?;
        if !self.journal.mounts.contains_key(&mount) {
            self.journal.mounts.insert(mount, mounted.clone());
        }
        Ok(mounted)
    }

    fn instance_mut(&mut self, id: InstanceId) -> Result<&mut ComponentInstance, RenderError> {
        let instance = self
            .instances
            .get_mut(id)
            .ok_or(RenderError::MissingInstance)?;
        if !self.journal.instances.contains_key(&id) {
            self.journal.instances.insert(id, instance.placement());
        }
        Ok(instance)
    }

    fn insert_mount(&mut self, mounted: Mounted) -> MountId {
        let mount = self.mounts.insert(mounted);
        self.journal.created_mounts.push(mount);
        mount
    }

    fn reconcile_at(
        &mut self,
        host: &mut dyn HostAdapter,
        parent: HostId,
        old: Option<MountId>,
        new: Option<&VNode>,
        depth: usize,
    ) -> Result<Option<MountId>, RenderError> {
        let Some(new) = new else {
            if let Some(old) = old {
                self.remove(parent, old)?;
            }
            return Ok(None);
        };
        if let VNodeKind::Component(component) = new.kind() {
            return self
                .reconcile_component(host, parent, old, new, component, depth)
                .map(Some);
        }

        // an old component gives way to whatever it rendered
        let mut old = old;
        while let Some(old_id) = old {
            if self.instance_at(old_id).is_none() {
                break;
            }
            old = self.retire_instance(old_id);
        }

        let Some(old_id) = old else {
            let mount = self.mount_new(host, parent, new, depth)?;
            let node = self.host_of(mount)?;
            self.queue.push(Mutation::Place { node, parent });
            return Ok(Some(mount));
        };

        let mounted = self.mounts.get(old_id).ok_or(RenderError::MissingMount)?;
        let old_vnode = mounted.vnode.clone();
        let old_children = mounted.children.clone();
        let node = mounted.host.ok_or(RenderError::MissingMount)?;

        if !old_vnode.same_host_type(new) {
            self.retire_subtree(old_id);
            let mount = self.mount_new(host, parent, new, depth)?;
            let replacement = self.host_of(mount)?;
            self.queue.push(Mutation::Replace {
                old: node,
                new: replacement,
                parent,
            });
            return Ok(Some(mount));
        }

        match (old_vnode.kind(), new.kind()) {
            (VNodeKind::Text(previous), VNodeKind::Text(next)) => {
                if previous != next {
                    let next = next.clone();
                    self.queue.push(Mutation::Update {
                        node,
                        apply: Box::new(move |target: &mut dyn HostAdapter| {
                            target.set_text(node, &next)
                        }),
                    });
                }
            }
            _ => {
                if !old_vnode.props().same_attributes(new.props()) {
                    let previous = old_vnode.props().attributes().clone();
                    let next = new.props().attributes().clone();
                    self.queue.push(Mutation::Update {
                        node,
                        apply: Box::new(move |target: &mut dyn HostAdapter| {
                            target.apply_attribute_delta(node, &previous, &next)
                        }),
                    });
                }
                let children =
                    self.reconcile_children(host, node, &old_children, new.children(), depth + 1)?;
                self.mount_mut(old_id)?.children = children;
            }
        }

        self.mount_mut(old_id)?.vnode = new.clone();
        Ok(Some(old_id))
    }

    fn reconcile_component(
        &mut self,
        host: &mut dyn HostAdapter,
        parent: HostId,
        old: Option<MountId>,
        new: &VNode,
        component: &Component,
        depth: usize,
    ) -> Result<MountId, RenderError> {
        if let Some((old_id, id)) = old.and_then(|old| self.reusable(old, component)) {
            let instance = self.instance_mut(id)?;
            instance.props = new.props().clone();
            instance.host_parent = parent;
            instance.depth = depth;
            let previous = instance.last_rendered;
            self.mount_mut(old_id)?.vnode = new.clone();
            let child = self.render(id)?;
            let rendered = self.reconcile_at(host, parent, previous, Some(&child), depth + 1)?;
            self.link_rendered(id, old_id, rendered)?;
            return Ok(old_id);
        }

        // another component or a host node held this position; none of its
        // instances survive
        let previous = match old {
            Some(old_id) => {
                let node = self.host_of(old_id)?;
                self.retire_subtree(old_id);
                Some(node)
            }
            None => None,
        };
        let mount = self.mount_component(host, parent, new, component, depth)?;
        let node = self.host_of(mount)?;
        self.queue.push(match previous {
            Some(old) => Mutation::Replace {
                old,
                new: node,
                parent,
            },
            None => Mutation::Place { node, parent },
        });
        Ok(mount)
    }

    fn reusable(&self, old: MountId, component: &Component) -> Option<(MountId, InstanceId)> {
        let mounted = self.mounts.get(old)?;
        let previous = mounted.vnode.as_component()?;
        if previous.same_type(component) {
            Some((old, mounted.instance?))
        } else {
            None
        }
    }

    fn render(&mut self, id: InstanceId) -> Result<VNode, RenderError> {
        let instance = self
            .instances
            .get_mut(id)
            .ok_or(RenderError::MissingInstance)?;
        let output = render_instance(id, instance, &self.runtime)?;
        self.staged_effects.extend(output.effects);
        self.rendered_in_pass.insert(id);
        Ok(output.node)
    }

    fn link_rendered(
        &mut self,
        id: InstanceId,
        mount: MountId,
        rendered: Option<MountId>,
    ) -> Result<(), RenderError> {
        self.instance_mut(id)?.last_rendered = rendered;
        self.mount_mut(mount)?.rendered = rendered;
        Ok(())
    }

    /// Builds a detached host subtree for `vnode`, expanding components.
    fn mount_new(
        &mut self,
        host: &mut dyn HostAdapter,
        parent: HostId,
        vnode: &VNode,
        depth: usize,
    ) -> Result<MountId, RenderError> {
        match vnode.kind() {
            VNodeKind::Text(value) => {
                let node = host.create_text(value);
                Ok(self.insert_mount(Mounted::host(vnode.clone(), node, Vec::new())))
            }
            VNodeKind::Element(tag) => {
                let node = host.create_element(tag);
                host.apply_attribute_delta(node, &Attributes::default(), vnode.props().attributes())?;
                let mut children = Vec::with_capacity(vnode.children().len());
                for child in vnode.children() {
                    let mount = self.mount_new(host, node, child, depth + 1)?;
                    host.append_child(node, self.host_of(mount)?)?;
                    children.push(mount);
                }
                Ok(self.insert_mount(Mounted::host(vnode.clone(), node, children)))
            }
            VNodeKind::Component(component) => {
                self.mount_component(host, parent, vnode, component, depth)
            }
        }
    }

    /// Creates an instance for `vnode` and builds its output detached.
    fn mount_component(
        &mut self,
        host: &mut dyn HostAdapter,
        parent: HostId,
        vnode: &VNode,
        component: &Component,
        depth: usize,
    ) -> Result<MountId, RenderError> {
        let mount = self.insert_mount(Mounted::component(vnode.clone()));
        let id = self.instances.insert(ComponentInstance::new(
            component.clone(),
            vnode.props().clone(),
            parent,
            mount,
            depth,
        ));
        self.journal.created_instances.push(id);
        if let Some(mounted) = self.mounts.get_mut(mount) {
            mounted.instance = Some(id);
        }
        let child = self.render(id)?;
        let rendered = self.mount_new(host, parent, &child, depth + 1)?;
        self.link_rendered(id, mount, Some(rendered))?;
        Ok(mount)
    }

    fn reconcile_children(
        &mut self,
        host: &mut dyn HostAdapter,
        parent: HostId,
        old: &[MountId],
        new: &[VNode],
        depth: usize,
    ) -> Result<Vec<MountId>, RenderError> {
        let keyed = new.iter().any(|child| child.key().is_some())
            || old.iter().any(|&mount| self.key_of(mount).is_some());
        if keyed {
            return self.reconcile_keyed(host, parent, old, new, depth);
        }

        let mut mounted = Vec::with_capacity(new.len());
        for index in 0..old.len().max(new.len()) {
            let previous = old.get(index).copied();
            if let Some(mount) = self.reconcile_at(host, parent, previous, new.get(index), depth)? {
                mounted.push(mount);
            }
        }
        Ok(mounted)
    }

    fn reconcile_keyed(
        &mut self,
        host: &mut dyn HostAdapter,
        parent: HostId,
        old: &[MountId],
        new: &[VNode],
        depth: usize,
    ) -> Result<Vec<MountId>, RenderError> {
        let mut by_key: IndexMap<Key, MountId> = IndexMap::default();
        let mut unkeyed = VecDeque::new();
        let mut unclaimed: HashSet<MountId> = HashSet::default();
        for &mount in old {
            unclaimed.insert(mount);
            match self.key_of(mount) {
                Some(key) if by_key.contains_key(&key) => {
                    log::warn!("duplicate key {key} among siblings under host node {parent}");
                }
                Some(key) => {
                    by_key.insert(key, mount);
                }
                None => unkeyed.push_back(mount),
            }
        }

        let mut seen: HashSet<Key> = HashSet::default();
        let mut mounted = Vec::with_capacity(new.len());
        for child in new {
            let matched = match child.key() {
                Some(key) => {
                    if !seen.insert(key.clone()) {
                        log::warn!("duplicate key {key} in new children of host node {parent}");
                    }
                    by_key.shift_remove(key)
                }
                None => unkeyed.pop_front(),
            };
            if let Some(previous) = matched {
                unclaimed.remove(&previous);
            }
            if let Some(mount) = self.reconcile_at(host, parent, matched, Some(child), depth)? {
                mounted.push(mount);
            }
        }

        for &mount in old {
            if unclaimed.contains(&mount) {
                self.remove(parent, mount)?;
            }
        }

        let order = mounted
            .iter()
            .filter_map(|&mount| self.host_of(mount).ok())
            .collect();
        self.queue.push(Mutation::Reorder { parent, order });
        Ok(mounted)
    }

    fn key_of(&self, mount: MountId) -> Option<Key> {
        self.mounts.get(mount)?.vnode.key().cloned()
    }

    /// Stages the removal of `mount`; its instances are torn down when the pass settles.
    fn remove(&mut self, parent: HostId, mount: MountId) -> Result<(), RenderError> {
        let node = self.host_of(mount)?;
        self.retire_subtree(mount);
        self.queue.push(Mutation::Remove { node, parent });
        Ok(())
    }

    fn retire_subtree(&mut self, mount: MountId) {
        self.journal.retired.push(Retired::Subtree(mount));
    }

    /// Retires the component position `mount` and hands back its expanded child.
    fn retire_instance(&mut self, mount: MountId) -> Option<MountId> {
        self.journal.retired.push(Retired::Instance(mount));
        self.mounts.get(mount)?.rendered
    }

    /// Pre-order teardown: an instance's cleanups run before its descendants'.
    fn unmount_subtree(&mut self, mount: MountId) {
        let Some(mounted) = self.mounts.remove(mount) else {
            return;
        };
        if let Some(id) = mounted.instance {
            if let Some(mut instance) = self.instances.remove(id) {
                instance.teardown();
            }
        }
        if let Some(rendered) = mounted.rendered {
            self.unmount_subtree(rendered);
        }
        for child in mounted.children {
            self.unmount_subtree(child);
        }
    }

    fn unmount_instance_only(&mut self, mount: MountId) {
        let Some(mounted) = self.mounts.remove(mount) else {
            return;
        };
        if let Some(mut instance) = mounted.instance.and_then(|id| self.instances.remove(id)) {
            instance.teardown();
        }
    }
}

#[cfg(test)]
#[path = "tests/reconcile_tests.rs"]
mod tests;
