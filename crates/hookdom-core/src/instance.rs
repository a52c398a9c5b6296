//! Persistent identity of mounted component occurrences.

use slotmap::new_key_type;

use crate::hooks::HookSlot;
use crate::host::HostId;
use crate::vnode::{Component, Props};

new_key_type! {
    /// Handle of a [`ComponentInstance`] in the reconciler's instance arena.
    pub struct InstanceId;
    /// Handle of a mounted tree position in the reconciler's node arena.
    pub struct MountId;
}

/// Where an instance sits in the mounted tree, as of the last committed pass.
///
/// Hook slots are not part of it: state folded by an aborted render stays folded.
pub(crate) struct Placement {
    props: Props,
    host_parent: HostId,
    depth: usize,
    last_rendered: Option<MountId>,
}

/// Per-occurrence storage that survives re-renders of the same tree position.
pub(crate) struct ComponentInstance {
    pub(crate) component: Component,
    pub(crate) props: Props,
    pub(crate) hook_slots: Vec<HookSlot>,
    /// Locked in by the first successful render.
    pub(crate) expected_slot_count: Option<usize>,
    pub(crate) last_rendered: Option<MountId>,
    pub(crate) host_parent: HostId,
    pub(crate) mount: MountId,
    pub(crate) depth: usize,
    pub(crate) renders: usize,
}

impl ComponentInstance {
    pub(crate) fn new(
        component: Component,
        props: Props,
        host_parent: HostId,
        mount: MountId,
        depth: usize,
    ) -> Self {
        Self {
            component,
            props,
            hook_slots: Vec::new(),
            expected_slot_count: None,
            last_rendered: None,
            host_parent,
            mount,
            depth,
            renders: 0,
        }
    }

    pub(crate) fn placement(&self) -> Placement {
        Placement {
            props: self.props.clone(),
            host_parent: self.host_parent,
            depth: self.depth,
            last_rendered: self.last_rendered,
        }
    }

    pub(crate) fn restore(&mut self, placement: Placement) {
        self.props = placement.props;
        self.host_parent = placement.host_parent;
        self.depth = placement.depth;
        self.last_rendered = placement.last_rendered;
    }

    /// Runs every stored effect cleanup exactly once and disarms pending effects.
    pub(crate) fn teardown(&mut self) {
        log::trace!(
            "unmounting {} after {} render(s)",
            self.component.name(),
            self.renders
        );
        for slot in self.hook_slots.drain(..) {
            if let HookSlot::Effect(cell) = slot {
                let cleanup = {
                    let mut cell = cell.borrow_mut();
                    cell.alive = false;
                    cell.cleanup.take()
                };
                if let Some(cleanup) = cleanup {
                    cleanup();
                }
            }
        }
    }
}
