//! Staged host-tree instructions and the commit pass that applies them.

use std::fmt;
use std::mem;

use crate::host::{HostAdapter, HostId};
use crate::HostError;

pub type ApplyFn = Box<dyn FnOnce(&mut dyn HostAdapter) -> Result<(), HostError> + 'static>;

/// One staged instruction. Records are applied exactly once, in push order.
pub enum Mutation {
    /// Append a detached subtree under `parent`.
    Place { node: HostId, parent: HostId },
    Remove { node: HostId, parent: HostId },
    Replace {
        old: HostId,
        new: HostId,
        parent: HostId,
    },
    /// In-place change of `node` (text value or attribute delta).
    Update { node: HostId, apply: ApplyFn },
    /// Desired final child order of `parent`.
    Reorder { parent: HostId, order: Vec<HostId> },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MutationKind {
    Place,
    Remove,
    Replace,
    Update,
    Reorder,
}

impl Mutation {
    pub fn kind(&self) -> MutationKind {
        match self {
            Mutation::Place { .. } => MutationKind::Place,
            Mutation::Remove { .. } => MutationKind::Remove,
            Mutation::Replace { .. } => MutationKind::Replace,
            Mutation::Update { .. } => MutationKind::Update,
            Mutation::Reorder { .. } => MutationKind::Reorder,
        }
    }

    /// The host node this record acts on; the parent for `Reorder`.
    pub fn target(&self) -> HostId {
        match self {
            Mutation::Place { node, .. }
            | Mutation::Remove { node, .. }
            | Mutation::Update { node, .. } => *node,
            Mutation::Replace { old, .. } => *old,
            Mutation::Reorder { parent, .. } => *parent,
        }
    }

    /// Root of the detached subtree this record attaches, if any.
    pub fn attaches(&self) -> Option<HostId> {
        match self {
            Mutation::Place { node, .. } => Some(*node),
            Mutation::Replace { new, .. } => Some(*new),
            _ => None,
        }
    }

    pub fn apply(self, host: &mut dyn HostAdapter) -> Result<(), HostError> {
        match self {
            Mutation::Place { node, parent } => host.append_child(parent, node),
            Mutation::Remove { node, parent } => host.remove_child(parent, node),
            Mutation::Replace { old, new, parent } => host.replace_child(parent, new, old),
            Mutation::Update { apply, .. } => apply(host),
            Mutation::Reorder { parent, order } => apply_reorder(host, parent, &order),
        }
    }
}

impl fmt::Debug for Mutation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Mutation::Place { node, parent } => write!(f, "Place({node} -> {parent})"),
            Mutation::Remove { node, parent } => write!(f, "Remove({node} from {parent})"),
            Mutation::Replace { old, new, parent } => {
                write!(f, "Replace({old} with {new} in {parent})")
            }
            Mutation::Update { node, .. } => write!(f, "Update({node})"),
            Mutation::Reorder { parent, order } => write!(f, "Reorder({parent}: {order:?})"),
        }
    }
}

/// Walks the desired order once and only moves nodes whose live position differs.
fn apply_reorder(
    host: &mut dyn HostAdapter,
    parent: HostId,
    order: &[HostId],
) -> Result<(), HostError> {
    let mut live = host.child_nodes(parent)?;
    let mut moves = 0usize;
    for (index, &node) in order.iter().enumerate() {
        if live.get(index) == Some(&node) {
            continue;
        }
        let before = live.get(index).copied();
        host.insert_before(parent, node, before)?;
        if let Some(current) = live.iter().position(|&id| id == node) {
            live.remove(current);
        }
        live.insert(index.min(live.len()), node);
        moves += 1;
    }
    log::trace!("reorder of {parent}: {moves} move(s) for {} children", order.len());
    Ok(())
}

/// Flat, ordered list of staged records owned by one render+commit cycle.
#[derive(Default)]
pub struct MutationQueue {
    records: Vec<Mutation>,
}

impl MutationQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, record: Mutation) {
        self.records.push(record);
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn records(&self) -> &[Mutation] {
        &self.records
    }

    pub fn kinds(&self) -> Vec<MutationKind> {
        self.records.iter().map(Mutation::kind).collect()
    }

    pub fn clear(&mut self) {
        self.records.clear();
    }

    /// Removes and returns the records staged after the first `len`.
    pub(crate) fn split_off(&mut self, len: usize) -> Vec<Mutation> {
        self.records.split_off(len.min(self.records.len()))
    }

    /// Drains the queue and applies every record in order.
    ///
    /// The queue is empty afterwards even when a record fails; records applied
    /// before the failure stay applied.
    pub fn commit(&mut self, host: &mut dyn HostAdapter) -> Result<usize, HostError> {
        let records = mem::take(&mut self.records);
        let total = records.len();
        for record in records {
            log::trace!("apply {record:?}");
            record.apply(host)?;
        }
        Ok(total)
    }
}

impl fmt::Debug for MutationQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(&self.records).finish()
    }
}

#[cfg(test)]
#[path = "tests/mutation_tests.rs"]
mod tests;
