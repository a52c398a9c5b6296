#![doc = r"Reconciliation engine and hook runtime for a retained-mode UI tree."]

pub mod collections;
pub mod config;
pub mod hash;
pub mod hooks;
pub mod host;
pub mod instance;
pub mod mutation;
pub mod platform;
pub mod reconcile;
pub mod root;
pub mod runtime;
pub mod vnode;

pub use config::EngineConfig;
pub use hooks::{
    current_instance, use_callback, use_effect, use_memo, use_reducer, use_ref, use_state, Cleanup,
    Dependency, Deps, Dispatch, Ref, SetState,
};
pub use host::{HandlerTable, HostAdapter, HostId, MemoryHost};
pub use instance::{InstanceId, MountId};
pub use mutation::{Mutation, MutationKind, MutationQueue};
pub use platform::RuntimeScheduler;
pub use reconcile::Reconciler;
pub use root::Root;
pub use runtime::{DefaultScheduler, Runtime, RuntimeHandle};
pub use vnode::{
    Attributes, Component, Element, Event, EventHandler, Key, PropValue, Props, VNode, VNodeKind,
};

use std::fmt;

/// Misuse of the hook API. Both variants are programmer errors and abort the
/// render that detected them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HookError {
    /// A hook ran while no component render was in progress.
    Context,
    /// A component called a different number of hooks than on its first render.
    Order { expected: usize, found: usize },
    /// The slot at `index` holds a different hook than the one being called.
    SlotKind {
        index: usize,
        expected: &'static str,
        found: &'static str,
    },
}

impl fmt::Display for HookError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HookError::Context => f.write_str("hook called outside of a component render"),
            HookError::Order { expected, found } => write!(
                f,
                "hook order changed between renders: expected {expected} hook calls, found {found}"
            ),
            HookError::SlotKind {
                index,
                expected,
                found,
            } => write!(
                f,
                "hook slot {index} holds {found} but {expected} was requested"
            ),
        }
    }
}

impl std::error::Error for HookError {}

/// Failure reported by a [`HostAdapter`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostError {
    Missing { id: HostId },
    NotAnElement { id: HostId },
    NotText { id: HostId },
    NotAChild { parent: HostId, child: HostId },
}

impl fmt::Display for HostError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HostError::Missing { id } => write!(f, "host node {id} missing"),
            HostError::NotAnElement { id } => write!(f, "host node {id} is not an element"),
            HostError::NotText { id } => write!(f, "host node {id} is not a text node"),
            HostError::NotAChild { parent, child } => {
                write!(f, "host node {child} is not a child of {parent}")
            }
        }
    }
}

impl std::error::Error for HostError {}

/// Anything that can stop a render, commit or flush.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RenderError {
    Hook(HookError),
    Host(HostError),
    /// A component instance referenced by the mounted tree no longer exists.
    MissingInstance,
    /// A mounted tree position referenced by the engine no longer exists.
    MissingMount,
    /// `run_until_idle` gave up because updates kept scheduling more work.
    FlushLimit { passes: usize },
}

impl fmt::Display for RenderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RenderError::Hook(err) => err.fmt(f),
            RenderError::Host(err) => err.fmt(f),
            RenderError::MissingInstance => f.write_str("component instance missing"),
            RenderError::MissingMount => f.write_str("mounted node missing"),
            RenderError::FlushLimit { passes } => {
                write!(f, "updates still pending after {passes} flush passes")
            }
        }
    }
}

impl std::error::Error for RenderError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            RenderError::Hook(err) => Some(err),
            RenderError::Host(err) => Some(err),
            _ => None,
        }
    }
}

impl From<HookError> for RenderError {
    fn from(err: HookError) -> Self {
        RenderError::Hook(err)
    }
}

impl From<HostError> for RenderError {
    fn from(err: HostError) -> Self {
        RenderError::Host(err)
    }
}
