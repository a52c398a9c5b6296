//! Testing utilities and harness for hookdom

pub mod testing;

pub use testing::*;

pub mod prelude {
    pub use crate::testing::*;
    pub use hookdom_core::{
        deps, use_callback, use_effect, use_memo, use_reducer, use_ref, use_state, Cleanup,
        Deps, Element, Event, HookError, Key, MutationKind, Props, RenderError, VNode,
    };
}
