// State module
//
// The shared Doc Database handle and the lifecycle state machine.

pub mod doc_store;
pub mod machine;

pub use doc_store::{DocChange, DocStore};
pub use machine::{LifecycleState, StateMachine, Transition};
