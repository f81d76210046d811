//! Services module - the orchestration logic between configuration and publishing.
//!
//! # Components
//!
//! - [`collaborators`]: traits for the external parser, resolver, publisher,
//!   glob hydration and package formatting
//! - [`registry`]: named factories that configs refer to
//! - [`discovery`]: source expansion and include / exclude filtering
//! - [`hooks`]: the plugin trait and the dispatcher that drives it
//! - [`pipeline`]: sequential parse dispatch into the Doc Database
//! - [`builtin`]: the collaborators shipped with the crate
//!
//! Nothing in here owns process lifetime; see [`crate::lifecycle`].

pub mod builtin;
pub mod collaborators;
pub mod discovery;
pub mod hooks;
pub mod pipeline;
pub mod registry;

pub use collaborators::{
    DocResolver, GlobHydrator, Hydrated, PackageFormatter, ParseOutput, Parser, PublishContext,
    Publisher, Runtime,
};
pub use discovery::{FileCandidate, FileDiscovery, FileFilter, FilterDecision, FsGlobHydrator, PatternSet};
pub use hooks::{
    CompleteEvent, HandleConfigEvent, HandleDocDataEvent, HandleDocDbEvent, HandleVirtualEvent,
    HookDispatcher, HookPoint, Plugin, RegenerateEvent, ShutdownEvent, StartEvent,
};
pub use pipeline::{FileReparser, GenerationPipeline, OnParseError};
pub use registry::CollaboratorRegistry;
