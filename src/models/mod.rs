//! Data models for the documentation pipeline.
//!
//! - [`RawConfig`]: the configuration as loaded, mutable until plugins have seen it
//! - [`RunConfig`]: the resolved, immutable configuration shared as `Arc<RunConfig>`
//! - [`RunState`]: the few fields that change across regeneration passes
//! - [`PackageMetadata`]: the target project's manifest
//! - [`DocumentRecord`] / [`DocDatabase`]: extracted documentation for one pass

pub mod config;
pub mod doc;
pub mod package;
pub mod run_state;

pub use config::{
    DEFAULT_INCLUDE, DEFAULT_PUBLISHER, LogLevel, PluginDescriptor, PluginSpec, RawConfig,
    RawTestConfig, RunConfig, SourceSpec, TestRunConfig,
};
pub use doc::{AstRecord, Coverage, DocDatabase, DocKind, DocumentRecord, VirtualCode};
pub use package::{FormattedPackage, PackageMetadata};
pub use run_state::{InvalidCode, MenuLink, RunState};
