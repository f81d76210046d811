// TJSDoc - API documentation generation orchestrator
//
// This is the library crate containing the lifecycle, plugin protocol and
// pipeline. The binary crate (main.rs) provides the CLI entry point.

pub mod config;
pub mod error;
pub mod lifecycle;
pub mod logging;
pub mod metrics;
pub mod models;
pub mod services;
pub mod state;

// Re-export commonly used types for convenience
pub use config::{ConfigLocator, ConfigResolver};
pub use error::{CollaboratorFailure, FileParseError, GenerateError};
pub use lifecycle::{Coordinator, CoordinatorBuilder, ErrorHandler, LifecycleHandle};
pub use models::{DocDatabase, DocumentRecord, RawConfig, RunConfig, RunState};
pub use services::{CollaboratorRegistry, OnParseError, Plugin};
pub use state::{DocChange, DocStore, LifecycleState};

/// Application version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Application name
pub const APP_NAME: &str = env!("CARGO_PKG_NAME");
