use crate::error::{CollaboratorFailure, GenerateError};

/// Exit status for every fatal error.
pub const FATAL_EXIT_CODE: u8 = 1;

const SEPARATOR: &str =
    "-----------------------------------------------------------------------------------------------";

/// How a fatal error was classified.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FatalKind {
    ConfigInvalid,
    /// Raised inside a named collaborator.
    Collaborator { module: String, builtin: bool },
    Unknown,
}

/// The single diagnostic emitted for a fatal error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FatalReport {
    pub kind: FatalKind,
    pub message: String,
}

/// Formats fatal errors and picks the exit status.
///
/// It never terminates the process itself; `main` does that with the
/// returned status.
#[derive(Debug, Clone, Default)]
pub struct ErrorHandler {
    full_stack_trace: bool,
    package_message: Option<String>,
}

impl ErrorHandler {
    pub fn new(full_stack_trace: bool) -> Self {
        Self {
            full_stack_trace,
            package_message: None,
        }
    }

    /// Formatted target package summary appended to collaborator reports.
    pub fn with_package_message(mut self, message: impl Into<String>) -> Self {
        let message = message.into();
        self.package_message = (!message.is_empty()).then_some(message);
        self
    }

    pub fn report(&self, err: &anyhow::Error) -> FatalReport {
        let version = crate::VERSION;
        let details = if self.full_stack_trace {
            format!("{err:?}")
        } else {
            format!("{err:#}")
        };

        let is_validation = err
            .chain()
            .any(|cause| matches!(cause.downcast_ref::<GenerateError>(), Some(GenerateError::ConfigValidation(_))));

        if is_validation {
            return FatalReport {
                kind: FatalKind::ConfigInvalid,
                message: format!("The provided config file failed validation; tjsdoc ({version}): {details}"),
            };
        }

        let failure = (!self.full_stack_trace)
            .then(|| err.downcast_ref::<CollaboratorFailure>())
            .flatten();

        if let Some(failure) = failure {
            let builtin = failure.is_builtin();
            let header = if builtin {
                "An uncaught fatal error has been detected with a TJSDoc module.\n\
                 Please report this error to the TJSDoc issues forum after checking if a similar report already exists:"
            } else {
                "An uncaught fatal error has been detected with an external module.\n\
                 Please report this error to any issues forum after checking if a similar report already exists:"
            };

            let mut message = format!("{header}\n{SEPARATOR}\nmodule: {}\n", failure);
            if let Some(package) = &self.package_message {
                message.push_str(package);
                message.push('\n');
            }
            message.push_str(&format!("tjsdoc version: {version}\n{SEPARATOR}\n{details}"));

            return FatalReport {
                kind: FatalKind::Collaborator {
                    module: failure.module.clone(),
                    builtin,
                },
                message,
            };
        }

        FatalReport {
            kind: FatalKind::Unknown,
            message: format!("An unknown fatal error has occurred; tjsdoc ({version}): {details}"),
        }
    }

    /// Log the diagnostic and return the exit status.
    pub fn handle(&self, err: &anyhow::Error) -> u8 {
        let report = self.report(err);
        tracing::error!("{}", report.message);
        FATAL_EXIT_CODE
    }
}
