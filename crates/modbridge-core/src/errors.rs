//! Classified engine errors.
//!
//! Most of the engine propagates `anyhow::Error` with `.context(...)` chains.
//! Failures a caller may want to branch on are raised as a [`ModError`] somewhere
//! in that chain and can be recovered with [`ModError::classify`].

use std::fmt;
use std::sync::Arc;

/// Error taxonomy for schema composition and function calls.
#[derive(Debug, Clone)]
pub enum ModError {
    /// A declared field, function or argument uses the reserved `id` name.
    ReservedName {
        /// "field", "function" or "argument"
        kind: &'static str,
        name: String,
        /// Object, interface or function the name was declared on
        owner: String,
    },

    /// Any other composition-time rule violation (cross-module type leakage,
    /// constructor return mismatch, extending a foreign object).
    Validation { module: String, message: String },

    /// A value had the wrong shape for the type it was converted through.
    Conversion { expected: String, got: String },

    /// A call named an argument the function doesn't declare.
    UnknownArgument { function: String, argument: String },

    /// The runtime failed while executing a function.
    Invocation { module: String, function: String },

    /// The runtime finished without writing an output file.
    NoResult { function: String },

    /// The output file wasn't valid JSON.
    InvalidResult { function: String, message: String },

    /// A resolver panicked.
    Panic {
        /// `Object.function`
        function: String,
        message: String,
        backtrace: String,
    },

    /// Two schema fragments define the same type or field.
    MergeConflict {
        type_name: String,
        field: Option<String>,
        reason: ConflictKind,
    },

    /// A merged schema failed validation.
    InvalidSchema { message: String },

    /// Lookup failure: a module, type, field or resolver that doesn't exist.
    NotFound { what: &'static str, name: String },

    /// The caller's context was cancelled while a call was in flight.
    Cancelled,
}

/// The kind of a schema merge conflict.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConflictKind {
    Field,
    Scalar,
    Type,
}

impl ModError {
    pub fn conversion(expected: impl Into<String>, got: impl Into<String>) -> Self {
        ModError::Conversion {
            expected: expected.into(),
            got: got.into(),
        }
    }

    pub fn validation(module: &str, message: impl Into<String>) -> Self {
        ModError::Validation {
            module: module.to_string(),
            message: message.into(),
        }
    }

    pub fn not_found(what: &'static str, name: impl Into<String>) -> Self {
        ModError::NotFound {
            what,
            name: name.into(),
        }
    }

    /// Find the outermost classified error in `err`'s chain, looking through
    /// memoized [`SharedError`]s.
    pub fn classify(err: &anyhow::Error) -> Option<&ModError> {
        if let Some(e) = err.downcast_ref::<ModError>() {
            return Some(e);
        }
        err.chain()
            .find_map(|cause| cause.downcast_ref::<SharedError>())
            .and_then(|shared| ModError::classify(shared.inner()))
    }

    pub fn is_cancelled(err: &anyhow::Error) -> bool {
        matches!(ModError::classify(err), Some(ModError::Cancelled))
    }
}

impl fmt::Display for ModError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ModError::ReservedName { kind, name, owner } => {
                let owner_kind = if *kind == "argument" { "function" } else { "object" };
                write!(
                    f,
                    "cannot define {} with reserved name {:?} on {} {:?}",
                    kind, name, owner_kind, owner
                )
            }
            ModError::Validation { module, message } => {
                write!(f, "invalid module {:?}: {}", module, message)
            }
            ModError::Conversion { expected, got } => {
                write!(f, "conversion error: expected {}, got {}", expected, got)
            }
            ModError::UnknownArgument { function, argument } => {
                write!(f, "function {:?} has no argument {:?}", function, argument)
            }
            ModError::Invocation { module, function } => {
                write!(f, "failed to execute function {:?} of module {:?}", function, module)
            }
            ModError::NoResult { function } => {
                write!(f, "function {:?} returned no result", function)
            }
            ModError::InvalidResult { function, message } => {
                write!(f, "failed to unmarshal result of function {:?}: {}", function, message)
            }
            ModError::Panic {
                function,
                message,
                backtrace,
            } => {
                write!(f, "panic in {}: {}", function, message)?;
                if !backtrace.is_empty() {
                    write!(f, "\n{}", backtrace)?;
                }
                Ok(())
            }
            ModError::MergeConflict {
                type_name,
                field,
                reason,
            } => match (field, reason) {
                (Some(field), _) => {
                    write!(f, "conflict on type {:?} field {:?}: field already defined", type_name, field)
                }
                (None, ConflictKind::Scalar) => {
                    write!(f, "conflict on type {:?}: scalar already defined", type_name)
                }
                (None, _) => write!(
                    f,
                    "conflict on type {:?}: already defined with a different kind",
                    type_name
                ),
            },
            ModError::InvalidSchema { message } => {
                write!(f, "schema validation failed: {}", message)
            }
            ModError::NotFound { what, name } => write!(f, "{} {:?} not found", what, name),
            ModError::Cancelled => write!(f, "call cancelled"),
        }
    }
}

impl std::error::Error for ModError {}

// =============================================================================
// Shared errors
// =============================================================================

/// A cloneable handle to an error, so one failure can be returned to every
/// waiter of a memoized computation.
#[derive(Clone)]
pub struct SharedError(Arc<anyhow::Error>);

impl SharedError {
    pub fn inner(&self) -> &anyhow::Error {
        &self.0
    }
}

impl From<anyhow::Error> for SharedError {
    fn from(err: anyhow::Error) -> Self {
        SharedError(Arc::new(err))
    }
}

impl fmt::Display for SharedError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // sources are reported through `source()`
        write!(f, "{}", self.0)
    }
}

impl fmt::Debug for SharedError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SharedError({:#})", self.0)
    }
}

impl std::error::Error for SharedError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.0.source()
    }
}
