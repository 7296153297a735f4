//! Error types for the pod driver.

/// Result type alias for driver operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while driving pods on the container runtime.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Caller-supplied configuration is invalid.
    #[error("invalid configuration: {0}")]
    BadInput(String),

    /// A named container, pod or volume is absent.
    #[error("not found: {0}")]
    NotFound(String),

    /// Runtime state violates a driver invariant.
    #[error("inconsistent runtime state: {0}")]
    Inconsistent(String),

    /// The operation cannot be performed on this platform or configuration.
    #[error("unsupported: {0}")]
    Unsupported(String),

    /// The operation was cancelled by the caller.
    #[error("operation cancelled")]
    Cancelled,

    /// Underlying runtime failure, wrapped with a message context.
    #[error("{context}: {source}")]
    Runtime {
        context: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// I/O failure while streaming to or from caller-provided sinks.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Aggregate of independent best-effort failures.
    #[error("{0}")]
    Aggregate(Errors),
}

/// Coarse classification of an [`Error`], independent of its payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    BadInput,
    NotFound,
    Inconsistent,
    Unsupported,
    Cancelled,
    Runtime,
}

impl Error {
    /// Wraps an underlying runtime error with a message context.
    pub fn runtime(
        context: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Error::Runtime {
            context: context.into(),
            source: Box::new(source),
        }
    }

    /// Returns the kind of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::BadInput(_) => ErrorKind::BadInput,
            Error::NotFound(_) => ErrorKind::NotFound,
            Error::Inconsistent(_) => ErrorKind::Inconsistent,
            Error::Unsupported(_) => ErrorKind::Unsupported,
            Error::Cancelled => ErrorKind::Cancelled,
            Error::Runtime { .. } | Error::Io(_) | Error::Aggregate(_) => ErrorKind::Runtime,
        }
    }
}

/// Collection of errors from a best-effort multi-step operation.
///
/// The shutdown paths (stop, remove) attempt every step and report all
/// failures instead of short-circuiting on the first one. Equality compares
/// the rendered member messages without regard to order, so two aggregates
/// produced by retrying the same failed teardown compare equal.
#[derive(Debug, Default)]
pub struct Errors {
    errs: Vec<Error>,
}

impl Errors {
    /// Creates an empty collection.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends an error.
    pub fn push(&mut self, err: Error) {
        self.errs.push(err);
    }

    /// Returns true when no errors were collected.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.errs.is_empty()
    }

    /// Returns the collected errors.
    #[must_use]
    pub fn errors(&self) -> &[Error] {
        &self.errs
    }

    /// Converts the collection into a `Result`, failing when non-empty.
    pub fn into_result(self) -> Result<()> {
        if self.errs.is_empty() {
            Ok(())
        } else {
            Err(Error::Aggregate(self))
        }
    }

    fn messages(&self) -> Vec<String> {
        let mut msgs: Vec<String> = self.errs.iter().map(ToString::to_string).collect();
        msgs.sort();
        msgs
    }
}

impl std::fmt::Display for Errors {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let msgs: Vec<String> = self.errs.iter().map(ToString::to_string).collect();
        write!(f, "{}", msgs.join(", "))
    }
}

impl PartialEq for Errors {
    fn eq(&self, other: &Self) -> bool {
        self.messages() == other.messages()
    }
}

impl Eq for Errors {}
