use std::{any::Any, fmt, sync::Arc};

/// The error a work item produced, normalized into one cloneable type.
///
/// Listeners, the error notification and the driver's slot all observe the same error, so it is
/// cheap to clone.
#[derive(Debug, Clone, thiserror::Error)]
pub enum Error {
    /// The work item panicked. Holds the panic message when it was a string.
    #[error("{0}")]
    Panicked(String),

    /// The work item returned or completed with an error.
    #[error(transparent)]
    Failed(Arc<dyn std::error::Error + Send + Sync + 'static>),

    /// The completion handle was dropped before the work item completed.
    #[error("work item dropped its completion handle without completing")]
    Abandoned,
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Wrap any error type.
    pub fn new<E>(error: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::Failed(Arc::new(error))
    }

    /// An error carrying only a message.
    ///
    /// ```rust
    /// let err = batch_adapter::Error::msg("two err");
    /// assert_eq!(err.to_string(), "two err");
    /// ```
    pub fn msg(message: impl Into<String>) -> Self {
        Self::new(Message(message.into()))
    }

    /// Build an error from a caught panic payload.
    pub(crate) fn from_panic(payload: Box<dyn Any + Send>) -> Self {
        let message = match payload.downcast::<String>() {
            Ok(message) => *message,
            Err(payload) => match payload.downcast::<&'static str>() {
                Ok(message) => (*message).to_string(),
                Err(_) => "work item panicked".to_string(),
            },
        };

        Self::Panicked(message)
    }

    /// Whether the work item panicked rather than reporting an error.
    pub fn is_panic(&self) -> bool {
        matches!(self, Self::Panicked(_))
    }

    /// Attempt to view the underlying error as a concrete type.
    pub fn downcast_ref<E>(&self) -> Option<&E>
    where
        E: std::error::Error + 'static,
    {
        match self {
            Self::Failed(inner) => inner.downcast_ref::<E>(),
            _ => None,
        }
    }
}

#[derive(Debug)]
struct Message(String);

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::error::Error for Message {}
