//! Errors raised by scope-chain operations

/// Script-visible error class of a [`ContextError`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    TypeError,
    RangeError,
    ReferenceError,
    OutOfMemory,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ContextError {
    /// Read of a lexical binding before its initializer ran
    #[error("cannot access '{0}' before initialization")]
    TemporalDeadZone(String),

    #[error("assignment to constant variable '{0}'")]
    ConstAssignment(String),

    /// Assignment to a non-writable activation property
    #[error("cannot assign to read only property '{0}'")]
    ReadOnly(String),

    #[error("{0} is not defined")]
    Unresolved(String),

    /// A count does not fit the context header
    #[error("range error: {0}")]
    Range(String),

    /// The heap is exhausted even after a full collection
    #[error("out of memory")]
    OutOfMemory,
}

impl ContextError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ContextError::TemporalDeadZone(_)
            | ContextError::ConstAssignment(_)
            | ContextError::ReadOnly(_) => ErrorKind::TypeError,
            ContextError::Range(_) => ErrorKind::RangeError,
            ContextError::Unresolved(_) => ErrorKind::ReferenceError,
            ContextError::OutOfMemory => ErrorKind::OutOfMemory,
        }
    }

    /// Check if the error must abort the engine
    pub fn is_fatal(&self) -> bool {
        matches!(self, ContextError::OutOfMemory)
    }
}

pub type Result<T> = std::result::Result<T, ContextError>;
