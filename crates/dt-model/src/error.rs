use thiserror::Error;

pub type ModelResult<T> = Result<T, ModelError>;

/// Failures of delayed (time-shifted) signal reads.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum LookupError {
    #[error("Delayed read of {path} before any sample was committed")]
    EmptyHistory { path: String },

    #[error("Delay for {path} must not be positive (d={delay})")]
    FutureDelay { path: String, delay: f64 },

    #[error("History index out of range for {path} (index={index}, len={len})")]
    OutOfRange {
        path: String,
        index: usize,
        len: usize,
    },
}

#[derive(Error, Debug)]
pub enum ModelError {
    #[error("Duplicate name on node: {name}")]
    Duplicate { name: String },

    #[error("Invalid name: {name:?}")]
    InvalidName { name: String },

    #[error("Model is frozen: {what}")]
    Frozen { what: &'static str },

    #[error("Input already wired: {path}")]
    AlreadyWired { path: String },

    #[error("Unknown signal: {what}")]
    UnknownSignal { what: String },

    #[error("Derivative already defined for state {path}")]
    DerivativeExists { path: String },

    #[error("State {path} has no derivative")]
    MissingDerivative { path: String },

    #[error("Length mismatch for {what}: expected {expected}, got {got}")]
    LengthMismatch {
        what: &'static str,
        expected: usize,
        got: usize,
    },

    #[error("Nothing to override: node {path} has no committed sample")]
    NothingToOverride { path: String },

    #[error("Algebraic loop while evaluating {path}")]
    AlgebraicLoop { path: String },

    #[error("Lookup error: {0}")]
    Lookup(#[from] LookupError),

    #[error("Core error: {0}")]
    Core(#[from] dt_core::CoreError),
}
