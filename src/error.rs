use thiserror::Error;

/// Errors reported by the sampler.  None of them are recoverable in the
/// middle of a sentence update.
#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid configuration: {0}")]
    Configuration(String),

    #[error("{family} model {class} not equal to zero: {tables} tables, {customers} customers")]
    InvariantViolation {
        family: &'static str,
        class: usize,
        tables: usize,
        customers: usize,
    },

    #[error("normalizing sum is zero at position {position}; stale cache or corrupted statistics")]
    NumericalDegeneracy { position: usize },

    #[error("attempted to remove non-existent symbol {0}")]
    UnknownSymbol(usize),

    #[error("{kind} {value} outside of [{lower}, {upper})")]
    OutOfRange {
        kind: &'static str,
        value: usize,
        lower: usize,
        upper: usize,
    },

    #[error("{family} model {class} has no customer for {outcome} to remove")]
    NotAdded {
        family: &'static str,
        class: usize,
        outcome: usize,
    },

    #[error("sentence {sid} was never added with these words and labels")]
    SentenceNotAdded { sid: usize },

    #[error("sentence has {words} words but {labels} labels")]
    LengthMismatch { words: usize, labels: usize },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
