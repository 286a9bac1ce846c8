//! Error types shared across the crate.

use thiserror::Error;

/// Errors raised by loaders, codecs and registries.
///
/// The simulation step itself never fails; it degrades the affected body and
/// logs instead.
#[derive(Debug, Error)]
pub enum TesseraError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The height-map magic was found byte-swapped.
    #[error("height map was written on a machine with different endianness")]
    Endianness,

    #[error("corrupt height map header (type id {0:#010x})")]
    CorruptHeader(u32),

    #[error("truncated data: expected {expected} bytes, got {actual}")]
    Truncated { expected: usize, actual: usize },

    #[error("invalid height map grid: {0}")]
    InvalidGrid(String),

    #[error("XML error: {0}")]
    Xml(#[from] quick_xml::DeError),

    #[error("missing element <{0}>")]
    MissingElement(String),

    #[error("unknown synchronisation model: {0}")]
    UnknownSynchronisationModel(String),

    #[error("failed to create synchronisation model {name}: {reason}")]
    ModelCreation { name: String, reason: String },

    /// Fixed step sizes must be finite and positive.
    #[error("invalid step size: {0}")]
    InvalidStepSize(f32),

    #[error("collision line set has no lines")]
    EmptyLineSet,

    #[error("unknown collision shape type: {0}")]
    UnknownShape(String),
}

/// Convenience result alias.
pub type TesseraResult<T> = Result<T, TesseraError>;
