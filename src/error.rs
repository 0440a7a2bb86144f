use thiserror::Error;

/// Crate-wide result type alias.
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for the transport engine.
///
/// Only conditions that must abort a stepping call surface here. Recoverable
/// situations inside a step (degenerate boundary crossings, missing surface
/// normals, rejected discrete interactions) are handled in place and logged.
#[derive(Debug, Error)]
pub enum Error {
    /// Invalid user or API parameter.
    #[error("invalid parameter: {0}")]
    InvalidParam(String),

    /// Invalid engine configuration value or document.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// Stepping was requested before a world was installed.
    #[error("no active world")]
    NoActiveWorld,

    /// A detector refers to an object outside the active world.
    #[error("detector `{0}` does not belong to the active world")]
    DetectorNotInWorld(String),

    /// A process produced a negative or non-finite macroscopic cross-section.
    #[error("invalid macroscopic cross-section {value} from process {process}")]
    InvalidCrossSection { process: &'static str, value: f64 },

    /// Geometric query failed its tolerance-bounded checks.
    #[error("geometry error: {0}")]
    Geometry(String),

    /// A Monte-Carlo sampler received parameters it cannot sample from.
    #[error("sampling error: {0}")]
    Sampling(String),

    /// Propagated I/O errors from detector log files.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}
