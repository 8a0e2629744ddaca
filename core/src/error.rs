use std::path::PathBuf;

/// Errors surfaced by the simulation engine.
#[derive(Debug, thiserror::Error)]
pub enum SimError {
    /// A configuration file is missing or unreadable.
    #[error("config file {path} could not be read: {source}")]
    ConfigNotFound {
        path: PathBuf,
        source: std::io::Error,
    },

    /// A configuration field is missing, has the wrong type, or fails validation.
    #[error("malformed config in {path}: {detail}")]
    ConfigMalformed { path: PathBuf, detail: String },

    /// A logical process lost its channel and unwound.
    #[error("{process} was interrupted")]
    Interrupted { process: String },

    /// A broken internal invariant. Always a bug.
    #[error("invariant violated in {station}: {detail}")]
    Invariant { station: String, detail: String },

    /// The monitor lost a station; the run cannot continue.
    #[error("station {station} was lost: {detail}")]
    StationLost { station: String, detail: String },

    /// The demand model was built with invalid parameters.
    #[error("invalid distribution parameters: {detail}")]
    Distribution { detail: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}
