use thiserror::Error;

/// Invalid tracker settings. Fatal for the tracker instance being built, never for the process.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Tracking interval must be at least one second")]
    ZeroInterval,

    #[error("Tracking interval must be a whole number of seconds, got {0:?}")]
    FractionalInterval(std::time::Duration),

    #[error("{0} must be greater than zero")]
    ZeroThreshold(&'static str),

    #[error("Minimum session duration ({min}s) must be below the focus threshold ({focus}s)")]
    MinimumAboveFocus { min: u64, focus: u64 },

    #[error("Focus history must keep at least one session")]
    EmptyFocusHistory,

    #[error("Failed to access configuration file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Malformed configuration file: {0}")]
    Parse(#[from] serde_json::Error),
}
