use thiserror::Error;

#[derive(Error, Debug)]
pub enum SchedError {
    /// The kernel-side scheduler object could not be constructed or bound.
    #[error("init error: {0}")]
    Init(String),

    /// An operation was attempted outside the valid session window.
    #[error("invalid use: {0}")]
    InvalidUse(String),

    #[error("config error: {0}")]
    Config(String),

    #[error("config parse error: {0}")]
    ConfigParse(#[from] toml::de::Error),

    /// A shared counter would leave its 64-bit range.
    #[error("counter overflow: {0}")]
    Overflow(String),

    #[error("topology error: {0}")]
    Topology(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl SchedError {
    /// True for errors that mean "no session was created".
    pub fn is_init(&self) -> bool {
        matches!(self, SchedError::Init(_))
    }
}
