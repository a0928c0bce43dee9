use thiserror::Error;

/// Failures surfaced at the engine boundary.
///
/// None of these leave the engine wedged: the state is already consistent
/// when one is returned, and a later user-initiated command retries.
#[derive(Debug, Error)]
pub enum PlayerError {
    #[error("catalog unavailable: {0}")]
    Catalog(String),

    #[error("failed to open audio output: {0}")]
    Output(String),

    #[error("could not load `{url}`: {reason}")]
    Load { url: String, reason: String },

    #[error("playback could not start: {0}")]
    Start(String),

    #[error("seek failed: {0}")]
    Seek(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl PlayerError {
    pub fn load(url: impl Into<String>, reason: impl ToString) -> Self {
        Self::Load {
            url: url.into(),
            reason: reason.to_string(),
        }
    }
}
