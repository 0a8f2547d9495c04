use thiserror::Error;

/// Failures reported by plugins (providers, suggesters) and the resources and
/// playbacks they create.
#[derive(Error, Debug)]
pub enum PluginError {
    #[error("No such song: {0}")]
    NoSuchSong(String),

    #[error("Song could not be loaded: {0}")]
    SongLoading(String),

    /// The suggester has no suggestion right now. Not a permanent failure.
    #[error("Suggester can't suggest anything right now: {0}")]
    BrokenSuggester(String),

    #[error("Playback could not be created: {0}")]
    PlaybackCreation(String),

    #[error("Playback failed: {0}")]
    Playback(String),

    #[error("Resource error: {0}")]
    Resource(String),

    #[error("Plugin initialization failed: {0}")]
    Initialization(String),

    #[error("Plugin configuration error: {0}")]
    Configuration(String),

    #[error("Invalid song: {0}")]
    InvalidSong(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl PluginError {
    /// Whether retrying the same operation later may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            PluginError::BrokenSuggester(_) | PluginError::SongLoading(_) | PluginError::Io(_)
        )
    }

    pub fn is_broken_suggester(&self) -> bool {
        matches!(self, PluginError::BrokenSuggester(_))
    }
}

pub type Result<T> = std::result::Result<T, PluginError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_classification() {
        assert!(PluginError::BrokenSuggester("empty".into()).is_transient());
        assert!(PluginError::SongLoading("timeout".into()).is_transient());
        assert!(!PluginError::NoSuchSong("42".into()).is_transient());
        assert!(!PluginError::Initialization("no token".into()).is_transient());
    }

    #[test]
    fn test_io_conversion() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        let err: PluginError = io.into();
        assert!(matches!(err, PluginError::Io(_)));
        assert!(err.to_string().contains("gone"));
    }
}
