use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Configuration directory not found")]
    ConfigDirNotFound,

    #[error(
        "Stack file not found. Looked in:\n\
        - current directory: deck.local.kdl, .deck.local.kdl, deck.kdl, .deck.kdl\n\
        - ./.weatherdeck/\n\
        - ~/.config/weatherdeck/deck.kdl\n\
        Set DECK_CONFIG_PATH to point at a file directly"
    )]
    StackFileNotFound,

    #[error("DECK_CONFIG_PATH points at a missing file: {0}")]
    ConfigPathMissing(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, ConfigError>;
