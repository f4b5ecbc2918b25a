/// Startup and environment failures of the server process.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("catalog error: {0}")]
    Catalog(String),

    #[error("profile error: {0}")]
    Profile(String),

    #[error("config error: {0}")]
    Config(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}
