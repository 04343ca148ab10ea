use thiserror::Error;

#[derive(Debug, Error)]
pub enum ListingError {
    #[error("no listing source registered for provider {0}")]
    UnknownProvider(String),

    #[error("listing source for {provider} failed: {message}")]
    SourceFailed { provider: String, message: String },
}
