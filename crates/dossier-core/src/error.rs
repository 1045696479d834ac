use thiserror::Error;

/// Top-level error type for the Dossier core crate.
///
/// Identifier and token parsing report their own `DocIdError` and
/// `AuthError`; callers convert those into their own error types.
#[derive(Error, Debug)]
pub enum DossierError {
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Missing required setting: {0}")]
    MissingSetting(&'static str),
}
