#[derive(thiserror::Error, Debug)]
#[allow(clippy::enum_variant_names)]
pub enum Error {
    #[error("{context} [{status}]: {body}")]
    Api {
        context: String,
        status: u16,
        body: String,
    },

    #[error("{context}: still rate limited after {retries} retries")]
    RateLimited { context: String, retries: u32 },

    #[error("Not authenticated with {0}, call authenticate first")]
    NotAuthenticated(&'static str),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl Error {
    /// Whether this is an AT Protocol `ExpiredToken` response
    pub fn is_expired_token(&self) -> bool {
        matches!(self, Error::Api { status: 400, body, .. } if body.contains("ExpiredToken"))
    }
}
