use thiserror::Error;

use crate::session::CheckoutStage;

/// Failures talking to the merchant backend.
#[derive(Error, Debug)]
pub enum BackendError {
    #[error("transport failure: {0}")]
    Transport(#[from] reqwest::Error),
    /// The backend answered 404 to the checkout-context fetch: the session token is
    /// no longer linked server-side.
    #[error("backend no longer recognizes the session")]
    SessionExpired,
    #[error("backend rejected request with status {status}: {body}")]
    Rejected { status: u16, body: String },
    #[error("malformed backend response: {0}")]
    Decode(#[from] serde_json::Error),
}

#[derive(Error, Debug)]
pub enum CheckoutError {
    #[error(transparent)]
    Backend(#[from] BackendError),
    #[error("{operation} requires {field} to be set")]
    MissingField {
        operation: &'static str,
        field: &'static str,
    },
    #[error("cannot {operation} while session is {stage}")]
    InvalidTransition {
        operation: &'static str,
        stage: CheckoutStage,
    },
}

#[derive(Error, Debug)]
pub enum NotifyError {
    #[error("transport failure: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("platform rejected message with status {status}: {body}")]
    Rejected { status: u16, body: String },
}

#[derive(Error, Debug, PartialEq)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),
    #[error("{name} has invalid value {value:?}")]
    Invalid { name: &'static str, value: String },
}
