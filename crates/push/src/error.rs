use reqwest::StatusCode;

#[derive(Debug, thiserror::Error)]
pub enum PushError {
    #[error("Request failed: {0}")]
    Reqwest(#[from] reqwest::Error),
    #[error("Push rejected with status: {status}, body: {body}")]
    Rejected { status: StatusCode, body: String },
    #[error("Push provider reported failure for token: {reason}")]
    DeliveryFailed { reason: String },
    #[error("Invalid push configuration: {0}")]
    InvalidConfiguration(String),
    #[error("Simulated push failure: {0}")]
    Simulated(String),
}
