#[derive(thiserror::Error, Debug, serde::Deserialize, serde::Serialize)]
#[allow(clippy::enum_variant_names)]
pub enum Error {
    #[error("Invalid title list {0}: expected a JSON array of strings")]
    InvalidTitleList(String),

    #[error("Invalid invocation: {0}")]
    InvalidInvocation(String),

    #[error("{kind}: {message}")]
    RunFailed { kind: String, message: String },

    #[error("Engine worker stopped unexpectedly: {0}")]
    WorkerCrashed(String),

    #[error("Cancelled")]
    Cancelled,
}
