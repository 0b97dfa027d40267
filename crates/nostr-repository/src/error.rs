use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("untrusted event {id}: {reason}")]
    Untrusted { id: String, reason: String },
    #[error("invalid config value for {name}: {value}")]
    InvalidConfig { name: &'static str, value: String },
    #[error("serde json error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("mutex poisoned")]
    MutexPoisoned,
}
