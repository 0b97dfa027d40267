use std::env;
use std::sync::Arc;

use crate::trust::{trust_from_name, TrustAll, TrustCheck};
use crate::Error;

pub const DEFAULT_CHUNK_SIZE: usize = 1000;

const ENV_CHUNK_SIZE: &str = "NOSTR_REPOSITORY_CHUNK_SIZE";
const ENV_TRUST: &str = "NOSTR_REPOSITORY_TRUST";

#[derive(Clone)]
pub struct RepositoryConfig {
    /// Events published per batch during `load` before yielding.
    pub chunk_size: usize,
    pub trust: Arc<dyn TrustCheck>,
}

impl Default for RepositoryConfig {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            trust: Arc::new(TrustAll),
        }
    }
}

impl RepositoryConfig {
    /// Reads `NOSTR_REPOSITORY_CHUNK_SIZE` and `NOSTR_REPOSITORY_TRUST`
    /// (`none`, `id` or `signature`). Unset variables keep their defaults.
    pub fn from_env() -> Result<Self, Error> {
        Self::from_values(env::var(ENV_CHUNK_SIZE).ok(), env::var(ENV_TRUST).ok())
    }

    fn from_values(chunk_size: Option<String>, trust: Option<String>) -> Result<Self, Error> {
        let mut config = Self::default();

        if let Some(value) = chunk_size {
            config.chunk_size = match value.trim().parse::<usize>() {
                Ok(size) if size > 0 => size,
                _ => {
                    return Err(Error::InvalidConfig {
                        name: ENV_CHUNK_SIZE,
                        value,
                    })
                }
            };
        }

        if let Some(value) = trust {
            config.trust = trust_from_name(&value)?;
        }

        Ok(config)
    }

    pub fn with_trust(mut self, trust: Arc<dyn TrustCheck>) -> Self {
        self.trust = trust;
        self
    }

    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size;
        self
    }
}
