use std::sync::Arc;

use nostr_sdk::prelude::{Event, JsonUtil};

use crate::events::NostrEvent;
use crate::Error;

/// Gate consulted before an event may mutate the repository.
///
/// Failing this check is a caller-contract violation, not a normal rejection.
pub trait TrustCheck: Send + Sync {
    fn check(&self, event: &NostrEvent) -> Result<(), String>;
    fn name(&self) -> &'static str;
}

/// Accepts every event; validation happened upstream.
#[derive(Debug, Default, Clone, Copy)]
pub struct TrustAll;

impl TrustCheck for TrustAll {
    fn check(&self, _event: &NostrEvent) -> Result<(), String> {
        Ok(())
    }

    fn name(&self) -> &'static str {
        "none"
    }
}

/// Structural check: the id must be the NIP-01 hash of the event.
#[derive(Debug, Default, Clone, Copy)]
pub struct IdCheck;

impl TrustCheck for IdCheck {
    fn check(&self, event: &NostrEvent) -> Result<(), String> {
        if event.pubkey.is_empty() {
            return Err("missing pubkey".to_string());
        }
        let expected = event.compute_id();
        if expected != event.id {
            return Err(format!("id mismatch: expected {expected}"));
        }
        Ok(())
    }

    fn name(&self) -> &'static str {
        "id"
    }
}

/// Full check of id and schnorr signature through `nostr-sdk`.
#[derive(Debug, Default, Clone, Copy)]
pub struct SignatureCheck;

impl TrustCheck for SignatureCheck {
    fn check(&self, event: &NostrEvent) -> Result<(), String> {
        let json = event.nip01_json().map_err(|err| err.to_string())?;
        let parsed = Event::from_json(json).map_err(|err| err.to_string())?;
        parsed.verify().map_err(|err| err.to_string())
    }

    fn name(&self) -> &'static str {
        "signature"
    }
}

/// Resolves a trust check by its configuration name.
pub fn trust_from_name(name: &str) -> Result<Arc<dyn TrustCheck>, Error> {
    match name.trim().to_ascii_lowercase().as_str() {
        "none" | "trusted" => Ok(Arc::new(TrustAll)),
        "id" => Ok(Arc::new(IdCheck)),
        "signature" | "sig" => Ok(Arc::new(SignatureCheck)),
        _ => Err(Error::InvalidConfig {
            name: "trust",
            value: name.to_string(),
        }),
    }
}
