use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use moka::Expiry;
use moka::sync::Cache;
use rand::Rng;
use rand::distributions::Alphanumeric;
use uuid::Uuid;

use crate::error::AggregatorError;
use crate::mq::schema::QueuedMessage;

struct QueueEntry {
    secret_token: String,
    ttl: Duration,
    mailbox: Mutex<VecDeque<QueuedMessage>>,
}

/// Honors each queue's own requested TTL rather than one fixed cache-wide duration.
struct PerQueueExpiry;

impl Expiry<String, std::sync::Arc<QueueEntry>> for PerQueueExpiry {
    fn expire_after_create(
        &self,
        _key: &String,
        value: &std::sync::Arc<QueueEntry>,
        _current_time: std::time::Instant,
    ) -> Option<Duration> {
        Some(value.ttl)
    }
}

/// Short-lived, token-authenticated FIFO mailboxes for peers that can only answer over
/// plain HTTP polling rather than a live tunnel connection.
///
/// `owner_index` tracks, per owner, the queue_id of their most recently reserved
/// queue. This covers peek/clear within the scope of this broker — a single-queue
/// stand-in for a full per-user "own queue" system, which is out of scope here.
pub struct ReservedQueueBroker {
    cache: Cache<String, std::sync::Arc<QueueEntry>>,
    owner_index: Mutex<HashMap<String, String>>,
}

impl ReservedQueueBroker {
    pub fn new() -> Self {
        ReservedQueueBroker {
            cache: Cache::builder()
                .expire_after(PerQueueExpiry)
                .build(),
            owner_index: Mutex::new(HashMap::new()),
        }
    }

    /// Reserves a new queue for `ttl_seconds` (already clamped by the caller) and
    /// returns its id, bearer token, and absolute expiry (unix seconds).
    pub fn reserve(&self, ttl_seconds: u64, owner_username: &str) -> (String, String, u64) {
        let queue_id = format!("q_{}", Uuid::new_v4().simple());
        let secret_token = generate_queue_token();
        let ttl = Duration::from_secs(ttl_seconds);

        self.cache.insert(
            queue_id.clone(),
            std::sync::Arc::new(QueueEntry {
                secret_token: secret_token.clone(),
                ttl,
                mailbox: Mutex::new(VecDeque::new()),
            }),
        );

        self.owner_index
            .lock()
            .expect("owner index mutex poisoned")
            .insert(owner_username.to_string(), queue_id.clone());

        let expires_at = now_unix() + ttl_seconds;
        (queue_id, secret_token, expires_at)
    }

    /// Appends a message to the queue. Does not require the bearer token — any peer
    /// that knows the `queue_id` may publish a reply into it.
    pub fn publish(
        &self,
        queue_id: &str,
        message: serde_json::Value,
    ) -> Result<(), AggregatorError> {
        let entry = self
            .cache
            .get(queue_id)
            .ok_or_else(|| AggregatorError::Validation(format!("unknown queue: {queue_id}")))?;

        let mut mailbox = entry.mailbox.lock().expect("mailbox mutex poisoned");
        mailbox.push_back(QueuedMessage {
            id: Uuid::new_v4().to_string(),
            message,
            queued_at: now_unix(),
        });
        Ok(())
    }

    /// Drains up to `limit` queued messages (oldest first) and returns them alongside
    /// how many remain. Requires the bearer token minted at reserve time.
    pub fn consume(
        &self,
        queue_id: &str,
        token: &str,
        limit: usize,
    ) -> Result<(Vec<QueuedMessage>, usize), AggregatorError> {
        let entry = self.authorized_entry(queue_id, token)?;
        let mut mailbox = entry.mailbox.lock().expect("mailbox mutex poisoned");
        let take = limit.min(mailbox.len());
        let messages: Vec<_> = mailbox.drain(..take).collect();
        Ok((messages, mailbox.len()))
    }

    /// Returns up to `limit` queued messages without removing them, alongside the
    /// total queued for this owner's most recently reserved queue. Owner-authenticated,
    /// not token-authenticated — unknown owners simply see an empty queue.
    pub fn peek(&self, owner_username: &str, limit: usize) -> (Vec<QueuedMessage>, usize) {
        let queue_id = match self
            .owner_index
            .lock()
            .expect("owner index mutex poisoned")
            .get(owner_username)
            .cloned()
        {
            Some(id) => id,
            None => return (Vec::new(), 0),
        };
        let Some(entry) = self.cache.get(&queue_id) else {
            return (Vec::new(), 0);
        };
        let mailbox = entry.mailbox.lock().expect("mailbox mutex poisoned");
        let messages: Vec<_> = mailbox.iter().take(limit).cloned().collect();
        (messages, mailbox.len())
    }

    /// Releases the queue early, returning how many unread messages were discarded.
    pub fn release(&self, queue_id: &str, token: &str) -> Result<usize, AggregatorError> {
        let entry = self.authorized_entry(queue_id, token)?;
        let cleared = entry.mailbox.lock().expect("mailbox mutex poisoned").len();
        self.cache.invalidate(queue_id);
        Ok(cleared)
    }

    /// Clears the owner's most recently reserved queue, returning how many unread
    /// messages were discarded. A no-op (zero cleared) for an owner with no queue.
    pub fn clear(&self, owner_username: &str) -> usize {
        let queue_id = match self
            .owner_index
            .lock()
            .expect("owner index mutex poisoned")
            .remove(owner_username)
        {
            Some(id) => id,
            None => return 0,
        };
        let Some(entry) = self.cache.get(&queue_id) else {
            return 0;
        };
        let cleared = entry.mailbox.lock().expect("mailbox mutex poisoned").len();
        self.cache.invalidate(&queue_id);
        cleared
    }

    fn authorized_entry(
        &self,
        queue_id: &str,
        token: &str,
    ) -> Result<std::sync::Arc<QueueEntry>, AggregatorError> {
        let entry = self
            .cache
            .get(queue_id)
            .ok_or_else(|| AggregatorError::Validation(format!("unknown queue: {queue_id}")))?;
        if entry.secret_token != token {
            return Err(AggregatorError::TunnelAuth("invalid queue token".to_string()));
        }
        Ok(entry)
    }
}

impl Default for ReservedQueueBroker {
    fn default() -> Self {
        Self::new()
    }
}

fn generate_queue_token() -> String {
    let suffix: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(43)
        .map(char::from)
        .collect();
    format!("qt_{suffix}")
}

fn now_unix() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reserve_publish_consume_roundtrips() {
        let broker = ReservedQueueBroker::new();
        let (queue_id, token, _expires_at) = broker.reserve(300, "alice");

        broker
            .publish(&queue_id, serde_json::json!({"hello": "world"}))
            .unwrap();

        let (messages, remaining) = broker.consume(&queue_id, &token, 100).unwrap();
        assert_eq!(messages.len(), 1);
        assert_eq!(remaining, 0);

        // consume drains — a second call sees nothing left.
        let (empty, remaining) = broker.consume(&queue_id, &token, 100).unwrap();
        assert!(empty.is_empty());
        assert_eq!(remaining, 0);
    }

    #[test]
    fn consume_respects_limit_and_reports_remaining() {
        let broker = ReservedQueueBroker::new();
        let (queue_id, token, _) = broker.reserve(300, "alice");
        broker.publish(&queue_id, serde_json::json!("m1")).unwrap();
        broker.publish(&queue_id, serde_json::json!("m2")).unwrap();

        let (messages, remaining) = broker.consume(&queue_id, &token, 1).unwrap();
        assert_eq!(messages.len(), 1);
        assert_eq!(remaining, 1);
    }

    #[test]
    fn peek_does_not_drain_and_is_owner_authenticated() {
        let broker = ReservedQueueBroker::new();
        let (queue_id, _token, _) = broker.reserve(300, "alice");
        broker.publish(&queue_id, serde_json::json!("m")).unwrap();

        let (messages, total) = broker.peek("alice", 100);
        assert_eq!(messages.len(), 1);
        assert_eq!(total, 1);
        let (messages, total) = broker.peek("alice", 100);
        assert_eq!(messages.len(), 1);
        assert_eq!(total, 1);
    }

    #[test]
    fn peek_unknown_owner_is_empty() {
        let broker = ReservedQueueBroker::new();
        let (messages, total) = broker.peek("nobody", 10);
        assert!(messages.is_empty());
        assert_eq!(total, 0);
    }

    #[test]
    fn wrong_token_is_rejected() {
        let broker = ReservedQueueBroker::new();
        let (queue_id, _token, _) = broker.reserve(300, "alice");
        let result = broker.consume(&queue_id, "wrong-token", 10);
        assert!(matches!(result, Err(AggregatorError::TunnelAuth(_))));
    }

    #[test]
    fn release_reports_discarded_count() {
        let broker = ReservedQueueBroker::new();
        let (queue_id, token, _) = broker.reserve(300, "alice");
        broker.publish(&queue_id, serde_json::json!("m1")).unwrap();
        broker.publish(&queue_id, serde_json::json!("m2")).unwrap();

        let cleared = broker.release(&queue_id, &token).unwrap();
        assert_eq!(cleared, 2);
        assert!(broker.consume(&queue_id, &token, 10).is_err());
    }

    #[test]
    fn clear_discards_owners_queue() {
        let broker = ReservedQueueBroker::new();
        let (queue_id, _token, _) = broker.reserve(300, "alice");
        broker.publish(&queue_id, serde_json::json!("m1")).unwrap();

        assert_eq!(broker.clear("alice"), 1);
        assert_eq!(broker.clear("alice"), 0);
    }
}
