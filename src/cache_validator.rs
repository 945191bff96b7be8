use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};
use std::time::Duration;

/// Cache entry carrying a SHA-256 checksum and an optional expiry.
///
/// The checksum covers both the payload and the expiry timestamp, so an entry
/// whose lifetime was tampered with is rejected just like altered data.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct ValidatedCacheEntry {
    /// The cached payload (usually JSON).
    pub data: String,
    /// Hex-encoded SHA-256 of `data` and `expires_at`.
    pub checksum: String,
    /// Instant after which the entry is stale. `None` never expires.
    pub expires_at: Option<DateTime<Utc>>,
}

impl ValidatedCacheEntry {
    /// Creates an entry that expires `ttl` after `now`.
    pub fn new(data: String, ttl: Option<Duration>, now: DateTime<Utc>) -> Self {
        let expires_at = ttl.and_then(|ttl| {
            chrono::Duration::from_std(ttl)
                .ok()
                .and_then(|delta| now.checked_add_signed(delta))
        });
        let checksum = Self::compute_checksum(&data, expires_at);
        Self {
            data,
            checksum,
            expires_at,
        }
    }

    fn compute_checksum(data: &str, expires_at: Option<DateTime<Utc>>) -> String {
        let mut hasher = Sha256::new();
        hasher.update(data.as_bytes());
        if let Some(expiry) = expires_at {
            hasher.update(expiry.timestamp_millis().to_be_bytes());
        }
        hex::encode(hasher.finalize())
    }

    /// Returns true if the checksum matches.
    pub fn is_valid(&self) -> bool {
        Self::compute_checksum(&self.data, self.expires_at) == self.checksum
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        matches!(self.expires_at, Some(expiry) if now >= expiry)
    }

    pub fn serialize(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }

    /// Deserializes an entry and returns its data if intact and still fresh.
    pub fn deserialize_and_validate(serialized: &str, now: DateTime<Utc>) -> Option<String> {
        let entry: ValidatedCacheEntry = serde_json::from_str(serialized).ok()?;

        if !entry.is_valid() {
            tracing::warn!(
                "Cache validation failed: checksum mismatch. Expected: {}, Data length: {}",
                entry.checksum,
                entry.data.len()
            );
            return None;
        }

        if entry.is_expired(now) {
            tracing::debug!("Cache entry expired at {:?}", entry.expires_at);
            return None;
        }

        Some(entry.data)
    }
}
