//! Append-only event log.
//!
//! External indexers consume events by sequence number. The log also
//! maintains a SHA-256 digest over the ordered entries so an indexer can
//! prove it saw exactly the same stream:
//!
//! ```text
//! digest_0 = SHA256(domain)
//! digest_n = SHA256(domain || digest_{n-1} || sequence_n || json(event_n))
//! ```

use openledger_types::{EventRecord, LedgerEvent, Result, constants};
use sha2::{Digest, Sha256};

/// Ordered, append-only record of everything observable.
#[derive(Debug, Clone)]
pub struct EventLog {
    entries: Vec<EventRecord>,
    /// Running digest after each entry; `digests[i]` covers entries `0..=i`.
    digests: Vec<[u8; 32]>,
}

impl EventLog {
    #[must_use]
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
            digests: Vec::new(),
        }
    }

    /// Append an event. Returns its sequence number.
    ///
    /// # Errors
    /// Returns `Serialization` if the event can't be encoded for the digest.
    pub fn append(&mut self, event: LedgerEvent) -> Result<u64> {
        let sequence = self.entries.len() as u64;
        let encoded = serde_json::to_vec(&event)?;

        let mut hasher = Sha256::new();
        hasher.update(constants::EVENT_DIGEST_DOMAIN);
        hasher.update(self.digest());
        hasher.update(sequence.to_le_bytes());
        hasher.update(&encoded);
        let mut digest = [0u8; 32];
        digest.copy_from_slice(&hasher.finalize());

        tracing::trace!(sequence, event = event.name(), "Event appended");
        self.entries.push(EventRecord { sequence, event });
        self.digests.push(digest);
        Ok(sequence)
    }

    /// Drop every entry at or after `len`. Used to undo the events of an
    /// operation that was rolled back before it returned.
    pub(crate) fn truncate(&mut self, len: usize) {
        self.entries.truncate(len);
        self.digests.truncate(len);
    }

    /// Digest over the whole log.
    #[must_use]
    pub fn digest(&self) -> [u8; 32] {
        self.digests.last().copied().unwrap_or_else(|| {
            let mut genesis = [0u8; 32];
            genesis.copy_from_slice(&Sha256::digest(constants::EVENT_DIGEST_DOMAIN));
            genesis
        })
    }

    #[must_use]
    pub fn digest_hex(&self) -> String {
        hex::encode(self.digest())
    }

    /// Digest after the first `len` entries, if the log is that long.
    #[must_use]
    pub fn digest_at(&self, len: usize) -> Option<[u8; 32]> {
        match len {
            0 => Some(Self::new().digest()),
            n => self.digests.get(n - 1).copied(),
        }
    }

    #[must_use]
    pub fn entries(&self) -> &[EventRecord] {
        &self.entries
    }

    /// Entries with `sequence >= cursor`.
    #[must_use]
    pub fn since(&self, cursor: u64) -> &[EventRecord] {
        let start = usize::try_from(cursor).map_or(self.entries.len(), |c| c.min(self.entries.len()));
        &self.entries[start..]
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for EventLog {
    fn default() -> Self {
        Self::new()
    }
}
