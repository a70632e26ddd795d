//! System-wide constants for the OpenLedger engine.

/// Default maximum number of (id, value) pairs in one batch transfer.
pub const DEFAULT_MAX_BATCH_SIZE: usize = 1024;

/// Label from which the default custody address is derived.
pub const CUSTODY_LABEL: &str = "distribution-custody";

/// Marker a receiver returns to accept a single transfer.
pub const ACCEPT_SINGLE: [u8; 4] = [0xf2, 0x3a, 0x6e, 0x61];

/// Marker a receiver returns to accept a batch transfer.
pub const ACCEPT_BATCH: [u8; 4] = [0xbc, 0x19, 0x7c, 0x81];

/// Domain separator for the event log digest chain.
pub const EVENT_DIGEST_DOMAIN: &[u8] = b"openledger:events:v1:";

/// Version string.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Engine name.
pub const ENGINE_NAME: &str = "OpenLedger";
