/// Prefix for locally-generated temporary message identifiers.
pub const TEMP_ID_PREFIX: &str = "temp-";

/// Initial reconnection backoff delay in milliseconds.
pub const DEFAULT_RECONNECT_BASE_MS: u64 = 1_000;

/// Upper bound on the reconnection backoff delay in milliseconds.
pub const DEFAULT_RECONNECT_MAX_MS: u64 = 30_000;

/// Number of automatic reconnection attempts before giving up.
pub const DEFAULT_MAX_RECONNECT_ATTEMPTS: u32 = 5;

/// Default page size requested when loading message history.
pub const DEFAULT_PAGE_SIZE: u32 = 50;
