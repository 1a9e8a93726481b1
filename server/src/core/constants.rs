// =============================================================================
// Application Identity
// =============================================================================

/// Application display name
pub const APP_NAME: &str = "Pushgate";

/// Application name in lowercase (for paths and identifiers)
pub const APP_NAME_LOWER: &str = "pushgate";

// =============================================================================
// Configuration Files
// =============================================================================

/// Config file name, looked up in the working directory
pub const CONFIG_FILE_NAME: &str = "pushgate.json";

/// Environment variable for config file path
pub const ENV_CONFIG: &str = "PUSHGATE_CONFIG";

// =============================================================================
// Environment Variables - Server
// =============================================================================

/// Environment variable for server host
pub const ENV_HOST: &str = "PUSHGATE_HOST";

/// Environment variable for server port
pub const ENV_PORT: &str = "PUSHGATE_PORT";

/// Environment variable for log level/filter
pub const ENV_LOG: &str = "PUSHGATE_LOG";

// =============================================================================
// Environment Variables - Ingest
// =============================================================================

pub const ENV_INGEST_TIMEOUT_SECS: &str = "PUSHGATE_INGEST_TIMEOUT_SECS";
pub const ENV_INGEST_MAX_BODY_BYTES: &str = "PUSHGATE_INGEST_MAX_BODY_BYTES";
pub const ENV_PARTITION_HEADER: &str = "PUSHGATE_PARTITION_HEADER";
pub const ENV_PARTITION_LABEL: &str = "PUSHGATE_PARTITION_LABEL";

// =============================================================================
// Environment Variables - Transform
// =============================================================================

/// Comma-separated label names stripped from every sample
pub const ENV_ELIDE_LABELS: &str = "PUSHGATE_ELIDE_LABELS";

/// Comma-separated selector rules; empty allows everything
pub const ENV_WHITELIST: &str = "PUSHGATE_WHITELIST";

// =============================================================================
// Environment Variables - Store
// =============================================================================

pub const ENV_WRITE_INTERVAL_SECS: &str = "PUSHGATE_WRITE_INTERVAL_SECS";
pub const ENV_STORE_TTL_SECS: &str = "PUSHGATE_STORE_TTL_SECS";

// =============================================================================
// Server Defaults
// =============================================================================

/// Default server host
pub const DEFAULT_HOST: &str = "127.0.0.1";

/// Default server port
pub const DEFAULT_PORT: u16 = 9003;

// =============================================================================
// Ingest Defaults
// =============================================================================

/// Deadline for one upload, from validation to the store acknowledging
pub const DEFAULT_INGEST_TIMEOUT_SECS: u64 = 5;

/// Maximum accepted request body (10 MiB)
pub const DEFAULT_MAX_BODY_BYTES: usize = 10 * 1024 * 1024;

/// Header carrying the partition key
pub const DEFAULT_PARTITION_HEADER: &str = "X-Partition-Key";

/// Label every sample is stamped with
pub const DEFAULT_PARTITION_LABEL: &str = "_id";

/// Longest accepted partition key
pub const MAX_PARTITION_KEY_LEN: usize = 128;

/// Initial capacity of the decode batch
pub const DECODE_BATCH_CAPACITY: usize = 100;

/// Upper bound on one length-delimited protobuf message (16 MiB)
pub const MAX_DELIMITED_MESSAGE_BYTES: usize = 16 * 1024 * 1024;

/// Upper bound on a decoded (decompressed) body (64 MiB)
pub const MAX_DECODED_BODY_BYTES: usize = 64 * 1024 * 1024;

// =============================================================================
// Store Defaults
// =============================================================================

/// Minimum seconds between two writes for the same partition (0 disables)
pub const DEFAULT_WRITE_INTERVAL_SECS: u64 = 270;

/// Partitions not written for this long are pruned (0 disables)
pub const DEFAULT_STORE_TTL_SECS: u64 = 600;

// =============================================================================
// Shutdown
// =============================================================================

/// Maximum time to wait for background tasks during shutdown
pub const SHUTDOWN_TIMEOUT_SECS: u64 = 10;
