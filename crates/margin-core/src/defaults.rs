//! Centralized default constants for margin.
//!
//! **This module is the single source of truth** for shared default values.
//! Crates reference these constants instead of defining their own magic
//! numbers.

// =============================================================================
// PROVIDERS
// =============================================================================

/// Readwise v2 API base URL.
pub const READWISE_BASE_URL: &str = "https://readwise.io/api/v2";

/// Mem "mem-it" endpoint base URL.
pub const MEM_BASE_URL: &str = "https://api.mem.ai/v2/mem-it";

/// Prefix every Mem API key carries.
pub const MEM_API_KEY_PREFIX: &str = "sk-mem-";

// =============================================================================
// RATE LIMITS (outbound, per client instance)
// =============================================================================

/// Length of the rate-limit window in seconds.
pub const RATE_LIMIT_WINDOW_SECS: u64 = 60;

/// Readwise requests allowed per window.
pub const READWISE_REQUESTS_PER_WINDOW: u32 = 20;

/// Mem requests allowed per window.
pub const MEM_REQUESTS_PER_WINDOW: u32 = 10;

// =============================================================================
// FETCH
// =============================================================================

/// Items requested per Readwise page.
pub const PAGE_SIZE: usize = 100;

/// Maximum highlight pages read per fetch.
///
/// At 20 requests/minute this keeps a full fetch inside the fetch budget.
pub const MAX_FETCH_PAGES: usize = 15;

/// Maximum highlights kept after date-range filtering.
pub const MAX_DATE_RANGE_HIGHLIGHTS: usize = 80;

/// Wall-clock budget for the fetch stage (seconds).
pub const FETCH_BUDGET_SECS: u64 = 60;

// =============================================================================
// DELIVERY
// =============================================================================

/// Notes delivered concurrently per batch.
pub const BATCH_SIZE: usize = 10;

/// Pause between batches (milliseconds).
pub const BATCH_DELAY_MS: u64 = 500;

/// Wall-clock budget for the deliver stage (seconds).
pub const DELIVER_BUDGET_SECS: u64 = 300;

/// Per-request HTTP timeout for provider calls (seconds).
pub const HTTP_TIMEOUT_SECS: u64 = 30;

// =============================================================================
// VALIDATION
// =============================================================================

/// Minimum highlight text length (characters).
pub const MIN_TEXT_LENGTH: usize = 1;

/// Maximum highlight text length (characters).
pub const MAX_TEXT_LENGTH: usize = 10_000;

/// Note length above which a warning is raised (characters).
pub const MAX_NOTE_LENGTH: usize = 5_000;

// =============================================================================
// FORMATTING
// =============================================================================

/// Tag attached to every note.
pub const BASE_TAG: &str = "#readwise";

/// Heading used when a highlight has no resolvable book.
pub const UNTITLED: &str = "Untitled";

/// Source label used when neither the book nor the highlight names one.
pub const UNKNOWN_SOURCE: &str = "Unknown";

/// Rendered in place of a missing or unparseable highlight date.
pub const UNKNOWN_DATE: &str = "Unknown date";

// =============================================================================
// QUOTA
// =============================================================================

/// Provider error `type` marking quota exhaustion.
pub const QUOTA_EXCEEDED_TYPE: &str = "quota_exceeded";

// =============================================================================
// SERVER
// =============================================================================

/// Default HTTP server port.
pub const SERVER_PORT: u16 = 3000;

/// Default inbound rate limit: max requests per period.
pub const RATE_LIMIT_REQUESTS: u64 = 100;

/// Default inbound rate limit: period in seconds.
pub const RATE_LIMIT_PERIOD_SECS: u64 = 60;

/// Maximum accepted request body (bytes).
pub const MAX_BODY_SIZE_BYTES: usize = 16 * 1024 * 1024;

/// CORS preflight cache duration in seconds.
pub const CORS_MAX_AGE_SECS: u64 = 3600;

/// Default Redis URL for the key-value store.
pub const REDIS_URL: &str = "redis://localhost:6379";

// =============================================================================
// STORAGE KEYS
// =============================================================================

/// Prefix for stored credentials.
pub const CREDENTIALS_KEY_PREFIX: &str = "margin:credentials";

/// Prefix for last-sync timestamps.
pub const LAST_SYNC_KEY_PREFIX: &str = "margin:last-sync";

/// Prefix for schedule records.
pub const SCHEDULE_KEY_PREFIX: &str = "schedule";
