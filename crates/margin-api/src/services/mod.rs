//! Storage-backed services used by the handlers.

pub mod credentials;
pub mod kv_store;
pub mod schedule;
pub mod stats;

pub use credentials::CredentialStore;
pub use kv_store::{kv_store_from_env, KvStore, MemoryKvStore, RedisKvStore};
pub use schedule::{ScheduleConfig, ScheduleFrequency, ScheduleStore};
pub use stats::{anonymous_user_id, StatsSummary, SyncStats};
