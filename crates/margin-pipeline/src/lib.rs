//! # margin-pipeline
//!
//! Delivery and orchestration for the margin highlight sync pipeline.
//!
//! This crate provides:
//! - [`BatchDeliverer`]: chunked concurrent delivery with failure accounting
//! - [`detect_quota`]: quota exhaustion detection over delivery failures
//! - [`execute_sync`] / [`validate_fetched`]: the validate-then-deliver steps
//! - [`PipelineOrchestrator`]: the fetch → validate → deliver state machine

pub mod config;
pub mod deliver;
pub mod orchestrator;
pub mod quota;
pub mod sync;

pub use config::PipelineConfig;
pub use deliver::BatchDeliverer;
pub use orchestrator::{
    next_event, InProcessStages, PipelineEvent, PipelineOrchestrator, PipelineStage,
    PipelineState, SyncStages,
};
pub use quota::detect_quota;
pub use sync::{apply_filters, execute_sync, validate_fetched};
