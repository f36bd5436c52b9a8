//! Stage state machine driving fetch, validate and deliver.
//!
//! Transitions are triggered only by stage completion. Stage changes and
//! progress updates are published on a broadcast channel so any number of
//! observers (CLI, API, tests) can follow a run.

use std::fmt;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::{error, info, instrument, warn};

use margin_clients::{MemClient, ReadwiseClient};
use margin_core::{
    Credentials, Deadline, Error, FetchProgress, FetchProgressFn, FetchedData, Result, SyncConfig,
    SyncOption, SyncProgress, SyncProgressFn, SyncReport, ValidationSummary,
};

use crate::config::PipelineConfig;
use crate::deliver::BatchDeliverer;
use crate::sync::{apply_filters, execute_sync, validate_fetched};

/// Capacity of the event channel. Slow subscribers lag rather than block.
const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Pipeline stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PipelineStage {
    #[default]
    Idle,
    Connecting,
    Configuring,
    Fetching,
    Validating,
    Syncing,
    Complete,
    /// Internal fault; only [`PipelineOrchestrator::reset`] leaves it.
    Error,
}

impl PipelineStage {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Connecting => "connecting",
            Self::Configuring => "configuring",
            Self::Fetching => "fetching",
            Self::Validating => "validating",
            Self::Syncing => "syncing",
            Self::Complete => "complete",
            Self::Error => "error",
        }
    }

    /// Whether the stage machine allows moving from `self` to `next`.
    pub fn can_transition_to(self, next: PipelineStage) -> bool {
        use PipelineStage::*;
        matches!(
            (self, next),
            (Idle, Connecting)
                | (Idle, Fetching)
                | (Connecting, Configuring)
                | (Connecting, Fetching)
                | (Connecting, Idle)
                | (Configuring, Fetching)
                | (Configuring, Idle)
                | (Complete, Fetching)
                | (Complete, Idle)
                | (Fetching, Validating)
                | (Validating, Syncing)
                | (Fetching | Validating | Syncing, Idle)
                | (Syncing, Complete)
                | (Fetching | Validating | Syncing, Error)
        )
    }

    /// A stage is running while it waits on a stage implementation.
    pub fn is_running(self) -> bool {
        matches!(self, Self::Fetching | Self::Validating | Self::Syncing)
    }
}

impl fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Events published while a pipeline runs.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PipelineEvent {
    StageChanged {
        from: PipelineStage,
        to: PipelineStage,
    },
    FetchProgress(FetchProgress),
    SyncProgress(SyncProgress),
    Failed {
        stage: PipelineStage,
        error: String,
    },
    Completed(SyncReport),
}

/// Snapshot of everything a run has produced so far.
#[derive(Debug, Clone, Default)]
pub struct PipelineState {
    pub stage: PipelineStage,
    pub credentials: Option<Credentials>,
    pub sync_config: Option<SyncConfig>,
    pub fetch_progress: FetchProgress,
    pub fetched: FetchedData,
    pub validation: ValidationSummary,
    pub sync_progress: SyncProgress,
    pub report: Option<SyncReport>,
    pub error: Option<String>,
}

/// The work behind each running stage.
#[async_trait]
pub trait SyncStages: Send + Sync {
    async fn fetch(
        &self,
        credentials: &Credentials,
        config: &SyncConfig,
        progress: &FetchProgressFn<'_>,
    ) -> Result<FetchedData>;

    async fn validate(&self, data: &FetchedData) -> Result<ValidationSummary>;

    async fn deliver(
        &self,
        credentials: &Credentials,
        summary: &ValidationSummary,
        data: &FetchedData,
        group_by_book: bool,
        progress: &SyncProgressFn<'_>,
    ) -> Result<SyncReport>;
}

/// Runs stages against the real provider clients in this process.
///
/// Clients are built per call, so rate-limit state never outlives a run.
pub struct InProcessStages {
    config: PipelineConfig,
}

impl InProcessStages {
    pub fn new(config: PipelineConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl SyncStages for InProcessStages {
    async fn fetch(
        &self,
        credentials: &Credentials,
        config: &SyncConfig,
        progress: &FetchProgressFn<'_>,
    ) -> Result<FetchedData> {
        let client = ReadwiseClient::with_base_url(
            &credentials.readwise_token,
            &self.config.readwise_base_url,
        )?;
        let deadline = Deadline::after(self.config.fetch_budget);

        let highlights = match (config.option, config.date_range) {
            (SyncOption::DateRange, Some(range)) => {
                client
                    .fetch_highlights_by_date_range(range, Some(progress), &deadline)
                    .await?
            }
            _ => {
                client
                    .fetch_all_highlights(
                        Some(progress),
                        config.updated_after.as_deref(),
                        &deadline,
                    )
                    .await?
            }
        };
        let books = client.fetch_books(&deadline).await?;

        let data = FetchedData { highlights, books };
        Ok(match config.option {
            SyncOption::Filtered => apply_filters(data, config),
            _ => data,
        })
    }

    async fn validate(&self, data: &FetchedData) -> Result<ValidationSummary> {
        Ok(validate_fetched(data))
    }

    async fn deliver(
        &self,
        credentials: &Credentials,
        summary: &ValidationSummary,
        data: &FetchedData,
        group_by_book: bool,
        progress: &SyncProgressFn<'_>,
    ) -> Result<SyncReport> {
        let sink = MemClient::with_base_url(&credentials.mem_api_key, &self.config.mem_base_url)?;
        let deliverer = BatchDeliverer::from_config(Arc::new(sink), &self.config);
        let deadline = Deadline::after(self.config.deliver_budget);

        execute_sync(
            &deliverer,
            summary,
            &data.books,
            group_by_book,
            Some(progress),
            &deadline,
        )
        .await
    }
}

/// Wait for the next event, skipping any the receiver fell behind on.
///
/// Returns `None` once the orchestrator has been dropped.
pub async fn next_event(rx: &mut broadcast::Receiver<PipelineEvent>) -> Option<PipelineEvent> {
    loop {
        match rx.recv().await {
            Ok(event) => return Some(event),
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                warn!(skipped, "Event subscriber lagged, missed events dropped");
            }
            Err(broadcast::error::RecvError::Closed) => return None,
        }
    }
}

/// Sequences the stages of one pipeline run.
pub struct PipelineOrchestrator<S: SyncStages> {
    stages: S,
    state: PipelineState,
    events: broadcast::Sender<PipelineEvent>,
}

impl<S: SyncStages> PipelineOrchestrator<S> {
    pub fn new(stages: S) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            stages,
            state: PipelineState::default(),
            events,
        }
    }

    /// Receive every event published after this call.
    pub fn subscribe(&self) -> broadcast::Receiver<PipelineEvent> {
        self.events.subscribe()
    }

    pub fn state(&self) -> &PipelineState {
        &self.state
    }

    pub fn stage(&self) -> PipelineStage {
        self.state.stage
    }

    /// Move to `to`, rejecting edges the stage machine does not have.
    ///
    /// Entering `fetching` clears progress, fetched data, the validation
    /// summary, the report and any previous error.
    pub fn transition(&mut self, to: PipelineStage) -> Result<()> {
        let from = self.state.stage;
        if !from.can_transition_to(to) {
            return Err(Error::InvalidTransition {
                from: from.to_string(),
                to: to.to_string(),
            });
        }

        if to == PipelineStage::Fetching {
            self.state.fetch_progress = FetchProgress::default();
            self.state.fetched = FetchedData::default();
            self.state.validation = ValidationSummary::default();
            self.state.sync_progress = SyncProgress::default();
            self.state.report = None;
            self.state.error = None;
        }

        self.state.stage = to;
        info!(stage = %to, from = %from, "Pipeline stage changed");
        self.publish(PipelineEvent::StageChanged { from, to });
        Ok(())
    }

    /// Enter `connecting` with the given credentials.
    pub fn connect(&mut self, credentials: Credentials) -> Result<()> {
        self.transition(PipelineStage::Connecting)?;
        self.state.credentials = Some(credentials);
        Ok(())
    }

    /// Enter `configuring` with the given sync configuration.
    pub fn configure(&mut self, config: SyncConfig) -> Result<()> {
        config.validate()?;
        self.transition(PipelineStage::Configuring)?;
        self.state.sync_config = Some(config);
        Ok(())
    }

    /// Store credentials without changing stage.
    pub fn set_credentials(&mut self, credentials: Credentials) {
        self.state.credentials = Some(credentials);
    }

    /// Store the sync configuration without changing stage.
    pub fn set_sync_config(&mut self, config: SyncConfig) {
        self.state.sync_config = Some(config);
    }

    /// Return to `idle` from any stage, dropping run output but keeping
    /// credentials and configuration.
    pub fn reset(&mut self) {
        let from = self.state.stage;
        self.state = PipelineState {
            credentials: self.state.credentials.take(),
            sync_config: self.state.sync_config.take(),
            ..PipelineState::default()
        };
        if from != PipelineStage::Idle {
            self.publish(PipelineEvent::StageChanged {
                from,
                to: PipelineStage::Idle,
            });
        }
    }

    /// Run fetch, validation and delivery back to back.
    #[instrument(skip(self), fields(subsystem = "pipeline", component = "orchestrator", op = "run"))]
    pub async fn run(&mut self) -> Result<SyncReport> {
        self.fetch().await?;
        self.validate().await?;
        self.sync().await
    }

    /// Fetch stage. Requires credentials and a valid configuration.
    pub async fn fetch(&mut self) -> Result<()> {
        let (credentials, config) = match (&self.state.credentials, &self.state.sync_config) {
            (Some(c), Some(s)) => (c.clone(), s.clone()),
            _ => {
                return Err(Error::InvalidInput(
                    "Credentials and sync configuration are required".to_string(),
                ))
            }
        };
        config.validate()?;
        self.transition(PipelineStage::Fetching)?;

        let last = Mutex::new(None::<FetchProgress>);
        let events = self.events.clone();
        let progress = |p: FetchProgress| {
            if let Ok(mut slot) = last.lock() {
                *slot = Some(p.clone());
            }
            let _ = events.send(PipelineEvent::FetchProgress(p));
        };

        let result = self.stages.fetch(&credentials, &config, &progress).await;
        if let Ok(Some(p)) = last.into_inner() {
            self.state.fetch_progress = p;
        }

        match result {
            Ok(data) => {
                info!(
                    highlight_count = data.highlights.len(),
                    book_count = data.books.len(),
                    "Fetch stage complete"
                );
                self.state.fetched = data;
                self.transition(PipelineStage::Validating)
            }
            Err(e) => self.fail(e),
        }
    }

    /// Validation stage. Fails fast when nothing is deliverable.
    pub async fn validate(&mut self) -> Result<()> {
        self.expect_stage(PipelineStage::Validating)?;

        match self.stages.validate(&self.state.fetched).await {
            Ok(summary) => {
                let deliverable = summary.has_deliverable();
                self.state.validation = summary;
                if !deliverable {
                    return self.fail(Error::InvalidInput(
                        "No valid highlights to sync".to_string(),
                    ));
                }
                self.transition(PipelineStage::Syncing)
            }
            Err(e) => self.fail(e),
        }
    }

    /// Delivery stage. A partial result still completes the run.
    pub async fn sync(&mut self) -> Result<SyncReport> {
        self.expect_stage(PipelineStage::Syncing)?;

        let Some(credentials) = self.state.credentials.clone() else {
            return Err(self.record_failure(Error::InvalidInput(
                "Credentials are required".to_string(),
            )));
        };
        let group_by_book = self
            .state
            .sync_config
            .as_ref()
            .is_some_and(|c| c.group_by_book);

        let last = Mutex::new(None::<SyncProgress>);
        let events = self.events.clone();
        let progress = |p: SyncProgress| {
            if let Ok(mut slot) = last.lock() {
                *slot = Some(p.clone());
            }
            let _ = events.send(PipelineEvent::SyncProgress(p));
        };

        let result = self
            .stages
            .deliver(
                &credentials,
                &self.state.validation,
                &self.state.fetched,
                group_by_book,
                &progress,
            )
            .await;
        if let Ok(Some(p)) = last.into_inner() {
            self.state.sync_progress = p;
        }

        match result {
            Ok(report) if report.is_quota_failure() => {
                let message = report.quota_message();
                self.state.report = Some(report);
                Err(self.record_failure(Error::QuotaExceeded(message)))
            }
            Ok(report) => {
                if report.errors > 0 {
                    warn!(
                        synced = report.synced,
                        failed = report.errors,
                        "Sync finished with failures"
                    );
                }
                self.state.report = Some(report.clone());
                self.transition(PipelineStage::Complete)?;
                self.publish(PipelineEvent::Completed(report.clone()));
                Ok(report)
            }
            Err(e) => Err(self.record_failure(e)),
        }
    }

    fn expect_stage(&self, expected: PipelineStage) -> Result<()> {
        if self.state.stage != expected {
            return Err(Error::InvalidTransition {
                from: self.state.stage.to_string(),
                to: expected.to_string(),
            });
        }
        Ok(())
    }

    /// Record `err` and leave the running stage.
    fn fail(&mut self, err: Error) -> Result<()> {
        Err(self.record_failure(err))
    }

    /// Publish the failure, move to `idle` (or `error` for internal faults)
    /// and hand the error back.
    fn record_failure(&mut self, err: Error) -> Error {
        let stage = self.state.stage;
        let message = err.to_string();
        error!(stage = %stage, error = %message, "Pipeline stage failed");

        self.state.error = Some(message.clone());
        self.publish(PipelineEvent::Failed {
            stage,
            error: message,
        });

        let target = match err {
            Error::Internal(_) => PipelineStage::Error,
            _ => PipelineStage::Idle,
        };
        if let Err(transition_err) = self.transition(target) {
            warn!(error = %transition_err, "Could not leave failed stage");
        }
        err
    }

    fn publish(&self, event: PipelineEvent) {
        // no subscribers is fine
        let _ = self.events.send(event);
    }
}
