//! margin-sync: run one Readwise → Mem sync from the command line.
//!
//! Usage:
//!   margin-sync --full
//!   margin-sync --start 2024-01-01 --end 2024-01-31 --group-by-book
//!   margin-sync --updated-after 2024-05-01T00:00:00Z

use std::process::ExitCode;

use chrono::NaiveDate;
use clap::Parser;
use tracing::info;

use margin_core::{Credentials, DateRange, ProgressStatus, SyncConfig, SyncOption};
use margin_pipeline::{
    next_event, InProcessStages, PipelineConfig, PipelineEvent, PipelineOrchestrator,
    PipelineStage,
};

#[derive(Parser)]
#[command(name = "margin-sync")]
#[command(author, version, about = "Sync Readwise highlights into Mem")]
struct Cli {
    /// Readwise access token
    #[arg(long, env = "READWISE_TOKEN", hide_env_values = true)]
    readwise_token: String,

    /// Mem API key (sk-mem-...)
    #[arg(long, env = "MEM_API_KEY", hide_env_values = true)]
    mem_api_key: String,

    /// Sync every highlight (default when no range is given)
    #[arg(long, conflicts_with_all = ["start", "end"])]
    full: bool,

    /// First day of the date range (YYYY-MM-DD)
    #[arg(long, requires = "end")]
    start: Option<NaiveDate>,

    /// Last day of the date range (YYYY-MM-DD)
    #[arg(long, requires = "start")]
    end: Option<NaiveDate>,

    /// Only fetch highlights updated after this RFC 3339 timestamp
    #[arg(long)]
    updated_after: Option<String>,

    /// Create one note per book instead of one per highlight
    #[arg(long)]
    group_by_book: bool,
}

impl Cli {
    fn sync_config(&self) -> SyncConfig {
        let date_range = match (self.start, self.end) {
            (Some(start), Some(end)) if !self.full => Some(DateRange { start, end }),
            _ => None,
        };
        SyncConfig {
            option: if date_range.is_some() {
                SyncOption::DateRange
            } else {
                SyncOption::Full
            },
            date_range,
            updated_after: self.updated_after.clone(),
            group_by_book: self.group_by_book,
            ..Default::default()
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "margin_pipeline=info,margin_clients=info".into());
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let config = cli.sync_config();
    let mut orchestrator = PipelineOrchestrator::new(InProcessStages::new(PipelineConfig::from_env()));

    let mut events = orchestrator.subscribe();
    let printer = tokio::spawn(async move {
        while let Some(event) = next_event(&mut events).await {
            print_event(&event);
            if matches!(
                event,
                PipelineEvent::Completed(_)
                    | PipelineEvent::StageChanged {
                        to: PipelineStage::Idle,
                        ..
                    }
            ) {
                break;
            }
        }
    });

    orchestrator.connect(Credentials {
        readwise_token: cli.readwise_token,
        mem_api_key: cli.mem_api_key,
    })?;
    orchestrator.configure(config)?;

    info!("Starting sync");
    let result = orchestrator.run().await;
    drop(orchestrator);
    let _ = printer.await;

    let report = result?;
    println!(
        "Synced {} of {} notes ({} highlights), {} failed",
        report.synced, report.note_count, report.total_highlights, report.errors
    );
    for failure in &report.error_details {
        println!("  failed: {}", failure.error.message);
    }
    if let Some(quota) = &report.quota_details {
        println!(
            "Mem quota exceeded: {}",
            quota.message.as_deref().unwrap_or("free plan limit reached")
        );
    }
    Ok(())
}

fn print_event(event: &PipelineEvent) {
    match event {
        PipelineEvent::StageChanged { to, .. } => println!("[{}]", to),
        PipelineEvent::FetchProgress(p) if p.status == ProgressStatus::InProgress => {
            println!("  fetched {}/{}", p.current, p.total)
        }
        PipelineEvent::FetchProgress(_) => {}
        PipelineEvent::SyncProgress(p) => {
            if let (Some(batch), Some(batches)) = (p.current_batch, p.total_batches) {
                println!(
                    "  batch {}/{}: {} synced, {} failed",
                    batch, batches, p.synced, p.errors
                );
            }
        }
        PipelineEvent::Failed { stage, error } => eprintln!("  {} failed: {}", stage, error),
        PipelineEvent::Completed(_) => {}
    }
}
