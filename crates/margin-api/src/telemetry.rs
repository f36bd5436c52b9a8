//! Tracing subscriber setup for the server binary.

use std::path::{Path, PathBuf};

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::fmt::writer::BoxMakeWriter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter, Layer};

const DEFAULT_FILTER: &str =
    "margin_api=debug,margin_pipeline=info,margin_clients=info,tower_http=debug";

const DEFAULT_LOG_FILE_NAME: &str = "margin-api.log";

/// How and where log events are written.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LogSettings {
    pub json: bool,
    /// Daily-rotated log file. Stdout when unset.
    pub file: Option<PathBuf>,
    /// ANSI color override. Defaults to on for stdout, off for files.
    pub ansi: Option<bool>,
}

impl LogSettings {
    /// | Variable | Default | Description |
    /// |----------|---------|-------------|
    /// | `LOG_FORMAT` | `text` | `json` or `text` |
    /// | `LOG_FILE` | (stdout) | Log file path, rotated daily |
    /// | `LOG_ANSI` | (auto) | `true`/`1` or `false`/`0` |
    ///
    /// `RUST_LOG` overrides the default filter.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        Self {
            json: lookup("LOG_FORMAT").is_some_and(|v| v.eq_ignore_ascii_case("json")),
            file: lookup("LOG_FILE")
                .filter(|v| !v.is_empty())
                .map(PathBuf::from),
            ansi: lookup("LOG_ANSI").map(|v| v == "true" || v == "1"),
        }
    }

    fn format_name(&self) -> &'static str {
        if self.json {
            "json"
        } else {
            "text"
        }
    }
}

/// Install the global subscriber.
///
/// Hold the returned guard for the life of the process when logging to a
/// file, or buffered lines are lost on exit.
pub fn init(settings: &LogSettings) -> Option<WorkerGuard> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    let (writer, guard) = match &settings.file {
        Some(path) => {
            let (dir, name) = split_log_path(path);
            let appender = tracing_appender::rolling::daily(dir, name);
            let (non_blocking, guard) = tracing_appender::non_blocking(appender);
            (BoxMakeWriter::new(non_blocking), Some(guard))
        }
        None => (BoxMakeWriter::new(std::io::stdout), None),
    };

    let layer = if settings.json {
        fmt::layer().json().with_writer(writer).boxed()
    } else {
        let ansi = settings.ansi.unwrap_or(settings.file.is_none());
        fmt::layer().with_writer(writer).with_ansi(ansi).boxed()
    };

    tracing_subscriber::registry().with(filter).with(layer).init();

    tracing::info!(
        log_format = settings.format_name(),
        log_file = settings
            .file
            .as_deref()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "(stdout)".to_string()),
        "Logging initialized"
    );
    guard
}

fn split_log_path(path: &Path) -> (PathBuf, String) {
    let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or(Path::new("."))
        .to_path_buf();
    let name = path
        .file_name()
        .and_then(|f| f.to_str())
        .unwrap_or(DEFAULT_LOG_FILE_NAME)
        .to_string();
    (dir, name)
}
