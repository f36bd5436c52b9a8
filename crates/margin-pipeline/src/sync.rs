//! Validate-then-deliver operations shared by the orchestrator and the API.

use std::collections::HashMap;
use std::time::Instant;

use tracing::{info, instrument};

use margin_core::{
    format_batch, format_grouped_by_book, validate_batch, Book, Deadline, Error, FetchedData,
    Result, SyncConfig, SyncProgressFn, SyncReport, ValidationSummary,
};

use crate::deliver::BatchDeliverer;
use crate::quota::detect_quota;

/// Validate fetched highlights, rendering each once for the content rule.
#[instrument(skip_all, fields(subsystem = "pipeline", component = "validator", op = "validate", highlight_count = data.highlights.len()))]
pub fn validate_fetched(data: &FetchedData) -> ValidationSummary {
    let contents: Vec<String> = format_batch(&data.highlights, &data.books)
        .into_iter()
        .map(|note| note.content)
        .collect();

    let summary = validate_batch(&data.highlights, &contents);

    info!(
        event = "validation_completed",
        total = summary.total,
        valid = summary.valid,
        warnings = summary.warnings,
        invalid = summary.invalid,
        "Validation completed"
    );
    summary
}

/// Narrow fetched data to the config's source types and book ids.
///
/// Source types match a book's category or source, case-insensitively.
/// Highlights without a known book are dropped once any filter is set.
pub fn apply_filters(data: FetchedData, config: &SyncConfig) -> FetchedData {
    let source_types: Option<Vec<String>> = config
        .source_types
        .as_ref()
        .filter(|types| !types.is_empty())
        .map(|types| types.iter().map(|t| t.to_lowercase()).collect());
    let book_ids = config.book_ids.as_ref().filter(|ids| !ids.is_empty());

    if source_types.is_none() && book_ids.is_none() {
        return data;
    }

    let books: HashMap<i64, &Book> = data.books.iter().map(|b| (b.id, b)).collect();

    let highlights = data
        .highlights
        .iter()
        .filter(|h| {
            let Some(book) = h.resolvable_book_id().and_then(|id| books.get(&id)) else {
                return false;
            };
            let id_ok = book_ids.map_or(true, |ids| ids.contains(&book.id));
            let type_ok = source_types.as_ref().map_or(true, |types| {
                [book.category.as_deref(), book.source.as_deref()]
                    .into_iter()
                    .flatten()
                    .any(|value| types.contains(&value.to_lowercase()))
            });
            id_ok && type_ok
        })
        .cloned()
        .collect();

    FetchedData {
        highlights,
        books: data.books,
    }
}

/// Format the deliverable highlights of `summary` and deliver them.
///
/// Fails with [`Error::InvalidInput`] before any delivery when nothing is
/// deliverable. Quota exhaustion is reported in the returned [`SyncReport`].
#[instrument(skip_all, fields(subsystem = "pipeline", component = "sync", op = "execute_sync", group_by_book = group_by_book))]
pub async fn execute_sync(
    deliverer: &BatchDeliverer,
    summary: &ValidationSummary,
    books: &[Book],
    group_by_book: bool,
    progress: Option<&SyncProgressFn<'_>>,
    deadline: &Deadline,
) -> Result<SyncReport> {
    let highlights = summary.deliverable_highlights();
    if highlights.is_empty() {
        return Err(Error::InvalidInput("No valid highlights to sync".to_string()));
    }

    let start = Instant::now();
    let notes = if group_by_book {
        format_grouped_by_book(&highlights, books)
    } else {
        format_batch(&highlights, books)
    };
    let note_count = notes.len();

    info!(
        event = "sync_started",
        highlight_count = highlights.len(),
        note_count,
        group_by_book,
        "Sync started"
    );

    let outcome = deliverer.deliver(notes, progress, deadline).await;
    let quota_details = detect_quota(&outcome.error_details);

    let report = SyncReport {
        total: highlights.len(),
        total_highlights: highlights.len(),
        note_count,
        synced: outcome.synced,
        errors: outcome.errors,
        error_details: outcome.error_details,
        quota_exceeded: quota_details.is_some(),
        quota_details,
    };

    info!(
        event = "sync_completed",
        synced = report.synced,
        failed = report.errors,
        quota_exceeded = report.quota_exceeded,
        duration_ms = start.elapsed().as_millis() as u64,
        "Sync completed"
    );

    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use margin_core::{CreatedNote, Highlight, Note, NoteSink, SinkError, SyncOption};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct CountingSink {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl NoteSink for CountingSink {
        async fn create_note(&self, note: &Note) -> std::result::Result<CreatedNote, SinkError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(CreatedNote {
                content: note.content.clone(),
                ..Default::default()
            })
        }
    }

    fn highlight(id: i64, text: &str, book_id: Option<i64>) -> Highlight {
        serde_json::from_value(serde_json::json!({
            "id": id,
            "text": text,
            "highlighted_at": "2024-01-15T12:00:00Z",
            "book_id": book_id,
        }))
        .unwrap()
    }

    fn book(id: i64, category: &str, source: &str) -> Book {
        serde_json::from_value(serde_json::json!({
            "id": id,
            "title": format!("Book {}", id),
            "category": category,
            "source": source,
        }))
        .unwrap()
    }

    fn data() -> FetchedData {
        FetchedData {
            highlights: vec![
                highlight(1, "a", Some(1)),
                highlight(2, "b", Some(2)),
                highlight(3, "c", Some(1)),
                highlight(4, "", Some(2)),
                highlight(5, "e", None),
            ],
            books: vec![book(1, "books", "kindle"), book(2, "articles", "reader")],
        }
    }

    #[test]
    fn test_validate_fetched_partitions() {
        let summary = validate_fetched(&data());
        assert_eq!(summary.total, 5);
        assert_eq!(summary.valid, 3);
        assert_eq!(summary.warnings, 1);
        assert_eq!(summary.invalid, 1);
        assert!(summary.results[0].formatted_content.is_some());
    }

    #[test]
    fn test_apply_filters_by_source_type_and_book() {
        let config = SyncConfig {
            option: SyncOption::Filtered,
            source_types: Some(vec!["Books".to_string()]),
            ..Default::default()
        };
        let ids: Vec<i64> = apply_filters(data(), &config)
            .highlights
            .iter()
            .map(|h| h.id)
            .collect();
        assert_eq!(ids, vec![1, 3]);

        let config = SyncConfig {
            option: SyncOption::Filtered,
            source_types: Some(vec!["reader".to_string()]),
            book_ids: Some(vec![2]),
            ..Default::default()
        };
        let ids: Vec<i64> = apply_filters(data(), &config)
            .highlights
            .iter()
            .map(|h| h.id)
            .collect();
        assert_eq!(ids, vec![2, 4]);
    }

    #[test]
    fn test_apply_filters_without_filters_is_identity() {
        let filtered = apply_filters(data(), &SyncConfig::default());
        assert_eq!(filtered, data());
    }

    #[tokio::test]
    async fn test_execute_sync_fails_fast_without_deliverable() {
        let sink = Arc::new(CountingSink {
            calls: AtomicUsize::new(0),
        });
        let deliverer = BatchDeliverer::new(sink.clone());
        let summary = validate_fetched(&FetchedData {
            highlights: vec![highlight(1, "", Some(1))],
            books: vec![],
        });

        let result = execute_sync(&deliverer, &summary, &[], false, None, &Deadline::unbounded()).await;

        match result {
            Err(Error::InvalidInput(msg)) => assert_eq!(msg, "No valid highlights to sync"),
            other => panic!("Expected InvalidInput, got {:?}", other),
        }
        assert_eq!(sink.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_execute_sync_grouped_counts() {
        let sink = Arc::new(CountingSink {
            calls: AtomicUsize::new(0),
        });
        let deliverer = BatchDeliverer::new(sink.clone());
        let fetched = data();
        let summary = validate_fetched(&fetched);

        let report = execute_sync(
            &deliverer,
            &summary,
            &fetched.books,
            true,
            None,
            &Deadline::unbounded(),
        )
        .await
        .unwrap();

        // deliverable: 1,2,3 (book 1 and 2) + 5 (no book)
        assert_eq!(report.total_highlights, 4);
        assert_eq!(report.note_count, 3);
        assert_eq!(report.synced, 3);
        assert_eq!(report.errors, 0);
        assert!(!report.quota_exceeded);
        assert_eq!(sink.calls.load(Ordering::SeqCst), 3);
    }
}
