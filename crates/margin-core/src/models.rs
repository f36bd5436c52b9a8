//! Data models shared by every margin crate.
//!
//! Source records ([`Highlight`], [`Book`]) keep the Readwise v2 wire format
//! (snake_case). Everything margin produces itself uses camelCase on the wire.

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::defaults;

// =============================================================================
// SOURCE RECORDS
// =============================================================================

/// A user-defined tag attached to a highlight or book.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tag {
    #[serde(default)]
    pub id: i64,
    pub name: String,
}

/// A single excerpt captured in the source service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Highlight {
    pub id: i64,
    #[serde(default)]
    pub text: String,
    pub note: Option<String>,
    pub location: Option<i64>,
    pub location_type: Option<String>,
    /// RFC 3339 timestamp of when the excerpt was captured.
    pub highlighted_at: Option<String>,
    pub url: Option<String>,
    pub color: Option<String>,
    pub updated: Option<String>,
    /// Parent book. Zero or negative values are treated as missing.
    pub book_id: Option<i64>,
    #[serde(default)]
    pub tags: Vec<Tag>,
}

impl Highlight {
    /// Parsed `highlighted_at`, if present and well-formed.
    pub fn highlighted_at_utc(&self) -> Option<DateTime<Utc>> {
        self.highlighted_at.as_deref().and_then(parse_timestamp)
    }

    /// Book reference, only when it is a positive id.
    pub fn resolvable_book_id(&self) -> Option<i64> {
        self.book_id.filter(|id| *id > 0)
    }
}

/// The parent grouping (book, article, tweet thread...) of highlights.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Book {
    pub id: i64,
    #[serde(default)]
    pub title: String,
    pub author: Option<String>,
    pub category: Option<String>,
    pub source: Option<String>,
    #[serde(default)]
    pub num_highlights: u64,
    pub last_highlight_at: Option<String>,
    pub updated: Option<String>,
    pub cover_image_url: Option<String>,
    pub highlights_url: Option<String>,
    pub source_url: Option<String>,
    pub asin: Option<String>,
    #[serde(default)]
    pub tags: Vec<Tag>,
}

/// Parse a provider timestamp.
///
/// Accepts RFC 3339, a naive `YYYY-MM-DDTHH:MM:SS[.fff]` (read as UTC) and a
/// bare `YYYY-MM-DD` (midnight UTC).
pub fn parse_timestamp(value: &str) -> Option<DateTime<Utc>> {
    let value = value.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S%.f") {
        return Some(naive.and_utc());
    }
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

// =============================================================================
// PROGRESS
// =============================================================================

/// Lifecycle of a progress record. `Complete` and `Error` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ProgressStatus {
    #[default]
    Pending,
    InProgress,
    Complete,
    Error,
}

impl ProgressStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Complete | Self::Error)
    }
}

/// Progress of a fetch stage.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct FetchProgress {
    pub total: usize,
    pub current: usize,
    pub status: ProgressStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl FetchProgress {
    pub fn in_progress(total: usize, current: usize) -> Self {
        Self {
            total,
            current,
            status: ProgressStatus::InProgress,
            error: None,
        }
    }

    pub fn complete(total: usize, current: usize) -> Self {
        Self {
            total,
            current,
            status: ProgressStatus::Complete,
            error: None,
        }
    }

    pub fn failed(total: usize, current: usize, message: impl Into<String>) -> Self {
        Self {
            total,
            current,
            status: ProgressStatus::Error,
            error: Some(message.into()),
        }
    }
}

/// Progress of a delivery stage.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncProgress {
    pub total: usize,
    pub synced: usize,
    pub errors: usize,
    pub status: ProgressStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_batch: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_batches: Option<usize>,
}

/// Callback receiving fetch progress updates.
pub type FetchProgressFn<'a> = dyn Fn(FetchProgress) + Send + Sync + 'a;

/// Callback receiving delivery progress updates.
pub type SyncProgressFn<'a> = dyn Fn(SyncProgress) + Send + Sync + 'a;

// =============================================================================
// VALIDATION
// =============================================================================

/// Outcome of validating one highlight.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationResult {
    pub is_valid: bool,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
    pub highlight: Highlight,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub formatted_content: Option<String>,
}

/// Partitioned outcome of validating a batch.
///
/// `valid + warnings + invalid == total`; the three counts are disjoint.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ValidationSummary {
    pub total: usize,
    /// No errors and no warnings.
    pub valid: usize,
    /// No errors, at least one warning.
    pub warnings: usize,
    /// At least one error.
    pub invalid: usize,
    #[serde(default)]
    pub status: ProgressStatus,
    pub results: Vec<ValidationResult>,
}

impl ValidationSummary {
    /// Results that may be delivered, warning-only ones included.
    pub fn valid_for_delivery(&self) -> impl Iterator<Item = &ValidationResult> {
        self.results.iter().filter(|r| r.is_valid)
    }

    /// Results with at least one error.
    pub fn invalid_results(&self) -> impl Iterator<Item = &ValidationResult> {
        self.results.iter().filter(|r| !r.is_valid)
    }

    /// Highlights that may be delivered, in validation order.
    pub fn deliverable_highlights(&self) -> Vec<Highlight> {
        self.valid_for_delivery()
            .map(|r| r.highlight.clone())
            .collect()
    }

    pub fn has_deliverable(&self) -> bool {
        self.results.iter().any(|r| r.is_valid)
    }
}

// =============================================================================
// NOTES AND DELIVERY
// =============================================================================

/// Rendered payload destined for the sink.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Note {
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
}

/// Note as acknowledged by the sink.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatedNote {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub created_at: String,
    #[serde(default)]
    pub updated_at: String,
}

/// Usage numbers carried by a quota failure.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct QuotaUsage {
    pub current_plan: Option<String>,
    pub free_limit: Option<u64>,
    pub free_used: Option<u64>,
    pub reset_time: Option<String>,
}

/// Upgrade hint carried by a quota failure.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct UpgradeInfo {
    pub upgrade_url: Option<String>,
}

/// The sink's quota-exhaustion error body (`{"error": <this>}`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuotaErrorBody {
    #[serde(rename = "type")]
    pub error_type: String,
    pub message: Option<String>,
    pub details: Option<QuotaUsage>,
    pub upgrade_info: Option<UpgradeInfo>,
}

/// Decoded provider failure.
///
/// Serialized untagged so a quota failure keeps the provider's nested shape
/// (`error.error.type`) inside a delivery failure record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum ProviderFailure {
    /// Body decoded as the quota shape with the quota marker.
    Quota(QuotaErrorBody),
    /// Anything else, carrying the raw provider message.
    Unknown(String),
}

/// Failure of a single note delivery.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, thiserror::Error)]
#[serde(rename_all = "camelCase")]
#[error("{message}")]
pub struct SinkError {
    pub error: ProviderFailure,
    pub message: String,
    pub status_code: Option<u16>,
}

impl SinkError {
    /// Failure before any response arrived (connection, timeout, decoding).
    pub fn transport(message: impl Into<String>) -> Self {
        Self {
            error: ProviderFailure::Unknown("Unknown error".to_string()),
            message: message.into(),
            status_code: None,
        }
    }

    /// Note never submitted because the stage budget ran out.
    pub fn deadline(message: impl Into<String>) -> Self {
        let message = message.into();
        Self {
            error: ProviderFailure::Unknown(message.clone()),
            message,
            status_code: None,
        }
    }

    pub fn quota_body(&self) -> Option<&QuotaErrorBody> {
        match &self.error {
            ProviderFailure::Quota(body) => Some(body),
            ProviderFailure::Unknown(_) => None,
        }
    }
}

/// A note that could not be delivered and why.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeliveryFailure {
    pub note: Note,
    pub error: SinkError,
}

/// Counts and failures of one delivery run.
///
/// `synced + errors` equals the number of notes submitted.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeliveryOutcome {
    pub synced: usize,
    pub errors: usize,
    pub error_details: Vec<DeliveryFailure>,
}

/// Quota information surfaced to the caller.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuotaDetail {
    pub plan: Option<String>,
    pub limit: Option<u64>,
    pub used: Option<u64>,
    pub reset_time: Option<String>,
    pub upgrade_url: Option<String>,
    pub message: Option<String>,
}

// =============================================================================
// SYNC CONFIGURATION
// =============================================================================

/// API credentials for both providers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Credentials {
    pub readwise_token: String,
    pub mem_api_key: String,
}

/// Which highlights a sync should cover.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SyncOption {
    #[default]
    Full,
    DateRange,
    Filtered,
}

/// Inclusive calendar date range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateRange {
    /// First instant covered (`start 00:00:00.000` UTC).
    pub fn start_instant(&self) -> DateTime<Utc> {
        self.start.and_time(chrono::NaiveTime::MIN).and_utc()
    }

    /// Last instant covered (`end 23:59:59.999` UTC).
    pub fn end_instant(&self) -> DateTime<Utc> {
        self.end
            .and_hms_milli_opt(23, 59, 59, 999)
            .map(|naive| naive.and_utc())
            .unwrap_or_else(|| self.end.and_time(chrono::NaiveTime::MIN).and_utc())
    }

    pub fn contains(&self, instant: DateTime<Utc>) -> bool {
        instant >= self.start_instant() && instant <= self.end_instant()
    }
}

/// User-selected sync parameters.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncConfig {
    #[serde(default)]
    pub option: SyncOption,
    pub date_range: Option<DateRange>,
    pub source_types: Option<Vec<String>>,
    pub book_ids: Option<Vec<i64>>,
    /// RFC 3339 lower bound on `updated` for incremental syncs.
    pub updated_after: Option<String>,
    #[serde(default)]
    pub group_by_book: bool,
}

impl SyncConfig {
    /// Reject configurations that cannot drive a fetch.
    pub fn validate(&self) -> crate::Result<()> {
        if self.option == SyncOption::DateRange {
            let range = self.date_range.ok_or_else(|| {
                crate::Error::InvalidInput("Please select both start and end dates".to_string())
            })?;
            if range.start > range.end {
                return Err(crate::Error::InvalidInput(
                    "Start date must be before end date".to_string(),
                ));
            }
        }
        Ok(())
    }
}

/// Highlights and books retrieved by a fetch stage.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct FetchedData {
    pub highlights: Vec<Highlight>,
    pub books: Vec<Book>,
}

/// Result of a sync execution as reported to callers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncReport {
    pub total: usize,
    pub total_highlights: usize,
    pub note_count: usize,
    pub synced: usize,
    pub errors: usize,
    pub error_details: Vec<DeliveryFailure>,
    pub quota_exceeded: bool,
    pub quota_details: Option<QuotaDetail>,
}

impl SyncReport {
    /// Quota hit and nothing got through: the run counts as failed.
    pub fn is_quota_failure(&self) -> bool {
        self.quota_exceeded && self.synced == 0
    }

    /// Message shown when the run fails on quota.
    pub fn quota_message(&self) -> String {
        self.quota_details
            .as_ref()
            .and_then(|q| q.message.clone())
            .unwrap_or_else(|| "Mem quota exceeded: free plan limit reached".to_string())
    }
}

/// Label used for a highlight's source when rendering.
pub(crate) fn source_label(book: Option<&Book>, highlight: &Highlight) -> String {
    book.and_then(|b| b.source.as_deref())
        .filter(|s| !s.is_empty())
        .or_else(|| highlight.location_type.as_deref().filter(|s| !s.is_empty()))
        .unwrap_or(defaults::UNKNOWN_SOURCE)
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn highlight_json() -> serde_json::Value {
        serde_json::json!({
            "id": 42,
            "text": "Quote",
            "note": null,
            "location": 120,
            "location_type": "page",
            "highlighted_at": "2024-03-05T10:15:00Z",
            "url": null,
            "color": "yellow",
            "updated": "2024-03-05T10:15:00Z",
            "book_id": 7,
            "tags": [{"id": 1, "name": "Deep Work"}]
        })
    }

    #[test]
    fn test_highlight_deserializes_readwise_shape() {
        let h: Highlight = serde_json::from_value(highlight_json()).unwrap();
        assert_eq!(h.id, 42);
        assert_eq!(h.book_id, Some(7));
        assert_eq!(h.tags[0].name, "Deep Work");
        assert!(h.highlighted_at_utc().is_some());
    }

    #[test]
    fn test_highlight_tolerates_missing_fields() {
        let h: Highlight = serde_json::from_value(serde_json::json!({"id": 1})).unwrap();
        assert_eq!(h.text, "");
        assert!(h.tags.is_empty());
        assert_eq!(h.resolvable_book_id(), None);
    }

    #[test]
    fn test_resolvable_book_id_rejects_non_positive() {
        let mut h: Highlight = serde_json::from_value(highlight_json()).unwrap();
        h.book_id = Some(0);
        assert_eq!(h.resolvable_book_id(), None);
        h.book_id = Some(-3);
        assert_eq!(h.resolvable_book_id(), None);
    }

    #[test]
    fn test_parse_timestamp_variants() {
        assert!(parse_timestamp("2024-03-05T10:15:00+02:00").is_some());
        assert!(parse_timestamp("2024-03-05T10:15:00.123").is_some());
        assert!(parse_timestamp("2024-03-05").is_some());
        assert!(parse_timestamp("yesterday").is_none());
        assert!(parse_timestamp("").is_none());
    }

    #[test]
    fn test_date_range_bounds_inclusive() {
        let range = DateRange {
            start: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
            end: NaiveDate::from_ymd_opt(2024, 1, 31).unwrap(),
        };
        assert!(range.contains(parse_timestamp("2024-01-01T00:00:00Z").unwrap()));
        assert!(range.contains(parse_timestamp("2024-01-31T23:59:59.999Z").unwrap()));
        assert!(!range.contains(parse_timestamp("2024-02-01T00:00:00Z").unwrap()));
        assert!(!range.contains(parse_timestamp("2023-12-31T23:59:59.999Z").unwrap()));
    }

    #[test]
    fn test_sync_config_rejects_inverted_range() {
        let config = SyncConfig {
            option: SyncOption::DateRange,
            date_range: Some(DateRange {
                start: NaiveDate::from_ymd_opt(2024, 2, 1).unwrap(),
                end: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
            }),
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_sync_config_requires_range_for_date_option() {
        let config = SyncConfig {
            option: SyncOption::DateRange,
            ..Default::default()
        };
        assert!(config.validate().is_err());
        assert!(SyncConfig::default().validate().is_ok());
    }

    #[test]
    fn test_progress_status_wire_names() {
        assert_eq!(
            serde_json::to_value(ProgressStatus::InProgress).unwrap(),
            "in-progress"
        );
        assert!(ProgressStatus::Complete.is_terminal());
        assert!(ProgressStatus::Error.is_terminal());
        assert!(!ProgressStatus::Pending.is_terminal());
    }

    #[test]
    fn test_quota_failure_serializes_nested_shape() {
        let err = SinkError {
            error: ProviderFailure::Quota(QuotaErrorBody {
                error_type: "quota_exceeded".to_string(),
                message: Some("Limit reached".to_string()),
                details: None,
                upgrade_info: None,
            }),
            message: "Mem returned 429".to_string(),
            status_code: Some(429),
        };
        let value = serde_json::to_value(&err).unwrap();
        assert_eq!(value["error"]["type"], "quota_exceeded");
        assert_eq!(value["statusCode"], 429);
    }

    #[test]
    fn test_summary_deliverable_includes_warning_only() {
        let h: Highlight = serde_json::from_value(highlight_json()).unwrap();
        let summary = ValidationSummary {
            total: 2,
            valid: 0,
            warnings: 1,
            invalid: 1,
            status: ProgressStatus::Complete,
            results: vec![
                ValidationResult {
                    is_valid: true,
                    errors: vec![],
                    warnings: vec!["Missing or invalid book ID".to_string()],
                    highlight: h.clone(),
                    formatted_content: None,
                },
                ValidationResult {
                    is_valid: false,
                    errors: vec!["Missing highlight text".to_string()],
                    warnings: vec![],
                    highlight: h,
                    formatted_content: None,
                },
            ],
        };
        assert_eq!(summary.valid_for_delivery().count(), 1);
        assert_eq!(summary.invalid_results().count(), 1);
        assert!(summary.has_deliverable());
    }
}
