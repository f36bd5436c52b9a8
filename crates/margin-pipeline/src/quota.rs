//! Quota exhaustion detection over delivery failures.

use margin_core::{DeliveryFailure, QuotaDetail};

/// Quota details from the first failure carrying the sink's quota shape.
///
/// Absent fields stay `None`. The message falls back to the failure's own
/// message when the quota body has none.
pub fn detect_quota(failures: &[DeliveryFailure]) -> Option<QuotaDetail> {
    failures.iter().find_map(|failure| {
        let body = failure.error.quota_body()?;
        let details = body.details.as_ref();

        Some(QuotaDetail {
            plan: details.and_then(|d| d.current_plan.clone()),
            limit: details.and_then(|d| d.free_limit),
            used: details.and_then(|d| d.free_used),
            reset_time: details.and_then(|d| d.reset_time.clone()),
            upgrade_url: body
                .upgrade_info
                .as_ref()
                .and_then(|u| u.upgrade_url.clone()),
            message: body
                .message
                .clone()
                .or_else(|| Some(failure.error.message.clone())),
        })
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use margin_core::{
        Note, ProviderFailure, QuotaErrorBody, QuotaUsage, SinkError, UpgradeInfo,
    };

    fn failure(error: SinkError) -> DeliveryFailure {
        DeliveryFailure {
            note: Note {
                content: "x".to_string(),
                created_at: None,
            },
            error,
        }
    }

    fn quota_failure(body: QuotaErrorBody) -> DeliveryFailure {
        failure(SinkError {
            error: ProviderFailure::Quota(body),
            message: "Mem returned 429: quota".to_string(),
            status_code: Some(429),
        })
    }

    #[test]
    fn test_detects_full_quota_shape() {
        let failures = vec![
            failure(SinkError::transport("Request failed: timeout")),
            quota_failure(QuotaErrorBody {
                error_type: "quota_exceeded".to_string(),
                message: Some("Free plan limit reached".to_string()),
                details: Some(QuotaUsage {
                    current_plan: Some("free".to_string()),
                    free_limit: Some(100),
                    free_used: Some(100),
                    reset_time: Some("2024-02-01T00:00:00Z".to_string()),
                }),
                upgrade_info: Some(UpgradeInfo {
                    upgrade_url: Some("https://mem.ai/pricing".to_string()),
                }),
            }),
        ];

        let detail = detect_quota(&failures).unwrap();
        assert_eq!(detail.plan.as_deref(), Some("free"));
        assert_eq!(detail.limit, Some(100));
        assert_eq!(detail.used, Some(100));
        assert_eq!(detail.reset_time.as_deref(), Some("2024-02-01T00:00:00Z"));
        assert_eq!(detail.upgrade_url.as_deref(), Some("https://mem.ai/pricing"));
        assert_eq!(detail.message.as_deref(), Some("Free plan limit reached"));
    }

    #[test]
    fn test_sparse_quota_shape_falls_back_to_outer_message() {
        let failures = vec![quota_failure(QuotaErrorBody {
            error_type: "quota_exceeded".to_string(),
            message: None,
            details: None,
            upgrade_info: None,
        })];

        let detail = detect_quota(&failures).unwrap();
        assert_eq!(detail.plan, None);
        assert_eq!(detail.limit, None);
        assert_eq!(detail.message.as_deref(), Some("Mem returned 429: quota"));
    }

    #[test]
    fn test_other_failures_yield_none() {
        let failures = vec![
            failure(SinkError::transport("Request failed")),
            failure(SinkError {
                error: ProviderFailure::Unknown("Internal failure".to_string()),
                message: "Mem returned 500: Internal failure".to_string(),
                status_code: Some(500),
            }),
        ];
        assert!(detect_quota(&failures).is_none());
        assert!(detect_quota(&[]).is_none());
    }
}
