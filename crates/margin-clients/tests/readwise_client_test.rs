//! Integration tests for the Readwise client against a mock server.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::NaiveDate;
use margin_clients::ReadwiseClient;
use margin_core::{DateRange, Deadline, Error, FetchProgress, FetchProgressFn, ProgressStatus};
use wiremock::matchers::{header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn highlight(id: i64, at: &str) -> serde_json::Value {
    serde_json::json!({
        "id": id,
        "text": format!("Highlight {}", id),
        "note": "",
        "location": id,
        "location_type": "page",
        "highlighted_at": at,
        "url": null,
        "color": "yellow",
        "updated": at,
        "book_id": 1,
        "tags": []
    })
}

fn recorder() -> (Arc<Mutex<Vec<FetchProgress>>>, Box<FetchProgressFn<'static>>) {
    let events = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&events);
    let cb: Box<FetchProgressFn<'static>> = Box::new(move |p| sink.lock().unwrap().push(p));
    (events, cb)
}

#[tokio::test]
async fn test_fetch_all_follows_next_links() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/highlights/"))
        .and(query_param("page", "2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "count": 3,
            "next": null,
            "previous": null,
            "results": [highlight(3, "2024-01-03T00:00:00Z")]
        })))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/highlights/"))
        .and(query_param("page_size", "100"))
        .and(header("Authorization", "Token test-token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "count": 3,
            "next": format!("{}/highlights/?page=2&page_size=100", server.uri()),
            "previous": null,
            "results": [highlight(1, "2024-01-01T00:00:00Z"), highlight(2, "2024-01-02T00:00:00Z")]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let client = ReadwiseClient::with_base_url("test-token", server.uri()).unwrap();
    let (events, cb) = recorder();

    let highlights = client
        .fetch_all_highlights(Some(cb.as_ref()), None, &Deadline::after(Duration::from_secs(10)))
        .await
        .unwrap();

    let ids: Vec<i64> = highlights.iter().map(|h| h.id).collect();
    assert_eq!(ids, vec![1, 2, 3]);

    let events = events.lock().unwrap();
    assert_eq!(events.len(), 3);
    assert_eq!(events[0], FetchProgress::in_progress(3, 2));
    assert_eq!(events[1], FetchProgress::in_progress(3, 3));
    assert_eq!(events[2].status, ProgressStatus::Complete);
    assert_eq!(events[2].current, 3);
}

#[tokio::test]
async fn test_fetch_all_stops_at_page_ceiling() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/highlights/"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "count": 5000,
            "next": format!("{}/highlights/?page_size=100&cursor=more", server.uri()),
            "previous": null,
            "results": [highlight(1, "2024-01-01T00:00:00Z")]
        })))
        .expect(15)
        .mount(&server)
        .await;

    let client = ReadwiseClient::with_base_url("tok", server.uri()).unwrap();
    let (events, cb) = recorder();

    let highlights = client
        .fetch_all_highlights(Some(cb.as_ref()), None, &Deadline::after(Duration::from_secs(10)))
        .await
        .unwrap();

    assert_eq!(highlights.len(), 15);
    // total is capped to the page ceiling, not the provider's count
    assert_eq!(events.lock().unwrap()[0].total, 1500);
}

#[tokio::test]
async fn test_fetch_all_sends_updated_after() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/highlights/"))
        .and(query_param("updated__gt", "2024-05-01T00:00:00Z"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "count": 0, "next": null, "previous": null, "results": []
        })))
        .expect(1)
        .mount(&server)
        .await;

    let client = ReadwiseClient::with_base_url("tok", server.uri()).unwrap();
    let highlights = client
        .fetch_all_highlights(None, Some("2024-05-01T00:00:00Z"), &Deadline::unbounded())
        .await
        .unwrap();
    assert!(highlights.is_empty());
}

#[tokio::test]
async fn test_fetch_all_reports_provider_error() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/highlights/"))
        .respond_with(
            ResponseTemplate::new(401).set_body_json(serde_json::json!({"detail": "Invalid token."})),
        )
        .mount(&server)
        .await;

    let client = ReadwiseClient::with_base_url("bad", server.uri()).unwrap();
    let (events, cb) = recorder();

    let result = client
        .fetch_all_highlights(Some(cb.as_ref()), None, &Deadline::unbounded())
        .await;

    match result {
        Err(Error::Provider { status, message, .. }) => {
            assert_eq!(status, 401);
            assert_eq!(message, "Invalid token.");
        }
        other => panic!("Expected provider error, got {:?}", other),
    }

    let events = events.lock().unwrap();
    let last = events.last().unwrap();
    assert_eq!(last.status, ProgressStatus::Error);
    assert_eq!(last.error.as_deref(), Some("Invalid token."));
    assert_eq!(last.current, 0);
}

#[tokio::test]
async fn test_fetch_aborts_when_deadline_passes() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/highlights/"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(serde_json::json!({
                    "count": 0, "next": null, "previous": null, "results": []
                }))
                .set_delay(Duration::from_secs(5)),
        )
        .mount(&server)
        .await;

    let client = ReadwiseClient::with_base_url("tok", server.uri()).unwrap();
    let result = client
        .fetch_all_highlights(None, None, &Deadline::after(Duration::from_millis(100)))
        .await;

    assert!(matches!(result, Err(Error::DeadlineExceeded(_))));
}

#[tokio::test]
async fn test_fetch_by_date_range_filters_results() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/highlights/"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "count": 4,
            "next": null,
            "previous": null,
            "results": [
                highlight(1, "2023-12-31T23:59:59Z"),
                highlight(2, "2024-01-10T08:00:00Z"),
                highlight(3, "2024-01-31T23:59:59.500Z"),
                highlight(4, "2024-02-01T00:00:00Z")
            ]
        })))
        .mount(&server)
        .await;

    let client = ReadwiseClient::with_base_url("tok", server.uri()).unwrap();
    let (events, cb) = recorder();
    let range = DateRange {
        start: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
        end: NaiveDate::from_ymd_opt(2024, 1, 31).unwrap(),
    };

    let highlights = client
        .fetch_highlights_by_date_range(range, Some(cb.as_ref()), &Deadline::unbounded())
        .await
        .unwrap();

    let ids: Vec<i64> = highlights.iter().map(|h| h.id).collect();
    assert_eq!(ids, vec![2, 3]);

    let events = events.lock().unwrap();
    assert_eq!(events.first().unwrap().status, ProgressStatus::InProgress);
    assert_eq!(*events.last().unwrap(), FetchProgress::complete(2, 2));
}

#[tokio::test]
async fn test_fetch_books_unbounded_pagination() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/books/"))
        .and(query_param("page", "2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "count": 2,
            "next": null,
            "previous": null,
            "results": [{"id": 2, "title": "Second", "author": null, "category": "articles"}]
        })))
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/books/"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "count": 2,
            "next": format!("{}/books/?page=2&page_size=100", server.uri()),
            "previous": null,
            "results": [{"id": 1, "title": "First", "author": "Jane", "category": "books", "source": "kindle"}]
        })))
        .mount(&server)
        .await;

    let client = ReadwiseClient::with_base_url("tok", server.uri()).unwrap();
    let books = client.fetch_books(&Deadline::unbounded()).await.unwrap();

    assert_eq!(books.len(), 2);
    assert_eq!(books[0].title, "First");
    assert_eq!(books[0].source.as_deref(), Some("kindle"));
    assert_eq!(books[1].category.as_deref(), Some("articles"));
}

#[tokio::test]
async fn test_connection_check() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/highlights/"))
        .and(query_param("page_size", "1"))
        .and(header("Authorization", "Token good"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "count": 0, "next": null, "previous": null, "results": []
        })))
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/highlights/"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;

    let good = ReadwiseClient::with_base_url("good", server.uri()).unwrap();
    let bad = ReadwiseClient::with_base_url("bad", server.uri()).unwrap();

    assert!(good.test_connection().await);
    assert!(!bad.test_connection().await);
}
