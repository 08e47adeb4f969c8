use std::time::Duration;

use chrono::Utc;
use margin::models::ReportCategory;
use margin::notify::{build_notifier, AlertKind, ModerationAlert, ModerationNotifier, NotifyError, WebhookNotifier};
use serde_json::json;
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn alert() -> ModerationAlert {
    ModerationAlert {
        comment_id: "abcde".into(),
        reporter_id: "bob".into(),
        category: ReportCategory::Spam,
        message: "link farm".into(),
        kind: AlertKind::Filed,
        at: Utc::now(),
    }
}

#[tokio::test]
async fn webhook_receives_alert_json() {
    let mock_server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/hooks/moderation"))
        .and(body_partial_json(json!({
            "comment_id": "abcde",
            "reporter_id": "bob",
            "category": "spam",
            "kind": "filed"
        })))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&mock_server)
        .await;

    let url = format!("{}/hooks/moderation", mock_server.uri());
    let notifier = WebhookNotifier::new(url, Duration::from_secs(5)).unwrap();
    notifier.notify(&alert()).await.unwrap();
}

#[tokio::test]
async fn webhook_error_status_is_reported() {
    let mock_server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&mock_server)
        .await;

    let notifier = WebhookNotifier::new(mock_server.uri(), Duration::from_secs(5)).unwrap();
    let err = notifier.notify(&alert()).await.unwrap_err();
    assert!(matches!(err, NotifyError::Status(500)));
}

#[tokio::test]
async fn unreachable_webhook_is_transport_error() {
    // nothing listens on the discard port
    let notifier = WebhookNotifier::new("http://127.0.0.1:9/", Duration::from_secs(2)).unwrap();
    assert!(matches!(notifier.notify(&alert()).await, Err(NotifyError::Transport(_))));
}

#[tokio::test]
async fn log_sink_without_webhook() {
    let notifier = build_notifier(None, Duration::from_secs(1));
    assert!(notifier.notify(&alert()).await.is_ok());
}
