use std::time::Duration;

use exception_monitor::{
    BrowserInfo, EnvironmentProfile, ErrorRecord, Framework, HttpTransport, IdentifyPayload,
    Mode, Monitor, Normalizer, RawErrorEvent, TransmissionPayload, Transport, TransportError,
};
use mockito::{Matcher, Server};
use serde_json::json;

fn record(message: &str) -> ErrorRecord {
    Normalizer::default()
        .normalize(RawErrorEvent::new(message).with_property("route", "/checkout"))
        .unwrap()
        .unwrap()
}

fn payload(errors: Vec<ErrorRecord>) -> TransmissionPayload {
    TransmissionPayload {
        app_id: "app-9".to_string(),
        framework: Framework::Angular2,
        device: EnvironmentProfile {
            platform: Some("linux-x86_64".to_string()),
            ..EnvironmentProfile::default()
        },
        errors,
    }
}

#[tokio::test]
async fn batch_is_posted_as_json_to_the_exceptions_endpoint() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("POST", "/monitoring/app-9/exceptions")
        .match_header("content-type", "application/json")
        .match_body(Matcher::AllOf(vec![
            Matcher::PartialJson(json!({
                "app_id": "app-9",
                "framework": "angular2",
                "device": { "platform": "linux-x86_64" }
            })),
            Matcher::Regex(
                r#"\{"message":"first","stack":\[\],"isHttp":false,"timestamp":"[^"]+","route":"/checkout"\},\{"message":"second""#
                    .to_string(),
            ),
        ]))
        .with_status(201)
        .create_async()
        .await;

    let transport = HttpTransport::new(&server.url(), "app-9", None).unwrap();
    transport
        .send(&payload(vec![record("first"), record("second")]))
        .await
        .unwrap();

    mock.assert_async().await;
}

#[tokio::test]
async fn non_success_status_is_reported() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("POST", "/monitoring/app-9/exceptions")
        .with_status(500)
        .create_async()
        .await;

    let transport = HttpTransport::new(&server.url(), "app-9", None).unwrap();
    let err = transport
        .send(&payload(vec![record("only")]))
        .await
        .unwrap_err();

    match err {
        TransportError::Status { endpoint, status } => {
            assert_eq!(status, 500);
            assert!(endpoint.ends_with("/monitoring/app-9/exceptions"));
        }
        other => panic!("expected status error, got {other:?}"),
    }
    mock.assert_async().await;
}

#[tokio::test]
async fn unreachable_collector_is_a_request_error() {
    let transport = HttpTransport::new(
        "http://127.0.0.1:9",
        "app-9",
        Some(Duration::from_millis(500)),
    )
    .unwrap();
    let err = transport.send(&payload(Vec::new())).await.unwrap_err();
    assert!(matches!(err, TransportError::Request { .. }));
}

#[tokio::test]
async fn identify_posts_to_the_user_endpoint() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("POST", "/monitoring/app-9/u")
        .match_header("content-type", "application/json")
        .match_body(Matcher::Json(json!({
            "enduser_id": "7d0f3c0e-2a4b-4c55-9a43-3f1a2b7f6c10",
            "os_version": "14",
            "device": "Pixel 8",
            "platform": "Android",
            "user_agent": null
        })))
        .with_status(204)
        .create_async()
        .await;

    let transport = HttpTransport::new(&server.url(), "app-9", None).unwrap();
    transport
        .identify(&IdentifyPayload {
            enduser_id: "7d0f3c0e-2a4b-4c55-9a43-3f1a2b7f6c10".to_string(),
            os_version: Some("14".to_string()),
            device: Some("Pixel 8".to_string()),
            platform: Some("Android".to_string()),
            user_agent: None,
        })
        .await
        .unwrap();

    mock.assert_async().await;
}

#[tokio::test]
async fn monitor_ships_captured_errors_end_to_end() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("POST", "/monitoring/shop/exceptions")
        .match_body(Matcher::AllOf(vec![
            Matcher::PartialJson(json!({
                "app_id": "shop",
                "framework": "none",
                "device": { "language": "fr-FR" }
            })),
            Matcher::Regex(
                r#""message":"A".*"message":"B".*"isHttp":true.*"url":"https://shop.test/api".*"message":"C""#
                    .to_string(),
            ),
        ]))
        .with_status(200)
        .expect(1)
        .create_async()
        .await;

    let monitor = Monitor::builder()
        .app_id("shop")
        .mode(Mode::Development)
        .dev_api_base(server.url())
        .flush_delay(Duration::from_millis(50))
        .browser(BrowserInfo {
            language: Some("fr-FR".to_string()),
            ..BrowserInfo::default()
        })
        .build()
        .unwrap();
    let handle = monitor.handle();
    handle.resolve_profile().await.unwrap();

    handle.handle_error(RawErrorEvent::new("A"));
    handle.handle_error(RawErrorEvent::new("B").with_url("https://shop.test/api"));
    handle.handle_error(RawErrorEvent::new("C"));

    for _ in 0..100 {
        if mock.matched_async().await {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    mock.assert_async().await;
    assert_eq!(handle.stats().await.unwrap().queued, 0);
    assert_eq!(monitor.shutdown().await, 0);
}
