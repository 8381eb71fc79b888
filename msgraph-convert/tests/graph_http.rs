use msgraph_convert::auth::ClientSecretCredential;
use msgraph_convert::graph::{build_converter, GraphClient};
use msgraph_convert_core::config::{AuthConfig, ConverterSettings, TokenEndpoint, SLICE_ALIGNMENT};
use msgraph_convert_core::contract::{
    AccessToken, CredentialProvider, FileTransferClient, SliceOutcome, UploadSession,
};
use msgraph_convert_core::error::{AuthenticationError, ConversionError, TransportError};
use serde_json::json;
use std::time::Duration;
use wiremock::matchers::{body_bytes, body_string_contains, header, method, path, path_regex, query_param};
use wiremock::{Match, Mock, MockServer, Request, ResponseTemplate};

const SITE: &str = "site-1";
const TENANT: &str = "tenant-1";
const FAKE_PDF: &[u8] = b"%PDF-1.7\n%fake rendition\n";

/// Matches requests that carry no bearer token.
struct NoAuthorization;

impl Match for NoAuthorization {
    fn matches(&self, request: &Request) -> bool {
        !request.headers.contains_key("authorization")
    }
}

fn token() -> AccessToken {
    AccessToken::expiring_in("tok-1", Duration::from_secs(3600))
}

fn drive_path(name: &str) -> String {
    format!("/v1.0/sites/{SITE}/drive/items/root:/{name}:")
}

fn any_temp_item(suffix: &str) -> impl Match {
    path_regex(format!(
        r"^/v1\.0/sites/{SITE}/drive/items/root:/[0-9a-f-]{{36}}\.docx:{suffix}$"
    ))
}

fn graph_client(server: &MockServer) -> GraphClient {
    GraphClient::new(
        reqwest::Client::new(),
        format!("{}/v1.0", server.uri()),
        SITE,
    )
}

fn auth_config(server: &MockServer) -> AuthConfig {
    let mut config = AuthConfig::new(TENANT, "app-1", "s3cret", SITE);
    config.authority_host = server.uri();
    config
}

async fn mount_token_endpoint(server: &MockServer) {
    Mock::given(method("POST"))
        .and(path(format!("/{TENANT}/oauth2/v2.0/token")))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "token_type": "Bearer",
            "expires_in": 3599,
            "access_token": "tok-1"
        })))
        .mount(server)
        .await;
}

#[tokio::test]
async fn upload_puts_content_with_bearer_and_media_type() {
    let server = MockServer::start().await;
    Mock::given(method("PUT"))
        .and(path(format!("{}/content", drive_path("a.docx"))))
        .and(header("authorization", "Bearer tok-1"))
        .and(header(
            "content-type",
            "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
        ))
        .and(body_bytes(b"docx bytes".to_vec()))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({ "id": "item-1" })))
        .expect(1)
        .mount(&server)
        .await;

    graph_client(&server)
        .upload(
            &token(),
            "a.docx",
            "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
            b"docx bytes",
        )
        .await
        .expect("upload should succeed");
}

#[tokio::test]
async fn download_requests_pdf_format() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(format!("{}/content", drive_path("a.docx"))))
        .and(query_param("format", "pdf"))
        .and(header("authorization", "Bearer tok-1"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(FAKE_PDF))
        .expect(1)
        .mount(&server)
        .await;

    let pdf = graph_client(&server)
        .download_converted(&token(), "a.docx")
        .await
        .expect("download should succeed");
    assert_eq!(pdf, FAKE_PDF);
}

#[tokio::test]
async fn unauthorized_is_reported_separately_from_other_statuses() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(format!("{}/content", drive_path("expired.docx"))))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(format!("{}/content", drive_path("broken.docx"))))
        .respond_with(ResponseTemplate::new(406).set_body_string("notSupported"))
        .mount(&server)
        .await;

    let client = graph_client(&server);
    let err = client
        .download_converted(&token(), "expired.docx")
        .await
        .unwrap_err();
    assert!(err.is_unauthorized());

    let err = client
        .download_converted(&token(), "broken.docx")
        .await
        .unwrap_err();
    match err {
        TransportError::Status { status, body, .. } => {
            assert_eq!(status, 406);
            assert_eq!(body, "notSupported");
        }
        other => panic!("expected Status, got {other:?}"),
    }
}

#[tokio::test]
async fn delete_addresses_the_item_by_path() {
    let server = MockServer::start().await;
    Mock::given(method("DELETE"))
        .and(path(drive_path("a.docx")))
        .and(header("authorization", "Bearer tok-1"))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    graph_client(&server)
        .delete(&token(), "a.docx")
        .await
        .expect("delete should succeed");
}

#[tokio::test]
async fn upload_session_and_ranged_slices() {
    let server = MockServer::start().await;
    let upload_url = format!("{}/upload/session-1", server.uri());
    Mock::given(method("POST"))
        .and(path(format!("{}/createUploadSession", drive_path("big.docx"))))
        .and(header("authorization", "Bearer tok-1"))
        .and(body_string_contains("@microsoft.graph.conflictBehavior"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "uploadUrl": upload_url,
            "expirationDateTime": "2030-01-01T00:00:00Z"
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("PUT"))
        .and(path("/upload/session-1"))
        .and(header("content-range", "bytes 0-3/6"))
        .and(NoAuthorization)
        .respond_with(
            ResponseTemplate::new(202).set_body_json(json!({ "nextExpectedRanges": ["4-"] })),
        )
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("PUT"))
        .and(path("/upload/session-1"))
        .and(header("content-range", "bytes 4-5/6"))
        .and(NoAuthorization)
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({ "id": "item-1" })))
        .expect(1)
        .mount(&server)
        .await;

    let client = graph_client(&server);
    let session = client
        .create_upload_session(&token(), "big.docx")
        .await
        .expect("session should be created");
    assert_eq!(session.upload_url, upload_url);
    assert_eq!(session.expiration.as_deref(), Some("2030-01-01T00:00:00Z"));

    let first = client.upload_slice(&session, 0, 6, b"abcd").await.unwrap();
    assert_eq!(
        first,
        SliceOutcome::Accepted {
            next_expected_ranges: vec!["4-".to_string()]
        }
    );
    let last = client.upload_slice(&session, 4, 6, b"ef").await.unwrap();
    assert_eq!(last, SliceOutcome::Completed);
}

#[tokio::test]
async fn cancel_deletes_the_session_url() {
    let server = MockServer::start().await;
    Mock::given(method("DELETE"))
        .and(path("/upload/session-9"))
        .and(NoAuthorization)
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    let session = UploadSession {
        upload_url: format!("{}/upload/session-9", server.uri()),
        expiration: None,
    };
    graph_client(&server)
        .cancel_upload_session(&session)
        .await
        .expect("cancel should succeed");
}

#[tokio::test]
async fn v2_token_request_posts_scope() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(format!("/{TENANT}/oauth2/v2.0/token")))
        .and(body_string_contains("grant_type=client_credentials"))
        .and(body_string_contains("client_id=app-1"))
        .and(body_string_contains("client_secret=s3cret"))
        .and(body_string_contains(
            "scope=https%3A%2F%2Fgraph.microsoft.com%2F.default",
        ))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "token_type": "Bearer",
            "expires_in": 3599,
            "access_token": "tok-v2"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let credential = ClientSecretCredential::new(auth_config(&server), reqwest::Client::new());
    let token = credential.get_token().await.expect("token");
    assert_eq!(token.secret(), "tok-v2");
    assert!(token.remaining() > Duration::from_secs(3500));
}

#[tokio::test]
async fn v1_token_request_posts_resource_and_accepts_string_expiry() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(format!("/{TENANT}/oauth2/token")))
        .and(body_string_contains("resource=https%3A%2F%2Fgraph.microsoft.com"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "token_type": "Bearer",
            "expires_in": "3600",
            "resource": "https://graph.microsoft.com",
            "access_token": "tok-v1"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let mut config = auth_config(&server);
    config.token_endpoint = TokenEndpoint::V1;
    let token = ClientSecretCredential::new(config, reqwest::Client::new())
        .get_token()
        .await
        .expect("token");
    assert_eq!(token.secret(), "tok-v1");
}

#[tokio::test]
async fn rejected_credentials_surface_the_aad_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(format!("/{TENANT}/oauth2/v2.0/token")))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({
            "error": "invalid_client",
            "error_description": "AADSTS7000215: Invalid client secret provided."
        })))
        .mount(&server)
        .await;

    let err = ClientSecretCredential::new(auth_config(&server), reqwest::Client::new())
        .get_token()
        .await
        .unwrap_err();
    match err {
        AuthenticationError::Rejected {
            status,
            error,
            description,
        } => {
            assert_eq!(status, 401);
            assert_eq!(error, "invalid_client");
            assert!(description.unwrap_or_default().starts_with("AADSTS7000215"));
        }
        other => panic!("expected Rejected, got {other:?}"),
    }
}

#[tokio::test]
async fn missing_secret_never_reaches_the_token_endpoint() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let mut config = auth_config(&server);
    config.client_secret = String::new();
    let err = ClientSecretCredential::new(config, reqwest::Client::new())
        .get_token()
        .await
        .unwrap_err();
    assert!(matches!(err, AuthenticationError::MissingField("client_secret")));
}

#[tokio::test]
async fn converter_round_trips_through_the_drive() {
    let server = MockServer::start().await;
    mount_token_endpoint(&server).await;
    Mock::given(method("PUT"))
        .and(any_temp_item("/content"))
        .and(header("authorization", "Bearer tok-1"))
        .and(body_bytes(b"small document".to_vec()))
        .respond_with(ResponseTemplate::new(201))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(any_temp_item("/content"))
        .and(query_param("format", "pdf"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(FAKE_PDF))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("DELETE"))
        .and(any_temp_item(""))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    let settings = ConverterSettings {
        graph_base_url: format!("{}/v1.0", server.uri()),
        ..ConverterSettings::default()
    };
    let converter = build_converter(auth_config(&server), settings, Some(Duration::from_secs(10)))
        .expect("converter");
    let pdf = converter
        .convert_bytes(b"small document".to_vec(), None)
        .await
        .expect("conversion should succeed");
    assert_eq!(pdf, FAKE_PDF);
}

#[tokio::test]
async fn converter_ignores_a_failed_delete() {
    let server = MockServer::start().await;
    mount_token_endpoint(&server).await;
    Mock::given(method("PUT"))
        .and(any_temp_item("/content"))
        .respond_with(ResponseTemplate::new(201))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(any_temp_item("/content"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(FAKE_PDF))
        .mount(&server)
        .await;
    Mock::given(method("DELETE"))
        .and(any_temp_item(""))
        .respond_with(ResponseTemplate::new(500))
        .expect(1)
        .mount(&server)
        .await;

    let settings = ConverterSettings {
        graph_base_url: format!("{}/v1.0", server.uri()),
        ..ConverterSettings::default()
    };
    let converter = build_converter(auth_config(&server), settings, None).expect("converter");
    let pdf = converter
        .convert_bytes(b"doc".to_vec(), Some(".docx"))
        .await
        .expect("a failed delete must not fail the conversion");
    assert!(pdf.starts_with(b"%PDF"));
}

#[tokio::test]
async fn converter_skips_download_and_delete_when_upload_fails() {
    let server = MockServer::start().await;
    mount_token_endpoint(&server).await;
    Mock::given(method("PUT"))
        .and(any_temp_item("/content"))
        .respond_with(ResponseTemplate::new(507).set_body_string("quotaLimitReached"))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;
    Mock::given(method("DELETE"))
        .respond_with(ResponseTemplate::new(204))
        .expect(0)
        .mount(&server)
        .await;

    let settings = ConverterSettings {
        graph_base_url: format!("{}/v1.0", server.uri()),
        ..ConverterSettings::default()
    };
    let converter = build_converter(auth_config(&server), settings, None).expect("converter");
    let err = converter
        .convert_bytes(b"doc".to_vec(), None)
        .await
        .unwrap_err();
    assert!(matches!(err, ConversionError::Upload { .. }), "got {err:?}");
}

#[tokio::test]
async fn converter_uses_an_upload_session_above_the_threshold() {
    let server = MockServer::start().await;
    mount_token_endpoint(&server).await;
    let upload_url = format!("{}/upload/session-big", server.uri());
    let total = SLICE_ALIGNMENT + 10;

    Mock::given(method("POST"))
        .and(any_temp_item("/createUploadSession"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "uploadUrl": upload_url })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("PUT"))
        .and(path("/upload/session-big"))
        .and(header(
            "content-range",
            format!("bytes 0-{}/{}", SLICE_ALIGNMENT - 1, total).as_str(),
        ))
        .respond_with(ResponseTemplate::new(202).set_body_json(json!({
            "nextExpectedRanges": [format!("{SLICE_ALIGNMENT}-")]
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("PUT"))
        .and(path("/upload/session-big"))
        .and(header(
            "content-range",
            format!("bytes {}-{}/{}", SLICE_ALIGNMENT, total - 1, total).as_str(),
        ))
        .respond_with(ResponseTemplate::new(201))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("PUT"))
        .and(any_temp_item("/content"))
        .respond_with(ResponseTemplate::new(201))
        .expect(0)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(any_temp_item("/content"))
        .and(query_param("format", "pdf"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(FAKE_PDF))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("DELETE"))
        .and(any_temp_item(""))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    let settings = ConverterSettings {
        graph_base_url: format!("{}/v1.0", server.uri()),
        large_file_threshold: 1024,
        slice_size: SLICE_ALIGNMENT,
        ..ConverterSettings::default()
    };
    let converter = build_converter(auth_config(&server), settings, None).expect("converter");
    let pdf = converter
        .convert_bytes(vec![7u8; total], Some("docx"))
        .await
        .expect("sliced conversion should succeed");
    assert_eq!(pdf, FAKE_PDF);
}

/// Collects the levels and rendered fields of emitted events.
struct WarnCollector {
    warnings: std::sync::Arc<std::sync::Mutex<Vec<String>>>,
}

impl<S: tracing::Subscriber> tracing_subscriber::Layer<S> for WarnCollector {
    fn on_event(&self, event: &tracing::Event<'_>, _ctx: tracing_subscriber::layer::Context<'_, S>) {
        if *event.metadata().level() == tracing::Level::WARN {
            self.warnings.lock().unwrap().push(format!("{event:?}"));
        }
    }
}

#[tokio::test]
async fn unreadable_slice_acknowledgement_is_logged_and_treated_as_accepted() {
    use tracing_subscriber::prelude::*;

    let warnings = std::sync::Arc::new(std::sync::Mutex::new(Vec::new()));
    let subscriber = tracing_subscriber::Registry::default().with(WarnCollector {
        warnings: warnings.clone(),
    });
    let _guard = tracing::subscriber::set_default(subscriber);

    let server = MockServer::start().await;
    Mock::given(method("PUT"))
        .and(path("/upload/session-odd"))
        .respond_with(ResponseTemplate::new(202).set_body_string("not json"))
        .expect(1)
        .mount(&server)
        .await;

    let session = UploadSession {
        upload_url: format!("{}/upload/session-odd", server.uri()),
        expiration: None,
    };
    let outcome = graph_client(&server)
        .upload_slice(&session, 0, 10, b"abcd")
        .await
        .expect("a 202 is still an accepted slice");
    assert_eq!(
        outcome,
        SliceOutcome::Accepted {
            next_expected_ranges: vec![]
        }
    );

    let warnings = warnings.lock().unwrap();
    assert!(
        warnings
            .iter()
            .any(|w| w.contains("Unreadable slice acknowledgement")),
        "expected a warning about the slice body, got: {warnings:?}"
    );
}
