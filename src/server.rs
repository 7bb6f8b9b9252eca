//! HTTP surface of the API service.

use crate::auth::require_basic_auth;
use crate::config::Config;
use crate::error::{ApiError, ErrorKind};
use crate::markdown::format_file_size;
use crate::pipeline::InsightPipeline;
use crate::schema::{ExtractResponse, HealthResponse, ProcessResponse};
use crate::upload::read_pdf_upload;
use axum::{
    extract::{multipart::MultipartRejection, DefaultBodyLimit, Multipart, State},
    http::{header, HeaderMap, HeaderValue, Method},
    middleware,
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::cors::{AllowHeaders, CorsLayer};
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;
use tracing::info;

/// Room for multipart boundaries and headers on top of the file itself.
const MULTIPART_OVERHEAD: usize = 1024 * 1024;

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub pipeline: Arc<InsightPipeline>,
}

impl AppState {
    pub fn new(config: Config, pipeline: InsightPipeline) -> Self {
        Self {
            config: Arc::new(config),
            pipeline: Arc::new(pipeline),
        }
    }
}

/// Build the application router with all layers.
pub fn router(state: AppState) -> anyhow::Result<Router> {
    let config = state.config.clone();

    let cors = CorsLayer::new()
        .allow_origin(HeaderValue::from_str(&config.frontend_url)?)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers(AllowHeaders::mirror_request())
        .allow_credentials(true);

    let mut app = Router::new()
        .route("/health", get(health))
        .route("/api/process-pdf/", post(process_pdf))
        .route("/api/process-pdf", post(process_pdf))
        .route("/api/extract-text/", post(extract_text))
        .route("/api/extract-text", post(extract_text));

    if let Some(dir) = &config.static_dir {
        info!("Serving static client from {}", dir.display());
        app = app.fallback_service(ServeDir::new(dir));
    }

    let mut app = app
        .layer(DefaultBodyLimit::max(
            config.max_file_size.saturating_add(MULTIPART_OVERHEAD),
        ))
        .with_state(state);

    if let Some(credentials) = &config.basic_auth {
        info!("Basic authentication enabled for user '{}'", credentials.username);
        app = app.layer(middleware::from_fn_with_state(
            Arc::new(credentials.clone()),
            require_basic_auth,
        ));
    }

    Ok(app.layer(cors).layer(TraceLayer::new_for_http()))
}

// ============================================================================
// Handlers
// ============================================================================

/// Liveness probe.
async fn health() -> Json<HealthResponse> {
    Json(HealthResponse::healthy())
}

/// Upload a PDF and return the generated insight report.
async fn process_pdf(
    State(state): State<AppState>,
    headers: HeaderMap,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Response, ApiError> {
    let mut multipart = multipart.map_err(rejected_multipart)?;
    let upload = read_pdf_upload(&mut multipart, state.config.max_file_size).await?;

    info!(
        "Processing PDF: {}, size: {}",
        upload.filename,
        format_file_size(upload.size() as u64)
    );

    let insights = state.pipeline.generate_insights(&upload).await?;

    if wants_markdown(&headers) {
        return Ok((
            [(header::CONTENT_TYPE, "text/markdown; charset=utf-8")],
            insights,
        )
            .into_response());
    }

    Ok(Json(ProcessResponse {
        insights,
        filename: Some(upload.filename),
    })
    .into_response())
}

/// Upload a PDF and return the OCR markdown only.
async fn extract_text(
    State(state): State<AppState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<ExtractResponse>, ApiError> {
    let mut multipart = multipart.map_err(rejected_multipart)?;
    let upload = read_pdf_upload(&mut multipart, state.config.max_file_size).await?;

    info!(
        "Extracting text from PDF: {}, size: {}",
        upload.filename,
        format_file_size(upload.size() as u64)
    );

    let extracted = state.pipeline.extract_text(&upload).await?;

    Ok(Json(ExtractResponse {
        extracted_content: extracted.markdown,
        filename: Some(upload.filename),
    }))
}

// ============================================================================
// Helper functions
// ============================================================================

fn rejected_multipart(rejection: MultipartRejection) -> ApiError {
    ApiError::new(
        ErrorKind::MalformedUpload,
        format!("Expected a multipart/form-data upload: {}", rejection.body_text()),
    )
}

/// True when the client listed `text/markdown` in its `Accept` header.
fn wants_markdown(headers: &HeaderMap) -> bool {
    headers
        .get_all(header::ACCEPT)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .filter_map(|range| range.split(';').next())
        .any(|media| media.trim().eq_ignore_ascii_case("text/markdown"))
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::config::{BasicAuth, LogLevel, Secret};
    use crate::error::ErrorBody;
    use crate::pdf::tests::sample_pdf;
    use crate::pipeline::tests::{completion_client_with_timeout, StubOcr};
    use crate::prompt::PromptTemplate;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
    use http_body_util::BodyExt;
    use serde_json::json;
    use std::path::PathBuf;
    use std::sync::atomic::Ordering;
    use std::time::Duration;
    use tower::ServiceExt;
    use wiremock::matchers::method;
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const BOUNDARY: &str = "insightboundary";

    pub(crate) fn test_config() -> Config {
        Config {
            mistral_api_key: Secret::new("mk"),
            mistral_api_base: "http://127.0.0.1:9".to_string(),
            openai_api_key: Secret::new("ok"),
            openai_api_host: "http://127.0.0.1:9".to_string(),
            model: "test-model".to_string(),
            frontend_url: "http://localhost:9002".to_string(),
            system_prompt_file: PathBuf::from("system_prompts.yaml"),
            system_prompt_key: "test".to_string(),
            prompt: PromptTemplate::new("test", "Explain:\n{{document}}"),
            max_file_size: 64 * 1024,
            save_extracted_content: false,
            output_dir: PathBuf::from("outputs"),
            host: "127.0.0.1".to_string(),
            port: 8000,
            log_level: LogLevel::Info,
            basic_auth: None,
            static_dir: None,
            ocr_timeout: Duration::from_secs(5),
            completion_timeout: Duration::from_secs(5),
        }
    }

    struct Harness {
        app: Router,
        ocr: Arc<StubOcr>,
        _server: MockServer,
    }

    async fn harness(config: Config, ocr: StubOcr, completion: ResponseTemplate) -> Harness {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(completion)
            .mount(&server)
            .await;

        let ocr = Arc::new(ocr);
        let completion = completion_client_with_timeout(&server, config.completion_timeout);
        let pipeline = InsightPipeline::new(ocr.clone(), completion, config.prompt.clone(), None);
        let app = router(AppState::new(config, pipeline)).unwrap();
        Harness {
            app,
            ocr,
            _server: server,
        }
    }

    fn insights_reply(text: &str) -> ResponseTemplate {
        ResponseTemplate::new(200).set_body_json(json!({
            "choices": [{"message": {"content": text}}]
        }))
    }

    fn multipart_body(field: &str, filename: &str, content_type: &str, data: &[u8]) -> Vec<u8> {
        let mut body = Vec::new();
        body.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{field}\"; filename=\"{filename}\"\r\nContent-Type: {content_type}\r\n\r\n"
            )
            .as_bytes(),
        );
        body.extend_from_slice(data);
        body.extend_from_slice(format!("\r\n--{BOUNDARY}--\r\n").as_bytes());
        body
    }

    fn upload_request(uri: &str, body: Vec<u8>) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={BOUNDARY}"),
            )
            .body(Body::from(body))
            .unwrap()
    }

    async fn json_body(response: Response) -> serde_json::Value {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    async fn error_body(response: Response) -> ErrorBody {
        serde_json::from_value(json_body(response).await).unwrap()
    }

    #[tokio::test]
    async fn test_health() {
        let h = harness(test_config(), StubOcr::ok("x"), insights_reply("x")).await;
        let response = h
            .app
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body["status"], "healthy");
    }

    #[tokio::test]
    async fn test_process_pdf_returns_insights() {
        let h = harness(test_config(), StubOcr::ok("# Paper"), insights_reply("## Key ideas")).await;
        let body = multipart_body("pdf_file", "paper.pdf", "application/pdf", &sample_pdf(1));
        let response = h
            .app
            .oneshot(upload_request("/api/process-pdf/", body))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body["insights"], "## Key ideas");
        assert_eq!(body["filename"], "paper.pdf");
    }

    #[tokio::test]
    async fn test_process_pdf_markdown_negotiation() {
        let h = harness(test_config(), StubOcr::ok("# Paper"), insights_reply("## Raw")).await;
        let body = multipart_body("pdf_file", "paper.pdf", "application/pdf", &sample_pdf(1));
        let mut request = upload_request("/api/process-pdf", body);
        request.headers_mut().insert(
            header::ACCEPT,
            HeaderValue::from_static("text/markdown, application/json;q=0.5"),
        );

        let response = h.app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers()[header::CONTENT_TYPE],
            "text/markdown; charset=utf-8"
        );
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        assert_eq!(&bytes[..], b"## Raw");
    }

    #[tokio::test]
    async fn test_extract_text_endpoint() {
        let h = harness(test_config(), StubOcr::ok("# Extracted"), insights_reply("unused")).await;
        let body = multipart_body("pdf_file", "paper.pdf", "application/pdf", &sample_pdf(1));
        let response = h
            .app
            .oneshot(upload_request("/api/extract-text/", body))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body["extracted_content"], "# Extracted");
        assert_eq!(body["filename"], "paper.pdf");
    }

    #[tokio::test]
    async fn test_validation_errors_skip_providers() {
        let cases: [(&str, &str, Vec<u8>, StatusCode, ErrorKind); 4] = [
            ("notes.txt", "text/plain", sample_pdf(1), StatusCode::BAD_REQUEST, ErrorKind::InvalidFileType),
            ("paper.doc", "application/pdf", sample_pdf(1), StatusCode::BAD_REQUEST, ErrorKind::InvalidFilename),
            ("paper.pdf", "application/pdf", b"not a pdf".to_vec(), StatusCode::BAD_REQUEST, ErrorKind::InvalidPdf),
            ("big.pdf", "application/pdf", vec![b'%'; 65 * 1024], StatusCode::PAYLOAD_TOO_LARGE, ErrorKind::FileTooLarge),
        ];

        for (filename, content_type, data, status, kind) in cases {
            let h = harness(test_config(), StubOcr::ok("x"), insights_reply("x")).await;
            let body = multipart_body("pdf_file", filename, content_type, &data);
            let response = h
                .app
                .clone()
                .oneshot(upload_request("/api/process-pdf/", body))
                .await
                .unwrap();

            assert_eq!(response.status(), status, "{filename}");
            let error = error_body(response).await;
            assert_eq!(error.code, kind, "{filename}");
            assert_eq!(error.error_type, "ValidationError");
            assert_eq!(h.ocr.calls.load(Ordering::SeqCst), 0, "{filename}");
        }
    }

    #[tokio::test]
    async fn test_missing_field_and_non_multipart() {
        let h = harness(test_config(), StubOcr::ok("x"), insights_reply("x")).await;
        let body = multipart_body("file", "paper.pdf", "application/pdf", &sample_pdf(1));
        let response = h
            .app
            .clone()
            .oneshot(upload_request("/api/process-pdf/", body))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(error_body(response).await.code, ErrorKind::MissingFile);

        let request = Request::post("/api/process-pdf/")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from("{}"))
            .unwrap();
        let response = h.app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(error_body(response).await.code, ErrorKind::MalformedUpload);
    }

    #[tokio::test]
    async fn test_provider_errors_are_typed() {
        let h = harness(test_config(), StubOcr::failing(422), insights_reply("x")).await;
        let body = multipart_body("pdf_file", "paper.pdf", "application/pdf", &sample_pdf(1));
        let response = h
            .app
            .oneshot(upload_request("/api/process-pdf/", body))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(error_body(response).await.code, ErrorKind::DocumentUnreadable);

        let reply = ResponseTemplate::new(400).set_body_json(json!({
            "error": {"code": "context_length_exceeded", "message": "too long"}
        }));
        let h = harness(test_config(), StubOcr::ok("text"), reply).await;
        let body = multipart_body("pdf_file", "paper.pdf", "application/pdf", &sample_pdf(1));
        let response = h
            .app
            .oneshot(upload_request("/api/process-pdf/", body))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
        let error = error_body(response).await;
        assert_eq!(error.code, ErrorKind::ContextLengthExceeded);
        assert_eq!(error.error_type, "AIInsightsError");
    }

    #[tokio::test]
    async fn test_slow_completion_is_gateway_timeout() {
        let mut config = test_config();
        config.completion_timeout = Duration::from_millis(100);
        let reply = insights_reply("late").set_delay(Duration::from_millis(500));
        let h = harness(config, StubOcr::ok("text"), reply).await;

        let body = multipart_body("pdf_file", "paper.pdf", "application/pdf", &sample_pdf(1));
        let response = h
            .app
            .oneshot(upload_request("/api/process-pdf/", body))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::GATEWAY_TIMEOUT);
        let error = error_body(response).await;
        assert_eq!(error.code, ErrorKind::ProviderTimeout);
        assert_eq!(error.error_type, "ProviderError");
        assert_eq!(h.ocr.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_basic_auth_gate() {
        let mut config = test_config();
        config.basic_auth = Some(BasicAuth {
            username: "reader".to_string(),
            password: Secret::new("s3cret"),
        });
        let h = harness(config, StubOcr::ok("# Paper"), insights_reply("ok")).await;

        let body = multipart_body("pdf_file", "paper.pdf", "application/pdf", &sample_pdf(1));
        let response = h
            .app
            .clone()
            .oneshot(upload_request("/api/process-pdf/", body.clone()))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(
            response.headers()[header::WWW_AUTHENTICATE],
            "Basic realm=\"Secure Area\""
        );
        assert_eq!(h.ocr.calls.load(Ordering::SeqCst), 0);

        let health = h
            .app
            .clone()
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(health.status(), StatusCode::OK);

        let mut request = upload_request("/api/process-pdf/", body);
        request.headers_mut().insert(
            header::AUTHORIZATION,
            HeaderValue::from_str(&format!("Basic {}", BASE64.encode("reader:s3cret"))).unwrap(),
        );
        let response = h.app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_cors_allows_frontend_origin() {
        let h = harness(test_config(), StubOcr::ok("x"), insights_reply("x")).await;
        let request = Request::builder()
            .method("OPTIONS")
            .uri("/api/process-pdf/")
            .header(header::ORIGIN, "http://localhost:9002")
            .header(header::ACCESS_CONTROL_REQUEST_METHOD, "POST")
            .body(Body::empty())
            .unwrap();
        let response = h.app.oneshot(request).await.unwrap();
        assert_eq!(
            response.headers()[header::ACCESS_CONTROL_ALLOW_ORIGIN],
            "http://localhost:9002"
        );
        assert_eq!(
            response.headers()[header::ACCESS_CONTROL_ALLOW_CREDENTIALS],
            "true"
        );
    }

    #[tokio::test]
    async fn test_static_client_fallback() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("data/preload")).unwrap();
        std::fs::write(dir.path().join("data/preload/papers.json"), "[]").unwrap();

        let mut config = test_config();
        config.static_dir = Some(dir.path().to_path_buf());
        let h = harness(config, StubOcr::ok("x"), insights_reply("x")).await;

        let response = h
            .app
            .oneshot(
                Request::get("/data/preload/papers.json")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        assert_eq!(&bytes[..], b"[]");
    }

    #[test]
    fn test_wants_markdown() {
        let mut headers = HeaderMap::new();
        assert!(!wants_markdown(&headers));
        headers.insert(header::ACCEPT, HeaderValue::from_static("application/json"));
        assert!(!wants_markdown(&headers));
        headers.insert(header::ACCEPT, HeaderValue::from_static("text/markdown;q=0.9"));
        assert!(wants_markdown(&headers));
    }
}
