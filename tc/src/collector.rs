//! Collector client
//!
//! Delivers a drained report buffer to the collector as a single binary POST
//! over HTTP/2 and decodes the acknowledgement. Failures are returned as-is;
//! retrying is left to the caller.

use std::collections::BTreeMap;
use std::sync::{PoisonError, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use reqwest::{Client, Url, Version};
use tracing::{debug, warn};

use crate::buffer::PendingReport;
use crate::error::CollectorError;
use crate::wire::{Auth, ReportRequest, ReportResponse, Reporter};

/// Path the collector accepts reports on
pub const COLLECTOR_PATH: &str = "/api/v2/reports";

/// Content type of the binary report body
pub const COLLECTOR_CONTENT_TYPE: &str = "application/octet-stream";

/// Default bound on one report round trip
pub const DEFAULT_REPORT_TIMEOUT: Duration = Duration::from_secs(30);

/// Destination for drained report buffers
#[async_trait]
pub trait Collector: Send + Sync {
    /// Deliver one report and return the collector's acknowledgement
    async fn report(&self, report: PendingReport) -> Result<ReportResponse, CollectorError>;

    /// Whether the caller should tear down and rebuild the connection
    fn should_reconnect(&self) -> bool;

    /// Release idle connections
    fn close(&self);
}

impl ReportRequest {
    /// Assemble the request payload for one drained buffer
    pub fn from_pending(
        reporter_id: u64,
        attributes: &BTreeMap<String, String>,
        access_token: &str,
        report: PendingReport,
    ) -> Self {
        Self {
            reporter: Reporter {
                reporter_id,
                tags: attributes.clone(),
            },
            auth: Auth {
                access_token: access_token.to_string(),
            },
            spans: report.spans,
            internal_metrics: report.internal_metrics,
        }
    }
}

/// Connection settings for [`CollectorClient`]
#[derive(Debug, Clone)]
pub struct CollectorOptions {
    /// Scheme, host and port of the collector, e.g. `http://localhost:8001`
    pub base_url: String,
    pub access_token: String,
    /// Bound on one report round trip; `None` waits indefinitely
    pub report_timeout: Option<Duration>,
    /// Speak HTTP/2 over cleartext without an upgrade round trip
    pub plaintext: bool,
}

impl Default for CollectorOptions {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8001".to_string(),
            access_token: String::new(),
            report_timeout: Some(DEFAULT_REPORT_TIMEOUT),
            plaintext: true,
        }
    }
}

/// HTTP/2 collector client
///
/// The transport is built once by [`CollectorClient::connect`] and reused for
/// every report. HTTP/2 multiplexes requests over a pooled connection, so the
/// client never asks to be reconnected.
///
/// With `plaintext` set the client speaks h2c with prior knowledge. Otherwise
/// HTTP/2 is negotiated through TLS ALPN; a collector that settles on any
/// other protocol version is rejected with [`CollectorError::NotHttp2`].
pub struct CollectorClient {
    reporter_id: u64,
    access_token: String,
    attributes: BTreeMap<String, String>,
    report_timeout: Option<Duration>,
    plaintext: bool,
    url: Url,
    http: RwLock<Option<Client>>,
}

impl CollectorClient {
    pub fn new(
        options: &CollectorOptions,
        reporter_id: u64,
        attributes: BTreeMap<String, String>,
    ) -> Result<Self, CollectorError> {
        debug!(base_url = %options.base_url, reporter_id, "CollectorClient::new: called");
        let mut url = Url::parse(&options.base_url).map_err(|e| CollectorError::InvalidUrl {
            url: options.base_url.clone(),
            reason: e.to_string(),
        })?;
        if url.cannot_be_a_base() {
            return Err(CollectorError::InvalidUrl {
                url: options.base_url.clone(),
                reason: "URL cannot carry a path".to_string(),
            });
        }
        url.set_path(COLLECTOR_PATH);

        Ok(Self {
            reporter_id,
            access_token: options.access_token.clone(),
            attributes,
            report_timeout: options.report_timeout,
            plaintext: options.plaintext,
            url,
            http: RwLock::new(None),
        })
    }

    /// Build the HTTP/2 transport
    pub fn connect(&self) -> Result<(), CollectorError> {
        debug!(url = %self.url, timeout = ?self.report_timeout, "CollectorClient::connect: called");
        let mut builder = Client::builder();
        if let Some(timeout) = self.report_timeout {
            builder = builder.timeout(timeout);
        }
        if self.plaintext {
            builder = builder.http2_prior_knowledge();
        }
        let client = builder.build()?;
        *self.http.write().unwrap_or_else(PoisonError::into_inner) = Some(client);
        Ok(())
    }

    pub fn is_connected(&self) -> bool {
        self.http.read().unwrap_or_else(PoisonError::into_inner).is_some()
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    fn to_request(&self, report: PendingReport) -> ReportRequest {
        ReportRequest::from_pending(self.reporter_id, &self.attributes, &self.access_token, report)
    }
}

#[async_trait]
impl Collector for CollectorClient {
    async fn report(&self, report: PendingReport) -> Result<ReportResponse, CollectorError> {
        let http = self
            .http
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
            .ok_or(CollectorError::NotConnected)?;

        let span_count = report.spans.len();
        let body = self.to_request(report).encode()?;
        debug!(span_count, bytes = body.len(), "CollectorClient::report: sending");

        let response = http
            .post(self.url.clone())
            .header(CONTENT_TYPE, COLLECTOR_CONTENT_TYPE)
            .body(body)
            .send()
            .await?;

        if response.version() != Version::HTTP_2 {
            warn!(version = ?response.version(), "CollectorClient::report: collector did not speak HTTP/2");
            return Err(CollectorError::NotHttp2 {
                version: format!("{:?}", response.version()),
            });
        }

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!(%status, "CollectorClient::report: collector rejected report");
            return Err(CollectorError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let bytes = response.bytes().await?;
        ReportResponse::decode(&bytes)
    }

    fn should_reconnect(&self) -> bool {
        false
    }

    fn close(&self) {
        debug!("CollectorClient::close: dropping transport");
        // Idle pooled connections close when the last client handle drops
        self.http.write().unwrap_or_else(PoisonError::into_inner).take();
    }
}

#[cfg(any(test, feature = "test-util"))]
pub mod mock {
    use std::sync::Mutex;

    use super::*;

    /// In-process collector that keeps every request it receives
    ///
    /// Requests pass through the same binary encoding the HTTP client uses.
    pub struct MemoryCollector {
        reporter_id: u64,
        access_token: String,
        response: ReportResponse,
        fail_status: Option<u16>,
        received: Mutex<Vec<ReportRequest>>,
    }

    impl MemoryCollector {
        pub fn new(reporter_id: u64, access_token: impl Into<String>) -> Self {
            Self {
                reporter_id,
                access_token: access_token.into(),
                response: ReportResponse::default(),
                fail_status: None,
                received: Mutex::new(Vec::new()),
            }
        }

        /// Acknowledge every report with this response
        pub fn with_response(mut self, response: ReportResponse) -> Self {
            self.response = response;
            self
        }

        /// Reject every report with this HTTP status
        pub fn failing(mut self, status: u16) -> Self {
            self.fail_status = Some(status);
            self
        }

        pub fn requests(&self) -> Vec<ReportRequest> {
            self.received.lock().unwrap_or_else(PoisonError::into_inner).clone()
        }

        pub fn report_count(&self) -> usize {
            self.received.lock().unwrap_or_else(PoisonError::into_inner).len()
        }
    }

    #[async_trait]
    impl Collector for MemoryCollector {
        async fn report(&self, report: PendingReport) -> Result<ReportResponse, CollectorError> {
            if let Some(status) = self.fail_status {
                return Err(CollectorError::Status {
                    status,
                    body: "rejected".to_string(),
                });
            }

            let bytes =
                ReportRequest::from_pending(self.reporter_id, &BTreeMap::new(), &self.access_token, report).encode()?;
            let request = ReportRequest::decode(&bytes)?;
            self.received.lock().unwrap_or_else(PoisonError::into_inner).push(request);

            ReportResponse::decode(&self.response.encode()?)
        }

        fn should_reconnect(&self) -> bool {
            false
        }

        fn close(&self) {}
    }
}

#[cfg(test)]
mod tests {
    use super::mock::MemoryCollector;
    use super::*;
    use crate::wire::{Command, InternalMetrics, SpanContext, SpanRecord};
    use axum::Router;
    use axum::body::Bytes;
    use axum::http::{HeaderMap, StatusCode, Uri};
    use axum::routing::post;
    use std::sync::{Arc, Mutex};

    fn options(base_url: &str) -> CollectorOptions {
        CollectorOptions {
            base_url: base_url.to_string(),
            access_token: "token".to_string(),
            ..Default::default()
        }
    }

    /// What the test collector saw for one request
    #[derive(Debug, Clone)]
    struct Received {
        path: String,
        version: Version,
        content_type: Option<String>,
        body: Vec<u8>,
    }

    type Seen = Arc<Mutex<Vec<Received>>>;

    /// Collector endpoint answering every report with `status` and `body`
    /// after `delay`
    fn collector_router(seen: Seen, status: StatusCode, body: Vec<u8>, delay: Duration) -> Router {
        Router::new().route(
            COLLECTOR_PATH,
            post(move |uri: Uri, version: Version, headers: HeaderMap, bytes: Bytes| {
                let seen = seen.clone();
                let body = body.clone();
                async move {
                    seen.lock().unwrap().push(Received {
                        path: uri.path().to_string(),
                        version,
                        content_type: headers
                            .get(CONTENT_TYPE)
                            .and_then(|v| v.to_str().ok())
                            .map(str::to_string),
                        body: bytes.to_vec(),
                    });
                    tokio::time::sleep(delay).await;
                    (status, body)
                }
            }),
        )
    }

    /// Serve `router` on an ephemeral port; accepts HTTP/1.1 and h2c
    async fn serve(router: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        format!("http://{}", addr)
    }

    fn connected(base_url: &str, report_timeout: Option<Duration>, plaintext: bool) -> CollectorClient {
        let options = CollectorOptions {
            report_timeout,
            plaintext,
            ..options(base_url)
        };
        let client = CollectorClient::new(&options, 42, BTreeMap::new()).unwrap();
        client.connect().unwrap();
        client
    }

    fn one_span() -> PendingReport {
        PendingReport {
            spans: vec![SpanRecord {
                context: SpanContext { trace_id: 1, span_id: 2 },
                operation_name: "span/test".to_string(),
                start_timestamp_micros: 10,
                duration_micros: 5,
                logs: vec![],
            }],
            internal_metrics: InternalMetrics::default(),
        }
    }

    #[test]
    fn test_url_uses_collector_path() {
        let client = CollectorClient::new(&options("http://collector:9000"), 1, BTreeMap::new()).unwrap();
        assert_eq!(client.url().as_str(), "http://collector:9000/api/v2/reports");
    }

    #[test]
    fn test_invalid_url() {
        let result = CollectorClient::new(&options("not a url"), 1, BTreeMap::new());
        assert!(matches!(result, Err(CollectorError::InvalidUrl { .. })));
    }

    #[test]
    fn test_connect_and_close() {
        let client = CollectorClient::new(&options("http://localhost:8001"), 1, BTreeMap::new()).unwrap();
        assert!(!client.is_connected());
        assert!(!client.should_reconnect());

        client.connect().unwrap();
        assert!(client.is_connected());

        client.close();
        assert!(!client.is_connected());
    }

    #[tokio::test]
    async fn test_report_without_connect() {
        let client = CollectorClient::new(&options("http://localhost:8001"), 1, BTreeMap::new()).unwrap();
        let result = client.report(PendingReport::default()).await;
        assert!(matches!(result, Err(CollectorError::NotConnected)));
    }

    #[tokio::test]
    async fn test_report_posts_over_h2c_and_decodes_ack() {
        let ack = ReportResponse {
            commands: vec![Command {
                disable: true,
                dev_mode: false,
            }],
            infos: vec!["ok".to_string()],
            ..Default::default()
        };
        let seen = Seen::default();
        let router = collector_router(seen.clone(), StatusCode::OK, ack.encode().unwrap(), Duration::ZERO);
        let client = connected(&serve(router).await, Some(Duration::from_secs(5)), true);

        let response = client.report(one_span()).await.unwrap();
        assert_eq!(response, ack);
        assert!(response.disables_tracer());

        let seen = seen.lock().unwrap().clone();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].path, COLLECTOR_PATH);
        assert_eq!(seen[0].version, Version::HTTP_2);
        assert_eq!(seen[0].content_type.as_deref(), Some(COLLECTOR_CONTENT_TYPE));

        let request = ReportRequest::decode(&seen[0].body).unwrap();
        assert_eq!(request.reporter.reporter_id, 42);
        assert_eq!(request.auth.access_token, "token");
        assert_eq!(request.spans.len(), 1);
    }

    #[tokio::test]
    async fn test_report_error_status() {
        let seen = Seen::default();
        let router = collector_router(seen, StatusCode::SERVICE_UNAVAILABLE, b"busy".to_vec(), Duration::ZERO);
        let client = connected(&serve(router).await, Some(Duration::from_secs(5)), true);

        let result = client.report(one_span()).await;
        match result {
            Err(CollectorError::Status { status, body }) => {
                assert_eq!(status, 503);
                assert_eq!(body, "busy");
            }
            other => panic!("Expected status error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_report_undecodable_ack() {
        let seen = Seen::default();
        let router = collector_router(seen, StatusCode::OK, vec![0xff; 4], Duration::ZERO);
        let client = connected(&serve(router).await, Some(Duration::from_secs(5)), true);

        let result = client.report(one_span()).await;
        assert!(matches!(result, Err(CollectorError::Decode(_))));
    }

    #[tokio::test]
    async fn test_report_timeout_fires() {
        let seen = Seen::default();
        let ack = ReportResponse::default().encode().unwrap();
        let router = collector_router(seen, StatusCode::OK, ack, Duration::from_secs(5));
        let client = connected(&serve(router).await, Some(Duration::from_millis(200)), true);

        let err = client.report(one_span()).await.unwrap_err();
        assert!(err.is_timeout(), "unexpected error: {}", err);
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn test_report_without_timeout_waits() {
        let seen = Seen::default();
        let ack = ReportResponse::default().encode().unwrap();
        let router = collector_router(seen, StatusCode::OK, ack, Duration::from_millis(300));
        let client = connected(&serve(router).await, None, true);

        assert!(client.report(one_span()).await.is_ok());
    }

    #[tokio::test]
    async fn test_report_rejects_http1_collector() {
        // Without prior knowledge a cleartext connection stays on HTTP/1.1
        let seen = Seen::default();
        let ack = ReportResponse::default().encode().unwrap();
        let router = collector_router(seen.clone(), StatusCode::OK, ack, Duration::ZERO);
        let client = connected(&serve(router).await, Some(Duration::from_secs(5)), false);

        let result = client.report(one_span()).await;
        assert!(matches!(result, Err(CollectorError::NotHttp2 { .. })));
        assert_eq!(seen.lock().unwrap()[0].version, Version::HTTP_11);
    }

    #[test]
    fn test_request_from_pending() {
        let mut attributes = BTreeMap::new();
        attributes.insert("component".to_string(), "bench".to_string());
        let mut report = one_span();
        report.internal_metrics.dropped_spans = 4;

        let request = ReportRequest::from_pending(99, &attributes, "tok", report);
        assert_eq!(request.reporter.reporter_id, 99);
        assert_eq!(request.reporter.tags, attributes);
        assert_eq!(request.auth.access_token, "tok");
        assert_eq!(request.spans.len(), 1);
        assert_eq!(request.internal_metrics.dropped_spans, 4);
    }

    #[tokio::test]
    async fn test_memory_collector_records_requests() {
        let collector = MemoryCollector::new(5, "tok").with_response(ReportResponse {
            infos: vec!["ok".to_string()],
            ..Default::default()
        });

        let response = collector.report(PendingReport::default()).await.unwrap();
        assert_eq!(response.infos, vec!["ok".to_string()]);

        let requests = collector.requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].reporter.reporter_id, 5);
        assert_eq!(requests[0].auth.access_token, "tok");
    }

    #[tokio::test]
    async fn test_memory_collector_failing() {
        let collector = MemoryCollector::new(5, "tok").failing(503);
        let result = collector.report(PendingReport::default()).await;
        assert!(matches!(result, Err(CollectorError::Status { status: 503, .. })));
        assert_eq!(collector.report_count(), 0);
    }
}
