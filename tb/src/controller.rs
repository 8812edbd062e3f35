//! Controller transport
//!
//! The controller speaks plain HTTP GET: one path hands out specifications,
//! another receives results as query parameters.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Url};
use tracing::debug;

use crate::error::ControllerError;

/// Default bound on one controller request
pub const DEFAULT_CONTROLLER_TIMEOUT: Duration = Duration::from_secs(300);

/// Request/response channel to the experiment controller
#[async_trait]
pub trait ControllerTransport: Send + Sync {
    /// GET `path_and_query` and return the body of a 200 response
    async fn get(&self, path_and_query: &str) -> Result<Vec<u8>, ControllerError>;
}

/// HTTP controller transport
#[derive(Debug, Clone)]
pub struct HttpController {
    base_url: String,
    http: Client,
}

impl HttpController {
    /// Create a transport rooted at `base_url`
    ///
    /// `timeout` of `None` leaves requests unbounded.
    pub fn new(base_url: &str, timeout: Option<Duration>) -> Result<Self, ControllerError> {
        debug!(%base_url, ?timeout, "HttpController::new: called");
        Url::parse(base_url).map_err(|e| ControllerError::InvalidUrl {
            url: base_url.to_string(),
            reason: e.to_string(),
        })?;

        let mut builder = Client::builder();
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            http: builder.build()?,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url_for(&self, path_and_query: &str) -> String {
        format!("{}{}", self.base_url, path_and_query)
    }
}

#[async_trait]
impl ControllerTransport for HttpController {
    async fn get(&self, path_and_query: &str) -> Result<Vec<u8>, ControllerError> {
        let url = self.url_for(path_and_query);
        debug!(%url, "HttpController::get: called");

        let response = self.http.get(&url).send().await?;
        let status = response.status();
        if status != reqwest::StatusCode::OK {
            return Err(ControllerError::Status {
                status: status.as_u16(),
                path: path_and_query.to_string(),
            });
        }

        Ok(response.bytes().await?.to_vec())
    }
}
