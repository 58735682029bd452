use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Method, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::{debug, error, info};
use url::Url;

use super::CalibrationBackend;
use crate::error::{CalibrationError, Result};
use crate::session::{
    CalibrationSession, NewSession, NewStepResult, SessionPage, SessionPatch, SessionQuery,
    StepResult, StepResultPatch,
};

const API_PREFIX: &str = "api/v1/calibration/";
const TOTAL_COUNT_HEADER: &str = "x-total-count";
const DEFAULT_TIMEOUT_SECS: u64 = 10;

/// Error body returned by Spoolman for 4xx responses.
#[derive(Debug, Deserialize)]
struct ErrorMessage {
    message: String,
}

/// Client for the calibration endpoints of a Spoolman server.
#[derive(Clone)]
pub struct SpoolmanClient {
    client: reqwest::Client,
    api_base: Url,
}

impl SpoolmanClient {
    /// Client for the server at `base_url` (e.g. `http://localhost:7912`).
    pub fn new(base_url: &str) -> Result<Self> {
        Self::with_timeout(base_url, Duration::from_secs(DEFAULT_TIMEOUT_SECS))
    }

    pub fn with_timeout(base_url: &str, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("filament-calibration/", env!("CARGO_PKG_VERSION")))
            .timeout(timeout)
            .build()
            .map_err(|e| CalibrationError::Http(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self {
            client,
            api_base: api_base(base_url)?,
        })
    }

    pub fn api_base(&self) -> &Url {
        &self.api_base
    }

    fn endpoint(&self, path: &str) -> Result<Url> {
        self.api_base
            .join(path)
            .map_err(|e| CalibrationError::Config(format!("Invalid endpoint '{}': {}", path, e)))
    }

    fn request(&self, method: Method, path: &str) -> Result<RequestBuilder> {
        let url = self.endpoint(path)?;
        debug!("{} {}", method, url);
        Ok(self.client.request(method, url))
    }

    async fn send<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T> {
        let response = check_status(request.send().await?).await?;
        Ok(response.json::<T>().await?)
    }

    async fn send_empty(&self, request: RequestBuilder) -> Result<()> {
        check_status(request.send().await?).await?;
        Ok(())
    }
}

/// Normalizes the server URL to the calibration API root, always ending in `/`
/// so relative joins append instead of replacing the last segment.
fn api_base(base_url: &str) -> Result<Url> {
    let trimmed = base_url.trim();
    let mut base = Url::parse(trimmed).map_err(|e| {
        CalibrationError::Config(format!("Invalid Spoolman URL '{}': {}", trimmed, e))
    })?;
    if base.cannot_be_a_base() {
        return Err(CalibrationError::Config(format!(
            "Spoolman URL '{}' cannot be used as a base",
            trimmed
        )));
    }
    if !base.path().ends_with('/') {
        let path = format!("{}/", base.path());
        base.set_path(&path);
    }
    base.join(API_PREFIX)
        .map_err(|e| CalibrationError::Config(format!("Invalid Spoolman URL '{}': {}", trimmed, e)))
}

/// Maps non-success statuses to errors: 404 becomes `NotFound`, 4xx other
/// than 404 becomes `Validation`, everything else `Http`.
async fn check_status(response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response
        .text()
        .await
        .unwrap_or_else(|_| "<failed to read body>".to_string());
    let message = error_message(&body);
    match status {
        StatusCode::NOT_FOUND => Err(CalibrationError::NotFound(message)),
        s if s.is_client_error() => Err(CalibrationError::Validation(message)),
        s => {
            error!("Spoolman returned {}: {}", s, message);
            Err(CalibrationError::Http(format!("{} - {}", s, message)))
        }
    }
}

fn error_message(body: &str) -> String {
    match serde_json::from_str::<ErrorMessage>(body) {
        Ok(parsed) => parsed.message,
        Err(_) if body.chars().count() > 512 => {
            format!("{}...", body.chars().take(512).collect::<String>())
        }
        Err(_) => body.to_string(),
    }
}

/// Total from the `x-total-count` header, if present and numeric.
fn total_count(response: &Response) -> Option<u64> {
    response
        .headers()
        .get(TOTAL_COUNT_HEADER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse().ok())
}

fn list_params(query: &SessionQuery) -> Vec<(&'static str, String)> {
    let mut params = Vec::new();
    if let Some(filament_id) = query.filament_id {
        params.push(("filament_id", filament_id.to_string()));
    }
    if let Some(limit) = query.limit {
        params.push(("limit", limit.to_string()));
    }
    if query.offset > 0 {
        params.push(("offset", query.offset.to_string()));
    }
    params
}

#[async_trait]
impl CalibrationBackend for SpoolmanClient {
    async fn list_sessions(&self, query: &SessionQuery) -> Result<SessionPage> {
        let request = self
            .request(Method::GET, "session")?
            .query(&list_params(query));
        let response = check_status(request.send().await?).await?;
        let header_total = total_count(&response);
        let items: Vec<CalibrationSession> = response.json().await?;
        let total_count = header_total.unwrap_or(items.len() as u64 + u64::from(query.offset));
        debug!("Fetched {} of {} sessions", items.len(), total_count);
        Ok(SessionPage { items, total_count })
    }

    async fn get_session(&self, session_id: i64) -> Result<CalibrationSession> {
        self.send(self.request(Method::GET, &format!("session/{}", session_id))?)
            .await
    }

    async fn create_session(&self, params: &NewSession) -> Result<CalibrationSession> {
        params.validate()?;
        let session: CalibrationSession = self
            .send(self.request(Method::POST, "session")?.json(params))
            .await?;
        info!(
            "Created calibration session {} for filament {}",
            session.id, session.filament_id
        );
        Ok(session)
    }

    async fn update_session(
        &self,
        session_id: i64,
        patch: &SessionPatch,
    ) -> Result<CalibrationSession> {
        patch.validate()?;
        let session = self
            .send(
                self.request(Method::PATCH, &format!("session/{}", session_id))?
                    .json(patch),
            )
            .await?;
        info!("Updated calibration session {}", session_id);
        Ok(session)
    }

    async fn delete_session(&self, session_id: i64) -> Result<()> {
        self.send_empty(self.request(Method::DELETE, &format!("session/{}", session_id))?)
            .await?;
        info!("Deleted calibration session {}", session_id);
        Ok(())
    }

    async fn create_step(&self, session_id: i64, params: &NewStepResult) -> Result<StepResult> {
        params.validate()?;
        let step: StepResult = self
            .send(
                self.request(Method::POST, &format!("session/{}/step", session_id))?
                    .json(params),
            )
            .await?;
        info!(
            "Recorded {} step {} in session {}",
            step.step_type, step.id, session_id
        );
        Ok(step)
    }

    async fn get_step(&self, step_id: i64) -> Result<StepResult> {
        self.send(self.request(Method::GET, &format!("step/{}", step_id))?)
            .await
    }

    async fn update_step(&self, step_id: i64, patch: &StepResultPatch) -> Result<StepResult> {
        patch.validate()?;
        let step = self
            .send(self.request(Method::PATCH, &format!("step/{}", step_id))?.json(patch))
            .await?;
        info!("Updated calibration step {}", step_id);
        Ok(step)
    }

    async fn delete_step(&self, step_id: i64) -> Result<()> {
        self.send_empty(self.request(Method::DELETE, &format!("step/{}", step_id))?)
            .await?;
        info!("Deleted calibration step {}", step_id);
        Ok(())
    }
}
