use crate::config::ApiConfig;
use crate::identity::RequestId;
use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use common::api::{
    ErrorBody, JobStatusResponse, LoginBody, LoginResponse, SubmitEnrollmentBody,
    SubmitEnrollmentResponse,
};
use common::{CourseOffer, EnrolledCourse, EnrollmentRequest, JobHandle, JobId, JobStatusSnapshot};
use reqwest::Url;
use std::sync::RwLock;
use std::time::Duration;

pub const IDEMPOTENCY_HEADER: &str = "Idempotency-Key";

/// Backend surface the enrollment client depends on.
#[async_trait]
pub trait EnrollmentApi: Send + Sync {
    async fn login(&self, registro: &str, password: &str) -> Result<LoginResponse>;

    async fn fetch_offers(&self, master_id: &str) -> Result<Vec<CourseOffer>>;

    async fn enrolled_courses(&self, student_id: &str) -> Result<Vec<EnrolledCourse>>;

    /// Creates the enrollment job. Must be called at most once per attempt.
    async fn submit_enrollment(&self, request: &EnrollmentRequest, request_id: &RequestId) -> Result<JobHandle>;

    async fn job_status(&self, job_id: &JobId) -> Result<JobStatusSnapshot>;
}

pub struct HttpApi {
    client: reqwest::Client,
    base_url: Url,
    token: RwLock<Option<String>>,
}

impl HttpApi {
    pub fn new(config: &ApiConfig) -> Result<Self> {
        let mut raw = config.base_url.clone();
        if !raw.ends_with('/') {
            raw.push('/');
        }
        let base_url = Url::parse(&raw).with_context(|| format!("Invalid backend URL: {}", raw))?;
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()?;
        Ok(Self {
            client,
            base_url,
            token: RwLock::new(None),
        })
    }

    pub fn set_token(&self, token: Option<String>) {
        *self.token.write().unwrap() = token;
    }

    fn url(&self, path: &str) -> Result<Url> {
        self.base_url
            .join(path)
            .with_context(|| format!("Invalid endpoint path: {}", path))
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match self.token.read().unwrap().as_deref() {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    async fn get_json<T: serde::de::DeserializeOwned>(&self, path: &str) -> Result<T> {
        let url = self.url(path)?;
        log::debug!("GET {}", url);
        let response = self.authorize(self.client.get(url)).send().await?;
        Ok(check(response).await?.json().await?)
    }
}

/// Turns a non-2xx response into an error carrying the server's message.
async fn check(response: reqwest::Response) -> Result<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    let message = serde_json::from_str::<ErrorBody>(&body)
        .ok()
        .and_then(|b| b.message_text())
        .or_else(|| status.canonical_reason().map(str::to_string))
        .unwrap_or_else(|| "request failed".to_string());
    Err(anyhow!("{} (HTTP {})", message, status.as_u16()))
}

#[async_trait]
impl EnrollmentApi for HttpApi {
    async fn login(&self, registro: &str, password: &str) -> Result<LoginResponse> {
        let body = LoginBody {
            registro: registro.to_string(),
            password: password.to_string(),
        };
        let response = self.client.post(self.url("auth/login")?).json(&body).send().await?;
        Ok(check(response).await?.json().await?)
    }

    async fn fetch_offers(&self, master_id: &str) -> Result<Vec<CourseOffer>> {
        self.get_json(&format!("oferta-grupo-materias/{}", master_id)).await
    }

    async fn enrolled_courses(&self, student_id: &str) -> Result<Vec<EnrolledCourse>> {
        self.get_json(&format!("boletas-inscripcion/estudiante/{}/", student_id)).await
    }

    async fn submit_enrollment(&self, request: &EnrollmentRequest, request_id: &RequestId) -> Result<JobHandle> {
        let url = self.url("inscripcion/async/")?;
        log::debug!("POST {} ({} sections, request {})", url, request.section_ids().len(), request_id);
        let response = self
            .authorize(self.client.post(url))
            .header(IDEMPOTENCY_HEADER, request_id.as_str())
            .json(&SubmitEnrollmentBody::from(request))
            .send()
            .await?;
        let parsed: SubmitEnrollmentResponse = check(response).await?.json().await?;
        Ok(parsed.into_handle())
    }

    async fn job_status(&self, job_id: &JobId) -> Result<JobStatusSnapshot> {
        let parsed: JobStatusResponse = self.get_json(&format!("colas/jobs/{}/status", job_id)).await?;
        Ok(parsed.into_snapshot())
    }
}
