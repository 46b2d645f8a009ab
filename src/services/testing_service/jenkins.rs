//! Jenkins testing service.
//!
//! Talks to the Jenkins JSON API:
//! - `GET  /api/json`                      server info (connection check)
//! - `GET  /job/{name}/api/json`           job metadata
//! - `GET  /job/{name}/{number}/api/json`  build metadata
//! - `GET  /job/{name}/{number}/consoleText`
//! - `POST /job/{name}/build`              trigger a build

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use reqwest::StatusCode;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde_json::Value as JsonValue;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::{BuildRef, ProjectMetadata, TestingService, TestingServiceConfig};
use crate::config::Timeouts;
use crate::error::{AppError, AppResult};
use crate::models::{BuildLogLink, BuildResult, BuildStatus, TestBuild, TestInstance};
use crate::services::build_cache::BuildCache;

/// Service-type tag of Jenkins services.
pub const SERVICE_TYPE: &str = "jenkins";

/// Build metadata as returned by `/job/{name}/{number}/api/json`.
#[derive(Debug, Deserialize)]
pub struct JenkinsBuild {
    pub number: i64,
    #[serde(default)]
    pub building: bool,
    #[serde(default)]
    pub result: Option<String>,
    /// Start time, milliseconds since epoch
    pub timestamp: i64,
    /// Milliseconds
    #[serde(default)]
    pub duration: i64,
    pub url: String,
    #[serde(default)]
    pub actions: Vec<JsonValue>,
}

impl JenkinsBuild {
    pub fn status(&self) -> BuildStatus {
        if self.building {
            return BuildStatus::Running;
        }
        match self.result.as_deref() {
            Some("SUCCESS") => BuildStatus::Passed,
            Some("ABORTED") => BuildStatus::Aborted,
            Some("FAILURE") => BuildStatus::Failed,
            _ => BuildStatus::Error,
        }
    }

    pub fn result(&self) -> BuildResult {
        if self.result.as_deref() == Some("SUCCESS") {
            BuildResult::Success
        } else {
            BuildResult::Failed
        }
    }

    /// Revision built, only when exactly one action reports it.
    pub fn revision(&self) -> Option<String> {
        let revisions: Vec<&JsonValue> = self
            .actions
            .iter()
            .filter_map(|a| a.get("lastBuiltRevision"))
            .collect();
        match revisions.as_slice() {
            [rev] => rev
                .get("SHA1")
                .and_then(JsonValue::as_str)
                .map(str::to_string),
            _ => None,
        }
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        Utc.timestamp_millis_opt(self.timestamp)
            .single()
            .unwrap_or_default()
    }
}

/// Server info as returned by `/api/json`.
#[derive(Debug, Deserialize)]
struct ServerInfo {
    #[serde(rename = "_class")]
    class: Option<String>,
}

/// History page as returned by `?tree=allBuilds[number,url]`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AllBuilds {
    #[serde(default)]
    all_builds: Vec<BuildRef>,
}

/// Jenkins-backed testing service.
pub struct JenkinsService {
    id: Uuid,
    url: String,
    username: Option<String>,
    token: Option<SecretString>,
    http_client: reqwest::Client,
    cache: Arc<BuildCache>,
}

impl JenkinsService {
    pub fn new(config: &TestingServiceConfig, cache: Arc<BuildCache>, timeouts: &Timeouts) -> AppResult<Self> {
        let http_client = reqwest::Client::builder()
            .connect_timeout(timeouts.ci_connect)
            .timeout(timeouts.ci_request)
            .build()
            .map_err(|e| AppError::TestingService(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            id: config.id,
            url: config.url.trim_end_matches('/').to_string(),
            username: config.username.clone(),
            token: config.token.clone(),
            http_client,
            cache,
        })
    }

    fn job_url(&self, job_name: &str) -> String {
        format!("{}/job/{}", self.url, urlencoding::encode(job_name))
    }

    fn request(&self, method: reqwest::Method, url: &str) -> reqwest::RequestBuilder {
        let builder = self.http_client.request(method, url);
        match (&self.username, &self.token) {
            (Some(user), token) => {
                builder.basic_auth(user, token.as_ref().map(|t| t.expose_secret().to_string()))
            }
            (None, Some(token)) => builder.bearer_auth(token.expose_secret()),
            (None, None) => builder,
        }
    }

    /// GET `url`; 404 becomes `NotFound(what)`, other failures `TestingService`.
    async fn get(&self, url: &str, what: &str) -> AppResult<reqwest::Response> {
        debug!("GET {}", url);
        let response = self
            .request(reqwest::Method::GET, url)
            .send()
            .await
            .map_err(|e| AppError::TestingService(format!("{}: {}", self, e)))?;

        match response.status() {
            s if s.is_success() => Ok(response),
            StatusCode::NOT_FOUND => Err(AppError::NotFound(what.to_string())),
            s => Err(AppError::TestingService(format!(
                "{}: GET {} returned {}",
                self, url, s
            ))),
        }
    }

    async fn get_json<T: serde::de::DeserializeOwned>(&self, url: &str, what: &str) -> AppResult<T> {
        self.get(url, what)
            .await?
            .json::<T>()
            .await
            .map_err(|e| AppError::TestingService(format!("{}: malformed response from {}: {}", self, url, e)))
    }

    fn to_test_build(&self, instance: &TestInstance, raw: JenkinsBuild) -> TestBuild {
        let status = raw.status();
        let mut build = TestBuild {
            id: raw.number.to_string(),
            build_number: raw.number,
            test_instance_id: instance.id,
            status,
            result: raw.result(),
            timestamp: raw.started_at(),
            duration_ms: raw.duration,
            revision: raw.revision(),
            url: raw.url,
            external_link: String::new(),
        };
        build.external_link = self.get_test_build_external_link(&build);
        build
    }
}

/// Resolve `path` relative to a build URL.
fn join_build_url(build_url: &str, path: &str) -> String {
    if build_url.ends_with('/') {
        format!("{}{}", build_url, path)
    } else {
        format!("{}/{}", build_url, path)
    }
}

impl std::fmt::Display for JenkinsService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Jenkins service {} ({})", self.id, self.url)
    }
}

#[async_trait]
impl TestingService for JenkinsService {
    fn id(&self) -> Uuid {
        self.id
    }

    fn service_type(&self) -> &'static str {
        SERVICE_TYPE
    }

    fn url(&self) -> &str {
        &self.url
    }

    async fn check_connection(&self) -> AppResult<()> {
        let url = format!("{}/api/json", self.url);
        let info: ServerInfo = self
            .get_json(&url, "Jenkins server")
            .await
            .map_err(|e| AppError::TestingService(e.detail().to_string()))?;
        if info.class.is_none() {
            return Err(AppError::TestingService(format!(
                "{}: unexpected server info response",
                self
            )));
        }
        Ok(())
    }

    async fn get_project_metadata(
        &self,
        instance: &TestInstance,
        fetch_all_builds: bool,
    ) -> AppResult<ProjectMetadata> {
        if let Some(metadata) = self.cache.get_metadata(instance.id, fetch_all_builds).await {
            return Ok(metadata);
        }

        let job_name = self.get_job_name(&instance.resource)?;
        let job_url = self.job_url(&job_name);
        let what = format!("Jenkins job '{}'", job_name);
        let mut metadata: ProjectMetadata = self
            .get_json(&format!("{}/api/json", job_url), &what)
            .await
            .map_err(|e| match e {
                AppError::NotFound(_) => AppError::TestingService(format!("{}: {} not found", self, what)),
                other => other,
            })?;

        if fetch_all_builds {
            let history: AllBuilds = self
                .get_json(
                    &format!("{}/api/json?tree=allBuilds[number,url]", job_url),
                    &what,
                )
                .await?;
            metadata.builds = history.all_builds;
        }

        self.cache
            .put_metadata(instance.id, fetch_all_builds, metadata.clone())
            .await;
        Ok(metadata)
    }

    async fn get_test_build(&self, instance: &TestInstance, build_number: i64) -> AppResult<TestBuild> {
        if let Some(build) = self.cache.get_build(instance.id, build_number).await {
            return Ok(build);
        }

        let job_name = self.get_job_name(&instance.resource)?;
        let url = format!("{}/{}/api/json", self.job_url(&job_name), build_number);
        let raw: JenkinsBuild = self
            .get_json(&url, &format!("TestBuild {} of {}", build_number, instance))
            .await?;

        let build = self.to_test_build(instance, raw);
        self.cache.put_build(&build).await;
        Ok(build)
    }

    async fn get_build_console(&self, instance: &TestInstance, build_number: i64) -> AppResult<Vec<u8>> {
        let job_name = self.get_job_name(&instance.resource)?;
        let url = format!("{}/{}/consoleText", self.job_url(&job_name), build_number);
        let body = self
            .get(&url, &format!("Console output of build {} of {}", build_number, instance))
            .await?
            .bytes()
            .await?;
        Ok(body.to_vec())
    }

    async fn start_test_build(&self, instance: &TestInstance) -> AppResult<bool> {
        let job_name = self.get_job_name(&instance.resource)?;
        let url = format!("{}/build", self.job_url(&job_name));
        let response = self
            .request(reqwest::Method::POST, &url)
            .send()
            .await
            .map_err(|e| AppError::TestingService(format!("{}: {}", self, e)))?;

        let status = response.status();
        if status.is_success() {
            info!(instance = %instance.id, job = %job_name, "Build triggered");
            self.cache.invalidate_instance(instance.id).await;
            Ok(true)
        } else {
            warn!(instance = %instance.id, job = %job_name, status = %status, "Build trigger rejected");
            Ok(false)
        }
    }

    fn get_test_build_external_link(&self, build: &TestBuild) -> String {
        join_build_url(&build.url, "console")
    }

    fn get_test_build_logs_external_link(&self, build: &TestBuild) -> Vec<BuildLogLink> {
        vec![BuildLogLink {
            job: "default".to_string(),
            url: join_build_url(&build.url, "consoleText"),
        }]
    }
}
