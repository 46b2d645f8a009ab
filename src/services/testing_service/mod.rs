//! Testing service adapters.
//!
//! A testing service normalizes one CI backend into the uniform [`TestBuild`]
//! view. Backends are selected through the [`ServiceRegistry`] by the stored
//! service-type tag; the scheduler and the aggregator only see the
//! [`TestingService`] trait.

pub mod jenkins;

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::{debug, info};
use uuid::Uuid;

use crate::config::Timeouts;
use crate::error::{AppError, AppResult};
use crate::models::{BuildLogLink, TestBuild, TestInstance};
use crate::services::build_cache::BuildCache;

pub use jenkins::JenkinsService;

/// Builds listed by a backend without requesting the full history.
pub const DEFAULT_PAGE_SIZE: usize = 100;

/// Number of builds fetched by default.
pub const DEFAULT_BUILDS_LIMIT: usize = 10;

/// Reference to a build in job-level metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildRef {
    pub number: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

/// Job-level metadata of a test instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectMetadata {
    pub url: String,
    /// Build references, most recent first
    #[serde(default)]
    pub builds: Vec<BuildRef>,
    #[serde(default)]
    pub last_build: Option<BuildRef>,
    #[serde(default)]
    pub last_successful_build: Option<BuildRef>,
    #[serde(default)]
    pub last_failed_build: Option<BuildRef>,
}

/// Stored configuration of a testing service.
#[derive(Debug, Clone)]
pub struct TestingServiceConfig {
    pub id: Uuid,
    /// Service-type tag, e.g. `jenkins`
    pub service_type: String,
    pub url: String,
    pub username: Option<String>,
    pub token: Option<SecretString>,
}

/// Derive the backend job name from a resource path.
///
/// The job name is the trailing path segment.
pub fn job_name_from_resource(resource: &str) -> AppResult<String> {
    let trimmed = resource.trim_matches('/');
    let name = trimmed.rsplit('/').next().unwrap_or_default();
    if name.is_empty() {
        return Err(AppError::TestingService(format!(
            "Unable to get the job name from the resource '{}'",
            resource
        )));
    }
    debug!("Job name of resource '{}': {}", resource, name);
    Ok(name.to_string())
}

/// A CI backend answering build queries for test instances.
#[async_trait]
pub trait TestingService: Send + Sync {
    /// Id of the stored service configuration.
    fn id(&self) -> Uuid;

    /// Service-type tag.
    fn service_type(&self) -> &'static str;

    /// Base URL of the backend.
    fn url(&self) -> &str;

    /// Verify reachability and credentials.
    async fn check_connection(&self) -> AppResult<()>;

    fn get_job_name(&self, resource: &str) -> AppResult<String> {
        job_name_from_resource(resource)
    }

    /// Job-level metadata; `fetch_all_builds` requests the full history.
    async fn get_project_metadata(
        &self,
        instance: &TestInstance,
        fetch_all_builds: bool,
    ) -> AppResult<ProjectMetadata>;

    /// One build; `NotFound` when the backend does not know it.
    async fn get_test_build(&self, instance: &TestInstance, build_number: i64) -> AppResult<TestBuild>;

    /// Console output bytes of a build.
    async fn get_build_console(&self, instance: &TestInstance, build_number: i64) -> AppResult<Vec<u8>>;

    /// Trigger a new build. Returns whether the backend accepted it.
    async fn start_test_build(&self, instance: &TestInstance) -> AppResult<bool>;

    /// Human-facing link to a build.
    fn get_test_build_external_link(&self, build: &TestBuild) -> String;

    /// Links to the logs of a build.
    fn get_test_build_logs_external_link(&self, build: &TestBuild) -> Vec<BuildLogLink>;

    /// Up to `limit` most recent builds, highest build number first.
    async fn get_test_builds(&self, instance: &TestInstance, limit: usize) -> AppResult<Vec<TestBuild>> {
        let metadata = self
            .get_project_metadata(instance, limit > DEFAULT_PAGE_SIZE)
            .await?;
        let mut builds = Vec::with_capacity(limit.min(metadata.builds.len()));
        for build_ref in metadata.builds.iter().take(limit) {
            builds.push(self.get_test_build(instance, build_ref.number).await?);
        }
        builds.sort_by(|a, b| b.build_number.cmp(&a.build_number));
        Ok(builds)
    }

    async fn get_last_test_build(&self, instance: &TestInstance) -> AppResult<Option<TestBuild>> {
        let metadata = self.get_project_metadata(instance, false).await?;
        self.resolve_build_ref(instance, metadata.last_build.as_ref()).await
    }

    async fn get_last_passed_test_build(&self, instance: &TestInstance) -> AppResult<Option<TestBuild>> {
        let metadata = self.get_project_metadata(instance, false).await?;
        self.resolve_build_ref(instance, metadata.last_successful_build.as_ref())
            .await
    }

    async fn get_last_failed_test_build(&self, instance: &TestInstance) -> AppResult<Option<TestBuild>> {
        let metadata = self.get_project_metadata(instance, false).await?;
        self.resolve_build_ref(instance, metadata.last_failed_build.as_ref())
            .await
    }

    async fn resolve_build_ref(
        &self,
        instance: &TestInstance,
        build_ref: Option<&BuildRef>,
    ) -> AppResult<Option<TestBuild>> {
        match build_ref {
            Some(r) => Ok(Some(self.get_test_build(instance, r.number).await?)),
            None => Ok(None),
        }
    }

    /// Human-facing link to the job of a test instance.
    async fn get_instance_external_link(&self, instance: &TestInstance) -> AppResult<String> {
        Ok(self.get_project_metadata(instance, false).await?.url)
    }

    /// Slice of the console output of a build.
    ///
    /// `limit_bytes == 0` reads to the end of the log.
    async fn get_test_build_output(
        &self,
        instance: &TestInstance,
        build_number: i64,
        offset_bytes: i64,
        limit_bytes: i64,
    ) -> AppResult<Vec<u8>> {
        if offset_bytes < 0 {
            return Err(AppError::InvalidInput(format!(
                "Invalid log offset: {}",
                offset_bytes
            )));
        }
        if limit_bytes < 0 {
            return Err(AppError::InvalidInput(format!("Invalid log limit: {}", limit_bytes)));
        }
        let output = self.get_build_console(instance, build_number).await?;
        slice_output(output, offset_bytes as usize, limit_bytes as usize)
    }
}

/// Byte window `[offset, offset + limit)` of `output`, clamped to its end.
pub fn slice_output(mut output: Vec<u8>, offset: usize, limit: usize) -> AppResult<Vec<u8>> {
    if offset > output.len() {
        return Err(AppError::InvalidInput(format!(
            "Invalid log offset: {} exceeds log length {}",
            offset,
            output.len()
        )));
    }
    let end = if limit == 0 {
        output.len()
    } else {
        offset.saturating_add(limit).min(output.len())
    };
    output.truncate(end);
    Ok(output.split_off(offset))
}

/// Testing services by stored configuration id.
///
/// Services are created lazily from their stored configuration and shared by
/// every test instance that runs on them.
pub struct ServiceRegistry {
    services: RwLock<HashMap<Uuid, Arc<dyn TestingService>>>,
    cache: Arc<BuildCache>,
    timeouts: Timeouts,
}

impl ServiceRegistry {
    pub fn new(cache: Arc<BuildCache>, timeouts: Timeouts) -> Self {
        Self {
            services: RwLock::new(HashMap::new()),
            cache,
            timeouts,
        }
    }

    /// Register an already constructed service.
    pub async fn register(&self, service: Arc<dyn TestingService>) {
        self.services.write().await.insert(service.id(), service);
    }

    /// Registered service, if any.
    pub async fn get(&self, id: Uuid) -> Option<Arc<dyn TestingService>> {
        self.services.read().await.get(&id).cloned()
    }

    /// Service for `config`, created on first use.
    pub async fn resolve(&self, config: &TestingServiceConfig) -> AppResult<Arc<dyn TestingService>> {
        if let Some(service) = self.get(config.id).await {
            return Ok(service);
        }

        let service: Arc<dyn TestingService> = match config.service_type.as_str() {
            jenkins::SERVICE_TYPE => Arc::new(JenkinsService::new(
                config,
                self.cache.clone(),
                &self.timeouts,
            )?),
            other => {
                return Err(AppError::TestingService(format!(
                    "Unsupported testing service type '{}'",
                    other
                )));
            }
        };

        info!(
            service = %config.id,
            service_type = %config.service_type,
            url = %config.url,
            "Testing service initialized"
        );

        let mut services = self.services.write().await;
        Ok(services.entry(config.id).or_insert(service).clone())
    }
}
