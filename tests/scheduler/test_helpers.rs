//! In-memory stores, a scripted testing service and workflow builders.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use tokio::sync::Mutex;
use uuid::Uuid;

use workflow_monitor_lib::config::Timeouts;
use workflow_monitor_lib::db::{NotificationStore, WorkflowStore};
use workflow_monitor_lib::error::{AppError, AppResult};
use workflow_monitor_lib::models::{
    BuildLogLink, BuildResult, BuildStatus, NewNotification, Notification, PeriodicBuildSettings,
    TestBuild, TestInstance, TestSuite, User, Workflow, WorkflowVersion, WsEventMessage,
};
use workflow_monitor_lib::services::testing_service::{BuildRef, ProjectMetadata};
use workflow_monitor_lib::services::{
    AuthContext, CrateRefresher, EventBroadcaster, TestingService, TestingServiceConfig,
};
use workflow_monitor_lib::tasks::TaskContext;

/// Workflow store backed by a vector.
#[derive(Default)]
pub struct MemoryWorkflowStore {
    pub workflows: Mutex<Vec<Workflow>>,
    pub saved_instances: Mutex<Vec<TestInstance>>,
    pub saved_versions: Mutex<Vec<WorkflowVersion>>,
    pub subscribers: Mutex<HashMap<Uuid, Vec<Uuid>>>,
}

impl MemoryWorkflowStore {
    pub async fn add(&self, workflow: Workflow) {
        self.workflows.lock().await.push(workflow);
    }

    pub async fn subscribe(&self, workflow: Uuid, user: Uuid) {
        self.subscribers.lock().await.entry(workflow).or_default().push(user);
    }

    /// Current stored state of an instance.
    pub async fn instance(&self, id: Uuid) -> TestInstance {
        self.workflows
            .lock()
            .await
            .iter()
            .flat_map(|w| w.versions.iter())
            .flat_map(|v| v.test_instances())
            .find(|i| i.id == id)
            .cloned()
            .expect("instance not stored")
    }

    /// Current stored state of a version.
    pub async fn version(&self, id: Uuid) -> WorkflowVersion {
        self.workflows
            .lock()
            .await
            .iter()
            .flat_map(|w| w.versions.iter())
            .find(|v| v.id == id)
            .cloned()
            .expect("version not stored")
    }
}

#[async_trait]
impl WorkflowStore for MemoryWorkflowStore {
    async fn all_workflows(&self) -> AppResult<Vec<Workflow>> {
        Ok(self.workflows.lock().await.clone())
    }

    async fn find_workflow(&self, uuid: Uuid) -> AppResult<Option<Workflow>> {
        Ok(self
            .workflows
            .lock()
            .await
            .iter()
            .find(|w| w.uuid == uuid)
            .cloned())
    }

    async fn save_instance(&self, instance: &TestInstance) -> AppResult<()> {
        let mut workflows = self.workflows.lock().await;
        let stored = workflows
            .iter_mut()
            .flat_map(|w| w.versions.iter_mut())
            .flat_map(|v| v.test_suites.iter_mut())
            .flat_map(|s| s.test_instances.iter_mut())
            .find(|i| i.id == instance.id)
            .ok_or_else(|| AppError::NotFound(format!("Test instance {}", instance.id)))?;
        *stored = instance.clone();
        self.saved_instances.lock().await.push(instance.clone());
        Ok(())
    }

    async fn save_version(&self, version: &WorkflowVersion) -> AppResult<()> {
        let mut workflows = self.workflows.lock().await;
        let stored = workflows
            .iter_mut()
            .flat_map(|w| w.versions.iter_mut())
            .find(|v| v.id == version.id)
            .ok_or_else(|| AppError::NotFound(format!("Workflow version {}", version)))?;
        *stored = version.clone();
        self.saved_versions.lock().await.push(version.clone());
        Ok(())
    }

    async fn subscribers(&self, workflow_uuid: Uuid) -> AppResult<Vec<Uuid>> {
        Ok(self
            .subscribers
            .lock()
            .await
            .get(&workflow_uuid)
            .cloned()
            .unwrap_or_default())
    }

    async fn testing_service(&self, id: Uuid) -> AppResult<TestingServiceConfig> {
        Err(AppError::NotFound(format!("Testing service {}", id)))
    }
}

/// Notification store backed by a vector, unique by name.
#[derive(Default)]
pub struct MemoryNotificationStore {
    pub notifications: Mutex<Vec<Notification>>,
}

impl MemoryNotificationStore {
    pub async fn names(&self) -> Vec<String> {
        self.notifications
            .lock()
            .await
            .iter()
            .map(|n| n.name.clone())
            .collect()
    }
}

#[async_trait]
impl NotificationStore for MemoryNotificationStore {
    async fn find_by_name(&self, name: &str) -> AppResult<Vec<Notification>> {
        Ok(self
            .notifications
            .lock()
            .await
            .iter()
            .filter(|n| n.name == name)
            .cloned()
            .collect())
    }

    async fn create(&self, notification: NewNotification) -> AppResult<Option<Notification>> {
        let mut notifications = self.notifications.lock().await;
        if notifications.iter().any(|n| n.name == notification.name) {
            return Ok(None);
        }
        let stored = notification.into_notification();
        notifications.push(stored.clone());
        Ok(Some(stored))
    }
}

/// Testing service answering from scripted build lists.
pub struct ScriptedService {
    id: Uuid,
    builds: Mutex<HashMap<Uuid, Vec<TestBuild>>>,
    failing: Mutex<HashSet<Uuid>>,
    pub started: Mutex<Vec<Uuid>>,
}

impl ScriptedService {
    pub fn new() -> Self {
        Self {
            id: Uuid::new_v4(),
            builds: Mutex::new(HashMap::new()),
            failing: Mutex::new(HashSet::new()),
            started: Mutex::new(Vec::new()),
        }
    }

    /// Replace the builds reported for `instance` (any order).
    pub async fn set_builds(&self, instance: Uuid, builds: Vec<TestBuild>) {
        self.builds.lock().await.insert(instance, builds);
    }

    /// Make every request about `instance` fail.
    pub async fn fail(&self, instance: Uuid) {
        self.failing.lock().await.insert(instance);
    }

    async fn check(&self, instance: &TestInstance) -> AppResult<()> {
        if self.failing.lock().await.contains(&instance.id) {
            return Err(AppError::TestingService(format!(
                "GET {} failed: connection refused",
                instance.resource
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl TestingService for ScriptedService {
    fn id(&self) -> Uuid {
        self.id
    }

    fn service_type(&self) -> &'static str {
        "scripted"
    }

    fn url(&self) -> &str {
        "https://ci.example.org"
    }

    async fn check_connection(&self) -> AppResult<()> {
        Ok(())
    }

    async fn get_project_metadata(
        &self,
        instance: &TestInstance,
        _fetch_all_builds: bool,
    ) -> AppResult<ProjectMetadata> {
        self.check(instance).await?;
        let mut builds = self
            .builds
            .lock()
            .await
            .get(&instance.id)
            .cloned()
            .unwrap_or_default();
        builds.sort_by(|a, b| b.build_number.cmp(&a.build_number));
        let to_ref = |b: &TestBuild| BuildRef {
            number: b.build_number,
            url: Some(b.url.clone()),
        };
        Ok(ProjectMetadata {
            url: format!("https://ci.example.org/{}", instance.resource),
            last_build: builds.first().map(to_ref),
            last_successful_build: builds.iter().find(|b| b.is_successful()).map(to_ref),
            last_failed_build: builds
                .iter()
                .find(|b| b.status == BuildStatus::Failed)
                .map(to_ref),
            builds: builds.iter().map(to_ref).collect(),
        })
    }

    async fn get_test_build(&self, instance: &TestInstance, build_number: i64) -> AppResult<TestBuild> {
        self.check(instance).await?;
        self.builds
            .lock()
            .await
            .get(&instance.id)
            .and_then(|builds| builds.iter().find(|b| b.build_number == build_number))
            .cloned()
            .ok_or_else(|| AppError::NotFound(format!("TestBuild {}", build_number)))
    }

    async fn get_build_console(&self, instance: &TestInstance, _build_number: i64) -> AppResult<Vec<u8>> {
        self.check(instance).await?;
        Ok(b"ok\n".to_vec())
    }

    async fn start_test_build(&self, instance: &TestInstance) -> AppResult<bool> {
        self.check(instance).await?;
        self.started.lock().await.push(instance.id);
        Ok(true)
    }

    fn get_test_build_external_link(&self, build: &TestBuild) -> String {
        format!("{}console", build.url)
    }

    fn get_test_build_logs_external_link(&self, build: &TestBuild) -> Vec<BuildLogLink> {
        vec![BuildLogLink {
            job: "default".to_string(),
            url: format!("{}consoleText", build.url),
        }]
    }
}

/// Crate refresher returning scripted digests and recording who it acted as.
#[derive(Default)]
pub struct FakeCrateRefresher {
    pub digests: std::sync::Mutex<HashMap<Uuid, String>>,
    pub failing: std::sync::Mutex<HashSet<Uuid>>,
    pub acted_as: std::sync::Mutex<Vec<Option<String>>>,
}

#[async_trait]
impl CrateRefresher for FakeCrateRefresher {
    async fn refresh(&self, version: &WorkflowVersion, auth: &dyn AuthContext) -> AppResult<String> {
        self.acted_as
            .lock()
            .unwrap()
            .push(auth.current_user().map(|u| u.username));
        if self.failing.lock().unwrap().contains(&version.id) {
            return Err(AppError::TestingService("crate download failed".to_string()));
        }
        self.digests
            .lock()
            .unwrap()
            .get(&version.id)
            .cloned()
            .ok_or_else(|| AppError::NotFound(format!("RO-Crate of {}", version)))
    }
}

/// Everything a pipeline test needs.
pub struct Harness {
    pub ctx: TaskContext,
    pub store: Arc<MemoryWorkflowStore>,
    pub notifications: Arc<MemoryNotificationStore>,
    pub service: Arc<ScriptedService>,
    pub crates: Arc<FakeCrateRefresher>,
    pub broadcaster: EventBroadcaster,
}

pub async fn create_harness() -> Harness {
    let store = Arc::new(MemoryWorkflowStore::default());
    let notifications = Arc::new(MemoryNotificationStore::default());
    let crates = Arc::new(FakeCrateRefresher::default());
    let service = Arc::new(ScriptedService::new());
    let broadcaster = EventBroadcaster::new();

    let ctx = TaskContext::new(
        store.clone(),
        notifications.clone(),
        crates.clone(),
        broadcaster.clone(),
        &Timeouts::default(),
    );
    ctx.registry.register(service.clone()).await;

    Harness {
        ctx,
        store,
        notifications,
        service,
        crates,
        broadcaster,
    }
}

/// Build `number` of `instance`, started at `timestamp`.
pub fn build_at(instance: Uuid, number: i64, status: BuildStatus, timestamp: DateTime<Utc>) -> TestBuild {
    let url = format!("https://ci.example.org/job/demo/{}/", number);
    TestBuild {
        id: number.to_string(),
        build_number: number,
        test_instance_id: instance,
        status,
        result: if status == BuildStatus::Passed {
            BuildResult::Success
        } else {
            BuildResult::Failed
        },
        timestamp,
        duration_ms: 1000,
        revision: None,
        external_link: format!("{}console", url),
        url,
    }
}

/// Build `number` of `instance`, started `number` minutes after a fixed base time.
pub fn build(instance: Uuid, number: i64, status: BuildStatus) -> TestBuild {
    let base = DateTime::parse_from_rfc3339("2026-01-01T00:00:00Z")
        .unwrap()
        .with_timezone(&Utc);
    build_at(instance, number, status, base + Duration::minutes(number))
}

/// Workflow with one version holding one suite with `instances` instances on `service`.
pub fn workflow_with_instances(name: &str, service: Uuid, instances: usize) -> Workflow {
    let mut workflow = Workflow::new(name);
    let mut version = WorkflowVersion::new(workflow.uuid, "1.0");
    let mut suite = TestSuite::new(version.id, "default".to_string());
    for i in 0..instances {
        suite.add_instance(TestInstance::new(
            suite.id,
            format!("{} instance {}", name, i),
            format!("job/{}-{}/", name, i),
            service,
        ));
    }
    version.test_suites.push(suite);
    workflow.versions.push(version);
    workflow
}

pub fn version_of(workflow: &Workflow) -> &WorkflowVersion {
    &workflow.versions[0]
}

pub fn instance_ids(workflow: &Workflow) -> Vec<Uuid> {
    version_of(workflow).test_instances().map(|i| i.id).collect()
}

/// Submitter whose settings enable periodic builds at `interval`.
pub fn submitter(name: &str, interval: Option<&str>) -> User {
    let mut user = User::new(name);
    user.settings = interval.map(|i| PeriodicBuildSettings {
        periodic_builds: true,
        periodic_builds_interval: Some(i.to_string()),
    });
    user
}

/// Drain every event already broadcast.
pub fn drain(rx: &mut tokio::sync::broadcast::Receiver<WsEventMessage>) -> Vec<WsEventMessage> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}
