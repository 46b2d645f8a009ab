//! Mock Jenkins server for the adapter tests.
//!
//! Serves the subset of the Jenkins JSON API the adapter uses and counts
//! requests per path so tests can observe caching. Full-history requests on
//! a job are counted under `<path>?tree=allBuilds`.

use actix_web::{App, HttpRequest, HttpResponse, HttpServer, get, post, web};
use serde_json::{Value as JsonValue, json};
use std::collections::HashMap;
use std::net::TcpListener;
use std::sync::{Arc, Mutex};

/// Base of the mock build timestamps, milliseconds since epoch.
pub const BASE_TIMESTAMP_MS: i64 = 1_700_000_000_000;

#[derive(Default)]
pub struct MockJob {
    /// Raw build documents, oldest first
    pub builds: Vec<JsonValue>,
    pub console: HashMap<i64, String>,
}

/// Shared state for the mock Jenkins server.
#[derive(Default)]
pub struct MockJenkinsState {
    pub base_url: String,
    pub jobs: HashMap<String, MockJob>,
    pub hits: HashMap<String, usize>,
    pub triggered: Vec<String>,
}

impl MockJenkinsState {
    fn hit(&mut self, path: &str) {
        *self.hits.entry(path.to_string()).or_default() += 1;
    }

    fn build_json(&self, job: &str, number: i64, building: bool, result: Option<&str>) -> JsonValue {
        json!({
            "_class": "hudson.model.FreeStyleBuild",
            "number": number,
            "building": building,
            "result": result,
            "timestamp": BASE_TIMESTAMP_MS + number * 60_000,
            "duration": if building { 0 } else { 1500 },
            "url": format!("{}/job/{}/{}/", self.base_url, job, number),
            "actions": [
                {"_class": "hudson.model.CauseAction"},
                {
                    "_class": "hudson.plugins.git.util.BuildData",
                    "lastBuiltRevision": {"SHA1": format!("{:040x}", number)}
                }
            ]
        })
    }
}

fn last_matching(job: &MockJob, base_url: &str, name: &str, result: Option<&str>) -> JsonValue {
    job.builds
        .iter()
        .rev()
        .find(|b| result.is_none() || b["result"].as_str() == result)
        .map(|b| build_ref(base_url, name, b["number"].as_i64().unwrap_or_default()))
        .unwrap_or(JsonValue::Null)
}

fn build_ref(base_url: &str, job: &str, number: i64) -> JsonValue {
    json!({
        "_class": "hudson.model.FreeStyleBuild",
        "number": number,
        "url": format!("{}/job/{}/{}/", base_url, job, number)
    })
}

#[get("/api/json")]
async fn server_info(state: web::Data<Arc<Mutex<MockJenkinsState>>>) -> HttpResponse {
    state.lock().unwrap().hit("/api/json");
    HttpResponse::Ok().json(json!({
        "_class": "hudson.model.Hudson",
        "mode": "NORMAL",
        "nodeDescription": "the master Jenkins node"
    }))
}

#[get("/job/{name}/api/json")]
async fn job_info(
    req: HttpRequest,
    path: web::Path<String>,
    state: web::Data<Arc<Mutex<MockJenkinsState>>>,
) -> HttpResponse {
    let name = path.into_inner();
    let full_history = req.query_string().contains("allBuilds");
    let mut state = state.lock().unwrap();
    if full_history {
        state.hit(&format!("{}?tree=allBuilds", req.path()));
    } else {
        state.hit(req.path());
    }
    let base_url = state.base_url.clone();
    let Some(job) = state.jobs.get(&name) else {
        return HttpResponse::NotFound().finish();
    };

    let refs: Vec<JsonValue> = job
        .builds
        .iter()
        .rev()
        .map(|b| build_ref(&base_url, &name, b["number"].as_i64().unwrap_or_default()))
        .collect();

    if full_history {
        return HttpResponse::Ok().json(json!({
            "_class": "hudson.model.FreeStyleProject",
            "allBuilds": refs
        }));
    }

    HttpResponse::Ok().json(json!({
        "_class": "hudson.model.FreeStyleProject",
        "name": name,
        "url": format!("{}/job/{}/", base_url, name),
        "builds": refs,
        "lastBuild": last_matching(job, &base_url, &name, None),
        "lastSuccessfulBuild": last_matching(job, &base_url, &name, Some("SUCCESS")),
        "lastFailedBuild": last_matching(job, &base_url, &name, Some("FAILURE"))
    }))
}

#[get("/job/{name}/{number}/api/json")]
async fn build_info(
    req: HttpRequest,
    path: web::Path<(String, i64)>,
    state: web::Data<Arc<Mutex<MockJenkinsState>>>,
) -> HttpResponse {
    let (name, number) = path.into_inner();
    let mut state = state.lock().unwrap();
    state.hit(req.path());
    let build = state
        .jobs
        .get(&name)
        .and_then(|job| job.builds.iter().find(|b| b["number"].as_i64() == Some(number)));
    match build {
        Some(build) => HttpResponse::Ok().json(build),
        None => HttpResponse::NotFound().finish(),
    }
}

#[get("/job/{name}/{number}/consoleText")]
async fn console_text(
    req: HttpRequest,
    path: web::Path<(String, i64)>,
    state: web::Data<Arc<Mutex<MockJenkinsState>>>,
) -> HttpResponse {
    let (name, number) = path.into_inner();
    let mut state = state.lock().unwrap();
    state.hit(req.path());
    match state.jobs.get(&name).and_then(|job| job.console.get(&number)) {
        Some(text) => HttpResponse::Ok()
            .content_type("text/plain; charset=utf-8")
            .body(text.clone()),
        None => HttpResponse::NotFound().finish(),
    }
}

#[post("/job/{name}/build")]
async fn trigger_build(
    path: web::Path<String>,
    state: web::Data<Arc<Mutex<MockJenkinsState>>>,
) -> HttpResponse {
    let name = path.into_inner();
    let mut state = state.lock().unwrap();
    let Some(next) = state
        .jobs
        .get(&name)
        .map(|job| job.builds.len() as i64 + 1)
    else {
        return HttpResponse::NotFound().finish();
    };
    let build = state.build_json(&name, next, true, None);
    if let Some(job) = state.jobs.get_mut(&name) {
        job.builds.push(build);
    }
    state.triggered.push(name);
    HttpResponse::Created().finish()
}

/// Mock Jenkins server on an ephemeral port.
pub struct MockJenkins {
    pub url: String,
    pub state: Arc<Mutex<MockJenkinsState>>,
}

impl MockJenkins {
    /// Start the mock server.
    pub async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").expect("failed to bind");
        let port = listener.local_addr().unwrap().port();
        let url = format!("http://127.0.0.1:{}", port);

        let state = Arc::new(Mutex::new(MockJenkinsState {
            base_url: url.clone(),
            ..MockJenkinsState::default()
        }));

        let state_data = state.clone();
        let server = HttpServer::new(move || {
            App::new()
                .app_data(web::Data::new(state_data.clone()))
                .service(server_info)
                .service(job_info)
                .service(build_info)
                .service(console_text)
                .service(trigger_build)
        })
        .workers(1)
        .listen(listener)
        .expect("failed to listen")
        .disable_signals()
        .run();

        tokio::spawn(server);

        MockJenkins { url, state }
    }

    /// Append a build to `job`, creating the job if needed. Numbers follow insertion order.
    pub fn add_build(&self, job: &str, building: bool, result: Option<&str>) -> i64 {
        let mut state = self.state.lock().unwrap();
        let number = state.jobs.get(job).map_or(0, |j| j.builds.len() as i64) + 1;
        let build = state.build_json(job, number, building, result);
        state.jobs.entry(job.to_string()).or_default().builds.push(build);
        number
    }

    /// Finish a running build with `result`.
    pub fn finish_build(&self, job: &str, number: i64, result: &str) {
        let mut state = self.state.lock().unwrap();
        if let Some(build) = state
            .jobs
            .get_mut(job)
            .and_then(|j| j.builds.iter_mut().find(|b| b["number"].as_i64() == Some(number)))
        {
            build["building"] = json!(false);
            build["result"] = json!(result);
        }
    }

    pub fn set_console(&self, job: &str, number: i64, text: &str) {
        let mut state = self.state.lock().unwrap();
        state
            .jobs
            .entry(job.to_string())
            .or_default()
            .console
            .insert(number, text.to_string());
    }

    /// Number of requests served for `path`.
    pub fn hits(&self, path: &str) -> usize {
        self.state.lock().unwrap().hits.get(path).copied().unwrap_or(0)
    }

    pub fn triggered(&self) -> Vec<String> {
        self.state.lock().unwrap().triggered.clone()
    }
}
