//! End-to-end runs of the event timestamp test case.
//!
//! The manager and Elasticsearch are stub HTTP servers on localhost. The
//! Elasticsearch stub's listening port doubles as the port the setup phase
//! waits on.
//!
//! ```bash
//! cargo test --features test-harness --test integration_tests_main
//! ```

pub mod event_timestamps;

use serde_json::{json, Value};
use std::io::Write;
use std::sync::Arc;
use std::time::Duration;

use crate::common::{http_client, StubResponse, StubServer};
use eventlog_e2e::clients::{ElasticsearchClient, ManagerClient, NetworkApi};
use eventlog_e2e::config::Settings;
use eventlog_e2e::fixture::{Deployer, EventTimestampFormatTest};
use eventlog_e2e::retry::WaitConfig;

pub struct Environment {
    pub manager: StubServer,
    pub elasticsearch: StubServer,
    pub settings: Settings,
    _archive: tempfile::NamedTempFile,
}

impl Environment {
    pub async fn start() -> Self {
        let manager = StubServer::start().await;
        let elasticsearch = StubServer::start().await;

        let mut archive = tempfile::NamedTempFile::new().unwrap();
        archive.write_all(b"blueprint-archive").unwrap();

        let mut settings = Settings::default();
        settings.management.ip = "127.0.0.1".to_string();
        settings.management.rest_port = manager.port();
        settings.elasticsearch.port = elasticsearch.port();
        settings.blueprint.archive_path = archive.path().display().to_string();
        settings.port_wait.timeout_secs = 5;
        settings.port_wait.connect_timeout_ms = 500;
        settings.port_wait.wait = WaitConfig::fixed(Duration::from_millis(50));
        settings.execution.timeout_secs = 5;
        settings.execution.poll_interval_ms = 20;
        settings.events.poll_timeout_secs = 2;
        settings.events.poll_interval_ms = 20;
        settings.validate().unwrap();
        assert_eq!(settings.management_rest_url(), manager.url());
        assert_eq!(settings.elasticsearch_url(), elasticsearch.url());

        Self {
            manager,
            elasticsearch,
            settings,
            _archive: archive,
        }
    }

    /// A manager that accepts everything and finishes every workflow.
    pub fn serve_healthy_manager(&self, deployment_id: &str) {
        let execution = |id: &str, workflow: &str, status: &str| {
            json!({
                "id": id,
                "workflow_id": workflow,
                "status": status,
                "deployment_id": deployment_id,
            })
        };

        let m = &self.manager;
        m.route(
            "PUT",
            &format!("/blueprints/{deployment_id}"),
            StubResponse::json(201, json!({ "id": deployment_id })),
        );
        m.route(
            "PUT",
            &format!("/deployments/{deployment_id}"),
            StubResponse::json(201, json!({ "id": deployment_id })),
        );
        m.route(
            "GET",
            "/executions",
            StubResponse::json(
                200,
                json!({ "items": [execution("env-1", "create_deployment_environment", "terminated")] }),
            ),
        );
        m.route(
            "POST",
            &format!("/deployments/{deployment_id}/executions"),
            StubResponse::json(201, execution("exec-install", "install", "pending")),
        );
        m.route(
            "POST",
            &format!("/deployments/{deployment_id}/executions"),
            StubResponse::json(201, execution("exec-uninstall", "uninstall", "terminated")),
        );
        m.route(
            "GET",
            "/executions/exec-install",
            StubResponse::json(200, execution("exec-install", "install", "started")),
        );
        m.route(
            "GET",
            "/executions/exec-install",
            StubResponse::json(200, execution("exec-install", "install", "terminated")),
        );
        m.route(
            "DELETE",
            &format!("/deployments/{deployment_id}"),
            StubResponse::json(200, json!({ "id": deployment_id })),
        );
        m.route(
            "DELETE",
            &format!("/blueprints/{deployment_id}"),
            StubResponse::json(200, json!({ "id": deployment_id })),
        );
    }

    pub fn serve_events(&self, body: Value) {
        self.elasticsearch.route(
            "POST",
            "/cloudify_events/_search",
            StubResponse::json(200, body),
        );
    }

    pub fn test_case(&self, network: Arc<dyn NetworkApi>) -> EventTimestampFormatTest {
        let manager = Arc::new(ManagerClient::with_http_client(
            http_client(),
            self.settings.management_rest_url(),
        ));
        let search = Arc::new(ElasticsearchClient::with_http_client(
            http_client(),
            self.settings.elasticsearch_url(),
        ));
        let deployer = Deployer::new(
            manager,
            self.settings.execution_timeout(),
            self.settings.execution_poll_interval(),
        );
        EventTimestampFormatTest::new(self.settings.clone(), network, deployer, search)
    }
}

pub fn events_body(deployment_id: &str, timestamps: &[&str]) -> Value {
    let hits: Vec<Value> = timestamps
        .iter()
        .enumerate()
        .map(|(i, ts)| {
            json!({
                "_id": format!("ev-{i}"),
                "_source": { "timestamp": ts, "deployment_id": deployment_id, "type": "cloudify_event" }
            })
        })
        .collect();
    json!({ "hits": { "total": { "value": hits.len(), "relation": "eq" }, "hits": hits } })
}
