use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Value};
use std::path::Path;
use std::time::Duration;

use super::{ensure_success, Execution, OrchestrationApi};
use crate::error::Result;

const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 60;
const SERVICE: &str = "manager";

/// Execution listings come back either as a bare array or wrapped in `items`.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ExecutionList {
    Bare(Vec<Execution>),
    Paged { items: Vec<Execution> },
}

impl ExecutionList {
    fn into_vec(self) -> Vec<Execution> {
        match self {
            ExecutionList::Bare(items) | ExecutionList::Paged { items } => items,
        }
    }
}

/// REST client for the orchestration manager.
#[derive(Debug, Clone)]
pub struct ManagerClient {
    http: Client,
    base_url: String,
}

impl ManagerClient {
    pub fn new(base_url: impl Into<String>) -> Result<Self> {
        let http = Client::builder()
            .timeout(Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS))
            .build()?;
        Ok(Self::with_http_client(http, base_url))
    }

    pub fn with_http_client(http: Client, base_url: impl Into<String>) -> Self {
        Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}

#[async_trait]
impl OrchestrationApi for ManagerClient {
    async fn upload_blueprint(
        &self,
        blueprint_id: &str,
        archive_path: &Path,
        main_file_name: &str,
    ) -> Result<()> {
        let archive = tokio::fs::read(archive_path).await?;
        log::info!(
            "Uploading blueprint {blueprint_id} from {} ({} bytes)",
            archive_path.display(),
            archive.len()
        );

        let response = self
            .http
            .put(self.url(&format!("/blueprints/{blueprint_id}")))
            .query(&[("application_file_name", main_file_name)])
            .header(reqwest::header::CONTENT_TYPE, "application/octet-stream")
            .body(archive)
            .send()
            .await?;
        ensure_success(SERVICE, response).await?;
        Ok(())
    }

    async fn create_deployment(
        &self,
        deployment_id: &str,
        blueprint_id: &str,
        inputs: &Value,
    ) -> Result<()> {
        log::info!("Creating deployment {deployment_id} from blueprint {blueprint_id}");
        let response = self
            .http
            .put(self.url(&format!("/deployments/{deployment_id}")))
            .json(&json!({ "blueprint_id": blueprint_id, "inputs": inputs }))
            .send()
            .await?;
        ensure_success(SERVICE, response).await?;
        Ok(())
    }

    async fn list_executions(&self, deployment_id: &str) -> Result<Vec<Execution>> {
        let response = self
            .http
            .get(self.url("/executions"))
            .query(&[("deployment_id", deployment_id)])
            .send()
            .await?;
        let list: ExecutionList = ensure_success(SERVICE, response).await?.json().await?;
        Ok(list.into_vec())
    }

    async fn start_execution(
        &self,
        deployment_id: &str,
        workflow_id: &str,
        parameters: &Value,
    ) -> Result<Execution> {
        log::info!("Starting workflow {workflow_id} on deployment {deployment_id}");
        let response = self
            .http
            .post(self.url(&format!("/deployments/{deployment_id}/executions")))
            .json(&json!({
                "workflow_id": workflow_id,
                "parameters": parameters,
                "force": false,
            }))
            .send()
            .await?;
        let execution = ensure_success(SERVICE, response).await?.json().await?;
        Ok(execution)
    }

    async fn get_execution(&self, execution_id: &str) -> Result<Execution> {
        let response = self
            .http
            .get(self.url(&format!("/executions/{execution_id}")))
            .send()
            .await?;
        let execution = ensure_success(SERVICE, response).await?.json().await?;
        Ok(execution)
    }

    async fn delete_deployment(&self, deployment_id: &str) -> Result<()> {
        log::info!("Deleting deployment {deployment_id}");
        let response = self
            .http
            .delete(self.url(&format!("/deployments/{deployment_id}")))
            .query(&[("ignore_live_nodes", "true")])
            .send()
            .await?;
        ensure_success(SERVICE, response).await?;
        Ok(())
    }

    async fn delete_blueprint(&self, blueprint_id: &str) -> Result<()> {
        log::info!("Deleting blueprint {blueprint_id}");
        let response = self
            .http
            .delete(self.url(&format!("/blueprints/{blueprint_id}")))
            .send()
            .await?;
        ensure_success(SERVICE, response).await?;
        Ok(())
    }
}
