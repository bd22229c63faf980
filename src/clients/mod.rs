//! Thin clients for the external systems the check talks to.
//!
//! Each system sits behind a trait so the lifecycle in [`crate::fixture`] can
//! run against the real HTTP clients or the in-memory fakes in
//! `test_harness`.

pub mod elasticsearch;
pub mod manager;
pub mod openstack;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::path::Path;

use crate::error::{NetworkError, Result, TesterError};

pub use elasticsearch::ElasticsearchClient;
pub use manager::ManagerClient;
pub use openstack::{NeutronClient, OpenStackCredentials};

// =============================================================================
// Networking
// =============================================================================

/// Identifier of a created security group rule.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RuleId(pub String);

impl std::fmt::Display for RuleId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SecurityGroup {
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tenant_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IngressRule {
    pub security_group_id: String,
    pub direction: String,
    pub ethertype: String,
    pub protocol: String,
    pub port_range_min: u16,
    pub port_range_max: u16,
    pub remote_ip_prefix: String,
    pub remote_group_id: Option<String>,
}

impl IngressRule {
    /// Inbound IPv4 TCP on a single port from `cidr`.
    pub fn tcp_port(security_group_id: impl Into<String>, port: u16, cidr: impl Into<String>) -> Self {
        Self {
            security_group_id: security_group_id.into(),
            direction: "ingress".to_string(),
            ethertype: "IPv4".to_string(),
            protocol: "tcp".to_string(),
            port_range_min: port,
            port_range_max: port,
            remote_ip_prefix: cidr.into(),
            remote_group_id: None,
        }
    }
}

#[async_trait]
pub trait NetworkApi: Send + Sync {
    async fn list_security_groups(&self, name: &str) -> Result<Vec<SecurityGroup>, NetworkError>;

    async fn create_security_group_rule(&self, rule: &IngressRule) -> Result<RuleId, NetworkError>;

    async fn delete_security_group_rule(&self, rule_id: &RuleId) -> Result<(), NetworkError>;
}

// =============================================================================
// Orchestration
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    Pending,
    Started,
    Cancelling,
    ForceCancelling,
    Cancelled,
    Terminated,
    Failed,
    #[serde(other)]
    Unknown,
}

impl ExecutionStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            ExecutionStatus::Cancelled | ExecutionStatus::Terminated | ExecutionStatus::Failed
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ExecutionStatus::Pending => "pending",
            ExecutionStatus::Started => "started",
            ExecutionStatus::Cancelling => "cancelling",
            ExecutionStatus::ForceCancelling => "force_cancelling",
            ExecutionStatus::Cancelled => "cancelled",
            ExecutionStatus::Terminated => "terminated",
            ExecutionStatus::Failed => "failed",
            ExecutionStatus::Unknown => "unknown",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Execution {
    pub id: String,
    pub workflow_id: String,
    pub status: ExecutionStatus,
    #[serde(default)]
    pub deployment_id: Option<String>,
    #[serde(default)]
    pub error: String,
}

#[async_trait]
pub trait OrchestrationApi: Send + Sync {
    async fn upload_blueprint(
        &self,
        blueprint_id: &str,
        archive_path: &Path,
        main_file_name: &str,
    ) -> Result<()>;

    async fn create_deployment(
        &self,
        deployment_id: &str,
        blueprint_id: &str,
        inputs: &Value,
    ) -> Result<()>;

    async fn list_executions(&self, deployment_id: &str) -> Result<Vec<Execution>>;

    async fn start_execution(
        &self,
        deployment_id: &str,
        workflow_id: &str,
        parameters: &Value,
    ) -> Result<Execution>;

    async fn get_execution(&self, execution_id: &str) -> Result<Execution>;

    async fn delete_deployment(&self, deployment_id: &str) -> Result<()>;

    async fn delete_blueprint(&self, blueprint_id: &str) -> Result<()>;
}

// =============================================================================
// Search
// =============================================================================

/// A `match` query on a single field.
#[derive(Debug, Clone, PartialEq)]
pub struct MatchQuery {
    pub field: String,
    pub value: String,
    pub size: Option<u32>,
}

impl MatchQuery {
    pub fn new(field: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            value: value.into(),
            size: None,
        }
    }

    pub fn with_size(mut self, size: Option<u32>) -> Self {
        self.size = size;
        self
    }

    pub fn to_body(&self) -> Value {
        let mut matcher = Map::new();
        matcher.insert(self.field.clone(), Value::String(self.value.clone()));
        let mut body = json!({ "query": { "match": matcher } });
        if let Some(size) = self.size {
            body["size"] = json!(size);
        }
        body
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResponse {
    pub hits: Hits,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Hits {
    pub total: HitsTotal,
    #[serde(default)]
    pub hits: Vec<Hit>,
}

/// Older servers report a bare count, newer ones an object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum HitsTotal {
    Count(u64),
    Object {
        value: u64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        relation: Option<String>,
    },
}

impl HitsTotal {
    pub fn value(&self) -> u64 {
        match self {
            HitsTotal::Count(n) => *n,
            HitsTotal::Object { value, .. } => *value,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Hit {
    #[serde(rename = "_id", default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(rename = "_source")]
    pub source: EventDocument,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EventDocument {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deployment_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event_type: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl SearchResponse {
    pub fn total(&self) -> u64 {
        self.hits.total.value()
    }

    /// Build a response from raw `_source` timestamps.
    pub fn from_timestamps<'a, I>(deployment_id: &str, timestamps: I) -> Self
    where
        I: IntoIterator<Item = &'a str>,
    {
        let hits: Vec<Hit> = timestamps
            .into_iter()
            .enumerate()
            .map(|(i, ts)| Hit {
                id: Some(format!("{deployment_id}-{i}")),
                source: EventDocument {
                    timestamp: Some(ts.to_string()),
                    deployment_id: Some(deployment_id.to_string()),
                    ..Default::default()
                },
            })
            .collect();
        Self {
            hits: Hits {
                total: HitsTotal::Count(hits.len() as u64),
                hits,
            },
        }
    }
}

#[async_trait]
pub trait SearchApi: Send + Sync {
    async fn search(&self, index: &str, query: &MatchQuery) -> Result<SearchResponse>;
}

// =============================================================================
// Shared HTTP plumbing
// =============================================================================

/// Turn a non-success response into [`TesterError::Api`], keeping the body text.
pub(crate) async fn ensure_success(
    service: &'static str,
    response: reqwest::Response,
) -> Result<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let message = response.text().await.unwrap_or_default();
    Err(TesterError::Api {
        service,
        status: status.as_u16(),
        message,
    })
}
