//! Recording in-memory stand-ins for the external APIs.
//!
//! Every fake keeps a log of the calls it received so tests can assert on the
//! exact sequence the lifecycle produced.

use async_trait::async_trait;
use serde_json::Value;
use std::collections::{HashMap, VecDeque};
use std::path::Path;
use std::sync::Mutex;

use crate::clients::{
    Execution, ExecutionStatus, IngressRule, MatchQuery, NetworkApi, OrchestrationApi, RuleId,
    SearchApi, SearchResponse, SecurityGroup,
};
use crate::error::{NetworkError, Result, TesterError};

/// How [`FakeNetworkApi`] answers rule creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuleCreation {
    Succeed,
    Conflict,
    Fail(u16),
}

pub struct FakeNetworkApi {
    groups: Vec<SecurityGroup>,
    rule_creation: RuleCreation,
    fail_delete: bool,
    calls: Mutex<Vec<String>>,
    created: Mutex<Vec<IngressRule>>,
    deleted: Mutex<Vec<RuleId>>,
}

impl Default for FakeNetworkApi {
    fn default() -> Self {
        Self::with_group("cloudify-sg-management", "sg-0001")
    }
}

impl FakeNetworkApi {
    pub fn with_group(name: &str, id: &str) -> Self {
        Self {
            groups: vec![SecurityGroup {
                id: id.to_string(),
                name: name.to_string(),
                tenant_id: None,
            }],
            rule_creation: RuleCreation::Succeed,
            fail_delete: false,
            calls: Mutex::new(Vec::new()),
            created: Mutex::new(Vec::new()),
            deleted: Mutex::new(Vec::new()),
        }
    }

    pub fn without_groups() -> Self {
        Self {
            groups: Vec::new(),
            ..Self::default()
        }
    }

    pub fn rule_creation(mut self, behaviour: RuleCreation) -> Self {
        self.rule_creation = behaviour;
        self
    }

    pub fn failing_delete(mut self) -> Self {
        self.fail_delete = true;
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn created_rules(&self) -> Vec<IngressRule> {
        self.created.lock().unwrap().clone()
    }

    pub fn deleted_rules(&self) -> Vec<RuleId> {
        self.deleted.lock().unwrap().clone()
    }

    fn record(&self, call: String) {
        self.calls.lock().unwrap().push(call);
    }
}

#[async_trait]
impl NetworkApi for FakeNetworkApi {
    async fn list_security_groups(&self, name: &str) -> Result<Vec<SecurityGroup>, NetworkError> {
        self.record(format!("list_security_groups {name}"));
        Ok(self
            .groups
            .iter()
            .filter(|g| g.name == name)
            .cloned()
            .collect())
    }

    async fn create_security_group_rule(&self, rule: &IngressRule) -> Result<RuleId, NetworkError> {
        self.record(format!(
            "create_security_group_rule {} {}",
            rule.security_group_id, rule.port_range_min
        ));
        match self.rule_creation {
            RuleCreation::Succeed => {
                let mut created = self.created.lock().unwrap();
                created.push(rule.clone());
                Ok(RuleId(format!("rule-{}", created.len())))
            }
            RuleCreation::Conflict => Err(NetworkError::from_status(
                409,
                "Security group rule already exists".to_string(),
            )),
            RuleCreation::Fail(status) => Err(NetworkError::from_status(
                status,
                "networking service error".to_string(),
            )),
        }
    }

    async fn delete_security_group_rule(&self, rule_id: &RuleId) -> Result<(), NetworkError> {
        self.record(format!("delete_security_group_rule {rule_id}"));
        if self.fail_delete {
            return Err(NetworkError::from_status(500, "delete refused".to_string()));
        }
        self.deleted.lock().unwrap().push(rule_id.clone());
        Ok(())
    }
}

#[derive(Default)]
pub struct FakeOrchestrationApi {
    pending_polls: u32,
    failing_workflows: Vec<String>,
    fail_upload: bool,
    calls: Mutex<Vec<String>>,
    executions: Mutex<HashMap<String, (String, String, u32)>>,
}

impl FakeOrchestrationApi {
    /// Number of `get_execution` calls that report `started` before the final status.
    pub fn with_pending_polls(mut self, polls: u32) -> Self {
        self.pending_polls = polls;
        self
    }

    pub fn failing_workflow(mut self, workflow_id: &str) -> Self {
        self.failing_workflows.push(workflow_id.to_string());
        self
    }

    pub fn failing_upload(mut self) -> Self {
        self.fail_upload = true;
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    fn record(&self, call: String) {
        self.calls.lock().unwrap().push(call);
    }

    fn final_status(&self, workflow_id: &str) -> ExecutionStatus {
        if self.failing_workflows.iter().any(|w| w == workflow_id) {
            ExecutionStatus::Failed
        } else {
            ExecutionStatus::Terminated
        }
    }

    fn execution(
        &self,
        id: &str,
        deployment_id: &str,
        workflow_id: &str,
        status: ExecutionStatus,
    ) -> Execution {
        Execution {
            id: id.to_string(),
            workflow_id: workflow_id.to_string(),
            status,
            deployment_id: Some(deployment_id.to_string()),
            error: if status == ExecutionStatus::Failed {
                format!("{workflow_id} workflow failed")
            } else {
                String::new()
            },
        }
    }
}

#[async_trait]
impl OrchestrationApi for FakeOrchestrationApi {
    async fn upload_blueprint(
        &self,
        blueprint_id: &str,
        _archive_path: &Path,
        main_file_name: &str,
    ) -> Result<()> {
        self.record(format!("upload_blueprint {blueprint_id} {main_file_name}"));
        if self.fail_upload {
            return Err(TesterError::Api {
                service: "manager",
                status: 400,
                message: "invalid blueprint archive".to_string(),
            });
        }
        Ok(())
    }

    async fn create_deployment(
        &self,
        deployment_id: &str,
        blueprint_id: &str,
        _inputs: &Value,
    ) -> Result<()> {
        self.record(format!("create_deployment {deployment_id} {blueprint_id}"));
        Ok(())
    }

    async fn list_executions(&self, deployment_id: &str) -> Result<Vec<Execution>> {
        self.record(format!("list_executions {deployment_id}"));
        Ok(vec![self.execution(
            &format!("{deployment_id}-env"),
            deployment_id,
            "create_deployment_environment",
            ExecutionStatus::Terminated,
        )])
    }

    async fn start_execution(
        &self,
        deployment_id: &str,
        workflow_id: &str,
        _parameters: &Value,
    ) -> Result<Execution> {
        self.record(format!("start_execution {deployment_id} {workflow_id}"));
        let mut executions = self.executions.lock().unwrap();
        let id = format!("exec-{}", executions.len() + 1);
        executions.insert(
            id.clone(),
            (deployment_id.to_string(), workflow_id.to_string(), 0),
        );

        let status = if self.pending_polls == 0 {
            self.final_status(workflow_id)
        } else {
            ExecutionStatus::Pending
        };
        Ok(self.execution(&id, deployment_id, workflow_id, status))
    }

    async fn get_execution(&self, execution_id: &str) -> Result<Execution> {
        self.record(format!("get_execution {execution_id}"));
        let mut executions = self.executions.lock().unwrap();
        let (deployment_id, workflow_id, polls) =
            executions
                .get_mut(execution_id)
                .ok_or_else(|| TesterError::Api {
                    service: "manager",
                    status: 404,
                    message: format!("execution {execution_id} not found"),
                })?;
        *polls = polls.saturating_add(1);

        let status = if *polls < self.pending_polls {
            ExecutionStatus::Started
        } else {
            self.final_status(workflow_id)
        };
        Ok(self.execution(execution_id, deployment_id, workflow_id, status))
    }

    async fn delete_deployment(&self, deployment_id: &str) -> Result<()> {
        self.record(format!("delete_deployment {deployment_id}"));
        Ok(())
    }

    async fn delete_blueprint(&self, blueprint_id: &str) -> Result<()> {
        self.record(format!("delete_blueprint {blueprint_id}"));
        Ok(())
    }
}

/// Serves canned responses in order, repeating the last one once exhausted.
pub struct FakeSearchApi {
    responses: Mutex<VecDeque<SearchResponse>>,
    fail: bool,
    queries: Mutex<Vec<(String, MatchQuery)>>,
}

impl FakeSearchApi {
    pub fn new(responses: Vec<SearchResponse>) -> Self {
        Self {
            responses: Mutex::new(responses.into()),
            fail: false,
            queries: Mutex::new(Vec::new()),
        }
    }

    /// Always answers with the given timestamps for `deployment_id`.
    pub fn with_timestamps(deployment_id: &str, timestamps: &[&str]) -> Self {
        Self::new(vec![SearchResponse::from_timestamps(
            deployment_id,
            timestamps.iter().copied(),
        )])
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::new(Vec::new())
        }
    }

    pub fn queries(&self) -> Vec<(String, MatchQuery)> {
        self.queries.lock().unwrap().clone()
    }
}

#[async_trait]
impl SearchApi for FakeSearchApi {
    async fn search(&self, index: &str, query: &MatchQuery) -> Result<SearchResponse> {
        self.queries
            .lock()
            .unwrap()
            .push((index.to_string(), query.clone()));
        if self.fail {
            return Err(TesterError::Api {
                service: "search",
                status: 503,
                message: "search service unavailable".to_string(),
            });
        }

        let mut responses = self.responses.lock().unwrap();
        let response = if responses.len() > 1 {
            responses.pop_front()
        } else {
            responses.front().cloned()
        };
        Ok(response
            .unwrap_or_else(|| SearchResponse::from_timestamps(&query.value, std::iter::empty())))
    }
}
