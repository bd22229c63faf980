use serde_json::{json, Value};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use super::TestContext;
use crate::clients::{Execution, ExecutionStatus, OrchestrationApi};
use crate::error::{Result, TesterError};
use crate::retry::{poll_until, WaitConfig};

pub const INSTALL_WORKFLOW: &str = "install";
pub const UNINSTALL_WORKFLOW: &str = "uninstall";

/// Drives blueprint upload, deployment and workflow executions on the manager.
#[derive(Clone)]
pub struct Deployer {
    api: Arc<dyn OrchestrationApi>,
    timeout: Duration,
    wait: WaitConfig,
}

impl Deployer {
    pub fn new(api: Arc<dyn OrchestrationApi>, timeout: Duration, poll_interval: Duration) -> Self {
        Self {
            api,
            timeout,
            wait: WaitConfig::fixed(poll_interval),
        }
    }

    /// Upload the blueprint, create the deployment and run `install`.
    ///
    /// `ctx` is updated as each step lands so teardown only undoes what exists.
    pub async fn upload_deploy_and_execute_install(
        &self,
        ctx: &mut TestContext,
        archive_path: &Path,
        main_file_name: &str,
    ) -> Result<Execution> {
        self.api
            .upload_blueprint(&ctx.blueprint_id, archive_path, main_file_name)
            .await?;
        ctx.blueprint_uploaded = true;

        self.api
            .create_deployment(&ctx.deployment_id, &ctx.blueprint_id, &json!({}))
            .await?;
        ctx.deployment_created = true;

        self.wait_for_deployment_environment(&ctx.deployment_id)
            .await?;
        self.execute(&ctx.deployment_id, INSTALL_WORKFLOW).await
    }

    pub async fn execute_uninstall(&self, ctx: &TestContext) -> Result<Execution> {
        self.execute(&ctx.deployment_id, UNINSTALL_WORKFLOW).await
    }

    pub async fn execute(&self, deployment_id: &str, workflow_id: &str) -> Result<Execution> {
        let execution = self
            .api
            .start_execution(deployment_id, workflow_id, &Value::Object(Default::default()))
            .await?;
        self.wait_for_execution(execution).await
    }

    /// Poll an execution until it reaches a terminal status.
    ///
    /// Only `terminated` counts as success.
    pub async fn wait_for_execution(&self, execution: Execution) -> Result<Execution> {
        let finished = if execution.status.is_terminal() {
            execution
        } else {
            let api = self.api.as_ref();
            let id = execution.id.as_str();
            poll_until(self.timeout, &self.wait, move || async move {
                match api.get_execution(id).await {
                    Ok(current) if current.status.is_terminal() => Some(Ok(current)),
                    Ok(_) => None,
                    Err(e) => Some(Err(e)),
                }
            })
            .await
            .ok_or_else(|| {
                TesterError::Timeout(format!(
                    "execution {} of workflow {} did not finish within {:?}",
                    execution.id, execution.workflow_id, self.timeout
                ))
            })??
        };

        match finished.status {
            ExecutionStatus::Terminated => {
                log::info!(
                    "Workflow {} ({}) terminated",
                    finished.workflow_id,
                    finished.id
                );
                Ok(finished)
            }
            status => Err(TesterError::ExecutionFailed {
                execution_id: finished.id,
                workflow: finished.workflow_id,
                status: status.as_str().to_string(),
                error: finished.error,
            }),
        }
    }

    /// Wait for the executions the manager starts on deployment creation.
    pub async fn wait_for_deployment_environment(&self, deployment_id: &str) -> Result<()> {
        let api = self.api.as_ref();
        let pending = poll_until(self.timeout, &self.wait, move || async move {
            match api.list_executions(deployment_id).await {
                Ok(executions) if executions.iter().all(|e| e.status.is_terminal()) => {
                    Some(Ok(executions))
                }
                Ok(_) => None,
                Err(e) => Some(Err(e)),
            }
        })
        .await
        .ok_or_else(|| {
            TesterError::Timeout(format!(
                "deployment {deployment_id} environment not ready within {:?}",
                self.timeout
            ))
        })??;

        if let Some(failed) = pending
            .into_iter()
            .find(|e| e.status != ExecutionStatus::Terminated)
        {
            return Err(TesterError::ExecutionFailed {
                execution_id: failed.id,
                workflow: failed.workflow_id,
                status: failed.status.as_str().to_string(),
                error: failed.error,
            });
        }
        Ok(())
    }

    /// Delete whatever deployment and blueprint `ctx` says were created.
    pub async fn cleanup(&self, ctx: &mut TestContext) -> Result<()> {
        if ctx.deployment_created {
            self.api.delete_deployment(&ctx.deployment_id).await?;
            ctx.deployment_created = false;
        }
        if ctx.blueprint_uploaded {
            self.api.delete_blueprint(&ctx.blueprint_id).await?;
            ctx.blueprint_uploaded = false;
        }
        Ok(())
    }
}
