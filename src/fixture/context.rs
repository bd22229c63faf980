use uuid::Uuid;

use crate::clients::RuleId;

/// Per-test state threaded through setup, body and teardown.
#[derive(Debug, Clone, PartialEq)]
pub struct TestContext {
    pub test_id: String,
    pub management_ip: String,
    pub blueprint_id: String,
    pub deployment_id: String,
    /// Rule opened during setup; `None` when creation failed or was skipped.
    pub elasticsearch_rule: Option<RuleId>,
    pub blueprint_uploaded: bool,
    pub deployment_created: bool,
}

impl TestContext {
    /// Blueprint and deployment are both named after the test id.
    pub fn new(test_id: impl Into<String>, management_ip: impl Into<String>) -> Self {
        let test_id = test_id.into();
        Self {
            blueprint_id: test_id.clone(),
            deployment_id: test_id.clone(),
            test_id,
            management_ip: management_ip.into(),
            elasticsearch_rule: None,
            blueprint_uploaded: false,
            deployment_created: false,
        }
    }

    pub fn generate_test_id(prefix: &str) -> String {
        let suffix = Uuid::new_v4().simple().to_string();
        format!("{prefix}_{}", &suffix[..8])
    }
}
