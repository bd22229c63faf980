use std::sync::Arc;

use super::{events_body, Environment};
use crate::common::StubResponse;
use eventlog_e2e::fixture::{run_test_case, Phase, TestContext, TestOutcome};
use eventlog_e2e::test_harness::{FakeNetworkApi, RuleCreation};

#[tokio::test]
async fn test_well_formed_events_pass() {
    let _ = env_logger::try_init();
    let env = Environment::start().await;
    let deployment_id = "eventlog_timestamp_it01";
    env.serve_healthy_manager(deployment_id);
    env.serve_events(events_body(
        deployment_id,
        &["2014-03-21 10:15:42.123", "2014-03-21 10:15:42.456"],
    ));

    let network = Arc::new(FakeNetworkApi::default());
    let case = env.test_case(network.clone());
    let mut ctx = TestContext::new(deployment_id, "127.0.0.1");

    let report = run_test_case(&case, &mut ctx).await;
    assert!(report.passed(), "{:?}", report.outcome);

    let rules = network.created_rules();
    assert_eq!(rules.len(), 1);
    assert_eq!(rules[0].port_range_min, env.elasticsearch.port());
    assert_eq!(network.deleted_rules().len(), 1);

    let searches = env.elasticsearch.requests_to("POST", "/cloudify_events/_search");
    assert_eq!(searches.len(), 1);
    assert_eq!(
        searches[0].json()["query"]["match"]["deployment_id"],
        deployment_id
    );

    let workflows: Vec<String> = env
        .manager
        .requests_to("POST", &format!("/deployments/{deployment_id}/executions"))
        .iter()
        .map(|r| r.json()["workflow_id"].as_str().unwrap().to_string())
        .collect();
    assert_eq!(workflows, vec!["install", "uninstall"]);
    assert_eq!(
        env.manager
            .requests_to("DELETE", &format!("/deployments/{deployment_id}"))
            .len(),
        1
    );
    assert_eq!(
        env.manager
            .requests_to("DELETE", &format!("/blueprints/{deployment_id}"))
            .len(),
        1
    );
}

#[tokio::test]
async fn test_malformed_timestamp_fails_and_cleans_up() {
    let env = Environment::start().await;
    let deployment_id = "eventlog_timestamp_it02";
    env.serve_healthy_manager(deployment_id);
    env.serve_events(events_body(
        deployment_id,
        &["2014-03-21 10:15:42.123", "2014-03-21 10:5:42.123"],
    ));

    let network = Arc::new(FakeNetworkApi::default());
    let case = env.test_case(network.clone());
    let mut ctx = TestContext::new(deployment_id, "127.0.0.1");

    let report = run_test_case(&case, &mut ctx).await;
    match &report.outcome {
        TestOutcome::Failed { phase, message } => {
            assert_eq!(*phase, Phase::Body);
            assert!(
                message.contains("Got 2014-03-21 10:5:42.123. Does not match format"),
                "{message}"
            );
        }
        TestOutcome::Passed => panic!("malformed timestamp went unnoticed"),
    }
    assert!(report.teardown_error.is_none());
    assert_eq!(network.deleted_rules().len(), 1);
    assert_eq!(
        env.manager
            .requests_to("DELETE", &format!("/blueprints/{deployment_id}"))
            .len(),
        1
    );
}

#[tokio::test]
async fn test_existing_rule_is_left_alone() {
    let env = Environment::start().await;
    let deployment_id = "eventlog_timestamp_it03";
    env.serve_healthy_manager(deployment_id);
    env.serve_events(events_body(deployment_id, &["2014-03-21 10:15:42.123"]));

    let network = Arc::new(FakeNetworkApi::default().rule_creation(RuleCreation::Conflict));
    let case = env.test_case(network.clone());
    let mut ctx = TestContext::new(deployment_id, "127.0.0.1");

    let report = run_test_case(&case, &mut ctx).await;
    assert!(report.passed(), "{:?}", report.outcome);
    assert!(network.deleted_rules().is_empty());
}

#[tokio::test]
async fn test_no_events_reports_deployment() {
    let env = Environment::start().await;
    let deployment_id = "eventlog_timestamp_it04";
    env.serve_healthy_manager(deployment_id);
    env.serve_events(events_body(deployment_id, &[]));

    let case = env.test_case(Arc::new(FakeNetworkApi::default()));
    let mut ctx = TestContext::new(deployment_id, "127.0.0.1");

    let report = run_test_case(&case, &mut ctx).await;
    let message = report.failure_message().unwrap();
    assert!(
        message.contains(&format!("There are no events for deployment {deployment_id}")),
        "{message}"
    );
    // Polled for the whole events budget before giving up.
    assert!(
        env.elasticsearch
            .requests_to("POST", "/cloudify_events/_search")
            .len()
            > 1
    );
}

#[tokio::test]
async fn test_failed_install_still_tears_down() {
    let env = Environment::start().await;
    let deployment_id = "eventlog_timestamp_it05";
    env.manager.route(
        "GET",
        "/executions/exec-install",
        StubResponse::json(
            200,
            serde_json::json!({
                "id": "exec-install",
                "workflow_id": "install",
                "status": "failed",
                "error": "node failed to start",
            }),
        ),
    );
    env.serve_healthy_manager(deployment_id);

    let network = Arc::new(FakeNetworkApi::default());
    let case = env.test_case(network.clone());
    let mut ctx = TestContext::new(deployment_id, "127.0.0.1");

    let report = run_test_case(&case, &mut ctx).await;
    let message = report.failure_message().unwrap();
    assert!(message.contains("node failed to start"), "{message}");
    assert!(env
        .elasticsearch
        .requests_to("POST", "/cloudify_events/_search")
        .is_empty());
    assert_eq!(network.deleted_rules().len(), 1);
    assert_eq!(
        env.manager
            .requests_to("DELETE", &format!("/deployments/{deployment_id}"))
            .len(),
        1
    );
}
