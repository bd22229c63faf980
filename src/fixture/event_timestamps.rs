//! Checks that events written to the search index carry timestamps in the
//! `YYYY-MM-DD HH:MM:SS.mmm` format.
//!
//! Setup opens the search port on the management security group and waits for
//! it to accept connections. The body deploys a trivial blueprint so the
//! manager emits events, then queries the index by deployment id and checks
//! every hit. Teardown uninstalls, removes the rule if one was created and
//! deletes the deployment and blueprint.

use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::Arc;

use super::{Deployer, TestCase, TestContext};
use crate::clients::{IngressRule, MatchQuery, NetworkApi, SearchApi, SearchResponse};
use crate::config::Settings;
use crate::error::{Result, TesterError};
use crate::net::PortWaiter;
use crate::retry::{poll_until, WaitConfig};
use crate::timestamp::{event_span, is_valid_timestamp};

pub const TEST_NAME: &str = "event_timestamp_format";
const ANY_IPV4: &str = "0.0.0.0/0";

pub struct EventTimestampFormatTest {
    network: Arc<dyn NetworkApi>,
    deployer: Deployer,
    search: Arc<dyn SearchApi>,
    port_waiter: PortWaiter,
    settings: Settings,
}

impl EventTimestampFormatTest {
    pub fn new(
        settings: Settings,
        network: Arc<dyn NetworkApi>,
        deployer: Deployer,
        search: Arc<dyn SearchApi>,
    ) -> Self {
        let port_waiter =
            PortWaiter::new(settings.connect_timeout(), settings.port_wait.wait.clone());
        Self {
            network,
            deployer,
            search,
            port_waiter,
            settings,
        }
    }

    /// Open the search port on the management security group.
    ///
    /// A networking API error while creating the rule is logged and the test
    /// continues without a rule. Once a rule exists the port must open within
    /// the configured budget.
    pub async fn create_elasticsearch_rule(&self, ctx: &mut TestContext) -> Result<()> {
        let group_name = &self.settings.management.security_group;
        let group = self
            .network
            .list_security_groups(group_name)
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| {
                TesterError::SetupFailed(format!("security group {group_name} not found"))
            })?;

        let port = self.settings.elasticsearch.port;
        let rule = IngressRule::tcp_port(&group.id, port, ANY_IPV4);

        match self.network.create_security_group_rule(&rule).await {
            Ok(rule_id) => {
                ctx.elasticsearch_rule = Some(rule_id);
                let open = self
                    .port_waiter
                    .wait_for_open_port(
                        &ctx.management_ip,
                        port,
                        self.settings.port_wait_timeout(),
                    )
                    .await?;
                if !open {
                    return Err(TesterError::SetupFailed(format!(
                        "Couldn't open elasticsearch port {port} on {}",
                        ctx.management_ip
                    )));
                }
            }
            Err(e) => {
                ctx.elasticsearch_rule = None;
                log::warn!("Got networking API error ({e}). Resuming");
            }
        }
        Ok(())
    }

    /// Remove the rule opened in setup, if any.
    ///
    /// The rule stays recorded in `ctx` until the delete succeeds.
    pub async fn delete_elasticsearch_rule(&self, ctx: &mut TestContext) -> Result<()> {
        if let Some(rule_id) = &ctx.elasticsearch_rule {
            self.network.delete_security_group_rule(rule_id).await?;
            ctx.elasticsearch_rule = None;
        }
        Ok(())
    }

    /// Query the index until events for the deployment show up or the events
    /// budget runs out. A search error ends the wait immediately.
    async fn fetch_events(&self, deployment_id: &str) -> Result<SearchResponse> {
        let es = &self.settings.elasticsearch;
        let query = MatchQuery::new(&es.match_field, deployment_id).with_size(es.size);
        let wait = WaitConfig::fixed(self.settings.events_poll_interval());
        let timeout = self.settings.events_poll_timeout();

        let search = self.search.as_ref();
        let index = es.index.as_str();
        let query = &query;
        let found = poll_until(timeout, &wait, move || async move {
            match search.search(index, query).await {
                Ok(response) if response.total() > 0 => Some(Ok(response)),
                Ok(_) => None,
                Err(e) => Some(Err(e)),
            }
        })
        .await;

        match found {
            Some(result) => result,
            None => {
                log::warn!("No events for {deployment_id} in {index} after {timeout:?}");
                Ok(SearchResponse::from_timestamps(
                    deployment_id,
                    std::iter::empty(),
                ))
            }
        }
    }
}

#[async_trait]
impl TestCase for EventTimestampFormatTest {
    fn name(&self) -> &str {
        TEST_NAME
    }

    async fn setup(&self, ctx: &mut TestContext) -> Result<()> {
        self.create_elasticsearch_rule(ctx).await
    }

    async fn run(&self, ctx: &mut TestContext) -> Result<()> {
        let blueprint = &self.settings.blueprint;
        self.deployer
            .upload_deploy_and_execute_install(
                ctx,
                &PathBuf::from(&blueprint.archive_path),
                &blueprint.main_file_name,
            )
            .await?;

        let response = self.fetch_events(&ctx.deployment_id).await?;
        log::info!("Got {} Hits", response.total());
        check_event_timestamps(&response, &ctx.deployment_id)
    }

    async fn teardown(&self, ctx: &mut TestContext) -> Result<()> {
        let mut errors = Vec::new();

        if ctx.deployment_created {
            if let Err(e) = self.deployer.execute_uninstall(ctx).await {
                log::warn!("Uninstall of {} failed: {e}", ctx.deployment_id);
                errors.push(format!("uninstall: {e}"));
            }
        }

        if let Err(e) = self.delete_elasticsearch_rule(ctx).await {
            let rule_id = ctx
                .elasticsearch_rule
                .as_ref()
                .map(ToString::to_string)
                .unwrap_or_default();
            log::warn!("Deleting elasticsearch rule {rule_id} failed: {e}");
            errors.push(format!("delete rule {rule_id}: {e}"));
        }

        if let Err(e) = self.deployer.cleanup(ctx).await {
            log::warn!("Cleanup of {} failed: {e}", ctx.deployment_id);
            errors.push(format!("cleanup: {e}"));
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(TesterError::Teardown(errors))
        }
    }
}

/// Assert that events exist and every hit carries a well-formed timestamp.
///
/// Fails on the first malformed hit, quoting its value.
pub fn check_event_timestamps(response: &SearchResponse, deployment_id: &str) -> Result<()> {
    if response.total() == 0 {
        return Err(TesterError::AssertionFailed(format!(
            "There are no events for deployment {deployment_id}"
        )));
    }

    for hit in &response.hits.hits {
        match hit.source.timestamp.as_deref() {
            Some(timestamp) if is_valid_timestamp(timestamp) => {}
            Some(timestamp) => {
                return Err(TesterError::AssertionFailed(format!(
                    "Got {timestamp}. Does not match format YYYY-MM-DD HH:MM:SS.***"
                )));
            }
            None => {
                return Err(TesterError::AssertionFailed(format!(
                    "Event {} for deployment {deployment_id} has no timestamp",
                    hit.id.as_deref().unwrap_or("<unknown>")
                )));
            }
        }
    }

    if let Some((first, last)) = event_span(
        response
            .hits
            .hits
            .iter()
            .filter_map(|hit| hit.source.timestamp.as_deref()),
    ) {
        log::info!(
            "{} events for {deployment_id} span {first} .. {last}",
            response.hits.hits.len()
        );
    }
    Ok(())
}
