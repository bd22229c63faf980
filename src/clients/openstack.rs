use async_trait::async_trait;
use reqwest::{Client, Response};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::time::Duration;
use tokio::sync::Mutex;

use super::{IngressRule, NetworkApi, RuleId, SecurityGroup};
use crate::config::OpenStack;
use crate::error::{NetworkError, Result};

const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;
const NETWORK_SERVICE_TYPE: &str = "network";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenStackCredentials {
    pub auth_url: String,
    pub username: String,
    pub password: String,
    pub tenant_name: String,
    pub region: Option<String>,
}

impl From<&OpenStack> for OpenStackCredentials {
    fn from(config: &OpenStack) -> Self {
        Self {
            auth_url: config.auth_url.clone(),
            username: config.username.clone(),
            password: config.password.clone(),
            tenant_name: config.tenant_name.clone(),
            region: config.region.clone(),
        }
    }
}

#[derive(Debug, Clone)]
struct Session {
    token: String,
    network_endpoint: String,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access: Access,
}

#[derive(Debug, Deserialize)]
struct Access {
    token: Token,
    #[serde(rename = "serviceCatalog", default)]
    service_catalog: Vec<CatalogEntry>,
}

#[derive(Debug, Deserialize)]
struct Token {
    id: String,
}

#[derive(Debug, Deserialize)]
struct CatalogEntry {
    #[serde(rename = "type")]
    service_type: String,
    #[serde(default)]
    endpoints: Vec<Endpoint>,
}

#[derive(Debug, Deserialize)]
struct Endpoint {
    #[serde(default)]
    region: Option<String>,
    #[serde(rename = "publicURL")]
    public_url: String,
}

#[derive(Debug, Deserialize)]
struct SecurityGroupList {
    security_groups: Vec<SecurityGroup>,
}

#[derive(Debug, Deserialize)]
struct CreatedRule {
    security_group_rule: CreatedRuleBody,
}

#[derive(Debug, Deserialize)]
struct CreatedRuleBody {
    id: String,
}

/// Networking v2.0 client authenticated through Identity v2 tokens.
///
/// The token and network endpoint are fetched on first use and reused for the
/// lifetime of the client.
pub struct NeutronClient {
    http: Client,
    credentials: OpenStackCredentials,
    session: Mutex<Option<Session>>,
}

impl NeutronClient {
    pub fn new(credentials: OpenStackCredentials) -> Result<Self> {
        let http = Client::builder()
            .timeout(Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS))
            .build()?;
        Ok(Self::with_http_client(http, credentials))
    }

    pub fn with_http_client(http: Client, credentials: OpenStackCredentials) -> Self {
        Self {
            http,
            credentials,
            session: Mutex::new(None),
        }
    }

    async fn session(&self) -> Result<Session, NetworkError> {
        let mut guard = self.session.lock().await;
        if let Some(session) = guard.as_ref() {
            return Ok(session.clone());
        }
        let session = self.authenticate().await?;
        *guard = Some(session.clone());
        Ok(session)
    }

    async fn authenticate(&self) -> Result<Session, NetworkError> {
        let url = format!("{}/tokens", self.credentials.auth_url.trim_end_matches('/'));
        let body = json!({
            "auth": {
                "tenantName": self.credentials.tenant_name,
                "passwordCredentials": {
                    "username": self.credentials.username,
                    "password": self.credentials.password,
                }
            }
        });

        log::debug!("Authenticating against {url}");
        let response = check(self.http.post(&url).json(&body).send().await?).await?;
        let token: TokenResponse = response.json().await?;

        let region = self.credentials.region.as_deref();
        let network_endpoint = token
            .access
            .service_catalog
            .iter()
            .filter(|entry| entry.service_type == NETWORK_SERVICE_TYPE)
            .flat_map(|entry| entry.endpoints.iter())
            .find(|endpoint| region.is_none() || endpoint.region.as_deref() == region)
            .map(|endpoint| endpoint.public_url.trim_end_matches('/').to_string())
            .ok_or_else(|| {
                NetworkError::NotFound(format!(
                    "no network endpoint in service catalog for region {}",
                    region.unwrap_or("<any>")
                ))
            })?;

        log::info!("Using networking endpoint {network_endpoint}");
        Ok(Session {
            token: token.access.token.id,
            network_endpoint,
        })
    }
}

async fn check(response: Response) -> Result<Response, NetworkError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let message = response.text().await.unwrap_or_default();
    Err(NetworkError::from_status(status.as_u16(), message))
}

#[async_trait]
impl NetworkApi for NeutronClient {
    async fn list_security_groups(&self, name: &str) -> Result<Vec<SecurityGroup>, NetworkError> {
        let session = self.session().await?;
        let url = format!("{}/v2.0/security-groups", session.network_endpoint);

        let response = self
            .http
            .get(&url)
            .header("X-Auth-Token", &session.token)
            .query(&[("name", name)])
            .send()
            .await?;
        let list: SecurityGroupList = check(response).await?.json().await?;
        Ok(list.security_groups)
    }

    async fn create_security_group_rule(&self, rule: &IngressRule) -> Result<RuleId, NetworkError> {
        let session = self.session().await?;
        let url = format!("{}/v2.0/security-group-rules", session.network_endpoint);

        let response = self
            .http
            .post(&url)
            .header("X-Auth-Token", &session.token)
            .json(&json!({ "security_group_rule": rule }))
            .send()
            .await?;
        let created: CreatedRule = check(response).await?.json().await?;

        log::info!(
            "Created security group rule {} ({} {}/{})",
            created.security_group_rule.id,
            rule.direction,
            rule.protocol,
            rule.port_range_min
        );
        Ok(RuleId(created.security_group_rule.id))
    }

    async fn delete_security_group_rule(&self, rule_id: &RuleId) -> Result<(), NetworkError> {
        let session = self.session().await?;
        let url = format!(
            "{}/v2.0/security-group-rules/{}",
            session.network_endpoint, rule_id
        );

        let response = self
            .http
            .delete(&url)
            .header("X-Auth-Token", &session.token)
            .send()
            .await?;
        check(response).await?;

        log::info!("Deleted security group rule {rule_id}");
        Ok(())
    }
}
