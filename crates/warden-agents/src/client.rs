use std::time::Duration;

use async_trait::async_trait;
use reqwest::Url;
use serde::de::DeserializeOwned;
use serde::Serialize;
use warden_core::{
    Agent, AgentGateway, AgentPage, AgentsConfig, FollowupAck, LaunchRequest, Service,
    WardenError,
};

const DEFAULT_BASE_URL: &str = "https://api.cursor.com/v0";

/// HTTP client for the coding-agent API.
///
/// # Examples
///
/// ```
/// use warden_agents::AgentClient;
/// use warden_core::AgentsConfig;
///
/// let config = AgentsConfig {
///     api_key: Some("key_123".into()),
///     ..AgentsConfig::default()
/// };
/// let client = AgentClient::new(&config).unwrap();
/// assert_eq!(client.base_url().as_str(), "https://api.cursor.com/v0");
/// ```
pub struct AgentClient {
    http: reqwest::Client,
    base_url: Url,
    api_key: String,
    config: AgentsConfig,
}

#[derive(Serialize)]
struct PromptBody<'a> {
    text: &'a str,
}

#[derive(Serialize)]
struct SourceBody<'a> {
    repository: &'a str,
    #[serde(rename = "ref")]
    git_ref: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct TargetBody<'a> {
    auto_create_pr: bool,
    branch_name: &'a str,
}

#[derive(Serialize)]
struct WebhookBody<'a> {
    url: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    secret: Option<&'a str>,
}

#[derive(Serialize)]
struct LaunchBody<'a> {
    prompt: PromptBody<'a>,
    source: SourceBody<'a>,
    model: &'a str,
    target: TargetBody<'a>,
    #[serde(skip_serializing_if = "Option::is_none")]
    webhook: Option<WebhookBody<'a>>,
}

#[derive(Serialize)]
struct FollowupBody<'a> {
    prompt: PromptBody<'a>,
}

impl AgentClient {
    /// Build a client from configuration.
    ///
    /// # Errors
    ///
    /// Returns [`WardenError::Config`] if no API key is configured or the
    /// base URL is not a valid URL.
    pub fn new(config: &AgentsConfig) -> Result<Self, WardenError> {
        let api_key = config
            .api_key
            .clone()
            .filter(|k| !k.is_empty())
            .ok_or_else(|| {
                WardenError::Config(
                    "agent API key missing: set agents.api_key or CURSOR_API_KEY".into(),
                )
            })?;

        let raw = config.base_url.as_deref().unwrap_or(DEFAULT_BASE_URL);
        let base_url = Url::parse(raw.trim_end_matches('/'))
            .map_err(|e| WardenError::Config(format!("invalid agents.base_url {raw}: {e}")))?;
        if base_url.cannot_be_a_base() {
            return Err(WardenError::Config(format!("invalid agents.base_url {raw}")));
        }

        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .user_agent("warden")
            .build()
            .map_err(|e| WardenError::Config(format!("failed to create HTTP client: {e}")))?;

        Ok(Self {
            http,
            base_url,
            api_key,
            config: config.clone(),
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// `base_url` followed by `segments`, each percent-encoded.
    fn endpoint(&self, segments: &[&str]) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty();
            path.extend(segments);
        }
        url
    }

    /// Branch for a new agent: the configured fixed branch, else
    /// `<slug>-<hex>`, else `feat/agent-<hex>`.
    fn branch_name(&self, slug: Option<&str>) -> String {
        if let Some(branch) = self.config.target_branch.as_deref().filter(|b| !b.is_empty()) {
            return branch.to_string();
        }
        match slug.filter(|s| !s.is_empty()) {
            Some(slug) => format!("{slug}-{}", random_hex()),
            None => format!("feat/agent-{}", random_hex()),
        }
    }

    async fn send<T: DeserializeOwned>(
        &self,
        request: reqwest::RequestBuilder,
    ) -> Result<T, WardenError> {
        let response = request
            .bearer_auth(&self.api_key)
            .send()
            .await
            .map_err(transport)?;

        let status = response.status();
        let body = response.text().await.map_err(transport)?;
        if !status.is_success() {
            return Err(WardenError::api(Service::Agents, status.as_u16(), body));
        }
        Ok(serde_json::from_str(&body)?)
    }
}

fn transport(e: reqwest::Error) -> WardenError {
    WardenError::unavailable(Service::Agents, e.to_string())
}

fn random_hex() -> String {
    let id = uuid::Uuid::new_v4().simple().to_string();
    id[..4].to_string()
}

#[async_trait]
impl AgentGateway for AgentClient {
    async fn list_agents(
        &self,
        limit: usize,
        cursor: Option<&str>,
    ) -> Result<AgentPage, WardenError> {
        let mut request = self
            .http
            .get(self.endpoint(&["agents"]))
            .query(&[("limit", limit.to_string())]);
        if let Some(cursor) = cursor {
            request = request.query(&[("cursor", cursor)]);
        }
        self.send(request).await
    }

    async fn get_agent(&self, id: &str) -> Result<Agent, WardenError> {
        self.send(self.http.get(self.endpoint(&["agents", id]))).await
    }

    async fn launch_agent_with_defaults(
        &self,
        req: LaunchRequest,
    ) -> Result<Agent, WardenError> {
        let branch = self.branch_name(req.branch_slug.as_deref());
        let git_ref = req
            .git_ref
            .as_deref()
            .filter(|r| !r.is_empty())
            .unwrap_or("main");
        let webhook = self.config.webhook_url.as_deref().map(|url| WebhookBody {
            url,
            secret: self.config.webhook_secret.as_deref(),
        });

        tracing::debug!(
            repository = %req.repository,
            git_ref,
            branch = %branch,
            model = %self.config.model,
            webhook = webhook.is_some(),
            "launching agent"
        );

        let body = LaunchBody {
            prompt: PromptBody {
                text: &req.prompt_text,
            },
            source: SourceBody {
                repository: &req.repository,
                git_ref,
            },
            model: &self.config.model,
            target: TargetBody {
                auto_create_pr: true,
                branch_name: &branch,
            },
            webhook,
        };
        let agent: Agent = self
            .send(self.http.post(self.endpoint(&["agents"])).json(&body))
            .await?;
        tracing::info!(agent_id = %agent.id, branch = %agent.branch(), "launched agent");
        Ok(agent)
    }

    async fn send_followup(&self, id: &str, text: &str) -> Result<FollowupAck, WardenError> {
        tracing::debug!(agent_id = id, "sending followup");
        let body = FollowupBody {
            prompt: PromptBody { text },
        };
        self.send(
            self.http
                .post(self.endpoint(&["agents", id, "followup"]))
                .json(&body),
        )
        .await
    }
}
