use async_trait::async_trait;
use serde_json::{json, Value};

use crate::config::VercelConfig;
use crate::error::{AppError, AppResult};

const API_BASE: &str = "https://api.vercel.com";

/// Domain operations the custom domain workflow needs from the hosting
/// platform. Every call is best-effort from the workflow's point of view.
#[async_trait]
pub trait HostingPlatform: Send + Sync + 'static {
    async fn add_domain(&self, domain: &str) -> AppResult<()>;

    async fn remove_domain(&self, domain: &str) -> AppResult<()>;

    /// `true` when the platform considers the domain correctly configured
    /// for certificate issuance.
    async fn check_domain_config(&self, domain: &str) -> AppResult<bool>;
}

/// Hosting platform domain API. Registering a domain on the project lets
/// the platform issue its TLS certificate.
#[derive(Clone)]
pub struct VercelClient {
    api_token: String,
    project_id: String,
    team_id: Option<String>,
    client: reqwest::Client,
}

impl VercelClient {
    pub fn new(config: &Option<VercelConfig>) -> Option<Self> {
        let config = config.as_ref()?;
        Some(Self {
            api_token: config.api_token.clone(),
            project_id: config.project_id.clone(),
            team_id: config.team_id.clone(),
            client: reqwest::Client::new(),
        })
    }

    fn url(&self, path: &str) -> String {
        match &self.team_id {
            Some(team) => format!("{API_BASE}{path}?teamId={team}"),
            None => format!("{API_BASE}{path}"),
        }
    }

    async fn send(&self, req: reqwest::RequestBuilder) -> AppResult<Value> {
        self.send_tolerating(req, None).await
    }

    async fn send_tolerating(
        &self,
        req: reqwest::RequestBuilder,
        tolerated: Option<reqwest::StatusCode>,
    ) -> AppResult<Value> {
        let resp = req
            .bearer_auth(&self.api_token)
            .send()
            .await
            .map_err(|e| AppError::Internal(format!("Vercel request failed: {}", e)))?;

        let status = resp.status();
        let body: Value = resp.json().await.unwrap_or(Value::Null);

        if !status.is_success() && Some(status) != tolerated {
            let msg = body["error"]["message"]
                .as_str()
                .unwrap_or("Unknown Vercel error");
            return Err(AppError::Internal(format!("Vercel error ({}): {}", status, msg)));
        }
        Ok(body)
    }
}

#[async_trait]
impl HostingPlatform for VercelClient {
    async fn add_domain(&self, domain: &str) -> AppResult<()> {
        let url = self.url(&format!("/v10/projects/{}/domains", self.project_id));
        // Re-adding a domain the project already owns is fine.
        self.send_tolerating(
            self.client.post(url).json(&json!({ "name": domain })),
            Some(reqwest::StatusCode::CONFLICT),
        )
        .await?;
        Ok(())
    }

    async fn remove_domain(&self, domain: &str) -> AppResult<()> {
        let url = self.url(&format!("/v9/projects/{}/domains/{}", self.project_id, domain));
        self.send(self.client.delete(url)).await?;
        Ok(())
    }

    // The platform provisions certificates on its own once DNS points at
    // it; this only reports whether it considers the domain misconfigured.
    async fn check_domain_config(&self, domain: &str) -> AppResult<bool> {
        let url = self.url(&format!("/v6/domains/{}/config", domain));
        let body = self.send(self.client.get(url)).await?;
        let misconfigured = body["misconfigured"].as_bool().unwrap_or(false);
        if misconfigured {
            tracing::warn!(domain, "Hosting platform reports domain as misconfigured");
        }
        Ok(!misconfigured)
    }
}
