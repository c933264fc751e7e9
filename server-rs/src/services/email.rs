use serde_json::{json, Value};

use crate::config::EmailConfig;
use crate::error::{AppError, AppResult};

#[derive(Clone)]
pub struct EmailClient {
    api_key: String,
    from: String,
    client: reqwest::Client,
}

impl EmailClient {
    pub fn new(config: &Option<EmailConfig>) -> Option<Self> {
        let config = config.as_ref()?;
        Some(Self {
            api_key: config.api_key.clone(),
            from: config.from.clone(),
            client: reqwest::Client::new(),
        })
    }

    pub async fn send(&self, to: &str, subject: &str, html: &str) -> AppResult<Value> {
        let resp = self
            .client
            .post("https://api.resend.com/emails")
            .bearer_auth(&self.api_key)
            .json(&json!({
                "from": self.from,
                "to": [to],
                "subject": subject,
                "html": html,
            }))
            .send()
            .await
            .map_err(|e| AppError::Internal(format!("Email request failed: {}", e)))?;

        let status = resp.status();
        let body: Value = resp.json().await.unwrap_or(Value::Null);
        if !status.is_success() {
            let msg = body["message"].as_str().unwrap_or("Unknown email error");
            return Err(AppError::Internal(format!("Email error: {}", msg)));
        }
        Ok(body)
    }
}

pub fn invitation_email(org_name: &str, role: &str, accept_url: &str) -> (String, String) {
    let subject = format!("You're invited to join {org_name} on TallyRoster");
    let html = format!(
        "<p>You have been invited to join <strong>{}</strong> as a {}.</p>\
         <p><a href=\"{}\">Accept the invitation</a>. The link expires in 7 days.</p>",
        escape_html(org_name),
        escape_html(role),
        accept_url
    );
    (subject, html)
}

pub fn welcome_email(org_name: &str, site_url: &str) -> (String, String) {
    let subject = format!("Welcome to TallyRoster, {org_name}");
    let html = format!(
        "<p>Your site for <strong>{}</strong> is live at <a href=\"{}\">{}</a>.</p>",
        escape_html(org_name),
        site_url,
        site_url
    );
    (subject, html)
}

fn escape_html(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invitation_escapes_org_name() {
        let (subject, html) =
            invitation_email("<Eagles & Co>", "coach", "https://tallyroster.com/invite/abc");
        assert_eq!(subject, "You're invited to join <Eagles & Co> on TallyRoster");
        assert!(html.contains("&lt;Eagles &amp; Co&gt;"));
        assert!(html.contains("https://tallyroster.com/invite/abc"));
    }
}
