use crate::config::StripeConfig;
use crate::error::{AppError, AppResult};
use serde_json::Value;

/// Stripe client over raw form-encoded HTTP calls.
#[derive(Clone)]
pub struct StripeClient {
    secret_key: String,
    webhook_secret: String,
    pub price_starter: String,
    pub price_pro: String,
    pub trial_days: u32,
    client: reqwest::Client,
}

impl StripeClient {
    pub fn new(config: &Option<StripeConfig>) -> Option<Self> {
        let config = config.as_ref()?;
        Some(Self {
            secret_key: config.secret_key.clone(),
            webhook_secret: config.webhook_secret.clone(),
            price_starter: config.price_starter.clone(),
            price_pro: config.price_pro.clone(),
            trial_days: config.trial_days,
            client: reqwest::Client::new(),
        })
    }

    async fn post(&self, path: &str, params: &[(&str, &str)]) -> AppResult<Value> {
        let url = format!("https://api.stripe.com/v1{}", path);
        let resp = self
            .client
            .post(&url)
            .basic_auth(&self.secret_key, Option::<&str>::None)
            .form(params)
            .send()
            .await
            .map_err(|e| AppError::Internal(format!("Stripe request failed: {}", e)))?;
        Self::parse(resp).await
    }

    async fn get(&self, path: &str) -> AppResult<Value> {
        let url = format!("https://api.stripe.com/v1{}", path);
        let resp = self
            .client
            .get(&url)
            .basic_auth(&self.secret_key, Option::<&str>::None)
            .send()
            .await
            .map_err(|e| AppError::Internal(format!("Stripe request failed: {}", e)))?;
        Self::parse(resp).await
    }

    async fn parse(resp: reqwest::Response) -> AppResult<Value> {
        let status = resp.status();
        let body: Value = resp
            .json()
            .await
            .map_err(|e| AppError::Internal(format!("Stripe response parse failed: {}", e)))?;

        if !status.is_success() {
            let msg = body["error"]["message"]
                .as_str()
                .unwrap_or("Unknown Stripe error");
            return Err(AppError::Internal(format!("Stripe error: {}", msg)));
        }
        Ok(body)
    }

    pub fn price_for_plan(&self, plan: &str) -> Option<&str> {
        let price = match plan {
            "starter" => &self.price_starter,
            "pro" => &self.price_pro,
            _ => return None,
        };
        (!price.is_empty()).then_some(price.as_str())
    }

    pub async fn create_customer(
        &self,
        email: &str,
        name: &str,
        org_id: &str,
    ) -> AppResult<Value> {
        self.post(
            "/customers",
            &[
                ("email", email),
                ("name", name),
                ("metadata[organizationId]", org_id),
            ],
        )
        .await
    }

    pub async fn create_checkout_session(
        &self,
        customer_id: &str,
        price_id: &str,
        org_id: &str,
        success_url: &str,
        cancel_url: &str,
    ) -> AppResult<Value> {
        let trial = self.trial_days.to_string();
        let mut params: Vec<(&str, &str)> = vec![
            ("mode", "subscription"),
            ("customer", customer_id),
            ("line_items[0][price]", price_id),
            ("line_items[0][quantity]", "1"),
            ("success_url", success_url),
            ("cancel_url", cancel_url),
            ("client_reference_id", org_id),
            ("metadata[organizationId]", org_id),
            ("subscription_data[metadata][organizationId]", org_id),
        ];
        if self.trial_days > 0 {
            params.push(("subscription_data[trial_period_days]", &trial));
        }
        self.post("/checkout/sessions", &params).await
    }

    pub async fn get_subscription(&self, subscription_id: &str) -> AppResult<Value> {
        self.get(&format!("/subscriptions/{}", subscription_id))
            .await
    }

    pub async fn create_billing_portal(
        &self,
        customer_id: &str,
        return_url: &str,
    ) -> AppResult<Value> {
        self.post(
            "/billing_portal/sessions",
            &[("customer", customer_id), ("return_url", return_url)],
        )
        .await
    }

    pub fn verify_webhook_signature(
        &self,
        payload: &[u8],
        signature_header: &str,
    ) -> AppResult<Value> {
        verify_signature(
            &self.webhook_secret,
            payload,
            signature_header,
            chrono::Utc::now().timestamp(),
        )
    }
}

const WEBHOOK_TOLERANCE_SECS: i64 = 300;

fn verify_signature(
    secret: &str,
    payload: &[u8],
    signature_header: &str,
    now: i64,
) -> AppResult<Value> {
    use hmac::{Hmac, Mac};
    use sha2::Sha256;

    type HmacSha256 = Hmac<Sha256>;

    // Header format: t=timestamp,v1=signature[,v1=...]
    let mut timestamp = "";
    let mut signatures = Vec::new();
    for part in signature_header.split(',') {
        match part.trim().split_once('=') {
            Some(("t", v)) => timestamp = v,
            Some(("v1", v)) => signatures.push(v),
            _ => {}
        }
    }

    if timestamp.is_empty() || signatures.is_empty() {
        return Err(AppError::BadRequest("Invalid Stripe signature".into()));
    }

    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|_| AppError::Internal("HMAC key error".into()))?;
    mac.update(timestamp.as_bytes());
    mac.update(b".");
    mac.update(payload);

    let expected = hex::encode(mac.finalize().into_bytes());
    if !signatures.iter().any(|s| *s == expected) {
        return Err(AppError::BadRequest(
            "Webhook signature verification failed".into(),
        ));
    }

    let ts: i64 = timestamp.parse().unwrap_or(0);
    if (now - ts).abs() > WEBHOOK_TOLERANCE_SECS {
        return Err(AppError::BadRequest("Webhook timestamp too old".into()));
    }

    serde_json::from_slice(payload)
        .map_err(|e| AppError::BadRequest(format!("Invalid webhook payload: {}", e)))
}
