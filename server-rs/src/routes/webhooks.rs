use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
};
use serde_json::Value;
use uuid::Uuid;

use crate::error::AppResult;
use crate::services::stripe_service::StripeClient;
use crate::AppState;

/// Plan name for a subscription's price; unknown prices keep the
/// organization on its current plan.
fn plan_for_price<'a>(price_id: &str, stripe: &'a StripeClient) -> Option<&'a str> {
    ["starter", "pro"]
        .into_iter()
        .find(|plan| stripe.price_for_plan(plan) == Some(price_id))
}

fn organization_of(object: &Value) -> Option<Uuid> {
    object["metadata"]["organizationId"]
        .as_str()
        .or_else(|| object["client_reference_id"].as_str())
        .and_then(|id| Uuid::parse_str(id).ok())
}

async fn sync_subscription(state: &AppState, stripe: &StripeClient, sub: &Value) -> AppResult<()> {
    let status = sub["status"].as_str().unwrap_or("incomplete");
    let customer = sub["customer"].as_str().unwrap_or_default();
    let price_id = sub["items"]["data"][0]["price"]["id"].as_str().unwrap_or_default();

    let plan = match status {
        "canceled" | "incomplete_expired" => Some("free"),
        _ => plan_for_price(price_id, stripe),
    };

    let result = sqlx::query(
        r#"UPDATE organizations SET
            subscription_status = $1,
            plan = COALESCE($2, plan),
            stripe_subscription_id = $3,
            stripe_customer_id = COALESCE(stripe_customer_id, NULLIF($4, '')),
            updated_at = NOW()
        WHERE id = $5 OR (stripe_customer_id = $4 AND $4 <> '')"#,
    )
    .bind(status)
    .bind(plan)
    .bind(sub["id"].as_str())
    .bind(customer)
    .bind(organization_of(sub))
    .execute(&state.db)
    .await?;

    if result.rows_affected() == 0 {
        tracing::warn!(customer, "Subscription event for unknown organization");
    } else {
        tracing::info!(customer, status, plan, "Subscription synced");
    }
    Ok(())
}

async fn handle_event(state: &AppState, stripe: &StripeClient, event: &Value) -> AppResult<()> {
    let object = &event["data"]["object"];
    match event["type"].as_str().unwrap_or_default() {
        "customer.subscription.created"
        | "customer.subscription.updated"
        | "customer.subscription.deleted" => sync_subscription(state, stripe, object).await,
        "checkout.session.completed" | "invoice.payment_succeeded" | "invoice.payment_failed" => {
            let Some(sub_id) = object["subscription"].as_str().filter(|s| !s.is_empty()) else {
                return Ok(());
            };
            let mut sub = stripe.get_subscription(sub_id).await?;
            // Checkout sessions carry the organization even when the
            // subscription metadata does not.
            if organization_of(&sub).is_none() {
                if let Some(org) = organization_of(object) {
                    sub["metadata"]["organizationId"] = Value::String(org.to_string());
                }
            }
            sync_subscription(state, stripe, &sub).await
        }
        _ => Ok(()),
    }
}

pub async fn stripe_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<StatusCode, StatusCode> {
    let stripe = match &state.stripe {
        Some(s) => s,
        None => return Err(StatusCode::SERVICE_UNAVAILABLE),
    };

    let sig = headers
        .get("stripe-signature")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");

    let event = match stripe.verify_webhook_signature(&body, sig) {
        Ok(e) => e,
        Err(e) => {
            tracing::warn!(error = %e, "Rejected Stripe webhook");
            return Err(StatusCode::BAD_REQUEST);
        }
    };

    let event_id = event["id"].as_str().unwrap_or_default();
    let event_type = event["type"].as_str().unwrap_or_default();

    // Claim the event; a replay finds the row and is acknowledged as-is.
    let claimed = sqlx::query(
        "INSERT INTO stripe_events (id, event_type, payload, status) VALUES ($1, $2, $3, 'processing') ON CONFLICT (id) DO NOTHING",
    )
    .bind(event_id)
    .bind(event_type)
    .bind(&event)
    .execute(&state.db)
    .await
    .map_err(|e| {
        tracing::error!(error = %e, "Failed to record Stripe event");
        StatusCode::INTERNAL_SERVER_ERROR
    })?;

    if claimed.rows_affected() == 0 {
        tracing::debug!(event_id, "Duplicate Stripe event");
        return Ok(StatusCode::OK);
    }

    match handle_event(&state, stripe, &event).await {
        Ok(()) => {
            let marked = sqlx::query("UPDATE stripe_events SET status = 'processed' WHERE id = $1")
                .bind(event_id)
                .execute(&state.db)
                .await;
            // The claim row already dedupes retries; only the status is stale.
            bookkeeping_ok(marked, event_id, "mark processed");
            Ok(StatusCode::OK)
        }
        Err(e) => {
            tracing::error!(event_id, event_type, error = %e, "Stripe event processing failed");
            // Release the claim so Stripe's retry is processed.
            let released = sqlx::query("DELETE FROM stripe_events WHERE id = $1")
                .bind(event_id)
                .execute(&state.db)
                .await;
            if !bookkeeping_ok(released, event_id, "release claim") {
                tracing::error!(event_id, event_type, "Stripe retries of this event will be skipped as duplicates");
            }
            Err(StatusCode::INTERNAL_SERVER_ERROR)
        }
    }
}

fn bookkeeping_ok<T>(result: Result<T, sqlx::Error>, event_id: &str, action: &str) -> bool {
    match result {
        Ok(_) => true,
        Err(e) => {
            tracing::error!(event_id, action, error = %e, "Stripe event bookkeeping failed");
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StripeConfig;
    use serde_json::json;

    fn client() -> StripeClient {
        StripeClient::new(&Some(StripeConfig {
            secret_key: "sk_test".into(),
            webhook_secret: "whsec".into(),
            price_starter: "price_s".into(),
            price_pro: "price_p".into(),
            trial_days: 14,
        }))
        .unwrap()
    }

    #[test]
    fn maps_prices_to_plans() {
        let stripe = client();
        assert_eq!(plan_for_price("price_s", &stripe), Some("starter"));
        assert_eq!(plan_for_price("price_p", &stripe), Some("pro"));
        assert_eq!(plan_for_price("price_other", &stripe), None);
        assert_eq!(plan_for_price("", &stripe), None);
    }

    #[test]
    fn finds_organization_in_metadata_or_reference() {
        let id = Uuid::new_v4();
        assert_eq!(organization_of(&json!({"metadata": {"organizationId": id.to_string()}})), Some(id));
        assert_eq!(organization_of(&json!({"client_reference_id": id.to_string()})), Some(id));
        assert_eq!(organization_of(&json!({"metadata": {}})), None);
    }

    #[test]
    fn bookkeeping_failures_are_reported() {
        assert!(bookkeeping_ok(Ok::<_, sqlx::Error>(()), "evt_1", "mark processed"));
        assert!(!bookkeeping_ok::<()>(Err(sqlx::Error::PoolTimedOut), "evt_1", "release claim"));
    }
}
