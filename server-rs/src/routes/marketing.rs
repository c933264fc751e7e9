use axum::{extract::State, Json};
use serde_json::{json, Value};

use crate::error::{AppError, AppResult};
use crate::AppState;

fn plans(state: &AppState) -> Value {
    let trial_days = state.stripe.as_ref().map(|s| s.trial_days).unwrap_or(0);
    let purchasable = |plan: &str| {
        state
            .stripe
            .as_ref()
            .is_some_and(|s| s.price_for_plan(plan).is_some())
    };

    json!([
        {
            "id": "free",
            "name": "Free",
            "features": ["1 team", "Public team site", "Schedule and scores"],
            "purchasable": false,
        },
        {
            "id": "starter",
            "name": "Starter",
            "features": ["Unlimited teams", "Blog and sponsors", "Image uploads"],
            "trialDays": trial_days,
            "purchasable": purchasable("starter"),
        },
        {
            "id": "pro",
            "name": "Pro",
            "features": ["Everything in Starter", "Custom domain", "Priority support"],
            "trialDays": trial_days,
            "purchasable": purchasable("pro"),
        },
    ])
}

pub async fn home(State(state): State<AppState>) -> AppResult<Json<Value>> {
    let routing = &state.config.routing;
    Ok(Json(json!({
        "product": routing.product_slug,
        "tagline": "Websites, rosters and schedules for youth sports clubs",
        "signupUrl": format!("{}onboarding", routing.root_url()),
        "dashboardUrl": format!("{}dashboard", routing.root_url()),
    })))
}

pub async fn pricing(State(state): State<AppState>) -> AppResult<Json<Value>> {
    Ok(Json(json!({ "plans": plans(&state) })))
}

pub async fn not_found() -> AppError {
    AppError::NotFound("Page not found".into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::dns::fake::StaticResolver;
    use crate::store::memory::MemoryTenantStore;
    use crate::test_support;

    #[tokio::test]
    async fn plans_are_not_purchasable_without_billing() {
        let state = test_support::state(MemoryTenantStore::new(), StaticResolver::new(), true);
        let Json(body) = pricing(State(state)).await.unwrap();
        let plans = body["plans"].as_array().unwrap();
        assert_eq!(plans.len(), 3);
        assert!(plans.iter().all(|p| p["purchasable"] == false));
    }
}
