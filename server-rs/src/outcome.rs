use serde::Serialize;
use std::fmt;

/// Side effects whose failure must never fail the primary transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SideEffect {
    DomainRegistration,
    DomainRemoval,
    SslProvisioning,
    BillingCustomer,
    InvitationEmail,
    WelcomeEmail,
}

impl fmt::Display for SideEffect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SideEffect::DomainRegistration => "domain registration",
            SideEffect::DomainRemoval => "domain removal",
            SideEffect::SslProvisioning => "SSL provisioning",
            SideEffect::BillingCustomer => "billing customer setup",
            SideEffect::InvitationEmail => "invitation email",
            SideEffect::WelcomeEmail => "welcome email",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SideEffectFailure {
    pub effect: SideEffect,
    pub message: String,
}

/// Result of an operation whose primary transition succeeded, together
/// with any best-effort side effects that did not.
#[derive(Debug)]
pub struct Outcome<T> {
    pub value: T,
    pub side_effects: Vec<SideEffectFailure>,
}

impl<T> Outcome<T> {
    pub fn new(value: T) -> Self {
        Self {
            value,
            side_effects: Vec::new(),
        }
    }

    pub fn record<U, E: fmt::Display>(&mut self, effect: SideEffect, result: Result<U, E>) {
        if let Err(e) = result {
            tracing::warn!(%effect, error = %e, "Non-critical side effect failed");
            self.side_effects.push(SideEffectFailure {
                effect,
                message: e.to_string(),
            });
        }
    }

    /// Records the effect only when its integration is configured.
    pub fn record_optional<U, E: fmt::Display>(
        &mut self,
        effect: SideEffect,
        result: Option<Result<U, E>>,
    ) {
        match result {
            Some(result) => self.record(effect, result),
            None => tracing::debug!(%effect, "Skipped side effect: integration not configured"),
        }
    }

    pub fn is_clean(&self) -> bool {
        self.side_effects.is_empty()
    }

    pub fn warnings(&self) -> Vec<String> {
        self.side_effects
            .iter()
            .map(|f| format!("{} failed: {}", f.effect, f.message))
            .collect()
    }
}
