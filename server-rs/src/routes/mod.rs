pub mod auth;
pub mod billing;
pub mod content;
pub mod domains;
pub mod health;
pub mod marketing;
pub mod members;
pub mod onboarding;
pub mod organizations;
pub mod roster;
pub mod schedule;
pub mod sites;
pub mod uploads;
pub mod webhooks;
