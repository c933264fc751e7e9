pub mod auth;
pub mod host_routing;
pub mod membership;
pub mod rate_limit;
