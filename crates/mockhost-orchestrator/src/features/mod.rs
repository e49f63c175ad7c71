pub mod observability;
pub mod provisioning;
pub mod readiness;
