//! Layered boot configuration plus the database-backed `ConfigPlanStore`
//! (C10) runtime configuration layer.

mod boot;
mod plan_store;
mod secrets;

pub use boot::{load_layered_yaml, LoadedConfig};
pub use plan_store::{ConfigPlan, ConfigPlanStore};
pub use secrets::{resolve_secrets, ResolvedSecrets};
