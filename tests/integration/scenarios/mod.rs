mod lease_takeover;
mod policy_reconciliation;

pub use lease_takeover::LeaseTakeoverScenario;
pub use policy_reconciliation::PolicyReconciliationScenario;
