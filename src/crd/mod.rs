pub mod policy;

pub use policy::{ForgePolicy, ForgePolicySpec, ForgePolicyStatus, PoolDescriptor};
