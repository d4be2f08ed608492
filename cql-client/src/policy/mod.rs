//! Host ordering and reconnection delay policies.

mod load_balancing;
mod reconnection;

pub use load_balancing::{
    default_load_balancing_policy, LoadBalancingPolicy, QueryPlan, RoundRobinPolicy,
};
pub use reconnection::{
    ConstantReconnectionPolicy, ExponentialReconnectionPolicy, ReconnectionPolicy,
    ReconnectionSchedule,
};
