//! Authorization: the principal, the policy evaluator and the per-request guard.

mod evaluator;
pub mod guard;
mod principal;

pub use evaluator::{DefaultPolicyEvaluator, PolicyEvaluator};
pub use principal::{Principal, ResourceContext};
