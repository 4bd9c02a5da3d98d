//! RBAC Module
//!
//! Rights granted to users through roles, with only-own scoping

pub mod policy;
pub mod registry;
pub mod enforcer;

pub use policy::{Action, Decision, Model, NewRight, Right, RightId, RightSet, Role, RoleId, UserId};
pub use registry::RightsRegistry;
pub use enforcer::{AuthContext, Enforcer};
