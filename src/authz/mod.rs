//! Permission resolution for the admin portal.
//!
//! A [`PermissionSession`] is bound to one authenticated session. On the
//! first check after sign-in it loads the user's role assignment and the
//! role's grants through a [`PermissionGateway`], caches the result until the
//! identity changes, and answers `can_*` questions from it:
//! - grants are `(profile, module, function)` triples; absence means denied
//! - every failure path answers "denied"
//! - `SUPER_ADMIN` is a profile-code check; guards OR it in, the grant
//!   queries never do

mod cache;
mod catalog;
mod facade;
mod gateway;
mod guard;
mod identity;
mod resolution;
mod session;

#[cfg(test)]
pub(crate) mod testing;

pub use cache::PermissionCache;
pub use catalog::{Catalog, Function, LazyCatalog, Module};
pub use gateway::{GatewayError, Grant, PermissionGateway, RoleAssignment};
pub use guard::{GuardDecision, ModuleAccess, PermissionGuard};
pub use identity::{AuthEvent, Identity};
pub use resolution::{DenyReason, Resolution, ResolvedPermissions};
pub use session::PermissionSession;

/// Profile code treated as all-privileged by guards.
pub const SUPER_ADMIN: &str = "SUPER_ADMIN";
