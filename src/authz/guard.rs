use serde::Serialize;
use utoipa::ToSchema;

use super::catalog::Function;
use super::session::PermissionSession;
use crate::errors::AppError;

/// Everything a screen needs to know about one module.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, ToSchema)]
pub struct ModuleAccess {
    #[schema(example = "Membros")]
    pub module: String,
    pub read: bool,
    pub create: bool,
    pub update: bool,
    pub delete: bool,
    pub report: bool,
    pub is_super_admin: bool,
}

impl ModuleAccess {
    /// Evaluates every function and the super-admin flag concurrently.
    pub async fn load(session: &PermissionSession, module_name: &str) -> Self {
        let (read, create, update, delete, report, is_super_admin) = tokio::join!(
            session.can_read(module_name),
            session.can_create(module_name),
            session.can_update(module_name),
            session.can_delete(module_name),
            session.can_report(module_name),
            session.is_super_admin(),
        );

        Self {
            module: module_name.to_string(),
            read,
            create,
            update,
            delete,
            report,
            is_super_admin,
        }
    }

    pub fn allows(&self, function: Function) -> bool {
        match function {
            Function::Read => self.read,
            Function::Create => self.create,
            Function::Update => self.update,
            Function::Delete => self.delete,
            Function::Report => self.report,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum GuardDecision {
    /// The profile holds the grant.
    Granted,
    /// Allowed through the super-admin bypass.
    SuperAdmin,
    Denied,
}

impl GuardDecision {
    pub fn is_allowed(self) -> bool {
        !matches!(self, GuardDecision::Denied)
    }
}

/// Gate for one action on one module. Super-admins pass unless the bypass
/// is switched off.
#[derive(Debug, Clone)]
pub struct PermissionGuard {
    module_name: String,
    action: Function,
    allow_super_admin: bool,
}

impl PermissionGuard {
    pub fn new(module_name: impl Into<String>, action: Function) -> Self {
        Self {
            module_name: module_name.into(),
            action,
            allow_super_admin: true,
        }
    }

    pub fn allow_super_admin(mut self, allow: bool) -> Self {
        self.allow_super_admin = allow;
        self
    }

    pub async fn check(&self, session: &PermissionSession) -> GuardDecision {
        let access = ModuleAccess::load(session, &self.module_name).await;
        self.decide(&access)
    }

    pub fn decide(&self, access: &ModuleAccess) -> GuardDecision {
        if self.allow_super_admin && access.is_super_admin {
            return GuardDecision::SuperAdmin;
        }

        if access.allows(self.action) {
            GuardDecision::Granted
        } else {
            GuardDecision::Denied
        }
    }

    /// Like [`check`](Self::check) but turns a denial into `Forbidden`.
    pub async fn enforce(&self, session: &PermissionSession) -> Result<GuardDecision, AppError> {
        let decision = self.check(session).await;
        if decision.is_allowed() {
            return Ok(decision);
        }

        let action = match self.action {
            Function::Report => "generate reports",
            other => other.slug(),
        };
        Err(AppError::forbidden(format!(
            "you do not have permission to {action} in module {}",
            self.module_name
        )))
    }
}
