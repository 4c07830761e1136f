//! Closed set of modules and functions permissions are scoped to.
//!
//! The display names and slugs below are the strings stored in the
//! `modules.name` and `functions.slug` columns. They are only parsed at the
//! boundary; the rest of the crate works with the enums and the ids the
//! [`Catalog`] resolved for them.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumIter, EnumString, IntoEnumIterator, IntoStaticStr};
use tokio::sync::OnceCell;
use utoipa::ToSchema;
use uuid::Uuid;

use super::gateway::{GatewayError, PermissionGateway};

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema,
    Display, EnumString, EnumIter, AsRefStr, IntoStaticStr,
)]
pub enum Module {
    #[strum(serialize = "Ministérios")]
    #[serde(rename = "Ministérios")]
    Ministries,
    #[strum(serialize = "Membros")]
    #[serde(rename = "Membros")]
    Members,
    #[strum(serialize = "Células")]
    #[serde(rename = "Células")]
    Cells,
    #[strum(serialize = "Eventos")]
    #[serde(rename = "Eventos")]
    Events,
    #[strum(serialize = "Voluntários")]
    #[serde(rename = "Voluntários")]
    Volunteers,
    #[strum(serialize = "Financeiro")]
    #[serde(rename = "Financeiro")]
    Finance,
    #[strum(serialize = "Avisos")]
    #[serde(rename = "Avisos")]
    Notices,
    #[strum(serialize = "Perfis")]
    #[serde(rename = "Perfis")]
    Profiles,
    #[strum(serialize = "Usuários")]
    #[serde(rename = "Usuários")]
    Users,
    #[strum(serialize = "Configurações")]
    #[serde(rename = "Configurações")]
    Settings,
    #[strum(serialize = "Relatórios")]
    #[serde(rename = "Relatórios")]
    Reports,
}

impl Module {
    /// Display name as stored in `modules.name`.
    pub fn name(self) -> &'static str {
        self.into()
    }
}

/// Action kind a grant is scoped to.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema,
    Display, EnumString, EnumIter, AsRefStr, IntoStaticStr,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum Function {
    Read,
    Create,
    Update,
    Delete,
    Report,
}

impl Function {
    pub fn slug(self) -> &'static str {
        self.into()
    }
}

/// Database ids of the modules and functions known to this build.
///
/// A variant with no matching row is absent; checks against it deny.
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    modules: HashMap<Module, Uuid>,
    functions: HashMap<Function, Uuid>,
}

impl Catalog {
    pub async fn resolve(gateway: &dyn PermissionGateway) -> Result<Self, GatewayError> {
        let mut catalog = Catalog::default();

        for module in Module::iter() {
            match gateway.find_module_id(module.name()).await? {
                Some(id) => {
                    catalog.modules.insert(module, id);
                }
                None => tracing::warn!(module = %module, "module missing from catalog"),
            }
        }

        for function in Function::iter() {
            match gateway.find_function_id(function.slug()).await? {
                Some(id) => {
                    catalog.functions.insert(function, id);
                }
                None => tracing::warn!(function = %function, "function missing from catalog"),
            }
        }

        tracing::debug!(
            modules = catalog.modules.len(),
            functions = catalog.functions.len(),
            "permission catalog resolved"
        );

        Ok(catalog)
    }

    pub fn module_id(&self, module: Module) -> Option<Uuid> {
        self.modules.get(&module).copied()
    }

    pub fn function_id(&self, function: Function) -> Option<Uuid> {
        self.functions.get(&function).copied()
    }
}

/// Catalog shared by every session, resolved on first use.
///
/// A failed resolution is not memoized, so the next check tries again.
#[derive(Debug, Default)]
pub struct LazyCatalog {
    cell: OnceCell<Catalog>,
}

impl LazyCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn get(&self, gateway: &dyn PermissionGateway) -> Result<&Catalog, GatewayError> {
        self.cell.get_or_try_init(|| Catalog::resolve(gateway)).await
    }

    pub fn is_resolved(&self) -> bool {
        self.cell.initialized()
    }
}
