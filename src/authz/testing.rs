use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::Notify;
use uuid::Uuid;

use super::catalog::{Function, Module};
use super::gateway::{GatewayError, Grant, PermissionGateway, RoleAssignment};

/// In-memory gateway with lookup counters and an optional gate that parks
/// role lookups until released.
#[derive(Default)]
pub struct StubGateway {
    assignments: Mutex<HashMap<Uuid, RoleAssignment>>,
    grants: Mutex<HashMap<Uuid, Vec<Grant>>>,
    modules: Mutex<HashMap<String, Uuid>>,
    functions: Mutex<HashMap<String, Uuid>>,
    role_lookups: AtomicUsize,
    grant_lookups: AtomicUsize,
    module_lookups: AtomicUsize,
    fail_roles: AtomicBool,
    fail_grants: AtomicBool,
    fail_catalog: AtomicBool,
    gated: AtomicBool,
    pub entered: Arc<Notify>,
    pub release: Arc<Notify>,
}

impl StubGateway {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers every module and function of the closed catalog.
    pub fn with_full_catalog() -> Self {
        let gateway = Self::new();
        for module in <Module as strum::IntoEnumIterator>::iter() {
            gateway.add_module(module);
        }
        for function in <Function as strum::IntoEnumIterator>::iter() {
            gateway.add_function(function);
        }
        gateway
    }

    pub fn add_module(&self, module: Module) -> Uuid {
        let id = Uuid::new_v4();
        self.modules.lock().unwrap().insert(module.name().to_string(), id);
        id
    }

    pub fn add_function(&self, function: Function) -> Uuid {
        let id = Uuid::new_v4();
        self.functions.lock().unwrap().insert(function.slug().to_string(), id);
        id
    }

    pub fn module(&self, module: Module) -> Uuid {
        self.modules.lock().unwrap()[module.name()]
    }

    pub fn function(&self, function: Function) -> Uuid {
        self.functions.lock().unwrap()[function.slug()]
    }

    /// Assigns a fresh profile with `code` to `user_id` and returns its id.
    pub fn assign(&self, user_id: Uuid, code: &str) -> Uuid {
        let profile_id = Uuid::new_v4();
        self.assignments.lock().unwrap().insert(
            user_id,
            RoleAssignment {
                profile_id,
                profile_code: code.to_string(),
            },
        );
        profile_id
    }

    pub fn grant(&self, profile_id: Uuid, module: Module, function: Function) {
        let grant = Grant {
            module_id: self.module(module),
            function_id: self.function(function),
        };
        self.grants.lock().unwrap().entry(profile_id).or_default().push(grant);
    }

    pub fn fail_roles(&self, fail: bool) {
        self.fail_roles.store(fail, Ordering::SeqCst);
    }

    pub fn fail_grants(&self, fail: bool) {
        self.fail_grants.store(fail, Ordering::SeqCst);
    }

    pub fn fail_catalog(&self, fail: bool) {
        self.fail_catalog.store(fail, Ordering::SeqCst);
    }

    pub fn gate(&self, gated: bool) {
        self.gated.store(gated, Ordering::SeqCst);
    }

    pub fn role_lookups(&self) -> usize {
        self.role_lookups.load(Ordering::SeqCst)
    }

    pub fn grant_lookups(&self) -> usize {
        self.grant_lookups.load(Ordering::SeqCst)
    }

    pub fn module_lookups(&self) -> usize {
        self.module_lookups.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PermissionGateway for StubGateway {
    async fn find_role_assignment(&self, user_id: Uuid) -> Result<Option<RoleAssignment>, GatewayError> {
        self.role_lookups.fetch_add(1, Ordering::SeqCst);
        if self.gated.load(Ordering::SeqCst) {
            self.entered.notify_one();
            self.release.notified().await;
        }
        if self.fail_roles.load(Ordering::SeqCst) {
            return Err(GatewayError::malformed("role lookup failed"));
        }
        Ok(self.assignments.lock().unwrap().get(&user_id).cloned())
    }

    async fn list_grants(&self, profile_id: Uuid) -> Result<Vec<Grant>, GatewayError> {
        self.grant_lookups.fetch_add(1, Ordering::SeqCst);
        if self.fail_grants.load(Ordering::SeqCst) {
            return Err(GatewayError::malformed("grant lookup failed"));
        }
        Ok(self.grants.lock().unwrap().get(&profile_id).cloned().unwrap_or_default())
    }

    async fn find_module_id(&self, name: &str) -> Result<Option<Uuid>, GatewayError> {
        self.module_lookups.fetch_add(1, Ordering::SeqCst);
        if self.fail_catalog.load(Ordering::SeqCst) {
            return Err(GatewayError::malformed("module lookup failed"));
        }
        Ok(self.modules.lock().unwrap().get(name).copied())
    }

    async fn find_function_id(&self, slug: &str) -> Result<Option<Uuid>, GatewayError> {
        if self.fail_catalog.load(Ordering::SeqCst) {
            return Err(GatewayError::malformed("function lookup failed"));
        }
        Ok(self.functions.lock().unwrap().get(slug).copied())
    }
}
