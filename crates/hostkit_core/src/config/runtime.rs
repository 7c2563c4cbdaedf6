//! Process-wide runtime values captured from the host.

use crate::namespace::SymbolTable;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

/// Host preference key for the logged-in account id.
pub const PREF_LOGIN_ACCOUNT_ID: &str = "login_account_id";
/// Host preference key for the last login display name.
pub const PREF_LAST_LOGIN_NICKNAME: &str = "last_login_nickname";
/// Host preference key for the login user name.
pub const PREF_LOGIN_USER_NAME: &str = "login_user_name";
/// Host preference key for the last login numeric id.
pub const PREF_LAST_LOGIN_UIN: &str = "last_login_uin";

#[derive(Default)]
struct RuntimeState {
    host_namespace: Option<Arc<SymbolTable>>,
    host_version_name: Option<String>,
    host_version_code: i64,
    login_account_id: Option<String>,
    last_login_nickname: Option<String>,
    login_user_name: Option<String>,
    last_login_uin: Option<String>,
    launcher_resumed: bool,
}

/// Key/value holder with plain getters and setters. No validation.
#[derive(Default)]
pub struct RuntimeConfig {
    state: RwLock<RuntimeState>,
}

impl RuntimeConfig {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, RuntimeState> {
        self.state.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, RuntimeState> {
        self.state
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn host_namespace(&self) -> Option<Arc<SymbolTable>> {
        self.read().host_namespace.clone()
    }

    pub fn set_host_namespace(&self, namespace: Arc<SymbolTable>) {
        self.write().host_namespace = Some(namespace);
    }

    pub fn host_version_name(&self) -> Option<String> {
        self.read().host_version_name.clone()
    }

    pub fn set_host_version_name(&self, value: impl Into<String>) {
        self.write().host_version_name = Some(value.into());
    }

    pub fn host_version_code(&self) -> i64 {
        self.read().host_version_code
    }

    pub fn set_host_version_code(&self, value: i64) {
        self.write().host_version_code = value;
    }

    pub fn login_account_id(&self) -> Option<String> {
        self.read().login_account_id.clone()
    }

    pub fn set_login_account_id(&self, value: impl Into<String>) {
        self.write().login_account_id = Some(value.into());
    }

    pub fn last_login_nickname(&self) -> Option<String> {
        self.read().last_login_nickname.clone()
    }

    pub fn set_last_login_nickname(&self, value: impl Into<String>) {
        self.write().last_login_nickname = Some(value.into());
    }

    pub fn login_user_name(&self) -> Option<String> {
        self.read().login_user_name.clone()
    }

    pub fn set_login_user_name(&self, value: impl Into<String>) {
        self.write().login_user_name = Some(value.into());
    }

    pub fn last_login_uin(&self) -> Option<String> {
        self.read().last_login_uin.clone()
    }

    pub fn set_last_login_uin(&self, value: impl Into<String>) {
        self.write().last_login_uin = Some(value.into());
    }

    /// Whether the launcher screen has resumed at least once.
    pub fn launcher_resumed(&self) -> bool {
        self.read().launcher_resumed
    }

    pub fn set_launcher_resumed(&self) {
        self.write().launcher_resumed = true;
    }
}

#[cfg(test)]
mod tests {
    use super::RuntimeConfig;

    #[test]
    fn stores_and_returns_values() {
        let config = RuntimeConfig::new();
        assert!(config.host_version_name().is_none());
        config.set_host_version_name("8.0.65");
        config.set_host_version_code(2960);
        config.set_last_login_uin("0");
        assert_eq!(config.host_version_name().as_deref(), Some("8.0.65"));
        assert_eq!(config.host_version_code(), 2960);
        assert_eq!(config.last_login_uin().as_deref(), Some("0"));
        assert!(!config.launcher_resumed());
        config.set_launcher_resumed();
        assert!(config.launcher_resumed());
    }
}
