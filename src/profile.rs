//! Profile registry.
//!
//! Profiles are immutable once registered; `configure` replaces the
//! whole map atomically so a lookup never observes a half-updated
//! registry.

use std::collections::HashMap;
use std::sync::{Arc, OnceLock};

use parking_lot::RwLock;

use crate::error::{SandboxError, SandboxResult};

/// A named bundle of image + default command + user + network/read-only
/// disposition. Registered at configuration time; never mutated after.
#[derive(Debug, Clone)]
pub struct Profile {
    pub name: String,
    pub image: String,
    pub default_command: Option<String>,
    pub user: String,
    pub read_only: bool,
    pub network_disabled: bool,
}

impl Profile {
    pub fn new(name: impl Into<String>, image: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            image: image.into(),
            default_command: None,
            user: "sandbox".to_string(),
            read_only: false,
            network_disabled: false,
        }
    }

    pub fn with_command(mut self, command: impl Into<String>) -> Self {
        self.default_command = Some(command.into());
        self
    }

    pub fn with_user(mut self, user: impl Into<String>) -> Self {
        self.user = user.into();
        self
    }

    pub fn with_read_only(mut self, read_only: bool) -> Self {
        self.read_only = read_only;
        self
    }

    pub fn with_network_disabled(mut self, network_disabled: bool) -> Self {
        self.network_disabled = network_disabled;
        self
    }
}

struct Registry {
    profiles: RwLock<HashMap<String, Arc<Profile>>>,
    engine_url: RwLock<Option<String>>,
    container_prefix: RwLock<String>,
}

fn registry() -> &'static Registry {
    static REGISTRY: OnceLock<Registry> = OnceLock::new();
    REGISTRY.get_or_init(|| Registry {
        profiles: RwLock::new(HashMap::new()),
        engine_url: RwLock::new(None),
        container_prefix: RwLock::new("epicbox-".to_string()),
    })
}

/// One-shot (well, re-runnable) configuration entry point. Replaces the
/// whole profile map atomically; a concurrent `lookup` sees either the
/// old map or the new one, never a partial mix.
pub fn configure(profiles: Vec<Profile>, engine_url: Option<String>, container_prefix: String) {
    let map = profiles
        .into_iter()
        .map(|p| (p.name.clone(), Arc::new(p)))
        .collect();
    *registry().profiles.write() = map;
    *registry().engine_url.write() = engine_url;
    *registry().container_prefix.write() = container_prefix;
}

/// Look up a profile by name. Fails with `ProfileNotFound`, a
/// configuration error distinct from engine errors.
pub fn lookup(name: &str) -> SandboxResult<Arc<Profile>> {
    registry()
        .profiles
        .read()
        .get(name)
        .cloned()
        .ok_or_else(|| SandboxError::ProfileNotFound(name.to_string()))
}

/// The engine URL set by the last `configure` call, if any.
pub fn engine_url() -> Option<String> {
    registry().engine_url.read().clone()
}

/// The container name prefix set by the last `configure` call.
/// Defaults to `"epicbox-"` (production); the test harness sets
/// `"epicbox-test-"` so its own GC can filter containers by prefix.
pub fn container_prefix() -> String {
    registry().container_prefix.read().clone()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn configure_then_lookup() {
        let p = Profile::new("python", "python:3.11-slim").with_command("true");
        configure(
            vec![p],
            Some("unix:///var/run/docker.sock".to_string()),
            "epicbox-".to_string(),
        );

        let looked_up = lookup("python").expect("profile should be registered");
        assert_eq!(looked_up.image, "python:3.11-slim");
        assert_eq!(engine_url().as_deref(), Some("unix:///var/run/docker.sock"));
    }

    #[test]
    fn unknown_profile_is_configuration_error() {
        configure(vec![Profile::new("only-one", "alpine")], None, "epicbox-".to_string());
        let err = lookup("nope").unwrap_err();
        assert!(matches!(err, SandboxError::ProfileNotFound(name) if name == "nope"));
    }

    #[test]
    fn reconfigure_replaces_map_atomically() {
        configure(vec![Profile::new("a", "alpine")], None, "epicbox-".to_string());
        assert!(lookup("a").is_ok());
        configure(vec![Profile::new("b", "alpine")], None, "epicbox-".to_string());
        assert!(lookup("a").is_err());
        assert!(lookup("b").is_ok());
    }

    #[test]
    fn configure_sets_container_prefix() {
        configure(vec![], None, "epicbox-test-".to_string());
        assert_eq!(container_prefix(), "epicbox-test-");
        configure(vec![], None, "epicbox-".to_string());
    }
}
