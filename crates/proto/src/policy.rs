//! Durable per-(client, service) authorization policy.
//!
//! A [`Scope`] identifies who is asking to do what on whose behalf: the
//! client's user/host/port and the service-side user/host. A [`Rule`] is the
//! authorization granted to a scope: either a set of approved commands or a
//! blanket `all_commands` grant. The [`PolicyStore`] maps scopes to rules,
//! shared across all concurrent proxy connections, and optionally persists
//! to a JSON file.
//!
//! Persistence is write-through: a mutation is durable on disk before the
//! mutator returns success. The file is replaced atomically (temp file,
//! fsync, rename) and restricted to the owner on Unix.

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::{debug, warn};
use warden_platform::{WardenError, WardenResult};

/// The identity of an approval: one (client, service) pair.
///
/// Equality and hashing cover the full tuple. Scopes are value-typed,
/// created when a proxy session begins, and never mutated.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Scope {
    /// Client-side user name.
    pub client_username: String,
    /// Client-side host name.
    pub client_hostname: String,
    /// Client-side port.
    pub client_port: u16,
    /// Service-side user name.
    pub service_username: String,
    /// Service-side host name.
    pub service_hostname: String,
}

impl Scope {
    /// Returns the client end as "user@host:port".
    pub fn client_label(&self) -> String {
        format!(
            "{}@{}:{}",
            self.client_username, self.client_hostname, self.client_port
        )
    }

    /// Returns the service end as "user@host".
    pub fn service_label(&self) -> String {
        format!("{}@{}", self.service_username, self.service_hostname)
    }
}

impl std::fmt::Display for Scope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} -> {}", self.client_label(), self.service_label())
    }
}

/// The authorization granted to a [`Scope`].
///
/// A scope with no stored rule behaves as `Rule::default()`: nothing
/// approved.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rule {
    /// Blanket grant: every command is approved.
    #[serde(default)]
    pub all_commands: bool,
    /// Individually approved commands.
    #[serde(default)]
    pub commands: HashSet<String>,
}

impl Rule {
    /// Returns whether the rule approves the given command.
    pub fn is_approved(&self, command: &str) -> bool {
        self.all_commands || self.commands.contains(command)
    }
}

/// Persisted policy payload.
///
/// Fields use `#[serde(default)]` so files written by older versions
/// deserialize without errors.
#[derive(Debug, Serialize, Deserialize)]
struct StorePayload {
    version: String,
    #[serde(default)]
    rules: Vec<StoredRule>,
}

#[derive(Debug, Serialize, Deserialize)]
struct StoredRule {
    scope: Scope,
    rule: Rule,
}

/// The shared scope-to-rule mapping.
///
/// Mutations serialize under one lock; lookups clone out the rule so no lock
/// is held across filter work or prompting.
#[derive(Debug)]
pub struct PolicyStore {
    rules: Mutex<HashMap<Scope, Rule>>,
    path: Option<PathBuf>,
}

impl PolicyStore {
    /// Creates an ephemeral store with no persistence.
    pub fn in_memory() -> Self {
        Self {
            rules: Mutex::new(HashMap::new()),
            path: None,
        }
    }

    /// Opens a persistent store backed by the given file.
    ///
    /// A missing file is an empty store; a corrupt file is an error (a
    /// policy store that silently loses grants would re-prompt for every
    /// approval, and one that silently drops denials is worse).
    pub fn load(path: impl Into<PathBuf>) -> WardenResult<Self> {
        let path = path.into();

        let rules = if path.exists() {
            let data = std::fs::read_to_string(&path).map_err(|e| WardenError::Store {
                path: Some(path.clone()),
                reason: format!("read: {}", e),
            })?;
            let payload: StorePayload =
                serde_json::from_str(&data).map_err(|e| WardenError::Store {
                    path: Some(path.clone()),
                    reason: format!("parse: {}", e),
                })?;

            debug!(
                path = %path.display(),
                version = %payload.version,
                rules = payload.rules.len(),
                "policy store loaded"
            );

            payload
                .rules
                .into_iter()
                .map(|entry| (entry.scope, entry.rule))
                .collect()
        } else {
            HashMap::new()
        };

        Ok(Self {
            rules: Mutex::new(rules),
            path: Some(path),
        })
    }

    /// Returns the rule for the scope, or an empty rule if absent.
    ///
    /// Total: never fails.
    pub fn get_rule(&self, scope: &Scope) -> Rule {
        self.lock().get(scope).cloned().unwrap_or_default()
    }

    /// Approves one command in the scope. Idempotent.
    ///
    /// # Errors
    ///
    /// Returns [`WardenError::Store`] if persistence fails; the in-memory
    /// state is rolled back so memory and disk stay consistent.
    pub fn set_command_allowed(&self, scope: &Scope, command: &str) -> WardenResult<()> {
        let mut rules = self.lock();
        let previous = rules.get(scope).cloned();

        rules
            .entry(scope.clone())
            .or_default()
            .commands
            .insert(command.to_string());

        if let Err(e) = self.persist(&rules) {
            restore(&mut rules, scope, previous);
            return Err(e);
        }

        debug!(%scope, command, "command approved in scope");
        Ok(())
    }

    /// Grants every command in the scope. Idempotent. Previously approved
    /// commands are retained.
    ///
    /// # Errors
    ///
    /// Returns [`WardenError::Store`] if persistence fails; the in-memory
    /// state is rolled back.
    pub fn set_all_allowed(&self, scope: &Scope) -> WardenResult<()> {
        let mut rules = self.lock();
        let previous = rules.get(scope).cloned();

        rules.entry(scope.clone()).or_default().all_commands = true;

        if let Err(e) = self.persist(&rules) {
            restore(&mut rules, scope, previous);
            return Err(e);
        }

        debug!(%scope, "all commands approved in scope");
        Ok(())
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<Scope, Rule>> {
        self.rules.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Writes the full rule set to disk atomically. A no-op for in-memory
    /// stores.
    fn persist(&self, rules: &HashMap<Scope, Rule>) -> WardenResult<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };

        let payload = StorePayload {
            version: env!("CARGO_PKG_VERSION").to_string(),
            rules: rules
                .iter()
                .map(|(scope, rule)| StoredRule {
                    scope: scope.clone(),
                    rule: rule.clone(),
                })
                .collect(),
        };

        save_atomically(path, &payload).map_err(|e| WardenError::Store {
            path: Some(path.clone()),
            reason: format!("write: {}", e),
        })
    }
}

fn restore(rules: &mut HashMap<Scope, Rule>, scope: &Scope, previous: Option<Rule>) {
    warn!(%scope, "persistence failed, rolling back policy mutation");
    match previous {
        Some(rule) => rules.insert(scope.clone(), rule),
        None => rules.remove(scope),
    };
}

/// Writes to a temporary file, fsyncs, then renames for crash safety.
/// File permissions are set to 0600 on Unix.
fn save_atomically(path: &Path, payload: &StorePayload) -> std::io::Result<()> {
    let data = serde_json::to_string_pretty(payload)
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;

    let tmp_path = path.with_extension("tmp");

    let mut file = std::fs::File::create(&tmp_path)?;
    file.write_all(data.as_bytes())?;
    file.sync_all()?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let perms = std::fs::Permissions::from_mode(0o600);
        std::fs::set_permissions(&tmp_path, perms)?;
    }

    std::fs::rename(&tmp_path, path)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn scope() -> Scope {
        Scope {
            client_username: "alice".to_string(),
            client_hostname: "laptop".to_string(),
            client_port: 22000,
            service_username: "bob".to_string(),
            service_hostname: "srv".to_string(),
        }
    }

    #[test]
    fn test_scope_labels() {
        let s = scope();
        assert_eq!(s.client_label(), "alice@laptop:22000");
        assert_eq!(s.service_label(), "bob@srv");
        assert_eq!(s.to_string(), "alice@laptop:22000 -> bob@srv");
    }

    #[test]
    fn test_empty_rule_approves_nothing() {
        let rule = Rule::default();
        assert!(!rule.is_approved("ls"));
        assert!(!rule.is_approved(""));
    }

    #[test]
    fn test_all_commands_approves_everything() {
        let rule = Rule {
            all_commands: true,
            commands: HashSet::new(),
        };
        assert!(rule.is_approved("ls"));
        assert!(rule.is_approved("rm -rf /"));
    }

    #[test]
    fn test_get_rule_is_total() {
        let store = PolicyStore::in_memory();
        assert_eq!(store.get_rule(&scope()), Rule::default());
    }

    #[test]
    fn test_set_command_allowed() {
        let store = PolicyStore::in_memory();
        store.set_command_allowed(&scope(), "ls").unwrap();

        let rule = store.get_rule(&scope());
        assert!(rule.is_approved("ls"));
        assert!(!rule.is_approved("rm"));
        assert!(!rule.all_commands);
    }

    #[test]
    fn test_set_command_allowed_idempotent() {
        let store = PolicyStore::in_memory();
        store.set_command_allowed(&scope(), "ls").unwrap();
        store.set_command_allowed(&scope(), "ls").unwrap();

        assert_eq!(store.get_rule(&scope()).commands.len(), 1);
    }

    #[test]
    fn test_set_all_allowed_retains_commands() {
        let store = PolicyStore::in_memory();
        store.set_command_allowed(&scope(), "ls").unwrap();
        store.set_all_allowed(&scope()).unwrap();

        let rule = store.get_rule(&scope());
        assert!(rule.all_commands);
        assert!(rule.commands.contains("ls"));
        assert!(rule.is_approved("anything"));
    }

    #[test]
    fn test_persistence_round_trip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("policy.json");

        {
            let store = PolicyStore::load(&path).unwrap();
            store.set_command_allowed(&scope(), "ls").unwrap();
            store.set_all_allowed(&scope()).unwrap();
        }

        // Mutations were durable before the mutators returned.
        let reloaded = PolicyStore::load(&path).unwrap();
        let rule = reloaded.get_rule(&scope());
        assert!(rule.all_commands);
        assert!(rule.commands.contains("ls"));
    }

    #[test]
    fn test_missing_file_is_empty_store() {
        let dir = TempDir::new().unwrap();
        let store = PolicyStore::load(dir.path().join("absent.json")).unwrap();
        assert_eq!(store.get_rule(&scope()), Rule::default());
    }

    #[test]
    fn test_corrupt_file_is_an_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("policy.json");
        std::fs::write(&path, "{ not json").unwrap();

        let result = PolicyStore::load(&path);
        assert!(matches!(result, Err(WardenError::Store { .. })));
    }

    #[test]
    fn test_scopes_are_distinct() {
        let store = PolicyStore::in_memory();
        store.set_all_allowed(&scope()).unwrap();

        let other = Scope {
            client_port: 22001,
            ..scope()
        };
        assert!(!store.get_rule(&other).all_commands);
    }
}
