//! In-process session registry plus its on-disk persistence (spec §3).
//!
//! A long-lived daemon would keep this purely in memory; because Zephyr is
//! re-invoked per command, `register-session` additionally writes a record
//! to `$HOME/.zephyr/sessions/<id>.json` so a later invocation within the
//! same shell can look the session back up (e.g. `zephyr session`).

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::permission::Session;

/// Process-wide registry, constructed explicitly rather than reached for as
/// a global (Design Notes §9).
pub struct SessionRegistry {
    sessions: HashMap<String, Session>,
    sessions_dir: PathBuf,
}

impl SessionRegistry {
    pub fn init(home: &Path) -> Self {
        let mut registry = Self {
            sessions: HashMap::new(),
            sessions_dir: home.join(".zephyr").join("sessions"),
        };
        registry.load_best_effort();
        registry
    }

    fn load_best_effort(&mut self) {
        let Ok(entries) = std::fs::read_dir(&self.sessions_dir) else {
            return;
        };
        for entry in entries.flatten() {
            let Ok(bytes) = std::fs::read(entry.path()) else {
                continue;
            };
            let Ok(session) = serde_json::from_slice::<Session>(&bytes) else {
                continue;
            };
            self.sessions.insert(session.session_id.clone(), session);
        }
    }

    /// Registers `session` in memory and persists it to disk.
    pub fn insert(&mut self, session: Session) {
        let _ = self.persist(&session);
        self.sessions.insert(session.session_id.clone(), session);
    }

    fn persist(&self, session: &Session) -> std::io::Result<()> {
        std::fs::create_dir_all(&self.sessions_dir)?;
        let path = self.sessions_dir.join(format!("{}.json", session.session_id));
        let bytes = serde_json::to_vec_pretty(session).unwrap_or_default();
        std::fs::write(path, bytes)
    }

    pub fn get(&self, session_id: &str) -> Option<&Session> {
        self.sessions.get(session_id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Session> {
        self.sessions.values()
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Shuts the registry down; a no-op beyond documenting the lifecycle
    /// boundary required by spec §5 (`init`/`shutdown` pair).
    pub fn shutdown(&self) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::permission::Role;

    fn session(id: &str) -> Session {
        Session {
            agent_id: "a".into(),
            agent_type: "human".into(),
            session_id: id.into(),
            parent_process_name: "zsh".into(),
            role: Role::User,
        }
    }

    #[test]
    fn insert_and_persist_round_trip() {
        let home = tempfile::tempdir().unwrap();
        let mut registry = SessionRegistry::init(home.path());
        registry.insert(session("abc"));
        assert_eq!(registry.len(), 1);

        let reloaded = SessionRegistry::init(home.path());
        assert!(reloaded.get("abc").is_some());
    }

    #[test]
    fn reentering_init_on_fresh_handle_is_independent() {
        let home = tempfile::tempdir().unwrap();
        let a = SessionRegistry::init(home.path());
        let b = SessionRegistry::init(home.path());
        assert_eq!(a.len(), b.len());
    }
}
