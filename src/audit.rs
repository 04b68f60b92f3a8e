//! Append-only, per-day JSONL audit log (spec §4.9).

use std::collections::HashMap;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::AuditError;
use crate::permission::{Capability, Role, Session};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventCategory {
    Operation,
    Command,
    Session,
    Permission,
}

impl EventCategory {
    fn dir_name(self) -> &'static str {
        match self {
            EventCategory::Operation => "operations",
            EventCategory::Command => "commands",
            EventCategory::Session => "sessions",
            EventCategory::Permission => "permissions",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventOutcome {
    Success,
    Failure,
    Denied,
}

/// One audit record. Never carries command arguments, file contents, or
/// secrets (spec §3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEvent {
    pub timestamp: DateTime<Utc>,
    pub agent_id: String,
    pub agent_type: String,
    pub session_id: String,
    pub role: Role,
    pub event_category: EventCategory,
    pub event_action: String,
    pub event_outcome: EventOutcome,
    #[serde(default)]
    pub details: HashMap<String, String>,
}

impl AuditEvent {
    pub fn new(
        session: Option<&Session>,
        category: EventCategory,
        action: impl Into<String>,
        outcome: EventOutcome,
    ) -> Self {
        Self {
            timestamp: Utc::now(),
            agent_id: session.map(|s| s.agent_id.clone()).unwrap_or_default(),
            agent_type: session
                .map(|s| s.agent_type.clone())
                .unwrap_or_else(|| "human".to_string()),
            session_id: session.map(|s| s.session_id.clone()).unwrap_or_default(),
            role: session.map(|s| s.role).unwrap_or(Role::User),
            event_category: category,
            event_action: action.into(),
            event_outcome: outcome,
            details: HashMap::new(),
        }
    }

    pub fn with_detail(mut self, key: &str, value: impl Into<String>) -> Self {
        self.details.insert(key.to_string(), value.into());
        self
    }

    pub fn permission_denied(
        session: Option<&Session>,
        role: Role,
        capability: Capability,
        reason: &str,
    ) -> Self {
        Self {
            timestamp: Utc::now(),
            agent_id: session.map(|s| s.agent_id.clone()).unwrap_or_default(),
            agent_type: session
                .map(|s| s.agent_type.clone())
                .unwrap_or_else(|| "human".to_string()),
            session_id: session.map(|s| s.session_id.clone()).unwrap_or_default(),
            role,
            event_category: EventCategory::Permission,
            event_action: "permission_denied".to_string(),
            event_outcome: EventOutcome::Denied,
            details: HashMap::from([
                ("capability".to_string(), capability.to_string()),
                ("reason".to_string(), reason.to_string()),
            ]),
        }
    }
}

/// Writer/reader for `<home>/.zephyr/audit/<category>/<YYYY-MM-DD>/<category>.log`.
pub struct AuditLog {
    root: PathBuf,
}

impl AuditLog {
    pub fn init(home: &Path) -> Self {
        Self {
            root: home.join(".zephyr").join("audit"),
        }
    }

    /// Appends `event` as one JSON line, opening with append+create and
    /// flushing before returning (spec §4.9).
    pub fn append(&mut self, event: &AuditEvent) -> Result<(), AuditError> {
        let date = event.timestamp.format("%Y-%m-%d").to_string();
        let category_dir = event.event_category.dir_name();
        let dir = self.root.join(category_dir).join(&date);
        std::fs::create_dir_all(&dir)?;

        let path = dir.join(format!("{category_dir}.log"));
        let mut file = OpenOptions::new().create(true).append(true).open(path)?;

        let mut line = serde_json::to_string(event)?;
        line.push('\n');
        file.write_all(line.as_bytes())?;
        file.flush()?;
        Ok(())
    }

    /// Reads every event across all categories, optionally filtered by
    /// category, since `since` (inclusive), and/or by agent id.
    pub fn read_events(
        &self,
        category: Option<EventCategory>,
        since: Option<DateTime<Utc>>,
        agent: Option<&str>,
    ) -> Vec<AuditEvent> {
        let categories = match category {
            Some(c) => vec![c],
            None => vec![
                EventCategory::Operation,
                EventCategory::Command,
                EventCategory::Session,
                EventCategory::Permission,
            ],
        };

        let mut events = Vec::new();
        for category in categories {
            let dir = self.root.join(category.dir_name());
            let Ok(entries) = std::fs::read_dir(&dir) else {
                continue;
            };
            for day_entry in entries.flatten() {
                let log_path = day_entry.path().join(format!("{}.log", category.dir_name()));
                let Ok(contents) = std::fs::read_to_string(&log_path) else {
                    continue;
                };
                for line in contents.lines() {
                    let Ok(event) = serde_json::from_str::<AuditEvent>(line) else {
                        continue;
                    };
                    if let Some(since) = since {
                        if event.timestamp < since {
                            continue;
                        }
                    }
                    if let Some(agent) = agent {
                        if event.agent_id != agent {
                            continue;
                        }
                    }
                    events.push(event);
                }
            }
        }
        events.sort_by_key(|e| e.timestamp);
        events
    }

    /// Removes dated directories older than `retention_days` across all
    /// categories (spec §4.9 retention).
    pub fn prune(&self, retention_days: i64) -> Result<(), AuditError> {
        let cutoff = Utc::now() - chrono::Duration::days(retention_days);
        for category in [
            EventCategory::Operation,
            EventCategory::Command,
            EventCategory::Session,
            EventCategory::Permission,
        ] {
            let dir = self.root.join(category.dir_name());
            let Ok(entries) = std::fs::read_dir(&dir) else {
                continue;
            };
            for entry in entries.flatten() {
                let name = entry.file_name();
                let Some(date_str) = name.to_str() else {
                    continue;
                };
                let Ok(date) = chrono::NaiveDate::parse_from_str(date_str, "%Y-%m-%d") else {
                    continue;
                };
                if date.and_hms_opt(0, 0, 0).unwrap().and_utc() < cutoff {
                    std::fs::remove_dir_all(entry.path())?;
                }
            }
        }
        Ok(())
    }
}
