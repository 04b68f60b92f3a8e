//! Agent-role permission engine (spec §4.8).
//!
//! Session detection uses an ordered `(env_var, agent_type)` table rather
//! than an if/else chain (Design Notes §9), so new agent integrations are a
//! data edit.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::audit::{AuditEvent, AuditLog};
use crate::error::PermissionError;
use crate::session_registry::SessionRegistry;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Role {
    User,
    Agent,
    Admin,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Role::User => "user",
            Role::Agent => "agent",
            Role::Admin => "admin",
        };
        write!(f, "{s}")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Capability {
    Install,
    InstallUnsigned,
    UseUnsafe,
    Uninstall,
    ModifyConfig,
    RequireConfirmation,
}

impl std::fmt::Display for Capability {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Capability::Install => "Install",
            Capability::InstallUnsigned => "Install_Unsigned",
            Capability::UseUnsafe => "Use_Unsafe",
            Capability::Uninstall => "Uninstall",
            Capability::ModifyConfig => "Modify_Config",
            Capability::RequireConfirmation => "Require_Confirmation",
        };
        write!(f, "{s}")
    }
}

const ALL_CAPABILITIES: &[Capability] = &[
    Capability::Install,
    Capability::InstallUnsigned,
    Capability::UseUnsafe,
    Capability::Uninstall,
    Capability::ModifyConfig,
    Capability::RequireConfirmation,
];

/// Ordered precedence table of environment variables consulted at session
/// detection time. Earlier entries win when multiple are set.
const AGENT_ENV_PRECEDENCE: &[(&str, &str)] = &[
    ("ANTHROPIC_API_KEY", "claude-code"),
    ("CLAUDE_CODE_SESSION", "claude-code"),
    ("CURSOR_TRACE_ID", "cursor"),
    ("GITHUB_COPILOT_TOKEN", "github-copilot"),
    ("TERM_PROGRAM", "__term_program__"),
    ("ZEPHYR_AGENT_TYPE", "__literal__"),
];

/// One invoking agent's identity for the current process.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub agent_id: String,
    pub agent_type: String,
    pub session_id: String,
    pub parent_process_name: String,
    pub role: Role,
}

/// Detects the current session from environment variables, per spec §4.8.
pub fn detect_session(role_table: &RoleTable) -> Session {
    let agent_type = detect_agent_type();
    let role = role_table.role_for_agent_type(&agent_type);

    Session {
        agent_id: std::env::var("ZEPHYR_AGENT_ID").unwrap_or_else(|_| "unknown".to_string()),
        agent_type,
        session_id: std::env::var("ZEPHYR_SESSION_ID")
            .unwrap_or_else(|_| uuid::Uuid::new_v4().to_string()),
        parent_process_name: parent_process_name(),
        role,
    }
}

fn detect_agent_type() -> String {
    for (var, mapped) in AGENT_ENV_PRECEDENCE {
        let Ok(value) = std::env::var(var) else {
            continue;
        };
        if value.is_empty() {
            continue;
        }
        return match *mapped {
            "__term_program__" => value.to_ascii_lowercase(),
            "__literal__" => value,
            other => other.to_string(),
        };
    }
    "human".to_string()
}

fn parent_process_name() -> String {
    std::env::var("ZEPHYR_PARENT_PROCESS").unwrap_or_default()
}

/// Role-to-capability mapping, overridable via `$HOME/.zephyr/security.toml`.
#[derive(Debug, Clone)]
pub struct RoleTable {
    capabilities: HashMap<Role, Vec<Capability>>,
    /// Agent types the config explicitly elevates to `admin` (e.g. CI).
    admin_agent_types: Vec<String>,
}

impl Default for RoleTable {
    fn default() -> Self {
        let mut capabilities = HashMap::new();
        capabilities.insert(Role::User, ALL_CAPABILITIES.to_vec());
        capabilities.insert(Role::Admin, ALL_CAPABILITIES.to_vec());
        capabilities.insert(Role::Agent, vec![Capability::Install]);
        Self {
            capabilities,
            admin_agent_types: Vec::new(),
        }
    }
}

impl RoleTable {
    pub fn with_admin_agent_types(mut self, types: Vec<String>) -> Self {
        self.admin_agent_types = types;
        self
    }

    pub fn with_capabilities(mut self, role: Role, caps: Vec<Capability>) -> Self {
        self.capabilities.insert(role, caps);
        self
    }

    pub fn role_for_agent_type(&self, agent_type: &str) -> Role {
        if agent_type == "human" {
            return Role::User;
        }
        if self
            .admin_agent_types
            .iter()
            .any(|t| t.eq_ignore_ascii_case(agent_type))
        {
            return Role::Admin;
        }
        Role::Agent
    }

    fn capabilities_for(&self, role: Role) -> &[Capability] {
        self.capabilities
            .get(&role)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }
}

/// Checks whether `session` (or, absent a registered session, the fail-open
/// default of `user`) holds `capability`. Every denial writes a
/// `permission_denied` audit event (spec §4.8).
pub fn check_permission(
    session: Option<&Session>,
    role_table: &RoleTable,
    capability: Capability,
    reason: &str,
    audit: &mut AuditLog,
) -> Result<(), PermissionError> {
    // Absence of a registered session defaults to user-equivalent: pre-shell-
    // integration invocations must remain usable (spec §4.8, fail-open).
    let role = session.map(|s| s.role).unwrap_or(Role::User);

    if role_table.capabilities_for(role).contains(&capability) {
        return Ok(());
    }

    let event = AuditEvent::permission_denied(session, role, capability, reason);
    let _ = audit.append(&event);

    Err(PermissionError::Denied {
        capability: capability.to_string(),
        role: role.to_string(),
        reason: reason.to_string(),
    })
}

/// Registers `session` in both the in-process registry and the on-disk
/// record used by later invocations in the same shell (spec §3).
pub fn register_session(session: &Session, registry: &mut SessionRegistry) {
    registry.insert(session.clone());
}
