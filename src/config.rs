//! `$HOME/.zephyr/security.toml` loader: role-to-capability overrides and
//! the trusted-module allowlist (spec §6 "Security config").
//!
//! Follows the teacher's load-with-defaults posture (`zizmor`'s
//! `config.rs`): a missing file is not an error, a malformed one is.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::permission::{Capability, Role, RoleTable};

#[derive(Debug, Deserialize, Serialize, Default)]
struct RawSecurityConfig {
    #[serde(default, skip_serializing_if = "RawRoles::is_empty")]
    roles: RawRoles,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    trusted_modules: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    admin_agent_types: Vec<String>,
}

#[derive(Debug, Deserialize, Serialize, Default)]
struct RawRoles {
    #[serde(skip_serializing_if = "Option::is_none")]
    agent: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    user: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    admin: Option<Vec<String>>,
}

impl RawRoles {
    fn is_empty(&self) -> bool {
        self.agent.is_none() && self.user.is_none() && self.admin.is_none()
    }
}

/// Loaded security configuration.
#[derive(Debug, Clone)]
pub struct SecurityConfig {
    pub role_table: RoleTable,
    pub trusted_modules: Vec<PathBuf>,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            role_table: RoleTable::default(),
            trusted_modules: Vec::new(),
        }
    }
}

/// Loads `<home>/.zephyr/security.toml`, falling back to defaults when the
/// file is absent. A malformed file is logged and defaults are used (this is
/// safe for the role/capability table; trusted-allowlist parsing failures
/// never silently widen trust — a malformed `trusted_modules` entry is
/// simply dropped, never defaulted to "allow").
pub fn load(home: &Path) -> SecurityConfig {
    let path = home.join(".zephyr").join("security.toml");
    let Ok(text) = std::fs::read_to_string(&path) else {
        return SecurityConfig::default();
    };

    let raw: RawSecurityConfig = match toml::from_str(&text) {
        Ok(raw) => raw,
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "malformed security.toml, using defaults");
            return SecurityConfig::default();
        }
    };

    let mut role_table = RoleTable::default().with_admin_agent_types(raw.admin_agent_types);

    if let Some(caps) = raw.roles.user {
        role_table = role_table.with_capabilities(Role::User, parse_capabilities(&caps));
    }
    if let Some(caps) = raw.roles.agent {
        role_table = role_table.with_capabilities(Role::Agent, parse_capabilities(&caps));
    }
    if let Some(caps) = raw.roles.admin {
        role_table = role_table.with_capabilities(Role::Admin, parse_capabilities(&caps));
    }

    let trusted_modules = raw
        .trusted_modules
        .into_iter()
        .map(PathBuf::from)
        .collect();

    SecurityConfig {
        role_table,
        trusted_modules,
    }
}

fn parse_capabilities(names: &[String]) -> Vec<Capability> {
    names
        .iter()
        .filter_map(|name| match name.as_str() {
            "Install" => Some(Capability::Install),
            "Install_Unsigned" => Some(Capability::InstallUnsigned),
            "Use_Unsafe" => Some(Capability::UseUnsafe),
            "Uninstall" => Some(Capability::Uninstall),
            "Modify_Config" => Some(Capability::ModifyConfig),
            "Require_Confirmation" => Some(Capability::RequireConfirmation),
            other => {
                tracing::warn!(capability = other, "unknown capability name in security.toml, ignoring");
                None
            }
        })
        .collect()
}

/// Appends `module_path` to the on-disk trusted-module allowlist, creating
/// `<home>/.zephyr/security.toml` if it doesn't exist yet. Preserves any
/// existing role overrides and other allowlist entries.
pub fn add_trusted_module(home: &Path, module_path: &Path) -> std::io::Result<()> {
    let path = home.join(".zephyr").join("security.toml");
    let mut raw: RawSecurityConfig = std::fs::read_to_string(&path)
        .ok()
        .and_then(|text| toml::from_str(&text).ok())
        .unwrap_or_default();

    let value = module_path.display().to_string();
    if !raw.trusted_modules.contains(&value) {
        raw.trusted_modules.push(value);
    }

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let text = toml::to_string_pretty(&raw).map_err(std::io::Error::other)?;
    std::fs::write(&path, text)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_yields_defaults() {
        let home = tempfile::tempdir().unwrap();
        let config = load(home.path());
        assert!(config.trusted_modules.is_empty());
    }

    #[test]
    fn malformed_file_yields_defaults() {
        let home = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(home.path().join(".zephyr")).unwrap();
        std::fs::write(home.path().join(".zephyr/security.toml"), "not [ valid").unwrap();
        let config = load(home.path());
        assert!(config.trusted_modules.is_empty());
    }

    #[test]
    fn role_overrides_and_allowlist_are_parsed() {
        let home = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(home.path().join(".zephyr")).unwrap();
        std::fs::write(
            home.path().join(".zephyr/security.toml"),
            r#"
            trusted_modules = ["/opt/trusted/mod-a"]
            admin_agent_types = ["ci"]

            [roles]
            agent = ["Install", "Uninstall"]
            "#,
        )
        .unwrap();
        let config = load(home.path());
        assert_eq!(config.trusted_modules, vec![PathBuf::from("/opt/trusted/mod-a")]);
        assert_eq!(config.role_table.role_for_agent_type("ci"), Role::Admin);
    }

    #[test]
    fn add_trusted_module_creates_file_and_is_idempotent() {
        let home = tempfile::tempdir().unwrap();
        add_trusted_module(home.path(), Path::new("/opt/mod-a")).unwrap();
        add_trusted_module(home.path(), Path::new("/opt/mod-a")).unwrap();

        let config = load(home.path());
        assert_eq!(config.trusted_modules, vec![PathBuf::from("/opt/mod-a")]);
    }

    #[test]
    fn add_trusted_module_preserves_existing_role_overrides() {
        let home = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(home.path().join(".zephyr")).unwrap();
        std::fs::write(
            home.path().join(".zephyr/security.toml"),
            r#"
            [roles]
            agent = ["Install"]
            "#,
        )
        .unwrap();

        add_trusted_module(home.path(), Path::new("/opt/mod-b")).unwrap();

        let text = std::fs::read_to_string(home.path().join(".zephyr/security.toml")).unwrap();
        assert!(text.contains("Install"));

        let config = load(home.path());
        assert_eq!(config.trusted_modules, vec![PathBuf::from("/opt/mod-b")]);
    }
}
