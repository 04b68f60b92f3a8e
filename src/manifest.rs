//! `module.toml` parsing into the in-memory [`Module`] record.
//!
//! The TOML tokenizer itself is an opaque collaborator (the `toml` crate); this
//! module owns the contract described in spec §4.1: required fields, array/table
//! shape validation, and forward-compatible ignoring of unknown sections.

use std::path::{Path, PathBuf};

use indexmap::IndexMap;
use serde::Deserialize;

use crate::error::ManifestError;

/// One discovered or installed module.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Module {
    pub name: String,
    pub version: String,
    pub description: Option<String>,
    pub author: Option<String>,
    pub license: Option<String>,
    pub required: Vec<String>,
    pub optional: Vec<String>,
    pub os: Vec<String>,
    pub arch: Vec<String>,
    pub shell: String,
    pub min_version: String,
    pub priority: i64,
    pub files: Vec<String>,
    pub pre_load: Option<String>,
    pub post_load: Option<String>,
    pub settings: IndexMap<String, String>,
    /// Absolute directory containing the manifest. Set by the discoverer/cache,
    /// not by the parser itself (the parser only knows the file it read).
    pub path: PathBuf,
}

const DEFAULT_PRIORITY: i64 = 100;

/// Raw TOML shape. Unknown keys/sections are ignored by serde's default
/// behavior (no `deny_unknown_fields`), satisfying spec §4.1's forward-compat
/// requirement.
#[derive(Debug, Deserialize, Default)]
struct RawManifest {
    #[serde(default)]
    module: Option<RawModuleSection>,
    #[serde(default)]
    dependencies: Option<RawDependencies>,
    #[serde(default)]
    platforms: Option<RawPlatforms>,
    #[serde(default)]
    load: Option<RawLoad>,
    #[serde(default)]
    hooks: Option<RawHooks>,
    #[serde(default)]
    settings: Option<IndexMap<String, String>>,
}

#[derive(Debug, Deserialize, Default)]
struct RawModuleSection {
    #[serde(default)]
    name: String,
    #[serde(default)]
    version: String,
    description: Option<String>,
    author: Option<String>,
    license: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
struct RawDependencies {
    #[serde(default)]
    required: Vec<String>,
    #[serde(default)]
    optional: Vec<String>,
}

#[derive(Debug, Deserialize, Default)]
struct RawPlatforms {
    #[serde(default)]
    os: Vec<String>,
    #[serde(default)]
    arch: Vec<String>,
    #[serde(default)]
    shell: String,
    #[serde(default)]
    min_version: String,
}

#[derive(Debug, Deserialize, Default)]
struct RawLoad {
    priority: Option<i64>,
    #[serde(default)]
    files: Vec<String>,
}

#[derive(Debug, Deserialize, Default)]
struct RawHooks {
    pre_load: Option<String>,
    post_load: Option<String>,
}

/// Parses a `module.toml` file at `path` into a [`Module`].
///
/// `path` must point directly at the manifest file; the module's directory
/// (`path`'s parent) becomes [`Module::path`].
pub fn parse_manifest(path: &Path) -> Result<Module, ManifestError> {
    if !path.exists() {
        return Err(ManifestError::Missing(path.to_path_buf()));
    }

    let text = std::fs::read_to_string(path).map_err(|source| ManifestError::Io {
        path: path.to_path_buf(),
        source,
    })?;

    let raw: RawManifest = toml::from_str(&text).map_err(|e| ManifestError::Invalid {
        path: path.to_path_buf(),
        reason: e.message().to_string(),
    })?;

    let module_section = raw.module.ok_or_else(|| ManifestError::Invalid {
        path: path.to_path_buf(),
        reason: "missing [module] section".to_string(),
    })?;

    validate_name(&module_section.name).map_err(|reason| ManifestError::Invalid {
        path: path.to_path_buf(),
        reason,
    })?;

    if module_section.version.trim().is_empty() {
        return Err(ManifestError::Invalid {
            path: path.to_path_buf(),
            reason: "[module].version must be non-empty".to_string(),
        });
    }

    let dependencies = raw.dependencies.unwrap_or_default();
    let platforms = raw.platforms.unwrap_or_default();
    let load = raw.load.unwrap_or_default();
    let hooks = raw.hooks.unwrap_or_default();

    let module_dir = path
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."));

    Ok(Module {
        name: module_section.name,
        version: module_section.version,
        description: module_section.description,
        author: module_section.author,
        license: module_section.license,
        required: dependencies.required,
        optional: dependencies.optional,
        os: platforms.os,
        arch: platforms.arch,
        shell: platforms.shell,
        min_version: platforms.min_version,
        priority: load.priority.unwrap_or(DEFAULT_PRIORITY),
        files: load.files,
        pre_load: hooks.pre_load,
        post_load: hooks.post_load,
        settings: raw.settings.unwrap_or_default(),
        path: module_dir,
    })
}

/// Validates a module name against spec §3: letters/digits/`-`/`_`, starts
/// with a letter, non-empty, at most 50 characters.
pub fn validate_name(name: &str) -> Result<(), String> {
    if name.is_empty() {
        return Err("[module].name must be non-empty".to_string());
    }
    if name.len() > 50 {
        return Err(format!(
            "[module].name '{name}' exceeds 50 characters"
        ));
    }
    let mut chars = name.chars();
    let first = chars.next().expect("checked non-empty above");
    if !first.is_ascii_alphabetic() {
        return Err(format!(
            "[module].name '{name}' must start with a letter"
        ));
    }
    if !chars.all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_') {
        return Err(format!(
            "[module].name '{name}' may only contain letters, digits, '-', and '_'"
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_manifest(dir: &Path, contents: &str) -> PathBuf {
        let path = dir.join("module.toml");
        let mut f = std::fs::File::create(&path).unwrap();
        f.write_all(contents.as_bytes()).unwrap();
        path
    }

    #[test]
    fn minimal_manifest_parses() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_manifest(
            dir.path(),
            r#"
            [module]
            name = "git-aliases"
            version = "1.0.0"
            "#,
        );
        let module = parse_manifest(&path).unwrap();
        assert_eq!(module.name, "git-aliases");
        assert_eq!(module.version, "1.0.0");
        assert_eq!(module.priority, DEFAULT_PRIORITY);
        assert!(module.required.is_empty());
        assert!(module.settings.is_empty());
        assert_eq!(module.path, dir.path());
    }

    #[test]
    fn missing_name_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_manifest(
            dir.path(),
            r#"
            [module]
            version = "1.0.0"
            "#,
        );
        let err = parse_manifest(&path).unwrap_err();
        assert!(matches!(err, ManifestError::Invalid { .. }));
    }

    #[test]
    fn unknown_sections_are_ignored() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_manifest(
            dir.path(),
            r#"
            [module]
            name = "thing"
            version = "0.1.0"

            [future.section]
            whatever = true
            "#,
        );
        assert!(parse_manifest(&path).is_ok());
    }

    #[test]
    fn scalar_for_array_field_is_a_parse_failure() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_manifest(
            dir.path(),
            r#"
            [module]
            name = "thing"
            version = "0.1.0"

            [dependencies]
            required = "not-an-array"
            "#,
        );
        assert!(parse_manifest(&path).is_err());
    }

    #[test]
    fn non_string_setting_is_a_parse_failure() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_manifest(
            dir.path(),
            r#"
            [module]
            name = "thing"
            version = "0.1.0"

            [settings]
            enabled = true
            "#,
        );
        assert!(parse_manifest(&path).is_err());
    }

    #[test]
    fn missing_manifest_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("module.toml");
        assert!(matches!(
            parse_manifest(&path),
            Err(ManifestError::Missing(_))
        ));
    }

    #[test]
    fn name_validation() {
        assert!(validate_name("git-aliases").is_ok());
        assert!(validate_name("_bad").is_err());
        assert!(validate_name("1bad").is_err());
        assert!(validate_name("").is_err());
        assert!(validate_name(&"a".repeat(51)).is_err());
        assert!(validate_name("has space").is_err());
    }
}
