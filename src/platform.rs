//! Platform compatibility filter (spec §4.2).

use crate::manifest::Module;

/// The running system's relevant properties, gathered once at startup.
#[derive(Debug, Clone)]
pub struct CurrentPlatform {
    pub os: String,
    pub arch: String,
    pub shell: String,
    pub shell_version: String,
}

impl CurrentPlatform {
    pub fn detect() -> Self {
        Self {
            os: std::env::consts::OS.to_string(),
            arch: std::env::consts::ARCH.to_string(),
            shell: detect_shell(),
            shell_version: std::env::var("ZEPHYR_SHELL_VERSION").unwrap_or_default(),
        }
    }
}

fn detect_shell() -> String {
    std::env::var("SHELL")
        .ok()
        .and_then(|path| {
            std::path::Path::new(&path)
                .file_name()
                .map(|s| s.to_string_lossy().into_owned())
        })
        .unwrap_or_default()
}

/// Returns `true` when `module`'s platform filter matches `current`.
///
/// Empty filter fields match everything; non-empty `os`/`arch` sets must
/// contain the current value (case-insensitively); `shell`, if set, must equal
/// the current shell; `min_version`, if set, must be `<=` the current shell
/// version by per-component integer comparison.
pub fn is_compatible(module: &Module, current: &CurrentPlatform) -> bool {
    incompatibility_reason(module, current).is_none()
}

/// Returns `None` when compatible, otherwise a human-readable reason.
pub fn incompatibility_reason(module: &Module, current: &CurrentPlatform) -> Option<String> {
    if !module.os.is_empty() && !contains_ci(&module.os, &current.os) {
        return Some(format!(
            "OS mismatch: module requires one of [{}], current is '{}'",
            module.os.join(", "),
            current.os
        ));
    }

    if !module.arch.is_empty() && !contains_ci(&module.arch, &current.arch) {
        return Some(format!(
            "Architecture mismatch: module requires one of [{}], current is '{}'",
            module.arch.join(", "),
            current.arch
        ));
    }

    if !module.shell.is_empty() && !module.shell.eq_ignore_ascii_case(&current.shell) {
        return Some(format!(
            "Shell mismatch: module requires '{}', current is '{}'",
            module.shell, current.shell
        ));
    }

    if !module.min_version.is_empty()
        && version_cmp(&current.shell_version, &module.min_version) == std::cmp::Ordering::Less
    {
        return Some(format!(
            "Shell version requirement not met: module requires >= {}, current is '{}'",
            module.min_version, current.shell_version
        ));
    }

    None
}

fn contains_ci(haystack: &[String], needle: &str) -> bool {
    haystack.iter().any(|s| s.eq_ignore_ascii_case(needle))
}

/// Per-component integer comparison of dotted version strings. Each component
/// has any trailing non-digit suffix truncated before parsing (e.g. `5.9-rc1`
/// compares as `5.9`). A missing component is treated as zero.
pub fn version_cmp(a: &str, b: &str) -> std::cmp::Ordering {
    let pa = parse_version(a);
    let pb = parse_version(b);
    let len = pa.len().max(pb.len());
    for i in 0..len {
        let va = pa.get(i).copied().unwrap_or(0);
        let vb = pb.get(i).copied().unwrap_or(0);
        match va.cmp(&vb) {
            std::cmp::Ordering::Equal => continue,
            other => return other,
        }
    }
    std::cmp::Ordering::Equal
}

fn parse_version(s: &str) -> Vec<u64> {
    s.split('.')
        .map(|part| {
            let digits: String = part.chars().take_while(|c| c.is_ascii_digit()).collect();
            digits.parse::<u64>().unwrap_or(0)
        })
        .collect()
}
