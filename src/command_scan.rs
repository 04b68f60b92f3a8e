//! Single-command variant of the security scanner (spec §4.10), used to
//! wrap shell-level hooks such as `pre_load`/`post_load`.

use crate::scanner::classify::{classify_line, strip_string_literals, ClassifierState, LineKind};
use crate::scanner::patterns::{compile, default_pattern_specs, Pattern, Severity};
use crate::error::ScanError;

/// Commands longer than this are themselves treated as suspicious (spec
/// §4.10) and short-circuit to `Critical` without per-line matching.
pub const MAX_COMMAND_LENGTH: usize = 10 * 1024;

#[derive(Debug, Clone)]
pub struct CommandScanResult {
    pub has_findings: bool,
    pub severity: Severity,
    pub matched_descriptions: Vec<String>,
}

pub struct CommandScanner {
    patterns: Vec<Pattern>,
}

impl CommandScanner {
    pub fn new() -> Result<Self, ScanError> {
        Ok(Self {
            patterns: compile(&default_pattern_specs())?,
        })
    }

    /// Scans `command`, a possibly multi-line shell command string.
    pub fn scan(&self, command: &str) -> CommandScanResult {
        if command.is_empty() {
            return CommandScanResult {
                has_findings: false,
                severity: Severity::Info,
                matched_descriptions: Vec::new(),
            };
        }

        if command.len() > MAX_COMMAND_LENGTH {
            return CommandScanResult {
                has_findings: true,
                severity: Severity::Critical,
                matched_descriptions: vec!["command exceeds maximum length".to_string()],
            };
        }

        let mut matched = Vec::new();
        let mut max_severity = Severity::Info;
        let mut state = ClassifierState::default();

        for raw_line in command.lines() {
            let (next_state, kind) = classify_line(state, raw_line);
            state = next_state;
            if kind != LineKind::Code {
                continue;
            }

            let stripped = strip_string_literals(raw_line);
            for pattern in &self.patterns {
                if pattern.regex.is_match(&stripped) {
                    matched.push(pattern.description.to_string());
                    if pattern.severity > max_severity {
                        max_severity = pattern.severity;
                    }
                }
            }
        }

        CommandScanResult {
            has_findings: !matched.is_empty(),
            severity: max_severity,
            matched_descriptions: matched,
        }
    }
}
