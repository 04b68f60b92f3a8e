//! The mandatory pattern set (spec §4.6) and its compiled form.

use regex::Regex;

use crate::error::ScanError;

/// Default bound on total concatenated pattern source, to bound compilation
/// cost (spec §3 Pattern invariant).
pub const MAX_PATTERN_SET_BYTES: usize = 32 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, serde::Serialize, serde::Deserialize)]
pub enum Severity {
    Info,
    Warning,
    Critical,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Severity::Info => "info",
            Severity::Warning => "warning",
            Severity::Critical => "critical",
        };
        write!(f, "{s}")
    }
}

/// One scanner rule, grouped by severity.
#[derive(Debug, Clone)]
pub struct PatternSpec {
    pub severity: Severity,
    pub pattern: &'static str,
    pub description: &'static str,
}

/// A compiled pattern, ready for matching against classified code lines.
#[derive(Debug, Clone)]
pub struct Pattern {
    pub severity: Severity,
    pub source: &'static str,
    pub description: &'static str,
    pub regex: Regex,
}

macro_rules! pat {
    ($sev:expr, $src:expr, $desc:expr) => {
        PatternSpec {
            severity: $sev,
            pattern: $src,
            description: $desc,
        }
    };
}

/// The mandatory coverage list from spec §4.6.
pub fn default_pattern_specs() -> Vec<PatternSpec> {
    use Severity::*;
    vec![
        pat!(Critical, r"(curl|wget)[^\n|]*\|\s*(sudo\s+)?(ba)?sh\b", "remote download piped directly to a shell"),
        pat!(Critical, r"eval\s+\$\(\s*(curl|wget)", "eval of curl/wget output"),
        pat!(Critical, r"\$\([^)]*\b(curl|wget)\b[^)]*\)", "command substitution of curl/wget"),
        pat!(Critical, r"<\([^)]*\b(curl|wget)\b[^)]*\)", "process substitution of curl/wget"),
        pat!(Critical, r"base64\s+(-d|--decode)[^\n|]*\|\s*(ba)?sh\b", "base64-decoded payload piped to a shell"),
        pat!(Critical, r#"printf\s+["'](\\x[0-9a-fA-F]{2})+"#, "hex-encoded bytes assembled via printf"),
        pat!(Critical, r"xxd\s+-r\s+-p", "hex decoding via xxd, often used to smuggle exec payloads"),
        pat!(Critical, r";\s*\$\(", "chained command substitution after a statement separator"),
        pat!(Critical, r"\|\s*\$\(", "chained command substitution after a pipe"),
        pat!(Critical, r"&&\s*(curl|wget)\b", "conditional download chained with &&"),
        pat!(Critical, r"\|\|\s*(curl|wget)\b", "conditional download chained with ||"),
        pat!(Critical, r"rm\s+-rf\s+/(\s|$)", "recursive forced removal of the filesystem root"),
        pat!(Critical, r"\bdd\s+if=", "raw block-device read via dd"),
        pat!(Critical, r">\s*/dev/(sda|nvme\d*)", "raw redirection to a block device"),
        pat!(Critical, r"/dev/(tcp|udp)/", "bash TCP/UDP pseudo-device socket"),
        pat!(Critical, r"\bnc\s+.*-e\b", "netcat with command execution"),
        pat!(Critical, r"socat\s+.*exec:", "socat with command execution"),
        pat!(Critical, r"ptrace|/proc/\d+/mem\b", "ptrace-based process memory access"),
        pat!(Critical, r"LD_PRELOAD=|DYLD_INSERT_LIBRARIES=", "dynamic linker code injection"),
        pat!(Critical, r"/proc/self/exe|/proc/\d+/root\b", "process self-reference escape primitive"),
        pat!(Critical, r"\bnsenter\b|/sys/fs/cgroup", "namespace/cgroup escape primitive"),
        pat!(Critical, r"\|\s*sed\b[^\n|]*-e[^\n|]*\|", "chained sed used to rewrite a validation pipeline"),
        pat!(Critical, r#"sed\s+'s/\$\("#, "sed substitution embedding a command substitution"),
        pat!(Critical, r"~/\.aws/credentials|~/\.ssh/id_(rsa|ed25519|ecdsa|dsa)", "credential file reference combined with exfiltration risk"),
        pat!(Warning, r"curl\s+http://", "plain-HTTP download"),
        pat!(Warning, r"chmod\s+\+s\b", "setuid/setgid bit grant"),
        pat!(Warning, r"\bsudo\s+", "privilege escalation via sudo"),
        pat!(Warning, r">>\s*~?/?\.(zshrc|bashrc)\b", "append to the user's shell startup file"),
        pat!(Warning, r"/dev/tcp/\S+\s*&&\s*(cat|exec)", "possible reverse shell via bash network pseudo-device"),
        pat!(Warning, r"(curl|wget)[^\n]*\|\s*(ba)?sh[^\n]*&&[^\n]*(curl|wget|nc)\b", "download-then-exfiltrate chain"),
    ]
}

/// Compiles `specs` into [`Pattern`]s, enforcing the total-size invariant.
pub fn compile(specs: &[PatternSpec]) -> Result<Vec<Pattern>, ScanError> {
    let total: usize = specs.iter().map(|s| s.pattern.len()).sum();
    if total > MAX_PATTERN_SET_BYTES {
        return Err(ScanError::PatternSetTooLarge {
            actual: total,
            max: MAX_PATTERN_SET_BYTES,
        });
    }

    specs
        .iter()
        .map(|spec| {
            Regex::new(spec.pattern)
                .map(|regex| Pattern {
                    severity: spec.severity,
                    source: spec.pattern,
                    description: spec.description,
                    regex,
                })
                .map_err(|source| ScanError::PatternCompile {
                    pattern: spec.pattern.to_string(),
                    source,
                })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_set_compiles() {
        let specs = default_pattern_specs();
        let compiled = compile(&specs).unwrap();
        assert_eq!(compiled.len(), specs.len());
    }

    #[test]
    fn curl_pipe_bash_is_critical() {
        let compiled = compile(&default_pattern_specs()).unwrap();
        let matched = compiled
            .iter()
            .any(|p| p.severity == Severity::Critical && p.regex.is_match("curl https://example.com/install.sh | bash"));
        assert!(matched);
    }
}
