//! Line classification: code vs. comment vs. heredoc-body vs. string-literal.
//!
//! Modeled as a small state machine whose state is threaded through a fold
//! over lines (Design Notes §9), rather than mutable shared state touched
//! line-by-line. Only [`LineKind::Code`] lines are matched against patterns.

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LineKind {
    Code,
    Comment,
    HeredocBody,
}

#[derive(Debug, Clone, Default)]
pub struct ClassifierState {
    heredoc_terminator: Option<String>,
}

/// Classifies one line given the state carried from the previous line, and
/// returns the (possibly updated) state to carry into the next line.
///
/// String-literal suppression is intentionally line-local: a quoted string
/// balanced within one line has its contents excluded from matching, but a
/// multi-line single-quoted string is not tracked across lines (an
/// acknowledged false-negative class, spec §9).
pub fn classify_line(state: ClassifierState, raw_line: &str) -> (ClassifierState, LineKind) {
    let trimmed = raw_line.trim();

    if let Some(terminator) = &state.heredoc_terminator {
        if trimmed == terminator.as_str() {
            return (ClassifierState { heredoc_terminator: None }, LineKind::HeredocBody);
        }
        return (state, LineKind::HeredocBody);
    }

    if trimmed.starts_with('#') || trimmed.starts_with("//") {
        return (state, LineKind::Comment);
    }

    if let Some(terminator) = detect_heredoc_opener(trimmed) {
        return (
            ClassifierState {
                heredoc_terminator: Some(terminator),
            },
            LineKind::Code,
        );
    }

    (state, LineKind::Code)
}

/// Strips balanced single- or double-quoted string-literal spans from a code
/// line before pattern matching, per spec §4.6 step 3 / §9's documented
/// approximation.
pub fn strip_string_literals(line: &str) -> String {
    let mut out = String::with_capacity(line.len());
    let mut chars = line.chars().peekable();
    while let Some(c) = chars.next() {
        if c == '\'' || c == '"' {
            let quote = c;
            let mut closed = false;
            while let Some(&next) = chars.peek() {
                chars.next();
                if next == '\\' && quote == '"' {
                    chars.next();
                    continue;
                }
                if next == quote {
                    closed = true;
                    break;
                }
            }
            if closed {
                // Replace the literal's contents with a single placeholder
                // space so surrounding token boundaries are preserved.
                out.push(' ');
            } else {
                // Unbalanced quote: nothing more to strip on this line, but
                // keep the opening quote itself visible to pattern matching.
                out.push(quote);
            }
        } else {
            out.push(c);
        }
    }
    out
}

fn detect_heredoc_opener(line: &str) -> Option<String> {
    let idx = line.find("<<")?;
    let rest = line[idx + 2..].trim_start();
    let rest = rest.strip_prefix('-').unwrap_or(rest);
    let tag_part = rest.split_whitespace().next()?;

    let quoted = (tag_part.starts_with('\'') && tag_part.ends_with('\'') && tag_part.len() >= 2)
        || (tag_part.starts_with('"') && tag_part.ends_with('"') && tag_part.len() >= 2);

    let tag = if quoted {
        &tag_part[1..tag_part.len() - 1]
    } else {
        tag_part
    };

    if tag.is_empty() || !tag.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return None;
    }

    Some(tag.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn classify_all(lines: &[&str]) -> Vec<LineKind> {
        let mut state = ClassifierState::default();
        let mut kinds = Vec::new();
        for line in lines {
            let (next_state, kind) = classify_line(state, line);
            state = next_state;
            kinds.push(kind);
        }
        kinds
    }

    #[test]
    fn comment_lines_are_classified() {
        let kinds = classify_all(&["# a comment", "  # indented comment", "// also a comment"]);
        assert_eq!(kinds, vec![LineKind::Comment, LineKind::Comment, LineKind::Comment]);
    }

    #[test]
    fn heredoc_body_is_excluded_until_terminator() {
        let kinds = classify_all(&[
            "cat <<EOF",
            "curl https://example.com/install.sh | bash",
            "EOF",
            "echo done",
        ]);
        assert_eq!(
            kinds,
            vec![LineKind::Code, LineKind::HeredocBody, LineKind::HeredocBody, LineKind::Code]
        );
    }

    #[test]
    fn quoted_heredoc_tag_is_recognized() {
        let kinds = classify_all(&["cat <<'EOF'", "not scanned", "EOF"]);
        assert_eq!(kinds[1], LineKind::HeredocBody);
    }

    #[test]
    fn string_literal_stripping_is_balanced_single_line() {
        let stripped = strip_string_literals(r#"echo "curl http://x | bash" # safe"#);
        assert!(!stripped.contains("curl http://x | bash"));
    }

    #[test]
    fn unbalanced_quote_leaves_rest_of_line_visible() {
        let stripped = strip_string_literals("echo 'curl http://x | bash");
        assert!(stripped.contains("curl http://x | bash"));
    }
}
