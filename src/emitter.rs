//! Shell-source emitter: produces the snippet `eval`'d by `zephyr load`
//! (spec §4.11). Emission is deterministic given a resolver output, modulo
//! the session UUID line.

use std::fmt::Write as _;

use crate::manifest::Module;
use crate::permission::Session;

/// Renders the full shell snippet for a resolved load order and the current
/// session.
pub fn emit(resolved: &[Module], session: &Session) -> String {
    let mut out = String::new();

    writeln!(out, "export ZEPHYR_AGENT_ID={}", shell_quote(&session.agent_id)).unwrap();
    writeln!(out, "export ZEPHYR_AGENT_TYPE={}", shell_quote(&session.agent_type)).unwrap();
    writeln!(out, "export ZEPHYR_SESSION_ID={}", shell_quote(&session.session_id)).unwrap();
    writeln!(out, "zephyr register-session --session-id \"$ZEPHYR_SESSION_ID\" >/dev/null 2>&1 || true").unwrap();

    for module in resolved {
        emit_module(&mut out, module);
    }

    out
}

fn emit_module(out: &mut String, module: &Module) {
    writeln!(out, "# module: {} ({})", module.name, module.version).unwrap();

    for (key, value) in &module.settings {
        let var_name = format!(
            "ZSH_MODULE_{}_{}",
            module.name.to_ascii_uppercase().replace('-', "_"),
            key.to_ascii_uppercase().replace('-', "_")
        );
        writeln!(out, "export {var_name}={}", shell_quote(value)).unwrap();
    }

    if let Some(hook) = &module.pre_load {
        writeln!(out, "{hook}").unwrap();
    }

    for file in &module.files {
        let abs = module.path.join(file);
        writeln!(out, "source {}", shell_quote(&abs.display().to_string())).unwrap();
    }

    if let Some(hook) = &module.post_load {
        writeln!(out, "{hook}").unwrap();
    }
}

/// Single-quotes `value` for safe embedding in the emitted shell source,
/// escaping any embedded single quotes.
fn shell_quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', "'\\''"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::permission::Role;
    use indexmap::IndexMap;
    use std::path::PathBuf;

    fn session() -> Session {
        Session {
            agent_id: "me".into(),
            agent_type: "human".into(),
            session_id: "11111111-1111-1111-1111-111111111111".into(),
            parent_process_name: "zsh".into(),
            role: Role::User,
        }
    }

    fn module(name: &str, priority: i64) -> Module {
        let mut settings = IndexMap::new();
        settings.insert("theme".to_string(), "dark".to_string());
        Module {
            name: name.to_string(),
            version: "1.0.0".to_string(),
            priority,
            files: vec!["init.zsh".to_string()],
            settings,
            path: PathBuf::from("/modules").join(name),
            pre_load: Some("echo pre".to_string()),
            post_load: Some("echo post".to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn emission_is_deterministic_for_identical_input() {
        let modules = vec![module("a", 10), module("b", 20)];
        let s = session();
        assert_eq!(emit(&modules, &s), emit(&modules, &s));
    }

    #[test]
    fn settings_become_uppercase_env_vars() {
        let modules = vec![module("my-mod", 10)];
        let output = emit(&modules, &session());
        assert!(output.contains("export ZSH_MODULE_MY_MOD_THEME='dark'"));
    }

    #[test]
    fn hooks_and_files_are_emitted_in_order() {
        let modules = vec![module("a", 10)];
        let output = emit(&modules, &session());
        let pre = output.find("echo pre").unwrap();
        let source = output.find("source").unwrap();
        let post = output.find("echo post").unwrap();
        assert!(pre < source && source < post);
    }

    #[test]
    fn files_are_sourced_as_absolute_paths() {
        let modules = vec![module("a", 10)];
        let output = emit(&modules, &session());
        assert!(output.contains("/modules/a/init.zsh"));
    }
}
