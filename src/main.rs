//! Entry point: argument parsing, logging setup, and subcommand dispatch
//! (spec §4.12–§4.14). Subsystem wiring happens here; the subsystems
//! themselves stay free of any knowledge of `clap`/`tracing`.

use std::io::{self, IsTerminal, Write as _};
use std::process::ExitCode;

use clap::Parser;
use serde::Serialize;
use tracing_subscriber::EnvFilter;

mod audit;
mod cache;
mod cli;
mod command_scan;
mod config;
mod discover;
mod emitter;
mod error;
mod install;
mod manifest;
mod permission;
mod platform;
mod resolver;
mod scanner;
mod session_registry;
mod signature;
mod update;

use audit::{AuditEvent, AuditLog, EventCategory, EventOutcome};
use cache::ModuleCache;
use cli::{Cli, Commands};
use error::ZephyrError;
use permission::{Capability, Session};
use platform::CurrentPlatform;
use session_registry::SessionRegistry;

struct Context {
    home: std::path::PathBuf,
    modules_dir: std::path::PathBuf,
    cache: ModuleCache,
    audit: AuditLog,
    sessions: SessionRegistry,
    security: config::SecurityConfig,
    session: Session,
    platform: CurrentPlatform,
}

fn init_tracing(cli: &Cli) {
    let level = if cli.trace {
        "trace"
    } else if cli.debug {
        "debug"
    } else if cli.verbose {
        "info"
    } else {
        "warn"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_ansi(!cli.no_color && io::stderr().is_terminal() && std::env::var("NO_COLOR").is_err())
        .init();
}

fn build_context() -> Context {
    let home = cli::home_dir();
    let modules_dir = cli::modules_dir(&home);
    let cache = ModuleCache::init(&cli::cache_dir(&home));
    let mut audit = AuditLog::init(&home);
    let sessions = SessionRegistry::init(&home);
    let security = config::load(&home);
    let session = permission::detect_session(&security.role_table);
    let platform = CurrentPlatform::detect();

    let _ = audit.append(&AuditEvent::new(
        Some(&session),
        EventCategory::Session,
        "session_detected",
        EventOutcome::Success,
    ));

    Context {
        home,
        modules_dir,
        cache,
        audit,
        sessions,
        security,
        session,
        platform,
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(&cli);

    let mut ctx = build_context();

    match dispatch(&cli.command, &mut ctx) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            let code = err.exit_code();
            eprintln!("✗ {err}");
            if let Some(suggestion) = err.suggestion() {
                eprintln!("\nSuggested fixes:\n  {suggestion}");
            }
            ExitCode::from(code)
        }
    }
}

fn dispatch(command: &Commands, ctx: &mut Context) -> Result<(), ZephyrError> {
    match command {
        Commands::Load => cmd_load(ctx),
        Commands::List => cmd_list(ctx),
        Commands::Validate => cmd_validate(ctx),
        Commands::Init { name } => cmd_init(ctx, name),
        Commands::Install {
            source,
            unsafe_mode,
            force,
            skip_scan,
            local,
            issuer_key,
        } => cmd_install(ctx, source, *unsafe_mode, *force, *skip_scan, *local, issuer_key.clone()),
        Commands::Update {
            module,
            check,
            unsafe_mode,
            force,
            skip_scan,
        } => cmd_update(ctx, module.clone(), *check, *unsafe_mode, *force, *skip_scan),
        Commands::Uninstall { name, force, yes } => cmd_uninstall(ctx, name, *force, *yes),
        Commands::Scan { target, json } => cmd_scan(ctx, target, *json),
        Commands::Session => cmd_session(ctx),
        Commands::Sessions => cmd_sessions(ctx),
        Commands::Audit { category, since, agent } => {
            cmd_audit(ctx, category.clone(), since.clone(), agent.clone())
        }
        Commands::RegisterSession { session_id } => cmd_register_session(ctx, session_id.clone()),
        Commands::Version { short } => cmd_version(*short),
        Commands::Config { add_trusted } => cmd_config(ctx, add_trusted.clone()),
    }
}

fn discover_compatible(ctx: &mut Context) -> Vec<manifest::Module> {
    discover::discover(&ctx.modules_dir, &mut ctx.cache)
        .into_iter()
        .filter(|m| platform::is_compatible(m, &ctx.platform))
        .collect()
}

fn cmd_load(ctx: &mut Context) -> Result<(), ZephyrError> {
    let modules = discover_compatible(ctx);
    let resolved = resolve_cached(ctx, modules)?;
    let out = emitter::emit(&resolved, &ctx.session);
    print!("{out}");
    Ok(())
}

/// Resolves `modules` into a load order, consulting the cache's
/// resolution-order mapping keyed on a hash of the considered module paths
/// before falling back to a fresh topological sort (spec §3 `Module_Cache`).
fn resolve_cached(ctx: &mut Context, modules: Vec<manifest::Module>) -> Result<Vec<manifest::Module>, ZephyrError> {
    let key = resolution_cache_key(&modules);

    if let Some(order) = ctx.cache.get_resolution(&key) {
        if let Some(reordered) = reorder_modules(&modules, order) {
            return Ok(reordered);
        }
    }

    let resolved = resolver::resolve(modules)?;
    let order: Vec<String> = resolved.iter().map(|m| m.name.clone()).collect();
    ctx.cache.put_resolution(key, order);
    Ok(resolved)
}

/// Deterministic key for the set of module paths under consideration,
/// independent of discovery order.
fn resolution_cache_key(modules: &[manifest::Module]) -> String {
    use std::hash::{Hash, Hasher};

    let mut paths: Vec<String> = modules
        .iter()
        .map(|m| m.path.display().to_string())
        .collect();
    paths.sort();

    let mut hasher = std::collections::hash_map::DefaultHasher::new();
    paths.hash(&mut hasher);
    format!("{:x}", hasher.finish())
}

/// Reconstructs a load order from a cached name ordering. Falls back to
/// `None` (forcing a fresh resolve) if the cached order and the current
/// module set disagree in membership, which can happen on a stale hash
/// collision or a manifest rename that didn't change its path.
fn reorder_modules(modules: &[manifest::Module], order: &[String]) -> Option<Vec<manifest::Module>> {
    if order.len() != modules.len() {
        return None;
    }
    let mut by_name: std::collections::HashMap<&str, manifest::Module> =
        modules.iter().map(|m| (m.name.as_str(), m.clone())).collect();

    let mut reordered = Vec::with_capacity(order.len());
    for name in order {
        reordered.push(by_name.remove(name.as_str())?);
    }
    if !by_name.is_empty() {
        return None;
    }
    Some(reordered)
}

fn cmd_list(ctx: &mut Context) -> Result<(), ZephyrError> {
    let all = discover::discover(&ctx.modules_dir, &mut ctx.cache);
    for module in &all {
        let compatible = platform::is_compatible(module, &ctx.platform);
        let marker = if compatible { " " } else { "!" };
        println!(
            "{marker} {:<30} {:<10} priority={}",
            module.name, module.version, module.priority
        );
    }
    Ok(())
}

fn cmd_validate(ctx: &mut Context) -> Result<(), ZephyrError> {
    let all = discover::discover(&ctx.modules_dir, &mut ctx.cache);
    let mut incompatible = 0;
    for module in &all {
        if let Some(reason) = platform::incompatibility_reason(module, &ctx.platform) {
            println!("! {}: {reason}", module.name);
            incompatible += 1;
        }
    }
    let resolved = resolve_cached(ctx, all)?;
    println!(
        "{} module(s) discovered, {} incompatible with this platform, load order valid",
        resolved.len(),
        incompatible
    );
    let _ = ctx.audit.append(&AuditEvent::new(
        Some(&ctx.session),
        EventCategory::Command,
        "validate",
        EventOutcome::Success,
    ));
    Ok(())
}

fn cmd_init(ctx: &Context, name: &str) -> Result<(), ZephyrError> {
    manifest::validate_name(name).map_err(|reason| {
        ZephyrError::Manifest(error::ManifestError::Invalid {
            path: ctx.modules_dir.join(name).join("module.toml"),
            reason,
        })
    })?;

    let dir = ctx.modules_dir.join(name);
    if dir.exists() {
        return Err(ZephyrError::InvalidArgument(format!(
            "{} already exists",
            dir.display()
        )));
    }
    std::fs::create_dir_all(&dir)?;
    std::fs::write(
        dir.join("module.toml"),
        format!(
            "[module]\nname = \"{name}\"\nversion = \"0.1.0\"\n\n[load]\npriority = 100\nfiles = [\"init.zsh\"]\n"
        ),
    )?;
    std::fs::write(dir.join("init.zsh"), "# new module, fill me in\n")?;
    println!("Initialized module '{name}' at {}", dir.display());
    Ok(())
}

#[allow(clippy::too_many_arguments)]
fn cmd_install(
    ctx: &mut Context,
    source: &str,
    unsafe_mode: bool,
    force: bool,
    skip_scan: bool,
    local: bool,
    issuer_key: Option<String>,
) -> Result<(), ZephyrError> {
    if unsafe_mode {
        install::check_unsafe_permission(Some(&ctx.session), &ctx.security.role_table, &mut ctx.audit)?;
    }

    let unsigned_allowed = permission::check_permission(
        Some(&ctx.session),
        &ctx.security.role_table,
        Capability::InstallUnsigned,
        "install (unsigned)",
        &mut ctx.audit,
    )
    .is_ok();
    let may_confirm = permission::check_permission(
        Some(&ctx.session),
        &ctx.security.role_table,
        Capability::RequireConfirmation,
        "install (warning confirmation)",
        &mut ctx.audit,
    )
    .is_ok();

    let temp_root = ctx.cache_temp_root();
    let options = install::InstallOptions {
        unsafe_mode,
        force,
        skip_scan,
        allow_local: local,
        expected_name: None,
        interactive: io::stdin().is_terminal() && may_confirm,
        issuer_public_key_b64: issuer_key,
        require_signature: !unsigned_allowed,
    };

    let outcome = install::install(
        source,
        &ctx.modules_dir,
        &temp_root,
        &options,
        &ctx.platform,
        Some(&ctx.session),
        &mut ctx.audit,
    )?;

    println!(
        "Installed '{}' {} ({})",
        outcome.module.name,
        outcome.module.version,
        if outcome.signature_verified {
            "signature verified"
        } else {
            "unsigned"
        }
    );
    Ok(())
}

fn cmd_update(
    ctx: &mut Context,
    module: Option<String>,
    check: bool,
    unsafe_mode: bool,
    force: bool,
    skip_scan: bool,
) -> Result<(), ZephyrError> {
    let targets: Vec<manifest::Module> = match &module {
        Some(name) => {
            let path = ctx.modules_dir.join(name).join("module.toml");
            vec![manifest::parse_manifest(&path)?]
        }
        None => discover::discover(&ctx.modules_dir, &mut ctx.cache),
    };

    let options = update::UpdateOptions {
        unsafe_mode,
        skip_scan,
        interactive: force || io::stdin().is_terminal(),
    };

    for target in &targets {
        let outcome = update::update(&target.path, &options, &ctx.platform, Some(&ctx.session), &mut ctx.audit)?;
        if check {
            println!(
                "{}: {} -> {} (check only, not applied)",
                target.name, outcome.previous_version, outcome.module.version
            );
        } else if outcome.updated {
            println!(
                "{}: updated {} -> {}",
                target.name, outcome.previous_version, outcome.module.version
            );
        } else {
            println!("{}: already up to date", target.name);
        }
    }
    Ok(())
}

fn cmd_uninstall(ctx: &mut Context, name: &str, force: bool, yes: bool) -> Result<(), ZephyrError> {
    permission::check_permission(
        Some(&ctx.session),
        &ctx.security.role_table,
        Capability::Uninstall,
        "uninstall",
        &mut ctx.audit,
    )?;

    let target = ctx.modules_dir.join(name);
    if !target.exists() {
        return Err(ZephyrError::InvalidArgument(format!(
            "module '{name}' is not installed"
        )));
    }

    if !force {
        let all = discover::discover(&ctx.modules_dir, &mut ctx.cache);
        let dependents: Vec<&str> = all
            .iter()
            .filter(|m| m.name != name && m.required.iter().any(|r| r == name))
            .map(|m| m.name.as_str())
            .collect();
        if !dependents.is_empty() {
            return Err(ZephyrError::InvalidArgument(format!(
                "module(s) [{}] require '{name}'; pass --force to remove anyway",
                dependents.join(", ")
            )));
        }
    }

    if !yes && io::stdin().is_terminal() {
        print!("Remove '{name}' at {}? [y/N] ", target.display());
        io::stdout().flush().ok();
        let mut line = String::new();
        io::stdin().read_line(&mut line).ok();
        if !line.trim().eq_ignore_ascii_case("y") {
            println!("Aborted.");
            return Ok(());
        }
    }

    std::fs::remove_dir_all(&target)?;
    let _ = ctx.audit.append(
        &AuditEvent::new(Some(&ctx.session), EventCategory::Operation, "uninstall", EventOutcome::Success)
            .with_detail("module", name.to_string()),
    );
    println!("Removed '{name}'.");
    Ok(())
}

#[derive(Serialize)]
struct ScanSourceJson {
    #[serde(rename = "type")]
    kind: &'static str,
    url: String,
    commit: Option<String>,
}

#[derive(Serialize)]
struct ScanSummaryJson {
    files_scanned: usize,
    lines_scanned: usize,
    duration_ms: u128,
    critical_findings: usize,
    warning_findings: usize,
}

#[derive(Serialize)]
struct FindingJson {
    severity: String,
    pattern: String,
    description: String,
    file: String,
    line: usize,
    snippet: String,
    bypass_required: bool,
}

#[derive(Serialize)]
struct ScanReportJson {
    schema_version: u32,
    source: ScanSourceJson,
    scan_summary: ScanSummaryJson,
    policy_recommendation: &'static str,
    exit_code_hint: u8,
    findings: Vec<FindingJson>,
}

fn cmd_scan(ctx: &mut Context, target: &str, json: bool) -> Result<(), ZephyrError> {
    let path = std::path::Path::new(target);
    let started = std::time::Instant::now();

    let (result, source_kind) = if path.is_dir() {
        let scanner = scanner::Scanner::with_allowlist(ctx.security.trusted_modules.clone())?;
        (scanner.scan_module_root(path), "directory")
    } else {
        let scanner = command_scan::CommandScanner::new()?;
        let command_result = scanner.scan(target);
        let mut result = scanner::ScanResult {
            success: true,
            files_scanned: 0,
            lines_scanned: target.lines().count(),
            ..Default::default()
        };
        for description in &command_result.matched_descriptions {
            let is_critical = command_result.severity == scanner::patterns::Severity::Critical;
            if is_critical {
                result.critical_count += 1;
            } else {
                result.warning_count += 1;
            }
            result.findings.push(scanner::Finding {
                severity: command_result.severity,
                pattern_description: description.clone(),
                file_path: std::path::PathBuf::from("<command>"),
                line_number: 1,
                line_text: target.to_string(),
            });
        }
        (result, "command")
    };

    let duration_ms = started.elapsed().as_millis();
    let gated_critical = result.gated_critical_count();

    if json {
        let report = ScanReportJson {
            schema_version: 1,
            source: ScanSourceJson {
                kind: source_kind,
                url: target.to_string(),
                commit: None,
            },
            scan_summary: ScanSummaryJson {
                files_scanned: result.files_scanned,
                lines_scanned: result.lines_scanned,
                duration_ms,
                critical_findings: result.critical_count,
                warning_findings: result.warning_count,
            },
            policy_recommendation: if gated_critical > 0 {
                "reject"
            } else if result.warning_count > 0 {
                "confirm"
            } else {
                "allow"
            },
            exit_code_hint: if gated_critical > 0 { 2 } else { 0 },
            findings: result
                .findings
                .iter()
                .map(|f| FindingJson {
                    severity: format!("{:?}", f.severity).to_lowercase(),
                    pattern: f.pattern_description.clone(),
                    description: f.pattern_description.clone(),
                    file: f.file_path.display().to_string(),
                    line: f.line_number,
                    snippet: f.line_text.clone(),
                    bypass_required: false,
                })
                .collect(),
        };
        println!("{}", serde_json::to_string_pretty(&report).map_err(error::AuditError::from)?);
    } else {
        println!(
            "{} file(s), {} line(s) scanned: {} critical, {} warning",
            result.files_scanned, result.lines_scanned, result.critical_count, result.warning_count
        );
        for finding in &result.findings {
            println!(
                "  [{:?}] {}:{} — {}",
                finding.severity,
                finding.file_path.display(),
                finding.line_number,
                finding.pattern_description
            );
        }
    }

    let outcome = if gated_critical > 0 {
        EventOutcome::Failure
    } else {
        EventOutcome::Success
    };
    let _ = ctx.audit.append(
        &AuditEvent::new(Some(&ctx.session), EventCategory::Command, "scan", outcome)
            .with_detail("target", target.to_string())
            .with_detail("critical_findings", gated_critical.to_string()),
    );

    if gated_critical > 0 {
        return Err(ZephyrError::Scan(error::ScanError::CriticalFindings(gated_critical)));
    }
    Ok(())
}

fn cmd_session(ctx: &Context) -> Result<(), ZephyrError> {
    println!(
        "agent_id={}\nagent_type={}\nsession_id={}\nrole={}",
        ctx.session.agent_id, ctx.session.agent_type, ctx.session.session_id, ctx.session.role
    );
    Ok(())
}

fn cmd_sessions(ctx: &Context) -> Result<(), ZephyrError> {
    for session in ctx.sessions.iter() {
        println!(
            "{} {} {} {}",
            session.session_id, session.agent_id, session.agent_type, session.role
        );
    }
    Ok(())
}

fn cmd_audit(
    ctx: &Context,
    category: Option<String>,
    since: Option<String>,
    agent: Option<String>,
) -> Result<(), ZephyrError> {
    let category = category.and_then(|c| match c.as_str() {
        "operations" => Some(EventCategory::Operation),
        "commands" => Some(EventCategory::Command),
        "sessions" => Some(EventCategory::Session),
        "permissions" => Some(EventCategory::Permission),
        _ => None,
    });
    let since = since.and_then(|s| chrono::DateTime::parse_from_rfc3339(&s).ok()).map(|d| d.with_timezone(&chrono::Utc));

    let events = ctx.audit.read_events(category, since, agent.as_deref());
    for event in events {
        println!(
            "{} {:?} {} {:?} agent={}",
            event.timestamp, event.event_category, event.event_action, event.event_outcome, event.agent_id
        );
    }
    Ok(())
}

fn cmd_register_session(ctx: &mut Context, session_id: Option<String>) -> Result<(), ZephyrError> {
    let mut session = ctx.session.clone();
    if let Some(id) = session_id {
        session.session_id = id;
    }
    permission::register_session(&session, &mut ctx.sessions);
    println!("registered session {}", session.session_id);
    Ok(())
}

fn cmd_config(ctx: &mut Context, add_trusted: Option<String>) -> Result<(), ZephyrError> {
    match add_trusted {
        Some(path) => {
            permission::check_permission(
                Some(&ctx.session),
                &ctx.security.role_table,
                Capability::ModifyConfig,
                "config --add-trusted",
                &mut ctx.audit,
            )?;

            config::add_trusted_module(&ctx.home, std::path::Path::new(&path))?;
            ctx.security.trusted_modules.push(std::path::PathBuf::from(&path));
            let _ = ctx.audit.append(
                &AuditEvent::new(Some(&ctx.session), EventCategory::Command, "config", EventOutcome::Success)
                    .with_detail("action", "add_trusted".to_string())
                    .with_detail("path", path.clone()),
            );
            println!("Added '{path}' to the trusted-module allowlist.");
        }
        None => {
            println!("trusted modules:");
            for module in &ctx.security.trusted_modules {
                println!("  {}", module.display());
            }
        }
    }
    Ok(())
}

fn cmd_version(short: bool) -> Result<(), ZephyrError> {
    if short {
        println!("{}", env!("CARGO_PKG_VERSION"));
    } else {
        println!("zephyr {}", env!("CARGO_PKG_VERSION"));
    }
    Ok(())
}

impl Context {
    fn cache_temp_root(&self) -> std::path::PathBuf {
        cli::cache_dir(&self.home).join("tmp")
    }
}
