//! tgwc CLI entrypoint.
//!
//! This is the main entrypoint for the tgwc command-line tool.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use tgw_connect::cli::{
    Cli, Commands, OutputFormatter, ResourceKindArg, SchemaKind, StateCommands,
};
use tgw_connect::config::{
    find_config_file, ConfigHasher, ConfigParser, ConfigValidator, StackConfig, ENDPOINT_VAR,
};
use tgw_connect::error::{ConfigError, ReconcileError, Result, TgwError};
use tgw_connect::gateway::{GatewayClient, HttpGatewayClient};
use tgw_connect::planner::{
    ApplyPlan, DiffEngine, ExecutionResult, PlanExecutor, StackReconcilers,
};
use tgw_connect::reconciler::{
    Attachment, AttachmentLookup, LookupCriteria, Peer, ResourceKind,
};
use tgw_connect::state::{
    HistoryEntry, LocalStateStore, ResourceState, StackState, StateOperation, StateStore,
};

use clap::Parser;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

/// Main entrypoint.
fn main() -> ExitCode {
    let cli = Cli::parse();

    init_logging(cli.verbose, cli.log_json);

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("Failed to create async runtime: {e}");
            return ExitCode::FAILURE;
        }
    };

    match runtime.block_on(run(cli)) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}

/// Initializes the logging system.
///
/// `RUST_LOG` wins over `--verbose` when set.
fn init_logging(verbose: bool, json: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr);

    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

/// Main async entry point.
async fn run(cli: Cli) -> Result<()> {
    let formatter = OutputFormatter::new(cli.output);
    let config = cli.config.as_ref();

    match cli.command {
        Commands::Init { path, force } => cmd_init(&path, force),
        Commands::Validate { warnings } => cmd_validate(config, warnings, &formatter),
        Commands::Plan => cmd_plan(config, &formatter).await,
        Commands::Apply {
            yes,
            continue_on_error,
        } => cmd_apply(config, yes, continue_on_error, &formatter).await,
        Commands::Refresh => cmd_refresh(config, &formatter).await,
        Commands::Import { kind, name, id } => {
            cmd_import(config, kind, &name, &id, &formatter).await
        }
        Commands::Lookup { id, filters } => cmd_lookup(config, id, filters, &formatter).await,
        Commands::Destroy { yes } => cmd_destroy(config, yes, &formatter).await,
        Commands::Schema { kind } => cmd_schema(kind, &formatter),
        Commands::State { command } => cmd_state(config, command, &formatter).await,
    }
}

/// Initialize a new stack directory.
fn cmd_init(path: &Path, force: bool) -> Result<()> {
    info!("Initializing new stack in: {}", path.display());

    let config_path = path.join("tgwc.yaml");
    let env_path = path.join(".env.example");
    let gitignore_path = path.join(".gitignore");

    if !force && config_path.exists() {
        eprintln!("Configuration file already exists: {}", config_path.display());
        eprintln!("Use --force to overwrite.");
        return Ok(());
    }

    if !path.exists() {
        std::fs::create_dir_all(path)?;
    }

    std::fs::write(&config_path, include_str!("../templates/tgwc.yaml"))?;
    eprintln!("Created: {}", config_path.display());

    std::fs::write(&env_path, include_str!("../templates/.env.example"))?;
    eprintln!("Created: {}", env_path.display());

    if gitignore_path.exists() {
        let existing = std::fs::read_to_string(&gitignore_path)?;
        let missing: Vec<&str> = [".env", ".tgwc/"]
            .into_iter()
            .filter(|entry| !existing.lines().any(|line| line.trim() == *entry))
            .collect();
        if !missing.is_empty() {
            let mut file = std::fs::OpenOptions::new()
                .append(true)
                .open(&gitignore_path)?;
            writeln!(file, "\n# tgwc")?;
            for entry in missing {
                writeln!(file, "{entry}")?;
            }
            eprintln!("Updated: {}", gitignore_path.display());
        }
    } else {
        std::fs::write(&gitignore_path, ".env\n.tgwc/\n")?;
        eprintln!("Created: {}", gitignore_path.display());
    }

    eprintln!("\nStack initialized.");
    eprintln!("Next steps:");
    eprintln!("  1. Copy .env.example to .env and set TGWC_API_TOKEN");
    eprintln!("  2. Edit tgwc.yaml with your attachments and peers");
    eprintln!("  3. Run 'tgwc validate' to check your configuration");
    eprintln!("  4. Run 'tgwc plan' to see what will change");
    eprintln!("  5. Run 'tgwc apply' to converge");

    Ok(())
}

/// Validate configuration.
fn cmd_validate(
    config_path: Option<&PathBuf>,
    show_warnings: bool,
    formatter: &OutputFormatter,
) -> Result<()> {
    let config_file = resolve_config_path(config_path)?;
    info!("Validating configuration: {}", config_file.display());

    let parser = ConfigParser::new().with_base_path(config_dir(&config_file));
    parser.load_dotenv()?;
    let config = parser.load_file(&config_file)?;

    let result = ConfigValidator::new().check(&config);
    emit(&formatter.format_validation(&result, show_warnings))?;

    if !result.is_valid() {
        return Err(ConfigError::validation_general(format!(
            "{} error(s) in {}",
            result.error_count(),
            config_file.display()
        ))
        .into());
    }

    let hasher = ConfigHasher::new();
    eprintln!("\nConfiguration summary:");
    eprintln!("  Stack: {}", config.stack.name);
    eprintln!("  Attachments: {}", config.attachments.len());
    eprintln!("  Peers: {}", config.peers.len());
    eprintln!("  Hash: {}", hasher.short_hash(&hasher.hash_config(&config)));

    Ok(())
}

/// Refresh state and show the apply plan.
async fn cmd_plan(config_path: Option<&PathBuf>, formatter: &OutputFormatter) -> Result<()> {
    let (config, state_store) = load_config_and_state(config_path)?;
    let reconcilers = StackReconcilers::new(create_client(&config)?, &config);

    let mut state = load_state(&*state_store, &config).await?;
    reconcilers.refresh(&mut state).await?;

    let diff = DiffEngine::new().compute_diff(&config, &state);
    let plan = ApplyPlan::from_diff(&diff, &config, &state);

    emit(&formatter.format_plan(&plan))
}

/// Apply the plan.
async fn cmd_apply(
    config_path: Option<&PathBuf>,
    auto_approve: bool,
    continue_on_error: bool,
    formatter: &OutputFormatter,
) -> Result<()> {
    let (config, state_store) = load_config_and_state(config_path)?;
    let reconcilers = StackReconcilers::new(create_client(&config)?, &config);

    with_lock(&*state_store, async {
        let mut state = load_state(&*state_store, &config).await?;
        reconcilers.refresh(&mut state).await?;

        let diff = DiffEngine::new().compute_diff(&config, &state);
        let plan = ApplyPlan::from_diff(&diff, &config, &state);

        emit(&formatter.format_plan(&plan))?;
        if plan.is_empty() {
            state_store.save(&state).await?;
            return Ok(());
        }
        if !plan.passes_guardrails {
            return Err(ReconcileError::Aborted {
                reason: plan.guardrail_violations.join("; "),
            }
            .into());
        }

        if !auto_approve && !confirm("Do you want to apply this plan? [y/N]: ", "y")? {
            eprintln!("Apply cancelled.");
            return Ok(());
        }

        let result = PlanExecutor::new(&reconcilers, &config)
            .with_continue_on_error(continue_on_error)
            .execute(&plan, &mut state)
            .await?;

        state_store.save(&state).await?;
        emit(&formatter.format_execution(&result))?;
        check_execution(&result)
    })
    .await
}

/// Re-read recorded resources and save the result.
async fn cmd_refresh(config_path: Option<&PathBuf>, formatter: &OutputFormatter) -> Result<()> {
    let (config, state_store) = load_config_and_state(config_path)?;
    let reconcilers = StackReconcilers::new(create_client(&config)?, &config);

    with_lock(&*state_store, async {
        let Some(mut state) = state_store.load().await? else {
            emit(&formatter.format_message("No state found, nothing to refresh."))?;
            return Ok(());
        };

        let report = reconcilers.refresh(&mut state).await?;
        let mut resources = report.refreshed.clone();
        resources.extend(report.vanished.iter().cloned());
        state.add_history(HistoryEntry::new(StateOperation::Refresh, resources));
        state_store.save(&state).await?;

        emit(&formatter.format_refresh(&report))
    })
    .await
}

/// Adopt an existing remote object into state.
///
/// The object must be declared under `name`; its declaration hash is
/// recorded so the next plan compares against it.
async fn cmd_import(
    config_path: Option<&PathBuf>,
    kind: ResourceKindArg,
    name: &str,
    id: &str,
    formatter: &OutputFormatter,
) -> Result<()> {
    let (config, state_store) = load_config_and_state(config_path)?;
    let reconcilers = StackReconcilers::new(create_client(&config)?, &config);
    let hasher = ConfigHasher::new();

    with_lock(&*state_store, async {
        let mut state = load_state(&*state_store, &config).await?;

        let address = match kind {
            ResourceKindArg::Attachment => {
                let declared = config.find_attachment(name).ok_or_else(|| {
                    ConfigError::validation(
                        format!("no attachment named '{name}' is declared"),
                        "attachments",
                    )
                })?;
                if state.attachments.contains_key(name) {
                    return Err(already_managed("attachment", name));
                }

                let data = reconcilers.attachments.import(id).await?;
                let mut entry = ResourceState::new(name, id, &hasher.hash_attachment(declared));
                if let Some(attributes) = data.attributes {
                    entry = entry.with_attributes(attributes);
                }
                state.set_attachment(entry);
                format!("attachment.{name}")
            }
            ResourceKindArg::Peer => {
                let declared = config.find_peer(name).ok_or_else(|| {
                    ConfigError::validation(format!("no peer named '{name}' is declared"), "peers")
                })?;
                if state.peers.contains_key(name) {
                    return Err(already_managed("peer", name));
                }

                let data = reconcilers.peers.import(id).await?;
                let mut entry = ResourceState::new(name, id, &hasher.hash_peer(declared))
                    .with_attachment(declared.attachment.clone());
                if let Some(attributes) = data.attributes {
                    entry = entry.with_attributes(attributes);
                }
                state.set_peer(entry);
                format!("peer.{name}")
            }
        };

        state.add_history(HistoryEntry::new(StateOperation::Import, vec![address.clone()]));
        state_store.save(&state).await?;

        emit(&formatter.format_message(&format!("Imported {address} ({id})")))
    })
    .await
}

/// Find exactly one Connect attachment.
async fn cmd_lookup(
    config_path: Option<&PathBuf>,
    id: Option<String>,
    filters: Vec<(String, Vec<String>)>,
    formatter: &OutputFormatter,
) -> Result<()> {
    let (config, _state_store) = load_config_and_state(config_path)?;
    let lookup = AttachmentLookup::new(create_client(&config)?, config.tag_settings());

    let mut criteria = id.map_or_else(LookupCriteria::default, LookupCriteria::by_id);
    for (name, values) in filters {
        criteria = criteria.with_filter(name, values);
    }

    let result = lookup.find_one(&criteria).await?;
    emit(&formatter.format_lookup(&result))
}

/// Destroy everything recorded in state.
async fn cmd_destroy(
    config_path: Option<&PathBuf>,
    auto_approve: bool,
    formatter: &OutputFormatter,
) -> Result<()> {
    let (config, state_store) = load_config_and_state(config_path)?;
    let reconcilers = StackReconcilers::new(create_client(&config)?, &config);

    with_lock(&*state_store, async {
        let Some(mut state) = state_store.load().await? else {
            emit(&formatter.format_message("No state found, nothing to destroy."))?;
            return Ok(());
        };

        reconcilers.refresh(&mut state).await?;
        let plan = ApplyPlan::destroy(&state, config.guardrails.prevent_destroy);

        emit(&formatter.format_plan(&plan))?;
        if plan.is_empty() {
            state_store.save(&state).await?;
            return Ok(());
        }
        if !plan.passes_guardrails {
            return Err(ReconcileError::Aborted {
                reason: plan.guardrail_violations.join("; "),
            }
            .into());
        }

        if !auto_approve
            && !confirm(
                "\nThis action is IRREVERSIBLE. Type 'destroy' to confirm: ",
                "destroy",
            )?
        {
            eprintln!("Destruction cancelled.");
            return Ok(());
        }

        let result = PlanExecutor::new(&reconcilers, &config)
            .with_continue_on_error(true)
            .execute(&plan, &mut state)
            .await?;

        state_store.save(&state).await?;
        emit(&formatter.format_execution(&result))?;
        check_execution(&result)
    })
    .await
}

/// Print a schema.
fn cmd_schema(kind: SchemaKind, formatter: &OutputFormatter) -> Result<()> {
    let schema = match kind {
        SchemaKind::Attachment => Attachment::schema(),
        SchemaKind::Peer => Peer::schema(),
        SchemaKind::AttachmentLookup => AttachmentLookup::schema(),
    };
    emit(&formatter.format_schema(&schema))
}

/// State management commands.
async fn cmd_state(
    config_path: Option<&PathBuf>,
    command: StateCommands,
    formatter: &OutputFormatter,
) -> Result<()> {
    let (_config, state_store) = load_config_and_state(config_path)?;

    match command {
        StateCommands::Show => {
            if let Some(state) = state_store.load().await? {
                emit(&formatter.format_state(&state))?;
            } else {
                emit(&formatter.format_message("No state found."))?;
            }
        }
        StateCommands::Lock { holder } => {
            let lock = state_store
                .acquire_lock(holder.as_deref().unwrap_or_default())
                .await?;
            emit(&formatter.format_message(&format!("State locked by {lock}")))?;
        }
        StateCommands::Unlock { lock_id, force } => {
            if force {
                state_store.force_unlock().await?;
                emit(&formatter.format_message("State forcefully unlocked."))?;
            } else if let Some(id) = lock_id {
                state_store.release_lock(&id).await?;
                emit(&formatter.format_message("State unlocked."))?;
            } else {
                eprintln!("Please provide --lock-id or use --force");
            }
        }
    }

    Ok(())
}

// ============================================================================
// Helper Functions
// ============================================================================

/// Writes command output to stdout.
fn emit(text: &str) -> Result<()> {
    let mut stdout = std::io::stdout().lock();
    stdout.write_all(text.as_bytes())?;
    if !text.ends_with('\n') {
        stdout.write_all(b"\n")?;
    }
    stdout.flush()?;
    Ok(())
}

/// Asks on stderr and compares the answer read from stdin.
fn confirm(prompt: &str, expected: &str) -> Result<bool> {
    eprint!("{prompt}");
    std::io::stderr().flush()?;

    let mut input = String::new();
    std::io::stdin().read_line(&mut input)?;
    Ok(input.trim().eq_ignore_ascii_case(expected))
}

/// Runs `work` while holding the state lock.
///
/// The lock is released whatever the outcome; a release failure is only
/// logged when `work` itself failed.
async fn with_lock<F>(state_store: &dyn StateStore, work: F) -> Result<()>
where
    F: std::future::Future<Output = Result<()>>,
{
    let lock = state_store.acquire_lock("").await?;
    debug!("Acquired state lock {}", lock.lock_id);

    let outcome = work.await;
    let released = state_store.release_lock(&lock.lock_id).await;

    match (outcome, released) {
        (Err(e), Err(release)) => {
            warn!("Failed to release state lock {}: {release}", lock.lock_id);
            Err(e)
        }
        (Err(e), Ok(())) => Err(e),
        (Ok(()), released) => released,
    }
}

/// Turns failed actions into a non-zero exit.
fn check_execution(result: &ExecutionResult) -> Result<()> {
    if result.all_successful() {
        Ok(())
    } else {
        Err(TgwError::internal(format!(
            "{} action(s) failed, {} skipped, {} not run",
            result.failed, result.skipped, result.not_run
        )))
    }
}

fn already_managed(kind: &str, name: &str) -> TgwError {
    ConfigError::validation_general(format!(
        "{kind} '{name}' is already recorded in state"
    ))
    .into()
}

/// Resolves the configuration file path.
fn resolve_config_path(config_path: Option<&PathBuf>) -> Result<PathBuf> {
    match config_path {
        Some(path) => Ok(path.clone()),
        None => find_config_file(std::env::current_dir()?),
    }
}

fn config_dir(config_file: &Path) -> &Path {
    config_file.parent().unwrap_or_else(|| Path::new("."))
}

/// Loads and validates configuration, and opens its state store.
fn load_config_and_state(
    config_path: Option<&PathBuf>,
) -> Result<(StackConfig, Box<dyn StateStore>)> {
    let config_file = resolve_config_path(config_path)?;
    debug!("Loading configuration from: {}", config_file.display());

    let parser = ConfigParser::new().with_base_path(config_dir(&config_file));
    parser.load_dotenv()?;

    let config = parser.load_with_env(&config_file)?;
    ConfigValidator::new().validate(&config)?;

    let state_store: Box<dyn StateStore> =
        Box::new(LocalStateStore::with_base_dir(config.state.path.clone()));

    Ok((config, state_store))
}

/// Loads recorded state, or starts an empty one.
async fn load_state(state_store: &dyn StateStore, config: &StackConfig) -> Result<StackState> {
    Ok(state_store
        .load()
        .await?
        .unwrap_or_else(|| StackState::new(&config.stack.name)))
}

/// Creates the control-plane client.
fn create_client(config: &StackConfig) -> Result<Arc<dyn GatewayClient>> {
    let endpoint = config.provider.endpoint.as_deref().ok_or_else(|| {
        ConfigError::validation(
            format!("provider.endpoint is not set (set it in the file or via {ENDPOINT_VAR})"),
            "provider.endpoint",
        )
    })?;
    let api_token = ConfigParser::get_api_token()?;

    Ok(Arc::new(HttpGatewayClient::new(endpoint, &api_token)?))
}
