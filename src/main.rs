use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::Parser;

use parity_fuzz::artifact::loader::{self, LoadedBundle};
use parity_fuzz::artifact::{replay, writer, BundleMetadata, ReplayBundleResult, ReplaySummary, RunSummary};
use parity_fuzz::cli::{self, Cli, Commands, OutputFormat};
use parity_fuzz::comparator::{Comparator, ComparisonResult, MismatchType, PhaseResult};
use parity_fuzz::config::RuntimeConfig;
use parity_fuzz::constants::MISMATCHES_SUBDIR;
use parity_fuzz::error::Error;
use parity_fuzz::evaluator::EvaluatorClient;
use parity_fuzz::executor::{Executor, RateLimiter, TargetClient};
use parity_fuzz::generator::{self, chain};
use parity_fuzz::logging::SecretContext;
use parity_fuzz::model::ChainExecution;
use parity_fuzz::resilience::{RetryConfig, TimeoutConfig};
use parity_fuzz::rules::file::load_rule_library;
use parity_fuzz::spec::{linter, SpecDocument};
use parity_fuzz::tracing_init;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let json_errors = cli.json_errors;
    tracing_init::init(cli.verbose, cli.quiet);

    if let Err(e) = dispatch(cli.command).await {
        report_error(&e, json_errors);
        std::process::exit(1);
    }
}

async fn dispatch(command: Commands) -> Result<(), Error> {
    match command {
        Commands::Explore {
            spec,
            config: config_path,
            target_a,
            target_b,
            out,
            seed,
            max_cases,
            stateful,
            max_chains,
            max_steps,
            ensure_coverage,
            min_hits_per_op,
            min_coverage,
            exclude,
            timeout,
            operation_timeout,
        } => {
            run_explore(
                &spec,
                &config_path,
                &target_a,
                &target_b,
                &out,
                seed,
                max_cases,
                stateful,
                max_chains,
                max_steps,
                ensure_coverage,
                min_hits_per_op,
                min_coverage,
                exclude,
                timeout,
                operation_timeout,
            )
            .await
        }
        Commands::Replay {
            config: config_path,
            target_a,
            target_b,
            input,
            out,
            timeout,
        } => run_replay(&config_path, &target_a, &target_b, &input, &out, timeout).await,
        Commands::ListOperations { spec } => run_list_operations(&spec),
        Commands::GraphChains { spec, generated } => run_graph_chains(&spec, generated),
        Commands::LintSpec { spec, output } => run_lint_spec(&spec, output),
    }
}

/// Locates the `eval-worker` binary as a sibling of the currently-running
/// executable: the two are always built and shipped together.
fn eval_worker_path() -> Result<PathBuf, Error> {
    let exe = std::env::current_exe().map_err(Error::Io)?;
    let dir = exe
        .parent()
        .ok_or_else(|| Error::runtime("running executable has no parent directory"))?;
    let name = if cfg!(windows) { "eval-worker.exe" } else { "eval-worker" };
    Ok(dir.join(name))
}

fn matched_phase() -> PhaseResult {
    PhaseResult {
        checked: true,
        matched: true,
        differences: Vec::new(),
    }
}

fn all_steps_matched() -> ComparisonResult {
    ComparisonResult {
        matched: true,
        mismatch_type: MismatchType::None,
        summary: "match".to_string(),
        schema: matched_phase(),
        status_code: matched_phase(),
        headers: matched_phase(),
        body: matched_phase(),
    }
}

/// Compares a chain's two per-target executions step by step, stopping at
/// the first mismatching step. Returns that step's index alongside its
/// [`ComparisonResult`], or `(None, _)` with an all-matched result if every
/// step compared equal.
async fn compare_chain_steps(
    comparator: &Comparator<'_>,
    execution_a: &ChainExecution,
    execution_b: &ChainExecution,
) -> Result<(Option<usize>, ComparisonResult), Error> {
    for (index, (step_a, step_b)) in execution_a.steps.iter().zip(execution_b.steps.iter()).enumerate() {
        let operation_id = &step_a.request.operation_id;
        let result = comparator.compare(operation_id, &step_a.response, &step_b.response, None).await?;
        if !result.matched {
            return Ok((Some(index), result));
        }
    }
    Ok((None, all_steps_matched()))
}

#[allow(clippy::too_many_arguments)]
async fn run_explore(
    spec_path: &Path,
    config_path: &Path,
    target_a_name: &str,
    target_b_name: &str,
    out: &Path,
    seed: Option<u64>,
    max_cases: Option<usize>,
    stateful: bool,
    max_chains: Option<usize>,
    max_steps: Option<usize>,
    ensure_coverage: bool,
    min_hits_per_op: Option<u32>,
    min_coverage: Option<u32>,
    exclude: Vec<String>,
    timeout: Option<u64>,
    operation_timeout: Vec<String>,
) -> Result<(), Error> {
    let config = RuntimeConfig::load(config_path)?;
    let doc = SpecDocument::load(spec_path)?;
    let rules = load_rule_library(&config.comparison_rules)?;

    let target_a_cfg = config.require_target(target_a_name)?;
    let target_b_cfg = config.require_target(target_b_name)?;

    let mut timeouts = TimeoutConfig::default();
    if let Some(secs) = timeout {
        timeouts.request_timeout_ms = secs * 1000;
    }

    let target_a_client = TargetClient::build("a", target_a_cfg, &timeouts)?;
    let target_b_client = TargetClient::build("b", target_b_cfg, &timeouts)?;
    let rate_limiter = RateLimiter::new(config.rate_limit.as_ref().map(|r| r.requests_per_second));
    let secret_ctx = SecretContext::from_resolved_values(
        target_a_cfg.headers.values().cloned().chain(target_b_cfg.headers.values().cloned()),
    );

    let mut executor = Executor::new(target_a_client, target_b_client, rate_limiter, RetryConfig::default(), secret_ctx);
    for raw in &operation_timeout {
        let (operation_id, secs) = cli::parse_operation_timeout_arg(raw).map_err(Error::invalid_config)?;
        executor = executor.with_operation_timeout(operation_id, Duration::from_secs(secs));
    }

    let evaluator = EvaluatorClient::new(eval_worker_path()?);
    let comparator = Comparator::new(&rules, &evaluator);

    let raw_index = generator::raw_operation_index(&doc);
    let gen_config = generator::GeneratorConfig {
        max_cases: max_cases.unwrap_or(usize::MAX),
        exclude,
    };
    let cases = generator::generate_single_cases(&doc, &gen_config);

    let mut chains = Vec::new();
    if stateful {
        let mut chain_config = chain::ChainDiscoveryConfig::default();
        if let Some(v) = max_chains {
            chain_config.max_chains = v;
        }
        if let Some(v) = max_steps {
            chain_config.max_steps = v;
        }
        if let Some(v) = min_hits_per_op {
            chain_config.min_hits_per_op = v;
        }
        if let Some(v) = min_coverage {
            chain_config.min_coverage_pct = v;
        }
        if ensure_coverage {
            chain_config.min_coverage_pct = 100;
            chain_config.min_hits_per_op = chain_config.min_hits_per_op.max(1);
        }
        chains = chain::discover_chains(&doc, &chain_config);
    }

    std::fs::create_dir_all(out).map_err(Error::Io)?;
    let mismatches_dir = out.join(MISMATCHES_SUBDIR);
    let redact_paths = &config.secrets.redact_fields;
    let mut summary = RunSummary::default();

    for request in cases {
        if let Err(e) = request.validate_bound() {
            tracing::warn!("skipping case for '{}': {e}", request.operation_id);
            summary.errors += 1;
            continue;
        }
        let (response_a, response_b) = executor.execute(&request).await;
        let schema_tuple = raw_index.get(&request.operation_id).copied().map(|raw| (doc.raw(), raw));
        let diff = comparator.compare(&request.operation_id, &response_a, &response_b, schema_tuple).await?;
        summary.cases_sent += 1;

        if !diff.matched {
            summary.mismatches += 1;
            let metadata = run_metadata(&config, target_a_name, target_a_cfg.base_url.as_str(), target_b_name, target_b_cfg.base_url.as_str(), seed);
            let bundle_path = writer::write_single_bundle(&mismatches_dir, &request, &response_a, &response_b, &diff, &metadata, redact_paths).await?;
            summary.bundle_paths.push(bundle_path.display().to_string());
        }
    }

    for chain_case in &chains {
        let (execution_a, execution_b) = executor.execute_chain(chain_case, |_, _| true).await;
        let (_step, diff) = compare_chain_steps(&comparator, &execution_a, &execution_b).await?;
        summary.cases_sent += 1;

        if !diff.matched {
            summary.mismatches += 1;
            let metadata = run_metadata(&config, target_a_name, target_a_cfg.base_url.as_str(), target_b_name, target_b_cfg.base_url.as_str(), seed);
            let bundle_path = writer::write_chain_bundle(&mismatches_dir, chain_case, &execution_a, &execution_b, &diff, &metadata, redact_paths).await?;
            summary.bundle_paths.push(bundle_path.display().to_string());
        }
    }

    evaluator.shutdown().await;
    writer::write_run_summary(out, &summary).await?;
    println!(
        "cases_sent={} mismatches={} errors={}",
        summary.cases_sent, summary.mismatches, summary.errors
    );
    Ok(())
}

fn run_metadata(config: &RuntimeConfig, target_a_name: &str, target_a_base_url: &str, target_b_name: &str, target_b_base_url: &str, seed: Option<u64>) -> BundleMetadata {
    BundleMetadata {
        tool_version: env!("CARGO_PKG_VERSION").to_string(),
        timestamp: chrono::Utc::now(),
        seed,
        target_a_name: target_a_name.to_string(),
        target_a_base_url: target_a_base_url.to_string(),
        target_b_name: target_b_name.to_string(),
        target_b_base_url: target_b_base_url.to_string(),
        rule_file: Some(config.comparison_rules.display().to_string()),
    }
}

async fn run_replay(config_path: &Path, target_a_name: &str, target_b_name: &str, input: &Path, out: &Path, timeout: Option<u64>) -> Result<(), Error> {
    let config = RuntimeConfig::load(config_path)?;
    let rules = load_rule_library(&config.comparison_rules)?;

    let target_a_cfg = config.require_target(target_a_name)?;
    let target_b_cfg = config.require_target(target_b_name)?;

    let mut timeouts = TimeoutConfig::default();
    if let Some(secs) = timeout {
        timeouts.request_timeout_ms = secs * 1000;
    }

    let target_a_client = TargetClient::build("a", target_a_cfg, &timeouts)?;
    let target_b_client = TargetClient::build("b", target_b_cfg, &timeouts)?;
    let rate_limiter = RateLimiter::new(config.rate_limit.as_ref().map(|r| r.requests_per_second));
    let secret_ctx = SecretContext::from_resolved_values(
        target_a_cfg.headers.values().cloned().chain(target_b_cfg.headers.values().cloned()),
    );
    let executor = Executor::new(target_a_client, target_b_client, rate_limiter, RetryConfig::default(), secret_ctx);

    let evaluator = EvaluatorClient::new(eval_worker_path()?);
    let comparator = Comparator::new(&rules, &evaluator);

    let bundle_paths = loader::discover_bundles(input);
    let mut summary = ReplaySummary::default();

    for bundle_path in bundle_paths {
        let loaded = match loader::load_bundle(&bundle_path) {
            Ok(b) => b,
            Err(e) => {
                tracing::warn!("failed to load bundle '{}': {e}", bundle_path.display());
                continue;
            }
        };

        let classification = match &loaded {
            LoadedBundle::Single { request, diff, .. } => {
                let (response_a, response_b) = executor.execute(request).await;
                if response_a.is_infrastructure_skip() || response_b.is_infrastructure_skip() {
                    replay::ReplayClassification::Error
                } else {
                    let replayed = comparator.compare(&request.operation_id, &response_a, &response_b, None).await?;
                    replay::classify(diff, &replayed, None, None)
                }
            }
            LoadedBundle::Chain {
                chain,
                execution_a: original_a,
                execution_b: original_b,
                diff,
                ..
            } => {
                let (new_execution_a, new_execution_b) = executor.execute_chain(chain, |_, _| true).await;
                let infra_failure = new_execution_a
                    .steps
                    .iter()
                    .chain(new_execution_b.steps.iter())
                    .any(|s| s.response.is_infrastructure_skip());
                if infra_failure {
                    replay::ReplayClassification::Error
                } else {
                    let (step_original, _) = compare_chain_steps(&comparator, original_a, original_b).await?;
                    let (step_replayed, replayed) = compare_chain_steps(&comparator, &new_execution_a, &new_execution_b).await?;
                    replay::classify(diff, &replayed, step_original, step_replayed)
                }
            }
        };

        summary.results.push(ReplayBundleResult {
            bundle_path: bundle_path.display().to_string(),
            classification,
        });
    }

    evaluator.shutdown().await;
    writer::write_replay_summary(out, &summary).await?;
    for result in &summary.results {
        println!("{}: {:?}", result.bundle_path, result.classification);
    }
    Ok(())
}

fn run_list_operations(spec: &Path) -> Result<(), Error> {
    let doc = SpecDocument::load(spec)?;
    let mut operations = doc.enumerate_operations();
    operations.sort_by(|a, b| a.operation_id.cmp(&b.operation_id));
    for op in operations {
        println!("{:<8} {:<40} {}", op.method.as_str(), op.path, op.operation_id);
    }
    Ok(())
}

fn run_graph_chains(spec: &Path, generated: bool) -> Result<(), Error> {
    let doc = SpecDocument::load(spec)?;
    if generated {
        let chains = chain::discover_chains(&doc, &chain::ChainDiscoveryConfig::default());
        if chains.is_empty() {
            println!("no chains discovered");
        }
        for chain_case in chains {
            println!("{}", chain_case.signature());
        }
        return Ok(());
    }

    let links = doc.links();
    if links.is_empty() {
        println!("no explicit links declared");
    }
    for link in links {
        println!("{} --{}--> {} ({})", link.source_operation_id, link.link_name, link.target_operation_id, link.source_status);
    }
    let orphans = generator::orphan_operations(&doc);
    if !orphans.is_empty() {
        let names: Vec<&str> = orphans.iter().map(|o| o.operation_id.as_str()).collect();
        println!("orphans: {}", names.join(", "));
    }
    Ok(())
}

fn run_lint_spec(spec: &Path, output: OutputFormat) -> Result<(), Error> {
    let doc = SpecDocument::load(spec)?;
    let report = linter::lint(&doc);
    match output {
        OutputFormat::Text => print!("{}", linter::render_text(&report)),
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&report)?),
    }
    Ok(())
}

fn report_error(error: &Error, json_format: bool) {
    if json_format {
        if let Ok(json_output) = serde_json::to_string_pretty(&error.to_json()) {
            eprintln!("{json_output}");
            return;
        }
    }
    eprintln!("error: {error}");
    if let Some(kind) = error.kind() {
        eprintln!("  kind: {kind}");
    }
}
