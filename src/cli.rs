//! Command-line surface: global flags plus the `explore`/`replay`/
//! `list-operations`/`graph-chains`/`lint-spec` subcommands (§4.14, §6).

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "Differential HTTP fuzzer: drives the same OpenAPI operations against two targets and reports where their responses diverge.",
    long_about = "parity-fuzz generates request cases and chains from an OpenAPI 3.x document, \
                  sends each to two configured targets, and compares the responses under a \
                  user-defined rule set.\n\n\
                  Examples:\n  \
                  parity-fuzz explore --spec api.yaml --config fuzz.yaml --target-a staging --target-b canary --out ./run\n  \
                  parity-fuzz replay --config fuzz.yaml --target-a staging --target-b canary --in ./run/mismatches --out ./replay\n  \
                  parity-fuzz lint-spec --spec api.yaml --output json"
)]
pub struct Cli {
    /// Emit all errors as structured JSON on stderr
    #[arg(long, global = true)]
    pub json_errors: bool,

    /// Increase log verbosity (repeatable: -v = debug, -vv = trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Decrease log verbosity (repeatable: -q = warn, -qq = error only)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub quiet: u8,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Generate cases and chains from a spec and run them against both targets
    Explore {
        #[arg(long, value_name = "PATH")]
        spec: PathBuf,
        #[arg(long, value_name = "PATH")]
        config: PathBuf,
        #[arg(long, value_name = "NAME")]
        target_a: String,
        #[arg(long, value_name = "NAME")]
        target_b: String,
        #[arg(long, value_name = "PATH")]
        out: PathBuf,
        #[arg(long, value_name = "N")]
        seed: Option<u64>,
        #[arg(long, value_name = "N")]
        max_cases: Option<usize>,
        #[arg(long)]
        stateful: bool,
        #[arg(long, value_name = "N")]
        max_chains: Option<usize>,
        #[arg(long, value_name = "N")]
        max_steps: Option<usize>,
        #[arg(long)]
        ensure_coverage: bool,
        #[arg(long, value_name = "N")]
        min_hits_per_op: Option<u32>,
        #[arg(long, value_name = "P")]
        min_coverage: Option<u32>,
        #[arg(long = "exclude", value_name = "OPID")]
        exclude: Vec<String>,
        #[arg(long, value_name = "S")]
        timeout: Option<u64>,
        #[arg(long = "operation-timeout", value_name = "OPID:S")]
        operation_timeout: Vec<String>,
    },
    /// Re-execute a bundle directory's recorded cases and classify the result
    Replay {
        #[arg(long, value_name = "PATH")]
        config: PathBuf,
        #[arg(long, value_name = "NAME")]
        target_a: String,
        #[arg(long, value_name = "NAME")]
        target_b: String,
        #[arg(long = "in", value_name = "PATH")]
        input: PathBuf,
        #[arg(long, value_name = "PATH")]
        out: PathBuf,
        #[arg(long, value_name = "S")]
        timeout: Option<u64>,
    },
    /// List every operation id, method, and path declared by the spec
    ListOperations {
        #[arg(long, value_name = "PATH")]
        spec: PathBuf,
    },
    /// Print the explicit-link chain graph discoverable from the spec
    GraphChains {
        #[arg(long, value_name = "PATH")]
        spec: PathBuf,
        #[arg(long)]
        generated: bool,
    },
    /// Static analysis of link connectivity, chain depth, and orphan operations
    LintSpec {
        #[arg(long, value_name = "PATH")]
        spec: PathBuf,
        #[arg(long, value_enum, default_value = "text")]
        output: OutputFormat,
    },
}

/// Parses `OPID:S` into `(operation_id, timeout_seconds)`.
///
/// # Errors
///
/// Returns an error if the argument has no `:` separator or the seconds
/// portion does not parse as an integer.
pub fn parse_operation_timeout_arg(raw: &str) -> Result<(String, u64), String> {
    let (opid, secs) = raw
        .split_once(':')
        .ok_or_else(|| format!("expected OPID:SECONDS, got '{raw}'"))?;
    let secs: u64 = secs
        .parse()
        .map_err(|_| format!("invalid timeout seconds in '{raw}'"))?;
    Ok((opid.to_string(), secs))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_operation_timeout_argument() {
        assert_eq!(
            parse_operation_timeout_arg("get-user:5").unwrap(),
            ("get-user".to_string(), 5)
        );
    }

    #[test]
    fn rejects_operation_timeout_without_separator() {
        assert!(parse_operation_timeout_arg("get-user").is_err());
    }

    #[test]
    fn cli_parses_explore_subcommand() {
        let cli = Cli::parse_from([
            "parity-fuzz",
            "explore",
            "--spec",
            "api.yaml",
            "--config",
            "fuzz.yaml",
            "--target-a",
            "staging",
            "--target-b",
            "canary",
            "--out",
            "./run",
        ]);
        match cli.command {
            Commands::Explore { target_a, target_b, .. } => {
                assert_eq!(target_a, "staging");
                assert_eq!(target_b, "canary");
            }
            other => panic!("expected Explore, got {other:?}"),
        }
    }
}
