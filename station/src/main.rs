//! Station CLI.
//!
//! Runs one engine operation per invocation and prints its outcome as pretty
//! JSON on stdout. Diagnostics go to stderr via `tracing`.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result, anyhow};
use clap::{Args, Parser, Subcommand};
use serde::Serialize;
use serde_json::json;
use station::core::types::{CommandOutcome, CommandRequest, PlanStatus};
use station::error::{ErrorKind, StationError};
use station::exit_codes;
use station::io::cancel::ExecContext;
use station::io::config::{StationConfig, load_config};
use station::io::records::JsonlRecordStore;
use station::io::workdir::validate_working_dir;
use station::logging;
use station::orchestrator::Station;
use tracing::info;

#[derive(Parser, Debug)]
#[command(
    name = "station",
    version,
    about = "Run OpenTofu commands with validation, timeouts and structured outcomes"
)]
struct Cli {
    /// TOML config file. Missing files fall back to defaults.
    #[arg(long, global = true, default_value = "station.toml")]
    config: PathBuf,

    /// Engine binary path or name on PATH.
    #[arg(long, global = true)]
    engine: Option<PathBuf>,

    /// Default working directory.
    #[arg(long, global = true)]
    workdir: Option<PathBuf>,

    #[arg(long, global = true)]
    timeout_secs: Option<u64>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run any allowed engine command.
    Run {
        command: String,
        #[command(flatten)]
        request: RequestArgs,
    },
    /// Run `plan` and classify the diff.
    Plan(RequestArgs),
    /// Run `apply` and report resource counts.
    Apply(RequestArgs),
    Init(RequestArgs),
    Validate(RequestArgs),
    /// Query state via `show`.
    State(RequestArgs),
    /// Check that a directory is usable as a working directory.
    CheckDir { dir: PathBuf },
}

#[derive(Args, Debug, Default)]
struct RequestArgs {
    /// Directory passed to the engine as `-chdir=`.
    #[arg(long)]
    chdir: Option<PathBuf>,

    /// Input variable as KEY=VALUE. Repeatable.
    #[arg(long = "var", value_parser = parse_var)]
    vars: Vec<(String, String)>,

    #[arg(long)]
    plan_file: Option<PathBuf>,

    #[arg(long)]
    state_file: Option<PathBuf>,

    /// Extra engine arguments, passed through verbatim.
    #[arg(last = true)]
    extra: Vec<String>,
}

impl RequestArgs {
    fn into_request(self, command: &str) -> CommandRequest {
        let mut request = CommandRequest::new(command).args(self.extra);
        request.working_dir = self.chdir;
        request.plan_file = self.plan_file;
        request.state_file = self.state_file;
        request.variables.extend(self.vars);
        request
    }
}

fn parse_var(raw: &str) -> Result<(String, String), String> {
    let (key, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected KEY=VALUE, got `{raw}`"))?;
    if key.is_empty() {
        return Err(format!("empty variable name in `{raw}`"));
    }
    Ok((key.to_string(), value.to_string()))
}

fn main() {
    let cli = Cli::parse();
    match run(cli) {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("{err:#}");
            std::process::exit(exit_codes::INVALID);
        }
    }
}

fn run(cli: Cli) -> Result<i32> {
    let config = resolve_config(&cli)?;
    logging::init(&config.log_level);

    if let Command::CheckDir { dir } = &cli.command {
        return match validate_working_dir(dir) {
            Ok(()) => {
                print_json(&json!({ "dir": dir, "valid": true }))?;
                Ok(exit_codes::OK)
            }
            Err(err) => report_error(&err),
        };
    }

    let station = match Station::new(config.clone()) {
        Ok(station) => station,
        Err(err) => return report_error(&err),
    };
    let station = match &config.records_dir {
        Some(dir) => station.with_store(Arc::new(JsonlRecordStore::open(dir)?)),
        None => station,
    };

    let ctx = ExecContext::new();
    let cancel = ctx.cancel.clone();
    ctrlc::set_handler(move || cancel.cancel()).context("install interrupt handler")?;

    let result = match cli.command {
        Command::Run { command, request } => station
            .run_command(&request.into_request(&command), &ctx)
            .map(|outcome| report(&outcome, outcome_code(&outcome))),
        Command::Plan(request) => station
            .plan(&request.into_request("plan"), &ctx)
            .map(|plan| {
                let code = match plan.status {
                    PlanStatus::Completed => exit_codes::OK,
                    PlanStatus::Failed => failure_code(plan.error_kind),
                };
                report(&plan, code)
            }),
        Command::Apply(request) => station
            .apply(&request.into_request("apply"), &ctx)
            .map(|apply| {
                let code = if apply.success {
                    exit_codes::OK
                } else {
                    failure_code(apply.error_kind)
                };
                report(&apply, code)
            }),
        Command::Init(request) => station
            .init(&request.into_request("init"), &ctx)
            .map(|outcome| report(&outcome, outcome_code(&outcome))),
        Command::Validate(request) => station
            .validate(&request.into_request("validate"), &ctx)
            .map(|outcome| report(&outcome, outcome_code(&outcome))),
        Command::State(request) => station
            .state(&request.into_request("state"), &ctx)
            .map(|snapshot| report(&snapshot, exit_codes::OK)),
        Command::CheckDir { .. } => return Err(anyhow!("check-dir handled above")),
    };

    match result {
        Ok(code) => code,
        Err(err) => report_error(&err),
    }
}

fn resolve_config(cli: &Cli) -> Result<StationConfig> {
    let mut config = load_config(&cli.config)?;
    if let Some(engine) = &cli.engine {
        config.engine_path = engine.clone();
    }
    if let Some(workdir) = &cli.workdir {
        config.working_dir = workdir.clone();
    }
    if let Some(timeout_secs) = cli.timeout_secs {
        config.timeout_secs = timeout_secs;
    }
    config.validate().context("invalid command-line overrides")?;
    Ok(config)
}

fn outcome_code(outcome: &CommandOutcome) -> i32 {
    if outcome.success {
        exit_codes::OK
    } else {
        failure_code(outcome.error_kind)
    }
}

fn failure_code(kind: Option<ErrorKind>) -> i32 {
    kind.map_or(exit_codes::FAILED, exit_codes::for_kind)
}

fn report<T: Serialize>(value: &T, code: i32) -> Result<i32> {
    print_json(value)?;
    info!(exit_code = code, "done");
    Ok(code)
}

fn report_error(err: &StationError) -> Result<i32> {
    let kind = err.kind();
    print_json(&json!({
        "error": { "kind": kind, "message": err.to_string() }
    }))?;
    Ok(exit_codes::for_kind(kind))
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    let rendered = serde_json::to_string_pretty(value).context("serialize output")?;
    println!("{rendered}");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_flags_build_a_request() {
        let cli = Cli::try_parse_from([
            "station",
            "--workdir",
            "/infra",
            "plan",
            "--chdir",
            "network",
            "--var",
            "region=eu-west-1",
            "--var",
            "env=prod",
            "--",
            "-refresh=false",
        ])
        .expect("parse");

        assert_eq!(cli.workdir, Some(PathBuf::from("/infra")));
        let Command::Plan(request) = cli.command else {
            panic!("expected plan");
        };
        let request = request.into_request("plan");
        assert_eq!(request.working_dir, Some(PathBuf::from("network")));
        assert_eq!(
            request.variables.keys().collect::<Vec<_>>(),
            vec!["env", "region"]
        );
        assert_eq!(request.arguments, vec!["-refresh=false"]);
    }

    #[test]
    fn run_takes_the_command_positionally() {
        let cli = Cli::try_parse_from(["station", "run", "version"]).expect("parse");
        let Command::Run { command, .. } = cli.command else {
            panic!("expected run");
        };
        assert_eq!(command, "version");
    }

    #[test]
    fn malformed_var_is_rejected() {
        assert!(Cli::try_parse_from(["station", "plan", "--var", "novalue"]).is_err());
        assert!(Cli::try_parse_from(["station", "plan", "--var", "=x"]).is_err());
    }

    #[test]
    fn var_values_may_contain_equals() {
        assert_eq!(
            parse_var("tags=a=b").expect("parse"),
            ("tags".to_string(), "a=b".to_string())
        );
    }
}
