//! Orchestration of engine operations.
//!
//! Every operation runs the same pipeline (validate request, validate working
//! directory, locate binary, build arguments, run, parse) and differs only in the
//! forced command and the post-processing of the [`CommandOutcome`].

use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, info, instrument, warn};

use crate::core::args::build_args;
use crate::core::classifier::{ApplyCounts, parse_apply, parse_plan, parse_state};
use crate::core::ids::IdGenerator;
use crate::core::request::{is_mutating_command, validate_request};
use crate::core::types::{
    ApplyOutcome, CommandOutcome, CommandRequest, Phase, PlanOutcome, PlanStatus,
    StateSnapshotInfo,
};
use crate::error::StationError;
use crate::io::cancel::ExecContext;
use crate::io::config::StationConfig;
use crate::io::engine::{Engine, EngineInvocation, TofuEngine};
use crate::io::records::{ApplyRecord, OperationRecord, PlanRecord, RecordStore, StateRecord};
use crate::io::workdir::validate_working_dir;
use crate::locks::DirLocks;

const UNKNOWN_VERSION: &str = "unknown";

/// A finished run plus the typed failure its outcome was derived from.
struct Executed {
    outcome: CommandOutcome,
    failure: Option<StationError>,
}

/// Engine orchestrator. Safe to share across threads when its engine is.
pub struct Station<E: Engine = TofuEngine> {
    config: StationConfig,
    working_dir: PathBuf,
    engine: E,
    ids: IdGenerator,
    locks: DirLocks,
    store: Option<Arc<dyn RecordStore>>,
}

impl Station<TofuEngine> {
    /// Build a station that spawns `config.engine_path`.
    pub fn new(config: StationConfig) -> Result<Self, StationError> {
        let engine = TofuEngine::new(config.engine_path.clone());
        Self::with_engine(config, engine)
    }
}

impl<E: Engine> Station<E> {
    pub fn with_engine(config: StationConfig, engine: E) -> Result<Self, StationError> {
        validate_working_dir(&config.working_dir)?;
        Ok(Self {
            working_dir: config.working_dir.clone(),
            ids: IdGenerator::new(config.id_prefix.clone()),
            config,
            engine,
            locks: DirLocks::new(),
            store: None,
        })
    }

    /// Persist every outcome to `store` after it is produced.
    pub fn with_store(mut self, store: Arc<dyn RecordStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn config(&self) -> &StationConfig {
        &self.config
    }

    pub fn engine(&self) -> &E {
        &self.engine
    }

    pub fn working_dir(&self) -> &Path {
        &self.working_dir
    }

    pub fn validate_working_dir(&self, dir: &Path) -> Result<(), StationError> {
        validate_working_dir(dir)
    }

    /// Change the default working directory. Leaves it unchanged on error.
    pub fn set_working_dir(&mut self, dir: impl Into<PathBuf>) -> Result<(), StationError> {
        let dir = dir.into();
        validate_working_dir(&dir)?;
        info!(dir = %dir.display(), "working directory changed");
        self.working_dir = dir;
        Ok(())
    }

    /// Run the request's own command.
    #[instrument(skip_all, fields(command = %request.command))]
    pub fn run_command(
        &self,
        request: &CommandRequest,
        ctx: &ExecContext,
    ) -> Result<CommandOutcome, StationError> {
        let operation = self.execute(&request.command, request, ctx)?.outcome;
        self.record_operation(request, &operation);
        Ok(operation)
    }

    #[instrument(skip_all, fields(command = "plan"))]
    pub fn plan(
        &self,
        request: &CommandRequest,
        ctx: &ExecContext,
    ) -> Result<PlanOutcome, StationError> {
        let request = request.with_command("plan");
        let operation = self.execute("plan", &request, ctx)?.outcome;
        self.record_operation(&request, &operation);

        debug!(phase = ?Phase::Parsing, "classifying plan output");
        let summary = parse_plan(&operation.output);
        let plan = PlanOutcome {
            id: self.ids.next(),
            plan_output: operation.output.clone(),
            has_changes: summary.has_changes,
            resource_count: summary.resource_count,
            status: if operation.success {
                PlanStatus::Completed
            } else {
                PlanStatus::Failed
            },
            error_kind: operation.error_kind,
            created_at: Utc::now(),
        };
        self.record("plan", |store| {
            store.save_plan(&PlanRecord::from_outcome(&operation.id, &plan))
        });
        debug!(phase = ?Phase::Completed, has_changes = plan.has_changes, resource_count = plan.resource_count, "plan classified");
        Ok(plan)
    }

    #[instrument(skip_all, fields(command = "apply"))]
    pub fn apply(
        &self,
        request: &CommandRequest,
        ctx: &ExecContext,
    ) -> Result<ApplyOutcome, StationError> {
        let request = request.with_command("apply");
        let operation = self.execute("apply", &request, ctx)?.outcome;
        self.record_operation(&request, &operation);

        debug!(phase = ?Phase::Parsing, "classifying apply output");
        let parsed = parse_apply(&operation.output);
        let summary_found = parsed.is_matched();
        let counts = parsed.unwrap_or(ApplyCounts::default());
        if operation.success && !summary_found {
            warn!(operation_id = %operation.id, "apply succeeded without a Resources summary line");
        }
        let apply = ApplyOutcome {
            id: self.ids.next(),
            apply_output: operation.output.clone(),
            success: operation.success,
            resources_added: counts.added,
            resources_changed: counts.changed,
            resources_destroyed: counts.destroyed,
            summary_found,
            error_kind: operation.error_kind,
            executed_at: operation.executed_at,
        };
        self.record("apply", |store| {
            store.save_apply(&ApplyRecord::from_outcome(&operation.id, &request, &apply))
        });
        debug!(phase = ?Phase::Completed, success = apply.success, "apply classified");
        Ok(apply)
    }

    pub fn init(
        &self,
        request: &CommandRequest,
        ctx: &ExecContext,
    ) -> Result<CommandOutcome, StationError> {
        self.run_command(&request.with_command("init"), ctx)
    }

    pub fn validate(
        &self,
        request: &CommandRequest,
        ctx: &ExecContext,
    ) -> Result<CommandOutcome, StationError> {
        self.run_command(&request.with_command("validate"), ctx)
    }

    /// Query state via `show`.
    ///
    /// A timed-out or cancelled `show` run returns that error. Any other failed or
    /// empty run is `InvalidState`. The operation record is persisted either way.
    #[instrument(skip_all, fields(command = "show"))]
    pub fn state(
        &self,
        request: &CommandRequest,
        ctx: &ExecContext,
    ) -> Result<StateSnapshotInfo, StationError> {
        let request = request.with_command("show");
        let Executed {
            outcome: operation,
            failure,
        } = self.execute("state", &request, ctx)?;
        self.record_operation(&request, &operation);

        if let Some(interrupted @ (StationError::Timeout { .. } | StationError::Cancelled)) =
            failure
        {
            return Err(interrupted);
        }
        if !operation.success {
            return Err(StationError::InvalidState(format!(
                "state query {} failed: {}",
                operation.id,
                operation.error_message.as_deref().unwrap_or("unknown error")
            )));
        }
        if operation.output.trim().is_empty() {
            return Err(StationError::InvalidState(format!(
                "state query {} produced no output",
                operation.id
            )));
        }

        debug!(phase = ?Phase::Parsing, "classifying state output");
        let summary = parse_state(&operation.output);
        let snapshot = StateSnapshotInfo {
            id: self.ids.next(),
            state_file: request.state_file.clone(),
            resource_count: summary.resource_count,
            engine_version: summary.version.unwrap_or(UNKNOWN_VERSION.to_string()),
            last_updated: Utc::now(),
        };
        self.record("state", |store| {
            store.save_state(&StateRecord::from_outcome(&operation, &snapshot))
        });
        debug!(phase = ?Phase::Completed, resource_count = snapshot.resource_count, "state classified");
        Ok(snapshot)
    }

    /// Shared pipeline. Validation and lookup errors return before anything is
    /// spawned; run failures are folded into the outcome. `operation` names the
    /// logical operation for directory serialization (`state` runs `show`).
    fn execute(
        &self,
        operation: &str,
        request: &CommandRequest,
        ctx: &ExecContext,
    ) -> Result<Executed, StationError> {
        debug!(phase = ?Phase::Validating, "validating request");
        validate_request(request)?;
        let target_dir = self.target_dir(request);
        validate_working_dir(&target_dir)?;

        debug!(phase = ?Phase::LocatingBinary, "locating engine binary");
        let binary = self.engine.locate()?;

        let command = request.command.as_str();
        let args = build_args(command, request);
        let _dir_guard = (self.config.serialize_mutations && is_mutating_command(operation))
            .then(|| self.locks.lock(&target_dir));

        debug!(phase = ?Phase::Executing, ?args, "running engine");
        let invocation = EngineInvocation {
            binary,
            workdir: self.working_dir.clone(),
            args: args.clone(),
            timeout: self.config.timeout(),
            output_limit_bytes: self.config.output_limit_bytes,
        };
        let started_at = Utc::now();
        let run = self.engine.run(&invocation, ctx)?;
        let executed_at = Utc::now();

        let outcome = CommandOutcome {
            id: self.ids.next(),
            command: command.to_string(),
            working_dir: target_dir,
            args,
            started_at,
            executed_at,
            duration_ms: u64::try_from((executed_at - started_at).num_milliseconds())
                .unwrap_or_default(),
            success: run.failure.is_none(),
            exit_code: run.exit_code,
            output: run.output,
            error_kind: run.failure.as_ref().map(StationError::kind),
            error_message: run.failure.as_ref().map(ToString::to_string),
            truncated_bytes: run.truncated_bytes,
        };
        info!(
            id = %outcome.id,
            success = outcome.success,
            exit_code = ?outcome.exit_code,
            duration_ms = outcome.duration_ms,
            "engine command finished"
        );
        Ok(Executed {
            outcome,
            failure: run.failure,
        })
    }

    /// Directory the engine acts on: the override resolved against the default.
    fn target_dir(&self, request: &CommandRequest) -> PathBuf {
        match &request.working_dir {
            Some(dir) => self.working_dir.join(dir),
            None => self.working_dir.clone(),
        }
    }

    fn record_operation(&self, request: &CommandRequest, operation: &CommandOutcome) {
        self.record("operation", |store| {
            store.save_operation(&OperationRecord::from_outcome(request, operation)?)
        });
    }

    fn record<F>(&self, kind: &str, save: F)
    where
        F: FnOnce(&dyn RecordStore) -> anyhow::Result<()>,
    {
        let Some(store) = &self.store else {
            return;
        };
        if let Err(err) = save(store.as_ref()) {
            warn!(record = kind, err = %format!("{err:#}"), "failed to persist record");
        }
    }
}
