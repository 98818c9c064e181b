//! Operation records and the record store collaborator.
//!
//! The orchestrator hands every outcome to an optional [`RecordStore`] after it
//! is produced. Persistence failures are logged by the caller and never change
//! the outcome.

use std::fs::{self, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use anyhow::{Context, Result, anyhow};
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::core::types::{
    ApplyOutcome, CommandOutcome, CommandRequest, PlanOutcome, StateSnapshotInfo,
};
use crate::error::ErrorKind;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationStatus {
    Completed,
    Failed,
}

/// One record per engine invocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperationRecord {
    pub command_id: String,
    pub command: String,
    pub working_dir: String,
    /// JSON array of the built argument list.
    pub arguments: String,
    /// JSON object of request variables.
    pub variables: String,
    pub status: OperationStatus,
    pub exit_code: Option<i32>,
    pub output: String,
    pub error_kind: Option<ErrorKind>,
    pub error_message: Option<String>,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
    pub duration_ms: u64,
}

impl OperationRecord {
    pub fn from_outcome(request: &CommandRequest, outcome: &CommandOutcome) -> Result<Self> {
        Ok(Self {
            command_id: outcome.id.clone(),
            command: outcome.command.clone(),
            working_dir: outcome.working_dir.display().to_string(),
            arguments: serde_json::to_string(&outcome.args).context("serialize arguments")?,
            variables: serde_json::to_string(&request.variables)
                .context("serialize variables")?,
            status: if outcome.success {
                OperationStatus::Completed
            } else {
                OperationStatus::Failed
            },
            exit_code: outcome.exit_code,
            output: outcome.output.clone(),
            error_kind: outcome.error_kind,
            error_message: outcome.error_message.clone(),
            started_at: outcome.started_at,
            completed_at: outcome.executed_at,
            duration_ms: outcome.duration_ms,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanRecord {
    pub plan_id: String,
    pub operation_id: String,
    pub has_changes: bool,
    pub resource_count: usize,
    pub plan_output: String,
    pub status: String,
    pub created_at: DateTime<Utc>,
}

impl PlanRecord {
    pub fn from_outcome(operation_id: &str, plan: &PlanOutcome) -> Self {
        Self {
            plan_id: plan.id.clone(),
            operation_id: operation_id.to_string(),
            has_changes: plan.has_changes,
            resource_count: plan.resource_count,
            plan_output: plan.plan_output.clone(),
            status: plan.status.as_str().to_string(),
            created_at: plan.created_at,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApplyRecord {
    pub apply_id: String,
    pub operation_id: String,
    /// Plan file applied, when the request named one.
    pub plan_file: Option<String>,
    pub success: bool,
    pub resources_added: u32,
    pub resources_changed: u32,
    pub resources_destroyed: u32,
    pub apply_output: String,
    pub created_at: DateTime<Utc>,
}

impl ApplyRecord {
    pub fn from_outcome(operation_id: &str, request: &CommandRequest, apply: &ApplyOutcome) -> Self {
        Self {
            apply_id: apply.id.clone(),
            operation_id: operation_id.to_string(),
            plan_file: request
                .plan_file
                .as_ref()
                .map(|path| path.display().to_string()),
            success: apply.success,
            resources_added: apply.resources_added,
            resources_changed: apply.resources_changed,
            resources_destroyed: apply.resources_destroyed,
            apply_output: apply.apply_output.clone(),
            created_at: apply.executed_at,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateRecord {
    pub state_id: String,
    pub operation_id: String,
    pub state_file: Option<String>,
    pub working_dir: String,
    pub resource_count: usize,
    pub engine_version: String,
    pub last_updated: DateTime<Utc>,
    /// Raw `show` transcript the snapshot was derived from.
    pub state_data: String,
}

impl StateRecord {
    pub fn from_outcome(operation: &CommandOutcome, state: &StateSnapshotInfo) -> Self {
        Self {
            state_id: state.id.clone(),
            operation_id: operation.id.clone(),
            state_file: state
                .state_file
                .as_ref()
                .map(|path| path.display().to_string()),
            working_dir: operation.working_dir.display().to_string(),
            resource_count: state.resource_count,
            engine_version: state.engine_version.clone(),
            last_updated: state.last_updated,
            state_data: operation.output.clone(),
        }
    }
}

/// Persistence collaborator for outcomes.
pub trait RecordStore: Send + Sync {
    fn save_operation(&self, record: &OperationRecord) -> Result<()>;
    fn save_plan(&self, record: &PlanRecord) -> Result<()>;
    fn save_apply(&self, record: &ApplyRecord) -> Result<()>;
    fn save_state(&self, record: &StateRecord) -> Result<()>;
    fn get_operation(&self, command_id: &str) -> Result<Option<OperationRecord>>;
    /// Newest first, optionally filtered by status.
    fn list_operations(
        &self,
        limit: usize,
        offset: usize,
        status: Option<OperationStatus>,
    ) -> Result<Vec<OperationRecord>>;
}

/// Record store that appends one JSON object per line, one file per record kind.
#[derive(Debug)]
pub struct JsonlRecordStore {
    dir: PathBuf,
    write_lock: Mutex<()>,
}

impl JsonlRecordStore {
    pub const OPERATIONS_FILE: &'static str = "operations.jsonl";
    pub const PLANS_FILE: &'static str = "plans.jsonl";
    pub const APPLIES_FILE: &'static str = "applies.jsonl";
    pub const STATES_FILE: &'static str = "states.jsonl";

    pub fn open(dir: &Path) -> Result<Self> {
        fs::create_dir_all(dir)
            .with_context(|| format!("create records dir {}", dir.display()))?;
        Ok(Self {
            dir: dir.to_path_buf(),
            write_lock: Mutex::new(()),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn append<T: Serialize>(&self, file: &str, record: &T) -> Result<()> {
        let path = self.dir.join(file);
        let mut line = serde_json::to_string(record).context("serialize record")?;
        line.push('\n');

        let _guard = self
            .write_lock
            .lock()
            .map_err(|_| anyhow!("record store lock poisoned"))?;
        let mut handle = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .with_context(|| format!("open {}", path.display()))?;
        handle
            .write_all(line.as_bytes())
            .with_context(|| format!("append {}", path.display()))?;
        Ok(())
    }

    fn read_all<T: DeserializeOwned>(&self, file: &str) -> Result<Vec<T>> {
        let path = self.dir.join(file);
        if !path.exists() {
            return Ok(Vec::new());
        }
        let handle = fs::File::open(&path).with_context(|| format!("open {}", path.display()))?;
        let mut records = Vec::new();
        for (idx, line) in BufReader::new(handle).lines().enumerate() {
            let line = line.with_context(|| format!("read {}", path.display()))?;
            if line.trim().is_empty() {
                continue;
            }
            let record = serde_json::from_str(&line)
                .with_context(|| format!("parse {} line {}", path.display(), idx + 1))?;
            records.push(record);
        }
        Ok(records)
    }
}

impl RecordStore for JsonlRecordStore {
    fn save_operation(&self, record: &OperationRecord) -> Result<()> {
        self.append(Self::OPERATIONS_FILE, record)
    }

    fn save_plan(&self, record: &PlanRecord) -> Result<()> {
        self.append(Self::PLANS_FILE, record)
    }

    fn save_apply(&self, record: &ApplyRecord) -> Result<()> {
        self.append(Self::APPLIES_FILE, record)
    }

    fn save_state(&self, record: &StateRecord) -> Result<()> {
        self.append(Self::STATES_FILE, record)
    }

    fn get_operation(&self, command_id: &str) -> Result<Option<OperationRecord>> {
        let records: Vec<OperationRecord> = self.read_all(Self::OPERATIONS_FILE)?;
        Ok(records
            .into_iter()
            .find(|record| record.command_id == command_id))
    }

    fn list_operations(
        &self,
        limit: usize,
        offset: usize,
        status: Option<OperationStatus>,
    ) -> Result<Vec<OperationRecord>> {
        let records: Vec<OperationRecord> = self.read_all(Self::OPERATIONS_FILE)?;
        Ok(records
            .into_iter()
            .rev()
            .filter(|record| status.is_none_or(|wanted| record.status == wanted))
            .skip(offset)
            .take(limit)
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn operation(id: &str, status: OperationStatus) -> OperationRecord {
        let at = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        OperationRecord {
            command_id: id.to_string(),
            command: "plan".to_string(),
            working_dir: "/infra".to_string(),
            arguments: "[\"plan\"]".to_string(),
            variables: "{}".to_string(),
            status,
            exit_code: Some(0),
            output: "No changes.".to_string(),
            error_kind: None,
            error_message: None,
            started_at: at,
            completed_at: at,
            duration_ms: 5,
        }
    }

    #[test]
    fn saved_operations_can_be_fetched_by_id() {
        let temp = tempfile::tempdir().expect("tempdir");
        let store = JsonlRecordStore::open(&temp.path().join("records")).expect("open");
        store
            .save_operation(&operation("op-1", OperationStatus::Completed))
            .expect("save");
        store
            .save_operation(&operation("op-2", OperationStatus::Failed))
            .expect("save");

        let found = store.get_operation("op-2").expect("get").expect("present");
        assert_eq!(found.status, OperationStatus::Failed);
        assert!(store.get_operation("op-3").expect("get").is_none());
    }

    #[test]
    fn list_is_newest_first_with_filter_and_paging() {
        let temp = tempfile::tempdir().expect("tempdir");
        let store = JsonlRecordStore::open(temp.path()).expect("open");
        for (id, status) in [
            ("a", OperationStatus::Completed),
            ("b", OperationStatus::Failed),
            ("c", OperationStatus::Completed),
            ("d", OperationStatus::Completed),
        ] {
            store.save_operation(&operation(id, status)).expect("save");
        }

        let ids = |records: Vec<OperationRecord>| {
            records
                .into_iter()
                .map(|record| record.command_id)
                .collect::<Vec<_>>()
        };
        assert_eq!(
            ids(store.list_operations(10, 0, None).expect("list")),
            vec!["d", "c", "b", "a"]
        );
        assert_eq!(
            ids(store
                .list_operations(1, 1, Some(OperationStatus::Completed))
                .expect("list")),
            vec!["c"]
        );
    }

    #[test]
    fn empty_store_lists_nothing() {
        let temp = tempfile::tempdir().expect("tempdir");
        let store = JsonlRecordStore::open(temp.path()).expect("open");
        assert!(store.list_operations(5, 0, None).expect("list").is_empty());
    }

    #[test]
    fn derived_records_land_in_their_own_files() {
        let temp = tempfile::tempdir().expect("tempdir");
        let store = JsonlRecordStore::open(temp.path()).expect("open");
        let at = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        store
            .save_plan(&PlanRecord {
                plan_id: "plan-1".to_string(),
                operation_id: "op-1".to_string(),
                has_changes: true,
                resource_count: 2,
                plan_output: "+ resource".to_string(),
                status: "completed".to_string(),
                created_at: at,
            })
            .expect("save plan");

        let plans = fs::read_to_string(temp.path().join(JsonlRecordStore::PLANS_FILE))
            .expect("read plans");
        assert_eq!(plans.lines().count(), 1);
        assert!(plans.contains("\"operation_id\":\"op-1\""));
        assert!(!temp.path().join(JsonlRecordStore::APPLIES_FILE).exists());
    }
}
