use crate::compliance::domain::{ComplianceStep, Deliverable, StepData, StepStatus};
use crate::compliance::error::ComplianceError;
use crate::compliance::progress::{compute_rollup, ProgressRollup};
use crate::compliance::store::{
    begin_write, compare_and_set_step, load_deliverable, load_step, load_steps,
    upsert_deliverable, write_rollup, ComplianceStore,
};
use crate::compliance::transitions::{
    apply_approve, apply_reject, apply_save_draft, apply_submit, TransitionOutcome,
    TransitionPolicy,
};
use crate::compliance::unlock::unlock_successor;
use crate::config::{EngineConfig, Settings, ZeroRequiredProgress};
use crate::shared::ids::validate_identifier_value;
use crate::shared::logging::append_event_line;
use rusqlite::Connection;
use serde_json::Value;
use std::path::PathBuf;

/// Entry point for every compliance operation.
///
/// Each step operation runs in one write transaction covering the step
/// update, the successor unlock and the deliverable rollup, so callers never
/// observe a completed step whose rollup has not caught up.
#[derive(Debug, Clone)]
pub struct ComplianceEngine {
    store: ComplianceStore,
    config: EngineConfig,
    event_log: Option<PathBuf>,
}

impl ComplianceEngine {
    pub fn new(store: ComplianceStore, config: EngineConfig) -> Self {
        Self {
            store,
            config,
            event_log: None,
        }
    }

    pub fn with_event_log(mut self, path: impl Into<PathBuf>) -> Self {
        self.event_log = Some(path.into());
        self
    }

    /// Opens the configured database, creates the schema and wires the event log.
    pub fn from_settings(settings: &Settings) -> Result<Self, ComplianceError> {
        let store = ComplianceStore::open(&settings.resolve_database_path())?;
        store.ensure_schema()?;
        Ok(Self::new(store, settings.engine).with_event_log(settings.event_log_path()))
    }

    pub fn store(&self) -> &ComplianceStore {
        &self.store
    }

    pub fn config(&self) -> EngineConfig {
        self.config
    }

    pub(crate) fn policy(&self) -> TransitionPolicy {
        TransitionPolicy {
            strict: self.config.strict_transitions,
        }
    }

    pub(crate) fn log_event(&self, now: i64, event: &str, fields: &[(&str, Value)]) {
        let Some(path) = &self.event_log else {
            return;
        };
        if let Err(err) = append_event_line(path, now, event, fields) {
            eprintln!(
                "failed to append compliance event `{event}` to {}: {err}",
                path.display()
            );
        }
    }

    pub fn register_deliverable(
        &self,
        deliverable_id: &str,
        org_id: &str,
        deliverable_category: Option<&str>,
        now: i64,
    ) -> Result<Deliverable, ComplianceError> {
        validate_identifier_value("deliverable id", deliverable_id)
            .map_err(ComplianceError::InvalidPayload)?;
        validate_identifier_value("org id", org_id).map_err(ComplianceError::InvalidPayload)?;
        let category = normalize_category(deliverable_category);

        let mut connection = self.store.connect()?;
        let tx = begin_write(&mut connection)?;
        upsert_deliverable(&tx, deliverable_id, org_id, category.as_deref(), now)?;
        let deliverable = load_deliverable(&tx, deliverable_id)?.ok_or_else(|| {
            ComplianceError::InvalidPayload(format!(
                "deliverable `{deliverable_id}` vanished during registration"
            ))
        })?;
        tx.commit()?;
        Ok(deliverable)
    }

    pub fn get_deliverable(
        &self,
        deliverable_id: &str,
    ) -> Result<Option<Deliverable>, ComplianceError> {
        let connection = self.store.connect()?;
        load_deliverable(&connection, deliverable_id)
    }

    /// Steps in ascending step-number order; empty when the deliverable has none.
    pub fn list_steps(&self, deliverable_id: &str) -> Result<Vec<ComplianceStep>, ComplianceError> {
        let connection = self.store.connect()?;
        load_steps(&connection, deliverable_id)
    }

    pub fn get_step(&self, step_id: &str) -> Result<Option<ComplianceStep>, ComplianceError> {
        let connection = self.store.connect()?;
        load_step(&connection, step_id)
    }

    /// Earliest step not yet completed or approved.
    pub fn head_step(
        &self,
        deliverable_id: &str,
    ) -> Result<Option<ComplianceStep>, ComplianceError> {
        Ok(self
            .list_steps(deliverable_id)?
            .into_iter()
            .find(|step| !step.status.is_terminal_success()))
    }

    pub fn save_draft(
        &self,
        step_id: &str,
        data: StepData,
        now: i64,
    ) -> Result<Option<ComplianceStep>, ComplianceError> {
        let policy = self.policy();
        self.run_step_transition(step_id, now, |step| {
            apply_save_draft(step, data, now, policy)
        })
    }

    pub fn submit(
        &self,
        step_id: &str,
        now: i64,
    ) -> Result<Option<ComplianceStep>, ComplianceError> {
        let policy = self.policy();
        self.run_step_transition(step_id, now, |step| apply_submit(step, now, policy))
    }

    /// Role checks live in `ApprovalGate`, the public entry point.
    pub(crate) fn approve(
        &self,
        step_id: &str,
        admin_id: &str,
        comment: Option<&str>,
        now: i64,
    ) -> Result<Option<ComplianceStep>, ComplianceError> {
        validate_identifier_value("admin id", admin_id).map_err(ComplianceError::InvalidPayload)?;
        let policy = self.policy();
        self.run_step_transition(step_id, now, |step| {
            apply_approve(step, admin_id, comment, now, policy)
        })
    }

    pub(crate) fn reject(
        &self,
        step_id: &str,
        admin_id: &str,
        reason: &str,
        now: i64,
    ) -> Result<Option<ComplianceStep>, ComplianceError> {
        validate_identifier_value("admin id", admin_id).map_err(ComplianceError::InvalidPayload)?;
        let policy = self.policy();
        self.run_step_transition(step_id, now, |step| {
            apply_reject(step, admin_id, reason, now, policy)
        })
    }

    /// External trigger for chains whose steps do not auto-advance.
    pub fn unlock_next(
        &self,
        deliverable_id: &str,
        completed_step_number: u32,
        now: i64,
    ) -> Result<Option<ComplianceStep>, ComplianceError> {
        let mut connection = self.store.connect()?;
        let tx = begin_write(&mut connection)?;
        let unlocked = unlock_successor(&tx, deliverable_id, completed_step_number, now)?;
        let rollup = if unlocked.is_some() {
            recompute_rollup(&tx, deliverable_id, self.config.zero_required_progress, now)?
        } else {
            None
        };
        tx.commit()?;

        if let Some(step) = &unlocked {
            self.log_unlocked(now, step);
        }
        if let Some(rollup) = &rollup {
            self.log_rollup(now, deliverable_id, rollup);
        }
        Ok(unlocked)
    }

    /// Rewrites `compliance_progress` and `is_upload_unlocked` from the step
    /// set. Safe to re-run at any time to reconcile the rollup.
    pub fn recompute_deliverable_progress(
        &self,
        deliverable_id: &str,
        org_id: &str,
        now: i64,
    ) -> Result<Option<Deliverable>, ComplianceError> {
        let mut connection = self.store.connect()?;
        let tx = begin_write(&mut connection)?;
        let Some(deliverable) = load_deliverable(&tx, deliverable_id)? else {
            return Ok(None);
        };
        if deliverable.org_id != org_id {
            return Ok(None);
        }
        let rollup = recompute_rollup(&tx, deliverable_id, self.config.zero_required_progress, now)?;
        let refreshed = load_deliverable(&tx, deliverable_id)?;
        tx.commit()?;

        if let Some(rollup) = &rollup {
            self.log_rollup(now, deliverable_id, rollup);
        }
        Ok(refreshed)
    }

    fn run_step_transition<F>(
        &self,
        step_id: &str,
        now: i64,
        apply: F,
    ) -> Result<Option<ComplianceStep>, ComplianceError>
    where
        F: FnOnce(&mut ComplianceStep) -> Result<TransitionOutcome, ComplianceError>,
    {
        let mut connection = self.store.connect()?;
        let tx = begin_write(&mut connection)?;
        let Some(mut step) = load_step(&tx, step_id)? else {
            return Ok(None);
        };

        let outcome = apply(&mut step)?;
        compare_and_set_step(&tx, &step, outcome.previous)?;
        let unlocked = if outcome.unlock_next {
            unlock_successor(&tx, &step.deliverable_id, step.step_number, now)?
        } else {
            None
        };
        let rollup = recompute_rollup(
            &tx,
            &step.deliverable_id,
            self.config.zero_required_progress,
            now,
        )?;
        tx.commit()?;

        self.log_event(
            now,
            transition_event(step.status),
            &[
                ("step_id", Value::String(step.step_id.clone())),
                ("deliverable_id", Value::String(step.deliverable_id.clone())),
                ("step_number", Value::from(step.step_number)),
                ("from", Value::String(outcome.previous.to_string())),
                ("to", Value::String(step.status.to_string())),
            ],
        );
        if let Some(next) = &unlocked {
            self.log_unlocked(now, next);
        }
        if let Some(rollup) = &rollup {
            self.log_rollup(now, &step.deliverable_id, rollup);
        }
        Ok(Some(step))
    }

    fn log_unlocked(&self, now: i64, step: &ComplianceStep) {
        self.log_event(
            now,
            "step.unlocked",
            &[
                ("step_id", Value::String(step.step_id.clone())),
                ("deliverable_id", Value::String(step.deliverable_id.clone())),
                ("step_number", Value::from(step.step_number)),
            ],
        );
    }

    fn log_rollup(&self, now: i64, deliverable_id: &str, rollup: &ProgressRollup) {
        self.log_event(
            now,
            "deliverable.progress_recomputed",
            &[
                ("deliverable_id", Value::String(deliverable_id.to_string())),
                ("progress_percent", Value::from(rollup.progress_percent)),
                ("upload_unlocked", Value::Bool(rollup.upload_unlocked)),
                ("required_steps", Value::from(rollup.required_steps)),
                ("completed_steps", Value::from(rollup.completed_steps)),
            ],
        );
    }
}

pub(crate) fn recompute_rollup(
    connection: &Connection,
    deliverable_id: &str,
    zero_required: ZeroRequiredProgress,
    now: i64,
) -> Result<Option<ProgressRollup>, ComplianceError> {
    let steps = load_steps(connection, deliverable_id)?;
    let Some(rollup) = compute_rollup(&steps, zero_required) else {
        return Ok(None);
    };
    write_rollup(connection, deliverable_id, &rollup, now)?;
    Ok(Some(rollup))
}

pub(crate) fn normalize_category(raw: Option<&str>) -> Option<String> {
    raw.map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
}

fn transition_event(status: StepStatus) -> &'static str {
    match status {
        StepStatus::Locked => "step.locked",
        StepStatus::Pending => "step.unlocked",
        StepStatus::Draft => "step.draft_saved",
        StepStatus::Submitted => "step.submitted",
        StepStatus::Completed => "step.completed",
        StepStatus::Approved => "step.approved",
        StepStatus::Rejected => "step.rejected",
    }
}
