use crate::compliance::domain::{
    ComplianceStep, Deliverable, StepChainRecord, StepData, StepStatus, StepType,
};
use crate::compliance::error::ComplianceError;
use crate::compliance::progress::ProgressRollup;
use rusqlite::{params, Connection, OptionalExtension, Row, Transaction, TransactionBehavior};
use serde_json::Value;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

pub(crate) const STEP_COLUMNS: &str = "
    step_id, deliverable_id, step_number, step_type, title, description,
    is_required, requires_admin_approval, auto_unlock_next, form_schema,
    checklist_items, status, progress, submitted_data, last_saved_at,
    submitted_at, completed_at, approved_at, approver_id, admin_comment,
    rejection_reason, created_at, updated_at
";

#[derive(Debug, Clone)]
pub struct ComplianceStore {
    db_path: PathBuf,
}

impl ComplianceStore {
    pub fn open(db_path: &Path) -> Result<Self, ComplianceError> {
        if let Some(parent) = db_path.parent() {
            fs::create_dir_all(parent).map_err(|source| ComplianceError::CreateParent {
                path: parent.display().to_string(),
                source,
            })?;
        }

        let store = Self {
            db_path: db_path.to_path_buf(),
        };
        let _ = store.connect()?;
        Ok(store)
    }

    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    pub fn ensure_schema(&self) -> Result<(), ComplianceError> {
        let connection = self.connect()?;
        connection.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS compliance_templates (
                template_id TEXT PRIMARY KEY,
                org_id TEXT NOT NULL,
                name TEXT NOT NULL,
                deliverable_category TEXT,
                is_default INTEGER NOT NULL,
                is_active INTEGER NOT NULL,
                steps TEXT NOT NULL,
                created_at INTEGER NOT NULL,
                updated_at INTEGER NOT NULL
            );

            CREATE TABLE IF NOT EXISTS deliverables (
                deliverable_id TEXT PRIMARY KEY,
                org_id TEXT NOT NULL,
                deliverable_category TEXT,
                compliance_progress INTEGER NOT NULL DEFAULT 0,
                is_upload_unlocked INTEGER NOT NULL DEFAULT 0,
                created_at INTEGER NOT NULL,
                updated_at INTEGER NOT NULL
            );

            CREATE TABLE IF NOT EXISTS step_chains (
                deliverable_id TEXT PRIMARY KEY,
                template_id TEXT NOT NULL,
                template_digest TEXT NOT NULL,
                step_count INTEGER NOT NULL,
                instantiated_at INTEGER NOT NULL,
                FOREIGN KEY (deliverable_id)
                    REFERENCES deliverables(deliverable_id)
                    ON DELETE CASCADE
            );

            CREATE TABLE IF NOT EXISTS compliance_steps (
                step_id TEXT PRIMARY KEY,
                deliverable_id TEXT NOT NULL,
                step_number INTEGER NOT NULL,
                step_type TEXT NOT NULL,
                title TEXT NOT NULL,
                description TEXT NOT NULL,
                is_required INTEGER NOT NULL,
                requires_admin_approval INTEGER NOT NULL,
                auto_unlock_next INTEGER NOT NULL,
                form_schema TEXT,
                checklist_items TEXT NOT NULL,
                status TEXT NOT NULL,
                progress INTEGER NOT NULL,
                submitted_data TEXT NOT NULL,
                last_saved_at INTEGER,
                submitted_at INTEGER,
                completed_at INTEGER,
                approved_at INTEGER,
                approver_id TEXT,
                admin_comment TEXT,
                rejection_reason TEXT,
                created_at INTEGER NOT NULL,
                updated_at INTEGER NOT NULL,
                UNIQUE (deliverable_id, step_number),
                FOREIGN KEY (deliverable_id)
                    REFERENCES deliverables(deliverable_id)
                    ON DELETE CASCADE
            );

            CREATE INDEX IF NOT EXISTS idx_templates_org_category
                ON compliance_templates(org_id, deliverable_category);
            CREATE INDEX IF NOT EXISTS idx_steps_deliverable_number
                ON compliance_steps(deliverable_id, step_number);
            ",
        )?;
        Ok(())
    }

    pub fn table_names(&self) -> Result<Vec<String>, ComplianceError> {
        let connection = self.connect()?;
        let mut statement = connection.prepare(
            "
            SELECT name FROM sqlite_master
            WHERE type = 'table'
            ORDER BY name ASC
            ",
        )?;
        let rows = statement.query_map([], |row| row.get::<_, String>(0))?;

        let mut names = Vec::new();
        for row in rows {
            names.push(row?);
        }
        Ok(names)
    }

    pub(crate) fn connect(&self) -> Result<Connection, ComplianceError> {
        let connection =
            Connection::open(&self.db_path).map_err(|source| ComplianceError::Open {
                path: self.db_path.display().to_string(),
                source,
            })?;
        connection.busy_timeout(BUSY_TIMEOUT)?;
        connection.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")?;
        Ok(connection)
    }
}

/// Write transactions take the database write lock up front so that a
/// read-check-write sequence cannot interleave with another writer.
pub(crate) fn begin_write(connection: &mut Connection) -> Result<Transaction<'_>, ComplianceError> {
    Ok(connection.transaction_with_behavior(TransactionBehavior::Immediate)?)
}

pub(crate) fn upsert_deliverable(
    connection: &Connection,
    deliverable_id: &str,
    org_id: &str,
    deliverable_category: Option<&str>,
    now: i64,
) -> Result<(), ComplianceError> {
    connection.execute(
        "
        INSERT INTO deliverables (
            deliverable_id, org_id, deliverable_category,
            compliance_progress, is_upload_unlocked, created_at, updated_at
        ) VALUES (?1, ?2, ?3, 0, 0, ?4, ?4)
        ON CONFLICT(deliverable_id) DO UPDATE SET
            org_id=excluded.org_id,
            deliverable_category=excluded.deliverable_category,
            updated_at=excluded.updated_at
        ",
        params![deliverable_id, org_id, deliverable_category, now],
    )?;
    Ok(())
}

pub(crate) fn load_deliverable(
    connection: &Connection,
    deliverable_id: &str,
) -> Result<Option<Deliverable>, ComplianceError> {
    let row = connection
        .query_row(
            "
            SELECT deliverable_id, org_id, deliverable_category,
                   compliance_progress, is_upload_unlocked, created_at, updated_at
            FROM deliverables
            WHERE deliverable_id = ?1
            ",
            params![deliverable_id],
            |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, Option<String>>(2)?,
                    row.get::<_, i64>(3)?,
                    row.get::<_, bool>(4)?,
                    row.get::<_, i64>(5)?,
                    row.get::<_, i64>(6)?,
                ))
            },
        )
        .optional()?;

    let Some((
        deliverable_id,
        org_id,
        deliverable_category,
        progress_raw,
        is_upload_unlocked,
        created_at,
        updated_at,
    )) = row
    else {
        return Ok(None);
    };

    Ok(Some(Deliverable {
        deliverable_id,
        org_id,
        deliverable_category,
        compliance_progress: progress_from_db("compliance_progress", progress_raw)?,
        is_upload_unlocked,
        created_at,
        updated_at,
    }))
}

pub(crate) fn write_rollup(
    connection: &Connection,
    deliverable_id: &str,
    rollup: &ProgressRollup,
    now: i64,
) -> Result<(), ComplianceError> {
    connection.execute(
        "
        UPDATE deliverables
        SET compliance_progress = ?2, is_upload_unlocked = ?3, updated_at = ?4
        WHERE deliverable_id = ?1
        ",
        params![
            deliverable_id,
            i64::from(rollup.progress_percent),
            rollup.upload_unlocked,
            now
        ],
    )?;
    Ok(())
}

/// Claims the deliverable's single chain slot. Returns `false` when a chain
/// already exists.
pub(crate) fn insert_chain_record(
    connection: &Connection,
    record: &StepChainRecord,
) -> Result<bool, ComplianceError> {
    let inserted = connection.execute(
        "
        INSERT INTO step_chains (
            deliverable_id, template_id, template_digest, step_count, instantiated_at
        ) VALUES (?1, ?2, ?3, ?4, ?5)
        ON CONFLICT(deliverable_id) DO NOTHING
        ",
        params![
            record.deliverable_id,
            record.template_id,
            record.template_digest,
            i64::from(record.step_count),
            record.instantiated_at,
        ],
    )?;
    Ok(inserted == 1)
}

pub(crate) fn load_chain_record(
    connection: &Connection,
    deliverable_id: &str,
) -> Result<Option<StepChainRecord>, ComplianceError> {
    let row = connection
        .query_row(
            "
            SELECT deliverable_id, template_id, template_digest, step_count, instantiated_at
            FROM step_chains
            WHERE deliverable_id = ?1
            ",
            params![deliverable_id],
            |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, i64>(3)?,
                    row.get::<_, i64>(4)?,
                ))
            },
        )
        .optional()?;

    let Some((deliverable_id, template_id, template_digest, step_count, instantiated_at)) = row
    else {
        return Ok(None);
    };
    Ok(Some(StepChainRecord {
        deliverable_id,
        template_id,
        template_digest,
        step_count: number_from_db("step_count", step_count)?,
        instantiated_at,
    }))
}

pub(crate) fn insert_step(
    connection: &Connection,
    step: &ComplianceStep,
) -> Result<(), ComplianceError> {
    connection.execute(
        &format!(
            "INSERT INTO compliance_steps ({STEP_COLUMNS})
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12,
                     ?13, ?14, ?15, ?16, ?17, ?18, ?19, ?20, ?21, ?22, ?23)"
        ),
        params![
            step.step_id,
            step.deliverable_id,
            i64::from(step.step_number),
            step.step_type.as_str(),
            step.title,
            step.description,
            step.is_required,
            step.requires_admin_approval,
            step.auto_unlock_next,
            encode_optional_json("form_schema", step.form_schema.as_ref())?,
            encode_json("checklist_items", &step.checklist_items)?,
            step.status.as_str(),
            i64::from(step.progress),
            encode_json("submitted_data", &step.data)?,
            step.last_saved_at,
            step.submitted_at,
            step.completed_at,
            step.approved_at,
            step.approver_id,
            step.admin_comment,
            step.rejection_reason,
            step.created_at,
            step.updated_at,
        ],
    )?;
    Ok(())
}

/// Persists the mutable part of a step, guarded on the status it was read
/// with. Zero matched rows means another writer got there first.
pub(crate) fn compare_and_set_step(
    connection: &Connection,
    step: &ComplianceStep,
    expected: StepStatus,
) -> Result<(), ComplianceError> {
    let updated = connection.execute(
        "
        UPDATE compliance_steps SET
            status = ?3,
            progress = ?4,
            submitted_data = ?5,
            last_saved_at = ?6,
            submitted_at = ?7,
            completed_at = ?8,
            approved_at = ?9,
            approver_id = ?10,
            admin_comment = ?11,
            rejection_reason = ?12,
            updated_at = ?13
        WHERE step_id = ?1 AND status = ?2
        ",
        params![
            step.step_id,
            expected.as_str(),
            step.status.as_str(),
            i64::from(step.progress),
            encode_json("submitted_data", &step.data)?,
            step.last_saved_at,
            step.submitted_at,
            step.completed_at,
            step.approved_at,
            step.approver_id,
            step.admin_comment,
            step.rejection_reason,
            step.updated_at,
        ],
    )?;
    if updated == 0 {
        return Err(ComplianceError::ConcurrentModification {
            step_id: step.step_id.clone(),
            expected,
        });
    }
    Ok(())
}

pub(crate) fn load_step(
    connection: &Connection,
    step_id: &str,
) -> Result<Option<ComplianceStep>, ComplianceError> {
    let raw = connection
        .query_row(
            &format!("SELECT {STEP_COLUMNS} FROM compliance_steps WHERE step_id = ?1"),
            params![step_id],
            StepRow::read,
        )
        .optional()?;
    raw.map(StepRow::into_step).transpose()
}

pub(crate) fn load_step_by_number(
    connection: &Connection,
    deliverable_id: &str,
    step_number: u32,
) -> Result<Option<ComplianceStep>, ComplianceError> {
    let raw = connection
        .query_row(
            &format!(
                "SELECT {STEP_COLUMNS} FROM compliance_steps
                 WHERE deliverable_id = ?1 AND step_number = ?2"
            ),
            params![deliverable_id, i64::from(step_number)],
            StepRow::read,
        )
        .optional()?;
    raw.map(StepRow::into_step).transpose()
}

pub(crate) fn load_steps(
    connection: &Connection,
    deliverable_id: &str,
) -> Result<Vec<ComplianceStep>, ComplianceError> {
    let mut statement = connection.prepare(&format!(
        "SELECT {STEP_COLUMNS} FROM compliance_steps
         WHERE deliverable_id = ?1
         ORDER BY step_number ASC"
    ))?;
    let rows = statement.query_map(params![deliverable_id], StepRow::read)?;

    let mut out = Vec::new();
    for row in rows {
        out.push(row?.into_step()?);
    }
    Ok(out)
}

struct StepRow {
    step_id: String,
    deliverable_id: String,
    step_number: i64,
    step_type: String,
    title: String,
    description: String,
    is_required: bool,
    requires_admin_approval: bool,
    auto_unlock_next: bool,
    form_schema: Option<String>,
    checklist_items: String,
    status: String,
    progress: i64,
    submitted_data: String,
    last_saved_at: Option<i64>,
    submitted_at: Option<i64>,
    completed_at: Option<i64>,
    approved_at: Option<i64>,
    approver_id: Option<String>,
    admin_comment: Option<String>,
    rejection_reason: Option<String>,
    created_at: i64,
    updated_at: i64,
}

impl StepRow {
    fn read(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            step_id: row.get(0)?,
            deliverable_id: row.get(1)?,
            step_number: row.get(2)?,
            step_type: row.get(3)?,
            title: row.get(4)?,
            description: row.get(5)?,
            is_required: row.get(6)?,
            requires_admin_approval: row.get(7)?,
            auto_unlock_next: row.get(8)?,
            form_schema: row.get(9)?,
            checklist_items: row.get(10)?,
            status: row.get(11)?,
            progress: row.get(12)?,
            submitted_data: row.get(13)?,
            last_saved_at: row.get(14)?,
            submitted_at: row.get(15)?,
            completed_at: row.get(16)?,
            approved_at: row.get(17)?,
            approver_id: row.get(18)?,
            admin_comment: row.get(19)?,
            rejection_reason: row.get(20)?,
            created_at: row.get(21)?,
            updated_at: row.get(22)?,
        })
    }

    fn into_step(self) -> Result<ComplianceStep, ComplianceError> {
        let step_type =
            StepType::parse(&self.step_type).map_err(|_| ComplianceError::InvalidStoredValue {
                field: "step_type",
                value: self.step_type.clone(),
            })?;
        let status =
            StepStatus::parse(&self.status).map_err(|_| ComplianceError::InvalidStoredValue {
                field: "status",
                value: self.status.clone(),
            })?;
        let form_schema = match self.form_schema {
            Some(raw) => Some(decode_json::<Value>("form_schema", &raw)?),
            None => None,
        };

        Ok(ComplianceStep {
            step_id: self.step_id,
            deliverable_id: self.deliverable_id,
            step_number: number_from_db("step_number", self.step_number)?,
            step_type,
            title: self.title,
            description: self.description,
            is_required: self.is_required,
            requires_admin_approval: self.requires_admin_approval,
            auto_unlock_next: self.auto_unlock_next,
            form_schema,
            checklist_items: decode_json("checklist_items", &self.checklist_items)?,
            status,
            progress: progress_from_db("progress", self.progress)?,
            data: decode_json::<StepData>("submitted_data", &self.submitted_data)?,
            last_saved_at: self.last_saved_at,
            submitted_at: self.submitted_at,
            completed_at: self.completed_at,
            approved_at: self.approved_at,
            approver_id: self.approver_id,
            admin_comment: self.admin_comment,
            rejection_reason: self.rejection_reason,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

pub(crate) fn encode_json<T: serde::Serialize>(
    what: &'static str,
    value: &T,
) -> Result<String, ComplianceError> {
    serde_json::to_string(value).map_err(|source| ComplianceError::Json { what, source })
}

fn encode_optional_json(
    what: &'static str,
    value: Option<&Value>,
) -> Result<Option<String>, ComplianceError> {
    value.map(|value| encode_json(what, value)).transpose()
}

pub(crate) fn decode_json<T: serde::de::DeserializeOwned>(
    what: &'static str,
    raw: &str,
) -> Result<T, ComplianceError> {
    serde_json::from_str(raw).map_err(|source| ComplianceError::Json { what, source })
}

fn progress_from_db(field: &'static str, raw: i64) -> Result<u8, ComplianceError> {
    u8::try_from(raw)
        .ok()
        .filter(|value| *value <= 100)
        .ok_or_else(|| ComplianceError::InvalidStoredValue {
            field,
            value: raw.to_string(),
        })
}

fn number_from_db(field: &'static str, raw: i64) -> Result<u32, ComplianceError> {
    u32::try_from(raw).map_err(|_| ComplianceError::InvalidStoredValue {
        field,
        value: raw.to_string(),
    })
}
