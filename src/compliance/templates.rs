use crate::compliance::domain::{validate_step_specs, ComplianceTemplate, NewTemplate, StepSpec};
use crate::compliance::engine::{normalize_category, ComplianceEngine};
use crate::compliance::error::ComplianceError;
use crate::compliance::store::{begin_write, decode_json, encode_json};
use crate::shared::ids::{generate_compact_id, validate_identifier_value};
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde_json::Value;

const TEMPLATE_ID_MAX_GENERATION_ATTEMPTS: usize = 16;

const TEMPLATE_COLUMNS: &str = "
    template_id, org_id, name, deliverable_category, is_default, is_active,
    steps, created_at, updated_at
";

impl ComplianceEngine {
    pub fn create_template(
        &self,
        org_id: &str,
        template: NewTemplate,
        now: i64,
    ) -> Result<ComplianceTemplate, ComplianceError> {
        validate_identifier_value("org id", org_id).map_err(ComplianceError::InvalidTemplate)?;
        if template.name.trim().is_empty() {
            return Err(ComplianceError::InvalidTemplate(
                "template name must be non-empty".to_string(),
            ));
        }
        let steps = validate_step_specs(&template.steps).map_err(ComplianceError::InvalidTemplate)?;
        let category = normalize_category(template.deliverable_category.as_deref());

        let mut connection = self.store().connect()?;
        let tx = begin_write(&mut connection)?;
        let template_id = match template.template_id {
            Some(id) => {
                validate_identifier_value("template id", &id)
                    .map_err(ComplianceError::InvalidTemplate)?;
                if load_template(&tx, &id)?.is_some() {
                    return Err(ComplianceError::InvalidTemplate(format!(
                        "template `{id}` already exists"
                    )));
                }
                id
            }
            None => allocate_template_id(&tx, now)?,
        };

        if template.is_default {
            clear_default_in_scope(&tx, org_id, category.as_deref(), now)?;
        }
        tx.execute(
            &format!(
                "INSERT INTO compliance_templates ({TEMPLATE_COLUMNS})
                 VALUES (?1, ?2, ?3, ?4, ?5, 1, ?6, ?7, ?7)"
            ),
            params![
                template_id,
                org_id,
                template.name.trim(),
                category,
                template.is_default,
                encode_json("template steps", &steps)?,
                now,
            ],
        )?;
        let created = load_template(&tx, &template_id)?.ok_or_else(|| {
            ComplianceError::InvalidTemplate(format!("template `{template_id}` was not stored"))
        })?;
        tx.commit()?;

        self.log_event(
            now,
            "template.created",
            &[
                ("template_id", Value::String(created.template_id.clone())),
                ("org_id", Value::String(created.org_id.clone())),
                ("step_count", Value::from(created.steps.len())),
                ("is_default", Value::Bool(created.is_default)),
            ],
        );
        Ok(created)
    }

    pub fn get_template(
        &self,
        template_id: &str,
    ) -> Result<Option<ComplianceTemplate>, ComplianceError> {
        let connection = self.store().connect()?;
        load_template(&connection, template_id)
    }

    pub fn list_templates(
        &self,
        org_id: &str,
        include_inactive: bool,
    ) -> Result<Vec<ComplianceTemplate>, ComplianceError> {
        let connection = self.store().connect()?;
        let mut statement = connection.prepare(&format!(
            "SELECT {TEMPLATE_COLUMNS} FROM compliance_templates
             WHERE org_id = ?1 AND (?2 OR is_active = 1)
             ORDER BY created_at ASC, template_id ASC"
        ))?;
        let rows = statement.query_map(params![org_id, include_inactive], TemplateRow::read)?;

        let mut out = Vec::new();
        for row in rows {
            out.push(row?.into_template()?);
        }
        Ok(out)
    }

    /// Active default for the category, else the org-wide active default
    /// with no category. `None` means the deliverable has no compliance gate.
    pub fn get_default_template(
        &self,
        org_id: &str,
        deliverable_category: Option<&str>,
    ) -> Result<Option<ComplianceTemplate>, ComplianceError> {
        let connection = self.store().connect()?;
        if let Some(category) = normalize_category(deliverable_category) {
            let scoped = query_default(
                &connection,
                "org_id = ?1 AND deliverable_category = ?2",
                params![org_id, category],
            )?;
            if scoped.is_some() {
                return Ok(scoped);
            }
        }
        query_default(
            &connection,
            "org_id = ?1 AND deliverable_category IS NULL",
            params![org_id],
        )
    }

    /// Replaces a template's step list. Steps already instantiated from it
    /// are copies and stay as they are.
    pub fn update_template_steps(
        &self,
        template_id: &str,
        steps: &[StepSpec],
        now: i64,
    ) -> Result<Option<ComplianceTemplate>, ComplianceError> {
        let steps = validate_step_specs(steps).map_err(ComplianceError::InvalidTemplate)?;
        let mut connection = self.store().connect()?;
        let tx = begin_write(&mut connection)?;
        let updated = tx.execute(
            "
            UPDATE compliance_templates
            SET steps = ?2, updated_at = ?3
            WHERE template_id = ?1
            ",
            params![template_id, encode_json("template steps", &steps)?, now],
        )?;
        if updated == 0 {
            return Ok(None);
        }
        let template = load_template(&tx, template_id)?;
        tx.commit()?;

        self.log_event(
            now,
            "template.steps_updated",
            &[
                ("template_id", Value::String(template_id.to_string())),
                ("step_count", Value::from(steps.len())),
            ],
        );
        Ok(template)
    }

    pub fn set_default_template(
        &self,
        template_id: &str,
        now: i64,
    ) -> Result<Option<ComplianceTemplate>, ComplianceError> {
        let mut connection = self.store().connect()?;
        let tx = begin_write(&mut connection)?;
        let Some(template) = load_template(&tx, template_id)? else {
            return Ok(None);
        };
        if !template.is_active {
            return Err(ComplianceError::InvalidTemplate(format!(
                "template `{template_id}` is inactive and cannot become a default"
            )));
        }
        clear_default_in_scope(
            &tx,
            &template.org_id,
            template.deliverable_category.as_deref(),
            now,
        )?;
        tx.execute(
            "
            UPDATE compliance_templates
            SET is_default = 1, updated_at = ?2
            WHERE template_id = ?1
            ",
            params![template_id, now],
        )?;
        let template = load_template(&tx, template_id)?;
        tx.commit()?;
        Ok(template)
    }

    /// Soft delete: the template stops resolving but its row is kept.
    pub fn deactivate_template(
        &self,
        template_id: &str,
        now: i64,
    ) -> Result<Option<ComplianceTemplate>, ComplianceError> {
        let mut connection = self.store().connect()?;
        let tx = begin_write(&mut connection)?;
        let updated = tx.execute(
            "
            UPDATE compliance_templates
            SET is_active = 0, is_default = 0, updated_at = ?2
            WHERE template_id = ?1
            ",
            params![template_id, now],
        )?;
        if updated == 0 {
            return Ok(None);
        }
        let template = load_template(&tx, template_id)?;
        tx.commit()?;

        self.log_event(
            now,
            "template.deactivated",
            &[("template_id", Value::String(template_id.to_string()))],
        );
        Ok(template)
    }
}

pub(crate) fn load_template(
    connection: &Connection,
    template_id: &str,
) -> Result<Option<ComplianceTemplate>, ComplianceError> {
    let raw = connection
        .query_row(
            &format!("SELECT {TEMPLATE_COLUMNS} FROM compliance_templates WHERE template_id = ?1"),
            params![template_id],
            TemplateRow::read,
        )
        .optional()?;
    raw.map(TemplateRow::into_template).transpose()
}

fn query_default(
    connection: &Connection,
    scope: &str,
    scope_params: &[&dyn rusqlite::ToSql],
) -> Result<Option<ComplianceTemplate>, ComplianceError> {
    let raw = connection
        .query_row(
            &format!(
                "SELECT {TEMPLATE_COLUMNS} FROM compliance_templates
                 WHERE {scope} AND is_default = 1 AND is_active = 1
                 ORDER BY updated_at DESC, template_id ASC
                 LIMIT 1"
            ),
            scope_params,
            TemplateRow::read,
        )
        .optional()?;
    raw.map(TemplateRow::into_template).transpose()
}

fn clear_default_in_scope(
    connection: &Connection,
    org_id: &str,
    deliverable_category: Option<&str>,
    now: i64,
) -> Result<(), ComplianceError> {
    connection.execute(
        "
        UPDATE compliance_templates
        SET is_default = 0, updated_at = ?3
        WHERE org_id = ?1
          AND deliverable_category IS ?2
          AND is_default = 1
        ",
        params![org_id, deliverable_category, now],
    )?;
    Ok(())
}

fn allocate_template_id(connection: &Connection, now: i64) -> Result<String, ComplianceError> {
    for _ in 0..TEMPLATE_ID_MAX_GENERATION_ATTEMPTS {
        let template_id =
            generate_compact_id("tpl", now).map_err(ComplianceError::InvalidTemplate)?;
        if load_template(connection, &template_id)?.is_none() {
            return Ok(template_id);
        }
    }
    Err(ComplianceError::InvalidTemplate(format!(
        "failed to allocate unique template id after {TEMPLATE_ID_MAX_GENERATION_ATTEMPTS} attempts"
    )))
}

struct TemplateRow {
    template_id: String,
    org_id: String,
    name: String,
    deliverable_category: Option<String>,
    is_default: bool,
    is_active: bool,
    steps: String,
    created_at: i64,
    updated_at: i64,
}

impl TemplateRow {
    fn read(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            template_id: row.get(0)?,
            org_id: row.get(1)?,
            name: row.get(2)?,
            deliverable_category: row.get(3)?,
            is_default: row.get(4)?,
            is_active: row.get(5)?,
            steps: row.get(6)?,
            created_at: row.get(7)?,
            updated_at: row.get(8)?,
        })
    }

    fn into_template(self) -> Result<ComplianceTemplate, ComplianceError> {
        Ok(ComplianceTemplate {
            template_id: self.template_id,
            org_id: self.org_id,
            name: self.name,
            deliverable_category: self.deliverable_category,
            is_default: self.is_default,
            is_active: self.is_active,
            steps: decode_json("template steps", &self.steps)?,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}
