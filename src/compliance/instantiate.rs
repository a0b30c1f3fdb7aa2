use crate::compliance::domain::{validate_step_specs, ComplianceStep, StepChainRecord, StepSpec};
use crate::compliance::engine::{recompute_rollup, ComplianceEngine};
use crate::compliance::error::ComplianceError;
use crate::compliance::store::{
    begin_write, encode_json, insert_chain_record, insert_step, load_chain_record,
    load_deliverable,
};
use crate::compliance::templates::load_template;
use crate::shared::ids::step_id_for;
use serde_json::Value;
use sha2::{Digest, Sha256};

impl ComplianceEngine {
    /// Materializes the template's steps for a deliverable: step 1 `pending`,
    /// the rest `locked`. Returns `None` when the deliverable or template is
    /// unknown. A deliverable only ever receives one chain; a second call
    /// fails with `ChainAlreadyInstantiated` and writes nothing.
    pub fn instantiate_steps(
        &self,
        deliverable_id: &str,
        template_id: &str,
        now: i64,
    ) -> Result<Option<Vec<ComplianceStep>>, ComplianceError> {
        let mut connection = self.store().connect()?;
        let tx = begin_write(&mut connection)?;
        let Some(deliverable) = load_deliverable(&tx, deliverable_id)? else {
            return Ok(None);
        };
        let Some(template) = load_template(&tx, template_id)? else {
            return Ok(None);
        };
        if !template.is_active {
            return Err(ComplianceError::InvalidTemplate(format!(
                "template `{template_id}` is inactive"
            )));
        }
        if template.org_id != deliverable.org_id {
            return Err(ComplianceError::InvalidTemplate(format!(
                "template `{template_id}` belongs to org `{}`, deliverable `{deliverable_id}` to `{}`",
                template.org_id, deliverable.org_id
            )));
        }

        let steps = build_step_chain(deliverable_id, &template.steps, now)?;
        let step_count = u32::try_from(steps.len()).map_err(|_| {
            ComplianceError::InvalidTemplate(format!(
                "template `{template_id}` has too many steps ({})",
                steps.len()
            ))
        })?;
        let claimed = insert_chain_record(
            &tx,
            &StepChainRecord {
                deliverable_id: deliverable_id.to_string(),
                template_id: template.template_id.clone(),
                template_digest: template_digest(&template.steps)?,
                step_count,
                instantiated_at: now,
            },
        )?;
        if !claimed {
            return Err(ComplianceError::ChainAlreadyInstantiated {
                deliverable_id: deliverable_id.to_string(),
            });
        }
        for step in &steps {
            insert_step(&tx, step)?;
        }
        recompute_rollup(&tx, deliverable_id, self.config().zero_required_progress, now)?;
        tx.commit()?;

        self.log_event(
            now,
            "steps.instantiated",
            &[
                ("deliverable_id", Value::String(deliverable_id.to_string())),
                ("template_id", Value::String(template.template_id.clone())),
                ("step_count", Value::from(step_count)),
            ],
        );
        Ok(Some(steps))
    }

    /// Resolves the default template for the deliverable's org and category
    /// and instantiates it. `Ok(None)` covers both an unknown deliverable and
    /// a deliverable without a compliance gate.
    pub fn instantiate_for_deliverable(
        &self,
        deliverable_id: &str,
        now: i64,
    ) -> Result<Option<Vec<ComplianceStep>>, ComplianceError> {
        let Some(deliverable) = self.get_deliverable(deliverable_id)? else {
            return Ok(None);
        };
        let Some(template) = self.get_default_template(
            &deliverable.org_id,
            deliverable.deliverable_category.as_deref(),
        )?
        else {
            return Ok(None);
        };
        self.instantiate_steps(deliverable_id, &template.template_id, now)
    }

    pub fn chain_record(
        &self,
        deliverable_id: &str,
    ) -> Result<Option<StepChainRecord>, ComplianceError> {
        let connection = self.store().connect()?;
        load_chain_record(&connection, deliverable_id)
    }

    /// Whether the source template's steps changed after this deliverable's
    /// chain was created. `None` when there is no chain or the template is gone.
    pub fn template_drifted(&self, deliverable_id: &str) -> Result<Option<bool>, ComplianceError> {
        let connection = self.store().connect()?;
        let Some(chain) = load_chain_record(&connection, deliverable_id)? else {
            return Ok(None);
        };
        let Some(template) = load_template(&connection, &chain.template_id)? else {
            return Ok(None);
        };
        Ok(Some(template_digest(&template.steps)? != chain.template_digest))
    }
}

pub fn build_step_chain(
    deliverable_id: &str,
    specs: &[StepSpec],
    now: i64,
) -> Result<Vec<ComplianceStep>, ComplianceError> {
    let specs = validate_step_specs(specs).map_err(ComplianceError::InvalidTemplate)?;
    Ok(specs
        .iter()
        .map(|spec| {
            ComplianceStep::from_spec(
                step_id_for(deliverable_id, spec.step_number),
                deliverable_id,
                spec,
                now,
            )
        })
        .collect())
}

/// SHA-256 over the canonical JSON of the step list, hex encoded.
pub fn template_digest(specs: &[StepSpec]) -> Result<String, ComplianceError> {
    let body = encode_json("template steps", &specs)?;
    let digest = Sha256::digest(body.as_bytes());
    Ok(to_hex(&digest))
}

fn to_hex(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() * 2);
    const HEX: &[u8; 16] = b"0123456789abcdef";
    for byte in bytes {
        out.push(HEX[(byte >> 4) as usize] as char);
        out.push(HEX[(byte & 0x0f) as usize] as char);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compliance::domain::{StepStatus, StepType};

    fn spec(number: u32) -> StepSpec {
        StepSpec {
            step_number: number,
            step_type: StepType::Checklist,
            title: format!("Step {number}"),
            description: format!("Do step {number}"),
            is_required: number != 2,
            requires_admin_approval: number == 3,
            auto_unlock_next: true,
            form_schema: None,
            checklist_items: vec!["Checked".to_string()],
        }
    }

    #[test]
    fn chain_copies_specs_and_unlocks_only_step_one() {
        let steps = build_step_chain("dlv-9", &[spec(3), spec(1), spec(2)], 50).expect("chain");
        assert_eq!(steps.len(), 3);
        assert_eq!(
            steps.iter().map(|s| s.step_number).collect::<Vec<_>>(),
            vec![1, 2, 3]
        );
        assert_eq!(steps[0].status, StepStatus::Pending);
        assert_eq!(steps[1].status, StepStatus::Locked);
        assert_eq!(steps[2].status, StepStatus::Locked);
        assert_eq!(steps[0].step_id, "dlv-9-step-1");
        assert!(!steps[1].is_required);
        assert!(steps[2].requires_admin_approval);
        assert_eq!(steps[2].description, "Do step 3");
        assert_eq!(steps[2].checklist_items, vec!["Checked".to_string()]);
    }

    #[test]
    fn digest_changes_when_steps_change() {
        let original = template_digest(&[spec(1), spec(2)]).expect("digest");
        assert_eq!(original.len(), 64);
        assert_eq!(original, template_digest(&[spec(1), spec(2)]).expect("digest"));
        let mut edited = spec(2);
        edited.title = "Renamed".to_string();
        assert_ne!(original, template_digest(&[spec(1), edited]).expect("digest"));
    }
}
