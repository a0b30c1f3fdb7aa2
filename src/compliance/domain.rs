use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashSet;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StepType {
    Form,
    Checklist,
    FileReview,
    Approval,
    Other,
}

impl StepType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Form => "form",
            Self::Checklist => "checklist",
            Self::FileReview => "file-review",
            Self::Approval => "approval",
            Self::Other => "other",
        }
    }

    pub fn parse(raw: &str) -> Result<Self, String> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "form" => Ok(Self::Form),
            "checklist" => Ok(Self::Checklist),
            "file-review" | "file_review" => Ok(Self::FileReview),
            "approval" => Ok(Self::Approval),
            "other" => Ok(Self::Other),
            _ => Err(
                "step type must be one of: form, checklist, file-review, approval, other"
                    .to_string(),
            ),
        }
    }
}

impl std::fmt::Display for StepType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Locked,
    Pending,
    Draft,
    Submitted,
    Completed,
    Approved,
    Rejected,
}

impl StepStatus {
    /// Transitions the engine performs under strict checking. Autosave may
    /// land on any status, so every status can move to `draft`.
    pub fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (_, StepStatus::Draft)
                | (StepStatus::Locked, StepStatus::Pending)
                | (StepStatus::Pending, StepStatus::Submitted)
                | (StepStatus::Pending, StepStatus::Completed)
                | (StepStatus::Draft, StepStatus::Submitted)
                | (StepStatus::Draft, StepStatus::Completed)
                | (StepStatus::Submitted, StepStatus::Approved)
                | (StepStatus::Submitted, StepStatus::Rejected)
        )
    }

    /// `completed` and `approved` count toward the deliverable rollup.
    pub fn is_terminal_success(self) -> bool {
        matches!(self, StepStatus::Completed | StepStatus::Approved)
    }

    /// `pending`, `draft` and `submitted`: unlocked but not yet done.
    pub fn is_pre_actionable(self) -> bool {
        matches!(
            self,
            StepStatus::Pending | StepStatus::Draft | StepStatus::Submitted
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            StepStatus::Locked => "locked",
            StepStatus::Pending => "pending",
            StepStatus::Draft => "draft",
            StepStatus::Submitted => "submitted",
            StepStatus::Completed => "completed",
            StepStatus::Approved => "approved",
            StepStatus::Rejected => "rejected",
        }
    }

    pub fn parse(raw: &str) -> Result<Self, String> {
        match raw {
            "locked" => Ok(StepStatus::Locked),
            "pending" => Ok(StepStatus::Pending),
            "draft" => Ok(StepStatus::Draft),
            "submitted" => Ok(StepStatus::Submitted),
            "completed" => Ok(StepStatus::Completed),
            "approved" => Ok(StepStatus::Approved),
            "rejected" => Ok(StepStatus::Rejected),
            other => Err(format!("unknown step status `{other}`")),
        }
    }
}

impl std::fmt::Display for StepStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

fn default_true() -> bool {
    true
}

/// One entry of a template's ordered step list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StepSpec {
    pub step_number: u32,
    pub step_type: StepType,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default = "default_true")]
    pub is_required: bool,
    #[serde(default)]
    pub requires_admin_approval: bool,
    #[serde(default = "default_true")]
    pub auto_unlock_next: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub form_schema: Option<Value>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub checklist_items: Vec<String>,
}

/// Checks that step numbers are unique and contiguous from 1 and that every
/// spec is usable. The returned list is sorted by step number.
pub fn validate_step_specs(specs: &[StepSpec]) -> Result<Vec<StepSpec>, String> {
    if specs.is_empty() {
        return Err("template must define at least one step".to_string());
    }

    let mut sorted = specs.to_vec();
    sorted.sort_by_key(|spec| spec.step_number);

    let mut seen = HashSet::new();
    for spec in &sorted {
        if !seen.insert(spec.step_number) {
            return Err(format!("duplicate step number {}", spec.step_number));
        }
    }
    for (idx, spec) in sorted.iter().enumerate() {
        let expected = idx as u32 + 1;
        if spec.step_number != expected {
            return Err(format!(
                "step numbers must be contiguous from 1; expected {expected}, got {}",
                spec.step_number
            ));
        }
        if spec.title.trim().is_empty() {
            return Err(format!("step {} title must be non-empty", spec.step_number));
        }
        if let Some(schema) = &spec.form_schema {
            if !schema.is_object() {
                return Err(format!(
                    "step {} form_schema must be an object",
                    spec.step_number
                ));
            }
        }
        let mut labels = HashSet::new();
        for item in &spec.checklist_items {
            if item.trim().is_empty() {
                return Err(format!(
                    "step {} checklist items must be non-empty",
                    spec.step_number
                ));
            }
            if !labels.insert(item.as_str()) {
                return Err(format!(
                    "step {} has duplicate checklist item `{item}`",
                    spec.step_number
                ));
            }
        }
    }

    Ok(sorted)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComplianceTemplate {
    pub template_id: String,
    pub org_id: String,
    pub name: String,
    #[serde(default)]
    pub deliverable_category: Option<String>,
    pub is_default: bool,
    pub is_active: bool,
    pub steps: Vec<StepSpec>,
    pub created_at: i64,
    pub updated_at: i64,
}

/// Input for creating a template. `template_id` is generated when absent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NewTemplate {
    #[serde(default)]
    pub template_id: Option<String>,
    pub name: String,
    #[serde(default)]
    pub deliverable_category: Option<String>,
    #[serde(default)]
    pub is_default: bool,
    pub steps: Vec<StepSpec>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChecklistItemState {
    pub label: String,
    pub checked: bool,
}

/// Everything an end user has entered on a step.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StepData {
    #[serde(default)]
    pub form_data: Map<String, Value>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub checklist_items: Vec<ChecklistItemState>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dynamic_list_data: Option<Value>,
}

impl StepData {
    /// Rejects payloads the state machine must never see.
    pub fn validate_for(&self, step: &ComplianceStep) -> Result<(), String> {
        let mut labels = HashSet::new();
        for item in &self.checklist_items {
            if item.label.trim().is_empty() {
                return Err("checklist item label must be non-empty".to_string());
            }
            if !labels.insert(item.label.as_str()) {
                return Err(format!("duplicate checklist item `{}`", item.label));
            }
            if !step.checklist_items.is_empty()
                && !step.checklist_items.iter().any(|known| known == &item.label)
            {
                return Err(format!(
                    "checklist item `{}` is not defined on step {}",
                    item.label, step.step_number
                ));
            }
        }
        if let Some(list) = &self.dynamic_list_data {
            if !(list.is_array() || list.is_object()) {
                return Err("dynamic list data must be an array or an object".to_string());
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComplianceStep {
    pub step_id: String,
    pub deliverable_id: String,
    pub step_number: u32,
    pub step_type: StepType,
    pub title: String,
    pub description: String,
    pub is_required: bool,
    pub requires_admin_approval: bool,
    pub auto_unlock_next: bool,
    #[serde(default)]
    pub form_schema: Option<Value>,
    #[serde(default)]
    pub checklist_items: Vec<String>,
    pub status: StepStatus,
    pub progress: u8,
    #[serde(default)]
    pub data: StepData,
    #[serde(default)]
    pub last_saved_at: Option<i64>,
    #[serde(default)]
    pub submitted_at: Option<i64>,
    #[serde(default)]
    pub completed_at: Option<i64>,
    #[serde(default)]
    pub approved_at: Option<i64>,
    #[serde(default)]
    pub approver_id: Option<String>,
    #[serde(default)]
    pub admin_comment: Option<String>,
    #[serde(default)]
    pub rejection_reason: Option<String>,
    pub created_at: i64,
    pub updated_at: i64,
}

impl ComplianceStep {
    /// Copies a template spec verbatim into a fresh step record.
    pub fn from_spec(step_id: String, deliverable_id: &str, spec: &StepSpec, now: i64) -> Self {
        let status = if spec.step_number == 1 {
            StepStatus::Pending
        } else {
            StepStatus::Locked
        };
        Self {
            step_id,
            deliverable_id: deliverable_id.to_string(),
            step_number: spec.step_number,
            step_type: spec.step_type,
            title: spec.title.clone(),
            description: spec.description.clone(),
            is_required: spec.is_required,
            requires_admin_approval: spec.requires_admin_approval,
            auto_unlock_next: spec.auto_unlock_next,
            form_schema: spec.form_schema.clone(),
            checklist_items: spec.checklist_items.clone(),
            status,
            progress: 0,
            data: StepData::default(),
            last_saved_at: None,
            submitted_at: None,
            completed_at: None,
            approved_at: None,
            approver_id: None,
            admin_comment: None,
            rejection_reason: None,
            created_at: now,
            updated_at: now,
        }
    }
}

/// The slice of the external deliverable record this engine reads and writes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Deliverable {
    pub deliverable_id: String,
    pub org_id: String,
    #[serde(default)]
    pub deliverable_category: Option<String>,
    pub compliance_progress: u8,
    pub is_upload_unlocked: bool,
    pub created_at: i64,
    pub updated_at: i64,
}

/// Provenance of a deliverable's step chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StepChainRecord {
    pub deliverable_id: String,
    pub template_id: String,
    pub template_digest: String,
    pub step_count: u32,
    pub instantiated_at: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec(number: u32) -> StepSpec {
        StepSpec {
            step_number: number,
            step_type: StepType::Form,
            title: format!("Step {number}"),
            description: String::new(),
            is_required: true,
            requires_admin_approval: false,
            auto_unlock_next: true,
            form_schema: None,
            checklist_items: Vec::new(),
        }
    }

    #[test]
    fn strict_transitions_only_allow_the_documented_edges() {
        assert!(StepStatus::Locked.can_transition_to(StepStatus::Pending));
        assert!(StepStatus::Submitted.can_transition_to(StepStatus::Approved));
        assert!(StepStatus::Rejected.can_transition_to(StepStatus::Draft));
        assert!(StepStatus::Locked.can_transition_to(StepStatus::Draft));
        assert!(StepStatus::Approved.can_transition_to(StepStatus::Draft));
        assert!(!StepStatus::Rejected.can_transition_to(StepStatus::Submitted));
        assert!(!StepStatus::Completed.can_transition_to(StepStatus::Submitted));
        assert!(!StepStatus::Pending.can_transition_to(StepStatus::Approved));
    }

    #[test]
    fn step_specs_are_sorted_and_checked_for_gaps() {
        let sorted = validate_step_specs(&[spec(2), spec(1), spec(3)]).expect("valid");
        assert_eq!(
            sorted.iter().map(|s| s.step_number).collect::<Vec<_>>(),
            vec![1, 2, 3]
        );

        let err = validate_step_specs(&[spec(1), spec(3)]).expect_err("gap");
        assert!(err.contains("expected 2, got 3"));

        let err = validate_step_specs(&[spec(1), spec(1)]).expect_err("duplicate");
        assert!(err.contains("duplicate step number 1"));

        let err = validate_step_specs(&[spec(0)]).expect_err("zero");
        assert!(err.contains("expected 1, got 0"));

        assert!(validate_step_specs(&[]).is_err());
    }

    #[test]
    fn step_spec_yaml_defaults_match_an_auto_advancing_required_step() {
        let parsed: StepSpec = serde_yaml::from_str(
            r#"
step_number: 1
step_type: file-review
title: Review engagement letter
"#,
        )
        .expect("parse spec");
        assert_eq!(parsed.step_type, StepType::FileReview);
        assert!(parsed.is_required);
        assert!(parsed.auto_unlock_next);
        assert!(!parsed.requires_admin_approval);
    }

    #[test]
    fn step_data_rejects_unknown_checklist_labels() {
        let mut with_checklist = spec(1);
        with_checklist.checklist_items = vec!["Signed".to_string()];
        let step = ComplianceStep::from_spec("d-step-1".to_string(), "d", &with_checklist, 1);

        let ok = StepData {
            checklist_items: vec![ChecklistItemState {
                label: "Signed".to_string(),
                checked: true,
            }],
            ..StepData::default()
        };
        ok.validate_for(&step).expect("known label");

        let bad = StepData {
            checklist_items: vec![ChecklistItemState {
                label: "Dated".to_string(),
                checked: false,
            }],
            ..StepData::default()
        };
        assert!(bad.validate_for(&step).is_err());

        let bad_list = StepData {
            dynamic_list_data: Some(Value::from(3)),
            ..StepData::default()
        };
        assert!(bad_list.validate_for(&step).is_err());
    }
}
