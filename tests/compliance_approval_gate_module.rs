use complygate::compliance::{
    Actor, ApprovalGate, ComplianceEngine, ComplianceError, NewTemplate, StepSpec, StepStatus,
    StepType,
};
use complygate::config::Settings;
use std::path::Path;
use tempfile::tempdir;

fn spec(number: u32, requires_admin_approval: bool) -> StepSpec {
    StepSpec {
        step_number: number,
        step_type: StepType::FileReview,
        title: format!("Step {number}"),
        description: String::new(),
        is_required: true,
        requires_admin_approval,
        auto_unlock_next: true,
        form_schema: None,
        checklist_items: Vec::new(),
    }
}

fn settings_in(root: &Path) -> Settings {
    let mut settings = Settings::new(root);
    settings.administrators = vec!["admin-1".to_string()];
    settings
}

fn submitted_engine(settings: &Settings) -> ComplianceEngine {
    let engine = ComplianceEngine::from_settings(settings).expect("engine");
    engine
        .create_template(
            "org-a",
            NewTemplate {
                template_id: Some("tpl-review".to_string()),
                name: "Review".to_string(),
                deliverable_category: None,
                is_default: true,
                steps: vec![spec(1, true), spec(2, false)],
            },
            1,
        )
        .expect("create template");
    engine
        .register_deliverable("dlv-1", "org-a", None, 1)
        .expect("register");
    engine
        .instantiate_for_deliverable("dlv-1", 2)
        .expect("instantiate")
        .expect("default applies");
    let step = engine
        .submit("dlv-1-step-1", 3)
        .expect("submit")
        .expect("step exists");
    assert_eq!(step.status, StepStatus::Submitted);
    engine
}

#[test]
fn approval_gate_requires_an_administrator() {
    let temp = tempdir().expect("tempdir");
    let settings = settings_in(temp.path());
    let engine = submitted_engine(&settings);
    let gate = ApprovalGate::new(&engine);

    let member = Actor::from_settings(&settings, "member-7");
    assert!(!member.is_administrator());
    let err = gate
        .approve(&member, "dlv-1-step-1", None, 10)
        .expect_err("members cannot approve");
    assert!(matches!(
        err,
        ComplianceError::NotAdministrator { ref actor_id } if actor_id == "member-7"
    ));
    let err = gate
        .reject(&member, "dlv-1-step-1", "missing evidence", 10)
        .expect_err("members cannot reject");
    assert!(matches!(err, ComplianceError::NotAdministrator { .. }));

    let step = engine
        .get_step("dlv-1-step-1")
        .expect("get")
        .expect("step exists");
    assert_eq!(step.status, StepStatus::Submitted);
}

#[test]
fn approval_gate_rejection_needs_a_reason() {
    let temp = tempdir().expect("tempdir");
    let settings = settings_in(temp.path());
    let engine = submitted_engine(&settings);
    let gate = ApprovalGate::new(&engine);
    let admin = Actor::from_settings(&settings, "admin-1");

    let err = gate
        .reject(&admin, "dlv-1-step-1", "   ", 10)
        .expect_err("blank reason");
    assert!(matches!(err, ComplianceError::MissingRejectionReason));

    let rejected = gate
        .reject(&admin, "dlv-1-step-1", "scan is unreadable", 11)
        .expect("reject")
        .expect("step exists");
    assert_eq!(rejected.status, StepStatus::Rejected);
    assert_eq!(rejected.rejection_reason.as_deref(), Some("scan is unreadable"));
    assert_eq!(rejected.approver_id.as_deref(), Some("admin-1"));
    assert_eq!(rejected.progress, 0);

    let successor = engine
        .get_step("dlv-1-step-2")
        .expect("get")
        .expect("step exists");
    assert_eq!(successor.status, StepStatus::Locked);
}

#[test]
fn approval_gate_approval_records_the_admin_and_unlocks() {
    let temp = tempdir().expect("tempdir");
    let settings = settings_in(temp.path());
    let engine = submitted_engine(&settings);
    let admin = Actor::administrator("admin-1");

    let approved = ApprovalGate::new(&engine)
        .approve(&admin, "dlv-1-step-1", Some("  looks good "), 20)
        .expect("approve")
        .expect("step exists");
    assert_eq!(approved.status, StepStatus::Approved);
    assert_eq!(approved.approver_id.as_deref(), Some("admin-1"));
    assert_eq!(approved.admin_comment.as_deref(), Some("looks good"));
    assert_eq!(approved.approved_at, Some(20));

    let successor = engine
        .get_step("dlv-1-step-2")
        .expect("get")
        .expect("step exists");
    assert_eq!(successor.status, StepStatus::Pending);

    let err = ApprovalGate::new(&engine)
        .approve(&admin, "dlv-1-step-1", None, 21)
        .expect_err("approved steps cannot be approved again");
    assert!(matches!(err, ComplianceError::InvalidTransition { .. }));
}

#[test]
fn approval_gate_rejected_steps_reopen_through_a_draft() {
    let temp = tempdir().expect("tempdir");
    let settings = settings_in(temp.path());
    let engine = submitted_engine(&settings);
    let admin = Actor::administrator("admin-1");
    let gate = ApprovalGate::new(&engine);

    gate.reject(&admin, "dlv-1-step-1", "incomplete evidence", 10)
        .expect("reject")
        .expect("step exists");
    let err = engine
        .submit("dlv-1-step-1", 11)
        .expect_err("rejected steps are redrafted before resubmission");
    assert!(matches!(
        err,
        ComplianceError::InvalidTransition {
            from: StepStatus::Rejected,
            ..
        }
    ));

    let reopened = engine
        .save_draft("dlv-1-step-1", Default::default(), 12)
        .expect("save")
        .expect("step exists");
    assert_eq!(reopened.status, StepStatus::Draft);
    assert!(reopened.rejection_reason.is_none());

    let resubmitted = engine
        .submit("dlv-1-step-1", 13)
        .expect("submit")
        .expect("step exists");
    assert_eq!(resubmitted.status, StepStatus::Submitted);
}
