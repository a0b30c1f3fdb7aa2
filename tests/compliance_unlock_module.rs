use complygate::compliance::{ComplianceEngine, NewTemplate, StepSpec, StepStatus, StepType};
use complygate::config::Settings;
use std::path::Path;
use tempfile::tempdir;

fn spec(number: u32, auto_unlock_next: bool) -> StepSpec {
    StepSpec {
        step_number: number,
        step_type: StepType::Other,
        title: format!("Step {number}"),
        description: String::new(),
        is_required: true,
        requires_admin_approval: false,
        auto_unlock_next,
        form_schema: None,
        checklist_items: Vec::new(),
    }
}

fn engine_with_chain(root: &Path, specs: Vec<StepSpec>) -> ComplianceEngine {
    let engine = ComplianceEngine::from_settings(&Settings::new(root)).expect("open engine");
    engine
        .create_template(
            "org-a",
            NewTemplate {
                template_id: Some("tpl-chain".to_string()),
                name: "Chain".to_string(),
                deliverable_category: None,
                is_default: true,
                steps: specs,
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
    engine
}

fn statuses(engine: &ComplianceEngine) -> Vec<StepStatus> {
    engine
        .list_steps("dlv-1")
        .expect("list steps")
        .into_iter()
        .map(|step| step.status)
        .collect()
}

#[test]
fn unlock_module_opens_only_the_immediate_successor() {
    let temp = tempdir().expect("tempdir");
    let engine = engine_with_chain(
        temp.path(),
        vec![spec(1, true), spec(2, true), spec(3, true), spec(4, true)],
    );

    engine
        .submit("dlv-1-step-1", 10)
        .expect("submit")
        .expect("step exists");
    assert_eq!(
        statuses(&engine),
        vec![
            StepStatus::Completed,
            StepStatus::Pending,
            StepStatus::Locked,
            StepStatus::Locked
        ]
    );
    let unlocked = engine
        .get_step("dlv-1-step-2")
        .expect("get")
        .expect("step exists");
    assert_eq!(unlocked.updated_at, 10);
}

#[test]
fn unlock_module_repeat_calls_are_no_ops() {
    let temp = tempdir().expect("tempdir");
    let engine = engine_with_chain(temp.path(), vec![spec(1, false), spec(2, true)]);

    engine
        .submit("dlv-1-step-1", 10)
        .expect("submit")
        .expect("step exists");
    assert_eq!(
        statuses(&engine),
        vec![StepStatus::Completed, StepStatus::Locked],
        "manual-unlock steps do not advance the chain"
    );

    let first = engine.unlock_next("dlv-1", 1, 20).expect("unlock");
    assert_eq!(first.map(|step| step.status), Some(StepStatus::Pending));

    engine
        .save_draft("dlv-1-step-2", Default::default(), 21)
        .expect("save")
        .expect("step exists");
    let second = engine.unlock_next("dlv-1", 1, 22).expect("unlock again");
    assert!(second.is_none());
    assert_eq!(
        statuses(&engine),
        vec![StepStatus::Completed, StepStatus::Draft],
        "a second unlock never regresses the successor"
    );
}

#[test]
fn unlock_module_end_of_chain_and_unknown_deliverables_are_no_ops() {
    let temp = tempdir().expect("tempdir");
    let engine = engine_with_chain(temp.path(), vec![spec(1, true), spec(2, true)]);

    assert!(engine.unlock_next("dlv-1", 2, 10).expect("unlock").is_none());
    assert!(engine
        .unlock_next("dlv-missing", 1, 10)
        .expect("unlock")
        .is_none());
    assert!(engine
        .unlock_next("dlv-1", u32::MAX, 10)
        .expect("unlock")
        .is_none());

    engine
        .submit("dlv-1-step-1", 11)
        .expect("submit")
        .expect("step exists");
    engine
        .submit("dlv-1-step-2", 12)
        .expect("submit")
        .expect("step exists");
    assert_eq!(
        statuses(&engine),
        vec![StepStatus::Completed, StepStatus::Completed]
    );
    assert!(engine.head_step("dlv-1").expect("head").is_none());
}

#[test]
fn unlock_module_head_step_tracks_the_frontier() {
    let temp = tempdir().expect("tempdir");
    let engine = engine_with_chain(temp.path(), vec![spec(1, true), spec(2, true), spec(3, true)]);

    let head = engine
        .head_step("dlv-1")
        .expect("head")
        .expect("open step");
    assert_eq!(head.step_number, 1);

    engine
        .submit("dlv-1-step-1", 10)
        .expect("submit")
        .expect("step exists");
    let head = engine
        .head_step("dlv-1")
        .expect("head")
        .expect("open step");
    assert_eq!(head.step_number, 2);
    assert_eq!(head.status, StepStatus::Pending);
}
