use crate::compliance::domain::{ComplianceStep, StepData, StepStatus};
use crate::compliance::error::ComplianceError;

/// Result of applying one lifecycle operation to a step in memory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransitionOutcome {
    /// Status the step held before the operation; used as the compare-and-set guard.
    pub previous: StepStatus,
    /// Whether the successor step should be unlocked as part of this operation.
    pub unlock_next: bool,
}

/// With `strict` off every operation is accepted from any status, matching the
/// historical tolerant behavior.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransitionPolicy {
    pub strict: bool,
}

impl TransitionPolicy {
    pub fn strict() -> Self {
        Self { strict: true }
    }

    pub fn tolerant() -> Self {
        Self { strict: false }
    }

    fn check(
        self,
        step: &ComplianceStep,
        target: StepStatus,
    ) -> Result<StepStatus, ComplianceError> {
        let current = step.status;
        if self.strict && !current.can_transition_to(target) {
            return Err(ComplianceError::InvalidTransition {
                step_id: step.step_id.clone(),
                from: current,
                to: target,
            });
        }
        Ok(current)
    }
}

/// Autosave path, accepted from any status. Reopens a rejected step and
/// clears its rejection reason.
pub fn apply_save_draft(
    step: &mut ComplianceStep,
    data: StepData,
    now: i64,
    policy: TransitionPolicy,
) -> Result<TransitionOutcome, ComplianceError> {
    data.validate_for(step)
        .map_err(ComplianceError::InvalidPayload)?;
    let previous = policy.check(step, StepStatus::Draft)?;

    step.data = data;
    step.status = StepStatus::Draft;
    step.progress = 0;
    step.last_saved_at = Some(now);
    step.rejection_reason = None;
    step.updated_at = now;

    Ok(TransitionOutcome {
        previous,
        unlock_next: false,
    })
}

pub fn apply_submit(
    step: &mut ComplianceStep,
    now: i64,
    policy: TransitionPolicy,
) -> Result<TransitionOutcome, ComplianceError> {
    let target = if step.requires_admin_approval {
        StepStatus::Submitted
    } else {
        StepStatus::Completed
    };
    let previous = policy.check(step, target)?;

    step.status = target;
    step.progress = 100;
    step.submitted_at = Some(now);
    if target == StepStatus::Completed {
        step.completed_at = Some(now);
    }
    step.updated_at = now;

    Ok(TransitionOutcome {
        previous,
        unlock_next: target == StepStatus::Completed && step.auto_unlock_next,
    })
}

pub fn apply_approve(
    step: &mut ComplianceStep,
    admin_id: &str,
    comment: Option<&str>,
    now: i64,
    policy: TransitionPolicy,
) -> Result<TransitionOutcome, ComplianceError> {
    let previous = policy.check(step, StepStatus::Approved)?;

    step.status = StepStatus::Approved;
    step.progress = 100;
    step.approver_id = Some(admin_id.to_string());
    step.admin_comment = comment
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string);
    step.approved_at = Some(now);
    step.completed_at = Some(now);
    step.rejection_reason = None;
    step.updated_at = now;

    Ok(TransitionOutcome {
        previous,
        unlock_next: step.auto_unlock_next,
    })
}

pub fn apply_reject(
    step: &mut ComplianceStep,
    admin_id: &str,
    reason: &str,
    now: i64,
    policy: TransitionPolicy,
) -> Result<TransitionOutcome, ComplianceError> {
    let reason = require_rejection_reason(reason)?;
    let previous = policy.check(step, StepStatus::Rejected)?;

    step.status = StepStatus::Rejected;
    step.progress = 0;
    step.approver_id = Some(admin_id.to_string());
    step.rejection_reason = Some(reason.to_string());
    step.updated_at = now;

    Ok(TransitionOutcome {
        previous,
        unlock_next: false,
    })
}

/// Successor unlock only ever moves `locked` to `pending`.
pub fn apply_unlock(step: &mut ComplianceStep, now: i64) -> Option<TransitionOutcome> {
    if step.status != StepStatus::Locked {
        return None;
    }
    step.status = StepStatus::Pending;
    step.updated_at = now;
    Some(TransitionOutcome {
        previous: StepStatus::Locked,
        unlock_next: false,
    })
}

pub fn require_rejection_reason(reason: &str) -> Result<&str, ComplianceError> {
    let trimmed = reason.trim();
    if trimmed.is_empty() {
        return Err(ComplianceError::MissingRejectionReason);
    }
    Ok(trimmed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compliance::domain::{StepSpec, StepType};

    fn step(requires_admin_approval: bool, auto_unlock_next: bool) -> ComplianceStep {
        ComplianceStep::from_spec(
            "dlv-1-step-1".to_string(),
            "dlv-1",
            &StepSpec {
                step_number: 1,
                step_type: StepType::Form,
                title: "Intake".to_string(),
                description: String::new(),
                is_required: true,
                requires_admin_approval,
                auto_unlock_next,
                form_schema: None,
                checklist_items: Vec::new(),
            },
            100,
        )
    }

    #[test]
    fn submit_without_approval_completes_and_requests_unlock() {
        let mut step = step(false, true);
        let outcome = apply_submit(&mut step, 200, TransitionPolicy::strict()).expect("submit");
        assert_eq!(outcome.previous, StepStatus::Pending);
        assert!(outcome.unlock_next);
        assert_eq!(step.status, StepStatus::Completed);
        assert_eq!(step.progress, 100);
        assert_eq!(step.submitted_at, Some(200));
        assert_eq!(step.completed_at, Some(200));
    }

    #[test]
    fn submit_without_auto_unlock_does_not_request_unlock() {
        let mut step = step(false, false);
        let outcome = apply_submit(&mut step, 200, TransitionPolicy::strict()).expect("submit");
        assert!(!outcome.unlock_next);
    }

    #[test]
    fn submit_with_approval_waits_in_submitted() {
        let mut step = step(true, true);
        let outcome = apply_submit(&mut step, 200, TransitionPolicy::strict()).expect("submit");
        assert!(!outcome.unlock_next);
        assert_eq!(step.status, StepStatus::Submitted);
        assert_eq!(step.progress, 100);
        assert_eq!(step.submitted_at, Some(200));
        assert_eq!(step.completed_at, None);
    }

    #[test]
    fn approve_outside_submitted_is_rejected_when_strict() {
        let mut step = step(true, true);
        let err = apply_approve(&mut step, "admin-1", None, 200, TransitionPolicy::strict())
            .expect_err("pending cannot be approved");
        assert!(matches!(
            err,
            ComplianceError::InvalidTransition {
                from: StepStatus::Pending,
                to: StepStatus::Approved,
                ..
            }
        ));
        assert_eq!(step.status, StepStatus::Pending);
    }

    #[test]
    fn approve_outside_submitted_overwrites_when_tolerant() {
        let mut step = step(true, true);
        let outcome = apply_approve(
            &mut step,
            "admin-1",
            Some("looks fine"),
            200,
            TransitionPolicy::tolerant(),
        )
        .expect("tolerant approve");
        assert_eq!(outcome.previous, StepStatus::Pending);
        assert_eq!(step.status, StepStatus::Approved);
        assert_eq!(step.admin_comment.as_deref(), Some("looks fine"));
        assert_eq!(step.approved_at, Some(200));
        assert_eq!(step.completed_at, Some(200));
    }

    #[test]
    fn reject_records_reason_without_completion() {
        let mut step = step(true, true);
        apply_submit(&mut step, 200, TransitionPolicy::strict()).expect("submit");
        let outcome = apply_reject(
            &mut step,
            "admin-1",
            "  incomplete evidence ",
            300,
            TransitionPolicy::strict(),
        )
        .expect("reject");
        assert!(!outcome.unlock_next);
        assert_eq!(step.status, StepStatus::Rejected);
        assert_eq!(step.rejection_reason.as_deref(), Some("incomplete evidence"));
        assert_eq!(step.completed_at, None);
        assert_eq!(step.progress, 0);
    }

    #[test]
    fn blank_rejection_reason_is_refused_before_any_change() {
        let mut step = step(true, true);
        apply_submit(&mut step, 200, TransitionPolicy::strict()).expect("submit");
        let err = apply_reject(&mut step, "admin-1", "   ", 300, TransitionPolicy::strict())
            .expect_err("blank reason");
        assert!(matches!(err, ComplianceError::MissingRejectionReason));
        assert_eq!(step.status, StepStatus::Submitted);
    }

    #[test]
    fn draft_after_rejection_reopens_and_clears_reason() {
        let mut step = step(true, true);
        apply_submit(&mut step, 200, TransitionPolicy::strict()).expect("submit");
        apply_reject(&mut step, "admin-1", "missing", 300, TransitionPolicy::strict())
            .expect("reject");
        let outcome = apply_save_draft(&mut step, StepData::default(), 400, TransitionPolicy::strict())
            .expect("reopen");
        assert_eq!(outcome.previous, StepStatus::Rejected);
        assert_eq!(step.status, StepStatus::Draft);
        assert_eq!(step.rejection_reason, None);
        assert_eq!(step.approver_id.as_deref(), Some("admin-1"));
        assert_eq!(step.last_saved_at, Some(400));
    }

    #[test]
    fn draft_is_accepted_from_every_status_when_strict() {
        for status in [
            StepStatus::Locked,
            StepStatus::Pending,
            StepStatus::Submitted,
            StepStatus::Completed,
            StepStatus::Approved,
        ] {
            let mut current = step(false, true);
            current.status = status;
            current.progress = 100;
            let outcome =
                apply_save_draft(&mut current, StepData::default(), 1, TransitionPolicy::strict())
                    .expect("autosave");
            assert_eq!(outcome.previous, status);
            assert!(!outcome.unlock_next);
            assert_eq!(current.status, StepStatus::Draft);
            assert_eq!(current.progress, 0);
        }
    }

    #[test]
    fn unlock_only_moves_locked_steps() {
        let mut locked = step(false, true);
        locked.status = StepStatus::Locked;
        assert!(apply_unlock(&mut locked, 5).is_some());
        assert_eq!(locked.status, StepStatus::Pending);
        assert!(apply_unlock(&mut locked, 6).is_none());
        assert_eq!(locked.updated_at, 5);
    }
}
