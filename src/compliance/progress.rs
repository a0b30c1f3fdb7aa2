use crate::compliance::domain::ComplianceStep;
use crate::config::ZeroRequiredProgress;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressRollup {
    pub required_steps: u32,
    pub completed_steps: u32,
    pub progress_percent: u8,
    pub upload_unlocked: bool,
}

/// `round(100 * completed / total)` with halves rounded up, in integers.
pub fn round_percent(completed: u32, total: u32) -> u8 {
    if total == 0 {
        return 0;
    }
    let completed = u64::from(completed.min(total));
    let total = u64::from(total);
    ((200 * completed + total) / (2 * total)) as u8
}

/// Derives the deliverable rollup from its steps. `None` means the rollup
/// fields must be left untouched.
pub fn compute_rollup(
    steps: &[ComplianceStep],
    zero_required: ZeroRequiredProgress,
) -> Option<ProgressRollup> {
    let required = steps.iter().filter(|step| step.is_required);
    let (total, completed) = required.fold((0_u32, 0_u32), |(total, completed), step| {
        let done = u32::from(step.status.is_terminal_success());
        (total + 1, completed + done)
    });

    if total == 0 {
        return match zero_required {
            ZeroRequiredProgress::Complete => Some(ProgressRollup {
                required_steps: 0,
                completed_steps: 0,
                progress_percent: 100,
                upload_unlocked: true,
            }),
            ZeroRequiredProgress::Unchanged => None,
        };
    }

    let progress_percent = round_percent(completed, total);
    Some(ProgressRollup {
        required_steps: total,
        completed_steps: completed,
        progress_percent,
        upload_unlocked: progress_percent == 100,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compliance::domain::{StepSpec, StepStatus, StepType};

    fn step(number: u32, is_required: bool, status: StepStatus) -> ComplianceStep {
        let mut step = ComplianceStep::from_spec(
            format!("d-step-{number}"),
            "d",
            &StepSpec {
                step_number: number,
                step_type: StepType::Checklist,
                title: format!("Step {number}"),
                description: String::new(),
                is_required,
                requires_admin_approval: false,
                auto_unlock_next: true,
                form_schema: None,
                checklist_items: Vec::new(),
            },
            0,
        );
        step.status = status;
        step
    }

    #[test]
    fn rounding_is_half_up_on_the_percentage() {
        assert_eq!(round_percent(0, 3), 0);
        assert_eq!(round_percent(1, 3), 33);
        assert_eq!(round_percent(2, 3), 67);
        assert_eq!(round_percent(3, 3), 100);
        // 100/8 = 12.5 and 300/8 = 37.5 round up.
        assert_eq!(round_percent(1, 8), 13);
        assert_eq!(round_percent(3, 8), 38);
        assert_eq!(round_percent(1, 200), 1);
        assert_eq!(round_percent(199, 200), 100);
    }

    #[test]
    fn only_required_completed_or_approved_steps_count() {
        let steps = vec![
            step(1, true, StepStatus::Completed),
            step(2, true, StepStatus::Approved),
            step(3, true, StepStatus::Rejected),
            step(4, true, StepStatus::Submitted),
            step(5, false, StepStatus::Completed),
        ];
        let rollup = compute_rollup(&steps, ZeroRequiredProgress::Complete).expect("rollup");
        assert_eq!(rollup.required_steps, 4);
        assert_eq!(rollup.completed_steps, 2);
        assert_eq!(rollup.progress_percent, 50);
        assert!(!rollup.upload_unlocked);
    }

    #[test]
    fn upload_unlocks_only_at_one_hundred() {
        let steps = vec![
            step(1, true, StepStatus::Completed),
            step(2, true, StepStatus::Approved),
            step(3, false, StepStatus::Locked),
        ];
        let rollup = compute_rollup(&steps, ZeroRequiredProgress::Complete).expect("rollup");
        assert_eq!(rollup.progress_percent, 100);
        assert!(rollup.upload_unlocked);
    }

    #[test]
    fn zero_required_steps_follow_configured_policy() {
        let steps = vec![step(1, false, StepStatus::Pending)];
        let complete = compute_rollup(&steps, ZeroRequiredProgress::Complete).expect("complete");
        assert_eq!(complete.progress_percent, 100);
        assert!(complete.upload_unlocked);
        assert_eq!(compute_rollup(&steps, ZeroRequiredProgress::Unchanged), None);
        assert_eq!(compute_rollup(&[], ZeroRequiredProgress::Unchanged), None);
    }
}
