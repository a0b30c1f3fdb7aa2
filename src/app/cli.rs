#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CliVerb {
    Setup,
    Template,
    Deliverable,
    Step,
    Help,
    Unknown,
}

pub fn parse_cli_verb(input: &str) -> CliVerb {
    match input {
        "setup" => CliVerb::Setup,
        "template" => CliVerb::Template,
        "deliverable" => CliVerb::Deliverable,
        "step" => CliVerb::Step,
        "help" | "--help" | "-h" => CliVerb::Help,
        _ => CliVerb::Unknown,
    }
}

pub fn cli_help_lines() -> Vec<String> {
    vec![
        "Commands:".to_string(),
        "  setup [--admin <id> ...]                     Create state root, config and database"
            .to_string(),
        "  template add <org_id> <file.yaml>            Register a compliance template"
            .to_string(),
        "  template list <org_id> [--all]               List templates (active only by default)"
            .to_string(),
        "  template show <template_id>                  Print a template as yaml".to_string(),
        "  template default <org_id> [category]         Resolve the default template".to_string(),
        "  template set-default <template_id>           Make a template the scope default"
            .to_string(),
        "  template deactivate <template_id>            Soft-delete a template".to_string(),
        "  deliverable add <id> <org_id> [category]     Register a deliverable".to_string(),
        "  deliverable show <id>                        Show rollup fields and chain provenance"
            .to_string(),
        "  deliverable instantiate <id> [template_id]   Create the deliverable's step chain"
            .to_string(),
        "  deliverable progress <id> <org_id>           Recompute the deliverable rollup"
            .to_string(),
        "  deliverable head <id>                        Show the earliest unfinished step"
            .to_string(),
        "  deliverable unlock <id> <step_number>        Unlock the step after <step_number>"
            .to_string(),
        "  step list <deliverable_id>                   List steps in chain order".to_string(),
        "  step show <step_id>                          Print a step as yaml".to_string(),
        "  step save <step_id> <json>                   Autosave a draft payload".to_string(),
        "  step submit <step_id>                        Submit a step".to_string(),
        "  step approve <step_id> --admin <id> [comment]  Approve a submitted step".to_string(),
        "  step reject <step_id> --admin <id> <reason>  Reject a submitted step".to_string(),
    ]
}

pub(crate) fn help_text() -> String {
    cli_help_lines().join("\n")
}
