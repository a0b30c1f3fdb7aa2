use crate::app::cli::{help_text, parse_cli_verb, CliVerb};
use crate::app::command_support::load_settings;
use crate::config::Settings;

pub mod deliverables;
pub mod setup;
pub mod steps;
pub mod templates;

pub fn run_cli(args: Vec<String>) -> Result<String, String> {
    if args.is_empty() {
        return Ok(help_text());
    }

    match parse_cli_verb(args[0].as_str()) {
        CliVerb::Setup => setup::cmd_setup(&args[1..]),
        CliVerb::Help => Ok(help_text()),
        CliVerb::Unknown => Err(format!("unknown command `{}`", args[0])),
        CliVerb::Template | CliVerb::Deliverable | CliVerb::Step => {
            let settings = load_settings()?;
            run_cli_with_settings(&settings, &args)
        }
    }
}

/// Runs a data command against explicit settings instead of the global config.
pub fn run_cli_with_settings(settings: &Settings, args: &[String]) -> Result<String, String> {
    let Some(verb) = args.first() else {
        return Ok(help_text());
    };

    match parse_cli_verb(verb.as_str()) {
        CliVerb::Template => templates::cmd_template(settings, &args[1..]),
        CliVerb::Deliverable => deliverables::cmd_deliverable(settings, &args[1..]),
        CliVerb::Step => steps::cmd_step(settings, &args[1..]),
        CliVerb::Help => Ok(help_text()),
        CliVerb::Setup => setup::bootstrap_state_root(settings),
        CliVerb::Unknown => Err(format!("unknown command `{verb}`")),
    }
}
