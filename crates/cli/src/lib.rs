pub mod commands;

use clap::{Parser, Subcommand};
use std::process::ExitCode;

#[derive(Debug, Parser)]
#[command(
    name = "warden",
    about = "Warden operator CLI",
    long_about = "Inspect configuration, check readiness, apply migrations, and exercise the \
                  command pipeline offline.",
    after_help = "Examples:\n  warden doctor --json\n  warden validate \"give Steve dirt 64\" --simulate\n  warden plan Steve \"give me 64 dirt\"\n  warden whois Steve"
)]
pub struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(about = "Apply pending audit-store migrations and return structured status output")]
    Migrate,
    #[command(
        about = "Inspect effective configuration values with source attribution and redaction"
    )]
    Config,
    #[command(about = "Validate config, model credentials, and audit-store connectivity")]
    Doctor {
        #[arg(long, help = "Emit machine-readable JSON output")]
        json: bool,
    },
    #[command(about = "Run a console command through the safety validator")]
    Validate {
        #[arg(help = "Command text, with or without a leading slash")]
        command: String,
        #[arg(long, help = "Also run the known-command and bracket checks")]
        simulate: bool,
    },
    #[command(about = "Resolve a chat message in dry-run mode and print the pipeline report")]
    Plan {
        actor: String,
        message: String,
    },
    #[command(about = "Show the role, capabilities, and confidence floor for a player")]
    Whois { actor: String },
}

pub fn run() -> ExitCode {
    let cli = Cli::parse();

    let result = match cli.command {
        Command::Migrate => commands::migrate::run(),
        Command::Config => {
            commands::CommandResult { exit_code: 0, output: commands::config::run() }
        }
        Command::Doctor { json } => commands::doctor::run(json),
        Command::Validate { command, simulate } => commands::validate::run(&command, simulate),
        Command::Plan { actor, message } => commands::plan::run(&actor, &message),
        Command::Whois { actor } => commands::whois::run(&actor),
    };

    println!("{}", result.output);
    ExitCode::from(result.exit_code)
}
