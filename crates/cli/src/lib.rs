pub mod commands;

use clap::{Parser, Subcommand};
use std::process::ExitCode;

#[derive(Debug, Parser)]
#[command(
    name = "quorum",
    about = "Quorum order-approval operator CLI",
    long_about = "Submit, approve, deny and inspect orders that go through multilevel approval.",
    after_help = "Examples:\n  quorum seed\n  quorum submit ORD-DEMO-001\n  quorum approve ORD-DEMO-001 --as bob\n  quorum status ORD-DEMO-001"
)]
pub struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(about = "Apply pending database migrations and return structured status output")]
    Migrate,
    #[command(about = "Load the demo groups, roles, quota and cart")]
    Seed,
    #[command(about = "Inspect effective configuration values with source attribution")]
    Config,
    #[command(about = "Validate config, DB connectivity and migration state")]
    Doctor {
        #[arg(long, help = "Emit machine-readable JSON output")]
        json: bool,
    },
    #[command(about = "Submit a cart for approval")]
    Submit {
        order_id: String,
    },
    #[command(about = "Approve an order with every quorum role the profile holds")]
    Approve {
        order_id: String,
        #[arg(long = "as", value_name = "PROFILE", help = "Profile giving the approval")]
        profile: String,
        #[arg(long, help = "Parent job the created jobs are attached to")]
        parent_job: Option<String>,
    },
    #[command(about = "Deny a pending order")]
    Deny {
        order_id: String,
        #[arg(long = "as", value_name = "PROFILE")]
        profile: String,
        #[arg(long, default_value = "no reason given")]
        reason: String,
    },
    #[command(about = "Cancel an order as its owner")]
    Cancel {
        order_id: String,
        #[arg(long = "as", value_name = "PROFILE")]
        profile: String,
    },
    #[command(about = "Show approval progress, jobs and history of an order")]
    Status {
        order_id: String,
    },
}

pub fn run() -> ExitCode {
    let cli = Cli::parse();

    let result = match cli.command {
        Command::Migrate => commands::migrate::run(),
        Command::Seed => commands::seed::run(),
        Command::Config => {
            commands::CommandResult { exit_code: 0, output: commands::config::run() }
        }
        Command::Doctor { json } => {
            commands::CommandResult { exit_code: 0, output: commands::doctor::run(json) }
        }
        Command::Submit { order_id } => commands::submit::run(&order_id),
        Command::Approve { order_id, profile, parent_job } => {
            commands::approve::run(&order_id, &profile, parent_job.as_deref())
        }
        Command::Deny { order_id, profile, reason } => {
            commands::deny::run(&order_id, &profile, &reason)
        }
        Command::Cancel { order_id, profile } => commands::cancel::run(&order_id, &profile),
        Command::Status { order_id } => commands::status::run(&order_id),
    };

    println!("{}", result.output);
    ExitCode::from(result.exit_code)
}
