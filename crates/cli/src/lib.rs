pub mod commands;
pub mod console;
pub mod logging;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use switchboard_core::config::{ConfigOverrides, LoadOptions};

#[derive(Debug, Parser)]
#[command(
    name = "switchboard",
    about = "Function-calling chat console",
    long_about = "Chat with a model that can look up records and email through registered functions, and inspect the configuration it runs with.",
    after_help = "Examples:\n  switchboard chat\n  switchboard doctor --json\n  switchboard schemas"
)]
pub struct Cli {
    #[arg(long, global = true, help = "Config file to load instead of switchboard.toml")]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(about = "Start an interactive chat session on stdin/stdout")]
    Chat {
        #[arg(long, help = "Override llm.model")]
        model: Option<String>,
        #[arg(long, help = "Override session.system_prompt_path")]
        system_prompt: Option<PathBuf>,
        #[arg(long, help = "Override session.max_function_calls_per_turn (0 = unlimited)")]
        max_function_calls: Option<u32>,
    },
    #[command(
        about = "Inspect effective configuration values with source attribution and redaction"
    )]
    Config,
    #[command(about = "Print the JSON schemas of every enabled function")]
    Schemas,
    #[command(about = "Validate config, completion client, function registry and system prompt")]
    Doctor {
        #[arg(long, help = "Emit machine-readable JSON output")]
        json: bool,
    },
}

pub fn run() -> ExitCode {
    let cli = Cli::parse();
    let load_options = |overrides: ConfigOverrides| LoadOptions {
        require_file: cli.config.is_some(),
        config_path: cli.config.clone(),
        overrides,
    };

    let result = match cli.command {
        Command::Chat { ref model, ref system_prompt, max_function_calls } => {
            commands::chat::run(load_options(ConfigOverrides {
                llm_model: model.clone(),
                system_prompt_path: system_prompt.clone(),
                max_function_calls_per_turn: max_function_calls,
                ..ConfigOverrides::default()
            }))
        }
        Command::Config => commands::CommandResult {
            exit_code: 0,
            output: commands::config::run(load_options(ConfigOverrides::default())),
        },
        Command::Schemas => commands::schemas::run(load_options(ConfigOverrides::default())),
        Command::Doctor { json } => commands::CommandResult {
            exit_code: 0,
            output: commands::doctor::run(load_options(ConfigOverrides::default()), json),
        },
    };

    println!("{}", result.output);
    ExitCode::from(result.exit_code)
}
