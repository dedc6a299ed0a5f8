pub mod args;
pub mod commands;

pub use args::{InvokeArgs, ServeArgs};
use clap::{Parser, Subcommand};
use std::path::Path;

const HELP_TEMPLATE: &str = "\
{name} {version}\n\
{about-with-newline}\n\
USAGE:\n    {usage}\n\
\nOPTIONS:\n{options}\n\
COMMANDS:\n{subcommands}\n";

#[derive(Parser, Debug)]
#[command(name = "agent-bridge")]
#[command(version = crate::VERSION)]
#[command(about = "MCP bridge for coding-agent CLIs")]
#[command(help_template = HELP_TEMPLATE)]
#[command(
    after_long_help = "Typical flow: try a template with `invoke`, then run it behind MCP with `serve`."
)]
pub struct Args {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    #[command(
        about = "Serve the bridged CLI over MCP",
        long_about = "Serve exposes the configured CLI as a single MCP tool on POST /mcp, with GET /health and an optional legacy REST route.",
        after_help = "Example:\n    agent-bridge serve --config codex.toml --port 53001"
    )]
    Serve(ServeArgs),
    #[command(
        about = "Run the bridged CLI once and print the response",
        long_about = "Invoke resolves the template, runs the CLI with the same isolation and timeout as the server, and prints the ToolResponse JSON to stdout.",
        after_help = "Example:\n    agent-bridge invoke --command 'echo {{payload}}' --prompt '{\"ok\":true}'"
    )]
    Invoke(InvokeArgs),
}

impl Command {
    pub fn config_path(&self) -> Option<&Path> {
        match self {
            Command::Serve(args) => args.config.as_deref(),
            Command::Invoke(args) => args.config.as_deref(),
        }
    }
}

pub async fn run(args: Args) -> crate::Result<()> {
    let command = args.command;
    let overrides = match &command {
        Command::Serve(serve_args) => serve_args.overrides(),
        Command::Invoke(invoke_args) => invoke_args.overrides(),
    };
    let config = crate::core::config::ConfigLoader::load(command.config_path(), &overrides)?;
    let _logging = crate::logging::init(&command, command.config_path(), &config.name)?;

    match command {
        Command::Serve(_) => commands::serve(config).await,
        Command::Invoke(invoke_args) => commands::invoke(config, invoke_args).await,
    }
}
