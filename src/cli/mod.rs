pub mod commands;
pub mod utils;

use clap::{Parser, Subcommand};
use serde::{Deserialize, Serialize};

use crate::types::RESI_ROUTE;

#[derive(Parser)]
#[command(name = "resi")]
#[command(about = "resi CLI - build, inspect and call generated API clients")]
#[command(version)]
pub struct Cli {
    #[arg(long, global = true, help = "Output in human-readable text format")]
    pub text: bool,

    #[arg(long, global = true, help = "Output in JSON format")]
    pub json: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    #[command(about = "Generate a client from a running server's build stream")]
    Build {
        #[arg(help = "Server URL, e.g. http://localhost:3000")]
        url: String,
        #[arg(help = "Directory the client is written into")]
        out_dir: String,
        #[arg(long, default_value = RESI_ROUTE, help = "Path prefix the server mounts its APIs under")]
        prefix: String,
    },

    #[command(about = "List the APIs and handlers of a generated client")]
    Describe {
        #[arg(help = "Generated client directory")]
        dir: String,
    },

    #[command(about = "Print a fresh key set as environment lines")]
    Keys,

    #[command(about = "Call a handler through a generated client")]
    Call {
        #[arg(help = "Server URL")]
        url: String,
        #[arg(help = "Generated client directory")]
        dir: String,
        #[arg(help = "API name")]
        api: String,
        #[arg(help = "Handler name")]
        handler: String,
        #[arg(help = "Positional arguments, each parsed as JSON (bare words become strings)")]
        args: Vec<String>,
        #[arg(long, default_value = RESI_ROUTE, help = "Path prefix the server mounts its APIs under")]
        prefix: String,
    },

    #[command(about = "Discard the stored bearer token")]
    Logout,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum OutputFormat {
    Text,
    Json,
}

impl OutputFormat {
    pub fn from_cli(cli: &Cli) -> Self {
        if cli.json {
            OutputFormat::Json
        } else {
            OutputFormat::Text
        }
    }
}

pub async fn run(cli: Cli) -> anyhow::Result<()> {
    let output_format = OutputFormat::from_cli(&cli);

    match cli.command {
        Commands::Build { url, out_dir, prefix } => {
            commands::build::handle(&url, &out_dir, &prefix, output_format).await
        }
        Commands::Describe { dir } => commands::describe::handle(&dir, output_format).await,
        Commands::Keys => commands::keys::handle(output_format),
        Commands::Call {
            url,
            dir,
            api,
            handler,
            args,
            prefix,
        } => commands::call::handle(&url, &dir, &api, &handler, &args, &prefix, output_format).await,
        Commands::Logout => commands::call::logout(output_format).await,
    }
}
