mod commands;
mod config;
mod events;
mod llm;
mod logging;
mod prompts;
mod session;
mod streaming;
#[cfg(test)]
mod testing;
mod ui;

use anyhow::Result;
use clap::{Parser, Subcommand};
use config::Config;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "groqchat")]
#[command(version)]
#[command(about = "Terminal chat client for Groq-hosted language models", long_about = None)]
struct Cli {
    /// Config file (default: ~/.groqchat/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Model to start with
    #[arg(long, global = true)]
    model: Option<String>,

    /// Write logs to this file
    #[arg(long, global = true)]
    log_file: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Send one message and stream the reply to stdout
    Ask {
        /// Message text; multiple words are joined with spaces
        #[arg(required = true)]
        message: Vec<String>,
    },
    /// List the configured models
    Models,
    /// Write the default config file
    InitConfig {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    if let Some(Commands::InitConfig { force }) = &cli.command {
        let path = match &cli.config {
            Some(path) => path.clone(),
            None => Config::default_path()?,
        };
        return commands::init_config(&path, *force);
    }

    let config = Config::load(cli.config.as_deref())?;
    let log_file = cli.log_file.clone().or_else(|| config.log_file.clone());

    match cli.command {
        None => {
            if let Some(path) = &log_file {
                logging::init_file_logging(path)?;
            }
            let api_key = config.api_key_from_env();
            ui::run(config, cli.model, api_key).await
        }
        Some(Commands::Ask { message }) => {
            match &log_file {
                Some(path) => logging::init_file_logging(path)?,
                None => logging::init_stderr_logging()?,
            }
            let model = cli.model.unwrap_or_else(|| config.default_model.clone());
            commands::ask(&config, &model, &message.join(" ")).await
        }
        Some(Commands::Models) => {
            commands::list_models(&config);
            Ok(())
        }
        Some(Commands::InitConfig { .. }) => Ok(()),
    }
}
