use crate::config::Config;
use crate::llm::{CompletionClient, ModelSettings};
use crate::session::{ChatSession, Role};
use crate::streaming::complete_turn;
use anyhow::{Context, Result, bail};
use std::io::{self, Write};
use std::path::Path;

/// One question, one streamed answer on stdout
pub async fn ask(config: &Config, model: &str, message: &str) -> Result<()> {
    if message.trim().is_empty() {
        bail!("Message must not be empty");
    }
    let Some(api_key) = config.api_key_from_env() else {
        bail!("Set {} to your Groq API key", config.api_key_env);
    };

    let client = CompletionClient::new(config, Some(api_key))?;
    let settings = ModelSettings::from_config(config, model);

    let mut session = ChatSession::new(config.system_prompt.clone());
    session.create();
    session.append_message(Role::User, message)?;

    let mut stdout = io::stdout();
    let mut printed = 0;
    complete_turn(&mut session, &client, &settings, |partial| {
        // partials are cumulative, print only what is new
        let _ = write!(stdout, "{}", &partial[printed..]);
        let _ = stdout.flush();
        printed = partial.len();
    })
    .await?;
    println!();

    Ok(())
}

pub fn list_models(config: &Config) {
    let default = config.default_model_index();
    println!("Available models:");
    for (index, model) in config.models.iter().enumerate() {
        let marker = if index == default { "*" } else { " " };
        println!("  {marker} {model}");
    }
}

pub fn init_config(path: &Path, force: bool) -> Result<()> {
    if path.exists() && !force {
        bail!("{} already exists, pass --force to overwrite it", path.display());
    }
    Config::default()
        .save(path)
        .with_context(|| format!("Failed to write {}", path.display()))?;
    println!("Wrote default config to {}", path.display());
    Ok(())
}
