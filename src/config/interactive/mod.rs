
use anyhow::{Context, Result};
use console::style;
use dialoguer::{Confirm, Input, Select};
use std::path::Path;

use super::{Config, ConfigError, OllamaConfig, RecommendConfig, StoreConfig};
use crate::recommender::Strategy;

#[inline]
pub fn run_interactive_config(config_dir: &Path) -> Result<()> {
    eprintln!(
        "{}",
        style("🔧 Teammate Recommender Configuration Setup")
            .bold()
            .cyan()
    );
    eprintln!();

    let mut config = load_existing_config(config_dir);

    eprintln!("{}", style("Vector Store").bold().yellow());
    eprintln!("Embeddings for participants and hackathons are kept in LanceDB.");
    eprintln!();
    configure_store(&mut config.store)?;

    eprintln!();
    eprintln!("{}", style("Recommendations").bold().yellow());
    configure_recommend(&mut config.recommend)?;

    eprintln!();
    eprintln!("{}", style("Ollama Configuration").bold().yellow());
    eprintln!("Used to turn skill lists into embeddings and to suggest hackathon skills.");
    eprintln!();
    configure_ollama(&mut config.ollama)?;

    eprintln!();
    eprintln!("{}", style("Testing configuration...").yellow());

    if test_ollama_connection(&config.ollama) {
        eprintln!("{}", style("✓ Ollama connection successful!").green());
    } else {
        eprintln!(
            "{}",
            style("⚠ Warning: Could not connect to Ollama").yellow()
        );
        eprintln!("You can continue, but skill updates will fail until Ollama is running.");
    }

    eprintln!();
    if Confirm::new()
        .with_prompt("Save configuration?")
        .default(true)
        .interact()?
    {
        config.save().context("Failed to save configuration")?;
        eprintln!("{}", style("✓ Configuration saved successfully!").green());
        eprintln!(
            "Configuration saved to: {}",
            style(config.config_file_path().display()).cyan()
        );
    } else {
        eprintln!("Configuration not saved.");
    }

    Ok(())
}

#[inline]
pub fn show_config(config: &Config) -> Result<()> {
    eprintln!("{}", style("📋 Current Configuration").bold().cyan());
    eprintln!();

    eprintln!("{}", style("Vector Store:").bold().yellow());
    let uri = config.store.uri.clone().unwrap_or_else(|| {
        format!("{} (default)", config.vector_database_path().display())
    });
    eprintln!("  Location: {}", style(uri).cyan());
    eprintln!(
        "  Embedding Dimension: {}",
        style(config.store.embedding_dimension).cyan()
    );
    eprintln!("  nprobes: {}", style(config.store.nprobes).cyan());
    match config.store.refine_factor {
        Some(factor) => eprintln!("  Refine Factor: {}", style(factor).cyan()),
        None => eprintln!("  Refine Factor: {}", style("off").dim()),
    }
    eprintln!(
        "  Query Timeout: {}s",
        style(config.store.query_timeout_secs).cyan()
    );
    eprintln!("  Scan Workers: {}", style(config.store.scan_workers).cyan());

    eprintln!();
    eprintln!("{}", style("Recommendations:").bold().yellow());
    eprintln!("  Strategy: {}", style(config.recommend.strategy).cyan());
    eprintln!(
        "  Default Top-K: {}",
        style(config.recommend.default_top_k).cyan()
    );

    eprintln!();
    eprintln!("{}", style("Ollama Settings:").bold().yellow());
    eprintln!("  Host: {}", style(&config.ollama.host).cyan());
    eprintln!("  Port: {}", style(config.ollama.port).cyan());
    eprintln!(
        "  Embedding Model: {}",
        style(&config.ollama.embedding_model).cyan()
    );
    eprintln!(
        "  Generation Model: {}",
        style(&config.ollama.generation_model).cyan()
    );
    match config.ollama_url() {
        Ok(url) => eprintln!("  Ollama URL: {}", style(url).cyan()),
        Err(e) => eprintln!("  Ollama URL: {} ({})", style("Invalid").red(), e),
    }

    eprintln!();
    eprintln!(
        "Config file: {}",
        style(config.config_file_path().display()).dim()
    );

    Ok(())
}

fn load_existing_config(config_dir: &Path) -> Config {
    Config::load(config_dir).unwrap_or_else(|_| {
        eprintln!(
            "{}",
            style("No valid configuration found. Using defaults.").yellow()
        );
        Config {
            base_dir: config_dir.to_path_buf(),
            ..Config::default()
        }
    })
}

fn configure_store(store: &mut StoreConfig) -> Result<()> {
    let dimension: usize = Input::new()
        .with_prompt("Embedding dimension")
        .default(store.embedding_dimension)
        .validate_with(|input: &usize| -> Result<(), ConfigError> {
            StoreConfig::default().set_embedding_dimension(*input)
        })
        .interact_text()?;

    let nprobes: usize = Input::new()
        .with_prompt("Index partitions probed per search (nprobes)")
        .default(store.nprobes)
        .validate_with(|input: &usize| -> Result<(), ConfigError> {
            StoreConfig::default().set_nprobes(*input)
        })
        .interact_text()?;

    store.set_embedding_dimension(dimension)?;
    store.set_nprobes(nprobes)?;

    Ok(())
}

fn configure_recommend(recommend: &mut RecommendConfig) -> Result<()> {
    let strategies = [Strategy::Gap, Strategy::Team];
    let default_index = strategies
        .iter()
        .position(|&s| s == recommend.strategy)
        .unwrap_or(0);

    let strategy_index = Select::new()
        .with_prompt("Default recommendation strategy")
        .default(default_index)
        .items(&[
            "gap  - search for the skills the team is missing",
            "team - score every pairing against the hackathon",
        ])
        .interact()?;

    let top_k: usize = Input::new()
        .with_prompt("Default number of recommendations")
        .default(recommend.default_top_k)
        .validate_with(|input: &usize| -> Result<(), ConfigError> {
            RecommendConfig::default().set_default_top_k(*input)
        })
        .interact_text()?;

    recommend.strategy = strategies[strategy_index];
    recommend.set_default_top_k(top_k)?;

    Ok(())
}

fn configure_ollama(ollama: &mut OllamaConfig) -> Result<()> {
    let protocols = &["http", "https"];
    let default_index = protocols
        .iter()
        .position(|&p| p == ollama.protocol)
        .unwrap_or(0);

    let protocol_index = Select::new()
        .with_prompt("Ollama protocol")
        .default(default_index)
        .items(protocols)
        .interact()?;

    let protocol = protocols[protocol_index].to_string();

    let host: String = Input::new()
        .with_prompt("Ollama host")
        .default(ollama.host.clone())
        .validate_with(|input: &String| -> Result<(), ConfigError> {
            let mut temp_config = OllamaConfig {
                protocol: protocol.clone(),
                ..OllamaConfig::default()
            };
            temp_config.set_host(input.clone())
        })
        .interact_text()?;

    let port: u16 = Input::new()
        .with_prompt("Ollama port")
        .default(ollama.port)
        .validate_with(|input: &u16| -> Result<(), &str> {
            if *input == 0 {
                Err("Port must be greater than 0")
            } else {
                Ok(())
            }
        })
        .interact_text()?;

    let embedding_model: String = Input::new()
        .with_prompt("Embedding model")
        .default(ollama.embedding_model.clone())
        .validate_with(|input: &String| -> Result<(), &str> {
            if input.trim().is_empty() {
                Err("Model name cannot be empty")
            } else {
                Ok(())
            }
        })
        .interact_text()?;

    let generation_model: String = Input::new()
        .with_prompt("Skill suggestion model")
        .default(ollama.generation_model.clone())
        .validate_with(|input: &String| -> Result<(), &str> {
            if input.trim().is_empty() {
                Err("Model name cannot be empty")
            } else {
                Ok(())
            }
        })
        .interact_text()?;

    ollama.set_protocol(protocol)?;
    ollama.set_host(host)?;
    ollama.set_port(port)?;
    ollama.set_embedding_model(embedding_model)?;
    ollama.set_generation_model(generation_model)?;

    Ok(())
}

fn test_ollama_connection(ollama: &OllamaConfig) -> bool {
    let url = format!(
        "{}://{}:{}/api/version",
        ollama.protocol, ollama.host, ollama.port
    );

    let agent: ureq::Agent = ureq::Agent::config_builder()
        .timeout_global(Some(std::time::Duration::from_secs(5)))
        .build()
        .into();

    match agent.get(&url).call() {
        Ok(_) => true,
        Err(ureq::Error::StatusCode(code)) => (400..500).contains(&code),
        Err(_) => false,
    }
}
