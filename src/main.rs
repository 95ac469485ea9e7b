mod gateway;

use clap::{Parser, Subcommand};
use quipu_channels::WhatsAppChannel;
use quipu_core::{
    config,
    traits::{Channel, Classifier},
};
use quipu_dialogue::DialogueRouter;
use quipu_nlu::LlmClassifier;
use quipu_store::Store;
use std::collections::HashMap;
use std::sync::Arc;

#[derive(Parser)]
#[command(
    name = "quipu",
    version,
    about = "Quipu — WhatsApp task & order assistant"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to config file.
    #[arg(short, long, default_value = "config.toml")]
    config: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the assistant.
    Start,
    /// Check configuration and classifier availability.
    Status,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    match cli.command {
        Commands::Start => {
            let cfg = config::load(&cli.config)?;

            let classifier: Arc<dyn Classifier> =
                Arc::new(LlmClassifier::from_config(&cfg.classifier));
            if !classifier.is_available().await {
                anyhow::bail!(
                    "classifier endpoint is not available — check [classifier] in {}",
                    cli.config
                );
            }

            let mut channels: HashMap<String, Arc<dyn Channel>> = HashMap::new();
            if let Some(ref wa) = cfg.channel.whatsapp {
                if wa.enabled {
                    if wa.access_token.is_empty() || wa.phone_number_id.is_empty() {
                        anyhow::bail!(
                            "WhatsApp is enabled but access_token/phone_number_id are empty. \
                             Set them in config.toml."
                        );
                    }
                    channels.insert(
                        "whatsapp".to_string(),
                        Arc::new(WhatsAppChannel::new(wa.clone())),
                    );
                }
            }
            if channels.is_empty() {
                anyhow::bail!("No channels enabled. Enable at least one channel in config.toml.");
            }

            let store = Store::new(&cfg.memory).await?;
            let router = DialogueRouter::new(store, classifier, cfg.dialogue.clone());

            println!("Quipu — starting assistant...");
            let gw = Arc::new(gateway::Gateway::new(router, channels));
            gw.run().await?;
        }
        Commands::Status => {
            let cfg = config::load(&cli.config)?;
            println!("Quipu — Status Check\n");
            println!("Config: {}", cli.config);
            println!("Database: {}", cfg.memory.db_path);
            println!();

            let classifier = LlmClassifier::from_config(&cfg.classifier);
            println!(
                "  classifier ({}): {}",
                cfg.classifier.model,
                if classifier.is_available().await {
                    "available"
                } else {
                    "not reachable"
                }
            );

            match cfg.channel.whatsapp {
                Some(ref wa) => println!(
                    "  whatsapp: {}",
                    if wa.enabled && !wa.access_token.is_empty() {
                        "configured"
                    } else if wa.enabled {
                        "enabled but missing access_token"
                    } else {
                        "disabled"
                    }
                ),
                None => println!("  whatsapp: not configured"),
            }
        }
    }

    Ok(())
}
