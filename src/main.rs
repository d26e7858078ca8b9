use std::io::{self, BufRead, Write};

use tracing_subscriber::EnvFilter;

use hotswap::engine::Notice;
use hotswap::{EngineConfig, PersonaEngine};

/// Minimal REPL host: each stdin line is one inbound message for a single
/// local conversation. Useful for exercising the engine without a chat
/// frontend.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,hotswap=debug")),
        )
        .init();

    let config = EngineConfig::load();
    tracing::info!(
        "Persona engine starting (prefix '{}', catalog {:?})",
        config.keyword_prefix,
        config.resolved_catalog_path()
    );

    let engine = PersonaEngine::new(config)?;

    let stdin = io::stdin();
    let mut stdout = io::stdout();
    print!("> ");
    stdout.flush()?;

    for line in stdin.lock().lines() {
        let line = line?;
        let outcome = engine.process(&line, "local").await;

        if let Some(persona) = &outcome.introduced_persona {
            println!("[switched to {}: {}]", persona.name, persona.description);
        }
        match &outcome.notice {
            Some(Notice::List(listings)) => {
                println!("Available personas:");
                for listing in listings {
                    println!(
                        "  {}{} - {}: {}",
                        engine.config().keyword_prefix,
                        listing.key,
                        listing.name,
                        listing.description
                    );
                }
            }
            Some(Notice::Import(report)) => {
                println!(
                    "[import: {} added, {} overwritten, backup {:?}]",
                    report.added, report.overwritten, report.backup
                );
                if !report.rejected.is_empty() {
                    println!("[rejected entries: {}]", report.rejected.join(", "));
                }
            }
            Some(Notice::Error(message)) => println!("[error: {message}]"),
            None => {}
        }

        println!("--- system prompt ---\n{}\n", outcome.system_prompt);
        print!("> ");
        stdout.flush()?;
    }

    Ok(())
}
