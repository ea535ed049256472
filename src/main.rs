use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::{Level, info};
use tracing_subscriber::FmtSubscriber;

use clinscribe::{
    AppConfig, CancelToken, OllamaClient, Pipeline, RawTranscript, SessionStore, TermCorrector,
};

#[derive(Parser)]
#[command(name = "clinscribe")]
#[command(author, version, about = "Medical dictation to clinical note pipeline", long_about = None)]
struct Cli {
    /// Configuration file (JSON); defaults apply when absent
    #[arg(short, long, default_value = "clinscribe.json")]
    config: PathBuf,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the full pipeline on a raw transcript file
    Process {
        /// Input transcript file (plain text from the ASR engine)
        #[arg(short, long)]
        input: PathBuf,

        /// Write the final note here as well as into session storage
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Apply the terminology correction table only (offline, no model)
    Correct {
        /// Input transcript file
        #[arg(short, long)]
        input: PathBuf,
    },

    /// Delete sessions past the configured retention window
    Cleanup,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    setup_logging(cli.verbose);

    let config = AppConfig::load(&cli.config).context("Failed to load configuration")?;

    match cli.command {
        Commands::Process { input, output } => process_dictation(&config, input, output).await,
        Commands::Correct { input } => correct_only(&config, input),
        Commands::Cleanup => cleanup(&config),
    }
}

fn setup_logging(verbose: bool) {
    let level = if verbose { Level::DEBUG } else { Level::INFO };
    let subscriber = FmtSubscriber::builder().with_max_level(level).finish();
    tracing::subscriber::set_global_default(subscriber).ok();
}

fn build_corrector(config: &AppConfig) -> Result<TermCorrector> {
    match &config.corrections.rules_file {
        Some(path) => TermCorrector::from_file(path).context("Failed to load correction rules"),
        None => Ok(TermCorrector::with_default_rules()),
    }
}

async fn process_dictation(
    config: &AppConfig,
    input: PathBuf,
    output: Option<PathBuf>,
) -> Result<()> {
    let text = std::fs::read_to_string(&input)
        .with_context(|| format!("Failed to read transcript: {input:?}"))?;
    let raw = RawTranscript::new(text);
    info!(
        "Loaded transcript: {} chars, speaker labels: {}",
        raw.text.len(),
        raw.has_speaker_labels()
    );

    let corrector = build_corrector(config)?;
    let model = Arc::new(OllamaClient::new(config.llm.clone())?);
    let store = SessionStore::new(config.storage.clone())?;
    let pipeline = Pipeline::new(corrector, model, config, store);

    match pipeline.run(&raw, &CancelToken::new()).await {
        Ok(success) => {
            info!(
                session_id = %success.session_id,
                models = ?success.record.models_used(),
                "Session complete"
            );
            let rendered = success.note.render();
            if let Some(path) = output {
                std::fs::write(&path, &rendered)
                    .with_context(|| format!("Failed to write note: {path:?}"))?;
                info!("Note written to {:?}", path);
            }
            println!("{rendered}");
            Ok(())
        }
        Err(failure) => {
            for stage in &failure.record.stages {
                info!(
                    stage = %stage.stage,
                    state = ?stage.state,
                    attempts = stage.attempts,
                    "Stage outcome"
                );
            }
            anyhow::bail!(
                "Session {} did not complete: {}",
                failure.session_id,
                failure.error
            )
        }
    }
}

fn correct_only(config: &AppConfig, input: PathBuf) -> Result<()> {
    let text = std::fs::read_to_string(&input)
        .with_context(|| format!("Failed to read transcript: {input:?}"))?;
    let corrector = build_corrector(config)?;
    print!("{}", corrector.correct(&text));
    Ok(())
}

fn cleanup(config: &AppConfig) -> Result<()> {
    let store = SessionStore::new(config.storage.clone())?;
    let removed = store.purge_old_sessions()?;
    info!(
        removed,
        retention_days = config.storage.retention_days,
        "Cleanup complete"
    );
    println!("Removed {removed} expired session(s).");
    Ok(())
}
