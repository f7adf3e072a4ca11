use std::{
    fs,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use clap::{Parser, Subcommand};
use liveproof_verification::{
    Artifact, ArtifactKind, ExecuteRequest, VerificationRuntime, VerifyRequest,
};
use serde_json::json;
use tokio::runtime::Runtime;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "liveproof", version, about = "Citation-backed answer verification")]
struct Cli {
    /// Optional TOML configuration; environment variables override it.
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Debug-level tracing on stderr.
    #[arg(long, short, global = true)]
    verbose: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Verifies a question and optionally generates an artifact in the same run.
    Verify {
        question: String,
        /// `answer` or `execute`.
        #[arg(long, default_value = "answer")]
        mode: String,
        #[arg(long)]
        topic: Option<String>,
        /// Action to run when the gate opens (implies `--mode execute`).
        #[arg(long)]
        execute: Option<String>,
        /// Writes the artifact here instead of printing it.
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// Prints a stored session.
    Session { session_id: String },
    /// Generates an artifact for a stored session.
    Execute {
        session_id: String,
        action_type: String,
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// Lists prior sessions on a topic.
    Compare { topic: String },
    /// Lists the most cited sources.
    Sources {
        #[arg(long)]
        limit: Option<usize>,
    },
    /// Prints the liveness payload.
    Health,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let filter = if cli.verbose { "debug" } else { "warn" };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| filter.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let runtime = VerificationRuntime::from_environment(cli.config.as_deref())?;
    let executor = Runtime::new().context("starting async runtime")?;
    executor.block_on(run(&runtime, cli.command))
}

async fn run(runtime: &VerificationRuntime, command: Commands) -> Result<()> {
    let service = runtime.service();
    match command {
        Commands::Verify {
            question,
            mode,
            topic,
            execute,
            out,
        } => {
            let mode = if execute.is_some() { "execute".to_string() } else { mode };
            let mut request = VerifyRequest::new(question).mode(mode);
            request.topic = topic;
            let session = service.verify(request).await?;
            tracing::info!(session_id = %session.session_id, score = session.reliability_score, "verified");
            let Some(action_type) = execute else {
                println!("{}", serde_json::to_string_pretty(&session)?);
                return Ok(());
            };
            if !session.can_execute {
                println!("{}", serde_json::to_string_pretty(&session)?);
                anyhow::bail!(
                    "execution not allowed for session {}: reliability {} below threshold",
                    session.session_id,
                    session.reliability_score
                );
            }
            let artifact = service
                .execute(ExecuteRequest {
                    session_id: session.session_id.clone(),
                    action_type,
                })
                .await?;
            emit_artifact(&artifact, out.as_deref(), &session.session_id)
        }
        Commands::Session { session_id } => {
            let session = service.get_session(&session_id).await?;
            println!("{}", serde_json::to_string_pretty(&session)?);
            Ok(())
        }
        Commands::Execute {
            session_id,
            action_type,
            out,
        } => {
            let artifact = service
                .execute(ExecuteRequest {
                    session_id: session_id.clone(),
                    action_type,
                })
                .await?;
            emit_artifact(&artifact, out.as_deref(), &session_id)
        }
        Commands::Compare { topic } => {
            let sessions = service.compare_topic(&topic).await?;
            println!(
                "{}",
                serde_json::to_string_pretty(&json!({ "topic": topic, "sessions": sessions }))?
            );
            Ok(())
        }
        Commands::Sources { limit } => {
            let sources = service.top_sources(limit).await?;
            println!(
                "{}",
                serde_json::to_string_pretty(&json!({ "sources": sources }))?
            );
            Ok(())
        }
        Commands::Health => {
            println!("{}", serde_json::to_string_pretty(&service.health())?);
            Ok(())
        }
    }
}

fn emit_artifact(artifact: &Artifact, out: Option<&Path>, session_id: &str) -> Result<()> {
    let Some(path) = out else {
        println!(
            "{}",
            serde_json::to_string_pretty(&json!({ "session_id": session_id, "artifact": artifact }))?
        );
        return Ok(());
    };
    write_artifact(artifact, path)?;
    println!(
        "{}",
        serde_json::to_string_pretty(&json!({
            "session_id": session_id,
            "kind": artifact.kind,
            "written": path,
            "logs": artifact.logs,
            "safety_notes": artifact.safety_notes,
        }))?
    );
    Ok(())
}

/// Report documents are decoded from base64; other artifacts are written as text.
fn write_artifact(artifact: &Artifact, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("creating {}", parent.display()))?;
    }
    let bytes = match artifact.kind {
        ArtifactKind::ReportDocument => STANDARD
            .decode(&artifact.content)
            .context("decoding report document")?,
        ArtifactKind::SourceSnippet | ArtifactKind::ConfigBlock => {
            artifact.content.clone().into_bytes()
        }
    };
    fs::write(path, bytes).with_context(|| format!("writing {}", path.display()))
}
