use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use log::info;
use positioning_core::config::PipelineConfig;
use positioning_core::replay::{load_session, replay};
use positioning_core::session_log::write_session_log;
use serde_json::json;

#[derive(Parser, Debug)]
struct Args {
    /// Recorded session (.json or .json.gz)
    #[arg(long)]
    session: PathBuf,

    /// Pipeline tuning (JSON); defaults apply to missing fields
    #[arg(long)]
    config: Option<PathBuf>,

    /// Write a `raw|filtered` session log here
    #[arg(long)]
    output: Option<PathBuf>,
}

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let config = match args.config.as_ref() {
        Some(path) => PipelineConfig::from_json_file(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => PipelineConfig::default(),
    };
    let session = load_session(&args.session)
        .with_context(|| format!("loading session {}", args.session.display()))?;
    info!(
        "[replay] {} events from {}",
        session.events.len(),
        args.session.display()
    );

    let (records, summary) = replay(&session, &config)?;

    if let Some(output) = args.output.as_ref() {
        write_session_log(output, &records)
            .with_context(|| format!("writing session log {}", output.display()))?;
        info!("[replay] wrote {} records to {}", records.len(), output.display());
    }

    println!(
        "{}",
        serde_json::to_string_pretty(&json!({
            "session": args.session.display().to_string(),
            "records": records.len(),
            "summary": summary,
        }))?
    );
    Ok(())
}
