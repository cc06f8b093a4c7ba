use std::path::{Path, PathBuf};

use clap::Parser;
use log::warn;
use positioning_core::evaluation::{EvaluationAccumulator, SessionEvaluation};
use positioning_core::session_log::{parse_reference_name, read_session_log};
use serde_json::json;

#[derive(Parser, Debug)]
struct Args {
    /// Single session log named `Direction(x_y_z).txt`
    #[arg(long, conflicts_with = "dir")]
    log: Option<PathBuf>,

    /// Directory of session logs (processes *.txt)
    #[arg(long)]
    dir: Option<PathBuf>,
}

fn evaluate_file(path: &Path, accumulator: &mut EvaluationAccumulator) -> anyhow::Result<SessionEvaluation> {
    let name = path
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| anyhow::anyhow!("bad file name {}", path.display()))?;
    let reference = parse_reference_name(name)?;
    let records = read_session_log(path)?;
    Ok(accumulator.add_session(&records, &reference.position)?)
}

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let mut paths = Vec::new();
    if let Some(dir) = args.dir.as_ref() {
        for entry in std::fs::read_dir(dir)? {
            let path = entry?.path();
            if path.is_file() && path.extension().map(|e| e == "txt").unwrap_or(false) {
                paths.push(path);
            }
        }
        paths.sort();
    } else if let Some(log) = args.log.as_ref() {
        paths.push(log.clone());
    } else {
        anyhow::bail!("Provide --log or --dir");
    }

    let mut files = Vec::new();
    let mut accumulator = EvaluationAccumulator::new();
    for path in &paths {
        match evaluate_file(path, &mut accumulator) {
            Ok(eval) => {
                files.push(json!({ "file": path.display().to_string(), "evaluation": eval }));
            }
            Err(e) => warn!("[evaluate] skipping {}: {}", path.display(), e),
        }
    }

    if accumulator.sessions() == 0 {
        anyhow::bail!("no session logs could be evaluated");
    }
    let summary = accumulator.finish()?;

    println!(
        "{}",
        serde_json::to_string_pretty(&json!({ "files": files, "aggregate": summary }))?
    );
    Ok(())
}
