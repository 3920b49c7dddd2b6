//! `qfos run` — execute the window optimizer end to end.

use crate::cli::commands::{load_config, load_requests};
use crate::error::Result;
use crate::optimizer;
use crate::sink::{NdjsonSessionSink, SessionSink};
use std::path::PathBuf;

/// Execute `qfos run`.
///
/// # Errors
///
/// Returns an error if the input/output cannot be read or written, the
/// configuration is invalid, or the optimizer encounters a fatal error.
pub fn execute(input: Option<PathBuf>, output: Option<PathBuf>, config_path: Option<PathBuf>, json: bool) -> Result<()> {
    let config = load_config(config_path.as_deref())?;
    let requests = load_requests(input.as_deref())?;

    tracing::info!(request_count = requests.len(), "running window optimizer");
    let report = optimizer::optimize(&requests, &config, None)?;

    let sessions = match report.recommended_window_ms {
        Some(window_ms) => optimizer::sessions_for_window(&requests, window_ms, &config)?,
        None => Vec::new(),
    };

    match output {
        Some(path) => {
            let file = std::fs::File::create(&path)?;
            let mut sink = NdjsonSessionSink::new(file);
            sink.write_sessions(&sessions)?;
            sink.write_report(&report)?;
        }
        None => {
            let mut sink = NdjsonSessionSink::new(std::io::stdout());
            sink.write_sessions(&sessions)?;
            sink.write_report(&report)?;
        }
    }

    if !json {
        match report.recommended_window_ms {
            Some(window_ms) => {
                let confidence = report.confidence.map_or("unknown", |c| match c {
                    crate::model::report::Confidence::High => "high",
                    crate::model::report::Confidence::Medium => "medium",
                    crate::model::report::Confidence::Low => "low",
                });
                eprintln!("recommended window: {window_ms}ms (confidence: {confidence}), {} sessions", sessions.len());
            }
            None => eprintln!("no_recommendation: every candidate window failed support"),
        }
    }

    Ok(())
}
