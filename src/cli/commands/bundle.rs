//! `qfos bundle` — single-window bundle (+ optional refine), for
//! debugging one candidate in isolation.

use crate::cli::commands::{load_config, load_requests};
use crate::error::Result;
use std::path::PathBuf;

/// Execute `qfos bundle`.
///
/// # Errors
///
/// Returns an error if the input cannot be read, the configuration is
/// invalid, or the requests are out of order within a provider partition.
pub fn execute(input: Option<PathBuf>, window_ms: u64, no_refine: bool, config_path: Option<PathBuf>, json: bool) -> Result<()> {
    let mut config = load_config(config_path.as_deref())?;
    if no_refine {
        config.refinement_enabled = false;
    }

    let requests = load_requests(input.as_deref())?;
    let sessions = crate::optimizer::sessions_for_window(&requests, window_ms, &config)?;

    if json {
        for session in &sessions {
            println!("{}", serde_json::to_string(session)?);
        }
    } else {
        for session in &sessions {
            println!(
                "{} provider={} size={} mibcs={:?} flags={:?}",
                session.session_id,
                session.provider,
                session.size(),
                session.mibcs,
                session.flags
            );
        }
        eprintln!("{} sessions at window={window_ms}ms", sessions.len());
    }

    Ok(())
}
