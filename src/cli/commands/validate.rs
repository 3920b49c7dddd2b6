//! `qfos validate-config` — load and validate a configuration file
//! without running the pipeline.

use crate::config::Configuration;
use crate::error::Result;
use std::path::PathBuf;

/// Execute `qfos validate-config`.
///
/// # Errors
///
/// Returns `Error::Config` if the file fails validation, or an I/O/JSON
/// error if the file cannot be read or parsed.
pub fn execute(config_path: Option<PathBuf>, json: bool) -> Result<()> {
    let config = match config_path {
        Some(path) => Configuration::load(&path)?,
        None => {
            let config = Configuration::default();
            config.validate()?;
            config
        }
    };

    if json {
        println!("{}", serde_json::to_string(&config)?);
    } else {
        println!("configuration is valid");
        println!("candidate windows: {:?}", config.candidate_windows_ms);
        println!("folds: {}, seed: {}", config.folds, config.seed);
        println!("refinement enabled: {}", config.refinement_enabled);
    }

    Ok(())
}
