//! CLI subcommand implementations.

pub mod bundle;
pub mod run;
pub mod validate;

use crate::config::Configuration;
use crate::error::Result;
use crate::model::Request;
use crate::source::{NdjsonRequestSource, RequestSource};
use std::io::Read;
use std::path::Path;

/// Load configuration from `path`, or defaults if `None`.
pub(crate) fn load_config(path: Option<&Path>) -> Result<Configuration> {
    match path {
        Some(path) => Configuration::load(path),
        None => {
            let config = Configuration::default();
            config.validate()?;
            Ok(config)
        }
    }
}

/// Read requests from `path`, or from stdin if `None`.
pub(crate) fn load_requests(path: Option<&Path>) -> Result<Vec<Request>> {
    match path {
        Some(path) => crate::source::read_ndjson_file(path),
        None => {
            let mut buf = Vec::new();
            std::io::stdin().read_to_end(&mut buf)?;
            NdjsonRequestSource::new(std::io::Cursor::new(buf)).read_all()
        }
    }
}
