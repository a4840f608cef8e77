//! `gemini` CLI adapter.

use anyhow::Result;

use crate::adapters::{CliAdapter, resolve_binary};
use crate::io::config::ModelName;

pub fn adapter() -> Result<CliAdapter> {
    let binary = resolve_binary(ModelName::Gemini)?;
    // The gemini CLI takes the prompt via `-p` like the others; no extra
    // flags are needed for non-interactive runs.
    Ok(CliAdapter::new(ModelName::Gemini, binary, Vec::new()))
}
