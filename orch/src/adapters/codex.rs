//! `codex` CLI adapter.

use anyhow::Result;

use crate::adapters::{CliAdapter, resolve_binary};
use crate::io::config::ModelName;

pub fn adapter() -> Result<CliAdapter> {
    let binary = resolve_binary(ModelName::Codex)?;
    Ok(CliAdapter::new(
        ModelName::Codex,
        binary,
        vec!["--dangerously-bypass-approvals-and-sandbox".to_string()],
    ))
}
