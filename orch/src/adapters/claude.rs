//! `claude` CLI adapter.

use anyhow::Result;

use crate::adapters::{CliAdapter, resolve_binary};
use crate::io::config::ModelName;

pub fn adapter() -> Result<CliAdapter> {
    let binary = resolve_binary(ModelName::Claude)?;
    Ok(CliAdapter::new(
        ModelName::Claude,
        binary,
        vec![
            "--model".to_string(),
            "claude-sonnet-4-5".to_string(),
            "--dangerously-skip-permissions".to_string(),
        ],
    ))
}
