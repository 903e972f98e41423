//! `stride parse` command: interpret raw model output read from stdin.

use std::io::Read;

use anyhow::{Context, Result};
use serde_json::{Value, json};

use stride_core::response;

/// Report for one piece of model output. `strict` is false when the
/// output only became an action through the plain-reply fallback, in
/// which case `error` says why the strict parse failed.
pub fn parse_report(raw: &str) -> Value {
    match response::try_parse_response(raw) {
        Ok(action) => json!({
            "strict": true,
            "action": action.to_contract_json(),
        }),
        Err(e) => json!({
            "strict": false,
            "error": e.to_string(),
            "action": response::parse_with_fallback(raw).to_contract_json(),
        }),
    }
}

/// Run the parse command.
pub fn run_parse() -> Result<()> {
    let mut raw = String::new();
    std::io::stdin()
        .read_to_string(&mut raw)
        .context("failed to read model output from stdin")?;

    let report = parse_report(&raw);
    let rendered = serde_json::to_string_pretty(&report).context("failed to serialize action")?;
    println!("{rendered}");
    Ok(())
}
