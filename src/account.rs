use crate::models::Credentials;
use anyhow::{bail, Context, Result};
use once_cell::sync::Lazy;
use regex::Regex;
use tokio::process::Command;
use tracing::info;

static ACCOUNT_ID_MATCHER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"Account ID: (.+)").unwrap());

static ACCOUNT_SECRET_MATCHER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"Account secret: (.+)").unwrap());

/// Reads the `Account ID:` and `Account secret:` lines an account tool prints.
pub fn parse_account_output(output: &str) -> Result<Credentials> {
    let id = ACCOUNT_ID_MATCHER
        .captures(output)
        .map(|c| c[1].trim().to_string())
        .context("Account tool output has no 'Account ID:' line")?;
    let secret = ACCOUNT_SECRET_MATCHER
        .captures(output)
        .map(|c| c[1].trim().to_string())
        .context("Account tool output has no 'Account secret:' line")?;
    Ok(Credentials { id, secret })
}

/// Runs an external account tool and parses the credentials it prints.
pub async fn create_account(command: &[String]) -> Result<Credentials> {
    let Some((program, args)) = command.split_first() else {
        bail!("Account command is empty");
    };

    info!(program = %program, "Creating graph store account");
    let output = Command::new(program)
        .args(args)
        .output()
        .await
        .with_context(|| format!("Failed to run account command: {program}"))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        bail!("Account command {program} failed:\n{stderr}");
    }

    parse_account_output(&String::from_utf8_lossy(&output.stdout))
}
