//! CLI `parse` and `format` commands.

use anyhow::{Context, Result};

use crate::meds::shorthand;
use crate::meds::types::{Direction, DIRECTION_DISCLAIMER};

/// Parse shorthand and print the direction as JSON.
pub fn parse(text: &str) -> Result<()> {
    let direction = shorthand::parse(text.trim())?;
    println!("{}", serde_json::to_string_pretty(&direction)?);
    println!();
    println!("Key name:   {}", direction.key_name());
    println!("Canonical:  {}", direction.direction_shorthand);
    println!("{DIRECTION_DISCLAIMER}");
    Ok(())
}

/// Format a direction given as JSON back into shorthand.
pub fn format(json: &str) -> Result<()> {
    let direction: Direction =
        serde_json::from_str(json).context("expected a direction as JSON")?;
    direction.validate()?;
    let (name, body) = shorthand::format(&direction);
    println!("{name} {body}");
    println!("{DIRECTION_DISCLAIMER}");
    Ok(())
}
