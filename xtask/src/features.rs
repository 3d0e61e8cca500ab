use std::process::Command;

use anyhow::{Context, Result};

/// Tiers of `calsync-common`; each one must build on its own
const FEATURE_COMBINATIONS: &[&[&str]] =
    &[&[], &["foundation"], &["runtime"], &["platform"], &["foundation", "platform"]];

/// Check that every `calsync-common` feature tier compiles.
pub fn test_feature_matrix() -> Result<()> {
    println!("Testing {} calsync-common feature combinations...", FEATURE_COMBINATIONS.len());

    for (index, features) in FEATURE_COMBINATIONS.iter().enumerate() {
        let joined = features.join(",");
        let label = if features.is_empty() { "default".to_string() } else { joined.clone() };

        println!("\n[{}/{}] cargo check -p calsync-common ({label})", index + 1, FEATURE_COMBINATIONS.len());

        let mut command = Command::new("cargo");
        command.args(["check", "-p", "calsync-common", "--no-default-features"]);
        if !features.is_empty() {
            command.arg("--features").arg(&joined);
        }

        let status =
            command.status().with_context(|| format!("Failed to run cargo check for '{label}'"))?;
        if !status.success() {
            anyhow::bail!("Feature combination '{label}' failed to compile");
        }

        println!("✅ Features '{label}' compiled successfully");
    }

    println!("\n✅ All {} feature combinations compile successfully!", FEATURE_COMBINATIONS.len());
    Ok(())
}
