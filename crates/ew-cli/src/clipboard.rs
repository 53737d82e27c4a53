//! Best-effort clipboard copy via the platform's native tool.

use std::io::Write;
use std::process::{Command, Stdio};

use anyhow::{anyhow, bail, Result};

pub fn copy_to_clipboard(text: &str) -> Result<()> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        bail!("empty command");
    }

    let attempts: &[(&str, &[&str])] = if cfg!(target_os = "macos") {
        &[("pbcopy", &[])]
    } else if cfg!(windows) {
        &[("clip", &[])]
    } else {
        &[
            ("wl-copy", &[]),
            ("xclip", &["-selection", "clipboard"]),
            ("xsel", &["--clipboard", "--input"]),
        ]
    };

    for (binary, args) in attempts {
        if pipe_into(binary, args, trimmed).is_ok() {
            return Ok(());
        }
    }
    Err(anyhow!("no supported clipboard tool found"))
}

fn pipe_into(binary: &str, args: &[&str], text: &str) -> Result<()> {
    let mut child = Command::new(binary)
        .args(args)
        .stdin(Stdio::piped())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()?;
    if let Some(stdin) = child.stdin.as_mut() {
        stdin.write_all(text.as_bytes())?;
    }
    let status = child.wait()?;
    if !status.success() {
        bail!("{binary} exited with {status}");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unit_empty_text_is_rejected() {
        assert!(copy_to_clipboard("   ").is_err());
    }
}
