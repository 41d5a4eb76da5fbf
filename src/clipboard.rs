use log::debug;
use std::io::Write;
use std::process::{Command, Stdio};

use crate::error::InboxError;

/// Clipboard helpers tried in order. Override with TEMPINBOX_CLIPBOARD, e.g.
///   TEMPINBOX_CLIPBOARD="xsel --clipboard --input"
const CANDIDATES: &[&[&str]] = &[
    &["wl-copy"],
    &["xclip", "-selection", "clipboard"],
    &["xsel", "--clipboard", "--input"],
    &["pbcopy"],
    &["clip.exe"],
];

/// Copy `text` by piping it into the first clipboard helper that runs.
pub fn copy(text: &str) -> Result<(), InboxError> {
    let custom = std::env::var("TEMPINBOX_CLIPBOARD").ok();
    let custom_args: Option<Vec<&str>> = custom
        .as_deref()
        .map(|c| c.split_whitespace().collect())
        .filter(|v: &Vec<&str>| !v.is_empty());

    let candidates: Vec<&[&str]> = match &custom_args {
        Some(args) => vec![args.as_slice()],
        None => CANDIDATES.to_vec(),
    };

    for argv in candidates {
        match pipe_into(argv, text) {
            Ok(()) => {
                debug!("copied {} bytes with {}", text.len(), argv[0]);
                return Ok(());
            }
            Err(e) => debug!("clipboard helper {} failed: {e}", argv[0]),
        }
    }

    Err(InboxError::Clipboard(
        "no clipboard helper found (install wl-copy or xclip, or set TEMPINBOX_CLIPBOARD)"
            .to_string(),
    ))
}

fn pipe_into(argv: &[&str], text: &str) -> std::io::Result<()> {
    let mut child = Command::new(argv[0])
        .args(&argv[1..])
        .stdin(Stdio::piped())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()?;

    if let Some(mut stdin) = child.stdin.take() {
        stdin.write_all(text.as_bytes())?;
    }

    let status = child.wait()?;
    if status.success() {
        Ok(())
    } else {
        Err(std::io::Error::other(format!("exited with {status}")))
    }
}
