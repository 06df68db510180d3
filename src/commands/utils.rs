use anyhow::{Context, Result};
use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use crossterm::terminal::{disable_raw_mode, enable_raw_mode};
use std::io::{BufRead, IsTerminal, Write};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use parent_gate::config::{self, GateConfig};
use parent_gate::gate::{
    CredentialManager, FileCredentialStore, FileGateStateStore, GateDeps, ModeGate, SystemClock,
};

/// Initialize logging
pub fn init_logging(verbose: bool) {
    use tracing_subscriber::{EnvFilter, fmt, prelude::*};

    let level = if verbose { "debug" } else { "info" };

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level)))
        .init();
}

/// Explicit `--config` path, or the platform default
pub fn resolve_config_path(explicit: Option<PathBuf>) -> Result<PathBuf> {
    match explicit {
        Some(path) => Ok(path),
        None => parent_gate::platform::get_config_path(),
    }
}

/// Load the configuration, falling back to defaults when none exists
pub fn load_config(path: &std::path::Path) -> Result<GateConfig> {
    config::load_config_or_default(path).context("Failed to load configuration")
}

/// Credential manager over the configured credential file
pub fn credential_manager(config: &GateConfig) -> Result<CredentialManager> {
    let path = config.storage.credential_path()?;
    if let Some(parent) = path.parent() {
        parent_gate::platform::ensure_directory_exists(parent)?;
    }
    Ok(CredentialManager::new(
        Arc::new(FileCredentialStore::new(path)),
        config.pin.length,
    ))
}

/// Gate over the configured state and credential files
pub fn open_gate(config: &GateConfig) -> Result<ModeGate> {
    let state_path = config.storage.state_path()?;
    let credential_path = config.storage.credential_path()?;

    if let Some(parent) = state_path.parent() {
        parent_gate::platform::ensure_directory_exists(parent)?;
    }

    Ok(ModeGate::new(
        config.gate_settings(),
        GateDeps {
            credentials: Arc::new(FileCredentialStore::new(credential_path)),
            state: Arc::new(FileGateStateStore::new(state_path)),
            clock: Arc::new(SystemClock),
        },
    ))
}

/// Ask for a line on stderr and read it from stdin
pub fn prompt(message: &str) -> Result<String> {
    eprint!("{}", message);
    std::io::stderr().flush()?;

    let mut line = String::new();
    std::io::stdin()
        .lock()
        .read_line(&mut line)
        .context("Failed to read from stdin")?;

    Ok(line.trim_end_matches(['\r', '\n']).to_string())
}

/// Ask for a PIN or answer without echoing it
///
/// Reads a plain line when stdin is not a terminal.
pub fn prompt_secret(message: &str) -> Result<String> {
    if !std::io::stdin().is_terminal() {
        return prompt(message);
    }

    eprint!("{}", message);
    std::io::stderr().flush()?;

    enable_raw_mode().context("Failed to switch terminal to raw mode")?;
    let secret = read_secret_keys();
    disable_raw_mode().context("Failed to restore terminal mode")?;
    eprintln!();

    secret
}

fn read_secret_keys() -> Result<String> {
    let mut secret = String::new();

    loop {
        if let Event::Key(key) = event::read().context("Failed to read from terminal")? {
            if apply_secret_key(&mut secret, key)? {
                return Ok(secret);
            }
        }
    }
}

/// Apply one key to a secret being typed; true once Enter completes it
fn apply_secret_key(secret: &mut String, key: KeyEvent) -> Result<bool> {
    if key.kind != KeyEventKind::Press {
        return Ok(false);
    }

    match key.code {
        KeyCode::Enter => return Ok(true),
        KeyCode::Backspace => {
            secret.pop();
        }
        KeyCode::Esc => anyhow::bail!("Cancelled"),
        KeyCode::Char('c') if key.modifiers.contains(KeyModifiers::CONTROL) => {
            anyhow::bail!("Cancelled")
        }
        KeyCode::Char(c) => secret.push(c),
        _ => {}
    }

    Ok(false)
}

/// Format duration for display
pub fn format_duration(duration: Duration) -> String {
    let secs = duration.as_secs();
    if secs < 60 {
        format!("{}s", secs)
    } else if secs < 3600 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else if secs < 86400 {
        format!("{}h {}m", secs / 3600, (secs % 3600) / 60)
    } else {
        format!("{}d {}h", secs / 86400, (secs % 86400) / 3600)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(Duration::from_secs(42)), "42s");
        assert_eq!(format_duration(Duration::from_secs(280)), "4m 40s");
        assert_eq!(format_duration(Duration::from_secs(6 * 3600 + 15 * 60)), "6h 15m");
        assert_eq!(format_duration(Duration::from_secs(2 * 86400 + 3600)), "2d 1h");
    }

    #[test]
    fn test_secret_keys_build_pin() {
        let mut secret = String::new();
        for code in [
            KeyCode::Char('4'),
            KeyCode::Char('8'),
            KeyCode::Char('9'),
            KeyCode::Backspace,
            KeyCode::Char('2'),
        ] {
            assert!(!apply_secret_key(&mut secret, KeyEvent::new(code, KeyModifiers::NONE)).unwrap());
        }

        assert!(apply_secret_key(&mut secret, KeyEvent::new(KeyCode::Enter, KeyModifiers::NONE)).unwrap());
        assert_eq!(secret, "482");
    }

    #[test]
    fn test_secret_entry_can_be_cancelled() {
        let mut secret = String::from("48");
        let ctrl_c = KeyEvent::new(KeyCode::Char('c'), KeyModifiers::CONTROL);
        assert!(apply_secret_key(&mut secret, ctrl_c).is_err());
        assert!(apply_secret_key(&mut secret, KeyEvent::new(KeyCode::Esc, KeyModifiers::NONE)).is_err());
    }

    #[test]
    fn test_resolve_explicit_config_path() {
        let path = PathBuf::from("/tmp/gate.yaml");
        assert_eq!(resolve_config_path(Some(path.clone())).unwrap(), path);
    }
}
