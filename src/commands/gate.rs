use anyhow::{Context, Result};
use chrono::Local;
use std::path::Path;
use std::time::Duration;

use parent_gate::config::EXAMPLE_CONFIG;
use parent_gate::gate::{Mode, PinStrength, pin_strength};
use parent_gate::{EnrollError, GateError};

use super::utils::{credential_manager, format_duration, load_config, open_gate, prompt_secret};

/// Write the example configuration file
pub fn init(output: &Path, force: bool) -> Result<()> {
    if output.exists() && !force {
        anyhow::bail!(
            "Configuration file already exists: {}\nUse --force to overwrite",
            output.display()
        );
    }

    if let Some(parent) = output.parent() {
        parent_gate::platform::ensure_directory_exists(parent)?;
    }

    parent_gate::platform::atomic_write(output, EXAMPLE_CONFIG.as_bytes())
        .with_context(|| format!("Failed to write config file: {}", output.display()))?;

    println!("✓ Created configuration file: {}", output.display());
    println!("\nEdit the time_locks section to match your family's schedule.");
    println!("Then enroll the parent PIN:");
    println!("  parent-gate set-pin --question \"...\" --answer \"...\"");

    Ok(())
}

/// Enroll the parent PIN
pub fn set_pin(config_path: &Path, question: &str, answer: &str, force: bool) -> Result<()> {
    let config = load_config(config_path)?;
    let manager = credential_manager(&config)?;

    if manager.has_pin() && !force {
        anyhow::bail!("A PIN is already enrolled. Use reset-pin, or --force to replace it");
    }

    let pin = prompt_secret(&format!("New {}-digit PIN: ", config.pin.length))?;
    let confirm = prompt_secret("Confirm PIN: ")?;
    if pin.trim() != confirm.trim() {
        anyhow::bail!("PINs do not match");
    }

    let strength = pin_strength(&pin, config.pin.length);
    manager
        .set_pin(&pin, question, answer)
        .context("Failed to enroll PIN")?;

    println!("✓ PIN enrolled (strength: {})", strength.display_name());
    if strength == PinStrength::Weak {
        println!("  This is a commonly used PIN; consider choosing a less obvious one.");
    }

    Ok(())
}

/// Replace a forgotten PIN using the recovery answer
pub fn reset_pin(config_path: &Path, answer: Option<String>) -> Result<()> {
    let config = load_config(config_path)?;
    let manager = credential_manager(&config)?;

    let question = manager
        .recovery_question()
        .context("No PIN enrolled. Run 'parent-gate set-pin' first.")?;

    let answer = match answer {
        Some(answer) => answer,
        None => prompt_secret(&format!("{} ", question))?,
    };
    let pin = prompt_secret(&format!("New {}-digit PIN: ", config.pin.length))?;

    match manager.reset_pin_with_answer(&answer, &pin) {
        Ok(()) => {
            println!("✓ PIN reset");
            Ok(())
        }
        Err(EnrollError::RecoveryMismatch) => anyhow::bail!("Recovery answer is incorrect"),
        Err(e) => Err(e).context("Failed to reset PIN"),
    }
}

/// Show gate status
pub fn status(config_path: &Path) -> Result<()> {
    let config = load_config(config_path)?;
    let gate = open_gate(&config)?;
    let now = Local::now();

    let runtime = tokio::runtime::Runtime::new()?;
    let status = runtime.block_on(gate.status(now));

    println!("Parent Gate Status");
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    println!("Mode:          {}", status.mode);

    if status.time_locked {
        println!("Time lock:     ACTIVE");
    } else if config.time_locks.is_empty() {
        println!("Time lock:     none configured");
    } else {
        println!("Time lock:     inactive");
    }

    if status.lockout.locked {
        println!(
            "PIN entry:     LOCKED ({} remaining)",
            format_duration(status.lockout.remaining)
        );
    } else {
        println!(
            "PIN entry:     available ({} attempts remaining)",
            status.attempts_remaining
        );
    }

    if let Some(next) = status.next_unlock {
        println!("Next unlock:   in {}", format_duration(next));
    }

    if !credential_manager(&config)?.has_pin() {
        println!();
        println!("No PIN enrolled. Run 'parent-gate set-pin' to set one.");
    }

    Ok(())
}

/// Switch to the parent console
pub fn unlock(config_path: &Path) -> Result<()> {
    let config = load_config(config_path)?;
    let gate = open_gate(&config)?;

    let runtime = tokio::runtime::Runtime::new()?;
    runtime.block_on(async { enter_pin_and_unlock(&gate).await })
}

/// Switch back to child mode
pub fn lock(config_path: &Path) -> Result<()> {
    let config = load_config(config_path)?;
    let gate = open_gate(&config)?;

    let runtime = tokio::runtime::Runtime::new()?;
    let mode = runtime.block_on(gate.request_switch(Mode::Restricted, None))?;

    println!("✓ {} active", mode);
    Ok(())
}

/// Suspend time locks, then unlock with the PIN
pub fn emergency(config_path: &Path, minutes: Option<u64>) -> Result<()> {
    let config = load_config(config_path)?;
    let gate = open_gate(&config)?;
    let duration = minutes.map(|m| Duration::from_secs(m.saturating_mul(60)));

    let runtime = tokio::runtime::Runtime::new()?;
    runtime.block_on(async {
        let until = gate.activate_emergency_override(duration).await;
        println!("Emergency override active until {}", until.format("%H:%M"));

        let result = enter_pin_and_unlock(&gate).await;
        if result.is_err() {
            gate.deactivate_emergency_override().await;
        }
        result
    })
}

async fn enter_pin_and_unlock(gate: &parent_gate::ModeGate) -> Result<()> {
    if gate.current_mode() == Mode::Unrestricted {
        println!("✓ {} already active", Mode::Unrestricted);
        return Ok(());
    }

    // Refuse before prompting when no PIN could be accepted anyway
    match gate.request_switch(Mode::Unrestricted, None).await {
        Err(GateError::MissingCredential) => {}
        Err(e) => return Err(e.into()),
        Ok(mode) => {
            println!("✓ {} active", mode);
            return Ok(());
        }
    }

    let pin = prompt_secret("PIN: ")?;
    let mode = gate.request_switch(Mode::Unrestricted, Some(&pin)).await?;

    println!("✓ {} active", mode);
    Ok(())
}
