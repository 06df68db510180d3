use anyhow::{Context, Result};
use chrono::Local;
use std::io::Read;
use std::path::{Path, PathBuf};

use parent_gate::session::{ConversationTurn, IntentClassifier, RedirectionCoordinator};

use super::utils::load_config;

/// Classify a transcript turn by turn and print any suggestions
pub fn classify(config_path: &Path, file: Option<PathBuf>) -> Result<()> {
    let config = load_config(config_path)?;

    let transcript = match &file {
        Some(path) => std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read transcript: {}", path.display()))?,
        None => {
            let mut buffer = String::new();
            std::io::stdin()
                .read_to_string(&mut buffer)
                .context("Failed to read transcript from stdin")?;
            buffer
        }
    };

    let turns = parse_transcript(&transcript);
    if turns.is_empty() {
        anyhow::bail!("Transcript contains no turns");
    }

    let mut classifier = IntentClassifier::new(config.classifier_settings());
    let coordinator = RedirectionCoordinator::new(config.redirection.confidence_threshold);

    let runtime = tokio::runtime::Runtime::new()?;
    runtime.block_on(async {
        for turn in turns {
            let text = turn.text.clone();
            let is_user = turn.is_user();
            let state = classifier.observe(turn);

            let speaker = if is_user { "user" } else { "system" };
            println!(
                "{:<6} {:<13} {:.2}  {}",
                speaker,
                state.current_intent.to_string(),
                state.confidence,
                text
            );

            if let Some(suggestion) = coordinator.on_session_state(&state).await {
                println!("       → Suggest: {}", suggestion.message);
            }
        }
    });

    Ok(())
}

/// One turn per non-empty line; a "system:" prefix marks robot turns
fn parse_transcript(transcript: &str) -> Vec<ConversationTurn> {
    let now = Local::now();

    transcript
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(|line| {
            if let Some(text) = strip_prefix_ignore_case(line, "system:") {
                ConversationTurn::system(text.trim(), now)
            } else if let Some(text) = strip_prefix_ignore_case(line, "user:") {
                ConversationTurn::user(text.trim(), now)
            } else {
                ConversationTurn::user(line, now)
            }
        })
        .collect()
}

fn strip_prefix_ignore_case<'a>(line: &'a str, prefix: &str) -> Option<&'a str> {
    let head = line.get(..prefix.len())?;
    if head.eq_ignore_ascii_case(prefix) {
        line.get(prefix.len()..)
    } else {
        None
    }
}
