//! Wiring shared by `serve`, `run` and `chat`: validate the config, then
//! build the memory, model runner, voice and dispatch collaborators and hand
//! them to the [`Brain`].

use std::sync::Arc;

use anyhow::Context;
use sha2::{Digest, Sha256};

use rk_dispatch::{CommandVoice, DispatcherSet};
use rk_domain::config::{Config, ConfigSeverity};
use rk_memory::{Memory, PromptTemplate};
use rk_runner::{GenerationParams, LlamaRunner};

use crate::brain::Brain;
use crate::state::AppState;

/// Log every validation issue and fail when any of them is an error.
pub fn check_config(config: &Config) -> anyhow::Result<()> {
    let issues = config.validate();
    for issue in &issues {
        match issue.severity {
            ConfigSeverity::Warning => tracing::warn!("config: {issue}"),
            ConfigSeverity::Error => tracing::error!("config: {issue}"),
        }
    }
    let errors = issues
        .iter()
        .filter(|i| i.severity == ConfigSeverity::Error)
        .count();
    if errors > 0 {
        anyhow::bail!("config validation failed with {errors} error(s)");
    }
    Ok(())
}

pub fn build_brain(config: &Config) -> anyhow::Result<Brain> {
    // ── Memory ───────────────────────────────────────────────────────
    let memory = Memory::from_config(&config.memory);
    tracing::info!(
        capacity = config.memory.capacity,
        long_term = %config.memory.long_term_path.display(),
        "memory ready"
    );

    // ── Model runner ─────────────────────────────────────────────────
    let runner = LlamaRunner::new(config.model.clone(), config.memory.persona.clone())
        .context("initializing model runner")?;
    tracing::info!(
        command = %config.model.resolved_command(),
        model = %config.model.model_path.display(),
        "model runner ready (process starts on first use)"
    );

    // ── Dispatch targets ─────────────────────────────────────────────
    let dispatchers =
        DispatcherSet::from_config(&config.dispatch).context("building dispatch targets")?;
    tracing::info!(targets = dispatchers.len(), "dispatch targets registered");

    let mut brain = Brain::new(
        memory,
        PromptTemplate::new(config.memory.persona.clone()),
        Arc::new(runner),
    )
    .with_params(GenerationParams::from_config(&config.model))
    .with_dispatchers(dispatchers);

    // ── Voice ────────────────────────────────────────────────────────
    match CommandVoice::from_config(&config.voice) {
        Some(voice) => {
            tracing::info!(engine = ?config.voice.engine, "voice synthesis enabled");
            brain = brain.with_voice(Arc::new(voice));
        }
        None => tracing::debug!("voice synthesis disabled"),
    }

    Ok(brain)
}

/// Read the API token once and keep only its digest.
fn api_token_hash(config: &Config) -> Option<Vec<u8>> {
    let env_var = &config.server.api_token_env;
    match std::env::var(env_var).ok().filter(|t| !t.is_empty()) {
        Some(token) => {
            tracing::info!(source = %format!("env:{env_var}"), "API bearer-token auth enabled");
            Some(Sha256::digest(token.as_bytes()).to_vec())
        }
        None => {
            tracing::warn!("API bearer-token auth DISABLED, set the {env_var} env var to enable it");
            None
        }
    }
}

/// Validate config and return a fully wired [`AppState`].
pub fn build_app_state(config: Arc<Config>) -> anyhow::Result<AppState> {
    check_config(&config)?;
    let brain = Arc::new(build_brain(&config)?);
    let api_token_hash = api_token_hash(&config);
    Ok(AppState {
        config,
        brain,
        api_token_hash,
    })
}

/// Load the model in the background so the first request does not pay for
/// it. A failure here is not fatal: the next turn retries.
pub fn spawn_background_tasks(state: &AppState) {
    let brain = state.brain.clone();
    tokio::spawn(async move {
        match brain.warm_up().await {
            Ok(()) => tracing::info!("model warmed up"),
            Err(e) => tracing::warn!(error = %e, "model warm-up failed, will retry on first turn"),
        }
    });
}
