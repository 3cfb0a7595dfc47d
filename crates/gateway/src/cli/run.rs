//! `reka run`: one turn from the command line, reply on stdout.

use std::sync::Arc;

use rk_domain::config::Config;
use rk_domain::InboundMeta;

use crate::bootstrap;

pub async fn run(
    config: Arc<Config>,
    message: String,
    platform: String,
    user: Option<String>,
) -> anyhow::Result<()> {
    let state = bootstrap::build_app_state(config)?;

    let mut meta = InboundMeta::for_platform(platform);
    meta.user = user;

    let reply = state.brain.handle_input(&message, &meta).await;
    println!("{reply}");

    state.brain.shutdown().await;
    Ok(())
}
