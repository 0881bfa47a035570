//! Blossom-Cashu Server
//!
//! Boots from environment variables (see `config.rs`), starts the HTTP
//! request pipeline, and runs the rotation/swap scheduler alongside it.

use std::sync::Arc;

use blossom_cashu::api;
use blossom_cashu::config::BlossomConfig;
use blossom_cashu::logging;
use blossom_cashu::nostr_dm::NostrNotifier;
use blossom_cashu::scheduler::{OwnerNotifier, RotationScheduler};

#[tokio::main]
async fn main() {
    let config = match BlossomConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("configuration error: {e}");
            std::process::exit(1);
        }
    };

    if let Err(e) = logging::init_from_config(&config) {
        eprintln!("failed to initialize logging: {e}");
        std::process::exit(1);
    }

    config.print_summary();

    let state = match api::build_state(config.clone()).await {
        Ok(state) => state,
        Err(e) => {
            tracing::error!(target: "blossom::startup", error = %e, "failed to build application state");
            std::process::exit(1);
        }
    };

    let notifier: Option<Arc<dyn OwnerNotifier>> = if config.enable_nostr_dm() {
        let npub = config.owner_npub.clone().expect("enable_nostr_dm implies owner_npub is set");
        match NostrNotifier::new(&npub).await {
            Ok(notifier) => Some(Arc::new(notifier) as Arc<dyn OwnerNotifier>),
            Err(e) => {
                tracing::error!(target: "blossom::startup", error = %e, "failed to initialize Nostr notifier, continuing without owner DMs");
                None
            }
        }
    } else {
        None
    };

    let scheduler = RotationScheduler::new(
        state.wallet.clone(),
        state.store.clone(),
        state.mint_client.clone(),
        config.rotation_period_secs(),
        config.token_log_path(),
        notifier,
    );

    let scheduler_handle = tokio::spawn(async move {
        scheduler.run(|| chrono::Utc::now().timestamp()).await;
    });

    if let Err(e) = api::start_server(state).await {
        tracing::error!(target: "blossom::startup", error = %e, "server exited with an error");
    }

    scheduler_handle.abort();
}
