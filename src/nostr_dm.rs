//! Owner Notification over Nostr
//!
//! Optional: when an owner npub is configured, the scheduler DMs the owner
//! a NIP-17 gift-wrapped copy of every swapped-token log line, routed to
//! whatever relays the owner's kind 10002 (NIP-65) relay list advertises.
//! If no relay list is found, falls back to a small default set.

use std::time::Duration;

use nostr_sdk::{Client, EventBuilder, Filter, Keys, Kind, PublicKey};

use crate::scheduler::OwnerNotifier;

const DEFAULT_RELAYS: &[&str] = &[
    "wss://relay.damus.io",
    "wss://relay.nostr.band",
    "wss://nos.lol",
];

const RELAY_LIST_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, thiserror::Error)]
pub enum NostrDmError {
    #[error("invalid owner npub: {0}")]
    InvalidPubkey(String),
    #[error("relay client error: {0}")]
    Client(String),
}

pub struct NostrNotifier {
    signer: Keys,
    recipient: PublicKey,
    client: Client,
}

impl NostrNotifier {
    /// Builds a fresh signing keypair for the gift-wrap sender identity —
    /// the owner only ever sees the unwrapped rumor, not this pubkey.
    pub async fn new(owner_npub: &str) -> Result<Self, NostrDmError> {
        let recipient = PublicKey::parse(owner_npub)
            .map_err(|e| NostrDmError::InvalidPubkey(e.to_string()))?;
        let signer = Keys::generate();
        let client = Client::builder().signer(signer.clone()).build();

        for relay in DEFAULT_RELAYS {
            client
                .add_relay(*relay)
                .await
                .map_err(|e| NostrDmError::Client(e.to_string()))?;
        }
        client.connect().await;

        if let Some(relays) = discover_relays(&client, recipient).await {
            for relay in relays {
                let _ = client.add_relay(relay).await;
            }
            client.connect().await;
        }

        Ok(Self {
            signer,
            recipient,
            client,
        })
    }
}

async fn discover_relays(client: &Client, recipient: PublicKey) -> Option<Vec<String>> {
    let filter = Filter::new()
        .author(recipient)
        .kind(Kind::RelayList)
        .limit(1);

    let events = client.fetch_events(filter, RELAY_LIST_TIMEOUT).await.ok()?;
    let event = events.into_iter().next()?;

    let relays: Vec<String> = event
        .tags
        .iter()
        .filter(|tag| tag.kind() == nostr_sdk::TagKind::r())
        .filter_map(|tag| tag.content().map(|s| s.to_string()))
        .collect();

    if relays.is_empty() {
        None
    } else {
        Some(relays)
    }
}

#[async_trait::async_trait]
impl OwnerNotifier for NostrNotifier {
    async fn notify_token(&self, token: &str, amount: u64, mint: &str) {
        let content = format!("New swapped Cashu token ({amount} sat from {mint}):\n\n{token}");

        let rumor = EventBuilder::private_msg_rumor(self.recipient, content).build(self.signer.public_key());

        let gift_wrap = match EventBuilder::gift_wrap(&self.signer, &self.recipient, rumor, []).await {
            Ok(event) => event,
            Err(e) => {
                tracing::error!(target: "blossom::nostr_dm", error = %e, "failed to build gift wrap");
                return;
            }
        };

        if let Err(e) = self.client.send_event(&gift_wrap).await {
            tracing::warn!(target: "blossom::nostr_dm", error = %e, "failed to send owner DM");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_npub_is_rejected() {
        let result = PublicKey::parse("not-a-valid-npub");
        assert!(result.is_err());
    }
}
