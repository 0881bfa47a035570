//! Shared Application State
//!
//! Everything a request handler needs: the wallet (for the active locking
//! pubkey and duplicate detection), the store (blobs, locked proofs,
//! trusted mints), the blob filesystem, and the mint HTTP client.

use std::sync::Arc;

use crate::blobstore::BlobStore;
use crate::common::BlossomError;
use crate::config::BlossomConfig;
use crate::hashkit::encode_quote;
use crate::mint_client::MintClient;
use crate::pricing;
use crate::storage::sqlite::SqliteStore;
use crate::types::{PaymentQuote, Unit};
use crate::verifier::ProofVerifier;
use crate::wallet::Wallet;

pub struct AppState {
    pub wallet: Arc<Wallet>,
    pub store: Arc<SqliteStore>,
    pub blobstore: Arc<BlobStore>,
    pub mint_client: Arc<MintClient>,
    pub config: Arc<BlossomConfig>,
}

pub type SharedAppState = Arc<AppState>;

impl AppState {
    pub fn verifier(&self) -> ProofVerifier<'_> {
        ProofVerifier::new(
            &self.wallet,
            &self.mint_client,
            &self.store,
            self.config.enable_locktime_check,
            self.config.enable_dleq_check,
            self.config.rotation_period_secs(),
        )
    }

    pub async fn trusted_mints(&self) -> Result<Vec<String>, BlossomError> {
        Ok(self.store.list_trusted_mints().await?)
    }

    /// Builds the `x-cashu` payment quote for `amount` sats, advertising
    /// every trusted mint and the wallet's current active pubkey.
    pub async fn build_quote(&self, amount: u64) -> Result<PaymentQuote, BlossomError> {
        let mints = self.trusted_mints().await?;
        let pubkey = self.wallet.active_pubkey().await;
        Ok(PaymentQuote {
            amount,
            unit: Unit::Sat,
            mints,
            pubkey,
        })
    }

    pub async fn encode_quote_header(&self, amount: u64) -> Result<String, BlossomError> {
        let quote = self.build_quote(amount).await?;
        encode_quote(&quote).map_err(|e| BlossomError::internal(e.to_string()))
    }

    pub fn upload_price(&self, bytes: u64) -> u64 {
        pricing::amount(bytes, self.config.upload_cost_2mb)
    }

    pub fn download_price(&self, bytes: u64) -> u64 {
        pricing::amount(bytes, self.config.download_cost_2mb)
    }
}
