use async_trait::async_trait;
use paylane_core::{Amount, PeerAddr};
use std::sync::atomic::{AtomicU64, Ordering};

use crate::error::ChannelError;
use crate::traits::{FeeQuote, IFeeEstimator};

/// Flat-rate fee estimator.
///
/// Returns a fixed fee and ETA with a monotonic nonce. Stands in for a
/// network-aware estimator when none is wired up.
pub struct FlatFeeEstimator {
    flat_fee: Amount,
    eta_secs: u64,
    nonce: AtomicU64,
}

impl FlatFeeEstimator {
    /// Create an estimator quoting `flat_fee` with the given ETA.
    pub fn new(flat_fee: Amount, eta_secs: u64) -> Self {
        Self {
            flat_fee,
            eta_secs,
            nonce: AtomicU64::new(0),
        }
    }
}

#[async_trait]
impl IFeeEstimator for FlatFeeEstimator {
    async fn estimate(
        &self,
        _from: &PeerAddr,
        _to: &PeerAddr,
        _amount: Amount,
    ) -> Result<FeeQuote, ChannelError> {
        Ok(FeeQuote {
            fee: self.flat_fee,
            nonce: self.nonce.fetch_add(1, Ordering::Relaxed),
            eta_secs: self.eta_secs,
        })
    }
}
