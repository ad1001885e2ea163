use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use paylane_core::{Amount, ChannelId};

use crate::error::ChannelError;
use crate::traits::{ISettlement, SettlementReceipt};

/// In-memory settlement adapter.
///
/// Records each channel's terminal balance pair in a local ledger.
/// Idempotent: settling the same channel twice returns the original
/// receipt instead of double-writing.  Useful for testing and for
/// deployments where settlement is an internal bookkeeping step.
pub struct InternalLedgerAdapter {
    receipts: DashMap<ChannelId, SettlementReceipt>,
}

impl InternalLedgerAdapter {
    /// Create a new adapter with an empty ledger.
    pub fn new() -> Self {
        Self {
            receipts: DashMap::new(),
        }
    }

    /// The receipt previously written for a channel, if any.
    pub fn receipt(&self, channel_id: ChannelId) -> Option<SettlementReceipt> {
        self.receipts.get(&channel_id).map(|r| r.clone())
    }

    /// Number of channels settled through this adapter.
    pub fn settled_count(&self) -> usize {
        self.receipts.len()
    }

    /// Total value written to the ledger across all settlements.
    pub fn total_settled(&self) -> Amount {
        let mut total = Amount::ZERO;
        for entry in self.receipts.iter() {
            let pair = entry
                .local_balance
                .checked_add(entry.remote_balance)
                .unwrap_or(Amount::ZERO);
            total = total.checked_add(pair).unwrap_or(total);
        }
        total
    }
}

impl Default for InternalLedgerAdapter {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ISettlement for InternalLedgerAdapter {
    async fn settle_channel(
        &self,
        channel_id: ChannelId,
        local_balance: Amount,
        remote_balance: Amount,
        _challenge_period_hours: u32,
    ) -> Result<SettlementReceipt, ChannelError> {
        if let Some(existing) = self.receipts.get(&channel_id) {
            tracing::debug!(channel_id = %channel_id, "settlement replayed, returning prior receipt");
            return Ok(existing.clone());
        }

        let receipt = SettlementReceipt {
            channel_id,
            local_balance,
            remote_balance,
            adapter_id: self.adapter_id().to_string(),
            settled_at: Utc::now(),
            tx_ref: Some(format!("internal-{}", channel_id)),
        };
        self.receipts.insert(channel_id, receipt.clone());

        tracing::info!(
            channel_id = %channel_id,
            local = %local_balance,
            remote = %remote_balance,
            "internal settlement written"
        );
        Ok(receipt)
    }

    fn adapter_id(&self) -> &str {
        "sa-internal"
    }
}
