//! Treasury workflows: shift lifecycle, fund transfers, invoice and debt recording, and
//! order conversion. Every mutation checks the actor's capabilities, commits one atomic
//! change set and then publishes a cache invalidation notice.

mod debts;
mod funds;
mod invoices;
mod orders;
mod shifts;
mod transfers;


use std::sync::Arc;

use chrono::Utc;
use tracing::error;
use treasury_core::{
    ChangeNotifier, ChangeSet, Debt, EventEnvelope, Fund, Invoice, Invalidation, Order, Resource,
    Shift, Transfer, TreasuryError, TreasuryResult, TreasuryStore,
};
use uuid::Uuid;

pub use funds::FundLedger;
pub use orders::OrderConversion;
pub use treasury_finance::{InvoiceFilter, LedgerTotals, Page, ShiftSummary};
pub use treasury_orders::ConversionQuote;

#[derive(Clone)]
pub struct TreasuryService {
    store: Arc<dyn TreasuryStore>,
    notifier: Arc<dyn ChangeNotifier>,
}

impl TreasuryService {
    pub fn new(store: Arc<dyn TreasuryStore>, notifier: Arc<dyn ChangeNotifier>) -> Self {
        Self { store, notifier }
    }

    pub fn store(&self) -> &Arc<dyn TreasuryStore> {
        &self.store
    }

    async fn commit(&self, changes: ChangeSet, resources: &[Resource]) -> TreasuryResult<()> {
        self.store.commit(changes).await?;

        let invalidation = Invalidation::new(resources, Utc::now());
        if let Err(err) = self.notifier.notify(&invalidation).await {
            error!("failed to publish invalidation: {err:#}");
        }
        Ok(())
    }

    async fn require_shift(&self, id: Uuid) -> TreasuryResult<Shift> {
        self.store
            .shift(id)
            .await?
            .ok_or_else(|| TreasuryError::not_found("shift", id))
    }

    async fn require_fund(&self, id: Uuid) -> TreasuryResult<Fund> {
        self.store
            .fund(id)
            .await?
            .ok_or_else(|| TreasuryError::not_found("fund", id))
    }

    async fn require_invoice(&self, id: Uuid) -> TreasuryResult<Invoice> {
        self.store
            .invoice(id)
            .await?
            .ok_or_else(|| TreasuryError::not_found("invoice", id))
    }

    async fn require_transfer(&self, id: Uuid) -> TreasuryResult<Transfer> {
        self.store
            .transfer(id)
            .await?
            .ok_or_else(|| TreasuryError::not_found("transfer", id))
    }

    async fn require_debt(&self, id: Uuid) -> TreasuryResult<Debt> {
        self.store
            .debt(id)
            .await?
            .ok_or_else(|| TreasuryError::not_found("debt", id))
    }

    async fn require_order(&self, id: Uuid) -> TreasuryResult<Order> {
        self.store
            .order(id)
            .await?
            .ok_or_else(|| TreasuryError::not_found("order", id))
    }

    /// Audit trail of one aggregate, oldest first.
    pub async fn history(&self, aggregate_id: Uuid) -> TreasuryResult<Vec<EventEnvelope>> {
        self.store.stream(aggregate_id).await
    }
}
