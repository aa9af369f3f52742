use chrono::Utc;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{info, warn};
use treasury_core::{
    Actor, Capability, ChangeSet, DomainEvent, DomainEventKind, Fund, FundType, Invoice,
    InvoiceQuery, Resource, TransferStatus, TreasuryError, TreasuryResult,
};
use treasury_finance::{
    InvoiceFilter, LedgerTotals, Page, compute_totals, derive_fund_balance, paginate,
};
use uuid::Uuid;

use crate::TreasuryService;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FundLedger {
    pub fund: Fund,
    pub totals: LedgerTotals,
    pub invoices: Page<Invoice>,
}

impl TreasuryService {
    /// Creates one fund per fund type when the store holds none yet.
    pub async fn ensure_funds(&self) -> TreasuryResult<Vec<Fund>> {
        let existing = self.store.funds().await?;
        if !existing.is_empty() {
            return Ok(existing);
        }

        let now = Utc::now();
        let mut changes = ChangeSet::new(now);
        for fund_type in FundType::ALL {
            changes.insert(Fund::new(fund_type, Decimal::ZERO, now));
        }
        match self.commit(changes, &[Resource::Funds]).await {
            Ok(()) => info!("seeded {} funds", FundType::ALL.len()),
            // Another instance seeded first.
            Err(TreasuryError::Conflict { .. }) => {}
            Err(err) => return Err(err),
        }

        self.store.funds().await
    }

    pub async fn funds(&self) -> TreasuryResult<Vec<Fund>> {
        self.store.funds().await
    }

    pub async fn fund(&self, id: Uuid) -> TreasuryResult<Fund> {
        self.require_fund(id).await
    }

    pub(crate) async fn main_fund(&self) -> TreasuryResult<Fund> {
        self.store
            .funds()
            .await?
            .into_iter()
            .find(|fund| fund.fund_type == FundType::Main)
            .ok_or_else(|| TreasuryError::validation("no main fund is configured"))
    }

    /// Filtered, paginated invoices of a fund with totals over the whole filtered set.
    pub async fn fund_ledger(
        &self,
        fund_id: Uuid,
        filter: &InvoiceFilter,
        page: usize,
        page_size: usize,
    ) -> TreasuryResult<FundLedger> {
        let fund = self.require_fund(fund_id).await?;
        let invoices = self
            .store
            .invoices(&InvoiceQuery {
                fund_id: Some(fund_id),
                ..InvoiceQuery::default()
            })
            .await?;

        let filtered = filter.apply(invoices);
        let totals = compute_totals(&filtered);

        Ok(FundLedger {
            fund,
            totals,
            invoices: paginate(filtered, page, page_size),
        })
    }

    /// Recomputes a fund balance from its full invoice and transfer history.
    pub async fn reconcile_fund(&self, actor: &Actor, fund_id: Uuid) -> TreasuryResult<Fund> {
        actor.require(Capability::ReconcileFunds)?;

        let mut fund = self.require_fund(fund_id).await?;
        let invoices = self
            .store
            .invoices(&InvoiceQuery {
                fund_id: Some(fund_id),
                ..InvoiceQuery::default()
            })
            .await?;
        let transfers = self.store.transfers(Some(TransferStatus::Confirmed)).await?;

        let derived = derive_fund_balance(&fund, &invoices, &transfers);
        if derived == fund.current_balance {
            return Ok(fund);
        }

        warn!(
            fund_id = %fund.id,
            stored = %fund.current_balance,
            derived = %derived,
            "fund balance drifted, rewriting"
        );

        let now = Utc::now();
        let previous = fund.current_balance;
        fund.current_balance = derived;
        fund.last_update = now;

        let mut changes = ChangeSet::new(now);
        changes.update(&mut fund);
        changes.record_event(DomainEvent::new(
            fund.id,
            DomainEventKind::FundReconciled,
            &actor.id,
            now,
            json!({ "previous_balance": previous, "balance": derived }),
        ));
        self.commit(changes, &[Resource::Funds]).await?;

        Ok(fund)
    }
}
