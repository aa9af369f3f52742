use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::TreasuryResult;
use crate::events::{DomainEvent, Invalidation};
use crate::models::{
    Debt, DebtKind, DebtStatus, Fund, Invoice, Order, OrderStatus, Shift, Transfer,
    TransferStatus,
};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventEnvelope {
    pub sequence: i64,
    pub stream_id: Uuid,
    pub event: DomainEvent,
    pub stored_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub enum Write<T> {
    Insert(T),
    Update { expected_version: i64, record: T },
}

impl<T> Write<T> {
    pub fn record(&self) -> &T {
        match self {
            Write::Insert(record) => record,
            Write::Update { record, .. } => record,
        }
    }
}

/// An aggregate persisted through a [`ChangeSet`].
pub trait Record: Clone + Send + Sync + 'static {
    const ENTITY: &'static str;

    fn id(&self) -> Uuid;
    fn version(&self) -> i64;
    fn set_version(&mut self, version: i64);
    fn slot(changes: &mut ChangeSet) -> &mut Vec<Write<Self>>;
}

macro_rules! impl_record {
    ($record:ty, $entity:literal, $field:ident) => {
        impl Record for $record {
            const ENTITY: &'static str = $entity;

            fn id(&self) -> Uuid {
                self.id
            }

            fn version(&self) -> i64 {
                self.version
            }

            fn set_version(&mut self, version: i64) {
                self.version = version;
            }

            fn slot(changes: &mut ChangeSet) -> &mut Vec<Write<Self>> {
                &mut changes.$field
            }
        }
    };
}

impl_record!(Shift, "shift", shifts);
impl_record!(Fund, "fund", funds);
impl_record!(Invoice, "invoice", invoices);
impl_record!(Transfer, "transfer", transfers);
impl_record!(Debt, "debt", debts);
impl_record!(Order, "order", orders);

#[derive(Debug, Clone)]
pub struct FundAdjustment {
    pub fund_id: Uuid,
    pub delta: Decimal,
    /// Reject the change set when the adjustment would leave the fund below zero.
    pub require_cover: bool,
}

/// Writes committed atomically: either every write, adjustment and event lands, or none.
#[derive(Debug, Clone, Default)]
pub struct ChangeSet {
    pub shifts: Vec<Write<Shift>>,
    pub funds: Vec<Write<Fund>>,
    pub invoices: Vec<Write<Invoice>>,
    pub transfers: Vec<Write<Transfer>>,
    pub debts: Vec<Write<Debt>>,
    pub orders: Vec<Write<Order>>,
    pub fund_adjustments: Vec<FundAdjustment>,
    /// Shift that must still be open when the change set commits. Committing bumps its
    /// version, so a close computed from an earlier read of the shift is refused.
    pub require_open_shift: Option<Uuid>,
    pub events: Vec<DomainEvent>,
    pub at: Option<DateTime<Utc>>,
}

impl ChangeSet {
    pub fn new(at: DateTime<Utc>) -> Self {
        Self {
            at: Some(at),
            ..Self::default()
        }
    }

    pub fn insert<R: Record>(&mut self, record: R) {
        R::slot(self).push(Write::Insert(record));
    }

    /// Stages an update guarded by the record's current version and bumps it in place.
    pub fn update<R: Record>(&mut self, record: &mut R) {
        let expected_version = record.version();
        record.set_version(expected_version + 1);
        R::slot(self).push(Write::Update {
            expected_version,
            record: record.clone(),
        });
    }

    pub fn adjust_fund(&mut self, fund_id: Uuid, delta: Decimal, require_cover: bool) {
        if delta.is_zero() {
            return;
        }
        self.fund_adjustments.push(FundAdjustment {
            fund_id,
            delta,
            require_cover,
        });
    }

    pub fn record_event(&mut self, event: DomainEvent) {
        self.events.push(event);
    }

    pub fn committed_at(&self) -> DateTime<Utc> {
        self.at.unwrap_or_else(Utc::now)
    }

    pub fn is_empty(&self) -> bool {
        self.shifts.is_empty()
            && self.funds.is_empty()
            && self.invoices.is_empty()
            && self.transfers.is_empty()
            && self.debts.is_empty()
            && self.orders.is_empty()
            && self.fund_adjustments.is_empty()
            && self.events.is_empty()
    }
}

#[derive(Debug, Clone, Default)]
pub struct InvoiceQuery {
    pub fund_id: Option<Uuid>,
    pub shift_id: Option<Uuid>,
    pub debt_id: Option<Uuid>,
}

impl InvoiceQuery {
    pub fn matches(&self, invoice: &Invoice) -> bool {
        self.fund_id.is_none_or(|fund_id| invoice.fund_id == fund_id)
            && self
                .shift_id
                .is_none_or(|shift_id| invoice.shift_id == Some(shift_id))
            && self
                .debt_id
                .is_none_or(|debt_id| invoice.debt_id == Some(debt_id))
    }
}

#[derive(Debug, Clone, Default)]
pub struct DebtQuery {
    pub kind: Option<DebtKind>,
    pub status: Option<DebtStatus>,
}

impl DebtQuery {
    pub fn matches(&self, debt: &Debt) -> bool {
        self.kind.is_none_or(|kind| debt.kind == kind)
            && self.status.is_none_or(|status| debt.status == status)
    }
}

#[async_trait]
pub trait TreasuryStore: Send + Sync {
    async fn commit(&self, changes: ChangeSet) -> TreasuryResult<()>;

    async fn open_shift(&self) -> TreasuryResult<Option<Shift>>;
    async fn shift(&self, id: Uuid) -> TreasuryResult<Option<Shift>>;
    /// Newest first.
    async fn shifts(&self, limit: usize) -> TreasuryResult<Vec<Shift>>;

    /// Ordered by fund type.
    async fn funds(&self) -> TreasuryResult<Vec<Fund>>;
    async fn fund(&self, id: Uuid) -> TreasuryResult<Option<Fund>>;

    async fn invoice(&self, id: Uuid) -> TreasuryResult<Option<Invoice>>;
    /// Newest first.
    async fn invoices(&self, query: &InvoiceQuery) -> TreasuryResult<Vec<Invoice>>;

    async fn transfer(&self, id: Uuid) -> TreasuryResult<Option<Transfer>>;
    async fn transfers(&self, status: Option<TransferStatus>) -> TreasuryResult<Vec<Transfer>>;

    async fn debt(&self, id: Uuid) -> TreasuryResult<Option<Debt>>;
    async fn debts(&self, query: &DebtQuery) -> TreasuryResult<Vec<Debt>>;

    async fn order(&self, id: Uuid) -> TreasuryResult<Option<Order>>;
    async fn orders(&self, status: Option<OrderStatus>) -> TreasuryResult<Vec<Order>>;

    async fn stream(&self, aggregate_id: Uuid) -> TreasuryResult<Vec<EventEnvelope>>;
}

/// Publishes cache invalidation notices after successful mutations.
#[async_trait]
pub trait ChangeNotifier: Send + Sync {
    async fn notify(&self, invalidation: &Invalidation) -> anyhow::Result<()>;
}
