use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use rust_decimal::Decimal;
use tokio::sync::{Mutex, RwLock};
use tracing::debug;
use treasury_core::{
    ChangeNotifier, ChangeSet, Debt, DebtQuery, EventEnvelope, Fund, Invalidation, Invoice,
    InvoiceQuery, Order, OrderStatus, Record, Shift, Transfer, TransferStatus, TreasuryError,
    TreasuryResult, TreasuryStore, Write,
};
use uuid::Uuid;

#[derive(Default)]
struct Tables {
    shifts: HashMap<Uuid, Shift>,
    funds: HashMap<Uuid, Fund>,
    invoices: HashMap<Uuid, Invoice>,
    transfers: HashMap<Uuid, Transfer>,
    debts: HashMap<Uuid, Debt>,
    orders: HashMap<Uuid, Order>,
    streams: HashMap<Uuid, Vec<EventEnvelope>>,
    sequence: i64,
}

/// Process-local store. One write lock covers every table so a change set is atomic.
#[derive(Default)]
pub struct InMemoryTreasuryStore {
    tables: RwLock<Tables>,
}

impl InMemoryTreasuryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn check_writes<R: Record>(table: &HashMap<Uuid, R>, writes: &[Write<R>]) -> TreasuryResult<()> {
    for write in writes {
        match write {
            Write::Insert(record) => {
                if table.contains_key(&record.id()) {
                    return Err(TreasuryError::Conflict {
                        entity: R::ENTITY,
                        id: record.id(),
                    });
                }
            }
            Write::Update {
                expected_version,
                record,
            } => {
                let stored = table
                    .get(&record.id())
                    .ok_or_else(|| TreasuryError::not_found(R::ENTITY, record.id()))?;
                if stored.version() != *expected_version {
                    return Err(TreasuryError::Conflict {
                        entity: R::ENTITY,
                        id: record.id(),
                    });
                }
            }
        }
    }
    Ok(())
}

fn apply_writes<R: Record>(table: &mut HashMap<Uuid, R>, writes: Vec<Write<R>>) {
    for write in writes {
        let record = match write {
            Write::Insert(record) => record,
            Write::Update { record, .. } => record,
        };
        table.insert(record.id(), record);
    }
}

fn newest_first<T: Clone, K: Ord>(
    records: impl Iterator<Item = T>,
    key: impl Fn(&T) -> K,
) -> Vec<T> {
    let mut records: Vec<T> = records.collect();
    records.sort_by(|left, right| key(right).cmp(&key(left)));
    records
}

impl Tables {
    fn check_open_shift(&self, changes: &ChangeSet) -> TreasuryResult<()> {
        if let Some(shift_id) = changes.require_open_shift {
            let open = self.shifts.get(&shift_id).is_some_and(Shift::is_open);
            if !open {
                return Err(TreasuryError::NoOpenShift);
            }
        }

        for write in &changes.shifts {
            let record = write.record();
            if !record.is_open() {
                continue;
            }
            if let Some(existing) = self
                .shifts
                .values()
                .find(|shift| shift.is_open() && shift.id != record.id)
            {
                return Err(TreasuryError::ShiftAlreadyOpen(existing.id));
            }
        }
        Ok(())
    }

    fn check_adjustments(&self, changes: &ChangeSet) -> TreasuryResult<()> {
        let mut balances: HashMap<Uuid, Decimal> = HashMap::new();
        for adjustment in &changes.fund_adjustments {
            let fund = self
                .funds
                .get(&adjustment.fund_id)
                .ok_or_else(|| TreasuryError::not_found("fund", adjustment.fund_id))?;
            let balance = balances
                .entry(fund.id)
                .or_insert(fund.current_balance);
            if adjustment.require_cover && *balance + adjustment.delta < Decimal::ZERO {
                return Err(TreasuryError::InsufficientFunds {
                    fund_id: fund.id,
                    available: *balance,
                    requested: -adjustment.delta,
                });
            }
            *balance += adjustment.delta;
        }
        Ok(())
    }
}

#[async_trait]
impl TreasuryStore for InMemoryTreasuryStore {
    async fn commit(&self, changes: ChangeSet) -> TreasuryResult<()> {
        let mut tables = self.tables.write().await;

        check_writes(&tables.shifts, &changes.shifts)?;
        check_writes(&tables.funds, &changes.funds)?;
        check_writes(&tables.invoices, &changes.invoices)?;
        check_writes(&tables.transfers, &changes.transfers)?;
        check_writes(&tables.debts, &changes.debts)?;
        check_writes(&tables.orders, &changes.orders)?;
        tables.check_open_shift(&changes)?;
        tables.check_adjustments(&changes)?;

        let at = changes.committed_at();
        let ChangeSet {
            shifts,
            funds,
            invoices,
            transfers,
            debts,
            orders,
            fund_adjustments,
            require_open_shift,
            events,
            ..
        } = changes;

        apply_writes(&mut tables.shifts, shifts);
        apply_writes(&mut tables.funds, funds);
        apply_writes(&mut tables.invoices, invoices);
        apply_writes(&mut tables.transfers, transfers);
        apply_writes(&mut tables.debts, debts);
        apply_writes(&mut tables.orders, orders);

        if let Some(shift) = require_open_shift.and_then(|id| tables.shifts.get_mut(&id)) {
            shift.version += 1;
        }

        for adjustment in fund_adjustments {
            if let Some(fund) = tables.funds.get_mut(&adjustment.fund_id) {
                fund.current_balance += adjustment.delta;
                fund.last_update = at;
                fund.version += 1;
            }
        }

        let stored_at = Utc::now();
        for event in events {
            tables.sequence += 1;
            let envelope = EventEnvelope {
                sequence: tables.sequence,
                stream_id: event.aggregate_id,
                event,
                stored_at,
            };
            tables
                .streams
                .entry(envelope.stream_id)
                .or_default()
                .push(envelope);
        }

        debug!(sequence = tables.sequence, "change set committed");
        Ok(())
    }

    async fn open_shift(&self) -> TreasuryResult<Option<Shift>> {
        let tables = self.tables.read().await;
        Ok(tables.shifts.values().find(|shift| shift.is_open()).cloned())
    }

    async fn shift(&self, id: Uuid) -> TreasuryResult<Option<Shift>> {
        let tables = self.tables.read().await;
        Ok(tables.shifts.get(&id).cloned())
    }

    async fn shifts(&self, limit: usize) -> TreasuryResult<Vec<Shift>> {
        let tables = self.tables.read().await;
        let mut shifts = newest_first(tables.shifts.values().cloned(), |shift| shift.open_time);
        shifts.truncate(limit);
        Ok(shifts)
    }

    async fn funds(&self) -> TreasuryResult<Vec<Fund>> {
        let tables = self.tables.read().await;
        let mut funds: Vec<Fund> = tables.funds.values().cloned().collect();
        funds.sort_by_key(|fund| (fund.fund_type, fund.name.clone()));
        Ok(funds)
    }

    async fn fund(&self, id: Uuid) -> TreasuryResult<Option<Fund>> {
        let tables = self.tables.read().await;
        Ok(tables.funds.get(&id).cloned())
    }

    async fn invoice(&self, id: Uuid) -> TreasuryResult<Option<Invoice>> {
        let tables = self.tables.read().await;
        Ok(tables.invoices.get(&id).cloned())
    }

    async fn invoices(&self, query: &InvoiceQuery) -> TreasuryResult<Vec<Invoice>> {
        let tables = self.tables.read().await;
        Ok(newest_first(
            tables
                .invoices
                .values()
                .filter(|invoice| query.matches(invoice))
                .cloned(),
            |invoice| invoice.created_at,
        ))
    }

    async fn transfer(&self, id: Uuid) -> TreasuryResult<Option<Transfer>> {
        let tables = self.tables.read().await;
        Ok(tables.transfers.get(&id).cloned())
    }

    async fn transfers(&self, status: Option<TransferStatus>) -> TreasuryResult<Vec<Transfer>> {
        let tables = self.tables.read().await;
        Ok(newest_first(
            tables
                .transfers
                .values()
                .filter(|transfer| status.is_none_or(|status| transfer.status == status))
                .cloned(),
            |transfer| transfer.requested_at,
        ))
    }

    async fn debt(&self, id: Uuid) -> TreasuryResult<Option<Debt>> {
        let tables = self.tables.read().await;
        Ok(tables.debts.get(&id).cloned())
    }

    async fn debts(&self, query: &DebtQuery) -> TreasuryResult<Vec<Debt>> {
        let tables = self.tables.read().await;
        Ok(newest_first(
            tables.debts.values().filter(|debt| query.matches(debt)).cloned(),
            |debt| debt.created_at,
        ))
    }

    async fn order(&self, id: Uuid) -> TreasuryResult<Option<Order>> {
        let tables = self.tables.read().await;
        Ok(tables.orders.get(&id).cloned())
    }

    async fn orders(&self, status: Option<OrderStatus>) -> TreasuryResult<Vec<Order>> {
        let tables = self.tables.read().await;
        Ok(newest_first(
            tables
                .orders
                .values()
                .filter(|order| status.is_none_or(|status| order.status == status))
                .cloned(),
            |order| order.created_at,
        ))
    }

    async fn stream(&self, aggregate_id: Uuid) -> TreasuryResult<Vec<EventEnvelope>> {
        let tables = self.tables.read().await;
        Ok(tables.streams.get(&aggregate_id).cloned().unwrap_or_default())
    }
}

#[derive(Default)]
pub struct NoopNotifier;

#[async_trait]
impl ChangeNotifier for NoopNotifier {
    async fn notify(&self, _invalidation: &Invalidation) -> anyhow::Result<()> {
        Ok(())
    }
}

/// Keeps every published invalidation; used to observe cache traffic in-process.
#[derive(Default)]
pub struct MemoryNotifier {
    published: Mutex<Vec<Invalidation>>,
}

impl MemoryNotifier {
    pub async fn published(&self) -> Vec<Invalidation> {
        self.published.lock().await.clone()
    }
}

#[async_trait]
impl ChangeNotifier for MemoryNotifier {
    async fn notify(&self, invalidation: &Invalidation) -> anyhow::Result<()> {
        self.published.lock().await.push(invalidation.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use serde_json::json;
    use treasury_core::{
        DomainEvent, DomainEventKind, FundType, ShiftType, TreasuryError, TreasuryStore,
    };

    use super::*;

    async fn seeded_store() -> (InMemoryTreasuryStore, Fund) {
        let store = InMemoryTreasuryStore::new();
        let fund = Fund::new(FundType::Booth, Decimal::new(100, 0), Utc::now());
        let mut changes = ChangeSet::new(Utc::now());
        changes.insert(fund.clone());
        store.commit(changes).await.unwrap();
        (store, fund)
    }

    #[tokio::test]
    async fn rejects_second_open_shift() {
        let store = InMemoryTreasuryStore::new();
        let first = Shift::open(ShiftType::Morning, "amal", Utc::now());
        let mut changes = ChangeSet::new(Utc::now());
        changes.insert(first.clone());
        store.commit(changes).await.unwrap();

        let mut changes = ChangeSet::new(Utc::now());
        changes.insert(Shift::open(ShiftType::Evening, "omar", Utc::now()));
        let result = store.commit(changes).await;

        assert!(matches!(result, Err(TreasuryError::ShiftAlreadyOpen(id)) if id == first.id));
        assert_eq!(store.shifts(10).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn stale_versions_conflict_and_leave_state_untouched() {
        let (store, fund) = seeded_store().await;
        let mut shift = Shift::open(ShiftType::Morning, "amal", Utc::now());
        let mut changes = ChangeSet::new(Utc::now());
        changes.insert(shift.clone());
        store.commit(changes).await.unwrap();

        let mut stale = shift.clone();
        shift
            .close(
                treasury_core::DifferenceStatus::Surplus,
                Decimal::ZERO,
                Decimal::ZERO,
                "amal",
                Utc::now(),
            )
            .unwrap();
        let mut changes = ChangeSet::new(Utc::now());
        changes.update(&mut shift);
        store.commit(changes).await.unwrap();

        stale
            .close(
                treasury_core::DifferenceStatus::Deficit,
                Decimal::ONE,
                Decimal::ZERO,
                "omar",
                Utc::now(),
            )
            .unwrap();
        let mut changes = ChangeSet::new(Utc::now());
        changes.update(&mut stale);
        changes.adjust_fund(fund.id, Decimal::new(5, 0), false);
        let result = store.commit(changes).await;

        assert!(matches!(result, Err(TreasuryError::Conflict { entity: "shift", .. })));
        let stored = store.shift(shift.id).await.unwrap().unwrap();
        assert_eq!(stored.closed_by.as_deref(), Some("amal"));
        let fund = store.fund(fund.id).await.unwrap().unwrap();
        assert_eq!(fund.current_balance, Decimal::new(100, 0));
    }

    #[tokio::test]
    async fn guarded_commits_invalidate_an_earlier_shift_read() {
        let (store, fund) = seeded_store().await;
        let shift = Shift::open(ShiftType::Morning, "amal", Utc::now());
        let mut changes = ChangeSet::new(Utc::now());
        changes.insert(shift.clone());
        store.commit(changes).await.unwrap();

        let mut read_before = store.shift(shift.id).await.unwrap().unwrap();
        let mut changes = ChangeSet::new(Utc::now());
        changes.require_open_shift = Some(shift.id);
        changes.adjust_fund(fund.id, Decimal::new(500, 0), false);
        store.commit(changes).await.unwrap();
        assert_eq!(store.shift(shift.id).await.unwrap().unwrap().version, 1);

        read_before
            .close(
                treasury_core::DifferenceStatus::Surplus,
                Decimal::ZERO,
                Decimal::ZERO,
                "amal",
                Utc::now(),
            )
            .unwrap();
        let mut changes = ChangeSet::new(Utc::now());
        changes.update(&mut read_before);
        let result = store.commit(changes).await;

        assert!(matches!(result, Err(TreasuryError::Conflict { entity: "shift", .. })));
        assert!(store.shift(shift.id).await.unwrap().unwrap().is_open());
    }

    #[tokio::test]
    async fn covered_adjustments_cannot_overdraw() {
        let (store, fund) = seeded_store().await;

        let mut changes = ChangeSet::new(Utc::now());
        changes.adjust_fund(fund.id, Decimal::new(-150, 0), true);
        let result = store.commit(changes).await;
        assert!(matches!(result, Err(TreasuryError::InsufficientFunds { .. })));

        let mut changes = ChangeSet::new(Utc::now());
        changes.adjust_fund(fund.id, Decimal::new(-150, 0), false);
        store.commit(changes).await.unwrap();
        let fund = store.fund(fund.id).await.unwrap().unwrap();
        assert_eq!(fund.current_balance, Decimal::new(-50, 0));
        assert_eq!(fund.version, 1);
    }

    #[tokio::test]
    async fn events_are_sequenced_per_stream() {
        let (store, fund) = seeded_store().await;
        let mut changes = ChangeSet::new(Utc::now());
        for _ in 0..2 {
            changes.record_event(DomainEvent::new(
                fund.id,
                DomainEventKind::FundReconciled,
                "amal",
                Utc::now(),
                json!({}),
            ));
        }
        store.commit(changes).await.unwrap();

        let stream = store.stream(fund.id).await.unwrap();
        assert_eq!(stream.len(), 2);
        assert!(stream[0].sequence < stream[1].sequence);
        assert!(store.stream(Uuid::new_v4()).await.unwrap().is_empty());
    }
}
