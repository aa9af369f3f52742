use std::collections::HashMap;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Serialize, de::DeserializeOwned};
use sqlx::{
    PgPool, Postgres, Row, Transaction,
    postgres::{PgPoolOptions, PgRow},
    types::Json,
};
use tracing::{debug, info};
use treasury_core::{
    ChangeSet, Debt, DebtQuery, DomainEvent, EventEnvelope, Fund, FundAdjustment, Invoice,
    InvoiceQuery, Order, OrderStatus, Record, Shift, Transfer, TransferStatus, TreasuryError,
    TreasuryResult, TreasuryStore, Write,
};
use uuid::Uuid;

pub async fn connect_database(database_url: &str) -> Result<PgPool> {
    let pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(database_url)
        .await?;

    Ok(pool)
}

const AGGREGATE_TABLES: [&str; 6] = [
    "treasury_shifts",
    "treasury_funds",
    "treasury_invoices",
    "treasury_transfers",
    "treasury_debts",
    "treasury_orders",
];

const SCHEMA_STATEMENTS: [&str; 8] = [
    // At most one open shift, whatever the number of service instances.
    "CREATE UNIQUE INDEX IF NOT EXISTS treasury_shifts_single_open ON treasury_shifts (status) WHERE status = 'open'",
    "CREATE INDEX IF NOT EXISTS treasury_invoices_fund ON treasury_invoices (fund_id, created_at DESC)",
    "CREATE INDEX IF NOT EXISTS treasury_invoices_shift ON treasury_invoices (shift_id, created_at DESC)",
    "CREATE INDEX IF NOT EXISTS treasury_invoices_debt ON treasury_invoices (debt_id)",
    "CREATE INDEX IF NOT EXISTS treasury_transfers_status ON treasury_transfers (status, created_at DESC)",
    "CREATE INDEX IF NOT EXISTS treasury_debts_status ON treasury_debts (kind, status)",
    r#"
    CREATE TABLE IF NOT EXISTS treasury_events (
        sequence BIGSERIAL PRIMARY KEY,
        event_id UUID NOT NULL UNIQUE,
        stream_id UUID NOT NULL,
        actor TEXT NOT NULL,
        body JSONB NOT NULL,
        stored_at TIMESTAMPTZ NOT NULL
    )
    "#,
    "CREATE INDEX IF NOT EXISTS treasury_events_stream ON treasury_events (stream_id, sequence)",
];

/// Creates the treasury tables when missing. Safe to run on every start-up.
pub async fn ensure_schema(pool: &PgPool) -> Result<()> {
    for table in AGGREGATE_TABLES {
        let ddl = format!(
            r#"
            CREATE TABLE IF NOT EXISTS {table} (
                id UUID PRIMARY KEY,
                version BIGINT NOT NULL,
                status TEXT,
                kind TEXT,
                fund_id UUID,
                shift_id UUID,
                debt_id UUID,
                created_at TIMESTAMPTZ NOT NULL,
                body JSONB NOT NULL
            )
            "#
        );
        sqlx::query(&ddl)
            .execute(pool)
            .await
            .with_context(|| format!("failed to create {table}"))?;
    }
    for statement in SCHEMA_STATEMENTS {
        sqlx::query(statement)
            .execute(pool)
            .await
            .context("failed to create treasury indexes")?;
    }

    info!("treasury schema ready");
    Ok(())
}

/// Columns lifted out of the JSON body so they can be filtered and indexed.
#[derive(Debug, Default, PartialEq, Eq)]
struct Indexed {
    status: Option<&'static str>,
    kind: Option<&'static str>,
    fund_id: Option<Uuid>,
    shift_id: Option<Uuid>,
    debt_id: Option<Uuid>,
    created_at: DateTime<Utc>,
}

trait Stored: Record + Serialize + DeserializeOwned {
    const TABLE: &'static str;

    fn indexed(&self) -> Indexed;
}

impl Stored for Shift {
    const TABLE: &'static str = "treasury_shifts";

    fn indexed(&self) -> Indexed {
        Indexed {
            status: Some(self.status.as_str()),
            kind: Some(self.shift_type.as_str()),
            created_at: self.open_time,
            ..Indexed::default()
        }
    }
}

impl Stored for Fund {
    const TABLE: &'static str = "treasury_funds";

    fn indexed(&self) -> Indexed {
        Indexed {
            kind: Some(self.fund_type.as_str()),
            created_at: self.last_update,
            ..Indexed::default()
        }
    }
}

impl Stored for Invoice {
    const TABLE: &'static str = "treasury_invoices";

    fn indexed(&self) -> Indexed {
        Indexed {
            status: Some(self.paid_status.as_str()),
            kind: Some(self.invoice_type.as_str()),
            fund_id: Some(self.fund_id),
            shift_id: self.shift_id,
            debt_id: self.debt_id,
            created_at: self.created_at,
        }
    }
}

impl Stored for Transfer {
    const TABLE: &'static str = "treasury_transfers";

    fn indexed(&self) -> Indexed {
        Indexed {
            status: Some(self.status.as_str()),
            fund_id: Some(self.source_fund_id),
            created_at: self.requested_at,
            ..Indexed::default()
        }
    }
}

impl Stored for Debt {
    const TABLE: &'static str = "treasury_debts";

    fn indexed(&self) -> Indexed {
        Indexed {
            status: Some(self.status.as_str()),
            kind: Some(self.kind.as_str()),
            created_at: self.created_at,
            ..Indexed::default()
        }
    }
}

impl Stored for Order {
    const TABLE: &'static str = "treasury_orders";

    fn indexed(&self) -> Indexed {
        Indexed {
            status: Some(self.status.as_str()),
            created_at: self.created_at,
            ..Indexed::default()
        }
    }
}

fn storage_error(err: sqlx::Error) -> TreasuryError {
    TreasuryError::Storage(anyhow::Error::new(err))
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    err.as_database_error()
        .is_some_and(|db_err| db_err.is_unique_violation())
}

fn decode_body<T: DeserializeOwned>(row: &PgRow) -> TreasuryResult<T> {
    let Json(body) = row.try_get::<Json<T>, _>("body").map_err(storage_error)?;
    Ok(body)
}

fn decode_all<T: DeserializeOwned>(rows: &[PgRow]) -> TreasuryResult<Vec<T>> {
    rows.iter().map(decode_body).collect()
}

async fn insert<T: Stored>(tx: &mut Transaction<'_, Postgres>, record: &T) -> TreasuryResult<()> {
    let indexed = record.indexed();
    let sql = format!(
        r#"
        INSERT INTO {} (id, version, status, kind, fund_id, shift_id, debt_id, created_at, body)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
        "#,
        T::TABLE
    );

    sqlx::query(&sql)
        .bind(record.id())
        .bind(record.version())
        .bind(indexed.status)
        .bind(indexed.kind)
        .bind(indexed.fund_id)
        .bind(indexed.shift_id)
        .bind(indexed.debt_id)
        .bind(indexed.created_at)
        .bind(Json(record))
        .execute(&mut **tx)
        .await
        .map_err(|err| {
            if is_unique_violation(&err) {
                TreasuryError::Conflict {
                    entity: T::ENTITY,
                    id: record.id(),
                }
            } else {
                storage_error(err)
            }
        })?;

    Ok(())
}

/// Writes `record` only if the stored row still carries `expected_version`.
async fn update<T: Stored>(
    tx: &mut Transaction<'_, Postgres>,
    expected_version: i64,
    record: &T,
) -> TreasuryResult<()> {
    let indexed = record.indexed();
    let sql = format!(
        r#"
        UPDATE {}
        SET version = $2, status = $3, kind = $4, fund_id = $5, shift_id = $6, debt_id = $7, body = $8
        WHERE id = $1 AND version = $9
        "#,
        T::TABLE
    );

    let updated = sqlx::query(&sql)
        .bind(record.id())
        .bind(record.version())
        .bind(indexed.status)
        .bind(indexed.kind)
        .bind(indexed.fund_id)
        .bind(indexed.shift_id)
        .bind(indexed.debt_id)
        .bind(Json(record))
        .bind(expected_version)
        .execute(&mut **tx)
        .await
        .map_err(storage_error)?;

    if updated.rows_affected() == 1 {
        return Ok(());
    }

    let exists = sqlx::query(&format!("SELECT 1 FROM {} WHERE id = $1", T::TABLE))
        .bind(record.id())
        .fetch_optional(&mut **tx)
        .await
        .map_err(storage_error)?;
    match exists {
        Some(_) => Err(TreasuryError::Conflict {
            entity: T::ENTITY,
            id: record.id(),
        }),
        None => Err(TreasuryError::not_found(T::ENTITY, record.id())),
    }
}

async fn write_all<T: Stored>(
    tx: &mut Transaction<'_, Postgres>,
    writes: &[Write<T>],
) -> TreasuryResult<()> {
    for write in writes {
        match write {
            Write::Insert(record) => insert(tx, record).await?,
            Write::Update {
                expected_version,
                record,
            } => update(tx, *expected_version, record).await?,
        }
    }
    Ok(())
}

/// Postgres-backed store. Aggregates live as JSONB bodies next to the columns used for
/// filtering; every change set is one transaction.
#[derive(Clone)]
pub struct PgTreasuryStore {
    pool: PgPool,
}

impl PgTreasuryStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn fetch<T: Stored>(&self, id: Uuid) -> TreasuryResult<Option<T>> {
        let sql = format!("SELECT body FROM {} WHERE id = $1", T::TABLE);
        let row = sqlx::query(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(storage_error)?;

        row.as_ref().map(decode_body).transpose()
    }

    async fn guard_open_shift(
        tx: &mut Transaction<'_, Postgres>,
        changes: &ChangeSet,
    ) -> TreasuryResult<()> {
        if let Some(shift_id) = changes.require_open_shift {
            // The row lock queues this change set behind a concurrent close, and the version
            // bump makes a close computed before it fail its compare-and-swap.
            let row = sqlx::query("SELECT body FROM treasury_shifts WHERE id = $1 FOR UPDATE")
                .bind(shift_id)
                .fetch_optional(&mut **tx)
                .await
                .map_err(storage_error)?;
            let mut shift: Shift = match row {
                Some(row) => decode_body(&row)?,
                None => return Err(TreasuryError::NoOpenShift),
            };
            if !shift.is_open() {
                return Err(TreasuryError::NoOpenShift);
            }
            let expected_version = shift.version;
            shift.version += 1;
            update(tx, expected_version, &shift).await?;
        }

        for write in &changes.shifts {
            let shift = write.record();
            if !shift.is_open() {
                continue;
            }
            let existing = sqlx::query(
                "SELECT id FROM treasury_shifts WHERE status = 'open' AND id <> $1 LIMIT 1",
            )
            .bind(shift.id)
            .fetch_optional(&mut **tx)
            .await
            .map_err(storage_error)?;
            if let Some(row) = existing {
                let id: Uuid = row.try_get("id").map_err(storage_error)?;
                return Err(TreasuryError::ShiftAlreadyOpen(id));
            }
        }
        Ok(())
    }

    /// Locks every touched fund in id order, then applies the deltas in sequence.
    async fn apply_adjustments(
        tx: &mut Transaction<'_, Postgres>,
        adjustments: &[FundAdjustment],
        at: DateTime<Utc>,
    ) -> TreasuryResult<()> {
        if adjustments.is_empty() {
            return Ok(());
        }

        let mut ids: Vec<Uuid> = adjustments.iter().map(|adjustment| adjustment.fund_id).collect();
        ids.sort();
        ids.dedup();

        let rows = sqlx::query(
            "SELECT body FROM treasury_funds WHERE id = ANY($1) ORDER BY id FOR UPDATE",
        )
        .bind(&ids)
        .fetch_all(&mut **tx)
        .await
        .map_err(storage_error)?;

        let mut funds: HashMap<Uuid, (i64, Fund)> = HashMap::new();
        for row in &rows {
            let fund: Fund = decode_body(row)?;
            funds.insert(fund.id, (fund.version, fund));
        }

        for adjustment in adjustments {
            let (_, fund) = funds
                .get_mut(&adjustment.fund_id)
                .ok_or_else(|| TreasuryError::not_found("fund", adjustment.fund_id))?;
            if adjustment.require_cover && fund.current_balance + adjustment.delta < Decimal::ZERO
            {
                return Err(TreasuryError::InsufficientFunds {
                    fund_id: fund.id,
                    available: fund.current_balance,
                    requested: -adjustment.delta,
                });
            }
            fund.current_balance += adjustment.delta;
            fund.last_update = at;
            fund.version += 1;
        }

        for (expected_version, fund) in funds.values() {
            update(tx, *expected_version, fund).await?;
        }
        Ok(())
    }

    async fn append_events(
        tx: &mut Transaction<'_, Postgres>,
        events: &[DomainEvent],
    ) -> TreasuryResult<()> {
        let stored_at = Utc::now();
        for event in events {
            sqlx::query(
                r#"
                INSERT INTO treasury_events (event_id, stream_id, actor, body, stored_at)
                VALUES ($1, $2, $3, $4, $5)
                "#,
            )
            .bind(event.id)
            .bind(event.aggregate_id)
            .bind(&event.actor)
            .bind(Json(event))
            .bind(stored_at)
            .execute(&mut **tx)
            .await
            .map_err(storage_error)?;
        }
        Ok(())
    }
}

#[async_trait]
impl TreasuryStore for PgTreasuryStore {
    async fn commit(&self, changes: ChangeSet) -> TreasuryResult<()> {
        let mut tx = self.pool.begin().await.map_err(storage_error)?;

        Self::guard_open_shift(&mut tx, &changes).await?;
        write_all(&mut tx, &changes.shifts).await?;
        write_all(&mut tx, &changes.funds).await?;
        write_all(&mut tx, &changes.invoices).await?;
        write_all(&mut tx, &changes.transfers).await?;
        write_all(&mut tx, &changes.debts).await?;
        write_all(&mut tx, &changes.orders).await?;
        Self::apply_adjustments(&mut tx, &changes.fund_adjustments, changes.committed_at()).await?;
        Self::append_events(&mut tx, &changes.events).await?;

        tx.commit().await.map_err(storage_error)?;
        debug!(events = changes.events.len(), "change set committed");
        Ok(())
    }

    async fn open_shift(&self) -> TreasuryResult<Option<Shift>> {
        let row = sqlx::query("SELECT body FROM treasury_shifts WHERE status = 'open' LIMIT 1")
            .fetch_optional(&self.pool)
            .await
            .map_err(storage_error)?;

        row.as_ref().map(decode_body).transpose()
    }

    async fn shift(&self, id: Uuid) -> TreasuryResult<Option<Shift>> {
        self.fetch(id).await
    }

    async fn shifts(&self, limit: usize) -> TreasuryResult<Vec<Shift>> {
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let rows = sqlx::query(
            "SELECT body FROM treasury_shifts ORDER BY created_at DESC LIMIT $1",
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(storage_error)?;

        decode_all(&rows)
    }

    async fn funds(&self) -> TreasuryResult<Vec<Fund>> {
        let rows = sqlx::query("SELECT body FROM treasury_funds")
            .fetch_all(&self.pool)
            .await
            .map_err(storage_error)?;

        let mut funds: Vec<Fund> = decode_all(&rows)?;
        funds.sort_by_key(|fund| fund.fund_type);
        Ok(funds)
    }

    async fn fund(&self, id: Uuid) -> TreasuryResult<Option<Fund>> {
        self.fetch(id).await
    }

    async fn invoice(&self, id: Uuid) -> TreasuryResult<Option<Invoice>> {
        self.fetch(id).await
    }

    async fn invoices(&self, query: &InvoiceQuery) -> TreasuryResult<Vec<Invoice>> {
        let rows = sqlx::query(
            r#"
            SELECT body
            FROM treasury_invoices
            WHERE ($1::uuid IS NULL OR fund_id = $1)
              AND ($2::uuid IS NULL OR shift_id = $2)
              AND ($3::uuid IS NULL OR debt_id = $3)
            ORDER BY created_at DESC
            "#,
        )
        .bind(query.fund_id)
        .bind(query.shift_id)
        .bind(query.debt_id)
        .fetch_all(&self.pool)
        .await
        .map_err(storage_error)?;

        decode_all(&rows)
    }

    async fn transfer(&self, id: Uuid) -> TreasuryResult<Option<Transfer>> {
        self.fetch(id).await
    }

    async fn transfers(&self, status: Option<TransferStatus>) -> TreasuryResult<Vec<Transfer>> {
        let rows = sqlx::query(
            r#"
            SELECT body
            FROM treasury_transfers
            WHERE ($1::text IS NULL OR status = $1)
            ORDER BY created_at DESC
            "#,
        )
        .bind(status.map(TransferStatus::as_str))
        .fetch_all(&self.pool)
        .await
        .map_err(storage_error)?;

        decode_all(&rows)
    }

    async fn debt(&self, id: Uuid) -> TreasuryResult<Option<Debt>> {
        self.fetch(id).await
    }

    async fn debts(&self, query: &DebtQuery) -> TreasuryResult<Vec<Debt>> {
        let rows = sqlx::query(
            r#"
            SELECT body
            FROM treasury_debts
            WHERE ($1::text IS NULL OR kind = $1)
              AND ($2::text IS NULL OR status = $2)
            ORDER BY created_at DESC
            "#,
        )
        .bind(query.kind.map(|kind| kind.as_str()))
        .bind(query.status.map(|status| status.as_str()))
        .fetch_all(&self.pool)
        .await
        .map_err(storage_error)?;

        decode_all(&rows)
    }

    async fn order(&self, id: Uuid) -> TreasuryResult<Option<Order>> {
        self.fetch(id).await
    }

    async fn orders(&self, status: Option<OrderStatus>) -> TreasuryResult<Vec<Order>> {
        let rows = sqlx::query(
            r#"
            SELECT body
            FROM treasury_orders
            WHERE ($1::text IS NULL OR status = $1)
            ORDER BY created_at DESC
            "#,
        )
        .bind(status.map(OrderStatus::as_str))
        .fetch_all(&self.pool)
        .await
        .map_err(storage_error)?;

        decode_all(&rows)
    }

    async fn stream(&self, aggregate_id: Uuid) -> TreasuryResult<Vec<EventEnvelope>> {
        let rows = sqlx::query(
            r#"
            SELECT sequence, stream_id, body, stored_at
            FROM treasury_events
            WHERE stream_id = $1
            ORDER BY sequence ASC
            "#,
        )
        .bind(aggregate_id)
        .fetch_all(&self.pool)
        .await
        .map_err(storage_error)?;

        rows.iter()
            .map(|row| {
                Ok(EventEnvelope {
                    sequence: row.try_get("sequence").map_err(storage_error)?,
                    stream_id: row.try_get("stream_id").map_err(storage_error)?,
                    event: decode_body(row)?,
                    stored_at: row.try_get("stored_at").map_err(storage_error)?,
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use treasury_core::{FundType, InvoiceCategory, InvoiceType, PaidStatus, ShiftType};

    use super::*;

    #[test]
    fn invoices_expose_their_filter_columns() {
        let now = Utc::now();
        let shift = Shift::open(ShiftType::Evening, "amal", now);
        let fund = Fund::new(FundType::Booth, Decimal::ZERO, now);
        let id = Uuid::new_v4();
        let invoice = Invoice {
            id,
            invoice_number: "INV-1".to_string(),
            invoice_type: InvoiceType::Expense,
            invoice_category: InvoiceCategory::Direct,
            total_amount: Decimal::new(40, 0),
            discount: Decimal::ZERO,
            paid_status: PaidStatus::Paid,
            notes: None,
            fund_id: fund.id,
            shift_id: Some(shift.id),
            employee_id: "amal".to_string(),
            employee_name: "Amal".to_string(),
            items: Vec::new(),
            tray_count: None,
            is_break: false,
            first_payment: None,
            cash_amount: Decimal::new(40, 0),
            party: None,
            debt_id: None,
            order_id: None,
            created_at: now,
            updated_at: now,
            version: 0,
        };

        assert_eq!(
            invoice.indexed(),
            Indexed {
                status: Some("paid"),
                kind: Some("expense"),
                fund_id: Some(fund.id),
                shift_id: Some(shift.id),
                debt_id: None,
                created_at: now,
            }
        );
        assert_eq!(shift.indexed().status, Some("open"));
        assert_eq!(fund.indexed().kind, Some("booth"));
    }
}
