use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum DomainEventKind {
    ShiftOpened,
    ShiftClosed,
    InvoiceRecorded,
    InvoiceUpdated,
    InvoiceStatusChanged,
    TransferRequested,
    TransferConfirmed,
    TransferRejected,
    DebtOpened,
    DebtPaymentRecorded,
    DebtDiscounted,
    DebtCancelled,
    OrderCreated,
    OrderStatusChanged,
    OrderConverted,
    FundReconciled,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DomainEvent {
    pub id: Uuid,
    pub aggregate_id: Uuid,
    pub kind: DomainEventKind,
    pub actor: String,
    pub occurred_at: DateTime<Utc>,
    pub payload: serde_json::Value,
}

impl DomainEvent {
    pub fn new(
        aggregate_id: Uuid,
        kind: DomainEventKind,
        actor: &str,
        occurred_at: DateTime<Utc>,
        payload: serde_json::Value,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            aggregate_id,
            kind,
            actor: actor.to_string(),
            occurred_at,
            payload,
        }
    }
}

/// Logical resource names clients key their caches by.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Resource {
    #[serde(rename = "shifts")]
    Shifts,
    #[serde(rename = "invoices")]
    Invoices,
    #[serde(rename = "currentInvoices")]
    CurrentInvoices,
    #[serde(rename = "funds")]
    Funds,
    #[serde(rename = "transfers")]
    Transfers,
    #[serde(rename = "debts")]
    Debts,
    #[serde(rename = "orders")]
    Orders,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Invalidation {
    pub resources: Vec<Resource>,
    pub at: DateTime<Utc>,
}

impl Invalidation {
    pub fn new(resources: &[Resource], at: DateTime<Utc>) -> Self {
        let mut resources = resources.to_vec();
        resources.sort();
        resources.dedup();
        Self { resources, at }
    }
}
