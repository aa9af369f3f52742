//! Payloads accepted by the treasury operations.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::{
    DifferenceStatus, InvoiceCategory, InvoiceType, LineItem, OrderStatus, PaidStatus, PartyRef,
    ShiftType,
};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenShift {
    pub shift_type: ShiftType,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CloseShift {
    pub status: DifferenceStatus,
    pub amount: Decimal,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewInvoice {
    pub invoice_type: InvoiceType,
    pub invoice_category: InvoiceCategory,
    pub fund_id: Uuid,
    pub total_amount: Decimal,
    #[serde(default)]
    pub discount: Decimal,
    pub paid_status: Option<PaidStatus>,
    pub notes: Option<String>,
    pub employee_name: Option<String>,
    #[serde(default)]
    pub items: Vec<LineItem>,
    pub tray_count: Option<i32>,
    #[serde(default)]
    pub is_break: bool,
    pub first_payment: Option<Decimal>,
    pub party: Option<PartyRef>,
    pub debt_id: Option<Uuid>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InvoiceChanges {
    pub total_amount: Option<Decimal>,
    pub discount: Option<Decimal>,
    pub items: Option<Vec<LineItem>>,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InvoiceStatusChange {
    pub paid_status: PaidStatus,
    /// Customer owing the invoice when it turns into a debt; defaults to the invoice's party.
    #[serde(default)]
    pub party: Option<PartyRef>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewTransfer {
    pub source_fund_id: Uuid,
    pub destination_fund_id: Option<Uuid>,
    pub amount: Decimal,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RejectTransfer {
    #[serde(default)]
    pub reason: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DebtDiscount {
    pub discount_amount: Decimal,
    #[serde(default)]
    pub notes: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CancelDebt {
    #[serde(default)]
    pub reason: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewOrder {
    pub customer: PartyRef,
    pub category_id: Option<Uuid>,
    #[serde(default)]
    pub items: Vec<LineItem>,
    pub total_amount: Option<Decimal>,
    #[serde(default)]
    pub is_for_today: bool,
    pub scheduled_for: Option<DateTime<Utc>>,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderStatusChange {
    pub status: OrderStatus,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConvertOrder {
    pub tray_count: Option<i32>,
    #[serde(default)]
    pub discount: Decimal,
    #[serde(default)]
    pub additional_amount: Decimal,
    pub initial_payment: Option<Decimal>,
    #[serde(default)]
    pub is_break: bool,
    pub notes: Option<String>,
    pub fund_id: Option<Uuid>,
}
