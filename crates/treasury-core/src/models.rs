use std::fmt;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{TreasuryError, TreasuryResult};

macro_rules! string_enum {
    ($name:ident { $($variant:ident => $text:literal),+ $(,)? }) => {
        impl $name {
            pub fn as_str(self) -> &'static str {
                match self {
                    $(Self::$variant => $text,)+
                }
            }

            pub fn parse(value: &str) -> TreasuryResult<Self> {
                match value.trim().to_ascii_lowercase().as_str() {
                    $($text => Ok(Self::$variant),)+
                    other => Err(TreasuryError::validation(format!(
                        "{} must be one of {}, got {other}",
                        stringify!($name),
                        [$($text),+].join(", ")
                    ))),
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ShiftType {
    Morning,
    Evening,
}

string_enum!(ShiftType { Morning => "morning", Evening => "evening" });

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ShiftStatus {
    Open,
    Closed,
}

string_enum!(ShiftStatus { Open => "open", Closed => "closed" });

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum DifferenceStatus {
    Surplus,
    Deficit,
}

string_enum!(DifferenceStatus { Surplus => "surplus", Deficit => "deficit" });

/// A bounded work session during which invoices are recorded against funds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Shift {
    pub id: Uuid,
    pub shift_type: ShiftType,
    pub status: ShiftStatus,
    pub open_time: DateTime<Utc>,
    pub close_time: Option<DateTime<Utc>>,
    pub employee: String,
    pub difference_status: Option<DifferenceStatus>,
    pub difference_value: Option<Decimal>,
    /// Net total of all funds at the moment the shift was closed.
    pub expected_total: Option<Decimal>,
    pub closed_by: Option<String>,
    pub version: i64,
}

impl Shift {
    pub fn open(shift_type: ShiftType, employee: &str, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            shift_type,
            status: ShiftStatus::Open,
            open_time: now,
            close_time: None,
            employee: employee.to_string(),
            difference_status: None,
            difference_value: None,
            expected_total: None,
            closed_by: None,
            version: 0,
        }
    }

    pub fn is_open(&self) -> bool {
        self.status == ShiftStatus::Open && self.close_time.is_none()
    }

    pub fn close(
        &mut self,
        difference_status: DifferenceStatus,
        difference_value: Decimal,
        expected_total: Decimal,
        closed_by: &str,
        now: DateTime<Utc>,
    ) -> TreasuryResult<()> {
        if !self.is_open() {
            return Err(TreasuryError::ShiftAlreadyClosed(self.id));
        }
        if difference_value < Decimal::ZERO {
            return Err(TreasuryError::validation(
                "difference amount must not be negative",
            ));
        }

        self.status = ShiftStatus::Closed;
        self.close_time = Some(now);
        self.difference_status = Some(difference_status);
        self.difference_value = Some(difference_value);
        self.expected_total = Some(expected_total);
        self.closed_by = Some(closed_by.to_string());
        Ok(())
    }

    /// Amount physically counted at close, derived from the recorded difference.
    pub fn counted_total(&self) -> Option<Decimal> {
        let expected = self.expected_total?;
        let difference = self.difference_value?;
        match self.difference_status? {
            DifferenceStatus::Surplus => Some(expected + difference),
            DifferenceStatus::Deficit => Some(expected - difference),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum FundType {
    Main,
    General,
    Booth,
    University,
}

string_enum!(FundType {
    Main => "main",
    General => "general",
    Booth => "booth",
    University => "university",
});

impl FundType {
    pub const ALL: [FundType; 4] = [
        FundType::Main,
        FundType::General,
        FundType::Booth,
        FundType::University,
    ];
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Fund {
    pub id: Uuid,
    pub fund_type: FundType,
    pub name: String,
    pub opening_balance: Decimal,
    pub current_balance: Decimal,
    pub last_update: DateTime<Utc>,
    pub version: i64,
}

impl Fund {
    pub fn new(fund_type: FundType, opening_balance: Decimal, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            fund_type,
            name: format!("{fund_type} fund"),
            opening_balance,
            current_balance: opening_balance,
            last_update: now,
            version: 0,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum InvoiceType {
    Income,
    Expense,
}

string_enum!(InvoiceType { Income => "income", Expense => "expense" });

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum InvoiceCategory {
    Direct,
    Products,
    Debt,
    Advance,
}

string_enum!(InvoiceCategory {
    Direct => "direct",
    Products => "products",
    Debt => "debt",
    Advance => "advance",
});

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum PaidStatus {
    Paid,
    Unpaid,
    Debt,
}

string_enum!(PaidStatus { Paid => "paid", Unpaid => "unpaid", Debt => "debt" });

impl PaidStatus {
    pub fn can_become(self, next: PaidStatus) -> bool {
        matches!(
            (self, next),
            (PaidStatus::Unpaid, PaidStatus::Paid)
                | (PaidStatus::Unpaid, PaidStatus::Debt)
                | (PaidStatus::Debt, PaidStatus::Paid)
        )
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum PartyKind {
    Customer,
    Employee,
}

string_enum!(PartyKind { Customer => "customer", Employee => "employee" });

/// Customer or employee a debt, advance or order belongs to.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PartyRef {
    pub kind: PartyKind,
    pub id: Uuid,
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LineItem {
    pub name: String,
    pub quantity: Decimal,
    pub unit_price: Decimal,
}

impl LineItem {
    pub fn line_total(&self) -> Decimal {
        self.quantity * self.unit_price
    }
}

pub fn items_total(items: &[LineItem]) -> Decimal {
    items.iter().map(LineItem::line_total).sum()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Invoice {
    pub id: Uuid,
    pub invoice_number: String,
    pub invoice_type: InvoiceType,
    pub invoice_category: InvoiceCategory,
    pub total_amount: Decimal,
    pub discount: Decimal,
    pub paid_status: PaidStatus,
    pub notes: Option<String>,
    pub fund_id: Uuid,
    pub shift_id: Option<Uuid>,
    pub employee_id: String,
    pub employee_name: String,
    pub items: Vec<LineItem>,
    pub tray_count: Option<i32>,
    pub is_break: bool,
    pub first_payment: Option<Decimal>,
    /// Amount that actually moved in or out of the fund.
    pub cash_amount: Decimal,
    pub party: Option<PartyRef>,
    pub debt_id: Option<Uuid>,
    pub order_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub version: i64,
}

impl Invoice {
    pub fn net_amount(&self) -> Decimal {
        self.total_amount - self.discount
    }

    /// Cash amount signed by direction: positive for income, negative for expense.
    pub fn signed_cash(&self) -> Decimal {
        match self.invoice_type {
            InvoiceType::Income => self.cash_amount,
            InvoiceType::Expense => -self.cash_amount,
        }
    }

    pub fn is_editable(&self) -> bool {
        self.paid_status == PaidStatus::Unpaid
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum TransferStatus {
    Pending,
    Confirmed,
    Rejected,
}

string_enum!(TransferStatus {
    Pending => "pending",
    Confirmed => "confirmed",
    Rejected => "rejected",
});

/// Request to move money between two funds, subject to approval.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transfer {
    pub id: Uuid,
    pub source_fund_id: Uuid,
    pub destination_fund_id: Uuid,
    pub amount: Decimal,
    pub notes: Option<String>,
    pub status: TransferStatus,
    pub requested_by: String,
    pub requested_at: DateTime<Utc>,
    pub decided_by: Option<String>,
    pub decided_at: Option<DateTime<Utc>>,
    pub rejection_reason: Option<String>,
    pub version: i64,
}

impl Transfer {
    pub fn request(
        source_fund_id: Uuid,
        destination_fund_id: Uuid,
        amount: Decimal,
        notes: Option<String>,
        requested_by: &str,
        now: DateTime<Utc>,
    ) -> TreasuryResult<Self> {
        if amount <= Decimal::ZERO {
            return Err(TreasuryError::validation("transfer amount must be positive"));
        }
        if source_fund_id == destination_fund_id {
            return Err(TreasuryError::validation(
                "transfer source and destination must differ",
            ));
        }

        Ok(Self {
            id: Uuid::new_v4(),
            source_fund_id,
            destination_fund_id,
            amount,
            notes: normalize_text(notes),
            status: TransferStatus::Pending,
            requested_by: requested_by.to_string(),
            requested_at: now,
            decided_by: None,
            decided_at: None,
            rejection_reason: None,
            version: 0,
        })
    }

    fn ensure_pending(&self) -> TreasuryResult<()> {
        if self.status != TransferStatus::Pending {
            return Err(TreasuryError::TransferAlreadyDecided {
                id: self.id,
                status: self.status.to_string(),
            });
        }
        Ok(())
    }

    pub fn confirm(&mut self, decided_by: &str, now: DateTime<Utc>) -> TreasuryResult<()> {
        self.ensure_pending()?;
        self.status = TransferStatus::Confirmed;
        self.decided_by = Some(decided_by.to_string());
        self.decided_at = Some(now);
        Ok(())
    }

    pub fn reject(
        &mut self,
        decided_by: &str,
        reason: &str,
        now: DateTime<Utc>,
    ) -> TreasuryResult<()> {
        self.ensure_pending()?;
        let reason = reason.trim();
        if reason.is_empty() {
            return Err(TreasuryError::validation("rejection reason is required"));
        }

        self.status = TransferStatus::Rejected;
        self.decided_by = Some(decided_by.to_string());
        self.decided_at = Some(now);
        self.rejection_reason = Some(reason.to_string());
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum DebtKind {
    Customer,
    Advance,
    Employee,
}

string_enum!(DebtKind {
    Customer => "customer",
    Advance => "advance",
    Employee => "employee",
});

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum DebtStatus {
    Active,
    Paid,
    Cancelled,
}

string_enum!(DebtStatus {
    Active => "active",
    Paid => "paid",
    Cancelled => "cancelled",
});

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DebtEntryKind {
    Payment,
    Discount,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DebtEntry {
    pub kind: DebtEntryKind,
    pub amount: Decimal,
    pub invoice_id: Option<Uuid>,
    pub notes: Option<String>,
    pub recorded_at: DateTime<Utc>,
}

/// Outstanding balance owed by a customer or employee.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Debt {
    pub id: Uuid,
    pub kind: DebtKind,
    pub party: PartyRef,
    pub total_amount: Decimal,
    pub paid_amount: Decimal,
    pub discount: Decimal,
    pub remaining_amount: Decimal,
    pub status: DebtStatus,
    pub last_payment_date: Option<DateTime<Utc>>,
    pub related_invoices: Vec<Uuid>,
    pub entries: Vec<DebtEntry>,
    pub cancel_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub version: i64,
}

impl Debt {
    pub fn open(
        kind: DebtKind,
        party: PartyRef,
        principal: Decimal,
        invoice_id: Uuid,
        now: DateTime<Utc>,
    ) -> TreasuryResult<Self> {
        if principal <= Decimal::ZERO {
            return Err(TreasuryError::validation("debt amount must be positive"));
        }

        Ok(Self {
            id: Uuid::new_v4(),
            kind,
            party,
            total_amount: principal,
            paid_amount: Decimal::ZERO,
            discount: Decimal::ZERO,
            remaining_amount: principal,
            status: DebtStatus::Active,
            last_payment_date: None,
            related_invoices: vec![invoice_id],
            entries: Vec::new(),
            cancel_reason: None,
            created_at: now,
            version: 0,
        })
    }

    fn ensure_active(&self) -> TreasuryResult<()> {
        if self.status != DebtStatus::Active {
            return Err(TreasuryError::InvalidTransition {
                entity: "debt",
                from: self.status.to_string(),
                to: "updated".to_string(),
            });
        }
        Ok(())
    }

    fn recompute(&mut self) {
        self.remaining_amount = self.total_amount - self.paid_amount - self.discount;
        if self.remaining_amount.is_zero() {
            self.status = DebtStatus::Paid;
        }
    }

    pub fn record_payment(
        &mut self,
        amount: Decimal,
        invoice_id: Uuid,
        now: DateTime<Utc>,
    ) -> TreasuryResult<()> {
        self.ensure_active()?;
        if amount <= Decimal::ZERO {
            return Err(TreasuryError::validation("payment amount must be positive"));
        }
        if amount > self.remaining_amount {
            return Err(TreasuryError::validation(format!(
                "payment {amount} exceeds remaining amount {}",
                self.remaining_amount
            )));
        }

        self.paid_amount += amount;
        self.last_payment_date = Some(now);
        self.related_invoices.push(invoice_id);
        self.entries.push(DebtEntry {
            kind: DebtEntryKind::Payment,
            amount,
            invoice_id: Some(invoice_id),
            notes: None,
            recorded_at: now,
        });
        self.recompute();
        Ok(())
    }

    /// Discounts must stay strictly below the remaining amount; full settlement goes
    /// through a payment.
    pub fn apply_discount(
        &mut self,
        amount: Decimal,
        notes: &str,
        now: DateTime<Utc>,
    ) -> TreasuryResult<()> {
        self.ensure_active()?;
        let notes = notes.trim();
        if notes.is_empty() {
            return Err(TreasuryError::validation("discount notes are required"));
        }
        if amount <= Decimal::ZERO {
            return Err(TreasuryError::validation("discount amount must be positive"));
        }
        if amount >= self.remaining_amount {
            return Err(TreasuryError::validation(format!(
                "discount must be less than the remaining amount {}",
                self.remaining_amount
            )));
        }

        self.discount += amount;
        self.entries.push(DebtEntry {
            kind: DebtEntryKind::Discount,
            amount,
            invoice_id: None,
            notes: Some(notes.to_string()),
            recorded_at: now,
        });
        self.recompute();
        Ok(())
    }

    pub fn cancel(&mut self, reason: &str) -> TreasuryResult<()> {
        self.ensure_active()?;
        let reason = reason.trim();
        if reason.is_empty() {
            return Err(TreasuryError::validation("cancel reason is required"));
        }
        if !self.paid_amount.is_zero() {
            return Err(TreasuryError::validation(
                "debts with recorded payments cannot be cancelled",
            ));
        }

        self.status = DebtStatus::Cancelled;
        self.cancel_reason = Some(reason.to_string());
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    Pending,
    Processing,
    Ready,
    Delivered,
    Cancelled,
}

string_enum!(OrderStatus {
    Pending => "pending",
    Processing => "processing",
    Ready => "ready",
    Delivered => "delivered",
    Cancelled => "cancelled",
});

impl OrderStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, OrderStatus::Delivered | OrderStatus::Cancelled)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    pub id: Uuid,
    pub order_number: String,
    pub customer: PartyRef,
    pub category_id: Option<Uuid>,
    pub items: Vec<LineItem>,
    pub total_amount: Decimal,
    pub status: OrderStatus,
    pub is_for_today: bool,
    pub scheduled_for: Option<DateTime<Utc>>,
    pub notes: Option<String>,
    pub invoice_id: Option<Uuid>,
    pub created_by: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub version: i64,
}

impl Order {
    pub fn is_converted(&self) -> bool {
        self.invoice_id.is_some()
    }
}

pub fn normalize_text(value: Option<String>) -> Option<String> {
    value
        .map(|text| text.trim().to_string())
        .filter(|text| !text.is_empty())
}

/// Short human-facing reference such as `INV-20260314-3F9A1C`.
pub fn document_number(prefix: &str, id: Uuid, now: DateTime<Utc>) -> String {
    let simple = id.simple().to_string();
    format!(
        "{prefix}-{}-{}",
        now.format("%Y%m%d"),
        simple[..6].to_ascii_uppercase()
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn customer() -> PartyRef {
        PartyRef {
            kind: PartyKind::Customer,
            id: Uuid::new_v4(),
            name: "Hadi".to_string(),
        }
    }

    #[test]
    fn closed_shift_cannot_close_again() {
        let now = Utc::now();
        let mut shift = Shift::open(ShiftType::Morning, "amal", now);
        assert!(shift.is_open());

        shift
            .close(
                DifferenceStatus::Deficit,
                Decimal::new(25, 0),
                Decimal::new(900, 0),
                "amal",
                now,
            )
            .unwrap();
        assert!(!shift.is_open());
        assert_eq!(shift.close_time, Some(now));
        assert_eq!(shift.counted_total(), Some(Decimal::new(875, 0)));

        let second =
            shift.close(DifferenceStatus::Surplus, Decimal::ZERO, Decimal::ZERO, "amal", now);
        assert!(matches!(second, Err(TreasuryError::ShiftAlreadyClosed(_))));
    }

    #[test]
    fn transfer_decisions_are_terminal() {
        let now = Utc::now();
        let mut transfer = Transfer::request(
            Uuid::new_v4(),
            Uuid::new_v4(),
            Decimal::new(500, 0),
            None,
            "omar",
            now,
        )
        .unwrap();

        assert!(transfer.reject("amal", "   ", now).is_err());
        assert_eq!(transfer.status, TransferStatus::Pending);

        transfer.reject("amal", "duplicate request", now).unwrap();
        assert_eq!(transfer.status, TransferStatus::Rejected);
        assert_eq!(transfer.rejection_reason.as_deref(), Some("duplicate request"));

        assert!(matches!(
            transfer.confirm("amal", now),
            Err(TreasuryError::TransferAlreadyDecided { .. })
        ));
        assert!(transfer.reject("amal", "again", now).is_err());
    }

    #[test]
    fn transfer_amount_must_be_positive() {
        let now = Utc::now();
        let fund = Uuid::new_v4();
        assert!(Transfer::request(fund, Uuid::new_v4(), Decimal::ZERO, None, "omar", now).is_err());
        assert!(Transfer::request(fund, fund, Decimal::ONE, None, "omar", now).is_err());
    }

    #[test]
    fn discount_must_stay_below_remaining() {
        let now = Utc::now();
        let mut debt = Debt::open(
            DebtKind::Customer,
            customer(),
            Decimal::new(1000, 0),
            Uuid::new_v4(),
            now,
        )
        .unwrap();

        assert!(debt.apply_discount(Decimal::new(1000, 0), "promo", now).is_err());
        assert!(debt.apply_discount(Decimal::ZERO, "promo", now).is_err());
        assert!(debt.apply_discount(Decimal::new(10, 0), "  ", now).is_err());

        debt.apply_discount(Decimal::new(999, 0), "promo", now).unwrap();
        assert_eq!(debt.remaining_amount, Decimal::ONE);
        assert_eq!(debt.status, DebtStatus::Active);
    }

    #[test]
    fn payment_to_zero_marks_debt_paid() {
        let now = Utc::now();
        let mut debt = Debt::open(
            DebtKind::Advance,
            customer(),
            Decimal::new(300, 0),
            Uuid::new_v4(),
            now,
        )
        .unwrap();

        assert!(debt.record_payment(Decimal::new(301, 0), Uuid::new_v4(), now).is_err());
        debt.record_payment(Decimal::new(100, 0), Uuid::new_v4(), now).unwrap();
        debt.apply_discount(Decimal::new(50, 0), "loyalty", now).unwrap();
        assert_eq!(debt.remaining_amount, Decimal::new(150, 0));

        debt.record_payment(Decimal::new(150, 0), Uuid::new_v4(), now).unwrap();
        assert_eq!(debt.status, DebtStatus::Paid);
        assert_eq!(debt.remaining_amount, Decimal::ZERO);
        assert_eq!(debt.related_invoices.len(), 3);
        assert!(debt.cancel("late").is_err());
    }

    #[test]
    fn paid_status_only_moves_forward() {
        assert!(PaidStatus::Unpaid.can_become(PaidStatus::Paid));
        assert!(PaidStatus::Debt.can_become(PaidStatus::Paid));
        assert!(!PaidStatus::Paid.can_become(PaidStatus::Unpaid));
        assert!(!PaidStatus::Paid.can_become(PaidStatus::Debt));
    }

    #[test]
    fn parses_enum_values_case_insensitively() {
        assert_eq!(ShiftType::parse(" Evening ").unwrap(), ShiftType::Evening);
        assert_eq!(FundType::parse("BOOTH").unwrap(), FundType::Booth);
        assert!(InvoiceType::parse("refund").is_err());
    }
}
