use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use treasury_core::{
    DebtKind, DebtQuery, DebtStatus, InvoiceQuery, InvoiceType, OrderStatus, Shift,
    TransferStatus,
};
use treasury_finance::InvoiceFilter;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListResponse<T> {
    pub items: Vec<T>,
}

impl<T> From<Vec<T>> for ListResponse<T> {
    fn from(items: Vec<T>) -> Self {
        Self { items }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CurrentShiftResponse {
    pub shift: Option<Shift>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ShiftListQuery {
    pub limit: Option<usize>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FundLedgerQuery {
    pub search: Option<String>,
    pub invoice_type: Option<InvoiceType>,
    pub date: Option<NaiveDate>,
    pub page: Option<usize>,
    pub page_size: Option<usize>,
}

impl FundLedgerQuery {
    pub fn filter(&self) -> InvoiceFilter {
        InvoiceFilter {
            search: self.search.clone(),
            invoice_type: self.invoice_type,
            date: self.date,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InvoiceListQuery {
    pub fund_id: Option<Uuid>,
    pub shift_id: Option<Uuid>,
    pub debt_id: Option<Uuid>,
}

impl From<InvoiceListQuery> for InvoiceQuery {
    fn from(query: InvoiceListQuery) -> Self {
        InvoiceQuery {
            fund_id: query.fund_id,
            shift_id: query.shift_id,
            debt_id: query.debt_id,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TransferListQuery {
    pub status: Option<TransferStatus>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DebtListQuery {
    pub kind: Option<DebtKind>,
    pub status: Option<DebtStatus>,
}

impl From<DebtListQuery> for DebtQuery {
    fn from(query: DebtListQuery) -> Self {
        DebtQuery {
            kind: query.kind,
            status: query.status,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OrderListQuery {
    pub status: Option<OrderStatus>,
}
