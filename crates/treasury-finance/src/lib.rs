pub mod ledger;
pub mod pagination;
pub mod posting;
pub mod search;

pub use ledger::{
    FundSummary, LedgerTotals, ShiftSummary, compute_totals, derive_fund_balance, summarize_shift,
};
pub use pagination::{DEFAULT_PAGE_SIZE, Page, paginate};
pub use posting::{DebtEffect, PostingPlan, plan_invoice, validate_items};
pub use search::InvoiceFilter;
