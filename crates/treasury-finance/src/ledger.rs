use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use treasury_core::{Fund, FundType, Invoice, InvoiceType, Transfer, TransferStatus};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct LedgerTotals {
    pub total_income: Decimal,
    pub total_expense: Decimal,
    pub balance: Decimal,
}

pub fn compute_totals<'a>(invoices: impl IntoIterator<Item = &'a Invoice>) -> LedgerTotals {
    let mut totals = LedgerTotals::default();
    for invoice in invoices {
        match invoice.invoice_type {
            InvoiceType::Income => totals.total_income += invoice.cash_amount,
            InvoiceType::Expense => totals.total_expense += invoice.cash_amount,
        }
    }
    totals.balance = totals.total_income - totals.total_expense;
    totals
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FundSummary {
    pub fund_id: Uuid,
    pub fund_type: FundType,
    pub income_total: Decimal,
    pub expense_total: Decimal,
    pub net_total: Decimal,
    pub invoice_count: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ShiftSummary {
    pub shift_id: Uuid,
    pub fund_summaries: Vec<FundSummary>,
    pub total_net: Decimal,
}

/// Aggregates a shift's invoices per fund. Every fund is listed, with zeros when untouched.
pub fn summarize_shift(shift_id: Uuid, funds: &[Fund], invoices: &[Invoice]) -> ShiftSummary {
    let fund_summaries: Vec<FundSummary> = funds
        .iter()
        .map(|fund| {
            let fund_invoices: Vec<&Invoice> = invoices
                .iter()
                .filter(|invoice| {
                    invoice.fund_id == fund.id && invoice.shift_id == Some(shift_id)
                })
                .collect();
            let totals = compute_totals(fund_invoices.iter().copied());

            FundSummary {
                fund_id: fund.id,
                fund_type: fund.fund_type,
                income_total: totals.total_income,
                expense_total: totals.total_expense,
                net_total: totals.balance,
                invoice_count: fund_invoices.len(),
            }
        })
        .collect();

    let total_net = fund_summaries.iter().map(|summary| summary.net_total).sum();

    ShiftSummary {
        shift_id,
        fund_summaries,
        total_net,
    }
}

/// Balance a fund should hold given every invoice and transfer ever recorded.
pub fn derive_fund_balance(fund: &Fund, invoices: &[Invoice], transfers: &[Transfer]) -> Decimal {
    let invoice_net: Decimal = invoices
        .iter()
        .filter(|invoice| invoice.fund_id == fund.id)
        .map(Invoice::signed_cash)
        .sum();

    let transfer_net: Decimal = transfers
        .iter()
        .filter(|transfer| transfer.status == TransferStatus::Confirmed)
        .map(|transfer| {
            if transfer.destination_fund_id == fund.id {
                transfer.amount
            } else if transfer.source_fund_id == fund.id {
                -transfer.amount
            } else {
                Decimal::ZERO
            }
        })
        .sum();

    fund.opening_balance + invoice_net + transfer_net
}

#[cfg(test)]
pub(crate) mod fixtures {
    use chrono::{DateTime, Utc};
    use rust_decimal::Decimal;
    use treasury_core::{Invoice, InvoiceCategory, InvoiceType, PaidStatus};
    use uuid::Uuid;

    pub fn invoice(
        fund_id: Uuid,
        shift_id: Option<Uuid>,
        invoice_type: InvoiceType,
        amount: i64,
        created_at: DateTime<Utc>,
    ) -> Invoice {
        let id = Uuid::new_v4();
        Invoice {
            id,
            invoice_number: treasury_core::models::document_number("INV", id, created_at),
            invoice_type,
            invoice_category: InvoiceCategory::Direct,
            total_amount: Decimal::new(amount, 0),
            discount: Decimal::ZERO,
            paid_status: PaidStatus::Paid,
            notes: None,
            fund_id,
            shift_id,
            employee_id: "amal".to_string(),
            employee_name: "Amal".to_string(),
            items: Vec::new(),
            tray_count: None,
            is_break: false,
            first_payment: None,
            cash_amount: Decimal::new(amount, 0),
            party: None,
            debt_id: None,
            order_id: None,
            created_at,
            updated_at: created_at,
            version: 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::fixtures::invoice;
    use super::*;

    #[test]
    fn totals_split_income_and_expense() {
        let fund = Uuid::new_v4();
        let now = Utc::now();
        let invoices = vec![
            invoice(fund, None, InvoiceType::Income, 1500, now),
            invoice(fund, None, InvoiceType::Expense, 600, now),
        ];

        let totals = compute_totals(&invoices);

        assert_eq!(totals.total_income, Decimal::new(1500, 0));
        assert_eq!(totals.total_expense, Decimal::new(600, 0));
        assert_eq!(totals.balance, Decimal::new(900, 0));
    }

    #[test]
    fn balance_always_equals_income_minus_expense() {
        let fund = Uuid::new_v4();
        let now = Utc::now();
        let amounts = [0, 7, 250, 1999, 40, 3, 12_000];

        for split in 0..amounts.len() {
            let invoices: Vec<Invoice> = amounts
                .iter()
                .enumerate()
                .map(|(index, amount)| {
                    let kind = if index < split {
                        InvoiceType::Income
                    } else {
                        InvoiceType::Expense
                    };
                    invoice(fund, None, kind, *amount, now)
                })
                .collect();

            let totals = compute_totals(&invoices);
            assert!(totals.total_income >= Decimal::ZERO);
            assert!(totals.total_expense >= Decimal::ZERO);
            assert_eq!(totals.balance, totals.total_income - totals.total_expense);
        }

        assert_eq!(
            compute_totals(std::iter::empty::<&Invoice>()),
            LedgerTotals::default()
        );
    }

    #[test]
    fn shift_summary_lists_every_fund() {
        let now = Utc::now();
        let main = Fund::new(FundType::Main, Decimal::ZERO, now);
        let booth = Fund::new(FundType::Booth, Decimal::ZERO, now);
        let shift_id = Uuid::new_v4();
        let invoices = vec![
            invoice(booth.id, Some(shift_id), InvoiceType::Income, 800, now),
            invoice(booth.id, Some(shift_id), InvoiceType::Expense, 120, now),
            invoice(booth.id, Some(Uuid::new_v4()), InvoiceType::Income, 5000, now),
        ];

        let summary = summarize_shift(shift_id, &[main.clone(), booth.clone()], &invoices);

        assert_eq!(summary.fund_summaries.len(), 2);
        let main_summary = &summary.fund_summaries[0];
        assert_eq!(main_summary.invoice_count, 0);
        assert_eq!(main_summary.net_total, Decimal::ZERO);
        let booth_summary = &summary.fund_summaries[1];
        assert_eq!(booth_summary.invoice_count, 2);
        assert_eq!(booth_summary.net_total, Decimal::new(680, 0));
        assert_eq!(summary.total_net, Decimal::new(680, 0));
    }

    #[test]
    fn derived_balance_counts_only_confirmed_transfers() {
        let now = Utc::now();
        let main = Fund::new(FundType::Main, Decimal::new(1000, 0), now);
        let booth = Fund::new(FundType::Booth, Decimal::ZERO, now);
        let invoices = vec![
            invoice(booth.id, None, InvoiceType::Income, 700, now),
            invoice(booth.id, None, InvoiceType::Expense, 100, now),
        ];

        let mut confirmed =
            Transfer::request(booth.id, main.id, Decimal::new(500, 0), None, "omar", now).unwrap();
        confirmed.confirm("amal", now).unwrap();
        let pending =
            Transfer::request(booth.id, main.id, Decimal::new(50, 0), None, "omar", now).unwrap();
        let transfers = vec![confirmed, pending];

        assert_eq!(
            derive_fund_balance(&booth, &invoices, &transfers),
            Decimal::new(100, 0)
        );
        assert_eq!(
            derive_fund_balance(&main, &invoices, &transfers),
            Decimal::new(1500, 0)
        );
    }
}
