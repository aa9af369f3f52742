use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use treasury_core::{Invoice, InvoiceType};

/// Fund ledger view filters. Search terms match notes, employee name or amount.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InvoiceFilter {
    pub search: Option<String>,
    pub invoice_type: Option<InvoiceType>,
    /// UTC calendar day the invoice was created on.
    pub date: Option<NaiveDate>,
}

impl InvoiceFilter {
    pub fn matches(&self, invoice: &Invoice) -> bool {
        if self
            .invoice_type
            .is_some_and(|invoice_type| invoice.invoice_type != invoice_type)
        {
            return false;
        }
        if self
            .date
            .is_some_and(|date| invoice.created_at.date_naive() != date)
        {
            return false;
        }

        let Some(term) = self
            .search
            .as_deref()
            .map(str::trim)
            .filter(|term| !term.is_empty())
        else {
            return true;
        };
        let term = term.to_lowercase();

        let notes_match = invoice
            .notes
            .as_deref()
            .is_some_and(|notes| notes.to_lowercase().contains(&term));
        let employee_match = invoice.employee_name.to_lowercase().contains(&term);
        let amount_match = [invoice.cash_amount, invoice.total_amount]
            .iter()
            .any(|amount| {
                amount.to_string().contains(&term) || amount.normalize().to_string().contains(&term)
            });

        notes_match || employee_match || amount_match
    }

    pub fn apply(&self, invoices: Vec<Invoice>) -> Vec<Invoice> {
        invoices
            .into_iter()
            .filter(|invoice| self.matches(invoice))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, Utc};
    use uuid::Uuid;

    use super::*;
    use crate::ledger::fixtures::invoice;

    #[test]
    fn search_is_case_insensitive_across_fields() {
        let fund = Uuid::new_v4();
        let now = Utc::now();
        let mut by_notes = invoice(fund, None, InvoiceType::Income, 10, now);
        by_notes.notes = Some("Wedding TRAYS deposit".to_string());
        let mut by_employee = invoice(fund, None, InvoiceType::Expense, 20, now);
        by_employee.employee_name = "Tariq".to_string();
        let by_amount = invoice(fund, None, InvoiceType::Income, 1500, now);

        let search = |term: &str| InvoiceFilter {
            search: Some(term.to_string()),
            ..InvoiceFilter::default()
        };

        assert!(search("trays").matches(&by_notes));
        assert!(!search("trays").matches(&by_employee));
        assert!(search("TARIQ").matches(&by_employee));
        assert!(search("150").matches(&by_amount));
        assert!(!search("150").matches(&by_notes));
        assert!(search("   ").matches(&by_notes));
    }

    #[test]
    fn type_and_date_narrow_the_search() {
        let fund = Uuid::new_v4();
        let now = Utc::now();
        let today = invoice(fund, None, InvoiceType::Income, 100, now);
        let yesterday = invoice(fund, None, InvoiceType::Income, 100, now - Duration::days(1));
        let expense = invoice(fund, None, InvoiceType::Expense, 100, now);

        let filter = InvoiceFilter {
            search: Some("100".to_string()),
            invoice_type: Some(InvoiceType::Income),
            date: Some(now.date_naive()),
        };

        let matched = filter.apply(vec![today.clone(), yesterday, expense]);
        assert_eq!(matched.len(), 1);
        assert_eq!(matched[0].id, today.id);
    }
}
