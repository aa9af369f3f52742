use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde_json::json;
use tracing::info;
use treasury_core::commands::{InvoiceChanges, InvoiceStatusChange, NewInvoice};
use treasury_core::models::{document_number, normalize_text};
use treasury_core::{
    Actor, Capability, ChangeSet, Debt, DebtKind, DebtStatus, DomainEvent, DomainEventKind,
    Invoice, InvoiceQuery, InvoiceType, PaidStatus, PartyKind, Resource, Shift, TreasuryError,
    TreasuryResult,
};
use treasury_finance::{DebtEffect, plan_invoice, validate_items};
use uuid::Uuid;

use crate::TreasuryService;

pub(crate) const INVOICE_RESOURCES: [Resource; 4] = [
    Resource::Invoices,
    Resource::CurrentInvoices,
    Resource::Funds,
    Resource::Debts,
];

impl TreasuryService {
    pub async fn record_invoice(
        &self,
        actor: &Actor,
        request: NewInvoice,
    ) -> TreasuryResult<Invoice> {
        actor.require(Capability::RecordInvoice)?;

        let shift = self.store.open_shift().await?.ok_or(TreasuryError::NoOpenShift)?;
        let now = Utc::now();
        let mut changes = ChangeSet::new(now);
        let invoice = self
            .stage_invoice(actor, &shift, &request, None, now, &mut changes)
            .await?;
        self.commit(changes, &INVOICE_RESOURCES).await?;

        info!(
            invoice_id = %invoice.id,
            invoice_number = %invoice.invoice_number,
            invoice_type = %invoice.invoice_type,
            category = %invoice.invoice_category,
            cash_amount = %invoice.cash_amount,
            "invoice recorded"
        );
        Ok(invoice)
    }

    /// Stages an invoice, its fund movement and any debt it opens or pays down.
    pub(crate) async fn stage_invoice(
        &self,
        actor: &Actor,
        shift: &Shift,
        request: &NewInvoice,
        order_id: Option<Uuid>,
        now: DateTime<Utc>,
        changes: &mut ChangeSet,
    ) -> TreasuryResult<Invoice> {
        let fund = self.require_fund(request.fund_id).await?;
        let debt = match request.debt_id {
            Some(debt_id) => self.store.debt(debt_id).await?,
            None => None,
        };
        let plan = plan_invoice(request, debt.as_ref())?;

        let id = Uuid::new_v4();
        let mut invoice = Invoice {
            id,
            invoice_number: document_number("INV", id, now),
            invoice_type: request.invoice_type,
            invoice_category: request.invoice_category,
            total_amount: request.total_amount,
            discount: request.discount,
            paid_status: plan.paid_status,
            notes: normalize_text(request.notes.clone()),
            fund_id: fund.id,
            shift_id: Some(shift.id),
            employee_id: actor.id.clone(),
            employee_name: normalize_text(request.employee_name.clone())
                .unwrap_or_else(|| actor.id.clone()),
            items: request.items.clone(),
            tray_count: request.tray_count,
            is_break: request.is_break,
            first_payment: request.first_payment,
            cash_amount: plan.cash_amount,
            party: request.party.clone(),
            debt_id: request.debt_id,
            order_id,
            created_at: now,
            updated_at: now,
            version: 0,
        };

        match plan.debt_effect {
            DebtEffect::None => {}
            DebtEffect::Open {
                kind,
                party,
                principal,
            } => {
                let debt = Debt::open(kind, party, principal, invoice.id, now)?;
                invoice.debt_id = Some(debt.id);
                changes.record_event(DomainEvent::new(
                    debt.id,
                    DomainEventKind::DebtOpened,
                    &actor.id,
                    now,
                    json!({ "kind": debt.kind, "principal": principal, "invoice_id": invoice.id }),
                ));
                changes.insert(debt);
            }
            DebtEffect::Repay { debt_id, amount } => {
                let mut debt = debt.ok_or_else(|| TreasuryError::not_found("debt", debt_id))?;
                debt.record_payment(amount, invoice.id, now)?;
                changes.record_event(DomainEvent::new(
                    debt.id,
                    DomainEventKind::DebtPaymentRecorded,
                    &actor.id,
                    now,
                    json!({
                        "amount": amount,
                        "invoice_id": invoice.id,
                        "remaining_amount": debt.remaining_amount,
                    }),
                ));
                changes.update(&mut debt);
            }
        }

        changes.require_open_shift = Some(shift.id);
        changes.adjust_fund(fund.id, invoice.signed_cash(), false);
        changes.record_event(DomainEvent::new(
            invoice.id,
            DomainEventKind::InvoiceRecorded,
            &actor.id,
            now,
            json!({
                "invoice_type": invoice.invoice_type,
                "category": invoice.invoice_category,
                "fund_id": invoice.fund_id,
                "cash_amount": invoice.cash_amount,
            }),
        ));
        changes.insert(invoice.clone());

        Ok(invoice)
    }

    /// Only unpaid invoices of a still-open shift can change. Unpaid invoices hold no cash,
    /// so edits never move money.
    pub async fn update_invoice(
        &self,
        actor: &Actor,
        invoice_id: Uuid,
        request: InvoiceChanges,
    ) -> TreasuryResult<Invoice> {
        actor.require(Capability::RecordInvoice)?;

        let mut invoice = self.require_invoice(invoice_id).await?;
        if !invoice.is_editable() {
            return Err(TreasuryError::validation(format!(
                "invoice {} is {} and can no longer change",
                invoice.invoice_number, invoice.paid_status
            )));
        }
        self.ensure_shift_open(&invoice).await?;

        let total_amount = request.total_amount.unwrap_or(invoice.total_amount);
        let discount = request.discount.unwrap_or(invoice.discount);
        if total_amount < Decimal::ZERO {
            return Err(TreasuryError::validation("total_amount must not be negative"));
        }
        if discount < Decimal::ZERO || discount > total_amount {
            return Err(TreasuryError::validation(
                "discount must be between zero and total_amount",
            ));
        }
        if invoice.debt_id.is_some()
            && (total_amount != invoice.total_amount || discount != invoice.discount)
        {
            return Err(TreasuryError::validation(
                "amounts of invoices tied to a debt cannot change",
            ));
        }
        if let Some(items) = &request.items {
            validate_items(items)?;
        }

        invoice.total_amount = total_amount;
        invoice.discount = discount;
        if let Some(items) = request.items {
            invoice.items = items;
        }
        if request.notes.is_some() {
            invoice.notes = normalize_text(request.notes);
        }
        let now = Utc::now();
        invoice.updated_at = now;

        let mut changes = ChangeSet::new(now);
        changes.require_open_shift = invoice.shift_id;
        changes.update(&mut invoice);
        changes.record_event(DomainEvent::new(
            invoice.id,
            DomainEventKind::InvoiceUpdated,
            &actor.id,
            now,
            json!({
                "total_amount": invoice.total_amount,
                "discount": invoice.discount,
            }),
        ));
        self.commit(changes, &INVOICE_RESOURCES).await?;

        Ok(invoice)
    }

    /// Paying an unpaid invoice posts its net amount to the fund within its shift. Turning it
    /// into a debt opens a customer debt instead. A debt invoice becomes paid once its debt
    /// is settled through repayments.
    pub async fn set_invoice_status(
        &self,
        actor: &Actor,
        invoice_id: Uuid,
        request: InvoiceStatusChange,
    ) -> TreasuryResult<Invoice> {
        actor.require(Capability::RecordInvoice)?;

        let mut invoice = self.require_invoice(invoice_id).await?;
        let previous = invoice.paid_status;
        if !previous.can_become(request.paid_status) {
            return Err(TreasuryError::InvalidTransition {
                entity: "invoice",
                from: previous.to_string(),
                to: request.paid_status.to_string(),
            });
        }

        let now = Utc::now();
        let mut changes = ChangeSet::new(now);
        match (previous, request.paid_status) {
            (PaidStatus::Unpaid, PaidStatus::Paid) => {
                self.ensure_shift_open(&invoice).await?;
                invoice.cash_amount = invoice.net_amount();
                changes.require_open_shift = invoice.shift_id;
                changes.adjust_fund(invoice.fund_id, invoice.signed_cash(), false);
            }
            (PaidStatus::Unpaid, PaidStatus::Debt) => {
                if invoice.invoice_type != InvoiceType::Income {
                    return Err(TreasuryError::validation(
                        "only income invoices can turn into a debt",
                    ));
                }
                let party = request
                    .party
                    .or_else(|| invoice.party.clone())
                    .filter(|party| party.kind == PartyKind::Customer)
                    .ok_or_else(|| {
                        TreasuryError::validation("a customer is required to open a debt")
                    })?;
                let debt = Debt::open(
                    DebtKind::Customer,
                    party.clone(),
                    invoice.net_amount(),
                    invoice.id,
                    now,
                )?;
                invoice.debt_id = Some(debt.id);
                invoice.party = Some(party);
                changes.record_event(DomainEvent::new(
                    debt.id,
                    DomainEventKind::DebtOpened,
                    &actor.id,
                    now,
                    json!({
                        "kind": debt.kind,
                        "principal": debt.total_amount,
                        "invoice_id": invoice.id,
                    }),
                ));
                changes.insert(debt);
            }
            (PaidStatus::Debt, PaidStatus::Paid) => {
                if let Some(debt_id) = invoice.debt_id {
                    let debt = self.require_debt(debt_id).await?;
                    if debt.status != DebtStatus::Paid {
                        return Err(TreasuryError::validation(format!(
                            "debt {debt_id} still has {} outstanding",
                            debt.remaining_amount
                        )));
                    }
                }
            }
            _ => {}
        }

        invoice.paid_status = request.paid_status;
        invoice.updated_at = now;
        changes.update(&mut invoice);
        changes.record_event(DomainEvent::new(
            invoice.id,
            DomainEventKind::InvoiceStatusChanged,
            &actor.id,
            now,
            json!({ "from": previous, "to": request.paid_status }),
        ));
        self.commit(changes, &INVOICE_RESOURCES).await?;

        info!(
            invoice_id = %invoice.id,
            from = %previous,
            to = %invoice.paid_status,
            cash_amount = %invoice.cash_amount,
            "invoice status changed"
        );
        Ok(invoice)
    }

    async fn ensure_shift_open(&self, invoice: &Invoice) -> TreasuryResult<()> {
        if let Some(shift_id) = invoice.shift_id {
            let shift = self.require_shift(shift_id).await?;
            if !shift.is_open() {
                return Err(TreasuryError::validation(format!(
                    "invoice {} belongs to a closed shift",
                    invoice.invoice_number
                )));
            }
        }
        Ok(())
    }

    pub async fn invoice(&self, id: Uuid) -> TreasuryResult<Invoice> {
        self.require_invoice(id).await
    }

    pub async fn invoices(&self, query: &InvoiceQuery) -> TreasuryResult<Vec<Invoice>> {
        self.store.invoices(query).await
    }

    /// Invoices of the open shift; empty when no shift is open.
    pub async fn current_invoices(&self) -> TreasuryResult<Vec<Invoice>> {
        let Some(shift) = self.store.open_shift().await? else {
            return Ok(Vec::new());
        };

        self.store
            .invoices(&InvoiceQuery {
                shift_id: Some(shift.id),
                ..InvoiceQuery::default()
            })
            .await
    }
}
