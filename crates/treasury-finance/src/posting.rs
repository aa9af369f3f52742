//! Decides how an invoice hits the ledger: the cash that moves through the fund and the
//! debt it opens or pays down.

use rust_decimal::Decimal;
use treasury_core::commands::NewInvoice;
use treasury_core::{
    Debt, DebtKind, DebtStatus, InvoiceCategory, InvoiceType, LineItem, PaidStatus, PartyKind,
    PartyRef, TreasuryError, TreasuryResult,
};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DebtEffect {
    None,
    Open {
        kind: DebtKind,
        party: PartyRef,
        principal: Decimal,
    },
    Repay {
        debt_id: Uuid,
        amount: Decimal,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PostingPlan {
    pub cash_amount: Decimal,
    pub paid_status: PaidStatus,
    pub debt_effect: DebtEffect,
}

fn validate_amounts(request: &NewInvoice) -> TreasuryResult<Decimal> {
    if request.total_amount < Decimal::ZERO {
        return Err(TreasuryError::validation("total_amount must not be negative"));
    }
    if request.discount < Decimal::ZERO {
        return Err(TreasuryError::validation("discount must not be negative"));
    }
    if request.discount > request.total_amount {
        return Err(TreasuryError::validation(
            "discount must not exceed total_amount",
        ));
    }
    if request.tray_count.is_some_and(|count| count < 0) {
        return Err(TreasuryError::validation("tray_count must not be negative"));
    }
    validate_items(&request.items)?;

    Ok(request.total_amount - request.discount)
}

/// Item checks shared by recording and editing an invoice.
pub fn validate_items(items: &[LineItem]) -> TreasuryResult<()> {
    for item in items {
        if item.name.trim().is_empty() {
            return Err(TreasuryError::validation("item name is required"));
        }
        if item.quantity <= Decimal::ZERO {
            return Err(TreasuryError::validation("item quantity must be positive"));
        }
        if item.unit_price < Decimal::ZERO {
            return Err(TreasuryError::validation("item unit_price must not be negative"));
        }
    }
    Ok(())
}

fn customer_party(request: &NewInvoice) -> TreasuryResult<PartyRef> {
    match &request.party {
        Some(party) if party.kind == PartyKind::Customer => Ok(party.clone()),
        Some(_) => Err(TreasuryError::validation(
            "customer debts must reference a customer",
        )),
        None => Err(TreasuryError::validation(
            "a customer is required when part of the invoice stays unpaid",
        )),
    }
}

/// `debt` must be the debt referenced by `request.debt_id`, when there is one.
pub fn plan_invoice(request: &NewInvoice, debt: Option<&Debt>) -> TreasuryResult<PostingPlan> {
    let net = validate_amounts(request)?;

    if request.first_payment.is_some() && !request.is_break {
        return Err(TreasuryError::validation(
            "first_payment is only accepted for break invoices",
        ));
    }

    if let Some(debt_id) = request.debt_id {
        return plan_repayment(request, debt_id, debt, net);
    }

    if request.is_break {
        return plan_break(request, net);
    }

    match (request.invoice_type, request.invoice_category) {
        (InvoiceType::Income, InvoiceCategory::Debt) => {
            if net <= Decimal::ZERO {
                return Err(TreasuryError::validation("credit sales must be positive"));
            }
            Ok(PostingPlan {
                cash_amount: Decimal::ZERO,
                paid_status: PaidStatus::Debt,
                debt_effect: DebtEffect::Open {
                    kind: DebtKind::Customer,
                    party: customer_party(request)?,
                    principal: net,
                },
            })
        }
        (InvoiceType::Income, InvoiceCategory::Advance) => Err(TreasuryError::validation(
            "advance repayments must reference a debt",
        )),
        (InvoiceType::Expense, InvoiceCategory::Advance) => {
            let party = request.party.clone().ok_or_else(|| {
                TreasuryError::validation("advances require a customer or employee")
            })?;
            if net <= Decimal::ZERO {
                return Err(TreasuryError::validation("advances must be positive"));
            }
            let kind = match party.kind {
                PartyKind::Customer => DebtKind::Advance,
                PartyKind::Employee => DebtKind::Employee,
            };
            Ok(PostingPlan {
                cash_amount: net,
                paid_status: PaidStatus::Paid,
                debt_effect: DebtEffect::Open {
                    kind,
                    party,
                    principal: net,
                },
            })
        }
        (InvoiceType::Expense, InvoiceCategory::Debt) => Err(TreasuryError::validation(
            "debt invoices must be income",
        )),
        (_, InvoiceCategory::Direct | InvoiceCategory::Products) => {
            let paid_status = request.paid_status.unwrap_or(PaidStatus::Paid);
            if paid_status == PaidStatus::Debt {
                return Err(TreasuryError::validation(
                    "use a debt category or break invoice to record a debt",
                ));
            }
            // Unpaid invoices move no money until they are settled.
            let cash_amount = match paid_status {
                PaidStatus::Unpaid => Decimal::ZERO,
                _ => net,
            };
            Ok(PostingPlan {
                cash_amount,
                paid_status,
                debt_effect: DebtEffect::None,
            })
        }
    }
}

fn plan_repayment(
    request: &NewInvoice,
    debt_id: Uuid,
    debt: Option<&Debt>,
    net: Decimal,
) -> TreasuryResult<PostingPlan> {
    if request.invoice_type != InvoiceType::Income
        || !matches!(
            request.invoice_category,
            InvoiceCategory::Debt | InvoiceCategory::Advance
        )
    {
        return Err(TreasuryError::validation(
            "debt repayments must be income invoices in the debt or advance category",
        ));
    }
    if request.is_break {
        return Err(TreasuryError::validation(
            "debt repayments cannot be break invoices",
        ));
    }

    let debt = debt
        .filter(|debt| debt.id == debt_id)
        .ok_or_else(|| TreasuryError::not_found("debt", debt_id))?;
    if debt.status != DebtStatus::Active {
        return Err(TreasuryError::validation(format!(
            "debt {debt_id} is {}",
            debt.status
        )));
    }
    if net <= Decimal::ZERO {
        return Err(TreasuryError::validation("repayment must be positive"));
    }
    if net > debt.remaining_amount {
        return Err(TreasuryError::validation(format!(
            "repayment {net} exceeds remaining amount {}",
            debt.remaining_amount
        )));
    }

    Ok(PostingPlan {
        cash_amount: net,
        paid_status: PaidStatus::Paid,
        debt_effect: DebtEffect::Repay {
            debt_id,
            amount: net,
        },
    })
}

fn plan_break(request: &NewInvoice, net: Decimal) -> TreasuryResult<PostingPlan> {
    if request.invoice_type != InvoiceType::Income {
        return Err(TreasuryError::validation("only income invoices can be split"));
    }
    let first_payment = request
        .first_payment
        .ok_or_else(|| TreasuryError::validation("first_payment is required for break invoices"))?;
    if first_payment < Decimal::ZERO {
        return Err(TreasuryError::validation("first_payment must not be negative"));
    }
    if first_payment > net {
        return Err(TreasuryError::validation(
            "first_payment must not exceed the invoice total",
        ));
    }

    let remainder = net - first_payment;
    if remainder.is_zero() {
        return Ok(PostingPlan {
            cash_amount: first_payment,
            paid_status: PaidStatus::Paid,
            debt_effect: DebtEffect::None,
        });
    }

    Ok(PostingPlan {
        cash_amount: first_payment,
        paid_status: PaidStatus::Debt,
        debt_effect: DebtEffect::Open {
            kind: DebtKind::Customer,
            party: customer_party(request)?,
            principal: remainder,
        },
    })
}
