use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use treasury_core::commands::{ConvertOrder, NewInvoice, NewOrder};
use treasury_core::models::{document_number, normalize_text};
use treasury_core::{
    InvoiceCategory, InvoiceType, Order, OrderStatus, PaidStatus, TreasuryError, TreasuryResult,
    models::items_total,
};
use uuid::Uuid;

pub fn can_transition(from: OrderStatus, to: OrderStatus) -> bool {
    use OrderStatus::*;

    matches!(
        (from, to),
        (Pending, Processing)
            | (Processing, Ready)
            | (Ready, Delivered)
            | (Pending | Processing | Ready, Cancelled)
    )
}

pub fn create_order(
    command: &NewOrder,
    created_by: &str,
    now: DateTime<Utc>,
) -> TreasuryResult<Order> {
    if command.customer.name.trim().is_empty() {
        return Err(TreasuryError::validation("customer name is required"));
    }
    for item in &command.items {
        if item.quantity <= Decimal::ZERO {
            return Err(TreasuryError::validation("item quantity must be positive"));
        }
        if item.unit_price < Decimal::ZERO {
            return Err(TreasuryError::validation("item unit_price must not be negative"));
        }
    }

    let total_amount = command
        .total_amount
        .unwrap_or_else(|| items_total(&command.items));
    if total_amount < Decimal::ZERO {
        return Err(TreasuryError::validation("total_amount must not be negative"));
    }
    if !command.is_for_today && command.scheduled_for.is_none() {
        return Err(TreasuryError::validation(
            "orders not for today need a scheduled_for date",
        ));
    }

    let id = Uuid::new_v4();
    Ok(Order {
        id,
        order_number: document_number("ORD", id, now),
        customer: command.customer.clone(),
        category_id: command.category_id,
        items: command.items.clone(),
        total_amount,
        status: OrderStatus::Pending,
        is_for_today: command.is_for_today,
        scheduled_for: command.scheduled_for,
        notes: normalize_text(command.notes.clone()),
        invoice_id: None,
        created_by: created_by.to_string(),
        created_at: now,
        updated_at: now,
        version: 0,
    })
}

pub fn advance(order: &mut Order, next: OrderStatus, now: DateTime<Utc>) -> TreasuryResult<()> {
    if !can_transition(order.status, next) {
        return Err(TreasuryError::InvalidTransition {
            entity: "order",
            from: order.status.to_string(),
            to: next.to_string(),
        });
    }
    order.status = next;
    order.updated_at = now;
    Ok(())
}

/// Figures shown before an order is turned into an invoice. The service recomputes them
/// from the stored order, so a client copy is informational only.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct ConversionQuote {
    pub order_total: Decimal,
    pub discount: Decimal,
    pub additional_amount: Decimal,
    pub total_amount: Decimal,
    pub initial_payment: Decimal,
    pub remaining_amount: Decimal,
}

pub fn quote_conversion(order: &Order, request: &ConvertOrder) -> TreasuryResult<ConversionQuote> {
    if order.status == OrderStatus::Cancelled {
        return Err(TreasuryError::validation("cancelled orders cannot be invoiced"));
    }
    if order.is_converted() {
        return Err(TreasuryError::validation(format!(
            "order {} was already converted to an invoice",
            order.order_number
        )));
    }
    if request.discount < Decimal::ZERO {
        return Err(TreasuryError::validation("discount must not be negative"));
    }
    if request.additional_amount < Decimal::ZERO {
        return Err(TreasuryError::validation(
            "additional_amount must not be negative",
        ));
    }
    if request.tray_count.is_some_and(|count| count < 0) {
        return Err(TreasuryError::validation("tray_count must not be negative"));
    }
    if request.initial_payment.is_some() && !request.is_break {
        return Err(TreasuryError::validation(
            "initial_payment is only accepted for break conversions",
        ));
    }

    let total_amount = order.total_amount - request.discount + request.additional_amount;
    if total_amount < Decimal::ZERO {
        return Err(TreasuryError::validation(
            "discount must not exceed the order total",
        ));
    }

    let initial_payment = if request.is_break {
        let payment = request.initial_payment.unwrap_or(Decimal::ZERO);
        if payment < Decimal::ZERO {
            return Err(TreasuryError::validation(
                "initial_payment must not be negative",
            ));
        }
        if payment > total_amount {
            return Err(TreasuryError::validation(
                "initial_payment must not exceed the invoice total",
            ));
        }
        payment
    } else {
        total_amount
    };

    Ok(ConversionQuote {
        order_total: order.total_amount,
        discount: request.discount,
        additional_amount: request.additional_amount,
        total_amount,
        initial_payment,
        remaining_amount: total_amount - initial_payment,
    })
}

/// Builds the income invoice an order converts into.
pub fn conversion_invoice(
    order: &Order,
    request: &ConvertOrder,
    quote: &ConversionQuote,
    fund_id: Uuid,
) -> NewInvoice {
    let notes = normalize_text(request.notes.clone())
        .unwrap_or_else(|| format!("Order {}", order.order_number));

    NewInvoice {
        invoice_type: InvoiceType::Income,
        invoice_category: InvoiceCategory::Products,
        fund_id,
        total_amount: quote.order_total + quote.additional_amount,
        discount: quote.discount,
        paid_status: Some(PaidStatus::Paid),
        notes: Some(notes),
        employee_name: None,
        items: order.items.clone(),
        tray_count: request.tray_count,
        is_break: request.is_break,
        first_payment: request.is_break.then_some(quote.initial_payment),
        party: Some(order.customer.clone()),
        debt_id: None,
    }
}

#[cfg(test)]
mod tests {
    use treasury_core::{LineItem, PartyKind, PartyRef};

    use super::*;

    fn order(total: i64) -> Order {
        let command = NewOrder {
            customer: PartyRef {
                kind: PartyKind::Customer,
                id: Uuid::new_v4(),
                name: "Rana".to_string(),
            },
            category_id: None,
            items: vec![LineItem {
                name: "Kunafa tray".to_string(),
                quantity: Decimal::new(4, 0),
                unit_price: Decimal::new(total, 0) / Decimal::new(4, 0),
            }],
            total_amount: None,
            is_for_today: true,
            scheduled_for: None,
            notes: None,
        };
        create_order(&command, "amal", Utc::now()).unwrap()
    }

    #[test]
    fn order_total_defaults_to_item_sum() {
        let order = order(1000);
        assert_eq!(order.total_amount, Decimal::new(1000, 0));
        assert_eq!(order.status, OrderStatus::Pending);
        assert!(order.order_number.starts_with("ORD-"));
    }

    #[test]
    fn status_moves_forward_or_cancels() {
        let mut order = order(100);
        let now = Utc::now();

        assert!(advance(&mut order, OrderStatus::Ready, now).is_err());
        advance(&mut order, OrderStatus::Processing, now).unwrap();
        advance(&mut order, OrderStatus::Ready, now).unwrap();
        advance(&mut order, OrderStatus::Delivered, now).unwrap();
        assert!(advance(&mut order, OrderStatus::Cancelled, now).is_err());

        let mut other = self::order(100);
        advance(&mut other, OrderStatus::Cancelled, now).unwrap();
        assert!(advance(&mut other, OrderStatus::Processing, now).is_err());
    }

    #[test]
    fn break_conversion_splits_payment() {
        let order = order(1000);
        let request = ConvertOrder {
            tray_count: Some(4),
            discount: Decimal::new(100, 0),
            additional_amount: Decimal::new(50, 0),
            initial_payment: Some(Decimal::new(300, 0)),
            is_break: true,
            notes: None,
            fund_id: None,
        };

        let quote = quote_conversion(&order, &request).unwrap();
        assert_eq!(quote.total_amount, Decimal::new(950, 0));
        assert_eq!(quote.remaining_amount, Decimal::new(650, 0));

        let invoice = conversion_invoice(&order, &request, &quote, Uuid::new_v4());
        assert_eq!(invoice.total_amount, Decimal::new(1050, 0));
        assert_eq!(invoice.discount, Decimal::new(100, 0));
        assert_eq!(invoice.first_payment, Some(Decimal::new(300, 0)));
        assert_eq!(invoice.tray_count, Some(4));
    }

    #[test]
    fn conversion_rejects_bad_amounts() {
        let mut order = order(100);
        let mut request = ConvertOrder {
            discount: Decimal::new(150, 0),
            ..ConvertOrder::default()
        };
        assert!(quote_conversion(&order, &request).is_err());

        request.discount = Decimal::ZERO;
        request.initial_payment = Some(Decimal::new(10, 0));
        assert!(quote_conversion(&order, &request).is_err());

        request.is_break = true;
        request.initial_payment = Some(Decimal::new(-1, 0));
        assert!(quote_conversion(&order, &request).is_err());

        order.invoice_id = Some(Uuid::new_v4());
        request.initial_payment = None;
        assert!(quote_conversion(&order, &request).is_err());
    }
}
