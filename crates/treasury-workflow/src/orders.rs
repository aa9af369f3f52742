use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::info;
use treasury_core::commands::{ConvertOrder, NewOrder, OrderStatusChange};
use treasury_core::{
    Actor, Capability, ChangeSet, DomainEvent, DomainEventKind, Invoice, Order, OrderStatus,
    Resource, TreasuryError, TreasuryResult,
};
use treasury_orders::{ConversionQuote, advance, conversion_invoice, create_order, quote_conversion};
use uuid::Uuid;

use crate::TreasuryService;
use crate::invoices::INVOICE_RESOURCES;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderConversion {
    pub order: Order,
    pub invoice: Invoice,
    pub quote: ConversionQuote,
}

impl TreasuryService {
    pub async fn create_order(&self, actor: &Actor, request: NewOrder) -> TreasuryResult<Order> {
        actor.require(Capability::ManageOrders)?;

        let now = Utc::now();
        let order = create_order(&request, &actor.id, now)?;

        let mut changes = ChangeSet::new(now);
        changes.insert(order.clone());
        changes.record_event(DomainEvent::new(
            order.id,
            DomainEventKind::OrderCreated,
            &actor.id,
            now,
            json!({ "order_number": order.order_number, "total_amount": order.total_amount }),
        ));
        self.commit(changes, &[Resource::Orders]).await?;

        info!(order_id = %order.id, order_number = %order.order_number, "order created");
        Ok(order)
    }

    pub async fn order(&self, id: Uuid) -> TreasuryResult<Order> {
        self.require_order(id).await
    }

    pub async fn orders(&self, status: Option<OrderStatus>) -> TreasuryResult<Vec<Order>> {
        self.store.orders(status).await
    }

    pub async fn advance_order(
        &self,
        actor: &Actor,
        order_id: Uuid,
        request: OrderStatusChange,
    ) -> TreasuryResult<Order> {
        actor.require(Capability::ManageOrders)?;

        let mut order = self.require_order(order_id).await?;
        let previous = order.status;
        let now = Utc::now();
        advance(&mut order, request.status, now)?;

        let mut changes = ChangeSet::new(now);
        changes.update(&mut order);
        changes.record_event(DomainEvent::new(
            order.id,
            DomainEventKind::OrderStatusChanged,
            &actor.id,
            now,
            json!({ "from": previous, "to": order.status }),
        ));
        self.commit(changes, &[Resource::Orders]).await?;

        Ok(order)
    }

    pub async fn quote_order_conversion(
        &self,
        order_id: Uuid,
        request: &ConvertOrder,
    ) -> TreasuryResult<ConversionQuote> {
        let order = self.require_order(order_id).await?;
        quote_conversion(&order, request)
    }

    /// Turns an order into an income invoice in the open shift. The invoice, any debt for
    /// the unpaid remainder and the order link are written together.
    pub async fn convert_order(
        &self,
        actor: &Actor,
        order_id: Uuid,
        request: ConvertOrder,
    ) -> TreasuryResult<OrderConversion> {
        actor.require(Capability::ManageOrders)?;
        actor.require(Capability::RecordInvoice)?;

        let mut order = self.require_order(order_id).await?;
        let quote = quote_conversion(&order, &request)?;
        let shift = self
            .store
            .open_shift()
            .await?
            .ok_or(TreasuryError::NoOpenShift)?;
        let fund_id = match request.fund_id {
            Some(id) => id,
            None => self.main_fund().await?.id,
        };

        let now = Utc::now();
        let mut changes = ChangeSet::new(now);
        let new_invoice = conversion_invoice(&order, &request, &quote, fund_id);
        let invoice = self
            .stage_invoice(actor, &shift, &new_invoice, Some(order.id), now, &mut changes)
            .await?;

        order.invoice_id = Some(invoice.id);
        order.updated_at = now;
        changes.update(&mut order);
        changes.record_event(DomainEvent::new(
            order.id,
            DomainEventKind::OrderConverted,
            &actor.id,
            now,
            json!({
                "invoice_id": invoice.id,
                "total_amount": quote.total_amount,
                "initial_payment": quote.initial_payment,
                "remaining_amount": quote.remaining_amount,
            }),
        ));

        let mut resources = INVOICE_RESOURCES.to_vec();
        resources.push(Resource::Orders);
        self.commit(changes, &resources)
            .await
            .map_err(|err| match err {
                TreasuryError::Conflict { entity: "order", .. } => TreasuryError::validation(
                    format!("order {} was already converted to an invoice", order.order_number),
                ),
                other => other,
            })?;

        info!(
            order_id = %order.id,
            invoice_id = %invoice.id,
            cash_amount = %invoice.cash_amount,
            remaining = %quote.remaining_amount,
            "order converted"
        );
        Ok(OrderConversion {
            order,
            invoice,
            quote,
        })
    }
}
