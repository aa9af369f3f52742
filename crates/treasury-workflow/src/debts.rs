use chrono::Utc;
use serde_json::json;
use tracing::info;
use treasury_core::commands::{CancelDebt, DebtDiscount};
use treasury_core::{
    Actor, Capability, ChangeSet, Debt, DebtQuery, DomainEvent, DomainEventKind, Resource,
    TreasuryResult,
};
use uuid::Uuid;

use crate::TreasuryService;

impl TreasuryService {
    pub async fn debt(&self, id: Uuid) -> TreasuryResult<Debt> {
        self.require_debt(id).await
    }

    pub async fn debts(&self, query: &DebtQuery) -> TreasuryResult<Vec<Debt>> {
        self.store.debts(query).await
    }

    /// Forgives part of a debt. No money moves, so funds stay untouched.
    pub async fn discount_debt(
        &self,
        actor: &Actor,
        debt_id: Uuid,
        request: DebtDiscount,
    ) -> TreasuryResult<Debt> {
        actor.require(Capability::ManageDebts)?;

        let mut debt = self.require_debt(debt_id).await?;
        let now = Utc::now();
        debt.apply_discount(request.discount_amount, &request.notes, now)?;

        let mut changes = ChangeSet::new(now);
        changes.update(&mut debt);
        changes.record_event(DomainEvent::new(
            debt.id,
            DomainEventKind::DebtDiscounted,
            &actor.id,
            now,
            json!({
                "discount_amount": request.discount_amount,
                "notes": request.notes.trim(),
                "remaining_amount": debt.remaining_amount,
            }),
        ));
        self.commit(changes, &[Resource::Debts]).await?;

        info!(
            debt_id = %debt.id,
            discount = %request.discount_amount,
            remaining = %debt.remaining_amount,
            "debt discounted"
        );
        Ok(debt)
    }

    pub async fn cancel_debt(
        &self,
        actor: &Actor,
        debt_id: Uuid,
        request: CancelDebt,
    ) -> TreasuryResult<Debt> {
        actor.require(Capability::ManageDebts)?;

        let mut debt = self.require_debt(debt_id).await?;
        debt.cancel(&request.reason)?;

        let now = Utc::now();
        let mut changes = ChangeSet::new(now);
        changes.update(&mut debt);
        changes.record_event(DomainEvent::new(
            debt.id,
            DomainEventKind::DebtCancelled,
            &actor.id,
            now,
            json!({ "reason": debt.cancel_reason }),
        ));
        self.commit(changes, &[Resource::Debts]).await?;

        info!(debt_id = %debt.id, actor = %actor.id, "debt cancelled");
        Ok(debt)
    }
}
