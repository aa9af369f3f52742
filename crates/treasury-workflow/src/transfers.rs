use chrono::Utc;
use serde_json::json;
use tracing::info;
use treasury_core::commands::{NewTransfer, RejectTransfer};
use treasury_core::{
    Actor, Capability, ChangeSet, DomainEvent, DomainEventKind, Resource, Transfer,
    TransferStatus, TreasuryError, TreasuryResult,
};
use uuid::Uuid;

use crate::TreasuryService;

impl TreasuryService {
    /// Files a pending transfer. Without a destination the money goes to the main fund.
    pub async fn request_transfer(
        &self,
        actor: &Actor,
        request: NewTransfer,
    ) -> TreasuryResult<Transfer> {
        actor.require(Capability::RequestTransfer)?;

        let source = self.require_fund(request.source_fund_id).await?;
        let destination = match request.destination_fund_id {
            Some(id) => self.require_fund(id).await?,
            None => self.main_fund().await?,
        };

        let now = Utc::now();
        let transfer = Transfer::request(
            source.id,
            destination.id,
            request.amount,
            request.notes,
            &actor.id,
            now,
        )?;

        let mut changes = ChangeSet::new(now);
        changes.insert(transfer.clone());
        changes.record_event(DomainEvent::new(
            transfer.id,
            DomainEventKind::TransferRequested,
            &actor.id,
            now,
            json!({
                "source_fund_id": transfer.source_fund_id,
                "destination_fund_id": transfer.destination_fund_id,
                "amount": transfer.amount,
            }),
        ));
        self.commit(changes, &[Resource::Transfers]).await?;

        info!(
            transfer_id = %transfer.id,
            source = %source.fund_type,
            destination = %destination.fund_type,
            amount = %transfer.amount,
            "transfer requested"
        );
        Ok(transfer)
    }

    /// Moves the amount between the two funds atomically with the status change.
    pub async fn confirm_transfer(
        &self,
        actor: &Actor,
        transfer_id: Uuid,
    ) -> TreasuryResult<Transfer> {
        actor.require(Capability::DecideTransfer)?;

        let mut transfer = self.require_transfer(transfer_id).await?;
        let now = Utc::now();
        transfer.confirm(&actor.id, now)?;

        let mut changes = ChangeSet::new(now);
        changes.adjust_fund(transfer.source_fund_id, -transfer.amount, true);
        changes.adjust_fund(transfer.destination_fund_id, transfer.amount, false);
        changes.update(&mut transfer);
        changes.record_event(DomainEvent::new(
            transfer.id,
            DomainEventKind::TransferConfirmed,
            &actor.id,
            now,
            json!({ "amount": transfer.amount }),
        ));
        self.decide(changes, transfer_id).await?;

        info!(
            transfer_id = %transfer.id,
            amount = %transfer.amount,
            actor = %actor.id,
            "transfer confirmed"
        );
        Ok(transfer)
    }

    pub async fn reject_transfer(
        &self,
        actor: &Actor,
        transfer_id: Uuid,
        request: RejectTransfer,
    ) -> TreasuryResult<Transfer> {
        actor.require(Capability::DecideTransfer)?;

        let mut transfer = self.require_transfer(transfer_id).await?;
        let now = Utc::now();
        transfer.reject(&actor.id, &request.reason, now)?;

        let mut changes = ChangeSet::new(now);
        changes.update(&mut transfer);
        changes.record_event(DomainEvent::new(
            transfer.id,
            DomainEventKind::TransferRejected,
            &actor.id,
            now,
            json!({ "reason": transfer.rejection_reason }),
        ));
        self.decide(changes, transfer_id).await?;

        info!(transfer_id = %transfer.id, actor = %actor.id, "transfer rejected");
        Ok(transfer)
    }

    pub async fn transfer(&self, id: Uuid) -> TreasuryResult<Transfer> {
        self.require_transfer(id).await
    }

    pub async fn transfers(&self, status: Option<TransferStatus>) -> TreasuryResult<Vec<Transfer>> {
        self.store.transfers(status).await
    }

    /// A lost version race means someone else decided the transfer first.
    async fn decide(&self, changes: ChangeSet, transfer_id: Uuid) -> TreasuryResult<()> {
        match self
            .commit(changes, &[Resource::Transfers, Resource::Funds])
            .await
        {
            Err(TreasuryError::Conflict {
                entity: "transfer", ..
            }) => {
                let current = self.require_transfer(transfer_id).await?;
                Err(TreasuryError::TransferAlreadyDecided {
                    id: transfer_id,
                    status: current.status.to_string(),
                })
            }
            other => other,
        }
    }
}
