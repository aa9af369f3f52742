use chrono::Utc;
use serde_json::json;
use tracing::{info, warn};
use treasury_core::commands::{CloseShift, OpenShift};
use treasury_core::{
    Actor, Capability, ChangeSet, DomainEvent, DomainEventKind, InvoiceQuery, Resource, Shift,
    TreasuryError, TreasuryResult,
};
use treasury_finance::{ShiftSummary, summarize_shift};
use uuid::Uuid;

use crate::TreasuryService;

const CLOSE_ATTEMPTS: usize = 3;

const SHIFT_RESOURCES: [Resource; 4] = [
    Resource::Shifts,
    Resource::Invoices,
    Resource::CurrentInvoices,
    Resource::Funds,
];

impl TreasuryService {
    pub async fn open_shift(&self, actor: &Actor, request: OpenShift) -> TreasuryResult<Shift> {
        actor.require(Capability::OpenShift)?;

        if let Some(open) = self.store.open_shift().await? {
            warn!(shift_id = %open.id, actor = %actor.id, "shift already open");
            return Err(TreasuryError::ShiftAlreadyOpen(open.id));
        }

        let now = Utc::now();
        let shift = Shift::open(request.shift_type, &actor.id, now);

        let mut changes = ChangeSet::new(now);
        changes.insert(shift.clone());
        changes.record_event(DomainEvent::new(
            shift.id,
            DomainEventKind::ShiftOpened,
            &actor.id,
            now,
            json!({ "shift_type": shift.shift_type }),
        ));
        self.commit(changes, &SHIFT_RESOURCES).await?;

        info!(
            shift_id = %shift.id,
            shift_type = %shift.shift_type,
            actor = %actor.id,
            "shift opened"
        );
        Ok(shift)
    }

    pub async fn current_shift(&self) -> TreasuryResult<Option<Shift>> {
        self.store.open_shift().await
    }

    pub async fn shift(&self, id: Uuid) -> TreasuryResult<Shift> {
        self.require_shift(id).await
    }

    pub async fn shifts(&self, limit: usize) -> TreasuryResult<Vec<Shift>> {
        self.store.shifts(limit.clamp(1, 200)).await
    }

    pub async fn shift_summary(&self, shift_id: Uuid) -> TreasuryResult<ShiftSummary> {
        self.require_shift(shift_id).await?;

        let funds = self.store.funds().await?;
        let invoices = self
            .store
            .invoices(&InvoiceQuery {
                shift_id: Some(shift_id),
                ..InvoiceQuery::default()
            })
            .await?;

        Ok(summarize_shift(shift_id, &funds, &invoices))
    }

    /// Closing is terminal. A second close, sequential or concurrent, is refused. An invoice
    /// committed while the summary is computed forces the summary to be recomputed.
    pub async fn close_shift(
        &self,
        actor: &Actor,
        shift_id: Uuid,
        request: CloseShift,
    ) -> TreasuryResult<Shift> {
        actor.require(Capability::CloseShift)?;

        for attempt in 1..=CLOSE_ATTEMPTS {
            let mut shift = self.require_shift(shift_id).await?;
            if !shift.is_open() {
                return Err(TreasuryError::ShiftAlreadyClosed(shift_id));
            }

            let summary = self.shift_summary(shift_id).await?;
            let now = Utc::now();
            shift.close(request.status, request.amount, summary.total_net, &actor.id, now)?;

            let mut changes = ChangeSet::new(now);
            changes.update(&mut shift);
            changes.record_event(DomainEvent::new(
                shift.id,
                DomainEventKind::ShiftClosed,
                &actor.id,
                now,
                json!({
                    "difference_status": request.status,
                    "difference_value": request.amount,
                    "expected_total": summary.total_net,
                }),
            ));

            match self.commit(changes, &SHIFT_RESOURCES).await {
                Ok(()) => {
                    info!(
                        shift_id = %shift.id,
                        difference_status = %request.status,
                        difference_value = %request.amount,
                        expected_total = %summary.total_net,
                        "shift closed"
                    );
                    return Ok(shift);
                }
                Err(TreasuryError::Conflict { entity: "shift", .. }) => {
                    warn!(shift_id = %shift_id, attempt, "shift changed while closing");
                }
                Err(err) => return Err(err),
            }
        }

        Err(TreasuryError::Conflict {
            entity: "shift",
            id: shift_id,
        })
    }
}
