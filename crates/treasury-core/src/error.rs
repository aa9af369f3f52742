use rust_decimal::Decimal;
use thiserror::Error;
use uuid::Uuid;

use crate::access::Capability;

pub type TreasuryResult<T> = Result<T, TreasuryError>;

#[derive(Debug, Error)]
pub enum TreasuryError {
    #[error("{0}")]
    Validation(String),

    #[error("staff member {0} is not registered")]
    UnknownActor(String),

    #[error("{actor} is not allowed to {capability}")]
    Forbidden {
        actor: String,
        capability: Capability,
    },

    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: Uuid },

    #[error("no shift is open")]
    NoOpenShift,

    #[error("shift {0} is already open")]
    ShiftAlreadyOpen(Uuid),

    #[error("shift {0} is already closed")]
    ShiftAlreadyClosed(Uuid),

    #[error("transfer {id} was already {status}")]
    TransferAlreadyDecided { id: Uuid, status: String },

    #[error("{entity} cannot move from {from} to {to}")]
    InvalidTransition {
        entity: &'static str,
        from: String,
        to: String,
    },

    #[error("fund {fund_id} holds {available}, {requested} requested")]
    InsufficientFunds {
        fund_id: Uuid,
        available: Decimal,
        requested: Decimal,
    },

    #[error("{entity} {id} was modified concurrently, reload and retry")]
    Conflict { entity: &'static str, id: Uuid },

    #[error(transparent)]
    Storage(#[from] anyhow::Error),
}

impl TreasuryError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn not_found(entity: &'static str, id: Uuid) -> Self {
        Self::NotFound { entity, id }
    }
}
