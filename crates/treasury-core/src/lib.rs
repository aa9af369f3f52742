pub mod access;
pub mod commands;
pub mod error;
pub mod events;
pub mod models;
pub mod storage;

pub use access::{Actor, Capability, Role, StaffDirectory};
pub use error::{TreasuryError, TreasuryResult};
pub use events::{DomainEvent, DomainEventKind, Invalidation, Resource};
pub use models::{
    Debt, DebtEntry, DebtEntryKind, DebtKind, DebtStatus, DifferenceStatus, Fund, FundType,
    Invoice, InvoiceCategory, InvoiceType, LineItem, Order, OrderStatus, PaidStatus, PartyKind,
    PartyRef, Shift, ShiftStatus, ShiftType, Transfer, TransferStatus,
};
pub use storage::{
    ChangeNotifier, ChangeSet, DebtQuery, EventEnvelope, FundAdjustment, InvoiceQuery, Record,
    TreasuryStore, Write,
};
