pub mod config;
pub mod contracts;
pub mod db;
pub mod redis_bus;

pub use config::ServiceConfig;
pub use contracts::{
    CurrentShiftResponse, DebtListQuery, FundLedgerQuery, InvoiceListQuery, ListResponse,
    OrderListQuery, ShiftListQuery, TransferListQuery,
};
pub use db::{PgTreasuryStore, connect_database, ensure_schema};
pub use redis_bus::{INVALIDATION_CHANNEL, RedisBus};
