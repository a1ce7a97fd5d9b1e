pub mod access;
pub mod execution;
pub mod invoice_sync;
pub mod lookup;
pub mod reconcile;
pub mod scheduler;
