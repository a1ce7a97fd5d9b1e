pub mod access;
pub mod customer;
pub mod event;
pub mod pickup;
