pub mod account;
pub mod api;
pub mod memory;
pub mod postgres;
pub mod registry;
