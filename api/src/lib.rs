//! Loan API library
//!
//! Exports the core modules of the loan-origination service.

pub mod config;
pub mod db;
pub mod error;
pub mod handlers;
pub mod loan;
pub mod publisher;
pub mod routes;
pub mod state;
