//! Loan BFF library
//!
//! Exports the consumer and configuration modules.

pub mod config;
pub mod consumer;
