//! Loan domain: models, submission service, read projections

pub mod model;
pub mod service;

pub use model::{
    CreateLoanRequest, CreateLoanResponse, Loan, LoanEvent, LoanEventPayload, LoanResponse,
    LoanStatus,
};
pub use service::LoanService;
