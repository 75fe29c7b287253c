//! Invoicing domain module: sales documents that consume stock.
//!
//! This crate contains the document model and the validation half of the
//! commit state machine, implemented purely as deterministic domain logic
//! (no IO, no storage). Reservation and persistence live in the infra crate.

pub mod commit;
pub mod invoice;

pub use commit::{CommitAttempt, CommitState};
pub use invoice::{
    DocType, DocumentHeader, DocumentLine, DocumentRequest, InvoiceDocument, InvoiceSummary,
    LineRequest,
};
