//! Collaborator adapters.

pub mod fees;
pub mod internal;

pub use fees::FlatFeeEstimator;
pub use internal::InternalLedgerAdapter;
