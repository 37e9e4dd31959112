//! API-compatible types.
//!
//! The types in this module are what routes accept and return. Derived values
//! such as the election phase are computed against the ledger clock when a view
//! is built.

pub mod ballot;
pub mod candidate;
pub mod election;
pub mod ledger;
pub mod voter;
