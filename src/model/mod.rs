pub mod api;
pub mod auth;
pub mod ballot;
pub mod candidate;
pub mod election;
pub mod event;
pub mod guard;
pub mod ledger;
pub mod mongodb;
pub mod pagination;
pub mod state;
pub mod store;
pub mod voter;
