//! Possible-conflict search façade: a query compiler over a
//! Solr-family nested-document engine, plus the update/sync/reindex
//! pipeline that keeps that engine's index current.

pub mod auth;
pub mod config;
pub mod error;
pub mod heartbeat;
pub mod models;
pub mod normalize;
pub mod reindex;
pub mod search;
pub mod server;
pub mod solr;
pub mod store;
pub mod sync;
