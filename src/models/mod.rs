//! Shared data models: the possible-conflict document pair, the
//! query-builder's internal request shape, and the HTTP API's JSON
//! DTOs.

pub mod api;
pub mod domain;
pub mod query_params;
pub mod search_history;
pub mod solr_doc;
pub mod synonym;
pub mod user;

pub use api::*;
pub use domain::{Name, PossibleConflict, SourceType};
pub use query_params::{DocSide, FullQueryBoost, QueryField, QueryParams};
pub use search_history::SearchHistory;
pub use solr_doc::{EventStatus, EventType, SolrDoc, SolrDocEvent};
pub use synonym::{SynonymEntry, SynonymType};
pub use user::{Role, User};
