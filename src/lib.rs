//! Deal Eligibility - replica arbitration for the evergreen dealer
//!
//! Storage providers ask which pieces they may request a renewal or new
//! replica deal for, and what their proposal pipeline looks like. Answers
//! are computed per request from the dealer database, which this service
//! only reads.
//!
//! ## Request flow
//!
//! ```text
//! HTTP (X-FIL-SPID, X-FIL-SPSIZE)
//!   -> structural eligibility (registered, not blocked, under ceiling)
//!   -> scope caps for the caller's placement (anywhere listing)
//!   -> candidate rows -> aggregation + quota filter -> ranking + limit
//!   -> envelope { response_code, info_lines, response }
//! ```
//!
//! ## Modules
//!
//! - `types` / `counts` - pieces, sources and replica count documents
//! - `caps` / `quota` - per-scope caps and the admission rule
//! - `aggregate` / `rank` - grouping candidate rows and ordering the result
//! - `proposals` - pending proposal report
//! - `deal_store` / `db` - the read-only data source
//! - `service` / `http` / `response` - request handling

pub mod aggregate;
pub mod caps;
pub mod commands;
pub mod config;
pub mod counts;
pub mod db;
pub mod deal_store;
pub mod error;
pub mod http;
pub mod proposals;
pub mod quota;
pub mod rank;
pub mod response;
pub mod service;
pub mod types;

// Re-exports
pub use config::Config;
pub use db::SqlDealStore;
pub use deal_store::{
    CandidateQuery, CandidateRow, DealStore, ListingScope, ProposalRow, ProviderStanding,
};
pub use error::{EligibilityError, Result};
pub use http::HttpServer;
pub use proposals::ProposalReport;
pub use service::{Caller, EligibilityService, Listing};
pub use types::{Piece, ProviderId, Source, SourceType};
