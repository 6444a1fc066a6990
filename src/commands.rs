//! Sample shell commands embedded in responses

use crate::types::{trim_cid, ProviderId};

/// Renders the copy-paste commands handed back to storage providers
#[derive(Debug, Clone)]
pub struct CommandTemplate {
    api_base: String,
}

impl CommandTemplate {
    pub fn new(api_base: impl Into<String>) -> Self {
        let api_base = api_base.into().trim_end_matches('/').to_string();
        Self { api_base }
    }

    /// Authenticated API call for `provider`; `path` may carry a query string
    pub fn authed_request(&self, provider: &ProviderId, path: &str) -> String {
        format!(
            "curl -sLH \"Authorization: $( ./fil-spid.bash {} )\" '{}{}'",
            provider, self.api_base, path
        )
    }

    /// Request a deal for one piece
    pub fn request_piece(&self, provider: &ProviderId, piece_cid: &str) -> String {
        self.authed_request(provider, &format!("/request_piece/{}", piece_cid))
    }
}

/// Import the car file for an accepted proposal
pub fn import_data(proposal_cid: &str, piece_cid: &str, root_cid: &str) -> String {
    format!(
        "lotus-miner storage-deals import-data {} {}__{}.car",
        proposal_cid,
        trim_cid(piece_cid),
        trim_cid(root_cid),
    )
}
