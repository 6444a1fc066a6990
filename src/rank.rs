//! Deterministic ordering of eligible pieces
//!
//! Sources within a piece: type tag ascending, expiry descending (latest
//! expiring first), system id ascending. Pieces: coarse expiry of the last
//! source ascending, then piece CID ascending.

use std::cmp::Reverse;

use crate::types::{Piece, Source};

pub const DEFAULT_LIMIT: u64 = 128;

/// Sort key for a source inside its piece
pub fn source_key(s: &Source) -> (crate::types::SourceType, Reverse<i64>, &str) {
    (s.src_type(), Reverse(s.expiry_unix_nano()), s.sys_id())
}

/// Sort key for a piece whose sources are already ordered
pub fn piece_key(p: &Piece) -> (i64, &str) {
    let coarse = p.sources.last().map(Source::expiry_coarse).unwrap_or(i64::MAX);
    (coarse, p.piece_cid.as_str())
}

/// Ranked pieces plus the size of the list before truncation
#[derive(Debug, Clone)]
pub struct RankedPieces {
    pub pieces: Vec<Piece>,
    pub total: usize,
}

impl RankedPieces {
    pub fn truncated(&self) -> bool {
        self.total > self.pieces.len()
    }
}

/// Order sources and pieces, then cut the list to `limit`
pub fn rank(mut pieces: Vec<Piece>, limit: u64) -> RankedPieces {
    for p in pieces.iter_mut() {
        p.sources.sort_by(|a, b| source_key(a).cmp(&source_key(b)));
    }
    pieces.sort_by(|a, b| piece_key(a).cmp(&piece_key(b)));

    let total = pieces.len();
    let keep = usize::try_from(limit).unwrap_or(usize::MAX);
    pieces.truncate(keep);

    RankedPieces { pieces, total }
}

/// Note prepended to the info text when a listing was cut short
pub fn truncation_note(total: usize, limit: u64, follow_up_cmd: &str) -> String {
    format!(
        "NOTE: The complete list of {} entries has been TRUNCATED to the top {}.\n\
         You can use the 'limit' param in your API call to see the full (possibly very large) list:\n {}",
        total, limit, follow_up_cmd
    )
}
