//! String action tags for routing lifecycle events through tag-based buses.
//!
//! A tag has the form `RDE/<collection>/<KIND>_<PHASE>`, e.g.
//! `RDE/users/READ_MANY_START`.

use crate::types::{OperationKind, Phase};

/// Leading segment of every tag.
pub const TAG_PREFIX: &str = "RDE";

/// Builds the tag for `kind` entering `phase` in `collection`.
pub fn format_tag(collection: &str, kind: OperationKind, phase: Phase) -> String {
    format!("{TAG_PREFIX}/{collection}/{kind}_{phase}")
}

/// Recovers `(kind, phase)` from a tag of `collection`. Anything that is not
/// exactly such a tag yields `None`.
pub fn parse_tag(collection: &str, tag: &str) -> Option<(OperationKind, Phase)> {
    let parsed = ActionTag::parse(tag)?;
    (parsed.collection == collection).then_some((parsed.kind, parsed.phase))
}

/// A parsed tag, including the collection it belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ActionTag<'a> {
    /// Collection segment.
    pub collection: &'a str,
    /// Operation kind.
    pub kind: OperationKind,
    /// Lifecycle phase.
    pub phase: Phase,
}

impl<'a> ActionTag<'a> {
    /// Parses a tag of any collection.
    pub fn parse(tag: &'a str) -> Option<Self> {
        let rest = tag.strip_prefix(TAG_PREFIX)?.strip_prefix('/')?;
        let (collection, action) = rest.split_once('/')?;
        if collection.is_empty() {
            return None;
        }
        // kind names contain underscores, phase names do not
        let (kind, phase) = action.rsplit_once('_')?;
        Some(Self {
            collection,
            kind: kind.parse().ok()?,
            phase: phase.parse().ok()?,
        })
    }
}
