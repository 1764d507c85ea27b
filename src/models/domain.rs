//! The `PossibleConflict` / `Name` parent-child document pair.
//!
//! These mirror the nested Solr documents the engine indexes: a
//! `PossibleConflict` is the parent (one per name-reservation or
//! corporation), and each `Name` is a child that carries a
//! denormalized copy of the parent's identity fields so child-rooted
//! searches never need a join on the client.

use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

/// Source of a possible-conflict record: a name reservation or an
/// incorporated business.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SourceType {
    Nr,
    Corp,
}

impl SourceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceType::Nr => "NR",
            SourceType::Corp => "CORP",
        }
    }
}

/// A child `Name` document, denormalized from its parent.
///
/// `id`, and the `parent_*` fields, are populated by
/// [`PossibleConflict::new`] and must not be set independently —
/// names have no identity of their own (see spec invariant I2).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Name {
    /// Synthesized as `"{parent_id}-name-{index}"`; `None` until the
    /// name has been attached to a parent.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub name: String,
    /// Lifecycle code for this name submission (e.g. "A", "C",
    /// "CORP"). Kept as a plain string rather than a closed enum: the
    /// canonical code list is itself an open question and
    /// is supplied by the registry the document came from.
    pub name_state: String,
    /// Ordinal choice for NR submissions (1st choice, 2nd choice, …).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub choice: Option<u32>,
    #[serde(default)]
    pub submit_count: u32,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_jurisdiction: Option<String>,
    #[serde(
        skip_serializing_if = "Option::is_none",
        with = "time::serde::rfc3339::option",
        default
    )]
    pub parent_start_date: Option<OffsetDateTime>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_state: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_type: Option<SourceType>,
}

impl Name {
    /// Construct a bare name submission; parent denormalization is
    /// filled in later by [`PossibleConflict::new`].
    pub fn new(name: impl Into<String>, name_state: impl Into<String>) -> Self {
        Self {
            id: None,
            name: name.into(),
            name_state: name_state.into(),
            choice: None,
            submit_count: 0,
            parent_id: None,
            parent_jurisdiction: None,
            parent_start_date: None,
            parent_state: None,
            parent_type: None,
        }
    }
}

/// The parent "possible conflict" document: either a name reservation
/// or an incorporated business, with its submitted child names.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PossibleConflict {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nr_num: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub corp_num: Option<String>,
    #[serde(rename = "type")]
    pub source_type: SourceType,
    pub jurisdiction: String,
    /// Lifecycle state of the parent record. See the note on
    /// `Name::name_state` above — the canonical code list is
    /// configuration, not a hardcoded enum.
    pub state: String,
    #[serde(with = "time::serde::rfc3339")]
    pub start_date: OffsetDateTime,
    pub names: Vec<Name>,
}

impl PossibleConflict {
    /// Build a `PossibleConflict`, enforcing invariant I1 (id equals
    /// `nr_num` xor `corp_num` depending on `source_type`) and then
    /// denormalizing every child `Name` (invariants I2/P8).
    pub fn new(
        nr_num: Option<String>,
        corp_num: Option<String>,
        source_type: SourceType,
        jurisdiction: impl Into<String>,
        state: impl Into<String>,
        start_date: OffsetDateTime,
        names: Vec<Name>,
    ) -> Result<Self> {
        match (source_type, &nr_num, &corp_num) {
            (SourceType::Nr, Some(_), None) => {}
            (SourceType::Corp, None, Some(_)) => {}
            _ => bail!(
                "possible conflict must set exactly one of nr_num/corp_num matching its type"
            ),
        }

        let mut conflict = Self {
            nr_num,
            corp_num,
            source_type,
            jurisdiction: jurisdiction.into(),
            state: state.into(),
            start_date,
            names,
        };
        conflict.denormalize();
        Ok(conflict)
    }

    /// The canonical entity id: `nr_num` when `type == NR`, else
    /// `corp_num` (invariant I1).
    pub fn id(&self) -> &str {
        match self.source_type {
            SourceType::Nr => self.nr_num.as_deref().unwrap_or_default(),
            SourceType::Corp => self.corp_num.as_deref().unwrap_or_default(),
        }
    }

    /// Re-stamp every child `Name` with the parent's denormalized
    /// fields and a stable positional child id. Idempotent: calling
    /// this twice produces the same result, since child ids are
    /// derived purely from the parent id and position.
    pub fn denormalize(&mut self) {
        let parent_id = self.id().to_string();
        for (index, name) in self.names.iter_mut().enumerate() {
            name.id = Some(format!("{parent_id}-name-{index}"));
            name.parent_id = Some(parent_id.clone());
            name.parent_jurisdiction = Some(self.jurisdiction.clone());
            name.parent_start_date = Some(self.start_date);
            name.parent_state = Some(self.state.clone());
            name.parent_type = Some(self.source_type);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_date() -> OffsetDateTime {
        OffsetDateTime::from_unix_timestamp(1_700_000_000).unwrap()
    }

    #[test]
    fn rejects_mismatched_identity() {
        let err = PossibleConflict::new(
            None,
            None,
            SourceType::Nr,
            "BC",
            "ACTIVE",
            sample_date(),
            vec![],
        )
        .unwrap_err();
        assert!(err.to_string().contains("exactly one"));
    }

    #[test]
    fn denormalizes_children_on_construction() {
        let conflict = PossibleConflict::new(
            Some("NR1234567".to_string()),
            None,
            SourceType::Nr,
            "BC",
            "APPROVED",
            sample_date(),
            vec![
                Name::new("Acme Holdings", "A"),
                Name::new("Acme Holdings Ltd", "C"),
            ],
        )
        .unwrap();

        assert_eq!(conflict.id(), "NR1234567");
        assert_eq!(conflict.names[0].id.as_deref(), Some("NR1234567-name-0"));
        assert_eq!(conflict.names[1].id.as_deref(), Some("NR1234567-name-1"));
        for name in &conflict.names {
            assert_eq!(name.parent_id.as_deref(), Some("NR1234567"));
            assert_eq!(name.parent_jurisdiction.as_deref(), Some("BC"));
            assert_eq!(name.parent_state.as_deref(), Some("APPROVED"));
            assert_eq!(name.parent_type, Some(SourceType::Nr));
        }
    }

    #[test]
    fn reindexing_after_reorder_rewrites_child_ids() {
        let mut conflict = PossibleConflict::new(
            Some("NR1234567".to_string()),
            None,
            SourceType::Nr,
            "BC",
            "APPROVED",
            sample_date(),
            vec![Name::new("First Choice", "A"), Name::new("Second Choice", "A")],
        )
        .unwrap();

        conflict.names.swap(0, 1);
        conflict.denormalize();

        assert_eq!(conflict.names[0].name, "Second Choice");
        assert_eq!(conflict.names[0].id.as_deref(), Some("NR1234567-name-0"));
    }
}
