// Duplicate detection for candidate recipes.
//
// A candidate can collide with the catalog in two independent ways: by name
// (same identity) or by content (same settings under another name). The
// caller picks a resolution from the choices each outcome allows.

use crate::core::catalog::Catalog;
use crate::core::fields::{NAME_FIELD, Recipe};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DuplicateOutcome {
    /// No collision.
    None,
    /// A stored recipe already uses the candidate's name.
    NameOnly,
    /// A stored recipe with another name has identical settings.
    ContentOnly(String),
    /// The name is taken and the named recipe holds identical settings.
    Both(String),
}

/// What the user decided to do about a collision.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    Overwrite,
    KeepBoth,
    Rename(String),
    Cancel,
}

/// A resolution the user may pick for a given outcome, before any new name
/// is entered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolutionChoice {
    Overwrite,
    KeepBoth,
    NewName,
    Cancel,
}

impl ResolutionChoice {
    pub fn label(self) -> &'static str {
        match self {
            ResolutionChoice::Overwrite => "Overwrite",
            ResolutionChoice::KeepBoth => "Keep Both",
            ResolutionChoice::NewName => "New Name",
            ResolutionChoice::Cancel => "Cancel",
        }
    }
}

impl DuplicateOutcome {
    pub fn is_conflict(&self) -> bool {
        !matches!(self, DuplicateOutcome::None)
    }

    /// The resolutions offered for this outcome, in display order.
    pub fn choices(&self) -> &'static [ResolutionChoice] {
        match self {
            DuplicateOutcome::None => &[],
            DuplicateOutcome::NameOnly | DuplicateOutcome::Both(_) => &[
                ResolutionChoice::Overwrite,
                ResolutionChoice::NewName,
                ResolutionChoice::Cancel,
            ],
            DuplicateOutcome::ContentOnly(_) => &[
                ResolutionChoice::KeepBoth,
                ResolutionChoice::NewName,
                ResolutionChoice::Cancel,
            ],
        }
    }

    /// User-facing description of the collision.
    pub fn describe(&self, candidate_name: &str) -> String {
        match self {
            DuplicateOutcome::None => format!("Recipe '{candidate_name}' is new."),
            DuplicateOutcome::NameOnly => {
                format!("Recipe name '{candidate_name}' already exists.")
            }
            DuplicateOutcome::ContentOnly(existing) => {
                format!("Identical content already exists as '{existing}'.")
            }
            DuplicateOutcome::Both(_) => {
                format!("Recipe '{candidate_name}' already exists with identical content.")
            }
        }
    }
}

/// Check `candidate` against every stored recipe for name and content
/// collisions.
pub fn find_duplicate(candidate: &Recipe, catalog: &Catalog) -> DuplicateOutcome {
    let name_exists = candidate
        .name()
        .is_some_and(|name| catalog.contains(name));

    match (name_exists, find_duplicate_content(candidate, catalog)) {
        (true, Some(existing)) => DuplicateOutcome::Both(existing.to_string()),
        (true, None) => DuplicateOutcome::NameOnly,
        (false, Some(existing)) => DuplicateOutcome::ContentOnly(existing.to_string()),
        (false, None) => DuplicateOutcome::None,
    }
}

/// Name of the first stored recipe whose non-`Name` fields are exactly the
/// candidate's: same field set, same values.
pub fn find_duplicate_content<'a>(candidate: &Recipe, catalog: &'a Catalog) -> Option<&'a str> {
    catalog
        .iter()
        .find(|existing| same_content(candidate, existing))
        .and_then(|existing| existing.name())
}

fn same_content(candidate: &Recipe, existing: &Recipe) -> bool {
    let candidate_fields_match = candidate
        .iter()
        .filter(|(key, _)| *key != NAME_FIELD)
        .all(|(key, value)| existing.get(key) == Some(value));

    let no_extra_fields = existing
        .keys()
        .filter(|key| *key != NAME_FIELD)
        .all(|key| candidate.contains_key(key));

    candidate_fields_match && no_extra_fields
}

#[cfg(test)]
mod tests {
    use super::*;

    fn recipe(pairs: &[(&str, &str)]) -> Recipe {
        pairs.iter().copied().collect()
    }

    fn catalog() -> Catalog {
        Catalog::from(vec![recipe(&[("Name", "A"), ("X", "1"), ("Y", "2")])])
    }

    #[test]
    fn test_content_only() {
        let candidate = recipe(&[("Name", "B"), ("X", "1"), ("Y", "2")]);
        assert_eq!(
            find_duplicate(&candidate, &catalog()),
            DuplicateOutcome::ContentOnly("A".to_string())
        );
    }

    #[test]
    fn test_name_only() {
        let candidate = recipe(&[("Name", "A"), ("X", "9")]);
        assert_eq!(find_duplicate(&candidate, &catalog()), DuplicateOutcome::NameOnly);
    }

    #[test]
    fn test_both() {
        let candidate = recipe(&[("Name", "A"), ("X", "1"), ("Y", "2")]);
        assert_eq!(
            find_duplicate(&candidate, &catalog()),
            DuplicateOutcome::Both("A".to_string())
        );
    }

    #[test]
    fn test_field_sets_must_match_exactly() {
        let missing_field = recipe(&[("Name", "B"), ("X", "1")]);
        assert_eq!(find_duplicate(&missing_field, &catalog()), DuplicateOutcome::None);

        let extra_field = recipe(&[("Name", "B"), ("X", "1"), ("Y", "2"), ("Z", "3")]);
        assert_eq!(find_duplicate(&extra_field, &catalog()), DuplicateOutcome::None);
    }

    #[test]
    fn test_first_content_match_wins() {
        let catalog = Catalog::from(vec![
            recipe(&[("Name", "First"), ("X", "1")]),
            recipe(&[("Name", "Second"), ("X", "1")]),
        ]);
        let candidate = recipe(&[("Name", "Third"), ("X", "1")]);

        assert_eq!(find_duplicate_content(&candidate, &catalog), Some("First"));
    }

    #[test]
    fn test_choices_follow_outcome() {
        assert!(DuplicateOutcome::None.choices().is_empty());
        assert!(!DuplicateOutcome::None.is_conflict());

        assert_eq!(
            DuplicateOutcome::NameOnly.choices(),
            &[
                ResolutionChoice::Overwrite,
                ResolutionChoice::NewName,
                ResolutionChoice::Cancel
            ]
        );
        assert_eq!(
            DuplicateOutcome::ContentOnly("A".into()).choices()[0],
            ResolutionChoice::KeepBoth
        );
        assert_eq!(ResolutionChoice::KeepBoth.label(), "Keep Both");
    }
}
