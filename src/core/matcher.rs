// Photo metadata to recipe matching.

use crate::core::catalog::Catalog;
use crate::core::fields::{Metadata, Recipe};
use crate::core::normalize::normalize_white_balance_fine_tune;
use std::collections::BTreeSet;

/// Fields never compared against photo metadata. They are identity fields,
/// not written to the file faithfully, or not a reliable signal.
pub const EXCLUDED_FIELDS: &[&str] = &[
    "Name",
    "FilmMode",
    "DevelopmentDynamicRange",
    "Sensor",
    "Clarity",
    "Sharpness",
];

pub fn is_excluded(field: &str) -> bool {
    EXCLUDED_FIELDS.contains(&field)
}

/// First recipe, in catalog order, whose every compared field equals the
/// photo's value for it.
///
/// `metadata` must already be in catalog units, see [`prepare_metadata`].
pub fn find_match_recipe<'a>(metadata: &Metadata, catalog: &'a Catalog) -> Option<&'a Recipe> {
    catalog.iter().find(|recipe| {
        recipe
            .iter()
            .filter(|(key, _)| !is_excluded(key))
            .all(|(key, value)| metadata.get(key) == Some(value))
    })
}

/// Name of the recipe [`find_match_recipe`] picks.
pub fn find_match<'a>(metadata: &Metadata, catalog: &'a Catalog) -> Option<&'a str> {
    find_match_recipe(metadata, catalog).and_then(|recipe| recipe.name())
}

/// Bring extracted values into catalog units.
pub fn prepare_metadata(metadata: &mut Metadata) {
    if let Some(raw) = metadata.get("WhiteBalanceFineTune") {
        let normalized = normalize_white_balance_fine_tune(raw);
        metadata.insert("WhiteBalanceFineTune", normalized);
    }
}

/// Every field name used by at least one stored recipe.
pub fn relevant_keys(catalog: &Catalog) -> BTreeSet<String> {
    catalog
        .iter()
        .flat_map(|recipe| recipe.keys())
        .map(str::to_string)
        .collect()
}
