pub mod catalog;
pub mod duplicate;
pub mod exif;
pub mod fields;
pub mod matcher;
pub mod normalize;
pub mod schema;
pub mod settings;

pub use catalog::{Catalog, CatalogError, CatalogStore};
pub use duplicate::{DuplicateOutcome, Resolution, ResolutionChoice, find_duplicate};
pub use exif::{DumpMode, ExifError, ExifTool};
pub use fields::{FieldMap, Metadata, Recipe};
pub use matcher::{find_match, find_match_recipe, prepare_metadata, relevant_keys};
pub use normalize::normalize_white_balance_fine_tune;
pub use settings::{Settings, SettingsError, SettingsStore};
