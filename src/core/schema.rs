// Static definition of the fields a recipe can carry.

use crate::core::fields::Recipe;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    FreeText,
    Enumerated,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecipeField {
    pub name: &'static str,
    pub default_value: &'static str,
    pub kind: FieldKind,
    pub allowed_values: &'static [&'static str],
}

impl RecipeField {
    const fn text(name: &'static str, default_value: &'static str) -> Self {
        Self {
            name,
            default_value,
            kind: FieldKind::FreeText,
            allowed_values: &[],
        }
    }

    const fn choice(
        name: &'static str,
        default_value: &'static str,
        allowed_values: &'static [&'static str],
    ) -> Self {
        Self {
            name,
            default_value,
            kind: FieldKind::Enumerated,
            allowed_values,
        }
    }

    /// Whether `value` is acceptable for this field.
    pub fn accepts(&self, value: &str) -> bool {
        match self.kind {
            FieldKind::FreeText => true,
            FieldKind::Enumerated => self.allowed_values.contains(&value),
        }
    }
}

/// Sensor generations, oldest to newest.
pub const ALL_SENSORS: &[&str] = &[
    "X-Trans I",
    "X-Trans II",
    "X-Trans III",
    "X-Trans IV",
    "X-Trans V",
];

const FILM_MODES: &[&str] = &[
    "Classic Chrome",
    "Eterna",
    "Classic Negative",
    "Reala ACE",
    "Nostalgic Neg",
    "Bleach Bypass",
    "PRO Neg Hi",
    "PRO Neg Std",
    "None",
    "F0/Standard (Provia)",
    "F1/Studio Portrait",
    "F1a/Studio Portrait Enhanced Saturation",
    "F1b/Studio Portrait Smooth Skin Tone (Astia)",
    "F1c/Studio Portrait Increased Sharpness",
    "F2/Fujichrome (Velvia)",
    "F3/Studio Portrait Ex",
    "F4/Velvia",
];

const STRENGTH: &[&str] = &["Off", "Weak", "Strong"];

const GRAIN_SIZE: &[&str] = &["Off", "Small", "Large"];

const WHITE_BALANCE: &[&str] = &[
    "Auto",
    "Daylight",
    "Shade",
    "Fluorescent",
    "Incandescent",
    "Kelvin",
    "Daylight Fluorescent",
];

const HIGHLIGHT_TONE: &[&str] = &[
    "-2 (soft)",
    "-1.5",
    "-1 (medium soft)",
    "-0.5",
    "0 (normal)",
    "0.5",
    "+0.5",
    "1.5",
    "+1 (medium hard)",
    "+2 (hard)",
    "2.5",
    "+2.5",
    "+3 (very hard)",
    "+3.5",
    "+4 (hardest)",
];

const SHADOW_TONE: &[&str] = &[
    "-2 (soft)",
    "-1.5",
    "-1 (medium soft)",
    "-0.5",
    "0 (normal)",
    "0.5",
    "+0.5",
    "1.5",
    "+1 (medium hard)",
    "+1.5",
    "+2 (hard)",
    "2.5",
    "+2.5",
    "+3 (very hard)",
    "+4 (hardest)",
];

const SATURATION: &[&str] = &[
    "-4 (lowest)",
    "-3 (very low)",
    "-2 (low)",
    "-1 (medium low)",
    "0 (normal)",
    "+0",
    "+1 (medium high)",
    "+2 (high)",
    "+3 (very high)",
    "+4 (highest)",
    "None (B&W)",
    "Acros",
    "Acros Green Filter",
    "Acros Red Filter",
    "Acros Yellow Filter",
    "B&W Green Filter",
    "B&W Red Filter",
    "B&W Sepia",
];

const SHARPNESS: &[&str] = &["Soft", "Normal", "Hard", "-0"];

const NOISE_REDUCTION: &[&str] = &[
    "-4 (weakest)",
    "-3 (very weak)",
    "-2 (weak)",
    "-1 (medium weak)",
    "0 (normal)",
    "+1 (medium strong)",
    "+2 (strong)",
    "+3 (very strong)",
    "+4 (strongest)",
];

static RECIPE_FIELDS: &[RecipeField] = &[
    RecipeField::text("Name", ""),
    RecipeField::choice("FilmMode", "None", FILM_MODES),
    RecipeField::choice("GrainEffectRoughness", "Off", STRENGTH),
    RecipeField::choice("GrainEffectSize", "Off", GRAIN_SIZE),
    RecipeField::choice("ColorChromeEffect", "Off", STRENGTH),
    RecipeField::choice("ColorChromeFXBlue", "Off", STRENGTH),
    RecipeField::choice("WhiteBalance", "Auto", WHITE_BALANCE),
    RecipeField::text("WhiteBalanceFineTune", "Red +0, Blue +0"),
    RecipeField::text("ColorTemperature", ""),
    RecipeField::text("DevelopmentDynamicRange", ""),
    RecipeField::choice("HighlightTone", "0 (normal)", HIGHLIGHT_TONE),
    RecipeField::choice("ShadowTone", "0 (normal)", SHADOW_TONE),
    RecipeField::choice("Saturation", "0 (normal)", SATURATION),
    RecipeField::choice("Sharpness", "Normal", SHARPNESS),
    RecipeField::choice("NoiseReduction", "0 (normal)", NOISE_REDUCTION),
    RecipeField::text("Clarity", "0"),
    RecipeField::choice("Sensor", "X-Trans V", ALL_SENSORS),
];

/// Every recognized recipe field, in declaration order.
pub fn fields() -> &'static [RecipeField] {
    RECIPE_FIELDS
}

pub fn field(name: &str) -> Option<&'static RecipeField> {
    RECIPE_FIELDS.iter().find(|f| f.name == name)
}

/// A fresh form: every field at its default, empty defaults left unset.
pub fn default_recipe() -> Recipe {
    RECIPE_FIELDS
        .iter()
        .filter(|f| !f.default_value.is_empty())
        .map(|f| (f.name, f.default_value))
        .collect()
}

/// Apply the form rules to user input: values are trimmed and blank fields
/// are dropped.
pub fn finalize_form(recipe: &mut Recipe) {
    for value in recipe.values_mut() {
        let trimmed = value.trim();
        if trimmed.len() != value.len() {
            *value = trimmed.to_string();
        }
    }
    recipe.retain(|_, v| !v.is_empty());
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_field_names_are_unique() {
        let names: HashSet<&str> = fields().iter().map(|f| f.name).collect();
        assert_eq!(names.len(), fields().len());
        assert_eq!(fields()[0].name, "Name");
    }

    #[test]
    fn test_enumerated_defaults_are_allowed() {
        for f in fields() {
            match f.kind {
                FieldKind::Enumerated => {
                    assert!(f.accepts(f.default_value), "{} default not allowed", f.name);
                }
                FieldKind::FreeText => assert!(f.allowed_values.is_empty()),
            }
        }
    }

    #[test]
    fn test_lookup_by_name() {
        let sensor = field("Sensor").unwrap();
        assert_eq!(sensor.kind, FieldKind::Enumerated);
        assert_eq!(sensor.allowed_values, ALL_SENSORS);
        assert!(sensor.accepts("X-Trans III"));
        assert!(!sensor.accepts("Bayer"));

        assert!(field("Exposure").is_none());
    }

    #[test]
    fn test_default_recipe_skips_empty_defaults() {
        let recipe = default_recipe();

        assert!(!recipe.contains_key("Name"));
        assert!(!recipe.contains_key("ColorTemperature"));
        assert!(!recipe.contains_key("DevelopmentDynamicRange"));
        assert_eq!(recipe.get("WhiteBalanceFineTune"), Some("Red +0, Blue +0"));
        assert_eq!(recipe.get("Sensor"), Some("X-Trans V"));
        assert_eq!(recipe.keys().next(), Some("FilmMode"));
    }

    #[test]
    fn test_finalize_form_trims_and_drops_blanks() {
        let mut recipe: Recipe = [("Name", "  Portra 400 "), ("Clarity", "   "), ("Sensor", "X-Trans IV")]
            .into_iter()
            .collect();

        finalize_form(&mut recipe);

        assert_eq!(recipe.name(), Some("Portra 400"));
        assert!(!recipe.contains_key("Clarity"));
        assert_eq!(recipe.len(), 2);
    }
}
