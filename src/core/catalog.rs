use crate::core::duplicate::{DuplicateOutcome, Resolution, find_duplicate};
use crate::core::fields::{NAME_FIELD, Recipe};
use crate::core::normalize::normalize_white_balance_fine_tune;
use quick_xml::Reader as XmlReader;
use quick_xml::Writer as XmlWriter;
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

const DEFAULT_ROOT: &str = "root";
const PROFILE_TAG: &str = "profile";
const WHITE_BALANCE_FINE_TUNE: &str = "WhiteBalanceFineTune";

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("Malformed catalog {}: {reason}", .path.display())]
    Malformed { path: PathBuf, reason: String },

    #[error("Recipe '{name}' not found")]
    NotFound { name: String },

    #[error("Failed to persist catalog {}: {reason}", .path.display())]
    Persistence { path: PathBuf, reason: String },

    #[error("Recipe name is required")]
    MissingName,

    #[error("Invalid recipe name '{name}': {reason}")]
    InvalidName { name: String, reason: String },

    #[error("Invalid field name '{field}'")]
    InvalidField { field: String },

    #[error("IO error on {}: {source}", .path.display())]
    Io { path: PathBuf, source: io::Error },
}

/// All stored recipes, in file order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct Catalog {
    recipes: Vec<Recipe>,
}

impl From<Vec<Recipe>> for Catalog {
    fn from(recipes: Vec<Recipe>) -> Self {
        Self { recipes }
    }
}

impl Catalog {
    /// First recipe stored under `name`.
    pub fn get(&self, name: &str) -> Option<&Recipe> {
        self.recipes.iter().find(|r| r.name() == Some(name))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.recipes.iter().filter_map(|r| r.name())
    }

    pub fn iter(&self) -> impl Iterator<Item = &Recipe> {
        self.recipes.iter()
    }

    pub fn len(&self) -> usize {
        self.recipes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.recipes.is_empty()
    }

    /// Number of recipes per sensor generation. Recipes without a sensor are
    /// not counted.
    pub fn sensor_counts(&self) -> BTreeMap<&str, usize> {
        let mut counts = BTreeMap::new();
        for sensor in self.recipes.iter().filter_map(|r| r.get("Sensor")) {
            if !sensor.is_empty() {
                *counts.entry(sensor).or_insert(0) += 1;
            }
        }
        counts
    }

    /// Recipes whose name or any value contains `query`, ignoring case.
    pub fn search(&self, query: &str) -> Vec<&Recipe> {
        let query = query.trim().to_lowercase();
        if query.is_empty() {
            return self.recipes.iter().collect();
        }
        self.recipes
            .iter()
            .filter(|r| r.iter().any(|(_, v)| v.to_lowercase().contains(&query)))
            .collect()
    }

    /// Recipes whose `Sensor` is one of `active`.
    pub fn filter_sensors<'a, S: AsRef<str>>(&'a self, active: &[S]) -> Vec<&'a Recipe> {
        self.recipes
            .iter()
            .filter(|r| {
                let sensor = r.get("Sensor").unwrap_or_default();
                active.iter().any(|s| s.as_ref() == sensor)
            })
            .collect()
    }
}

/// One `WhiteBalanceFineTune` rewrite performed by a unit migration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WhiteBalanceChange {
    pub name: String,
    pub before: String,
    pub after: String,
}

/// A child of the root element.
enum Node {
    /// Source text kept exactly as read. `recipe` is set for named profiles.
    Kept {
        source: String,
        recipe: Option<Recipe>,
    },
    /// Profile added or changed since reading, written from its fields.
    Written(Recipe),
}

impl Node {
    fn recipe(&self) -> Option<&Recipe> {
        match self {
            Node::Kept { recipe, .. } => recipe.as_ref(),
            Node::Written(recipe) => Some(recipe),
        }
    }
}

/// Catalog file as read from disk.
struct Document {
    root: String,
    nodes: Vec<Node>,
}

impl Document {
    fn recipes(&self) -> impl Iterator<Item = &Recipe> {
        self.nodes.iter().filter_map(Node::recipe)
    }

    /// Index in `nodes` of the first profile named `name`.
    fn position(&self, name: &str) -> Option<usize> {
        self.nodes
            .iter()
            .position(|node| node.recipe().is_some_and(|r| r.name() == Some(name)))
    }
}

/// File-backed recipe catalog.
///
/// Every call reads the whole file; every mutation rewrites the whole file
/// before returning. Nothing is cached between calls. Entries a mutation does
/// not touch, including profiles the catalog skips, are written back as they
/// were read.
#[derive(Debug, Clone)]
pub struct CatalogStore {
    path: PathBuf,
}

impl CatalogStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Create an empty catalog file if none exists. Returns whether a file
    /// was created.
    pub fn init(&self) -> Result<bool, CatalogError> {
        if self.path.exists() {
            return Ok(false);
        }
        self.write_document(&Document {
            root: DEFAULT_ROOT.to_string(),
            nodes: Vec::new(),
        })?;
        log::debug!("Created empty catalog at {}", self.path.display());
        Ok(true)
    }

    /// Read every recipe from disk. A missing file is an empty catalog.
    pub fn load(&self) -> Result<Catalog, CatalogError> {
        if !self.path.exists() {
            return Ok(Catalog::default());
        }
        let bytes = fs::read(&self.path).map_err(|source| CatalogError::Io {
            path: self.path.clone(),
            source,
        })?;
        let document = decode(&bytes)
            .and_then(parse_document)
            .map_err(|reason| CatalogError::Malformed {
                path: self.path.clone(),
                reason,
            })?;
        Ok(Catalog::from(document.recipes().cloned().collect::<Vec<_>>()))
    }

    /// Append `recipe` as a new entry. Name uniqueness is the caller's job.
    pub fn add(&self, recipe: &Recipe) -> Result<(), CatalogError> {
        validate_recipe(recipe)?;
        let mut document = self.read_for_update()?;
        document.nodes.push(Node::Written(recipe.clone()));
        self.write_document(&document)
    }

    /// Replace every field of the first entry named like `recipe`.
    pub fn update(&self, recipe: &Recipe) -> Result<(), CatalogError> {
        let name = validate_recipe(recipe)?;
        let mut document = self.read_for_update()?;
        let index = document
            .position(name)
            .ok_or_else(|| CatalogError::NotFound {
                name: name.to_string(),
            })?;
        document.nodes[index] = Node::Written(recipe.clone());
        self.write_document(&document)
    }

    /// Remove the first entry named `name`.
    pub fn delete(&self, name: &str) -> Result<(), CatalogError> {
        let mut document = self.read_for_update()?;
        let index = document
            .position(name)
            .ok_or_else(|| CatalogError::NotFound {
                name: name.to_string(),
            })?;
        document.nodes.remove(index);
        self.write_document(&document)
    }

    /// Persist `candidate` according to the user's `resolution` of a
    /// duplicate check. Returns the name it was stored under, or `None` when
    /// cancelled.
    pub fn save_candidate(
        &self,
        candidate: &Recipe,
        resolution: Resolution,
    ) -> Result<Option<String>, CatalogError> {
        let name = validate_recipe(candidate)?.to_string();
        let catalog = self.load()?;

        match resolution {
            Resolution::Cancel => Ok(None),
            Resolution::Overwrite => {
                self.update(candidate)?;
                Ok(Some(name))
            }
            Resolution::KeepBoth => {
                if matches!(
                    find_duplicate(candidate, &catalog),
                    DuplicateOutcome::NameOnly | DuplicateOutcome::Both(_)
                ) {
                    return Err(CatalogError::InvalidName {
                        name,
                        reason: "name already exists".to_string(),
                    });
                }
                self.add(candidate)?;
                Ok(Some(name))
            }
            Resolution::Rename(new_name) => {
                let new_name = new_name.trim();
                if new_name.is_empty() {
                    return Err(CatalogError::InvalidName {
                        name: new_name.to_string(),
                        reason: "name cannot be empty".to_string(),
                    });
                }
                if catalog.contains(new_name) {
                    return Err(CatalogError::InvalidName {
                        name: new_name.to_string(),
                        reason: "name already exists".to_string(),
                    });
                }
                let mut renamed = candidate.clone();
                renamed.insert(NAME_FIELD, new_name);
                self.add(&renamed)?;
                Ok(Some(new_name.to_string()))
            }
        }
    }

    /// Convert every stored `WhiteBalanceFineTune` from raw camera units to
    /// catalog units. Only meant for catalogs written before values were
    /// stored in catalog units; running it twice divides twice.
    pub fn migrate_white_balance_units(
        &self,
        dry_run: bool,
    ) -> Result<Vec<WhiteBalanceChange>, CatalogError> {
        let mut document = self.read_for_update()?;
        let mut changes = Vec::new();

        for node in &mut document.nodes {
            let Some(recipe) = node.recipe() else {
                continue;
            };
            let Some(before) = recipe.get(WHITE_BALANCE_FINE_TUNE) else {
                continue;
            };
            if before.is_empty() {
                continue;
            }
            let after = normalize_white_balance_fine_tune(before);
            if after == before {
                continue;
            }
            changes.push(WhiteBalanceChange {
                name: recipe.name().unwrap_or("?").to_string(),
                before: before.to_string(),
                after: after.clone(),
            });
            let mut migrated = recipe.clone();
            migrated.insert(WHITE_BALANCE_FINE_TUNE, after);
            *node = Node::Written(migrated);
        }

        if !dry_run && !changes.is_empty() {
            self.write_document(&document)?;
        }
        Ok(changes)
    }

    /// Reads the file for a read-modify-write cycle. Unlike `load`, a missing
    /// or unreadable file is a persistence failure here.
    fn read_for_update(&self) -> Result<Document, CatalogError> {
        let bytes = fs::read(&self.path).map_err(|e| CatalogError::Persistence {
            path: self.path.clone(),
            reason: e.to_string(),
        })?;
        decode(&bytes).and_then(parse_document).map_err(|reason| CatalogError::Persistence {
            path: self.path.clone(),
            reason: format!("catalog is not well-formed: {reason}"),
        })
    }

    fn write_document(&self, document: &Document) -> Result<(), CatalogError> {
        let bytes = render_document(document).map_err(|e| CatalogError::Persistence {
            path: self.path.clone(),
            reason: e.to_string(),
        })?;
        fs::write(&self.path, bytes).map_err(|e| CatalogError::Persistence {
            path: self.path.clone(),
            reason: e.to_string(),
        })
    }
}

/// Checks a recipe can be written: it needs a name, and every key must be
/// usable as a field element. `profile` is reserved for entries.
fn validate_recipe(recipe: &Recipe) -> Result<&str, CatalogError> {
    let name = recipe
        .name()
        .filter(|n| !n.trim().is_empty())
        .ok_or(CatalogError::MissingName)?;
    if let Some(field) = recipe
        .keys()
        .find(|k| !is_valid_tag(k) || *k == PROFILE_TAG)
    {
        return Err(CatalogError::InvalidField {
            field: field.to_string(),
        });
    }
    Ok(name)
}

fn is_valid_tag(tag: &str) -> bool {
    let mut chars = tag.chars();
    let Some(first) = chars.next() else {
        return false;
    };
    (first.is_alphabetic() || first == '_')
        && !tag.to_ascii_lowercase().starts_with("xml")
        && chars.all(|c| c.is_alphanumeric() || matches!(c, '_' | '-' | '.'))
}

/// A field element still open inside a profile.
struct OpenField {
    tag: String,
    text: String,
    /// Text after the first child element belongs to the child's tail.
    collecting: bool,
}

/// Profile being assembled while its element is open.
#[derive(Default)]
struct OpenProfile {
    recipe: Recipe,
    has_name: bool,
    fields: Vec<OpenField>,
}

impl OpenProfile {
    fn open_field(&mut self, tag: String, depth: usize) {
        if let Some(parent) = self.fields.last_mut() {
            parent.collecting = false;
        }
        if depth == 2 && tag == NAME_FIELD {
            self.has_name = true;
        }
        if tag != PROFILE_TAG {
            self.recipe.insert(tag.clone(), "");
        }
        self.fields.push(OpenField {
            tag,
            text: String::new(),
            collecting: true,
        });
    }

    fn close_field(&mut self) {
        if let Some(field) = self.fields.pop() {
            if field.tag != PROFILE_TAG {
                self.recipe.insert(field.tag, field.text);
            }
        }
    }

    fn push_text(&mut self, text: &str) {
        if let Some(field) = self.fields.last_mut() {
            if field.collecting {
                field.text.push_str(text);
            }
        }
    }
}

fn tag_name(start: &BytesStart<'_>) -> Result<String, String> {
    std::str::from_utf8(start.name().as_ref())
        .map(str::to_string)
        .map_err(|e| format!("invalid tag name: {e}"))
}

fn decode(bytes: &[u8]) -> Result<&str, String> {
    std::str::from_utf8(bytes).map_err(|e| format!("not valid UTF-8: {e}"))
}

/// Element of the root still being read, with the offset its source starts at.
struct OpenChild {
    start: usize,
    profile: Option<OpenProfile>,
}

impl OpenChild {
    fn finish(self, source: &str) -> Node {
        let recipe = match self.profile {
            Some(p) if p.has_name => Some(p.recipe),
            Some(_) => {
                log::warn!("Skipping catalog profile without a Name element");
                None
            }
            None => None,
        };
        Node::Kept {
            source: source.to_string(),
            recipe,
        }
    }
}

fn parse_document(xml: &str) -> Result<Document, String> {
    let mut reader = XmlReader::from_str(xml);
    let mut root: Option<String> = None;
    let mut root_closed = false;
    let mut open: Vec<String> = Vec::new();
    let mut child: Option<OpenChild> = None;
    let mut nodes = Vec::new();

    loop {
        let event_start = reader.buffer_position();
        let event = reader
            .read_event()
            .map_err(|e| format!("{e} at position {}", reader.buffer_position()))?;
        let event_end = reader.buffer_position();

        match event {
            Event::Start(start) => {
                let tag = tag_name(&start)?;
                if open.is_empty() {
                    if root.is_some() {
                        return Err(format!("unexpected element <{tag}> after root element"));
                    }
                    root = Some(tag.clone());
                } else if open.len() == 1 {
                    child = Some(OpenChild {
                        start: event_start,
                        profile: (tag == PROFILE_TAG).then(OpenProfile::default),
                    });
                } else if let Some(p) = child.as_mut().and_then(|c| c.profile.as_mut()) {
                    p.open_field(tag.clone(), open.len());
                }
                open.push(tag);
            }
            Event::Empty(start) => {
                let tag = tag_name(&start)?;
                if open.is_empty() {
                    if root.is_some() {
                        return Err(format!("unexpected element <{tag}> after root element"));
                    }
                    root = Some(tag);
                    root_closed = true;
                } else if open.len() == 1 {
                    let single = OpenChild {
                        start: event_start,
                        profile: (tag == PROFILE_TAG).then(OpenProfile::default),
                    };
                    nodes.push(single.finish(&xml[event_start..event_end]));
                } else if let Some(p) = child.as_mut().and_then(|c| c.profile.as_mut()) {
                    p.open_field(tag, open.len());
                    p.close_field();
                }
            }
            Event::End(_) => {
                if open.pop().is_none() {
                    return Err("unexpected closing tag".to_string());
                }
                match open.len() {
                    0 => root_closed = true,
                    1 => {
                        if let Some(c) = child.take() {
                            let source = &xml[c.start..event_end];
                            nodes.push(c.finish(source));
                        }
                    }
                    _ => {
                        if let Some(p) = child.as_mut().and_then(|c| c.profile.as_mut()) {
                            p.close_field();
                        }
                    }
                }
            }
            Event::Text(text) => {
                let unescaped = text
                    .unescape()
                    .map_err(|e| format!("{e} at position {}", reader.buffer_position()))?;
                match open.len() {
                    0 if !unescaped.trim().is_empty() => {
                        return Err("text outside the root element".to_string());
                    }
                    1 => {
                        let raw = xml[event_start..event_end].trim();
                        if !raw.is_empty() {
                            nodes.push(Node::Kept {
                                source: raw.to_string(),
                                recipe: None,
                            });
                        }
                    }
                    _ => {
                        if let Some(p) = child.as_mut().and_then(|c| c.profile.as_mut()) {
                            p.push_text(&unescaped);
                        }
                    }
                }
            }
            Event::CData(data) => {
                if let Some(p) = child.as_mut().and_then(|c| c.profile.as_mut()) {
                    p.push_text(&String::from_utf8_lossy(&data));
                } else if open.len() == 1 {
                    nodes.push(Node::Kept {
                        source: xml[event_start..event_end].to_string(),
                        recipe: None,
                    });
                }
            }
            Event::Comment(_) | Event::PI(_) if open.len() == 1 => {
                nodes.push(Node::Kept {
                    source: xml[event_start..event_end].to_string(),
                    recipe: None,
                });
            }
            Event::Eof => break,
            _ => {}
        }
    }

    if !open.is_empty() {
        return Err(format!("unexpected end of document, <{}> is not closed", open[open.len() - 1]));
    }
    let root = match root {
        Some(root) if root_closed => root,
        _ => return Err("no root element".to_string()),
    };

    let document = Document { root, nodes };
    warn_duplicate_names(document.recipes());
    Ok(document)
}

fn warn_duplicate_names<'a>(recipes: impl Iterator<Item = &'a Recipe>) {
    let mut seen = std::collections::HashSet::new();
    for name in recipes.filter_map(|r| r.name()) {
        if !seen.insert(name) {
            log::warn!("Catalog holds more than one recipe named '{name}'; the first one is used");
        }
    }
}

fn render_document(document: &Document) -> Result<Vec<u8>, quick_xml::Error> {
    let mut writer = XmlWriter::new_with_indent(Vec::new(), b' ', 2);
    writer.write_event(Event::Decl(BytesDecl::new("1.0", Some("utf-8"), None)))?;

    if document.nodes.is_empty() {
        writer.write_event(Event::Empty(BytesStart::new(document.root.as_str())))?;
    } else {
        writer.write_event(Event::Start(BytesStart::new(document.root.as_str())))?;
        for node in &document.nodes {
            match node {
                Node::Kept { source, .. } => {
                    writer.write_indent()?;
                    writer.get_mut().extend_from_slice(source.as_bytes());
                }
                Node::Written(recipe) => write_profile(&mut writer, recipe)?,
            }
        }
        writer.write_event(Event::End(BytesEnd::new(document.root.as_str())))?;
    }

    let mut bytes = writer.into_inner();
    bytes.push(b'\n');
    Ok(bytes)
}

fn write_profile(writer: &mut XmlWriter<Vec<u8>>, recipe: &Recipe) -> Result<(), quick_xml::Error> {
    writer.write_event(Event::Start(BytesStart::new(PROFILE_TAG)))?;
    for (key, value) in recipe.iter() {
        if value.is_empty() {
            writer.write_event(Event::Empty(BytesStart::new(key)))?;
        } else {
            writer.write_event(Event::Start(BytesStart::new(key)))?;
            writer.write_event(Event::Text(BytesText::new(value)))?;
            writer.write_event(Event::End(BytesEnd::new(key)))?;
        }
    }
    writer.write_event(Event::End(BytesEnd::new(PROFILE_TAG)))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn recipe(pairs: &[(&str, &str)]) -> Recipe {
        pairs.iter().copied().collect()
    }

    fn store_in(temp_dir: &TempDir) -> CatalogStore {
        let store = CatalogStore::new(temp_dir.path().join("film_simulations.xml"));
        store.init().unwrap();
        store
    }

    #[test]
    fn test_load_missing_file_is_empty() {
        let temp_dir = TempDir::new().unwrap();
        let store = CatalogStore::new(temp_dir.path().join("missing.xml"));

        let catalog = store.load().unwrap();
        assert!(catalog.is_empty());
    }

    #[test]
    fn test_load_malformed_file_is_an_error() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("broken.xml");
        fs::write(&path, "<root><profile><Name>A</Name></root>").unwrap();

        let result = CatalogStore::new(&path).load();
        assert!(matches!(result, Err(CatalogError::Malformed { .. })));
    }

    #[test]
    fn test_load_unclosed_or_empty_file_is_an_error() {
        let temp_dir = TempDir::new().unwrap();
        let unclosed = temp_dir.path().join("unclosed.xml");
        fs::write(&unclosed, "<root><profile><Name>A</Name></profile>").unwrap();
        let empty = temp_dir.path().join("empty.xml");
        fs::write(&empty, "").unwrap();

        assert!(matches!(
            CatalogStore::new(&unclosed).load(),
            Err(CatalogError::Malformed { .. })
        ));
        assert!(matches!(
            CatalogStore::new(&empty).load(),
            Err(CatalogError::Malformed { .. })
        ));
    }

    #[test]
    fn test_load_parses_profiles_in_order() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("catalog.xml");
        fs::write(
            &path,
            r#"<?xml version='1.0' encoding='utf-8'?>
<root>
  <profile>
    <Name>Kodachrome 64</Name>
    <FilmMode>Classic Chrome</FilmMode>
    <ColorTemperature />
    <Mood>warm &amp; grainy</Mood>
  </profile>
  <profile>
    <FilmMode>Eterna</FilmMode>
  </profile>
  <profile>
    <Name>Portra 400</Name>
    <Sensor>X-Trans IV</Sensor>
  </profile>
</root>
"#,
        )
        .unwrap();

        let catalog = CatalogStore::new(&path).load().unwrap();

        assert_eq!(catalog.len(), 2);
        let names: Vec<&str> = catalog.names().collect();
        assert_eq!(names, vec!["Kodachrome 64", "Portra 400"]);

        let kodachrome = catalog.get("Kodachrome 64").unwrap();
        let keys: Vec<&str> = kodachrome.keys().collect();
        assert_eq!(keys, vec!["Name", "FilmMode", "ColorTemperature", "Mood"]);
        assert_eq!(kodachrome.get("ColorTemperature"), Some(""));
        assert_eq!(kodachrome.get("Mood"), Some("warm & grainy"));
    }

    #[test]
    fn test_add_then_load_round_trip() {
        let temp_dir = TempDir::new().unwrap();
        let store = store_in(&temp_dir);
        let original = recipe(&[
            ("Name", "Superia <800>"),
            ("FilmMode", "Classic Negative"),
            ("WhiteBalanceFineTune", "Red +2, Blue -4"),
            ("ColorTemperature", ""),
            ("Sensor", "X-Trans IV"),
        ]);

        store.add(&original).unwrap();

        let catalog = store.load().unwrap();
        assert_eq!(catalog.len(), 1);
        assert_eq!(catalog.get("Superia <800>"), Some(&original));
    }

    #[test]
    fn test_written_file_is_indented_with_declaration() {
        let temp_dir = TempDir::new().unwrap();
        let store = store_in(&temp_dir);
        store.add(&recipe(&[("Name", "A"), ("Clarity", "0")])).unwrap();

        let written = fs::read_to_string(store.path()).unwrap();
        assert!(written.starts_with("<?xml version=\"1.0\" encoding=\"utf-8\"?>"));
        assert!(written.contains("\n<root>\n  <profile>\n    <Name>A</Name>\n"));
        assert!(written.ends_with("</root>\n"));
    }

    #[test]
    fn test_add_rejects_missing_name_and_bad_tags() {
        let temp_dir = TempDir::new().unwrap();
        let store = store_in(&temp_dir);

        assert!(matches!(
            store.add(&recipe(&[("FilmMode", "Eterna")])),
            Err(CatalogError::MissingName)
        ));
        assert!(matches!(
            store.add(&recipe(&[("Name", "  ")])),
            Err(CatalogError::MissingName)
        ));
        assert!(matches!(
            store.add(&recipe(&[("Name", "A"), ("Film Mode", "Eterna")])),
            Err(CatalogError::InvalidField { .. })
        ));
        assert!(matches!(
            store.add(&recipe(&[("Name", "A"), ("profile", "v")])),
            Err(CatalogError::InvalidField { field }) if field == "profile"
        ));
        assert!(store.load().unwrap().is_empty());
    }

    #[test]
    fn test_add_without_catalog_file_fails() {
        let temp_dir = TempDir::new().unwrap();
        let store = CatalogStore::new(temp_dir.path().join("gone.xml"));

        let result = store.add(&recipe(&[("Name", "A")]));
        assert!(matches!(result, Err(CatalogError::Persistence { .. })));
    }

    #[test]
    fn test_update_replaces_instead_of_merging() {
        let temp_dir = TempDir::new().unwrap();
        let store = store_in(&temp_dir);
        store
            .add(&recipe(&[("Name", "A"), ("X", "1"), ("Y", "2")]))
            .unwrap();

        store.update(&recipe(&[("Name", "A"), ("X", "5")])).unwrap();

        let catalog = store.load().unwrap();
        let updated = catalog.get("A").unwrap();
        assert_eq!(updated, &recipe(&[("Name", "A"), ("X", "5")]));
        assert!(!updated.contains_key("Y"));
    }

    #[test]
    fn test_update_missing_recipe_is_not_found() {
        let temp_dir = TempDir::new().unwrap();
        let store = store_in(&temp_dir);

        let result = store.update(&recipe(&[("Name", "Ghost"), ("X", "1")]));
        assert!(matches!(result, Err(CatalogError::NotFound { name }) if name == "Ghost"));
    }

    #[test]
    fn test_delete_then_load_keeps_remaining_order() {
        let temp_dir = TempDir::new().unwrap();
        let store = store_in(&temp_dir);
        for name in ["A", "B", "C", "D"] {
            store.add(&recipe(&[("Name", name)])).unwrap();
        }

        store.delete("B").unwrap();

        let catalog = store.load().unwrap();
        let names: Vec<&str> = catalog.names().collect();
        assert_eq!(names, vec!["A", "C", "D"]);
        assert!(matches!(
            store.delete("B"),
            Err(CatalogError::NotFound { .. })
        ));
    }

    #[test]
    fn test_mutations_keep_root_tag() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("catalog.xml");
        fs::write(&path, "<recipes>\n  <profile><Name>A</Name></profile>\n</recipes>\n").unwrap();
        let store = CatalogStore::new(&path);

        store.add(&recipe(&[("Name", "B")])).unwrap();

        let written = fs::read_to_string(&path).unwrap();
        assert!(written.contains("<recipes>"));
        assert_eq!(store.load().unwrap().len(), 2);
    }

    #[test]
    fn test_mutations_keep_untouched_entries_verbatim() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("catalog.xml");
        fs::write(
            &path,
            "<root><profile><FilmMode>Eterna</FilmMode></profile>\
             <!-- tuned by hand --><profile><Name>A</Name><Extra><Sub>x</Sub></Extra></profile>\
             <profile><Name>C</Name><Clarity>0</Clarity></profile></root>",
        )
        .unwrap();
        let store = CatalogStore::new(&path);

        store.add(&recipe(&[("Name", "B")])).unwrap();
        store.delete("C").unwrap();

        let written = fs::read_to_string(&path).unwrap();
        assert!(written.contains("<profile><FilmMode>Eterna</FilmMode></profile>"));
        assert!(written.contains("<!-- tuned by hand -->"));
        assert!(written.contains("<profile><Name>A</Name><Extra><Sub>x</Sub></Extra></profile>"));
        assert!(!written.contains("<Name>C</Name>"));

        let names: Vec<String> = store.load().unwrap().names().map(str::to_string).collect();
        assert_eq!(names, vec!["A", "B"]);
    }

    #[test]
    fn test_update_rewrites_only_the_replaced_entry() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("catalog.xml");
        fs::write(
            &path,
            "<root>\n  <profile><Name>A</Name><X>1</X></profile>\n  <profile><Name>B</Name><Y><Z>2</Z></Y></profile>\n</root>\n",
        )
        .unwrap();
        let store = CatalogStore::new(&path);

        store.update(&recipe(&[("Name", "A"), ("X", "9")])).unwrap();

        let written = fs::read_to_string(&path).unwrap();
        assert!(written.contains("<Name>A</Name>\n    <X>9</X>"));
        assert!(written.contains("<profile><Name>B</Name><Y><Z>2</Z></Y></profile>"));
        assert_eq!(store.load().unwrap().get("A").unwrap().get("X"), Some("9"));
    }

    #[test]
    fn test_non_utf8_catalog_is_malformed() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("catalog.xml");
        fs::write(&path, b"<root><profile><Name>\xff\xfe</Name></profile></root>").unwrap();

        let result = CatalogStore::new(&path).load();
        assert!(matches!(result, Err(CatalogError::Malformed { .. })));
    }

    #[test]
    fn test_mutations_on_malformed_file_leave_it_untouched() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("catalog.xml");
        let broken = "<root><profile><Name>A</Name></root>";
        fs::write(&path, broken).unwrap();
        let store = CatalogStore::new(&path);

        assert!(matches!(
            store.add(&recipe(&[("Name", "B")])),
            Err(CatalogError::Persistence { .. })
        ));
        assert!(matches!(
            store.update(&recipe(&[("Name", "A"), ("X", "1")])),
            Err(CatalogError::Persistence { .. })
        ));
        assert!(matches!(
            store.delete("A"),
            Err(CatalogError::Persistence { .. })
        ));
        assert!(matches!(
            store.migrate_white_balance_units(false),
            Err(CatalogError::Persistence { .. })
        ));
        assert_eq!(fs::read_to_string(&path).unwrap(), broken);
    }

    #[test]
    fn test_init_is_idempotent() {
        let temp_dir = TempDir::new().unwrap();
        let store = CatalogStore::new(temp_dir.path().join("catalog.xml"));

        assert!(store.init().unwrap());
        store.add(&recipe(&[("Name", "A")])).unwrap();
        assert!(!store.init().unwrap());
        assert_eq!(store.load().unwrap().len(), 1);
    }

    #[test]
    fn test_save_candidate_resolutions() {
        let temp_dir = TempDir::new().unwrap();
        let store = store_in(&temp_dir);
        store.add(&recipe(&[("Name", "A"), ("X", "1")])).unwrap();

        let same_name = recipe(&[("Name", "A"), ("X", "2")]);
        assert_eq!(store.save_candidate(&same_name, Resolution::Cancel).unwrap(), None);
        assert!(matches!(
            store.save_candidate(&same_name, Resolution::KeepBoth),
            Err(CatalogError::InvalidName { .. })
        ));
        assert!(matches!(
            store.save_candidate(&same_name, Resolution::Rename("A".into())),
            Err(CatalogError::InvalidName { .. })
        ));
        assert!(matches!(
            store.save_candidate(&same_name, Resolution::Rename("  ".into())),
            Err(CatalogError::InvalidName { .. })
        ));

        let saved = store
            .save_candidate(&same_name, Resolution::Rename(" A2 ".into()))
            .unwrap();
        assert_eq!(saved.as_deref(), Some("A2"));

        store.save_candidate(&same_name, Resolution::Overwrite).unwrap();
        let catalog = store.load().unwrap();
        assert_eq!(catalog.get("A").unwrap().get("X"), Some("2"));
        assert_eq!(catalog.get("A2").unwrap().get("X"), Some("2"));

        let same_content = recipe(&[("Name", "B"), ("X", "2")]);
        store.save_candidate(&same_content, Resolution::KeepBoth).unwrap();
        assert_eq!(store.load().unwrap().len(), 3);
    }

    #[test]
    fn test_migrate_white_balance_units() {
        let temp_dir = TempDir::new().unwrap();
        let store = store_in(&temp_dir);
        store
            .add(&recipe(&[("Name", "A"), ("WhiteBalanceFineTune", "Red +60, Blue -100")]))
            .unwrap();
        store
            .add(&recipe(&[("Name", "B"), ("WhiteBalanceFineTune", "Red +0, Blue +0")]))
            .unwrap();

        let preview = store.migrate_white_balance_units(true).unwrap();
        assert_eq!(preview.len(), 1);
        assert_eq!(
            store.load().unwrap().get("A").unwrap().get("WhiteBalanceFineTune"),
            Some("Red +60, Blue -100")
        );

        let changes = store.migrate_white_balance_units(false).unwrap();
        assert_eq!(
            changes,
            vec![WhiteBalanceChange {
                name: "A".into(),
                before: "Red +60, Blue -100".into(),
                after: "Red +3, Blue -5".into(),
            }]
        );
        assert_eq!(
            store.load().unwrap().get("A").unwrap().get("WhiteBalanceFineTune"),
            Some("Red +3, Blue -5")
        );
    }

    #[test]
    fn test_catalog_queries() {
        let catalog = Catalog::from(vec![
            recipe(&[("Name", "Kodachrome"), ("Sensor", "X-Trans IV")]),
            recipe(&[("Name", "Portra"), ("Sensor", "X-Trans V"), ("FilmMode", "Classic Negative")]),
            recipe(&[("Name", "Tri-X"), ("Sensor", "X-Trans IV")]),
            recipe(&[("Name", "Unknown")]),
        ]);

        let counts = catalog.sensor_counts();
        assert_eq!(counts.get("X-Trans IV"), Some(&2));
        assert_eq!(counts.get("X-Trans V"), Some(&1));
        assert_eq!(counts.len(), 2);

        let found: Vec<_> = catalog.search("NEGATIVE").into_iter().filter_map(|r| r.name()).collect();
        assert_eq!(found, vec!["Portra"]);
        assert_eq!(catalog.search("  ").len(), 4);

        let filtered = catalog.filter_sensors(&["X-Trans V"]);
        assert_eq!(filtered.len(), 1);
        assert_eq!(filtered[0].name(), Some("Portra"));
    }
}
