use serde::ser::{Serialize, SerializeMap, Serializer};

/// Key of the identity field every stored recipe carries.
pub const NAME_FIELD: &str = "Name";

/// Ordered string map with unique keys.
///
/// Recipes, extracted photo metadata and form input all share this shape.
/// Keys keep their insertion order; re-setting a key replaces the value in
/// place. A key that is absent is "unset", which is not the same thing as a
/// key holding an empty string.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FieldMap {
    entries: Vec<(String, String)>,
}

/// A film simulation recipe. Must carry a non-empty `Name` to be persisted.
pub type Recipe = FieldMap;

/// Field name to value mapping extracted from a photograph.
pub type Metadata = FieldMap;

impl FieldMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.iter().any(|(k, _)| k == key)
    }

    /// Set `key` to `value`, returning the previous value if there was one.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) -> Option<String> {
        let key = key.into();
        let value = value.into();
        match self.entries.iter_mut().find(|(k, _)| *k == key) {
            Some((_, slot)) => Some(std::mem::replace(slot, value)),
            None => {
                self.entries.push((key, value));
                None
            }
        }
    }

    pub fn remove(&mut self, key: &str) -> Option<String> {
        let index = self.entries.iter().position(|(k, _)| k == key)?;
        Some(self.entries.remove(index).1)
    }

    /// Keep only the entries for which `keep` returns true.
    pub fn retain(&mut self, mut keep: impl FnMut(&str, &str) -> bool) {
        self.entries.retain(|(k, v)| keep(k, v));
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(k, _)| k.as_str())
    }

    pub fn values_mut(&mut self) -> impl Iterator<Item = &mut String> {
        self.entries.iter_mut().map(|(_, v)| v)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// The recipe's `Name`, if present.
    pub fn name(&self) -> Option<&str> {
        self.get(NAME_FIELD)
    }

    /// Copy every entry of `other` over `self`, in `other`'s order.
    pub fn extend_from(&mut self, other: &FieldMap) {
        for (key, value) in other.iter() {
            self.insert(key, value);
        }
    }
}

impl<K, V> FromIterator<(K, V)> for FieldMap
where
    K: Into<String>,
    V: Into<String>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut map = FieldMap::new();
        for (key, value) in iter {
            map.insert(key, value);
        }
        map
    }
}

impl Serialize for FieldMap {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (key, value) in &self.entries {
            map.serialize_entry(key, value)?;
        }
        map.end()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_keeps_order_and_replaces_in_place() {
        let mut map = FieldMap::new();
        map.insert("Name", "Kodachrome");
        map.insert("FilmMode", "Classic Chrome");
        map.insert("Sensor", "X-Trans IV");

        let previous = map.insert("FilmMode", "Eterna");
        assert_eq!(previous.as_deref(), Some("Classic Chrome"));

        let keys: Vec<&str> = map.keys().collect();
        assert_eq!(keys, vec!["Name", "FilmMode", "Sensor"]);
        assert_eq!(map.get("FilmMode"), Some("Eterna"));
    }

    #[test]
    fn test_absent_is_distinct_from_empty() {
        let map: FieldMap = [("Name", "A"), ("ColorTemperature", "")].into_iter().collect();

        assert_eq!(map.get("ColorTemperature"), Some(""));
        assert!(map.contains_key("ColorTemperature"));
        assert_eq!(map.get("Clarity"), None);
        assert!(!map.contains_key("Clarity"));
    }

    #[test]
    fn test_remove_and_retain() {
        let mut map: FieldMap = [("Name", "A"), ("X", "1"), ("Y", "")].into_iter().collect();

        assert_eq!(map.remove("X").as_deref(), Some("1"));
        assert_eq!(map.remove("X"), None);

        map.retain(|_, v| !v.is_empty());
        assert_eq!(map.len(), 1);
        assert_eq!(map.name(), Some("A"));
    }

    #[test]
    fn test_serializes_as_ordered_object() {
        let map: FieldMap = [("Name", "A"), ("Sensor", "X-Trans V"), ("Clarity", "0")]
            .into_iter()
            .collect();

        let json = serde_json::to_string(&map).unwrap();
        assert_eq!(json, r#"{"Name":"A","Sensor":"X-Trans V","Clarity":"0"}"#);
    }
}
