use std::collections::BTreeMap;

/// Flat key/value record produced by the decoders.
///
/// This is the unit of data flowing through the whole pipeline:
/// - Decoders produce it from raw upstream text
/// - Workers publish it (alone or in a sequence) to their round slot
/// - Presenters render it
///
/// DESIGN NOTES:
/// - Keys are unique; inserting an existing key replaces its value.
/// - Insertion order is kept so rendered columns follow upstream order.
/// - Values are raw text. No numeric typing happens here.
///
/// Equality ignores key order: two records are equal when they hold the
/// same keys mapped to the same values.
#[derive(Debug, Clone, Default)]
pub struct FlatRecord {
    fields: Vec<(String, String)>,
}

/// Time-ordered batch of records from a single fetch (e.g. OHLC bars).
pub type RecordSequence = Vec<FlatRecord>;

/// Source-specific request parameters for series fetches.
///
/// Ordered so that query strings built from it are deterministic.
pub type SeriesParams = BTreeMap<String, String>;

impl FlatRecord {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts or replaces a field, returning the previous value if any.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) -> Option<String> {
        let key = key.into();
        let value = value.into();

        match self.fields.iter_mut().find(|(k, _)| *k == key) {
            Some((_, existing)) => Some(std::mem::replace(existing, value)),
            None => {
                self.fields.push((key, value));
                None
            }
        }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn clear(&mut self) {
        self.fields.clear();
    }

    /// Iterates over `(key, value)` pairs in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|(k, _)| k.as_str())
    }

    /// Returns a copy restricted to the allow-listed fields.
    ///
    /// An empty allow-list means "everything". Field order follows the
    /// record, not the allow-list.
    pub fn select(&self, allow: &[String]) -> FlatRecord {
        if allow.is_empty() {
            return self.clone();
        }

        self.fields
            .iter()
            .filter(|(k, _)| allow.iter().any(|a| a == k))
            .cloned()
            .collect()
    }
}

impl PartialEq for FlatRecord {
    fn eq(&self, other: &Self) -> bool {
        self.len() == other.len()
            && self.iter().all(|(k, v)| other.get(k) == Some(v))
    }
}

impl Eq for FlatRecord {}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for FlatRecord {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut record = FlatRecord::new();
        for (k, v) in iter {
            record.insert(k, v);
        }
        record
    }
}

/// Applies an allow-list to every record of a sequence.
pub fn select_all(records: &[FlatRecord], allow: &[String]) -> RecordSequence {
    records.iter().map(|r| r.select(allow)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_replaces_existing_key() {
        let mut record = FlatRecord::new();
        assert_eq!(record.insert("last", "1"), None);
        assert_eq!(record.insert("last", "2"), Some("1".to_string()));
        assert_eq!(record.len(), 1);
        assert_eq!(record.get("last"), Some("2"));
    }

    #[test]
    fn equality_ignores_key_order() {
        let a: FlatRecord = [("a", "1"), ("b", "2")].into_iter().collect();
        let b: FlatRecord = [("b", "2"), ("a", "1")].into_iter().collect();
        let c: FlatRecord = [("a", "1"), ("b", "3")].into_iter().collect();

        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn select_keeps_record_order_and_empty_allow_list_keeps_all() {
        let record: FlatRecord = [("timestamp", "10"), ("open", "1"), ("close", "2")]
            .into_iter()
            .collect();

        let picked = record.select(&["close".to_string(), "timestamp".to_string()]);
        let keys: Vec<&str> = picked.keys().collect();
        assert_eq!(keys, vec!["timestamp", "close"]);

        assert_eq!(record.select(&[]), record);
    }
}
