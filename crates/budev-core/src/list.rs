// Budev Entry List
// Ordered name/value list backing device properties, attributes and scan results

/// A single name/value entry.
///
/// The value is optional; result-list entries carry names only.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    name: String,
    value: Option<String>,
}

impl Entry {
    /// Entry name (property key or device path).
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Entry value, if one was stored.
    pub fn value(&self) -> Option<&str> {
        self.value.as_deref()
    }
}

/// Ordered list of name/value entries.
///
/// Insertion order is preserved and duplicate names are allowed; lookups
/// return the value of the *first* matching entry. There is no removal.
#[derive(Debug, Clone, Default)]
pub struct EntryList {
    entries: Vec<Entry>,
}

impl EntryList {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an entry. Never deduplicates.
    pub fn insert(&mut self, name: impl Into<String>, value: Option<&str>) {
        self.entries.push(Entry {
            name: name.into(),
            value: value.map(str::to_string),
        });
    }

    /// Value of the first entry with the given name.
    ///
    /// Returns `None` both when no entry matches and when the first match
    /// carries no value.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|e| e.name == name)
            .and_then(|e| e.value())
    }

    /// Iterate entries in insertion order.
    pub fn iter(&self) -> std::slice::Iter<'_, Entry> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub(crate) fn clear(&mut self) {
        self.entries.clear();
    }
}

impl<'a> IntoIterator for &'a EntryList {
    type Item = &'a Entry;
    type IntoIter = std::slice::Iter<'a, Entry>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_match_wins() {
        let mut list = EntryList::new();
        list.insert("k", Some("a"));
        list.insert("k", Some("b"));
        assert_eq!(list.get("k"), Some("a"));
        assert_eq!(list.len(), 2);
    }

    #[test]
    fn test_insertion_order_preserved() {
        let mut list = EntryList::new();
        list.insert("one", None);
        list.insert("two", Some("2"));
        list.insert("three", None);
        let names: Vec<&str> = list.iter().map(|e| e.name()).collect();
        assert_eq!(names, ["one", "two", "three"]);
    }

    #[test]
    fn test_missing_and_valueless_lookup() {
        let mut list = EntryList::new();
        list.insert("bare", None);
        assert_eq!(list.get("bare"), None);
        assert_eq!(list.get("absent"), None);
    }
}
