use std::collections::HashMap;

/// A string-keyed accumulator map that remembers first-insertion order.
///
/// Sorting its output with a stable sort breaks ties by discovery order.
#[derive(Debug, Clone)]
pub struct OrderedGroups<V> {
    index: HashMap<String, usize>,
    entries: Vec<(String, V)>,
}

impl<V> Default for OrderedGroups<V> {
    fn default() -> Self {
        Self {
            index: HashMap::new(),
            entries: Vec::new(),
        }
    }
}

impl<V: Default> OrderedGroups<V> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Accumulator for `key`, created empty on first sight.
    pub fn entry(&mut self, key: &str) -> &mut V {
        let idx = match self.index.get(key) {
            Some(&idx) => idx,
            None => {
                let idx = self.entries.len();
                self.index.insert(key.to_string(), idx);
                self.entries.push((key.to_string(), V::default()));
                idx
            }
        };
        &mut self.entries[idx].1
    }
}

impl<V> OrderedGroups<V> {
    pub fn contains(&self, key: &str) -> bool {
        self.index.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Groups in first-insertion order.
    pub fn into_entries(self) -> Vec<(String, V)> {
        self.entries
    }
}
