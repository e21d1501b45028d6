//! The user's list of chosen items and their quantities.

use std::{collections::HashSet, sync::Arc};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info};

use crate::{
    models::Item,
    storage::{KeyValueStore, SELECTION_KEY},
};

/// One selected item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectionEntry {
    /// Catalog id of the item.
    pub id: String,
    /// Quantity, always at least one.
    pub count: u32,
}

/// Insertion-ordered map from item id to quantity.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Selection {
    entries: Vec<SelectionEntry>,
}

impl Selection {
    /// Empty selection.
    pub fn new() -> Self {
        Self::default()
    }

    /// Quantity of `id`, if selected.
    pub fn quantity(&self, id: &str) -> Option<u32> {
        self.entries
            .iter()
            .find(|entry| entry.id == id)
            .map(|entry| entry.count)
    }

    /// Whether `id` is selected.
    pub fn contains(&self, id: &str) -> bool {
        self.entries.iter().any(|entry| entry.id == id)
    }

    /// Set the quantity of `id`, appending it when new. Counts are clamped
    /// to at least one.
    pub fn set(&mut self, id: &str, count: u32) {
        let count = count.max(1);
        match self.entries.iter_mut().find(|entry| entry.id == id) {
            Some(entry) => entry.count = count,
            None => self.entries.push(SelectionEntry {
                id: id.to_string(),
                count,
            }),
        }
    }

    /// Remove `id`, reporting whether it was present.
    pub fn remove(&mut self, id: &str) -> bool {
        let before = self.entries.len();
        self.entries.retain(|entry| entry.id != id);
        self.entries.len() != before
    }

    /// Ids in insertion order.
    pub fn ids(&self) -> Vec<String> {
        self.entries.iter().map(|entry| entry.id.clone()).collect()
    }

    /// Entries in insertion order.
    pub fn entries(&self) -> &[SelectionEntry] {
        &self.entries
    }

    /// Number of distinct items.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether nothing is selected.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn retain(&mut self, keep: impl FnMut(&SelectionEntry) -> bool) {
        self.entries.retain(keep);
    }
}

/// Every on-disk shape the selection has had.
#[derive(Deserialize)]
#[serde(untagged)]
enum StoredSelection {
    /// Early lists stored bare ids, one of each.
    Ids(Vec<String>),
    Records(Vec<StoredRecord>),
}

#[derive(Deserialize)]
struct StoredRecord {
    id: String,
    #[serde(default = "default_count")]
    count: f64,
}

fn default_count() -> f64 {
    1.0
}

/// Floor a stored count into `1..=u32::MAX`.
fn normalise_count(count: f64) -> u32 {
    count.floor().clamp(1.0, f64::from(u32::MAX)) as u32
}

/// Parse a stored selection in either the current or the legacy shape.
pub fn decode_selection(raw: &str) -> Result<Selection> {
    let stored: StoredSelection =
        serde_json::from_str(raw).context("unrecognised selection data")?;
    let mut selection = Selection::new();
    match stored {
        StoredSelection::Ids(ids) => {
            for id in ids {
                selection.set(&id, 1);
            }
        }
        StoredSelection::Records(records) => {
            for record in records {
                selection.set(&record.id, normalise_count(record.count));
            }
        }
    }
    Ok(selection)
}

/// Serialise a selection in the current shape.
pub fn encode_selection(selection: &Selection) -> Result<String> {
    serde_json::to_string(selection.entries()).context("failed to encode selection")
}

/// Owns the active selection and keeps it persisted.
pub struct SelectionStore {
    store: Arc<dyn KeyValueStore>,
    selection: Selection,
}

impl SelectionStore {
    /// Start with an empty selection backed by `store`.
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self {
            store,
            selection: Selection::new(),
        }
    }

    /// Current selection.
    pub fn selection(&self) -> &Selection {
        &self.selection
    }

    /// Add one of `id`: a new entry starts at one, an existing entry is
    /// incremented.
    pub fn add(&mut self, id: &str) -> Result<u32> {
        if self.selection.contains(id) {
            return self.update_quantity(id, 1);
        }
        self.selection.set(id, 1);
        self.persist()?;
        debug!(id, "item added to selection");
        Ok(1)
    }

    /// Shift the quantity of `id` by `delta`, never below one. A missing
    /// entry counts as one.
    pub fn update_quantity(&mut self, id: &str, delta: i64) -> Result<u32> {
        let current = i64::from(self.selection.quantity(id).unwrap_or(1));
        let next = current.saturating_add(delta).max(1);
        let next = u32::try_from(next).unwrap_or(u32::MAX);
        self.selection.set(id, next);
        self.persist()?;
        Ok(next)
    }

    /// Drop `id` entirely.
    pub fn remove(&mut self, id: &str) -> Result<bool> {
        let removed = self.selection.remove(id);
        self.persist()?;
        Ok(removed)
    }

    /// Write the full selection to storage.
    pub fn persist(&self) -> Result<()> {
        let encoded = encode_selection(&self.selection)?;
        self.store
            .set(SELECTION_KEY, encoded)
            .context("failed to persist selection")
    }

    /// Replace the in-memory selection with the stored one.
    ///
    /// Unreadable data is logged and removed, leaving an empty selection.
    pub fn restore(&mut self) -> &Selection {
        self.selection = match self.store.get(SELECTION_KEY) {
            Ok(Some(raw)) => match decode_selection(&raw) {
                Ok(selection) => selection,
                Err(err) => {
                    error!(?err, "corrupt selection found in storage, clearing");
                    if let Err(err) = self.store.remove(SELECTION_KEY) {
                        error!(?err, "failed to clear corrupt selection");
                    }
                    Selection::new()
                }
            },
            Ok(None) => Selection::new(),
            Err(err) => {
                error!(?err, "failed to read selection from storage");
                Selection::new()
            }
        };
        &self.selection
    }

    /// Keep only entries whose id exists in `items`, returning how many were
    /// dropped. Storage is left untouched.
    pub fn reconcile(&mut self, items: &[Item]) -> usize {
        let known: HashSet<&str> = items.iter().map(|item| item.id.as_str()).collect();
        let before = self.selection.len();
        self.selection.retain(|entry| known.contains(entry.id.as_str()));
        let dropped = before - self.selection.len();
        if dropped > 0 {
            info!(dropped, "selection entries missing from catalog");
        }
        dropped
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStore;

    fn item(id: &str) -> Item {
        Item {
            id: id.to_string(),
            name: id.to_uppercase(),
            width: 1,
            height: 1,
            sell_for: Vec::new(),
            buy_for: Vec::new(),
        }
    }

    fn store_with(raw: Option<&str>) -> Result<(Arc<MemoryStore>, SelectionStore)> {
        let backing = Arc::new(MemoryStore::new());
        if let Some(raw) = raw {
            backing.set(SELECTION_KEY, raw.to_string())?;
        }
        let store = SelectionStore::new(backing.clone());
        Ok((backing, store))
    }

    #[test]
    fn add_inserts_then_increments() -> Result<()> {
        let (backing, mut store) = store_with(None)?;
        assert_eq!(store.add("salewa")?, 1);
        assert_eq!(store.add("salewa")?, 2);
        assert_eq!(store.add("bolts")?, 1);
        assert_eq!(store.selection().ids(), vec!["salewa", "bolts"]);
        assert_eq!(
            backing.get(SELECTION_KEY)?.as_deref(),
            Some(r#"[{"id":"salewa","count":2},{"id":"bolts","count":1}]"#)
        );
        Ok(())
    }

    #[test]
    fn quantity_never_drops_below_one() -> Result<()> {
        let (_, mut store) = store_with(None)?;
        store.add("gpu")?;
        store.update_quantity("gpu", 2)?;
        assert_eq!(store.update_quantity("gpu", -100)?, 1);
        assert_eq!(store.update_quantity("gpu", i64::MIN)?, 1);
        assert_eq!(store.selection().quantity("gpu"), Some(1));
        Ok(())
    }

    #[test]
    fn remove_deletes_and_persists() -> Result<()> {
        let (backing, mut store) = store_with(None)?;
        store.add("a")?;
        assert!(store.remove("a")?);
        assert!(!store.remove("a")?);
        assert_eq!(backing.get(SELECTION_KEY)?.as_deref(), Some("[]"));
        Ok(())
    }

    #[test]
    fn restores_current_and_legacy_shapes() -> Result<()> {
        let (_, mut current) = store_with(Some(r#"[{"id":"a","count":3},{"id":"b","count":1}]"#))?;
        let restored = current.restore().clone();
        assert_eq!(restored.quantity("a"), Some(3));
        assert_eq!(restored.ids(), vec!["a", "b"]);

        let (_, mut legacy) = store_with(Some(r#"["a","b"]"#))?;
        let restored = legacy.restore().clone();
        assert_eq!(restored.quantity("a"), Some(1));
        assert_eq!(restored.quantity("b"), Some(1));

        let (_, mut empty) = store_with(Some("[]"))?;
        assert!(empty.restore().is_empty());
        Ok(())
    }

    #[test]
    fn persist_then_restore_is_lossless() -> Result<()> {
        let (backing, mut store) = store_with(Some(r#"["x","y"]"#))?;
        store.restore();
        store.update_quantity("y", 4)?;
        let expected = store.selection().clone();

        let mut reloaded = SelectionStore::new(backing);
        assert_eq!(reloaded.restore(), &expected);
        Ok(())
    }

    #[test]
    fn corrupt_data_is_cleared() -> Result<()> {
        let (backing, mut store) = store_with(Some("{broken"))?;
        assert!(store.restore().is_empty());
        assert_eq!(backing.get(SELECTION_KEY)?, None);

        let (backing, mut store) = store_with(Some(r#"{"id":"a"}"#))?;
        assert!(store.restore().is_empty());
        assert_eq!(backing.get(SELECTION_KEY)?, None);
        Ok(())
    }

    #[test]
    fn odd_counts_are_normalised() -> Result<()> {
        let selection = decode_selection(r#"[{"id":"a","count":0},{"id":"b"},{"id":"a","count":5}]"#)?;
        assert_eq!(selection.ids(), vec!["a", "b"]);
        assert_eq!(selection.quantity("a"), Some(5));
        assert_eq!(selection.quantity("b"), Some(1));
        Ok(())
    }

    #[test]
    fn float_counts_are_kept() -> Result<()> {
        let selection = decode_selection(
            r#"[{"id":"a","count":2.0},{"id":"b","count":1e20},{"id":"c","count":3.7},{"id":"d","count":-5}]"#,
        )?;
        assert_eq!(selection.quantity("a"), Some(2));
        assert_eq!(selection.quantity("b"), Some(u32::MAX));
        assert_eq!(selection.quantity("c"), Some(3));
        assert_eq!(selection.quantity("d"), Some(1));

        let (backing, mut store) = store_with(Some(r#"[{"id":"a","count":2.0}]"#))?;
        assert_eq!(store.restore().quantity("a"), Some(2));
        assert!(backing.get(SELECTION_KEY)?.is_some());
        Ok(())
    }

    #[test]
    fn reconcile_drops_unknown_ids_without_persisting() -> Result<()> {
        let (backing, mut store) = store_with(Some(r#"[{"id":"a","count":2},{"id":"gone","count":1}]"#))?;
        store.restore();
        let dropped = store.reconcile(&[item("a"), item("b")]);
        assert_eq!(dropped, 1);
        assert_eq!(store.selection().ids(), vec!["a"]);
        assert!(backing
            .get(SELECTION_KEY)?
            .unwrap_or_default()
            .contains("gone"));
        Ok(())
    }
}
