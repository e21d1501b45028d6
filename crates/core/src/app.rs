//! Application state shared by every frontend.
//!
//! [`ListController`] owns the loaded catalog, the selection and the sort
//! preference. Frontends call into it on user events and render from its
//! read accessors.

use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use tracing::info;

use crate::{
    catalog::{CacheStatus, CatalogCache, GraphqlClient},
    config::AppConfig,
    models::{CatalogResponse, Item},
    pricing::ExchangeRates,
    selection::{Selection, SelectionStore},
    sort::{sort_ids, SortKey, SortPreference},
    storage::{FileStore, KeyValueStore},
};

/// A search match and whether it is already on the list.
#[derive(Debug, Clone, Copy)]
pub struct SearchHit<'a> {
    /// Matching catalog item.
    pub item: &'a Item,
    /// Whether the item is already selected.
    pub in_list: bool,
}

/// A selected item ready for display.
#[derive(Debug, Clone, Copy)]
pub struct ListRow<'a> {
    /// Catalog item backing the row.
    pub item: &'a Item,
    /// Selected quantity.
    pub count: u32,
}

/// Result of adding an item.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddOutcome {
    /// The item was not on the list before.
    Added,
    /// The item was already listed; this is its new quantity.
    Incremented(u32),
}

/// Counts reported after a catalog is applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoadSummary {
    /// Items in the catalog.
    pub items: usize,
    /// Entries in the reconciled selection.
    pub selected: usize,
    /// Persisted entries dropped because the catalog no longer has them.
    pub dropped: usize,
}

/// Owns catalog, selection and ordering for one session.
pub struct ListController {
    catalog: CatalogCache,
    selection: SelectionStore,
    sort_preference: SortPreference,
    rates: ExchangeRates,
    search_limit: usize,
    items: Vec<Item>,
    sort_key: Option<SortKey>,
}

impl ListController {
    /// Assemble a controller from its collaborators.
    pub fn new(
        catalog: CatalogCache,
        selection: SelectionStore,
        sort_preference: SortPreference,
        rates: ExchangeRates,
        search_limit: usize,
    ) -> Self {
        Self {
            catalog,
            selection,
            sort_preference,
            rates,
            search_limit,
            items: Vec::new(),
            sort_key: None,
        }
    }

    /// Wire the default file store and GraphQL client described by `config`.
    pub fn from_config(config: &AppConfig) -> Result<Self> {
        let store: Arc<dyn KeyValueStore> = Arc::new(
            FileStore::open(config.storage_path()).context("failed to open storage")?,
        );
        let client = GraphqlClient::from_config(config).context("failed to build HTTP client")?;
        let catalog = CatalogCache::new(Arc::new(client), store.clone(), config.cache_ttl());
        Ok(Self::new(
            catalog,
            SelectionStore::new(store.clone()),
            SortPreference::new(store),
            config.pricing.exchange_rates(),
            config.search_limit,
        ))
    }

    /// Catalog cache, e.g. to run a fetch on another task.
    pub fn catalog(&self) -> &CatalogCache {
        &self.catalog
    }

    /// Replace the item set with `response`, restore the persisted selection
    /// against it and restore the saved sort order.
    pub fn apply_catalog(&mut self, response: CatalogResponse) -> Result<LoadSummary> {
        self.items = response.into_items();
        self.selection.restore();
        let dropped = self.selection.reconcile(&self.items);
        self.sort_key = self.sort_preference.load();
        self.selection
            .persist()
            .context("failed to persist reconciled selection")?;

        let summary = LoadSummary {
            items: self.items.len(),
            selected: self.selection.selection().len(),
            dropped,
        };
        info!(
            items = summary.items,
            selected = summary.selected,
            dropped = summary.dropped,
            "catalog applied"
        );
        Ok(summary)
    }

    /// All loaded catalog items.
    pub fn items(&self) -> &[Item] {
        &self.items
    }

    /// Look up a loaded item.
    pub fn item(&self, id: &str) -> Option<&Item> {
        self.items.iter().find(|item| item.id == id)
    }

    /// Current selection.
    pub fn selection(&self) -> &Selection {
        self.selection.selection()
    }

    /// Rate table used for price comparison.
    pub fn rates(&self) -> &ExchangeRates {
        &self.rates
    }

    /// Case-insensitive substring matches on item name, capped at the
    /// configured limit. An empty term matches nothing.
    pub fn search(&self, term: &str) -> Vec<SearchHit<'_>> {
        let needle = term.to_lowercase();
        if needle.is_empty() {
            return Vec::new();
        }
        let selection = self.selection.selection();
        self.items
            .iter()
            .filter(|item| item.name.to_lowercase().contains(&needle))
            .take(self.search_limit)
            .map(|item| SearchHit {
                item,
                in_list: selection.contains(&item.id),
            })
            .collect()
    }

    /// Add one of `id` to the list.
    pub fn add(&mut self, id: &str) -> Result<AddOutcome> {
        if self.item(id).is_none() {
            return Err(anyhow!("item {id} is not in the catalog"));
        }
        if self.selection.selection().contains(id) {
            let count = self.selection.update_quantity(id, 1)?;
            return Ok(AddOutcome::Incremented(count));
        }
        self.selection.add(id)?;
        Ok(AddOutcome::Added)
    }

    /// Change the quantity of a listed item, never below one.
    pub fn update_quantity(&mut self, id: &str, delta: i64) -> Result<u32> {
        self.selection.update_quantity(id, delta)
    }

    /// Remove an item from the list.
    pub fn remove(&mut self, id: &str) -> Result<bool> {
        self.selection.remove(id)
    }

    /// Active sort order, if any.
    pub fn sort_key(&self) -> Option<SortKey> {
        self.sort_key
    }

    /// Switch to `key` and remember it for the next session.
    pub fn set_sort(&mut self, key: SortKey) -> Result<()> {
        self.sort_key = Some(key);
        self.sort_preference.save(key)
    }

    /// Selected items in display order.
    pub fn rows(&self) -> Vec<ListRow<'_>> {
        let selection = self.selection.selection();
        sort_ids(&selection.ids(), &self.items, self.sort_key, &self.rates)
            .into_iter()
            .filter_map(|id| {
                let item = self.item(&id)?;
                let count = selection.quantity(&id)?;
                Some(ListRow { item, count })
            })
            .collect()
    }

    /// Invalidate the stored catalog so the next load refetches.
    pub fn clear_cache(&self) -> Result<()> {
        self.catalog.clear_cache()
    }

    /// State of the stored catalog.
    pub fn cache_status(&self) -> CacheStatus {
        self.catalog.status()
    }

    /// Minutes until the stored catalog expires.
    pub fn minutes_until_refresh(&self) -> i64 {
        self.catalog.minutes_until_refresh()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use chrono::Duration;

    use super::*;
    use crate::{
        catalog::{CatalogSource, FetchError},
        models::{Currency, Offer, Vendor},
        storage::{MemoryStore, SELECTION_KEY},
    };

    struct FixedSource {
        items: Vec<Item>,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl CatalogSource for FixedSource {
        async fn fetch(&self) -> Result<CatalogResponse, FetchError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(CatalogResponse::from_items(self.items.clone()))
        }
    }

    fn item(id: &str, name: &str, buy: f64) -> Item {
        Item {
            id: id.to_string(),
            name: name.to_string(),
            width: 1,
            height: 1,
            sell_for: Vec::new(),
            buy_for: vec![Offer {
                price: buy,
                currency: Currency::Rub,
                vendor: Vendor {
                    name: "Mechanic".to_string(),
                },
            }],
        }
    }

    fn controller(
        store: Arc<MemoryStore>,
        items: Vec<Item>,
    ) -> (Arc<FixedSource>, ListController) {
        let source = Arc::new(FixedSource {
            items,
            calls: AtomicUsize::new(0),
        });
        let catalog = CatalogCache::new(source.clone(), store.clone(), Duration::minutes(30));
        let controller = ListController::new(
            catalog,
            SelectionStore::new(store.clone()),
            SortPreference::new(store),
            ExchangeRates::default(),
            10,
        );
        (source, controller)
    }

    async fn load(controller: &mut ListController) -> anyhow::Result<LoadSummary> {
        let response = controller.catalog().get_items().await?;
        controller.apply_catalog(response)
    }

    fn catalog() -> Vec<Item> {
        vec![
            item("gpu", "Graphics card", 300000.0),
            item("bolts", "Bolts", 15000.0),
            item("hose", "Corrugated hose", 20000.0),
        ]
    }

    #[tokio::test]
    async fn load_drops_selection_missing_from_catalog() -> anyhow::Result<()> {
        let store = Arc::new(MemoryStore::new());
        store.set(
            SELECTION_KEY,
            r#"[{"id":"bolts","count":2},{"id":"retired","count":1}]"#.to_string(),
        )?;
        let (_, mut controller) = controller(store.clone(), catalog());

        let summary = load(&mut controller).await?;
        assert_eq!(
            summary,
            LoadSummary {
                items: 3,
                selected: 1,
                dropped: 1
            }
        );
        assert!(!controller.selection().contains("retired"));
        assert_eq!(controller.selection().quantity("bolts"), Some(2));
        assert_eq!(
            store.get(SELECTION_KEY)?.as_deref(),
            Some(r#"[{"id":"bolts","count":2}]"#)
        );
        Ok(())
    }

    #[tokio::test]
    async fn repeated_loads_within_ttl_fetch_once() -> anyhow::Result<()> {
        let store = Arc::new(MemoryStore::new());
        let (source, mut controller) = controller(store.clone(), catalog());
        load(&mut controller).await?;
        load(&mut controller).await?;
        assert_eq!(source.calls.load(Ordering::SeqCst), 1);

        controller.clear_cache()?;
        assert_eq!(controller.cache_status(), CacheStatus::Empty);
        load(&mut controller).await?;
        assert_eq!(source.calls.load(Ordering::SeqCst), 2);
        Ok(())
    }

    #[tokio::test]
    async fn search_limits_and_flags_selected_items() -> anyhow::Result<()> {
        let store = Arc::new(MemoryStore::new());
        let items: Vec<Item> = (0..15)
            .map(|idx| item(&format!("ammo-{idx}"), &format!("Ammo pack {idx}"), 100.0))
            .collect();
        let (_, mut controller) = controller(store, items);
        load(&mut controller).await?;
        controller.add("ammo-1")?;

        let hits = controller.search("AMMO");
        assert_eq!(hits.len(), 10);
        assert!(hits[1].in_list);
        assert!(!hits[0].in_list);
        assert!(controller.search("").is_empty());
        assert!(controller.search("salewa").is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn search_keeps_surrounding_whitespace() -> anyhow::Result<()> {
        let store = Arc::new(MemoryStore::new());
        let items = vec![
            item("ak74", "AK-74 magazine", 5000.0),
            item("pack", "Pack ak rail", 7000.0),
        ];
        let (_, mut controller) = controller(store, items);
        load(&mut controller).await?;

        let hits = controller.search(" ak");
        let hits: Vec<&str> = hits.iter().map(|hit| hit.item.id.as_str()).collect();
        assert_eq!(hits, vec!["pack"]);
        assert_eq!(controller.search("ak").len(), 2);
        Ok(())
    }

    #[tokio::test]
    async fn add_increments_existing_entries() -> anyhow::Result<()> {
        let store = Arc::new(MemoryStore::new());
        let (_, mut controller) = controller(store, catalog());
        load(&mut controller).await?;

        assert_eq!(controller.add("gpu")?, AddOutcome::Added);
        assert_eq!(controller.add("gpu")?, AddOutcome::Incremented(2));
        assert!(controller.add("unknown").is_err());
        assert_eq!(controller.update_quantity("gpu", -10)?, 1);
        assert!(controller.remove("gpu")?);
        assert!(controller.rows().is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn sort_choice_survives_reload() -> anyhow::Result<()> {
        let store = Arc::new(MemoryStore::new());
        let (_, mut first) = controller(store.clone(), catalog());
        load(&mut first).await?;
        for id in ["gpu", "bolts", "hose"] {
            first.add(id)?;
        }
        first.set_sort(SortKey::BuyAsc)?;
        let rows = first.rows();
        let order: Vec<&str> = rows.iter().map(|row| row.item.id.as_str()).collect();
        assert_eq!(order, vec!["bolts", "hose", "gpu"]);

        let (_, mut second) = controller(store, catalog());
        load(&mut second).await?;
        assert_eq!(second.sort_key(), Some(SortKey::BuyAsc));
        let rows = second.rows();
        let order: Vec<&str> = rows.iter().map(|row| row.item.id.as_str()).collect();
        assert_eq!(order, vec!["bolts", "hose", "gpu"]);
        Ok(())
    }
}
