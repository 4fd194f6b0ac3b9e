//! Browse/filter view over the catalog
//!
//! The hub owns nothing but the search string. Selection lives with the
//! host; the hub just tells it which asset the user toggled.

use std::time::{Duration, Instant};

use crate::catalog::{Asset, Catalog};

/// How long an agent-requested highlight stays on screen
pub const HIGHLIGHT_DURATION: Duration = Duration::from_secs(4);

/// Case-insensitive substring match on name or description
pub fn matches(asset: &Asset, query: &str) -> bool {
    if query.is_empty() {
        return true;
    }
    let query_lower = query.to_lowercase();
    asset.name.to_lowercase().contains(&query_lower)
        || asset.description.to_lowercase().contains(&query_lower)
}

pub fn filter<'a>(assets: &'a [Asset], query: &str) -> Vec<&'a Asset> {
    assets.iter().filter(|asset| matches(asset, query)).collect()
}

/// The two sections the hub renders, both in catalog order
#[derive(Debug, Default)]
pub struct HubSections<'a> {
    pub recently_updated: Vec<&'a Asset>,
    pub most_popular: Vec<&'a Asset>,
}

impl<'a> HubSections<'a> {
    pub fn len(&self) -> usize {
        self.recently_updated.len() + self.most_popular.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Flattened view: recently updated first, then most popular
    pub fn iter(&self) -> impl Iterator<Item = &'a Asset> + '_ {
        self.recently_updated
            .iter()
            .chain(self.most_popular.iter())
            .copied()
    }

    pub fn get(&self, index: usize) -> Option<&'a Asset> {
        self.iter().nth(index)
    }
}

#[derive(Debug, Clone, Default)]
pub struct AssetHub {
    pub search: String,
}

impl AssetHub {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sections<'a>(&self, catalog: &'a Catalog) -> HubSections<'a> {
        let (recently_updated, most_popular): (Vec<&Asset>, Vec<&Asset>) = filter(catalog.assets(), &self.search)
            .into_iter()
            .partition(|asset| asset.is_new);
        HubSections {
            recently_updated,
            most_popular,
        }
    }

    /// The toggle a click on `asset` should report: the opposite of its
    /// current selected state
    pub fn toggle_request<'a>(&self, asset: &'a Asset, is_selected: bool) -> (&'a Asset, bool) {
        (asset, !is_selected)
    }
}

/// Transient visual highlight requested by the agent
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Highlight {
    pub asset_id: String,
    pub expires_at: Instant,
}

impl Highlight {
    /// Resolve an agent-supplied asset name against the catalog
    pub fn resolve(catalog: &Catalog, asset_name: &str, now: Instant) -> Option<Self> {
        catalog.find_by_name(asset_name).map(|asset| Self {
            asset_id: asset.id.clone(),
            expires_at: now + HIGHLIGHT_DURATION,
        })
    }

    pub fn is_active(&self, now: Instant) -> bool {
        now < self.expires_at
    }
}
