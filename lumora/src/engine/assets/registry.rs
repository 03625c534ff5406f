use crate::assets::{Asset, AssetId, AssetKind, AssetOrigin, AssetSource, AssetState};
use dashmap::DashMap;
use futures::future::join_all;
use log::{debug, trace, warn};
use std::sync::Arc;

/// How many assets sit in each state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RegistryStats {
    pub unloaded: usize,
    pub loading: usize,
    pub ready: usize,
    pub failed: usize,
}

impl FromIterator<AssetState> for RegistryStats {
    fn from_iter<I: IntoIterator<Item = AssetState>>(states: I) -> Self {
        let mut stats = RegistryStats::default();
        for state in states {
            match state {
                AssetState::Unloaded => stats.unloaded += 1,
                AssetState::Loading => stats.loading += 1,
                AssetState::Ready => stats.ready += 1,
                AssetState::Failed => stats.failed += 1,
            }
        }
        stats
    }
}

impl RegistryStats {
    pub fn total(&self) -> usize {
        self.unloaded + self.loading + self.ready + self.failed
    }
}

/// The one place assets are owned. Everything else refers to them by [`AssetId`].
#[derive(Debug, Default)]
pub struct AssetRegistry {
    assets: DashMap<AssetId, Arc<Asset>>,
}

impl AssetRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `asset` unless one with the same identity exists already, in which case the
    /// existing instance is returned and `asset` is dropped.
    pub fn register(&self, asset: impl Into<Arc<Asset>>) -> Arc<Asset> {
        let asset = asset.into();
        self.assets
            .entry(asset.id().clone())
            .or_insert_with(|| {
                trace!("[Asset Registry] Registered {} \"{}\"", asset.kind(), asset.id());
                asset.clone()
            })
            .clone()
    }

    /// Registers an asset loaded from `source` under its identity.
    pub fn register_source(
        &self,
        id: impl Into<AssetId>,
        kind: AssetKind,
        source: Arc<dyn AssetSource>,
    ) -> Arc<Asset> {
        self.register(Asset::loadable(id, kind, source))
    }

    pub fn get(&self, id: &AssetId) -> Option<Arc<Asset>> {
        self.assets.get(id).map(|a| a.clone())
    }

    pub fn contains(&self, id: &AssetId) -> bool {
        self.assets.contains_key(id)
    }

    pub fn state(&self, id: &AssetId) -> Option<AssetState> {
        self.assets.get(id).map(|a| a.state())
    }

    pub fn len(&self) -> usize {
        self.assets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.assets.is_empty()
    }

    pub fn assets(&self) -> Vec<Arc<Asset>> {
        self.assets.iter().map(|a| a.value().clone()).collect()
    }

    pub fn stats(&self) -> RegistryStats {
        self.assets.iter().map(|asset| asset.state()).collect()
    }

    /// Forgets every asset. Loads already in flight finish on their own instances.
    pub fn clear(&self) {
        debug!("[Asset Registry] Tearing down {} assets", self.assets.len());
        self.assets.clear();
    }

    /// Drives `asset` to a terminal state if it can get there.
    ///
    /// Terminal assets return immediately, even failed ones. Loading assets are waited on.
    /// Unloaded loadable assets are loaded, and a failure stays recorded on the asset instead
    /// of being returned. Assets without a load capability are left alone.
    pub async fn ensure_ready(&self, asset: &Asset) {
        match asset.state() {
            AssetState::Ready | AssetState::Failed => {}
            AssetState::Loading => {
                asset.wait_terminal().await;
            }
            AssetState::Unloaded => match asset.origin() {
                AssetOrigin::Loadable { .. } => {
                    if asset.load().await.is_err() {
                        debug!("[Asset Registry] \"{}\" failed, continuing", asset.id());
                    }
                    // someone else may have won the race to load it
                    asset.wait_terminal().await;
                }
                AssetOrigin::Static => {
                    trace!("[Asset Registry] \"{}\" can't be loaded, skipping", asset.id());
                }
            },
        }
    }

    /// Makes every asset in `assets` ready concurrently. Completes once each one has reached
    /// a terminal state or was skipped. Individual failures don't stop the others.
    pub async fn prepare<'a>(&self, assets: impl IntoIterator<Item = &'a Arc<Asset>>) -> RegistryStats {
        let assets = assets.into_iter().collect::<Vec<_>>();
        join_all(assets.iter().map(|asset| self.ensure_ready(asset))).await;

        let stats = assets.iter().map(|asset| asset.state()).collect::<RegistryStats>();
        debug!(
            "[Asset Registry] Prepared {} assets: {} ready, {} failed, {} skipped",
            stats.total(),
            stats.ready,
            stats.failed,
            stats.unloaded
        );
        stats
    }

    /// [`AssetRegistry::prepare`] by identity. Unknown ids are reported and skipped.
    pub async fn prepare_ids<'a>(&self, ids: impl IntoIterator<Item = &'a AssetId>) -> RegistryStats {
        let assets = ids
            .into_iter()
            .filter_map(|id| {
                let asset = self.get(id);
                if asset.is_none() {
                    warn!("[Asset Registry] Asked to prepare unknown asset \"{id}\"");
                }
                asset
            })
            .collect::<Vec<_>>();
        self.prepare(&assets).await
    }
}
