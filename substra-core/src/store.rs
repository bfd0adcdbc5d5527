//! # Asset store
//!
//! The store is the single owner of all assets. It is organized as an arena:
//! one typed [Collection] per asset type, each mapping keys to an [AssetRef].
//! [AssetRef] is clonable and shared - basically an arc [tokio::sync::RwLock]
//! on the asset - so a mutation made through any handle is what every later
//! [Collection::get] observes. Locks are per asset; unrelated assets never
//! contend.

use std::sync::Arc;

use serde_json::Value;
use tokio::sync::{Mutex, OwnedMutexGuard, RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::error::Error;
use crate::model::{
    AlgoKind, Algo, Asset, AssetType, ComputePlan, DataSample, Dataset, Objective, Testtuple,
    Traintuple,
};

pub struct AssetRef<T: Asset> {
    data: Arc<RwLock<T>>,
}

impl<T: Asset> Clone for AssetRef<T> {
    fn clone(&self) -> Self {
        AssetRef {
            data: self.data.clone(),
        }
    }
}

impl<T: Asset> AssetRef<T> {
    fn new(asset: T) -> Self {
        AssetRef {
            data: Arc::new(RwLock::new(asset)),
        }
    }

    pub async fn read(&self) -> RwLockReadGuard<'_, T> {
        self.data.read().await
    }

    pub async fn write(&self) -> RwLockWriteGuard<'_, T> {
        self.data.write().await
    }

    /// Copy of the current state of the asset.
    pub async fn snapshot(&self) -> T {
        self.data.read().await.clone()
    }

    pub async fn to_response(&self) -> Result<Value, Error> {
        self.data.read().await.to_response()
    }

    /// True if both handles point to the same stored asset.
    pub fn same_asset(&self, other: &AssetRef<T>) -> bool {
        Arc::ptr_eq(&self.data, &other.data)
    }
}

pub struct Collection<T: Asset> {
    asset_type: AssetType,
    assets: scc::HashMap<String, AssetRef<T>>,
    /// Keys in insertion order. Also serializes inserts.
    order: Mutex<Vec<String>>,
}

impl<T: Asset> Collection<T> {
    pub fn new(asset_type: AssetType) -> Self {
        Collection {
            asset_type,
            assets: scc::HashMap::new(),
            order: Mutex::new(Vec::new()),
        }
    }

    pub fn asset_type(&self) -> AssetType {
        self.asset_type
    }

    pub async fn get(&self, key: &str) -> Result<AssetRef<T>, Error> {
        self.assets
            .read_async(key, |_, asset| asset.clone())
            .await
            .ok_or_else(|| Error::not_found(self.asset_type, key))
    }

    pub async fn contains(&self, key: &str) -> bool {
        self.assets.contains_async(key).await
    }

    /// Add an asset.
    ///
    /// When the key is taken, the stored asset is returned unchanged if
    /// `exist_ok` is set, otherwise the call fails with `AlreadyExists`.
    pub async fn add(&self, asset: T, exist_ok: bool) -> Result<AssetRef<T>, Error> {
        let key = asset.key().to_owned();
        let mut order = self.order.lock().await;
        if let Some(existing) = self.assets.read_async(&key, |_, a| a.clone()).await {
            if exist_ok {
                tracing::debug!("{} '{}' already exists, reusing it", self.asset_type, key);
                return Ok(existing);
            }
            return Err(Error::already_exists(self.asset_type, &key));
        }
        let assetref = AssetRef::new(asset);
        self.assets
            .insert_async(key.clone(), assetref.clone())
            .await
            .map_err(|_| Error::already_exists(self.asset_type, &key))?;
        order.push(key);
        Ok(assetref)
    }

    /// All assets in insertion order.
    pub async fn list(&self) -> Vec<AssetRef<T>> {
        let keys = self.order.lock().await.clone();
        let mut assets = Vec::with_capacity(keys.len());
        for key in keys {
            if let Some(asset) = self.assets.read_async(&key, |_, a| a.clone()).await {
                assets.push(asset);
            }
        }
        assets
    }

    pub async fn len(&self) -> usize {
        self.order.lock().await.len()
    }

    async fn get_response(&self, key: &str) -> Result<Value, Error> {
        self.get(key).await?.to_response().await
    }

    async fn list_responses(&self) -> Result<Vec<Value>, Error> {
        let mut responses = Vec::new();
        for asset in self.list().await {
            responses.push(asset.to_response().await?);
        }
        Ok(responses)
    }
}

/// Named mutexes created on first use.
///
/// Guards a whole operation on one asset or plan (e.g. the creation of a
/// tuple) without making unrelated keys wait on each other.
#[derive(Default)]
pub struct KeyedLocks {
    locks: scc::HashMap<String, Arc<Mutex<()>>>,
}

impl KeyedLocks {
    pub fn new() -> Self {
        KeyedLocks {
            locks: scc::HashMap::new(),
        }
    }

    /// Wait for the lock of `key`; it is held until the guard is dropped.
    pub async fn lock(&self, key: &str) -> OwnedMutexGuard<()> {
        let lock = self
            .locks
            .entry_async(key.to_owned())
            .await
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .get()
            .clone();
        lock.lock_owned().await
    }
}

/// Arena of all asset collections.
pub struct AssetStore {
    datasets: Collection<Dataset>,
    data_samples: Collection<DataSample>,
    algos: Collection<Algo>,
    aggregate_algos: Collection<Algo>,
    composite_algos: Collection<Algo>,
    objectives: Collection<Objective>,
    traintuples: Collection<Traintuple>,
    testtuples: Collection<Testtuple>,
    compute_plans: Collection<ComputePlan>,
}

impl Default for AssetStore {
    fn default() -> Self {
        Self::new()
    }
}

impl AssetStore {
    pub fn new() -> Self {
        AssetStore {
            datasets: Collection::new(AssetType::Dataset),
            data_samples: Collection::new(AssetType::DataSample),
            algos: Collection::new(AssetType::Algo),
            aggregate_algos: Collection::new(AssetType::AggregateAlgo),
            composite_algos: Collection::new(AssetType::CompositeAlgo),
            objectives: Collection::new(AssetType::Objective),
            traintuples: Collection::new(AssetType::Traintuple),
            testtuples: Collection::new(AssetType::Testtuple),
            compute_plans: Collection::new(AssetType::ComputePlan),
        }
    }

    pub fn datasets(&self) -> &Collection<Dataset> {
        &self.datasets
    }

    pub fn data_samples(&self) -> &Collection<DataSample> {
        &self.data_samples
    }

    pub fn algos(&self, kind: AlgoKind) -> &Collection<Algo> {
        match kind {
            AlgoKind::Algo => &self.algos,
            AlgoKind::AggregateAlgo => &self.aggregate_algos,
            AlgoKind::CompositeAlgo => &self.composite_algos,
        }
    }

    pub fn objectives(&self) -> &Collection<Objective> {
        &self.objectives
    }

    pub fn traintuples(&self) -> &Collection<Traintuple> {
        &self.traintuples
    }

    pub fn testtuples(&self) -> &Collection<Testtuple> {
        &self.testtuples
    }

    pub fn compute_plans(&self) -> &Collection<ComputePlan> {
        &self.compute_plans
    }

    /// Response representation of an asset of any type.
    pub async fn get_response(&self, asset_type: AssetType, key: &str) -> Result<Value, Error> {
        match asset_type {
            AssetType::Dataset => self.datasets.get_response(key).await,
            AssetType::DataSample => self.data_samples.get_response(key).await,
            AssetType::Algo => self.algos.get_response(key).await,
            AssetType::AggregateAlgo => self.aggregate_algos.get_response(key).await,
            AssetType::CompositeAlgo => self.composite_algos.get_response(key).await,
            AssetType::Objective => self.objectives.get_response(key).await,
            AssetType::Traintuple => self.traintuples.get_response(key).await,
            AssetType::Testtuple => self.testtuples.get_response(key).await,
            AssetType::ComputePlan => self.compute_plans.get_response(key).await,
        }
    }

    /// Response representations of all assets of a type, in insertion order.
    pub async fn list_responses(&self, asset_type: AssetType) -> Result<Vec<Value>, Error> {
        match asset_type {
            AssetType::Dataset => self.datasets.list_responses().await,
            AssetType::DataSample => self.data_samples.list_responses().await,
            AssetType::Algo => self.algos.list_responses().await,
            AssetType::AggregateAlgo => self.aggregate_algos.list_responses().await,
            AssetType::CompositeAlgo => self.composite_algos.list_responses().await,
            AssetType::Objective => self.objectives.list_responses().await,
            AssetType::Traintuple => self.traintuples.list_responses().await,
            AssetType::Testtuple => self.testtuples.list_responses().await,
            AssetType::ComputePlan => self.compute_plans.list_responses().await,
        }
    }
}
