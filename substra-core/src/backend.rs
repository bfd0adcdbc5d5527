//! # Local backend
//!
//! [Local] is the entry point of the engine. It turns [AssetSpec]s into stored
//! assets:
//!
//! 1) referenced assets are fetched from the store (`NotFound` otherwise)
//! 2) the key is derived from the content (files) or from the references (tuples)
//! 3) permissions are resolved
//! 4) tuples are placed in a compute plan and get a rank
//! 5) the asset is stored and, for tuples, run by the [Worker] before the
//!    response is returned.
//!
//! All validation happens before the first mutation. Execution failures never
//! surface as errors: the tuple is returned with status `failed`.

use std::collections::{BTreeSet, HashMap};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use itertools::Itertools;
use serde_json::Value;

use crate::compute_plan::ComputePlanManager;
use crate::config::EngineConfig;
use crate::error::Error;
use crate::executor::Executor;
use crate::hasher;
use crate::model::{
    AlgoKind, Algo, Asset, AssetType, ComputePlan, DataSample, Dataset, InModel, Objective,
    Permissions, Status, TestDataset, Testtuple, TesttupleDataset, TrainDataset, Traintuple,
    TupleSlot,
};
use crate::permissions::PermissionResolver;
use crate::specs::{
    AlgoSpec, AssetSpec, ComputePlanSpec, DataSampleSpec, DataSamplesSpec, DatasetSpec,
    ObjectiveSpec, TesttupleSpec, TraintupleSpec,
};
use crate::store::{AssetRef, AssetStore, Collection, KeyedLocks};
use crate::worker::{CancelToken, Worker};

/// Outcome of an operation the local backend may not provide.
#[derive(Debug, Clone, PartialEq)]
pub enum Support<T> {
    Supported(T),
    Unsupported(&'static str),
}

impl<T> Support<T> {
    pub fn is_supported(&self) -> bool {
        matches!(self, Support::Supported(_))
    }

    pub fn into_result(self) -> Result<T, Error> {
        match self {
            Support::Supported(value) => Ok(value),
            Support::Unsupported(operation) => Err(Error::not_implemented(operation)),
        }
    }
}

pub struct Local {
    config: EngineConfig,
    store: Arc<AssetStore>,
    plans: Arc<ComputePlanManager>,
    permissions: PermissionResolver,
    worker: Worker,
    /// Per tuple key: serializes the existence check, plan placement and
    /// insertion of identical creates.
    creation: KeyedLocks,
}

impl Local {
    pub fn new(config: EngineConfig, executor: Arc<dyn Executor>) -> Self {
        let store = Arc::new(AssetStore::new());
        let plans = Arc::new(ComputePlanManager::new(store.clone()));
        let worker = Worker::new(store.clone(), plans.clone(), executor, &config);
        Local {
            permissions: PermissionResolver::new(&config.node_id),
            config,
            store,
            plans,
            worker,
            creation: KeyedLocks::new(),
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn store(&self) -> &AssetStore {
        &self.store
    }

    fn node_id(&self) -> String {
        self.config.node_id.clone()
    }

    pub async fn get(&self, asset_type: AssetType, key: &str) -> Result<Value, Error> {
        self.store.get_response(asset_type, key).await
    }

    pub async fn list(&self, asset_type: AssetType) -> Result<Vec<Value>, Error> {
        self.store.list_responses(asset_type).await
    }

    /// Create the asset described by `spec` and return its response.
    /// Data samples specs return an array of responses.
    pub async fn add(&self, spec: AssetSpec, exist_ok: bool) -> Result<Value, Error> {
        self.add_cancellable(spec, exist_ok, &CancelToken::new())
            .await
    }

    /// Like [Local::add]; tuples run while `cancel` is untriggered.
    pub async fn add_cancellable(
        &self,
        spec: AssetSpec,
        exist_ok: bool,
        cancel: &CancelToken,
    ) -> Result<Value, Error> {
        tracing::debug!("Adding {}", spec.asset_type());
        match spec {
            AssetSpec::Dataset(spec) => {
                self.add_dataset(spec, exist_ok)
                    .await?
                    .to_response()
                    .await
            }
            AssetSpec::DataSample(spec) => {
                self.add_data_sample(spec, exist_ok)
                    .await?
                    .to_response()
                    .await
            }
            AssetSpec::DataSamples(spec) => {
                let mut responses = Vec::new();
                for sample in self.add_data_samples(spec, exist_ok).await? {
                    responses.push(sample.to_response().await?);
                }
                Ok(Value::Array(responses))
            }
            AssetSpec::Objective(spec) => {
                self.add_objective(spec, exist_ok)
                    .await?
                    .to_response()
                    .await
            }
            AssetSpec::Algo(spec) => {
                self.add_algo(AlgoKind::Algo, spec, exist_ok)
                    .await?
                    .to_response()
                    .await
            }
            AssetSpec::AggregateAlgo(spec) => {
                self.add_algo(AlgoKind::AggregateAlgo, spec, exist_ok)
                    .await?
                    .to_response()
                    .await
            }
            AssetSpec::CompositeAlgo(spec) => {
                self.add_algo(AlgoKind::CompositeAlgo, spec, exist_ok)
                    .await?
                    .to_response()
                    .await
            }
            AssetSpec::Traintuple(spec) => {
                self.add_traintuple(spec, exist_ok, cancel)
                    .await?
                    .to_response()
                    .await
            }
            AssetSpec::Testtuple(spec) => {
                self.add_testtuple(spec, exist_ok, cancel)
                    .await?
                    .to_response()
                    .await
            }
            AssetSpec::ComputePlan(spec) => {
                self.add_compute_plan(spec, exist_ok, cancel)
                    .await?
                    .to_response()
                    .await
            }
        }
    }

    pub async fn add_dataset(
        &self,
        spec: DatasetSpec,
        exist_ok: bool,
    ) -> Result<AssetRef<Dataset>, Error> {
        if let Some(objective_key) = &spec.objective_key {
            self.store.objectives().get(objective_key).await?;
        }
        let key = hasher::hash_file(&spec.data_opener)?;
        tracing::info!("Adding dataset {} ({})", key, spec.name);
        let dataset = Dataset {
            key,
            owner: self.node_id(),
            name: spec.name,
            data_type: spec.data_type,
            data_opener: spec.data_opener,
            description: spec.description,
            objective_key: spec.objective_key,
            train_data_sample_keys: vec![],
            test_data_sample_keys: vec![],
            permissions: self.permissions.leaf(&spec.permissions),
        };
        self.store.datasets().add(dataset, exist_ok).await
    }

    pub async fn add_data_sample(
        &self,
        spec: DataSampleSpec,
        exist_ok: bool,
    ) -> Result<AssetRef<DataSample>, Error> {
        let mut samples = self
            .create_data_samples(
                std::slice::from_ref(&spec.path),
                &spec.data_manager_keys,
                spec.test_only,
                exist_ok,
            )
            .await?;
        samples
            .pop()
            .ok_or_else(|| Error::general_error("No data sample created".to_owned()))
    }

    pub async fn add_data_samples(
        &self,
        spec: DataSamplesSpec,
        exist_ok: bool,
    ) -> Result<Vec<AssetRef<DataSample>>, Error> {
        self.create_data_samples(&spec.paths, &spec.data_manager_keys, spec.test_only, exist_ok)
            .await
    }

    async fn create_data_samples(
        &self,
        paths: &[PathBuf],
        data_manager_keys: &[String],
        test_only: bool,
        exist_ok: bool,
    ) -> Result<Vec<AssetRef<DataSample>>, Error> {
        if data_manager_keys.is_empty() {
            return Err(Error::invalid_request(
                "Data samples must be linked to at least one dataset".to_owned(),
            ));
        }
        let mut datasets = Vec::with_capacity(data_manager_keys.len());
        for key in data_manager_keys {
            datasets.push(self.store.datasets().get(key).await?);
        }

        let mut keyed = Vec::with_capacity(paths.len());
        for path in paths {
            keyed.push((hasher::hash_directory(path)?, path.clone()));
        }
        let keyed: Vec<(String, PathBuf)> = keyed
            .into_iter()
            .unique_by(|(key, _)| key.clone())
            .collect();
        if !exist_ok {
            for (key, _) in &keyed {
                if self.store.data_samples().contains(key).await {
                    return Err(Error::already_exists(AssetType::DataSample, key));
                }
            }
        }

        let mut samples = Vec::with_capacity(keyed.len());
        for (key, path) in keyed {
            tracing::info!("Adding data sample {}", key);
            let sample = DataSample {
                key,
                owner: self.node_id(),
                path,
                data_manager_keys: data_manager_keys.to_vec(),
                test_only,
            };
            let sample = self.store.data_samples().add(sample, exist_ok).await?;
            {
                let mut stored = sample.write().await;
                for dataset_key in data_manager_keys {
                    if !stored.data_manager_keys.contains(dataset_key) {
                        stored.data_manager_keys.push(dataset_key.clone());
                    }
                }
            }
            samples.push(sample);
        }

        for dataset in &datasets {
            let mut dataset = dataset.write().await;
            for sample in &samples {
                let key = sample.read().await.key.clone();
                dataset.link_sample(&key, test_only);
            }
        }
        Ok(samples)
    }

    pub async fn add_objective(
        &self,
        spec: ObjectiveSpec,
        exist_ok: bool,
    ) -> Result<AssetRef<Objective>, Error> {
        let key = hasher::hash_file(&spec.metrics)?;
        let test_dataset = match &spec.test_data_manager_key {
            Some(dataset_key) => {
                let dataset = self.store.datasets().get(dataset_key).await?;
                let snapshot = dataset.snapshot().await;
                self.check_samples(&snapshot, &spec.test_data_sample_keys)
                    .await?;
                if let Some(linked) = snapshot
                    .objective_key
                    .as_ref()
                    .filter(|linked| **linked != key)
                {
                    return Err(Error::invalid_request(format!(
                        "Dataset '{}' is already linked to objective '{}'",
                        dataset_key, linked
                    )));
                }
                Some((
                    dataset,
                    TestDataset {
                        dataset_key: dataset_key.clone(),
                        data_sample_keys: spec.test_data_sample_keys.clone(),
                    },
                ))
            }
            None if !spec.test_data_sample_keys.is_empty() => {
                return Err(Error::invalid_request(
                    "Test data samples require a test dataset".to_owned(),
                ))
            }
            None => None,
        };

        tracing::info!("Adding objective {} ({})", key, spec.name);
        let objective = Objective {
            key: key.clone(),
            owner: self.node_id(),
            name: spec.name,
            metrics_name: spec.metrics_name,
            metrics: spec.metrics,
            description: spec.description,
            test_dataset: test_dataset.as_ref().map(|(_, test)| test.clone()),
            permissions: self.permissions.leaf(&spec.permissions),
        };
        let objective = self.store.objectives().add(objective, exist_ok).await?;
        if let Some((dataset, _)) = test_dataset {
            dataset.write().await.objective_key = Some(key);
        }
        Ok(objective)
    }

    pub async fn add_algo(
        &self,
        kind: AlgoKind,
        spec: AlgoSpec,
        exist_ok: bool,
    ) -> Result<AssetRef<Algo>, Error> {
        let key = hasher::hash_file(&spec.file)?;
        tracing::info!("Adding {} {} ({})", kind.asset_type(), key, spec.name);
        let algo = Algo {
            key,
            owner: self.node_id(),
            name: spec.name,
            kind,
            file: spec.file,
            description: spec.description,
            permissions: self.permissions.leaf(&spec.permissions),
        };
        self.store.algos(kind).add(algo, exist_ok).await
    }

    /// Create a traintuple and run it.
    pub async fn add_traintuple(
        &self,
        spec: TraintupleSpec,
        exist_ok: bool,
        cancel: &CancelToken,
    ) -> Result<AssetRef<Traintuple>, Error> {
        let algo = self
            .store
            .algos(AlgoKind::Algo)
            .get(&spec.algo_key)
            .await?
            .snapshot()
            .await;
        let dataset = self
            .store
            .datasets()
            .get(&spec.data_manager_key)
            .await?
            .snapshot()
            .await;
        self.check_samples(&dataset, &spec.train_data_sample_keys)
            .await?;
        let mut parents = Vec::with_capacity(spec.in_models_keys.len());
        for key in &spec.in_models_keys {
            parents.push(self.store.traintuples().get(key).await?.snapshot().await);
        }

        let key = hasher::hash_values(
            [
                self.config.node_id.as_str(),
                spec.algo_key.as_str(),
                spec.data_manager_key.as_str(),
            ]
            .into_iter()
            .chain(spec.train_data_sample_keys.iter().map(String::as_str))
            .chain(spec.in_models_keys.iter().map(String::as_str)),
        );

        let traintuple = {
            let _creation = self.creation.lock(&key).await;
            if let Some(existing) = existing(self.store.traintuples(), &key, exist_ok).await? {
                return Ok(existing);
            }
            self.plans
                .validate_placement(spec.compute_plan_id.as_deref(), spec.rank)
                .await?;

            let producers: Vec<&Permissions> = [&algo.permissions, &dataset.permissions]
                .into_iter()
                .chain(parents.iter().map(|p| &p.permissions))
                .collect();
            let permissions = self.permissions.intersect(producers);
            let in_models = parents
                .iter()
                .map(|parent| match &parent.out_model {
                    Some(model) => InModel {
                        traintuple_key: parent.key.clone(),
                        hash: Some(model.hash.clone()),
                        storage_address: Some(model.storage_address.clone()),
                    },
                    None => InModel::unresolved(&parent.key),
                })
                .collect();

            let (plan_id, rank) = self
                .plans
                .place_traintuple(spec.compute_plan_id.as_deref(), spec.rank, &key)
                .await?;
            tracing::info!("Adding traintuple {} (plan {}, rank {})", key, plan_id, rank);
            let traintuple = Traintuple {
                key: key.clone(),
                creator: self.node_id(),
                worker: self.node_id(),
                algo_key: spec.algo_key,
                dataset: TrainDataset {
                    opener_hash: spec.data_manager_key,
                    keys: spec.train_data_sample_keys,
                    worker: self.node_id(),
                },
                in_models,
                permissions,
                compute_plan_id: Some(plan_id),
                rank,
                status: Status::Waiting,
                tag: spec.tag,
                log: String::new(),
                out_model: None,
            };
            self.store.traintuples().add(traintuple, false).await?
        };

        self.worker.run_traintuple(&traintuple, cancel).await?;
        Ok(traintuple)
    }

    /// Create a testtuple and run it.
    ///
    /// Without a dataset the objective's test dataset is used, which makes the
    /// testtuple certified.
    pub async fn add_testtuple(
        &self,
        spec: TesttupleSpec,
        exist_ok: bool,
        cancel: &CancelToken,
    ) -> Result<AssetRef<Testtuple>, Error> {
        let objective = self
            .store
            .objectives()
            .get(&spec.objective_key)
            .await?
            .snapshot()
            .await;
        let traintuple = self
            .store
            .traintuples()
            .get(&spec.traintuple_key)
            .await?
            .snapshot()
            .await;
        let (dataset_key, sample_keys) = match (&spec.data_manager_key, &objective.test_dataset) {
            (Some(dataset_key), _) => (dataset_key.clone(), spec.test_data_sample_keys.clone()),
            (None, Some(_)) if !spec.test_data_sample_keys.is_empty() => {
                return Err(Error::invalid_request(
                    "Test data samples require a dataset".to_owned(),
                ))
            }
            (None, Some(test)) => (test.dataset_key.clone(), test.data_sample_keys.clone()),
            (None, None) => {
                return Err(Error::invalid_request(format!(
                    "Objective '{}' has no test dataset",
                    objective.key
                )))
            }
        };
        let dataset = self
            .store
            .datasets()
            .get(&dataset_key)
            .await?
            .snapshot()
            .await;
        self.check_samples(&dataset, &sample_keys).await?;
        let certified = objective.test_dataset.as_ref().is_some_and(|test| {
            test.dataset_key == dataset_key
                && test.data_sample_keys.iter().collect::<BTreeSet<_>>()
                    == sample_keys.iter().collect::<BTreeSet<_>>()
        });

        let key = hasher::hash_values(
            [
                self.config.node_id.as_str(),
                spec.traintuple_key.as_str(),
                spec.objective_key.as_str(),
                dataset_key.as_str(),
            ]
            .into_iter()
            .chain(sample_keys.iter().map(String::as_str)),
        );

        let testtuple = {
            let _creation = self.creation.lock(&key).await;
            if let Some(existing) = existing(self.store.testtuples(), &key, exist_ok).await? {
                return Ok(existing);
            }
            if let Some(plan_id) = &traintuple.compute_plan_id {
                self.plans
                    .attach_inherited(plan_id, &key, TupleSlot::Testtuple)
                    .await?;
            }
            tracing::info!(
                "Adding testtuple {} (traintuple {}, certified {})",
                key,
                traintuple.key,
                certified
            );
            let testtuple = Testtuple {
                key: key.clone(),
                creator: self.node_id(),
                worker: self.node_id(),
                objective_key: spec.objective_key,
                traintuple_key: spec.traintuple_key,
                certified,
                dataset: TesttupleDataset {
                    opener_hash: dataset_key,
                    keys: sample_keys,
                    worker: self.node_id(),
                    perf: None,
                },
                compute_plan_id: traintuple.compute_plan_id.clone(),
                rank: traintuple.rank,
                status: Status::Waiting,
                tag: spec.tag,
                log: String::new(),
            };
            self.store.testtuples().add(testtuple, false).await?
        };

        self.worker.run_testtuple(&testtuple, cancel).await?;
        Ok(testtuple)
    }

    /// Create a new compute plan from a graph of traintuples and their testtuples.
    pub async fn add_compute_plan(
        &self,
        spec: ComputePlanSpec,
        exist_ok: bool,
        cancel: &CancelToken,
    ) -> Result<AssetRef<ComputePlan>, Error> {
        if spec.traintuples.is_empty() {
            return Err(Error::invalid_request(
                "A compute plan needs at least one traintuple".to_owned(),
            ));
        }
        self.submit_plan(None, spec, exist_ok, cancel).await
    }

    /// Add traintuples and testtuples to an existing compute plan.
    pub async fn update_compute_plan(
        &self,
        compute_plan_id: &str,
        spec: ComputePlanSpec,
        cancel: &CancelToken,
    ) -> Result<AssetRef<ComputePlan>, Error> {
        self.store.compute_plans().get(compute_plan_id).await?;
        self.submit_plan(Some(compute_plan_id), spec, true, cancel)
            .await
    }

    async fn submit_plan(
        &self,
        compute_plan_id: Option<&str>,
        spec: ComputePlanSpec,
        exist_ok: bool,
        cancel: &CancelToken,
    ) -> Result<AssetRef<ComputePlan>, Error> {
        let ordered = spec.ordered_traintuples()?;
        for traintuple in &ordered {
            self.store
                .algos(AlgoKind::Algo)
                .get(&traintuple.algo_key)
                .await?;
            let dataset = self
                .store
                .datasets()
                .get(&traintuple.data_manager_key)
                .await?
                .snapshot()
                .await;
            self.check_samples(&dataset, &traintuple.train_data_sample_keys)
                .await?;
        }
        for testtuple in &spec.testtuples {
            self.store.objectives().get(&testtuple.objective_key).await?;
        }

        let mut plan_id = compute_plan_id.map(str::to_owned);
        let mut keys: HashMap<&str, String> = HashMap::new();
        for traintuple in ordered {
            let in_models_keys = traintuple
                .in_models_ids
                .iter()
                .map(|id| resolve_id(&keys, id))
                .collect::<Result<Vec<_>, _>>()?;
            let created = self
                .add_traintuple(
                    TraintupleSpec {
                        algo_key: traintuple.algo_key.clone(),
                        data_manager_key: traintuple.data_manager_key.clone(),
                        train_data_sample_keys: traintuple.train_data_sample_keys.clone(),
                        in_models_keys,
                        tag: traintuple.tag.clone(),
                        compute_plan_id: plan_id.clone(),
                        rank: None,
                    },
                    exist_ok,
                    cancel,
                )
                .await?;
            let created = created.read().await;
            if plan_id.is_none() {
                plan_id = created.compute_plan_id.clone();
            }
            keys.insert(&traintuple.traintuple_id, created.key.clone());
        }
        for testtuple in &spec.testtuples {
            self.add_testtuple(
                TesttupleSpec {
                    objective_key: testtuple.objective_key.clone(),
                    traintuple_key: resolve_id(&keys, &testtuple.traintuple_id)?,
                    data_manager_key: testtuple.data_manager_key.clone(),
                    test_data_sample_keys: testtuple.test_data_sample_keys.clone(),
                    tag: testtuple.tag.clone(),
                },
                exist_ok,
                cancel,
            )
            .await?;
        }

        let plan_id = plan_id
            .ok_or_else(|| Error::general_error("Compute plan was not created".to_owned()))?;
        self.store.compute_plans().get(&plan_id).await
    }

    /// Fail with `InvalidRequest` unless every sample exists and belongs to the dataset.
    async fn check_samples(&self, dataset: &Dataset, sample_keys: &[String]) -> Result<(), Error> {
        for key in sample_keys {
            self.store.data_samples().get(key).await?;
            if !dataset.contains_sample(key) {
                return Err(Error::invalid_request(format!(
                    "Data sample '{}' does not belong to dataset '{}'",
                    key, dataset.key
                )));
            }
        }
        Ok(())
    }

    pub async fn link_dataset_with_objective(
        &self,
        dataset_key: &str,
        objective_key: &str,
    ) -> Result<Value, Error> {
        self.store.objectives().get(objective_key).await?;
        let dataset = self.store.datasets().get(dataset_key).await?;
        let mut dataset = dataset.write().await;
        if let Some(linked) = &dataset.objective_key {
            return Err(Error::invalid_request(format!(
                "Dataset '{}' is already linked to objective '{}'",
                dataset_key, linked
            )));
        }
        dataset.objective_key = Some(objective_key.to_owned());
        tracing::info!("Linked dataset {} with objective {}", dataset_key, objective_key);
        dataset.to_response()
    }

    /// Link existing samples to the train samples of a dataset.
    /// Samples already linked to the dataset are skipped and reported.
    pub async fn link_dataset_with_data_samples(
        &self,
        dataset_key: &str,
        data_sample_keys: &[String],
    ) -> Result<Value, Error> {
        let dataset = self.store.datasets().get(dataset_key).await?;
        let mut samples = Vec::with_capacity(data_sample_keys.len());
        for key in data_sample_keys {
            samples.push(self.store.data_samples().get(key).await?);
        }

        let mut linked = Vec::new();
        let mut skipped = Vec::new();
        {
            let mut dataset = dataset.write().await;
            for key in data_sample_keys {
                if !dataset.contains_sample(key) && dataset.link_sample(key, false) {
                    linked.push(key.clone());
                } else {
                    skipped.push(key.clone());
                }
            }
        }
        for sample in samples {
            let mut sample = sample.write().await;
            if linked.contains(&sample.key)
                && !sample.data_manager_keys.iter().any(|k| k == dataset_key)
            {
                sample.data_manager_keys.push(dataset_key.to_owned());
            }
        }
        if !skipped.is_empty() {
            tracing::warn!(
                "Data samples already linked to dataset {}: {}",
                dataset_key,
                skipped.iter().join(", ")
            );
        }
        Ok(serde_json::json!({
            "dataset_key": dataset_key,
            "linked": linked,
            "skipped": skipped,
        }))
    }

    /// Copy the main file of an asset (opener, algo file or metrics) into the
    /// `destination` folder and return the path of the copy.
    pub async fn download(
        &self,
        asset_type: AssetType,
        key: &str,
        destination: &Path,
    ) -> Result<PathBuf, Error> {
        let source = match asset_type {
            AssetType::Dataset => {
                self.store
                    .datasets()
                    .get(key)
                    .await?
                    .read()
                    .await
                    .data_opener
                    .clone()
            }
            AssetType::Algo | AssetType::AggregateAlgo | AssetType::CompositeAlgo => {
                self.store
                    .algos(algo_kind(asset_type)?)
                    .get(key)
                    .await?
                    .read()
                    .await
                    .file
                    .clone()
            }
            AssetType::Objective => {
                self.store
                    .objectives()
                    .get(key)
                    .await?
                    .read()
                    .await
                    .metrics
                    .clone()
            }
            _ => {
                return Err(Error::invalid_request(format!(
                    "{} has no file to download",
                    asset_type
                )))
            }
        };
        let file_name = source.file_name().ok_or_else(|| {
            Error::invalid_request(format!("'{}' is not a file", source.display()))
        })?;
        tokio::fs::create_dir_all(destination).await?;
        let target = destination.join(file_name);
        tokio::fs::copy(&source, &target).await?;
        tracing::debug!("Downloaded {} {} to {}", asset_type, key, target.display());
        Ok(target)
    }

    /// Content of the description file of an asset.
    pub async fn describe(&self, asset_type: AssetType, key: &str) -> Result<String, Error> {
        let description = match asset_type {
            AssetType::Dataset => {
                self.store
                    .datasets()
                    .get(key)
                    .await?
                    .read()
                    .await
                    .description
                    .clone()
            }
            AssetType::Algo | AssetType::AggregateAlgo | AssetType::CompositeAlgo => {
                self.store
                    .algos(algo_kind(asset_type)?)
                    .get(key)
                    .await?
                    .read()
                    .await
                    .description
                    .clone()
            }
            AssetType::Objective => {
                self.store
                    .objectives()
                    .get(key)
                    .await?
                    .read()
                    .await
                    .description
                    .clone()
            }
            _ => {
                return Err(Error::invalid_request(format!(
                    "{} has no description",
                    asset_type
                )))
            }
        };
        Ok(tokio::fs::read_to_string(description).await?)
    }

    pub fn leaderboard(&self, _objective_key: &str) -> Support<Value> {
        Support::Unsupported("leaderboard")
    }

    pub fn cancel_compute_plan(&self, _compute_plan_id: &str) -> Support<Value> {
        Support::Unsupported("cancel_compute_plan")
    }
}

/// Stored asset for an idempotent create, `AlreadyExists` for a strict one.
async fn existing<T: Asset>(
    collection: &Collection<T>,
    key: &str,
    exist_ok: bool,
) -> Result<Option<AssetRef<T>>, Error> {
    if !collection.contains(key).await {
        return Ok(None);
    }
    if !exist_ok {
        return Err(Error::already_exists(collection.asset_type(), key));
    }
    tracing::debug!("{} '{}' already exists, reusing it", collection.asset_type(), key);
    collection.get(key).await.map(Some)
}

fn resolve_id(keys: &HashMap<&str, String>, id: &str) -> Result<String, Error> {
    keys.get(id).cloned().ok_or_else(|| {
        Error::invalid_request(format!("Unknown traintuple id '{}' in compute plan", id))
    })
}

fn algo_kind(asset_type: AssetType) -> Result<AlgoKind, Error> {
    match asset_type {
        AssetType::Algo => Ok(AlgoKind::Algo),
        AssetType::AggregateAlgo => Ok(AlgoKind::AggregateAlgo),
        AssetType::CompositeAlgo => Ok(AlgoKind::CompositeAlgo),
        _ => Err(Error::invalid_request(format!("{} is not an algo", asset_type))),
    }
}
