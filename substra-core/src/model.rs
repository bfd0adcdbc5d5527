//! Asset data model.
//!
//! Every asset is owned by the [store](crate::store). Assets reference each
//! other by key only; a tuple never holds a live reference to its algo,
//! dataset or compute plan.

use std::collections::BTreeSet;
use std::fmt::Display;
use std::path::PathBuf;

use serde::Serialize;
use serde_json::Value;

use crate::error::Error;

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum AssetType {
    Dataset,
    DataSample,
    Algo,
    AggregateAlgo,
    CompositeAlgo,
    Objective,
    Traintuple,
    Testtuple,
    ComputePlan,
}

impl AssetType {
    pub const ALL: [AssetType; 9] = [
        AssetType::Dataset,
        AssetType::DataSample,
        AssetType::Algo,
        AssetType::AggregateAlgo,
        AssetType::CompositeAlgo,
        AssetType::Objective,
        AssetType::Traintuple,
        AssetType::Testtuple,
        AssetType::ComputePlan,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            AssetType::Dataset => "dataset",
            AssetType::DataSample => "data_sample",
            AssetType::Algo => "algo",
            AssetType::AggregateAlgo => "aggregate_algo",
            AssetType::CompositeAlgo => "composite_algo",
            AssetType::Objective => "objective",
            AssetType::Traintuple => "traintuple",
            AssetType::Testtuple => "testtuple",
            AssetType::ComputePlan => "compute_plan",
        }
    }
}

impl Display for AssetType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Lifecycle of an executable tuple, and of a compute plan.
///
/// `Waiting -> Doing -> Done | Failed`; terminal states never change.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    #[default]
    Waiting,
    Doing,
    Done,
    Failed,
}

impl Status {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Status::Done | Status::Failed)
    }

    pub fn can_transition_to(&self, next: Status) -> bool {
        matches!(
            (self, next),
            (Status::Waiting, Status::Doing)
                | (Status::Waiting, Status::Failed)
                | (Status::Doing, Status::Done)
                | (Status::Doing, Status::Failed)
        )
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, Default)]
pub struct Permissions {
    pub public: bool,
    /// Always empty for public permissions.
    pub authorized_ids: BTreeSet<String>,
}

impl Permissions {
    pub fn public() -> Self {
        Permissions {
            public: true,
            authorized_ids: BTreeSet::new(),
        }
    }

    pub fn private<I, S>(ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Permissions {
            public: false,
            authorized_ids: ids.into_iter().map(Into::into).collect(),
        }
    }

    pub fn is_authorized(&self, node_id: &str) -> bool {
        self.public || self.authorized_ids.contains(node_id)
    }
}

/// Common interface of everything kept in the store.
pub trait Asset: Serialize + Clone + Send + Sync + 'static {
    fn key(&self) -> &str;

    /// Public response representation.
    fn to_response(&self) -> Result<Value, Error> {
        Ok(serde_json::to_value(self)?)
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Dataset {
    pub key: String,
    pub owner: String,
    pub name: String,
    #[serde(rename = "type")]
    pub data_type: String,
    pub data_opener: PathBuf,
    pub description: PathBuf,
    pub objective_key: Option<String>,
    pub train_data_sample_keys: Vec<String>,
    pub test_data_sample_keys: Vec<String>,
    pub permissions: Permissions,
}

impl Dataset {
    pub fn contains_sample(&self, key: &str) -> bool {
        self.train_data_sample_keys.iter().any(|k| k == key)
            || self.test_data_sample_keys.iter().any(|k| k == key)
    }

    /// Append a sample key to the train or test list.
    /// Returns false when the key was already present in that list.
    pub fn link_sample(&mut self, key: &str, test_only: bool) -> bool {
        let samples = if test_only {
            &mut self.test_data_sample_keys
        } else {
            &mut self.train_data_sample_keys
        };
        if samples.iter().any(|k| k == key) {
            false
        } else {
            samples.push(key.to_owned());
            true
        }
    }
}

impl Asset for Dataset {
    fn key(&self) -> &str {
        &self.key
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct DataSample {
    pub key: String,
    pub owner: String,
    pub path: PathBuf,
    pub data_manager_keys: Vec<String>,
    pub test_only: bool,
}

impl Asset for DataSample {
    fn key(&self) -> &str {
        &self.key
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum AlgoKind {
    Algo,
    AggregateAlgo,
    CompositeAlgo,
}

impl AlgoKind {
    pub fn asset_type(&self) -> AssetType {
        match self {
            AlgoKind::Algo => AssetType::Algo,
            AlgoKind::AggregateAlgo => AssetType::AggregateAlgo,
            AlgoKind::CompositeAlgo => AssetType::CompositeAlgo,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Algo {
    pub key: String,
    pub owner: String,
    pub name: String,
    pub kind: AlgoKind,
    pub file: PathBuf,
    pub description: PathBuf,
    pub permissions: Permissions,
}

impl Asset for Algo {
    fn key(&self) -> &str {
        &self.key
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct TestDataset {
    pub dataset_key: String,
    pub data_sample_keys: Vec<String>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Objective {
    pub key: String,
    pub owner: String,
    pub name: String,
    pub metrics_name: String,
    pub metrics: PathBuf,
    pub description: PathBuf,
    pub test_dataset: Option<TestDataset>,
    pub permissions: Permissions,
}

impl Asset for Objective {
    fn key(&self) -> &str {
        &self.key
    }
}

/// A parent model consumed by a traintuple.
/// `hash` and `storage_address` stay empty while the parent has no output model.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct InModel {
    pub traintuple_key: String,
    pub hash: Option<String>,
    pub storage_address: Option<PathBuf>,
}

impl InModel {
    pub fn unresolved(traintuple_key: &str) -> Self {
        InModel {
            traintuple_key: traintuple_key.to_owned(),
            hash: None,
            storage_address: None,
        }
    }

    pub fn is_resolved(&self) -> bool {
        self.hash.is_some() && self.storage_address.is_some()
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct OutModel {
    pub hash: String,
    pub storage_address: PathBuf,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct TrainDataset {
    pub opener_hash: String,
    pub keys: Vec<String>,
    pub worker: String,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Traintuple {
    pub key: String,
    pub creator: String,
    pub worker: String,
    pub algo_key: String,
    pub dataset: TrainDataset,
    pub in_models: Vec<InModel>,
    pub permissions: Permissions,
    pub compute_plan_id: Option<String>,
    pub rank: usize,
    pub status: Status,
    pub tag: String,
    pub log: String,
    pub out_model: Option<OutModel>,
}

impl Asset for Traintuple {
    fn key(&self) -> &str {
        &self.key
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct TesttupleDataset {
    pub opener_hash: String,
    pub keys: Vec<String>,
    pub worker: String,
    pub perf: Option<f64>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Testtuple {
    pub key: String,
    pub creator: String,
    pub worker: String,
    pub objective_key: String,
    pub traintuple_key: String,
    pub certified: bool,
    pub dataset: TesttupleDataset,
    pub compute_plan_id: Option<String>,
    pub rank: usize,
    pub status: Status,
    pub tag: String,
    pub log: String,
}

impl Asset for Testtuple {
    fn key(&self) -> &str {
        &self.key
    }
}

/// Member list of a compute plan a tuple is appended to.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum TupleSlot {
    Traintuple,
    Testtuple,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ComputePlan {
    pub compute_plan_id: String,
    pub traintuple_keys: Vec<String>,
    pub testtuple_keys: Vec<String>,
    pub tuple_count: usize,
    pub done_count: usize,
    pub failed_count: usize,
    pub status: Status,
}

impl ComputePlan {
    pub fn new(compute_plan_id: String, member_key: &str, slot: TupleSlot) -> Self {
        let mut plan = ComputePlan {
            compute_plan_id,
            traintuple_keys: vec![],
            testtuple_keys: vec![],
            tuple_count: 0,
            done_count: 0,
            failed_count: 0,
            status: Status::Waiting,
        };
        plan.push_member(member_key, slot);
        plan
    }

    /// Number of members across all slots.
    pub fn member_count(&self) -> usize {
        self.traintuple_keys.len() + self.testtuple_keys.len()
    }

    pub(crate) fn push_member(&mut self, member_key: &str, slot: TupleSlot) {
        match slot {
            TupleSlot::Traintuple => self.traintuple_keys.push(member_key.to_owned()),
            TupleSlot::Testtuple => self.testtuple_keys.push(member_key.to_owned()),
        }
        self.tuple_count += 1;
    }
}

impl Asset for ComputePlan {
    fn key(&self) -> &str {
        &self.compute_plan_id
    }
}
