//! Input specs accepted by [Local::add](crate::backend::Local::add).
//!
//! Specs are assumed to be schema-valid; cross-asset checks (existence,
//! membership, linking) are done by the backend.

use std::collections::{BTreeSet, HashSet};
use std::path::PathBuf;

use crate::error::Error;
use crate::model::{AlgoKind, AssetType};
use crate::permissions::PermissionsSpec;

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct DatasetSpec {
    pub name: String,
    pub data_opener: PathBuf,
    #[serde(rename = "type")]
    pub data_type: String,
    pub description: PathBuf,
    #[serde(default)]
    pub permissions: PermissionsSpec,
    #[serde(default)]
    pub objective_key: Option<String>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct DataSampleSpec {
    pub path: PathBuf,
    pub data_manager_keys: Vec<String>,
    #[serde(default)]
    pub test_only: bool,
}

/// Several samples linked to the same datasets.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct DataSamplesSpec {
    pub paths: Vec<PathBuf>,
    pub data_manager_keys: Vec<String>,
    #[serde(default)]
    pub test_only: bool,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ObjectiveSpec {
    pub name: String,
    pub description: PathBuf,
    pub metrics_name: String,
    pub metrics: PathBuf,
    #[serde(default)]
    pub test_data_manager_key: Option<String>,
    #[serde(default)]
    pub test_data_sample_keys: Vec<String>,
    #[serde(default)]
    pub permissions: PermissionsSpec,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct AlgoSpec {
    pub name: String,
    pub description: PathBuf,
    pub file: PathBuf,
    #[serde(default)]
    pub permissions: PermissionsSpec,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
pub struct TraintupleSpec {
    pub algo_key: String,
    pub data_manager_key: String,
    pub train_data_sample_keys: Vec<String>,
    #[serde(default)]
    pub in_models_keys: Vec<String>,
    #[serde(default)]
    pub tag: String,
    #[serde(default)]
    pub compute_plan_id: Option<String>,
    #[serde(default)]
    pub rank: Option<usize>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
pub struct TesttupleSpec {
    pub objective_key: String,
    pub traintuple_key: String,
    /// Defaults to the test dataset of the objective.
    #[serde(default)]
    pub data_manager_key: Option<String>,
    #[serde(default)]
    pub test_data_sample_keys: Vec<String>,
    #[serde(default)]
    pub tag: String,
}

/// Traintuple of a compute plan, referring to its parents by local id.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
pub struct ComputePlanTraintupleSpec {
    pub traintuple_id: String,
    pub algo_key: String,
    pub data_manager_key: String,
    pub train_data_sample_keys: Vec<String>,
    #[serde(default)]
    pub in_models_ids: Vec<String>,
    #[serde(default)]
    pub tag: String,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
pub struct ComputePlanTesttupleSpec {
    pub traintuple_id: String,
    pub objective_key: String,
    #[serde(default)]
    pub data_manager_key: Option<String>,
    #[serde(default)]
    pub test_data_sample_keys: Vec<String>,
    #[serde(default)]
    pub tag: String,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
pub struct ComputePlanSpec {
    #[serde(default)]
    pub traintuples: Vec<ComputePlanTraintupleSpec>,
    #[serde(default)]
    pub testtuples: Vec<ComputePlanTesttupleSpec>,
}

impl ComputePlanSpec {
    /// Traintuples ordered so that every parent comes before its children.
    /// The declaration order is kept among independent traintuples.
    pub fn ordered_traintuples(&self) -> Result<Vec<&ComputePlanTraintupleSpec>, Error> {
        let mut declared = HashSet::new();
        for traintuple in &self.traintuples {
            if !declared.insert(traintuple.traintuple_id.as_str()) {
                return Err(Error::invalid_request(format!(
                    "Duplicate traintuple id '{}' in compute plan",
                    traintuple.traintuple_id
                )));
            }
        }
        for traintuple in &self.traintuples {
            if let Some(unknown) = traintuple
                .in_models_ids
                .iter()
                .find(|id| !declared.contains(id.as_str()))
            {
                return Err(Error::invalid_request(format!(
                    "Traintuple '{}' depends on unknown traintuple id '{}'",
                    traintuple.traintuple_id, unknown
                )));
            }
        }
        for testtuple in &self.testtuples {
            if !declared.contains(testtuple.traintuple_id.as_str()) {
                return Err(Error::invalid_request(format!(
                    "Testtuple refers to unknown traintuple id '{}'",
                    testtuple.traintuple_id
                )));
            }
        }

        let mut placed: BTreeSet<&str> = BTreeSet::new();
        let mut ordered = Vec::with_capacity(self.traintuples.len());
        while ordered.len() < self.traintuples.len() {
            let ready: Vec<&ComputePlanTraintupleSpec> = self
                .traintuples
                .iter()
                .filter(|t| !placed.contains(t.traintuple_id.as_str()))
                .filter(|t| t.in_models_ids.iter().all(|id| placed.contains(id.as_str())))
                .collect();
            if ready.is_empty() {
                return Err(Error::invalid_request(
                    "Compute plan traintuples contain a cycle".to_owned(),
                ));
            }
            for traintuple in ready {
                placed.insert(&traintuple.traintuple_id);
                ordered.push(traintuple);
            }
        }
        Ok(ordered)
    }
}

/// Everything that can be added to the backend.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(tag = "type", content = "spec", rename_all = "snake_case")]
pub enum AssetSpec {
    Dataset(DatasetSpec),
    DataSample(DataSampleSpec),
    DataSamples(DataSamplesSpec),
    Objective(ObjectiveSpec),
    Algo(AlgoSpec),
    AggregateAlgo(AlgoSpec),
    CompositeAlgo(AlgoSpec),
    Traintuple(TraintupleSpec),
    Testtuple(TesttupleSpec),
    ComputePlan(ComputePlanSpec),
}

impl AssetSpec {
    pub fn asset_type(&self) -> AssetType {
        match self {
            AssetSpec::Dataset(_) => AssetType::Dataset,
            AssetSpec::DataSample(_) | AssetSpec::DataSamples(_) => AssetType::DataSample,
            AssetSpec::Objective(_) => AssetType::Objective,
            AssetSpec::Algo(_) => AssetType::Algo,
            AssetSpec::AggregateAlgo(_) => AssetType::AggregateAlgo,
            AssetSpec::CompositeAlgo(_) => AssetType::CompositeAlgo,
            AssetSpec::Traintuple(_) => AssetType::Traintuple,
            AssetSpec::Testtuple(_) => AssetType::Testtuple,
            AssetSpec::ComputePlan(_) => AssetType::ComputePlan,
        }
    }

    /// True for variants creating several assets at once.
    pub fn is_many(&self) -> bool {
        matches!(self, AssetSpec::DataSamples(_))
    }

    pub fn algo(kind: AlgoKind, spec: AlgoSpec) -> Self {
        match kind {
            AlgoKind::Algo => AssetSpec::Algo(spec),
            AlgoKind::AggregateAlgo => AssetSpec::AggregateAlgo(spec),
            AlgoKind::CompositeAlgo => AssetSpec::CompositeAlgo(spec),
        }
    }
}
