//!
//! # Substra Core
//!
//! Local simulation of a federated machine learning platform: assets are stored
//! in memory, units of computation run on the local machine through an
//! [executor](crate::executor::Executor).
//!
//! ## Glossary
//!
//! **[Asset](crate::model::Asset)** - anything stored by the backend: dataset, data sample, algo,
//! objective, traintuple, testtuple or compute plan. Every asset has a key, derived from its content
//! (files) or from what it references (tuples), except compute plans whose id is generated.
//! Assets live in the [store](crate::store::AssetStore) and refer to each other by key only.
//!
//! **Dataset** - a set of data samples together with the **opener**, the code reading the samples.
//! Samples are split into train samples and test samples.
//!
//! **[Objective](crate::model::Objective)** - the metrics scoring predictions, optionally with a test dataset.
//!
//! **Tuple** - a unit of computation with a [status](crate::model::Status) lifecycle:
//! `waiting -> doing -> done | failed`. A [traintuple](crate::model::Traintuple) trains
//! an algo on train samples, starting from the models of its parent traintuples, and produces an
//! output model. A [testtuple](crate::model::Testtuple) evaluates the model of a traintuple
//! and records a performance. A testtuple is **certified** when it uses exactly the test
//! dataset and samples declared by its objective.
//!
//! **[Compute plan](crate::model::ComputePlan)** - a group of tuples ordered by **rank**.
//! A traintuple without a plan starts a new plan with rank 0; a traintuple added to an existing
//! plan gets the number of members already in the plan as its rank. Testtuples inherit the plan
//! and rank of their traintuple. The plan tracks how many of its members terminated.
//!
//! **[Permissions](crate::model::Permissions)** - who may process an asset. Tuples get the
//! intersection of the permissions of what they are computed from
//! (see [PermissionResolver](crate::permissions::PermissionResolver)).
//!
//! **[Executor](crate::executor::Executor)** - runs an algo in isolation given a command
//! (`train --rank 1 <parent model hash>`) and a set of [mounts](crate::executor::Mount).
//!
//! **[Worker](crate::worker::Worker)** - stages the inputs of a tuple, calls the executor and
//! collects the outputs.
//!
//! **[Local](crate::backend::Local)** - the entry point, creating assets from
//! [specs](crate::specs::AssetSpec).
extern crate serde;
#[macro_use]
extern crate serde_derive;

pub mod backend;
pub mod compute_plan;
pub mod config;
pub mod error;
pub mod executor;
pub mod fs;
pub mod hasher;
pub mod model;
pub mod permissions;
pub mod specs;
pub mod store;
pub mod worker;
