//! # Worker
//!
//! The worker drives an executable tuple through its lifecycle:
//! `waiting -> doing -> done | failed`.
//!
//! 1) **stage** - a working area `<work_dir>/<key>` receives the parent models
//!    (`models/`), the data samples (`data/`) and for test units an empty
//!    `pred/` folder. Units of a compute plan also get the plan scratch area
//!    `<work_dir>/compute_plans/<plan_id>`, which they use one at a time.
//! 2) **execute** - the [Executor] runs the algo with the staged mounts.
//! 3) **finalize** - a train unit's output model is moved to
//!    `<work_dir>/models/<key>/model` and hashed; a test unit's predictions are
//!    scored by the objective's metrics.
//!
//! Failures during any step are recorded on the tuple (`failed` with the
//! captured log) rather than returned. The working area is owned by the
//! lifecycle, not by the execution future, and is removed on every exit
//! path including cancellation and timeout. Filesystem work runs on the
//! blocking pool so that it never stalls the runtime.

use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use itertools::Itertools;
use tokio::sync::{watch, OwnedMutexGuard, Semaphore};

use crate::compute_plan::ComputePlanManager;
use crate::config::EngineConfig;
use crate::error::Error;
use crate::executor::{Executor, Mount, MountRole};
use crate::fs;
use crate::hasher;
use crate::model::{AlgoKind, Asset, OutModel, Status, Testtuple, Traintuple};
use crate::store::{AssetRef, AssetStore, KeyedLocks};

/// Caller-side handle to cancel running units.
/// Clones share the same cancellation state.
#[derive(Clone, Debug)]
pub struct CancelToken {
    tx: Arc<watch::Sender<bool>>,
}

impl Default for CancelToken {
    fn default() -> Self {
        Self::new()
    }
}

impl CancelToken {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        CancelToken { tx: Arc::new(tx) }
    }

    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.tx.borrow()
    }

    /// Completes once [CancelToken::cancel] has been called.
    pub async fn cancelled(&self) {
        let mut rx = self.tx.subscribe();
        let _ = rx.wait_for(|cancelled| *cancelled).await;
    }
}

/// Tuple that can be run by the [Worker].
pub trait ExecutableTuple: Asset {
    /// What a successful execution produces besides the log.
    type Output: Send;

    fn status(&self) -> Status;
    fn status_mut(&mut self) -> &mut Status;
    fn compute_plan_id(&self) -> Option<&str>;
    fn record_success(&mut self, logs: Vec<String>, output: Self::Output);
    fn record_failure(&mut self, error: &Error);

    fn transition(&mut self, next: Status) -> Result<(), Error> {
        let current = self.status();
        if !current.can_transition_to(next) {
            return Err(Error::invalid_request(format!(
                "Tuple '{}' can't go from {:?} to {:?}",
                self.key(),
                current,
                next
            )));
        }
        *self.status_mut() = next;
        Ok(())
    }
}

fn failure_log(error: &Error) -> String {
    match &error.log {
        Some(log) if !log.is_empty() => format!("{}\n{}", log, error),
        _ => error.to_string(),
    }
}

impl ExecutableTuple for Traintuple {
    type Output = OutModel;

    fn status(&self) -> Status {
        self.status
    }
    fn status_mut(&mut self) -> &mut Status {
        &mut self.status
    }
    fn compute_plan_id(&self) -> Option<&str> {
        self.compute_plan_id.as_deref()
    }
    fn record_success(&mut self, logs: Vec<String>, output: OutModel) {
        self.log = logs.join("\n");
        self.out_model = Some(output);
    }
    fn record_failure(&mut self, error: &Error) {
        self.log = failure_log(error);
    }
}

impl ExecutableTuple for Testtuple {
    /// Performance computed by the objective's metrics.
    type Output = f64;

    fn status(&self) -> Status {
        self.status
    }
    fn status_mut(&mut self) -> &mut Status {
        &mut self.status
    }
    fn compute_plan_id(&self) -> Option<&str> {
        self.compute_plan_id.as_deref()
    }
    fn record_success(&mut self, logs: Vec<String>, perf: f64) {
        self.log = logs.join("\n");
        self.dataset.perf = Some(perf);
    }
    fn record_failure(&mut self, error: &Error) {
        self.log = failure_log(error);
    }
}

#[derive(Deserialize)]
struct Performance {
    all: f64,
}

/// Ephemeral `<work_dir>/<key>` folder.
///
/// [WorkingArea::remove] deletes it off the runtime threads. A guard dropped
/// without being removed (the whole run was abandoned) deletes it in place.
struct WorkingArea {
    root: PathBuf,
    removed: bool,
}

impl WorkingArea {
    async fn create(work_dir: &Path, key: &str) -> Result<Self, Error> {
        let root = work_dir.join(key);
        let root = fs::blocking(move || fs::mkdir(root, true)).await?;
        Ok(WorkingArea {
            root,
            removed: false,
        })
    }

    fn root(&self) -> &Path {
        &self.root
    }

    async fn remove(mut self) {
        self.removed = true;
        let root = self.root.clone();
        let removal = fs::blocking(move || Ok(std::fs::remove_dir_all(&root)?)).await;
        if let Err(e) = removal {
            tracing::warn!("Failed to remove working area {}: {}", self.root.display(), e);
        }
    }
}

impl Drop for WorkingArea {
    fn drop(&mut self) {
        if self.removed {
            return;
        }
        if let Err(e) = std::fs::remove_dir_all(&self.root) {
            tracing::warn!("Failed to remove working area {}: {}", self.root.display(), e);
        }
    }
}

async fn subdir(area: &Path, name: &str) -> Result<PathBuf, Error> {
    let path = area.join(name);
    fs::blocking(move || fs::mkdir(path, false)).await
}

async fn stage_model(from: &Path, to: PathBuf) -> Result<(), Error> {
    let from = from.to_path_buf();
    fs::blocking(move || fs::link_or_copy(&from, &to)).await
}

pub struct Worker {
    store: Arc<AssetStore>,
    plans: Arc<ComputePlanManager>,
    executor: Arc<dyn Executor>,
    work_dir: PathBuf,
    timeout: Option<Duration>,
    pool: Arc<Semaphore>,
    plan_locks: KeyedLocks,
}

impl Worker {
    pub fn new(
        store: Arc<AssetStore>,
        plans: Arc<ComputePlanManager>,
        executor: Arc<dyn Executor>,
        config: &EngineConfig,
    ) -> Self {
        Worker {
            store,
            plans,
            executor,
            work_dir: config.work_dir.clone(),
            timeout: config.execution_timeout(),
            pool: Arc::new(Semaphore::new(config.pool_size.max(1))),
            plan_locks: KeyedLocks::new(),
        }
    }

    pub fn work_dir(&self) -> &Path {
        &self.work_dir
    }

    /// Run a traintuple to a terminal status.
    pub async fn run_traintuple(
        &self,
        tuple: &AssetRef<Traintuple>,
        cancel: &CancelToken,
    ) -> Result<Status, Error> {
        self.run(tuple, cancel, |snapshot, area| async move {
            self.execute_train(&snapshot, &area).await
        })
        .await
    }

    /// Run a testtuple to a terminal status.
    pub async fn run_testtuple(
        &self,
        tuple: &AssetRef<Testtuple>,
        cancel: &CancelToken,
    ) -> Result<Status, Error> {
        self.run(tuple, cancel, |snapshot, area| async move {
            self.execute_test(&snapshot, &area).await
        })
        .await
    }

    /// Shared lifecycle. Errors are only returned for lifecycle violations;
    /// execution problems end up in the tuple.
    async fn run<T, F, Fut>(
        &self,
        tuple: &AssetRef<T>,
        cancel: &CancelToken,
        execute: F,
    ) -> Result<Status, Error>
    where
        T: ExecutableTuple,
        F: FnOnce(T, PathBuf) -> Fut,
        Fut: Future<Output = Result<(Vec<String>, T::Output), Error>>,
    {
        let _permit = self
            .pool
            .acquire()
            .await
            .map_err(|e| Error::general_error(e.to_string()))?;

        let snapshot = {
            let mut lock = tuple.write().await;
            lock.transition(Status::Doing)?;
            lock.clone()
        };
        let key = snapshot.key().to_owned();
        let plan_id = snapshot.compute_plan_id().map(str::to_owned);
        tracing::info!("Tuple {} is doing", key);
        if let Some(plan_id) = &plan_id {
            if let Err(e) = self.plans.member_started(plan_id).await {
                tracing::warn!("Compute plan {} not updated: {}", plan_id, e);
            }
        }

        let outcome = match WorkingArea::create(&self.work_dir, &key).await {
            Ok(area) => {
                let outcome = self
                    .bounded(&key, cancel, execute(snapshot, area.root().to_path_buf()))
                    .await;
                area.remove().await;
                outcome
            }
            Err(e) => Err(e),
        };

        let status = {
            let mut lock = tuple.write().await;
            match outcome {
                Ok((logs, output)) => {
                    lock.record_success(logs, output);
                    lock.transition(Status::Done)?;
                }
                Err(e) => {
                    tracing::warn!("Tuple {} failed: {}", key, e);
                    lock.record_failure(&e);
                    lock.transition(Status::Failed)?;
                }
            }
            lock.status()
        };
        tracing::info!("Tuple {} is {:?}", key, status);

        if let Some(plan_id) = &plan_id {
            self.plans.member_finished(plan_id, status).await?;
        }
        Ok(status)
    }

    /// Apply the configured timeout and caller cancellation to `work`.
    async fn bounded<O>(
        &self,
        key: &str,
        cancel: &CancelToken,
        work: impl Future<Output = Result<O, Error>>,
    ) -> Result<O, Error> {
        let work = async {
            match self.timeout {
                Some(limit) => tokio::time::timeout(limit, work)
                    .await
                    .unwrap_or_else(|_| Err(Error::timeout(key, limit.as_secs_f64()))),
                None => work.await,
            }
        };
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(Error::cancelled(key)),
            result = work => result,
        }
    }

    async fn execute_train(
        &self,
        tuple: &Traintuple,
        area: &Path,
    ) -> Result<(Vec<String>, OutModel), Error> {
        let algo = self
            .store
            .algos(AlgoKind::Algo)
            .get(&tuple.algo_key)
            .await?
            .snapshot()
            .await;
        let dataset = self
            .store
            .datasets()
            .get(&tuple.dataset.opener_hash)
            .await?
            .snapshot()
            .await;

        let models = subdir(area, "models").await?;
        let mut parent_hashes: Vec<&str> = Vec::with_capacity(tuple.in_models.len());
        for model in &tuple.in_models {
            match (&model.hash, &model.storage_address) {
                (Some(hash), Some(address)) => {
                    // a parent listed twice is staged once
                    if !parent_hashes.contains(&hash.as_str()) {
                        stage_model(address, models.join(hash)).await?;
                    }
                    parent_hashes.push(hash.as_str());
                }
                _ => {
                    return Err(Error::execution_failure(format!(
                        "Model of parent traintuple '{}' is not available",
                        model.traintuple_key
                    )))
                }
            }
        }
        let data = subdir(area, "data").await?;
        self.stage_samples(&tuple.dataset.keys, &data).await?;

        let mut mounts = vec![
            Mount::read_only(&dataset.data_opener, MountRole::Opener),
            Mount::read_only(&data, MountRole::Data),
            Mount::read_write(&models, MountRole::Models),
        ];
        let _scratch = self.scratch(tuple.compute_plan_id.as_deref(), &mut mounts).await?;

        let command = std::iter::once(format!("train --rank {}", tuple.rank))
            .chain(parent_hashes.iter().map(|h| h.to_string()))
            .join(" ");
        let logs = self
            .executor
            .spawn(&format!("algo-{}", algo.key), &algo.file, &command, &mounts)
            .await?;

        let model_dir = self.work_dir.join("models").join(&tuple.key);
        let model_path = model_dir.join("model");
        let produced = models.join("model");
        let key = tuple.key.clone();
        let stored = model_path.clone();
        let hash = fs::blocking(move || {
            fs::mkdir(model_dir, false)?;
            std::fs::copy(&produced, &stored).map_err(|e| {
                Error::execution_failure(format!("Output model of '{}' not found: {}", key, e))
            })?;
            hasher::hash_file(&stored)
        })
        .await
        .map_err(|e| e.with_log(logs.join("\n")))?;
        Ok((
            logs,
            OutModel {
                hash,
                storage_address: model_path,
            },
        ))
    }

    async fn execute_test(&self, tuple: &Testtuple, area: &Path) -> Result<(Vec<String>, f64), Error> {
        let traintuple = self
            .store
            .traintuples()
            .get(&tuple.traintuple_key)
            .await?
            .snapshot()
            .await;
        let algo = self
            .store
            .algos(AlgoKind::Algo)
            .get(&traintuple.algo_key)
            .await?
            .snapshot()
            .await;
        let objective = self
            .store
            .objectives()
            .get(&tuple.objective_key)
            .await?
            .snapshot()
            .await;
        let dataset = self
            .store
            .datasets()
            .get(&tuple.dataset.opener_hash)
            .await?
            .snapshot()
            .await;
        let model = traintuple.out_model.ok_or_else(|| {
            Error::execution_failure(format!(
                "Traintuple '{}' has no output model",
                tuple.traintuple_key
            ))
        })?;

        let models = subdir(area, "models").await?;
        stage_model(&model.storage_address, models.join(&model.hash)).await?;
        let data = subdir(area, "data").await?;
        self.stage_samples(&tuple.dataset.keys, &data).await?;
        let pred = subdir(area, "pred").await?;

        let mut mounts = vec![
            Mount::read_only(&dataset.data_opener, MountRole::Opener),
            Mount::read_only(&data, MountRole::Data),
            Mount::read_write(&models, MountRole::Models),
            Mount::read_write(&pred, MountRole::Pred),
        ];
        let _scratch = self.scratch(tuple.compute_plan_id.as_deref(), &mut mounts).await?;

        let command = format!("test --rank {} {}", tuple.rank, model.hash);
        let mut logs = self
            .executor
            .spawn(&format!("algo-{}", algo.key), &algo.file, &command, &mounts)
            .await?;

        let metrics_mounts = [
            Mount::read_only(&dataset.data_opener, MountRole::Opener),
            Mount::read_only(&data, MountRole::Data),
            Mount::read_write(&pred, MountRole::Pred),
        ];
        let metrics_logs = self
            .executor
            .spawn(
                &format!("metrics-{}", objective.key),
                &objective.metrics,
                "metrics",
                &metrics_mounts,
            )
            .await
            .map_err(|e| {
                let log = logs.iter().chain(e.log.iter()).join("\n");
                e.with_log(log)
            })?;
        logs.extend(metrics_logs);

        let perf = tokio::fs::read_to_string(pred.join("perf.json"))
            .await
            .map_err(|e| {
                Error::execution_failure(format!("Performance of '{}' not found: {}", tuple.key, e))
                    .with_log(logs.join("\n"))
            })?;
        let perf: Performance = serde_json::from_str(&perf).map_err(|e| {
            Error::execution_failure(format!("Invalid performance of '{}': {}", tuple.key, e))
                .with_log(logs.join("\n"))
        })?;
        Ok((logs, perf.all))
    }

    /// Copy every data sample to `<data>/<sample key>`.
    async fn stage_samples(&self, keys: &[String], data: &Path) -> Result<(), Error> {
        let copies = keys.iter().map(|key| async move {
            let from = self.store.data_samples().get(key).await?.read().await.path.clone();
            let to = data.join(key);
            fs::blocking(move || fs::copy_tree(&from, &to)).await
        });
        futures::future::try_join_all(copies).await?;
        Ok(())
    }

    /// Lock the scratch area of the plan and add it to `mounts`.
    /// The area stays locked until the returned guard is dropped.
    async fn scratch(
        &self,
        plan_id: Option<&str>,
        mounts: &mut Vec<Mount>,
    ) -> Result<Option<OwnedMutexGuard<()>>, Error> {
        let Some(plan_id) = plan_id else {
            return Ok(None);
        };
        let guard = self.plan_locks.lock(plan_id).await;
        let local = self.work_dir.join("compute_plans").join(plan_id);
        let local = fs::blocking(move || fs::mkdir(local, false)).await?;
        mounts.push(Mount::read_write(local, MountRole::Local));
        Ok(Some(guard))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_cancel_token() {
        let token = CancelToken::new();
        let clone = token.clone();
        assert!(!clone.is_cancelled());
        let waiter = tokio::spawn(async move { clone.cancelled().await });
        token.cancel();
        waiter.await.unwrap();
        assert!(token.is_cancelled());
        // already cancelled tokens complete immediately
        token.cancelled().await;
    }

    #[test]
    fn test_failure_log_keeps_captured_output() {
        let e = Error::execution_failure("algo exited with 1".to_owned()).with_log("epoch 1".to_owned());
        assert_eq!(failure_log(&e), "epoch 1\nalgo exited with 1");
        assert_eq!(failure_log(&Error::cancelled("k")), "Execution of 'k' was cancelled");
    }

    #[tokio::test]
    async fn test_working_area_is_removed() {
        let root = tempfile::tempdir().unwrap();
        let area = WorkingArea::create(root.path(), "unit").await.unwrap();
        subdir(area.root(), "models").await.unwrap();
        let path = area.root().to_path_buf();
        area.remove().await;
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn test_abandoned_working_area_is_removed_on_drop() {
        let root = tempfile::tempdir().unwrap();
        let path = {
            let area = WorkingArea::create(root.path(), "unit").await.unwrap();
            subdir(area.root(), "data").await.unwrap();
            area.root().to_path_buf()
        };
        assert!(!path.exists());
    }
}
