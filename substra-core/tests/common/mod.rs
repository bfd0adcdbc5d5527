#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use itertools::Itertools;
use substra_core::backend::Local;
use substra_core::config::EngineConfig;
use substra_core::error::Error;
use substra_core::executor::{Executor, Mount, MountRole};
use substra_core::permissions::PermissionsSpec;
use substra_core::specs::{AlgoSpec, DataSamplesSpec, DatasetSpec, ObjectiveSpec};
use tempfile::TempDir;

/// A recorded executor call.
#[derive(Debug, Clone)]
pub struct Invocation {
    pub name: String,
    pub executable: PathBuf,
    pub command: String,
    pub mounts: Vec<Mount>,
}

impl Invocation {
    pub fn mount(&self, role: MountRole) -> Option<&Path> {
        self.mounts
            .iter()
            .find(|m| m.role == role)
            .map(|m| m.host.as_path())
    }

    pub fn op(&self) -> &str {
        self.command.split_whitespace().next().unwrap_or_default()
    }
}

type Behaviour = dyn Fn(&Invocation) -> Result<Vec<String>, Error> + Send + Sync;

/// Executor running a closure instead of a sandbox.
pub struct FakeExecutor {
    behaviour: Box<Behaviour>,
    delay: Option<Duration>,
    calls: Mutex<Vec<Invocation>>,
    running: AtomicUsize,
    peak: AtomicUsize,
}

impl FakeExecutor {
    pub fn new(
        behaviour: impl Fn(&Invocation) -> Result<Vec<String>, Error> + Send + Sync + 'static,
    ) -> Self {
        FakeExecutor {
            behaviour: Box::new(behaviour),
            delay: None,
            calls: Mutex::new(Vec::new()),
            running: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
        }
    }

    /// Trains successfully and scores every test with `perf`.
    pub fn succeeding(perf: f64) -> Self {
        FakeExecutor::new(train_and_score(perf))
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn calls(&self) -> Vec<Invocation> {
        self.calls.lock().unwrap().clone()
    }

    pub fn commands(&self) -> Vec<String> {
        self.calls().into_iter().map(|c| c.command).collect()
    }

    /// Highest number of calls seen in flight at the same time.
    pub fn peak_concurrency(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Executor for FakeExecutor {
    async fn spawn(
        &self,
        name: &str,
        executable: &Path,
        command: &str,
        mounts: &[Mount],
    ) -> Result<Vec<String>, Error> {
        let call = Invocation {
            name: name.to_owned(),
            executable: executable.to_path_buf(),
            command: command.to_owned(),
            mounts: mounts.to_vec(),
        };
        self.calls.lock().unwrap().push(call.clone());
        let running = self.running.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(running, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        let result = (self.behaviour)(&call);
        self.running.fetch_sub(1, Ordering::SeqCst);
        result
    }
}

/// Sorted entry names of a directory, comma separated.
pub fn listing(dir: Option<&Path>) -> String {
    match dir {
        Some(dir) => std::fs::read_dir(dir)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .sorted()
            .join(","),
        None => String::new(),
    }
}

/// Writes `models/model` on train, predictions on test and `perf.json` on metrics.
/// Train logs list the staged data and the input models.
pub fn train_and_score(
    perf: f64,
) -> impl Fn(&Invocation) -> Result<Vec<String>, Error> + Send + Sync + 'static {
    move |call| match call.op() {
        "train" => {
            let models = call.mount(MountRole::Models).unwrap();
            let logs = vec![
                format!("data: {}", listing(call.mount(MountRole::Data))),
                format!("models: {}", listing(Some(models))),
            ];
            std::fs::write(models.join("model"), call.command.as_bytes())?;
            Ok(logs)
        }
        "test" => {
            std::fs::write(call.mount(MountRole::Pred).unwrap().join("pred.csv"), b"1\n0\n")?;
            Ok(vec!["predicted".to_owned()])
        }
        "metrics" => {
            let perf_file = call.mount(MountRole::Pred).unwrap().join("perf.json");
            std::fs::write(perf_file, serde_json::json!({ "all": perf }).to_string())?;
            Ok(vec![format!("perf: {}", perf)])
        }
        other => Err(Error::execution_failure(format!("unexpected command {}", other))),
    }
}

/// Backend working in a temporary directory, with helpers creating the
/// files behind assets.
pub struct Fixture {
    pub dir: TempDir,
    pub executor: Arc<FakeExecutor>,
    pub backend: Local,
}

impl Fixture {
    pub fn new(executor: FakeExecutor) -> Self {
        Fixture::with_config(executor, |config| config)
    }

    pub fn with_config(
        executor: FakeExecutor,
        configure: impl FnOnce(EngineConfig) -> EngineConfig,
    ) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let config = configure(EngineConfig::new(dir.path().join("worker")));
        let executor = Arc::new(executor);
        let backend = Local::new(config, executor.clone());
        Fixture {
            dir,
            executor,
            backend,
        }
    }

    pub fn work_dir(&self) -> PathBuf {
        self.dir.path().join("worker")
    }

    pub fn file(&self, relative: &str, content: &str) -> PathBuf {
        let path = self.dir.path().join("assets").join(relative);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, content).unwrap();
        path
    }

    pub fn sample_dir(&self, name: &str) -> PathBuf {
        let path = self.dir.path().join("samples").join(name);
        std::fs::create_dir_all(&path).unwrap();
        std::fs::write(path.join("data.csv"), format!("{},1,2\n", name)).unwrap();
        path
    }

    pub fn dataset_spec(&self, name: &str, permissions: PermissionsSpec) -> DatasetSpec {
        DatasetSpec {
            name: name.to_owned(),
            data_opener: self.file(&format!("{}/opener.py", name), &format!("# opener {}", name)),
            data_type: "csv".to_owned(),
            description: self.file(&format!("{}/description.md", name), &format!("# {}", name)),
            permissions,
            objective_key: None,
        }
    }

    pub async fn dataset(&self, name: &str) -> Result<String, Error> {
        let spec = self.dataset_spec(name, PermissionsSpec::public());
        let dataset = self.backend.add_dataset(spec, false).await?;
        let key = dataset.read().await.key.clone();
        Ok(key)
    }

    pub async fn samples(
        &self,
        dataset_key: &str,
        names: &[&str],
        test_only: bool,
    ) -> Result<Vec<String>, Error> {
        let spec = DataSamplesSpec {
            paths: names.iter().map(|n| self.sample_dir(n)).collect(),
            data_manager_keys: vec![dataset_key.to_owned()],
            test_only,
        };
        let mut keys = Vec::new();
        for sample in self.backend.add_data_samples(spec, false).await? {
            keys.push(sample.read().await.key.clone());
        }
        Ok(keys)
    }

    pub fn algo_spec(&self, name: &str, permissions: PermissionsSpec) -> AlgoSpec {
        AlgoSpec {
            name: name.to_owned(),
            description: self.file(&format!("{}/description.md", name), &format!("# {}", name)),
            file: self.file(&format!("{}/algo.tar.gz", name), &format!("algo {}", name)),
            permissions,
        }
    }

    pub async fn algo(&self, name: &str) -> Result<String, Error> {
        let spec = self.algo_spec(name, PermissionsSpec::public());
        let algo = self
            .backend
            .add_algo(substra_core::model::AlgoKind::Algo, spec, false)
            .await?;
        let key = algo.read().await.key.clone();
        Ok(key)
    }

    pub async fn objective(
        &self,
        name: &str,
        test_dataset: Option<(&str, &[String])>,
    ) -> Result<String, Error> {
        let spec = ObjectiveSpec {
            name: name.to_owned(),
            description: self.file(&format!("{}/description.md", name), &format!("# {}", name)),
            metrics_name: "accuracy".to_owned(),
            metrics: self.file(&format!("{}/metrics.zip", name), &format!("metrics {}", name)),
            test_data_manager_key: test_dataset.map(|(key, _)| key.to_owned()),
            test_data_sample_keys: test_dataset
                .map(|(_, samples)| samples.to_vec())
                .unwrap_or_default(),
            permissions: PermissionsSpec::public(),
        };
        let objective = self.backend.add_objective(spec, false).await?;
        let key = objective.read().await.key.clone();
        Ok(key)
    }
}
