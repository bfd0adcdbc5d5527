mod common;

use std::time::Duration;

use common::{train_and_score, FakeExecutor, Fixture};
use substra_core::error::Error;
use substra_core::model::{AssetType, Status};
use substra_core::specs::TraintupleSpec;
use substra_core::worker::CancelToken;

const DELAY: Duration = Duration::from_millis(200);

struct Setup {
    fixture: Fixture,
    algo_key: String,
    dataset_key: String,
    train_keys: Vec<String>,
}

async fn setup(pool_size: usize) -> Result<Setup, Error> {
    let fixture = Fixture::with_config(
        FakeExecutor::new(train_and_score(1.0)).with_delay(DELAY),
        |config| config.with_pool_size(pool_size),
    );
    let dataset_key = fixture.dataset("d").await?;
    let train_keys = fixture.samples(&dataset_key, &["s1", "s2", "s3"], false).await?;
    let algo_key = fixture.algo("a").await?;
    Ok(Setup {
        fixture,
        algo_key,
        dataset_key,
        train_keys,
    })
}

impl Setup {
    fn traintuple(&self, sample: usize, plan: Option<&str>) -> TraintupleSpec {
        TraintupleSpec {
            algo_key: self.algo_key.clone(),
            data_manager_key: self.dataset_key.clone(),
            train_data_sample_keys: vec![self.train_keys[sample].clone()],
            compute_plan_id: plan.map(str::to_owned),
            ..Default::default()
        }
    }

    async fn add(&self, spec: TraintupleSpec, exist_ok: bool) -> Result<(String, Status), Error> {
        let traintuple = self
            .fixture
            .backend
            .add_traintuple(spec, exist_ok, &CancelToken::new())
            .await?;
        let traintuple = traintuple.read().await;
        Ok((traintuple.key.clone(), traintuple.status))
    }
}

#[tokio::test]
async fn test_pool_size_bounds_running_units() -> Result<(), Box<dyn std::error::Error>> {
    // tuples without a plan get a plan each, so only the pool limits them
    let setup = setup(2).await?;
    let (a, b, c) = tokio::join!(
        setup.add(setup.traintuple(0, None), false),
        setup.add(setup.traintuple(1, None), false),
        setup.add(setup.traintuple(2, None), false),
    );
    for (_, status) in [a?, b?, c?] {
        assert_eq!(status, Status::Done);
    }
    assert_eq!(setup.fixture.executor.calls().len(), 3);
    assert_eq!(setup.fixture.executor.peak_concurrency(), 2);
    Ok(())
}

#[tokio::test]
async fn test_single_slot_pool_runs_one_unit_at_a_time() -> Result<(), Box<dyn std::error::Error>> {
    let setup = setup(1).await?;
    let (a, b) = tokio::join!(
        setup.add(setup.traintuple(0, None), false),
        setup.add(setup.traintuple(1, None), false),
    );
    assert_eq!(a?.1, Status::Done);
    assert_eq!(b?.1, Status::Done);
    assert_eq!(setup.fixture.executor.peak_concurrency(), 1);
    Ok(())
}

#[tokio::test]
async fn test_units_of_a_plan_serialize_on_scratch() -> Result<(), Box<dyn std::error::Error>> {
    let setup = setup(4).await?;
    let (_, first) = setup.add(setup.traintuple(0, None), false).await?;
    assert_eq!(first, Status::Done);
    let plans = setup.fixture.backend.list(AssetType::ComputePlan).await?;
    let plan_id = plans[0]["compute_plan_id"].as_str().unwrap().to_owned();

    // independent members of the same plan, with free pool slots
    let (a, b) = tokio::join!(
        setup.add(setup.traintuple(1, Some(&plan_id)), false),
        setup.add(setup.traintuple(2, Some(&plan_id)), false),
    );
    assert_eq!(a?.1, Status::Done);
    assert_eq!(b?.1, Status::Done);
    assert_eq!(setup.fixture.executor.calls().len(), 3);
    assert_eq!(setup.fixture.executor.peak_concurrency(), 1);

    let plan = setup
        .fixture
        .backend
        .get(AssetType::ComputePlan, &plan_id)
        .await?;
    assert_eq!(plan["tuple_count"], 3);
    assert_eq!(plan["done_count"], 3);
    Ok(())
}

#[tokio::test]
async fn test_concurrent_identical_creates_make_one_tuple() -> Result<(), Box<dyn std::error::Error>> {
    let setup = setup(4).await?;
    let (a, b) = tokio::join!(
        setup.add(setup.traintuple(0, None), true),
        setup.add(setup.traintuple(0, None), true),
    );
    let (a, b) = (a?, b?);
    assert_eq!(a.0, b.0);

    assert_eq!(setup.fixture.backend.list(AssetType::Traintuple).await?.len(), 1);
    assert_eq!(setup.fixture.executor.calls().len(), 1);
    let plans = setup.fixture.backend.list(AssetType::ComputePlan).await?;
    assert_eq!(plans.len(), 1);
    assert_eq!(plans[0]["tuple_count"], 1);
    assert_eq!(plans[0]["traintuple_keys"], serde_json::json!([a.0]));

    // the reused tuple still finishes
    let traintuple = setup.fixture.backend.get(AssetType::Traintuple, &a.0).await?;
    assert_eq!(traintuple["status"], "done");
    Ok(())
}

#[tokio::test]
async fn test_unrelated_creates_do_not_wait_on_each_other() -> Result<(), Box<dyn std::error::Error>> {
    let setup = setup(4).await?;
    let (a, b) = tokio::join!(
        setup.add(setup.traintuple(0, None), false),
        setup.add(setup.traintuple(1, None), false),
    );
    assert_ne!(a?.0, b?.0);
    assert_eq!(setup.fixture.executor.peak_concurrency(), 2);
    assert_eq!(setup.fixture.backend.list(AssetType::ComputePlan).await?.len(), 2);
    Ok(())
}
