mod common;

use common::{FakeExecutor, Fixture};
use substra_core::error::{Error, ErrorType};
use substra_core::model::AssetType;
use substra_core::specs::{AssetSpec, TesttupleSpec, TraintupleSpec};

struct Trained {
    fixture: Fixture,
    dataset_key: String,
    test_keys: Vec<String>,
    traintuple_key: String,
}

async fn trained(executor: FakeExecutor) -> Result<Trained, Error> {
    let fixture = Fixture::new(executor);
    let dataset_key = fixture.dataset("d").await?;
    let train_keys = fixture.samples(&dataset_key, &["s1"], false).await?;
    let test_keys = fixture.samples(&dataset_key, &["t1", "t2"], true).await?;
    let algo_key = fixture.algo("a").await?;
    let traintuple = fixture
        .backend
        .add(
            AssetSpec::Traintuple(TraintupleSpec {
                algo_key,
                data_manager_key: dataset_key.clone(),
                train_data_sample_keys: train_keys,
                ..Default::default()
            }),
            false,
        )
        .await?;
    Ok(Trained {
        fixture,
        dataset_key,
        test_keys,
        traintuple_key: traintuple["key"].as_str().unwrap_or_default().to_owned(),
    })
}

#[tokio::test]
async fn test_explicit_subset_is_not_certified() -> Result<(), Box<dyn std::error::Error>> {
    let t = trained(FakeExecutor::succeeding(0.3)).await?;
    let objective_key = t
        .fixture
        .objective("o", Some((&t.dataset_key, &t.test_keys)))
        .await?;

    let subset = t
        .fixture
        .backend
        .add(
            AssetSpec::Testtuple(TesttupleSpec {
                objective_key: objective_key.clone(),
                traintuple_key: t.traintuple_key.clone(),
                data_manager_key: Some(t.dataset_key.clone()),
                test_data_sample_keys: vec![t.test_keys[0].clone()],
                ..Default::default()
            }),
            false,
        )
        .await?;
    assert_eq!(subset["certified"], false);
    assert_eq!(subset["status"], "done");

    // the same set in another order is the declared test set
    let reordered = t
        .fixture
        .backend
        .add(
            AssetSpec::Testtuple(TesttupleSpec {
                objective_key,
                traintuple_key: t.traintuple_key.clone(),
                data_manager_key: Some(t.dataset_key.clone()),
                test_data_sample_keys: vec![t.test_keys[1].clone(), t.test_keys[0].clone()],
                ..Default::default()
            }),
            false,
        )
        .await?;
    assert_eq!(reordered["certified"], true);
    assert_ne!(reordered["key"], subset["key"]);
    Ok(())
}

#[tokio::test]
async fn test_objective_without_test_dataset() -> Result<(), Box<dyn std::error::Error>> {
    let t = trained(FakeExecutor::succeeding(0.3)).await?;
    let objective_key = t.fixture.objective("o", None).await?;
    let err = t
        .fixture
        .backend
        .add(
            AssetSpec::Testtuple(TesttupleSpec {
                objective_key,
                traintuple_key: t.traintuple_key.clone(),
                ..Default::default()
            }),
            false,
        )
        .await
        .unwrap_err();
    assert_eq!(err.error_type, ErrorType::InvalidRequest);
    assert!(t.fixture.backend.list(AssetType::Testtuple).await?.is_empty());
    Ok(())
}

#[tokio::test]
async fn test_samples_must_belong_to_dataset() -> Result<(), Box<dyn std::error::Error>> {
    let t = trained(FakeExecutor::succeeding(0.3)).await?;
    let objective_key = t
        .fixture
        .objective("o", Some((&t.dataset_key, &t.test_keys)))
        .await?;
    let other_dataset = t.fixture.dataset("other").await?;
    let foreign = t.fixture.samples(&other_dataset, &["f1"], true).await?;

    let err = t
        .fixture
        .backend
        .add(
            AssetSpec::Testtuple(TesttupleSpec {
                objective_key: objective_key.clone(),
                traintuple_key: t.traintuple_key.clone(),
                data_manager_key: Some(t.dataset_key.clone()),
                test_data_sample_keys: foreign,
                ..Default::default()
            }),
            false,
        )
        .await
        .unwrap_err();
    assert_eq!(err.error_type, ErrorType::InvalidRequest);

    let err = t
        .fixture
        .backend
        .add(
            AssetSpec::Testtuple(TesttupleSpec {
                objective_key,
                traintuple_key: "missing".to_owned(),
                ..Default::default()
            }),
            false,
        )
        .await
        .unwrap_err();
    assert!(err.is_not_found());
    Ok(())
}

#[tokio::test]
async fn test_metrics_failure_fails_the_testtuple() -> Result<(), Box<dyn std::error::Error>> {
    let train_and_predict = common::train_and_score(0.0);
    let executor = FakeExecutor::new(move |call| {
        if call.op() == "metrics" {
            Err(Error::execution_failure("metrics crashed".to_owned()))
        } else {
            train_and_predict(call)
        }
    });
    let t = trained(executor).await?;
    let objective_key = t
        .fixture
        .objective("o", Some((&t.dataset_key, &t.test_keys)))
        .await?;
    let testtuple = t
        .fixture
        .backend
        .add(
            AssetSpec::Testtuple(TesttupleSpec {
                objective_key,
                traintuple_key: t.traintuple_key.clone(),
                ..Default::default()
            }),
            false,
        )
        .await?;
    assert_eq!(testtuple["status"], "failed");
    assert_eq!(testtuple["dataset"]["perf"], serde_json::Value::Null);
    // the prediction log is kept
    assert_eq!(testtuple["log"], "predicted\nmetrics crashed");

    let plan_id = testtuple["compute_plan_id"].as_str().unwrap();
    let plan = t.fixture.backend.get(AssetType::ComputePlan, plan_id).await?;
    assert_eq!(plan["done_count"], 2);
    assert_eq!(plan["status"], "failed");
    Ok(())
}
