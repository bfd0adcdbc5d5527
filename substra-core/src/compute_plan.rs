//! Compute plan bookkeeping.
//!
//! A compute plan groups tuples and orders them by rank. Plans are stored in
//! the [AssetStore] like any other asset; every change to a plan happens under
//! the write lock of that plan only, which makes rank assignment atomic.

use std::sync::Arc;

use crate::error::Error;
use crate::model::{ComputePlan, Status, TupleSlot};
use crate::store::{AssetRef, AssetStore};

pub struct ComputePlanManager {
    store: Arc<AssetStore>,
}

impl ComputePlanManager {
    pub fn new(store: Arc<AssetStore>) -> Self {
        ComputePlanManager { store }
    }

    /// Create a plan with a single member. The member gets rank 0.
    pub async fn create_plan(
        &self,
        member_key: &str,
        slot: TupleSlot,
    ) -> Result<AssetRef<ComputePlan>, Error> {
        let plan_id = uuid::Uuid::new_v4().to_string();
        tracing::info!("Creating compute plan {} for {}", plan_id, member_key);
        self.store
            .compute_plans()
            .add(ComputePlan::new(plan_id, member_key, slot), false)
            .await
    }

    /// Append a member and return its rank: the number of members the plan
    /// had before this one, all slots included.
    pub async fn attach(
        &self,
        plan_id: &str,
        member_key: &str,
        slot: TupleSlot,
    ) -> Result<usize, Error> {
        let plan = self.store.compute_plans().get(plan_id).await?;
        let mut lock = plan.write().await;
        let rank = lock.member_count();
        lock.push_member(member_key, slot);
        lock.status = Status::Waiting;
        tracing::debug!("Attached {} to compute plan {} at rank {}", member_key, plan_id, rank);
        Ok(rank)
    }

    /// Append a member whose rank is inherited from another member.
    pub async fn attach_inherited(
        &self,
        plan_id: &str,
        member_key: &str,
        slot: TupleSlot,
    ) -> Result<(), Error> {
        let plan = self.store.compute_plans().get(plan_id).await?;
        let mut lock = plan.write().await;
        lock.push_member(member_key, slot);
        lock.status = Status::Waiting;
        Ok(())
    }

    /// Check a requested plan placement without changing anything.
    ///
    /// An explicit rank without a plan is only valid for rank 0, which
    /// implicitly creates a new plan.
    pub async fn validate_placement(
        &self,
        compute_plan_id: Option<&str>,
        rank: Option<usize>,
    ) -> Result<(), Error> {
        match (compute_plan_id, rank) {
            (None, Some(rank)) if rank > 0 => Err(Error::invalid_request(format!(
                "Rank {} requires a compute plan; only rank 0 can create one",
                rank
            ))),
            (Some(plan_id), _) => self.store.compute_plans().get(plan_id).await.map(|_| ()),
            _ => Ok(()),
        }
    }

    /// Place a new traintuple: attach it to the given plan or create a plan
    /// for it. Returns the plan id and the rank.
    pub async fn place_traintuple(
        &self,
        compute_plan_id: Option<&str>,
        rank: Option<usize>,
        member_key: &str,
    ) -> Result<(String, usize), Error> {
        self.validate_placement(compute_plan_id, rank).await?;
        match compute_plan_id {
            Some(plan_id) => {
                let assigned = self
                    .attach(plan_id, member_key, TupleSlot::Traintuple)
                    .await?;
                if let Some(requested) = rank.filter(|r| *r != assigned) {
                    tracing::debug!(
                        "Requested rank {} for {} replaced by {}",
                        requested,
                        member_key,
                        assigned
                    );
                }
                Ok((plan_id.to_owned(), assigned))
            }
            None => {
                let plan = self.create_plan(member_key, TupleSlot::Traintuple).await?;
                let plan_id = plan.read().await.compute_plan_id.clone();
                Ok((plan_id, 0))
            }
        }
    }

    /// A member of the plan was picked up by the worker.
    pub async fn member_started(&self, plan_id: &str) -> Result<(), Error> {
        let plan = self.store.compute_plans().get(plan_id).await?;
        let mut lock = plan.write().await;
        if lock.status == Status::Waiting {
            lock.status = Status::Doing;
        }
        Ok(())
    }

    /// A member of the plan reached a terminal status.
    /// Must be called exactly once per member. Returns the plan status.
    pub async fn member_finished(&self, plan_id: &str, status: Status) -> Result<Status, Error> {
        if !status.is_terminal() {
            return Err(Error::invalid_request(format!(
                "Member of compute plan {} reported non-terminal status {:?}",
                plan_id, status
            )));
        }
        let plan = self.store.compute_plans().get(plan_id).await?;
        let mut lock = plan.write().await;
        if lock.done_count >= lock.tuple_count {
            return Err(Error::general_error(format!(
                "Compute plan {} has more finished members than members",
                plan_id
            )));
        }
        lock.done_count += 1;
        if status == Status::Failed {
            lock.failed_count += 1;
        }
        if lock.done_count == lock.tuple_count {
            lock.status = if lock.failed_count > 0 {
                Status::Failed
            } else {
                Status::Done
            };
            tracing::info!("Compute plan {} finished: {:?}", plan_id, lock.status);
        }
        Ok(lock.status)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorType;

    fn manager() -> ComputePlanManager {
        ComputePlanManager::new(Arc::new(AssetStore::new()))
    }

    #[tokio::test]
    async fn test_ranks_are_positions() {
        let manager = manager();
        let (plan_id, r0) = manager.place_traintuple(None, None, "t0").await.unwrap();
        assert_eq!(r0, 0);
        let (_, r1) = manager
            .place_traintuple(Some(&plan_id), None, "t1")
            .await
            .unwrap();
        manager
            .attach_inherited(&plan_id, "x1", TupleSlot::Testtuple)
            .await
            .unwrap();
        let (_, r3) = manager
            .place_traintuple(Some(&plan_id), Some(1), "t2")
            .await
            .unwrap();
        assert_eq!(r1, 1);
        assert_eq!(r3, 3);

        let plan = manager.store.compute_plans().get(&plan_id).await.unwrap();
        let plan = plan.snapshot().await;
        assert_eq!(plan.traintuple_keys, vec!["t0", "t1", "t2"]);
        assert_eq!(plan.testtuple_keys, vec!["x1"]);
        assert_eq!(plan.tuple_count, 4);
        assert_eq!(plan.status, Status::Waiting);
    }

    #[tokio::test]
    async fn test_explicit_rank_without_plan() {
        let manager = manager();
        let err = manager.place_traintuple(None, Some(2), "t").await.unwrap_err();
        assert_eq!(err.error_type, ErrorType::InvalidRequest);
        assert_eq!(manager.store.compute_plans().len().await, 0);
        let (_, rank) = manager.place_traintuple(None, Some(0), "t").await.unwrap();
        assert_eq!(rank, 0);
    }

    #[tokio::test]
    async fn test_unknown_plan() {
        let err = manager()
            .place_traintuple(Some("missing"), None, "t")
            .await
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_concurrent_attach_never_repeats_a_rank() {
        let manager = Arc::new(manager());
        let (plan_id, _) = manager.place_traintuple(None, None, "t0").await.unwrap();
        let mut handles = Vec::new();
        for i in 1..=16 {
            let manager = manager.clone();
            let plan_id = plan_id.clone();
            handles.push(tokio::spawn(async move {
                manager
                    .attach(&plan_id, &format!("t{}", i), TupleSlot::Traintuple)
                    .await
                    .unwrap()
            }));
        }
        let mut ranks = Vec::new();
        for handle in handles {
            ranks.push(handle.await.unwrap());
        }
        ranks.sort();
        assert_eq!(ranks, (1..=16).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn test_completion_counts_failures() {
        let manager = manager();
        let (plan_id, _) = manager.place_traintuple(None, None, "t0").await.unwrap();
        manager.attach(&plan_id, "t1", TupleSlot::Traintuple).await.unwrap();

        manager.member_started(&plan_id).await.unwrap();
        assert_eq!(
            manager.member_finished(&plan_id, Status::Failed).await.unwrap(),
            Status::Doing
        );
        assert_eq!(
            manager.member_finished(&plan_id, Status::Done).await.unwrap(),
            Status::Failed
        );
        let plan = manager.store.compute_plans().get(&plan_id).await.unwrap();
        assert_eq!(plan.read().await.done_count, 2);
        assert!(manager.member_finished(&plan_id, Status::Done).await.is_err());
        assert!(manager.member_finished(&plan_id, Status::Doing).await.is_err());
    }
}
