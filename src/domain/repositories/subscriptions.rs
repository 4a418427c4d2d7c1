use async_trait::async_trait;
use mockall::automock;
use thiserror::Error;

use crate::domain::{
    entities::subscriptions::{
        EditSubscriptionEntity, InsertSubscriptionEntity, SubscriptionEntity,
    },
    value_objects::subscriptions::TotalCostFilter,
};

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("subscription {0} not found")]
    NotFound(i64),
    #[error(transparent)]
    Storage(#[from] anyhow::Error),
}

pub type RepositoryResult<T> = std::result::Result<T, RepositoryError>;

#[async_trait]
#[automock]
pub trait SubscriptionRepository {
    /// Inserts the row and returns the store-assigned id.
    async fn create(&self, insert_subscription_entity: InsertSubscriptionEntity)
    -> RepositoryResult<i64>;

    async fn find_by_id(&self, subscription_id: i64) -> RepositoryResult<SubscriptionEntity>;

    async fn update(
        &self,
        subscription_id: i64,
        edit_subscription_entity: EditSubscriptionEntity,
    ) -> RepositoryResult<()>;

    async fn delete(&self, subscription_id: i64) -> RepositoryResult<()>;

    /// Rows ordered by id ascending.
    async fn list(&self, limit: i64, offset: i64) -> RepositoryResult<Vec<SubscriptionEntity>>;

    /// Sum of `price` over subscriptions overlapping the filter's period, 0 when none match.
    async fn total_cost(&self, filter: TotalCostFilter) -> RepositoryResult<i64>;
}
