use anyhow::Context;
use async_trait::async_trait;
use diesel::{
    PgConnection, RunQueryDsl, delete, dsl::sum, insert_into, pg::Pg, prelude::*,
    sql_types::{BigInt, Nullable},
    update,
};
use std::sync::Arc;

use crate::{
    domain::{
        entities::subscriptions::{
            EditSubscriptionEntity, InsertSubscriptionEntity, SubscriptionEntity,
        },
        repositories::subscriptions::{RepositoryError, RepositoryResult, SubscriptionRepository},
        value_objects::subscriptions::TotalCostFilter,
    },
    infrastructure::postgres::{postgres_connection::PgPoolSquad, schema::subscriptions},
};

pub struct SubscriptionPostgres {
    db_pool: Arc<PgPoolSquad>,
}

impl SubscriptionPostgres {
    pub fn new(db_pool: Arc<PgPoolSquad>) -> Self {
        Self { db_pool }
    }

    /// Runs a blocking diesel call on the blocking pool with a checked-out connection.
    async fn run<R, F>(&self, operation: &'static str, query: F) -> RepositoryResult<R>
    where
        F: FnOnce(&mut PgConnection) -> RepositoryResult<R> + Send + 'static,
        R: Send + 'static,
    {
        let db_pool = Arc::clone(&self.db_pool);

        tokio::task::spawn_blocking(move || -> RepositoryResult<R> {
            let mut conn = db_pool
                .get()
                .context("failed to check out postgres connection")?;
            query(&mut conn)
        })
        .await
        .with_context(|| format!("{operation}: blocking task failed"))?
    }
}

/// Overlap of each subscription's active interval with the period, an open end
/// date counting as still active. Optional filters are appended as further
/// conjunctive predicates, so binds are numbered `$1`..`$4` in that order.
pub fn total_cost_query(
    filter: &TotalCostFilter,
) -> subscriptions::BoxedQuery<'_, Pg, Nullable<BigInt>> {
    let mut query = subscriptions::table
        .select(sum(subscriptions::price))
        .filter(subscriptions::start_date.le(filter.period_end))
        .filter(
            subscriptions::end_date
                .is_null()
                .or(subscriptions::end_date.ge(filter.period_start)),
        )
        .into_boxed();

    if let Some(user_id) = filter.user_id {
        query = query.filter(subscriptions::user_id.eq(user_id));
    }

    if let Some(service_name) = filter.service_name.as_deref() {
        query = query.filter(subscriptions::service_name.eq(service_name));
    }

    query
}

#[async_trait]
impl SubscriptionRepository for SubscriptionPostgres {
    async fn create(
        &self,
        insert_subscription_entity: InsertSubscriptionEntity,
    ) -> RepositoryResult<i64> {
        self.run("create subscription", move |conn| {
            let id = insert_into(subscriptions::table)
                .values(&insert_subscription_entity)
                .returning(subscriptions::id)
                .get_result::<i64>(conn)
                .context("failed to insert subscription")?;

            Ok(id)
        })
        .await
    }

    async fn find_by_id(&self, subscription_id: i64) -> RepositoryResult<SubscriptionEntity> {
        self.run("get subscription", move |conn| {
            subscriptions::table
                .find(subscription_id)
                .select(SubscriptionEntity::as_select())
                .first::<SubscriptionEntity>(conn)
                .optional()
                .with_context(|| format!("failed to get subscription {subscription_id}"))?
                .ok_or(RepositoryError::NotFound(subscription_id))
        })
        .await
    }

    async fn update(
        &self,
        subscription_id: i64,
        edit_subscription_entity: EditSubscriptionEntity,
    ) -> RepositoryResult<()> {
        self.run("update subscription", move |conn| {
            let affected = update(subscriptions::table.find(subscription_id))
                .set(&edit_subscription_entity)
                .execute(conn)
                .with_context(|| format!("failed to update subscription {subscription_id}"))?;

            if affected == 0 {
                return Err(RepositoryError::NotFound(subscription_id));
            }
            Ok(())
        })
        .await
    }

    async fn delete(&self, subscription_id: i64) -> RepositoryResult<()> {
        self.run("delete subscription", move |conn| {
            let affected = delete(subscriptions::table.find(subscription_id))
                .execute(conn)
                .with_context(|| format!("failed to delete subscription {subscription_id}"))?;

            if affected == 0 {
                return Err(RepositoryError::NotFound(subscription_id));
            }
            Ok(())
        })
        .await
    }

    async fn list(&self, limit: i64, offset: i64) -> RepositoryResult<Vec<SubscriptionEntity>> {
        self.run("list subscriptions", move |conn| {
            let results = subscriptions::table
                .order(subscriptions::id.asc())
                .limit(limit)
                .offset(offset)
                .select(SubscriptionEntity::as_select())
                .load::<SubscriptionEntity>(conn)
                .context("failed to list subscriptions")?;

            Ok(results)
        })
        .await
    }

    async fn total_cost(&self, filter: TotalCostFilter) -> RepositoryResult<i64> {
        self.run("calculate total cost", move |conn| {
            let total = total_cost_query(&filter)
                .get_result::<Option<i64>>(conn)
                .context("failed to calculate total cost")?;

            Ok(total.unwrap_or(0))
        })
        .await
    }
}
