use std::{future::Future, sync::Arc, time::Duration};

use anyhow::anyhow;
use thiserror::Error;
use tracing::{error, info, warn};
use validator::Validate;

use crate::domain::{
    entities::subscriptions::{EditSubscriptionEntity, InsertSubscriptionEntity},
    repositories::subscriptions::{RepositoryError, RepositoryResult, SubscriptionRepository},
    value_objects::{
        month_year::{InvalidMonthYear, MonthYear},
        subscriptions::{
            InsertSubscriptionModel, Pagination, SubscriptionModel, TotalCostDto, TotalCostFilter,
            TotalCostModel,
        },
    },
};

#[derive(Debug, Error)]
pub enum SubscriptionError {
    #[error("validation failed: {0}")]
    Validation(String),
    #[error("invalid {field}: {source}")]
    InvalidFormat {
        field: &'static str,
        #[source]
        source: InvalidMonthYear,
    },
    #[error("subscription {0} not found")]
    NotFound(i64),
    #[error("storage error: {0:#}")]
    Storage(anyhow::Error),
}

impl SubscriptionError {
    pub fn status_code(&self) -> axum::http::StatusCode {
        use axum::http::StatusCode;
        match self {
            SubscriptionError::Validation(_) | SubscriptionError::InvalidFormat { .. } => {
                StatusCode::BAD_REQUEST
            }
            SubscriptionError::NotFound(_) => StatusCode::NOT_FOUND,
            SubscriptionError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

pub type UseCaseResult<T> = std::result::Result<T, SubscriptionError>;

pub struct SubscriptionUseCase<T>
where
    T: SubscriptionRepository + Send + Sync + 'static,
{
    subscription_repository: Arc<T>,
    store_timeout: Duration,
}

impl<T> SubscriptionUseCase<T>
where
    T: SubscriptionRepository + Send + Sync + 'static,
{
    pub fn new(subscription_repository: Arc<T>, store_timeout: Duration) -> Self {
        Self {
            subscription_repository,
            store_timeout,
        }
    }

    pub async fn create(
        &self,
        insert_subscription_model: InsertSubscriptionModel,
    ) -> UseCaseResult<SubscriptionModel> {
        info!(
            user_id = %insert_subscription_model.user_id,
            service_name = %insert_subscription_model.service_name,
            "subscriptions: create requested"
        );

        let (start, end) = validated_period(&insert_subscription_model).map_err(|err| {
            warn!(
                status = err.status_code().as_u16(),
                error = %err,
                "subscriptions: create rejected"
            );
            err
        })?;

        let insert_subscription_entity = InsertSubscriptionEntity {
            service_name: insert_subscription_model.service_name,
            price: insert_subscription_model.price,
            user_id: insert_subscription_model.user_id,
            start_date: start.first_instant(),
            end_date: end.map(|end| end.first_instant()),
        };

        let id = self
            .within_deadline(
                "create subscription",
                self.subscription_repository
                    .create(insert_subscription_entity.clone()),
            )
            .await
            .map_err(|err| {
                error!(db_error = %err, "subscriptions: failed to create subscription");
                err
            })?;

        info!(%id, "subscriptions: subscription created");
        Ok(insert_subscription_entity.into_entity(id).into())
    }

    pub async fn find_by_id(&self, subscription_id: i64) -> UseCaseResult<SubscriptionModel> {
        info!(%subscription_id, "subscriptions: get requested");

        let subscription = self
            .within_deadline(
                "get subscription",
                self.subscription_repository.find_by_id(subscription_id),
            )
            .await
            .map_err(|err| {
                log_failure(&err, subscription_id, "get");
                err
            })?;

        Ok(subscription.into())
    }

    /// Replaces every mutable field of an existing subscription. A missing id
    /// is reported before the body is looked at.
    pub async fn update(
        &self,
        subscription_id: i64,
        insert_subscription_model: InsertSubscriptionModel,
    ) -> UseCaseResult<SubscriptionModel> {
        info!(%subscription_id, "subscriptions: update requested");

        self.within_deadline(
            "get subscription for update",
            self.subscription_repository.find_by_id(subscription_id),
        )
        .await
        .map_err(|err| {
            log_failure(&err, subscription_id, "update lookup");
            err
        })?;

        let (start, end) = validated_period(&insert_subscription_model).map_err(|err| {
            warn!(
                %subscription_id,
                status = err.status_code().as_u16(),
                error = %err,
                "subscriptions: update rejected"
            );
            err
        })?;

        let edit_subscription_entity = EditSubscriptionEntity {
            service_name: insert_subscription_model.service_name,
            price: insert_subscription_model.price,
            user_id: insert_subscription_model.user_id,
            start_date: start.first_instant(),
            end_date: end.map(|end| end.first_instant()),
        };

        self.within_deadline(
            "update subscription",
            self.subscription_repository
                .update(subscription_id, edit_subscription_entity.clone()),
        )
        .await
        .map_err(|err| {
            log_failure(&err, subscription_id, "update");
            err
        })?;

        info!(%subscription_id, "subscriptions: subscription updated");
        Ok(edit_subscription_entity.into_entity(subscription_id).into())
    }

    pub async fn delete(&self, subscription_id: i64) -> UseCaseResult<()> {
        info!(%subscription_id, "subscriptions: delete requested");

        self.within_deadline(
            "delete subscription",
            self.subscription_repository.delete(subscription_id),
        )
        .await
        .map_err(|err| {
            log_failure(&err, subscription_id, "delete");
            err
        })?;

        info!(%subscription_id, "subscriptions: subscription deleted");
        Ok(())
    }

    pub async fn list(&self, pagination: Pagination) -> UseCaseResult<Vec<SubscriptionModel>> {
        info!(
            limit = pagination.limit,
            offset = pagination.offset,
            "subscriptions: list requested"
        );

        let subscriptions = self
            .within_deadline(
                "list subscriptions",
                self.subscription_repository
                    .list(pagination.limit, pagination.offset),
            )
            .await
            .map_err(|err| {
                error!(db_error = %err, "subscriptions: failed to list subscriptions");
                err
            })?;

        let subscription_count = subscriptions.len();
        info!(subscription_count, "subscriptions: list loaded");
        Ok(subscriptions.into_iter().map(SubscriptionModel::from).collect())
    }

    /// Sums the price of every subscription active at some point between the
    /// first day of `start_date` and the last day of `end_date`. Subscriptions
    /// without an end date are treated as still running.
    pub async fn total_cost(&self, total_cost_model: TotalCostModel) -> UseCaseResult<TotalCostDto> {
        info!(
            start_date = %total_cost_model.start_date,
            end_date = %total_cost_model.end_date,
            user_id = ?total_cost_model.user_id,
            service_name = ?total_cost_model.service_name,
            "subscriptions: total cost requested"
        );

        let filter = total_cost_filter(total_cost_model).map_err(|err| {
            warn!(
                status = err.status_code().as_u16(),
                error = %err,
                "subscriptions: total cost rejected"
            );
            err
        })?;

        let total_cost = self
            .within_deadline(
                "calculate total cost",
                self.subscription_repository.total_cost(filter),
            )
            .await
            .map_err(|err| {
                error!(db_error = %err, "subscriptions: failed to calculate total cost");
                err
            })?;

        info!(total_cost, "subscriptions: total cost calculated");
        Ok(TotalCostDto { total_cost })
    }

    /// Bounds a store call by the configured deadline and lifts its error.
    async fn within_deadline<R, F>(&self, operation: &'static str, call: F) -> UseCaseResult<R>
    where
        F: Future<Output = RepositoryResult<R>>,
    {
        match tokio::time::timeout(self.store_timeout, call).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(RepositoryError::NotFound(id))) => Err(SubscriptionError::NotFound(id)),
            Ok(Err(RepositoryError::Storage(err))) => {
                Err(SubscriptionError::Storage(err.context(operation)))
            }
            Err(_) => Err(SubscriptionError::Storage(anyhow!(
                "{operation}: store did not answer within {:?}",
                self.store_timeout
            ))),
        }
    }
}

fn log_failure(err: &SubscriptionError, subscription_id: i64, operation: &str) {
    match err {
        SubscriptionError::NotFound(_) => warn!(
            %subscription_id,
            operation,
            status = err.status_code().as_u16(),
            "subscriptions: subscription not found"
        ),
        _ => error!(
            %subscription_id,
            operation,
            db_error = %err,
            "subscriptions: store call failed"
        ),
    }
}

fn parse_month(field: &'static str, raw: &str) -> UseCaseResult<MonthYear> {
    raw.parse::<MonthYear>()
        .map_err(|source| SubscriptionError::InvalidFormat { field, source })
}

fn validated_period(
    model: &InsertSubscriptionModel,
) -> UseCaseResult<(MonthYear, Option<MonthYear>)> {
    model
        .validate()
        .map_err(|errors| SubscriptionError::Validation(errors.to_string()))?;

    let start = parse_month("start_date", &model.start_date)?;
    let end = model
        .end_date
        .as_deref()
        .map(|raw| parse_month("end_date", raw))
        .transpose()?;

    if let Some(end) = end {
        if end < start {
            return Err(SubscriptionError::Validation(format!(
                "end_date {end} is before start_date {start}"
            )));
        }
    }

    Ok((start, end))
}

fn total_cost_filter(model: TotalCostModel) -> UseCaseResult<TotalCostFilter> {
    model
        .validate()
        .map_err(|errors| SubscriptionError::Validation(errors.to_string()))?;

    let start = parse_month("start_date", &model.start_date)?;
    let end = parse_month("end_date", &model.end_date)?;

    Ok(TotalCostFilter {
        period_start: start.first_instant(),
        period_end: end.month_end(),
        user_id: model.user_id,
        service_name: model.service_name,
    })
}
