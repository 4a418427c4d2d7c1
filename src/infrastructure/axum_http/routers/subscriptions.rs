use std::{sync::Arc, time::Duration};

use axum::{
    Json, Router,
    extract::{
        Path, Query, State,
        rejection::{JsonRejection, PathRejection, QueryRejection},
    },
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
};

use crate::{
    application::usercases::subscriptions::SubscriptionUseCase,
    domain::{
        repositories::subscriptions::SubscriptionRepository,
        value_objects::subscriptions::{
            InsertSubscriptionModel, ListSubscriptionsQuery, SubscriptionModel, TotalCostDto,
            TotalCostModel,
        },
    },
    infrastructure::{
        axum_http::error_responses::{AppError, ErrorResponse},
        postgres::{postgres_connection::PgPoolSquad, repositories::subscriptions::SubscriptionPostgres},
    },
};

pub fn routes(db_pool: Arc<PgPoolSquad>, store_timeout: Duration) -> Router {
    let subscriptions_repository = SubscriptionPostgres::new(Arc::clone(&db_pool));
    let subscriptions_usecase =
        SubscriptionUseCase::new(Arc::new(subscriptions_repository), store_timeout);

    router(Arc::new(subscriptions_usecase))
}

pub fn router<T>(subscriptions_usecase: Arc<SubscriptionUseCase<T>>) -> Router
where
    T: SubscriptionRepository + Send + Sync + 'static,
{
    Router::new()
        .route("/", post(create::<T>).get(list::<T>))
        .route("/total-cost", post(total_cost::<T>))
        .route(
            "/:id",
            get(find_by_id::<T>).put(update::<T>).delete(delete::<T>),
        )
        .with_state(subscriptions_usecase)
}

#[utoipa::path(
    post,
    path = "/api/v1/subscriptions",
    summary = "Create subscription",
    tags = ["subscriptions"],
    request_body = InsertSubscriptionModel,
    responses(
        (status = 201, description = "Subscription created", body = SubscriptionModel),
        (status = 400, description = "Invalid input", body = ErrorResponse),
        (status = 500, description = "Storage failure", body = ErrorResponse)
    )
)]
pub async fn create<T>(
    State(subscriptions_usecase): State<Arc<SubscriptionUseCase<T>>>,
    payload: Result<Json<InsertSubscriptionModel>, JsonRejection>,
) -> Result<impl IntoResponse, AppError>
where
    T: SubscriptionRepository + Send + Sync + 'static,
{
    let Json(insert_subscription_model) = payload?;
    let subscription = subscriptions_usecase
        .create(insert_subscription_model)
        .await?;

    Ok((StatusCode::CREATED, Json(subscription)))
}

#[utoipa::path(
    get,
    path = "/api/v1/subscriptions/{id}",
    summary = "Get subscription by id",
    tags = ["subscriptions"],
    params(("id" = i64, Path, description = "Subscription id")),
    responses(
        (status = 200, description = "Subscription", body = SubscriptionModel),
        (status = 400, description = "Invalid id", body = ErrorResponse),
        (status = 404, description = "Subscription not found", body = ErrorResponse),
        (status = 500, description = "Storage failure", body = ErrorResponse)
    )
)]
pub async fn find_by_id<T>(
    State(subscriptions_usecase): State<Arc<SubscriptionUseCase<T>>>,
    subscription_id: Result<Path<i64>, PathRejection>,
) -> Result<impl IntoResponse, AppError>
where
    T: SubscriptionRepository + Send + Sync + 'static,
{
    let Path(subscription_id) = subscription_id?;
    let subscription = subscriptions_usecase.find_by_id(subscription_id).await?;

    Ok(Json(subscription))
}

#[utoipa::path(
    put,
    path = "/api/v1/subscriptions/{id}",
    summary = "Replace subscription",
    tags = ["subscriptions"],
    params(("id" = i64, Path, description = "Subscription id")),
    request_body = InsertSubscriptionModel,
    responses(
        (status = 200, description = "Subscription updated", body = SubscriptionModel),
        (status = 400, description = "Invalid input", body = ErrorResponse),
        (status = 404, description = "Subscription not found", body = ErrorResponse),
        (status = 500, description = "Storage failure", body = ErrorResponse)
    )
)]
pub async fn update<T>(
    State(subscriptions_usecase): State<Arc<SubscriptionUseCase<T>>>,
    subscription_id: Result<Path<i64>, PathRejection>,
    payload: Result<Json<InsertSubscriptionModel>, JsonRejection>,
) -> Result<impl IntoResponse, AppError>
where
    T: SubscriptionRepository + Send + Sync + 'static,
{
    let Path(subscription_id) = subscription_id?;
    let Json(insert_subscription_model) = payload?;
    let subscription = subscriptions_usecase
        .update(subscription_id, insert_subscription_model)
        .await?;

    Ok(Json(subscription))
}

#[utoipa::path(
    delete,
    path = "/api/v1/subscriptions/{id}",
    summary = "Delete subscription",
    tags = ["subscriptions"],
    params(("id" = i64, Path, description = "Subscription id")),
    responses(
        (status = 204, description = "Subscription deleted"),
        (status = 400, description = "Invalid id", body = ErrorResponse),
        (status = 404, description = "Subscription not found", body = ErrorResponse),
        (status = 500, description = "Storage failure", body = ErrorResponse)
    )
)]
pub async fn delete<T>(
    State(subscriptions_usecase): State<Arc<SubscriptionUseCase<T>>>,
    subscription_id: Result<Path<i64>, PathRejection>,
) -> Result<impl IntoResponse, AppError>
where
    T: SubscriptionRepository + Send + Sync + 'static,
{
    let Path(subscription_id) = subscription_id?;
    subscriptions_usecase.delete(subscription_id).await?;

    Ok(StatusCode::NO_CONTENT)
}

#[utoipa::path(
    get,
    path = "/api/v1/subscriptions",
    summary = "List subscriptions",
    tags = ["subscriptions"],
    params(
        ("limit" = Option<i64>, Query, description = "Page size, defaults to 10"),
        ("offset" = Option<i64>, Query, description = "Rows to skip, defaults to 0")
    ),
    responses(
        (status = 200, description = "Subscriptions ordered by id", body = Vec<SubscriptionModel>),
        (status = 500, description = "Storage failure", body = ErrorResponse)
    )
)]
pub async fn list<T>(
    State(subscriptions_usecase): State<Arc<SubscriptionUseCase<T>>>,
    query: Result<Query<ListSubscriptionsQuery>, QueryRejection>,
) -> Result<impl IntoResponse, AppError>
where
    T: SubscriptionRepository + Send + Sync + 'static,
{
    // An undecodable query string is treated like an absent one.
    let query = query.map(|Query(query)| query).unwrap_or_default();
    let subscriptions = subscriptions_usecase.list(query.pagination()).await?;

    Ok(Json(subscriptions))
}

#[utoipa::path(
    post,
    path = "/api/v1/subscriptions/total-cost",
    summary = "Total cost over a period",
    tags = ["subscriptions"],
    request_body = TotalCostModel,
    responses(
        (status = 200, description = "Sum of prices of overlapping subscriptions", body = TotalCostDto),
        (status = 400, description = "Invalid period", body = ErrorResponse),
        (status = 500, description = "Storage failure", body = ErrorResponse)
    )
)]
pub async fn total_cost<T>(
    State(subscriptions_usecase): State<Arc<SubscriptionUseCase<T>>>,
    payload: Result<Json<TotalCostModel>, JsonRejection>,
) -> Result<impl IntoResponse, AppError>
where
    T: SubscriptionRepository + Send + Sync + 'static,
{
    let Json(total_cost_model) = payload?;
    let total_cost = subscriptions_usecase.total_cost(total_cost_model).await?;

    Ok(Json(total_cost))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{
        entities::subscriptions::{
            EditSubscriptionEntity, InsertSubscriptionEntity, SubscriptionEntity,
        },
        repositories::subscriptions::{RepositoryError, RepositoryResult},
        value_objects::subscriptions::TotalCostFilter,
    };
    use async_trait::async_trait;
    use axum::{
        body::Body,
        http::{Method, Request, Response},
    };
    use serde::de::DeserializeOwned;
    use serde_json::{Value, json};
    use std::sync::Mutex;
    use tower::ServiceExt;
    use uuid::Uuid;

    /// Store fake holding rows in memory, with the same overlap semantics as the SQL query.
    #[derive(Default)]
    struct InMemorySubscriptions {
        rows: Mutex<Vec<SubscriptionEntity>>,
    }

    #[async_trait]
    impl SubscriptionRepository for InMemorySubscriptions {
        async fn create(&self, entity: InsertSubscriptionEntity) -> RepositoryResult<i64> {
            let mut rows = self.rows.lock().unwrap();
            let id = rows.iter().map(|row| row.id).max().unwrap_or(0) + 1;
            rows.push(entity.into_entity(id));
            Ok(id)
        }

        async fn find_by_id(&self, subscription_id: i64) -> RepositoryResult<SubscriptionEntity> {
            self.rows
                .lock()
                .unwrap()
                .iter()
                .find(|row| row.id == subscription_id)
                .cloned()
                .ok_or(RepositoryError::NotFound(subscription_id))
        }

        async fn update(
            &self,
            subscription_id: i64,
            entity: EditSubscriptionEntity,
        ) -> RepositoryResult<()> {
            let mut rows = self.rows.lock().unwrap();
            let row = rows
                .iter_mut()
                .find(|row| row.id == subscription_id)
                .ok_or(RepositoryError::NotFound(subscription_id))?;
            *row = entity.into_entity(subscription_id);
            Ok(())
        }

        async fn delete(&self, subscription_id: i64) -> RepositoryResult<()> {
            let mut rows = self.rows.lock().unwrap();
            let before = rows.len();
            rows.retain(|row| row.id != subscription_id);
            if rows.len() == before {
                return Err(RepositoryError::NotFound(subscription_id));
            }
            Ok(())
        }

        async fn list(&self, limit: i64, offset: i64) -> RepositoryResult<Vec<SubscriptionEntity>> {
            let mut rows = self.rows.lock().unwrap().clone();
            rows.sort_by_key(|row| row.id);
            Ok(rows
                .into_iter()
                .skip(offset as usize)
                .take(limit as usize)
                .collect())
        }

        async fn total_cost(&self, filter: TotalCostFilter) -> RepositoryResult<i64> {
            Ok(self
                .rows
                .lock()
                .unwrap()
                .iter()
                .filter(|row| row.start_date <= filter.period_end)
                .filter(|row| row.end_date.is_none_or(|end| end >= filter.period_start))
                .filter(|row| filter.user_id.is_none_or(|user_id| row.user_id == user_id))
                .filter(|row| {
                    filter
                        .service_name
                        .as_deref()
                        .is_none_or(|name| row.service_name == name)
                })
                .map(|row| i64::from(row.price))
                .sum())
        }
    }

    fn app() -> Router {
        let usecase = SubscriptionUseCase::new(
            Arc::new(InMemorySubscriptions::default()),
            Duration::from_secs(5),
        );
        Router::new().nest("/api/v1/subscriptions", router(Arc::new(usecase)))
    }

    async fn send(app: &Router, method: Method, uri: &str, body: Option<Value>) -> Response<Body> {
        let request = Request::builder().method(method).uri(uri);
        let request = match body {
            Some(body) => request
                .header("content-type", "application/json")
                .body(Body::from(body.to_string())),
            None => request.body(Body::empty()),
        }
        .unwrap();

        app.clone().oneshot(request).await.unwrap()
    }

    async fn read_json<B: DeserializeOwned>(response: Response<Body>) -> B {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    async fn create(app: &Router, body: Value) -> SubscriptionModel {
        let response = send(app, Method::POST, "/api/v1/subscriptions", Some(body)).await;
        assert_eq!(response.status(), StatusCode::CREATED);
        read_json(response).await
    }

    async fn total_cost(app: &Router, body: Value) -> i64 {
        let response = send(app, Method::POST, "/api/v1/subscriptions/total-cost", Some(body)).await;
        assert_eq!(response.status(), StatusCode::OK);
        read_json::<TotalCostDto>(response).await.total_cost
    }

    #[tokio::test]
    async fn create_returns_assigned_id_and_normalized_dates() {
        let app = app();
        let user_id = Uuid::new_v4();

        let response = send(
            &app,
            Method::POST,
            "/api/v1/subscriptions",
            Some(json!({
                "service_name": "Yandex Plus",
                "price": 400,
                "user_id": user_id,
                "start_date": "07-2025"
            })),
        )
        .await;

        assert_eq!(response.status(), StatusCode::CREATED);
        let body: Value = read_json(response).await;
        assert_eq!(body["id"], 1);
        assert_eq!(body["service_name"], "Yandex Plus");
        assert_eq!(body["user_id"], user_id.to_string());
        assert_eq!(body["start_date"], "2025-07-01T00:00:00Z");
        assert!(body["end_date"].is_null());
    }

    #[tokio::test]
    async fn create_rejects_bad_input_with_400() {
        let app = app();
        let user_id = Uuid::new_v4();

        for body in [
            json!({ "service_name": "Yandex Plus", "price": 400, "user_id": user_id, "start_date": "2025-07" }),
            json!({ "service_name": "Yandex Plus", "price": 0, "user_id": user_id, "start_date": "07-2025" }),
            json!({ "service_name": "", "price": 400, "user_id": user_id, "start_date": "07-2025" }),
            json!({ "price": 400, "user_id": user_id, "start_date": "07-2025" }),
            json!({ "service_name": "Yandex Plus", "price": 400, "user_id": "not-a-uuid", "start_date": "07-2025" }),
        ] {
            let response = send(&app, Method::POST, "/api/v1/subscriptions", Some(body)).await;
            assert_eq!(response.status(), StatusCode::BAD_REQUEST);

            let error: Value = read_json(response).await;
            assert_eq!(error["code"], 400);
        }
    }

    #[tokio::test]
    async fn malformed_json_is_400() {
        let app = app();
        let request = Request::builder()
            .method(Method::POST)
            .uri("/api/v1/subscriptions")
            .header("content-type", "application/json")
            .body(Body::from("{\"service_name\":"))
            .unwrap();

        let response = app.oneshot(request).await.unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn get_missing_subscription_is_404() {
        let app = app();

        let response = send(&app, Method::GET, "/api/v1/subscriptions/999", None).await;

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        let error: Value = read_json(response).await;
        assert_eq!(error["code"], 404);
    }

    #[tokio::test]
    async fn non_numeric_id_is_400() {
        let app = app();

        let response = send(&app, Method::GET, "/api/v1/subscriptions/abc", None).await;

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn update_replaces_subscription() {
        let app = app();
        let user_id = Uuid::new_v4();
        let created = create(
            &app,
            json!({ "service_name": "Yandex Plus", "price": 400, "user_id": user_id, "start_date": "07-2025", "end_date": "12-2025" }),
        )
        .await;

        let response = send(
            &app,
            Method::PUT,
            &format!("/api/v1/subscriptions/{}", created.id),
            Some(json!({ "service_name": "Kinopoisk", "price": 299, "user_id": user_id, "start_date": "08-2025" })),
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);

        let response = send(
            &app,
            Method::GET,
            &format!("/api/v1/subscriptions/{}", created.id),
            None,
        )
        .await;
        let fetched: SubscriptionModel = read_json(response).await;
        assert_eq!(fetched.service_name, "Kinopoisk");
        assert_eq!(fetched.price, 299);
        assert_eq!(fetched.start_date.to_rfc3339(), "2025-08-01T00:00:00+00:00");
        assert_eq!(fetched.end_date, None);
    }

    #[tokio::test]
    async fn update_of_missing_subscription_is_404_and_creates_nothing() {
        let app = app();

        let response = send(
            &app,
            Method::PUT,
            "/api/v1/subscriptions/41",
            Some(json!({ "service_name": "Kinopoisk", "price": 299, "user_id": Uuid::new_v4(), "start_date": "08-2025" })),
        )
        .await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let response = send(&app, Method::GET, "/api/v1/subscriptions", None).await;
        let listed: Vec<SubscriptionModel> = read_json(response).await;
        assert!(listed.is_empty());
    }

    #[tokio::test]
    async fn delete_returns_204_then_404() {
        let app = app();
        let created = create(
            &app,
            json!({ "service_name": "Yandex Plus", "price": 400, "user_id": Uuid::new_v4(), "start_date": "07-2025" }),
        )
        .await;
        let uri = format!("/api/v1/subscriptions/{}", created.id);

        let response = send(&app, Method::DELETE, &uri, None).await;
        assert_eq!(response.status(), StatusCode::NO_CONTENT);

        let response = send(&app, Method::DELETE, &uri, None).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let response = send(&app, Method::GET, &uri, None).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn list_pages_by_id_and_ignores_malformed_parameters() {
        let app = app();
        let user_id = Uuid::new_v4();
        for price in 1..=12 {
            create(
                &app,
                json!({ "service_name": "Service", "price": price, "user_id": user_id, "start_date": "01-2025" }),
            )
            .await;
        }

        let response = send(&app, Method::GET, "/api/v1/subscriptions?limit=abc&offset=-1", None).await;
        assert_eq!(response.status(), StatusCode::OK);
        let listed: Vec<SubscriptionModel> = read_json(response).await;
        assert_eq!(listed.len(), 10);
        assert_eq!(listed[0].id, 1);

        let response = send(&app, Method::GET, "/api/v1/subscriptions?limit=5&offset=10", None).await;
        let listed: Vec<SubscriptionModel> = read_json(response).await;
        assert_eq!(listed.iter().map(|s| s.id).collect::<Vec<_>>(), vec![11, 12]);
    }

    #[tokio::test]
    async fn total_cost_sums_overlapping_subscriptions() {
        let app = app();
        let user_id = Uuid::new_v4();
        create(
            &app,
            json!({ "service_name": "Yandex Plus", "price": 400, "user_id": user_id, "start_date": "07-2025" }),
        )
        .await;
        create(
            &app,
            json!({ "service_name": "Kinopoisk", "price": 300, "user_id": user_id, "start_date": "03-2025", "end_date": "05-2025" }),
        )
        .await;

        let total = total_cost(&app, json!({ "start_date": "01-2025", "end_date": "12-2025" })).await;

        assert_eq!(total, 700);
    }

    #[tokio::test]
    async fn total_cost_with_no_matches_is_zero() {
        let app = app();

        let total = total_cost(&app, json!({ "start_date": "01-2025", "end_date": "12-2025" })).await;

        assert_eq!(total, 0);
    }

    #[tokio::test]
    async fn total_cost_includes_partial_and_open_ended_overlap() {
        let app = app();
        let user_id = Uuid::new_v4();
        create(
            &app,
            json!({ "service_name": "Partial", "price": 100, "user_id": user_id, "start_date": "01-2025", "end_date": "03-2025" }),
        )
        .await;
        create(
            &app,
            json!({ "service_name": "Forever", "price": 50, "user_id": user_id, "start_date": "01-2020" }),
        )
        .await;
        create(
            &app,
            json!({ "service_name": "Ended", "price": 7, "user_id": user_id, "start_date": "01-2024", "end_date": "12-2024" }),
        )
        .await;
        create(
            &app,
            json!({ "service_name": "Later", "price": 9, "user_id": user_id, "start_date": "03-2025" }),
        )
        .await;

        let february = total_cost(&app, json!({ "start_date": "02-2025", "end_date": "02-2025" })).await;
        assert_eq!(february, 150);

        let far_future = total_cost(&app, json!({ "start_date": "06-2030", "end_date": "06-2030" })).await;
        assert_eq!(far_future, 59);
    }

    #[tokio::test]
    async fn total_cost_period_end_includes_whole_last_month() {
        let app = app();
        create(
            &app,
            json!({ "service_name": "Yandex Plus", "price": 400, "user_id": Uuid::new_v4(), "start_date": "07-2025" }),
        )
        .await;

        let total = total_cost(&app, json!({ "start_date": "01-2025", "end_date": "07-2025" })).await;
        assert_eq!(total, 400);

        let total = total_cost(&app, json!({ "start_date": "01-2025", "end_date": "06-2025" })).await;
        assert_eq!(total, 0);
    }

    #[tokio::test]
    async fn total_cost_filters_are_conjunctive() {
        let app = app();
        let alice = Uuid::new_v4();
        let bob = Uuid::new_v4();
        for (user_id, service_name, price) in [
            (alice, "Yandex Plus", 400),
            (alice, "Kinopoisk", 300),
            (bob, "Yandex Plus", 250),
        ] {
            create(
                &app,
                json!({ "service_name": service_name, "price": price, "user_id": user_id, "start_date": "01-2025" }),
            )
            .await;
        }
        let period = |extra: Value| {
            let mut body = json!({ "start_date": "01-2025", "end_date": "12-2025" });
            body.as_object_mut()
                .unwrap()
                .extend(extra.as_object().unwrap().clone());
            body
        };

        assert_eq!(total_cost(&app, period(json!({ "user_id": alice }))).await, 700);
        assert_eq!(
            total_cost(&app, period(json!({ "service_name": "Yandex Plus" }))).await,
            650
        );
        assert_eq!(
            total_cost(&app, period(json!({ "user_id": bob, "service_name": "Yandex Plus" }))).await,
            250
        );
        assert_eq!(
            total_cost(&app, period(json!({ "user_id": bob, "service_name": "Kinopoisk" }))).await,
            0
        );
    }

    #[tokio::test]
    async fn total_cost_rejects_bad_period_with_400() {
        let app = app();

        for body in [
            json!({ "start_date": "2025-01", "end_date": "12-2025" }),
            json!({ "start_date": "01-2025" }),
        ] {
            let response =
                send(&app, Method::POST, "/api/v1/subscriptions/total-cost", Some(body)).await;
            assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        }
    }

    #[tokio::test]
    async fn total_cost_with_inverted_period_still_counts_overlap() {
        let app = app();
        let user_id = Uuid::new_v4();
        create(
            &app,
            json!({ "service_name": "Yandex Plus", "price": 400, "user_id": user_id, "start_date": "01-2025" }),
        )
        .await;
        create(
            &app,
            json!({ "service_name": "Kinopoisk", "price": 300, "user_id": user_id, "start_date": "02-2025" }),
        )
        .await;

        let total = total_cost(&app, json!({ "start_date": "12-2025", "end_date": "01-2025" })).await;

        assert_eq!(total, 400);
    }

    #[tokio::test]
    async fn update_of_missing_subscription_with_bad_body_is_404() {
        let app = app();

        let response = send(
            &app,
            Method::PUT,
            "/api/v1/subscriptions/77",
            Some(json!({ "service_name": "Kinopoisk", "price": 299, "user_id": Uuid::new_v4(), "start_date": "bad" })),
        )
        .await;

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
