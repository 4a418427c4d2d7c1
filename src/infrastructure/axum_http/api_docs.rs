use axum::Router;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::{
    domain::value_objects::subscriptions::{
        InsertSubscriptionModel, SubscriptionModel, TotalCostDto, TotalCostModel,
    },
    infrastructure::axum_http::{error_responses::ErrorResponse, routers::subscriptions},
};

pub const OPENAPI_JSON_PATH: &str = "/swagger/openapi.json";

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Subscription Service API",
        version = "1.0.0",
        description = "Manages users' online subscriptions and their cost over a period"
    ),
    paths(
        subscriptions::create,
        subscriptions::find_by_id,
        subscriptions::update,
        subscriptions::delete,
        subscriptions::list,
        subscriptions::total_cost,
    ),
    components(schemas(
        SubscriptionModel,
        InsertSubscriptionModel,
        TotalCostModel,
        TotalCostDto,
        ErrorResponse,
    )),
    tags((name = "subscriptions", description = "Subscription management"))
)]
pub struct ApiDoc;

/// Swagger UI at `/swagger` backed by the generated OpenAPI document.
pub fn routes() -> Router {
    Router::new().merge(SwaggerUi::new("/swagger").url(OPENAPI_JSON_PATH, ApiDoc::openapi()))
}
