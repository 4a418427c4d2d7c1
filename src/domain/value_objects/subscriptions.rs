use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::{Validate, ValidationError};

use crate::domain::entities::subscriptions::SubscriptionEntity;

pub const DEFAULT_LIST_LIMIT: i64 = 10;
pub const DEFAULT_LIST_OFFSET: i64 = 0;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, ToSchema)]
pub struct SubscriptionModel {
    pub id: i64,
    pub service_name: String,
    pub price: i32,
    pub user_id: Uuid,
    pub start_date: DateTime<Utc>,
    pub end_date: Option<DateTime<Utc>>,
}

impl From<SubscriptionEntity> for SubscriptionModel {
    fn from(entity: SubscriptionEntity) -> Self {
        Self {
            id: entity.id,
            service_name: entity.service_name,
            price: entity.price,
            user_id: entity.user_id,
            start_date: entity.start_date,
            end_date: entity.end_date,
        }
    }
}

/// Body of create and update requests. Dates are `MM-YYYY` strings.
///
/// Missing fields deserialize to their zero value so that the validator, not
/// the JSON decoder, reports them.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Validate, ToSchema)]
#[serde(default)]
pub struct InsertSubscriptionModel {
    #[validate(length(min = 1, message = "service_name is required"))]
    pub service_name: String,
    #[validate(range(min = 1, message = "price must be greater than 0"))]
    pub price: i32,
    #[validate(custom(function = "validate_user_id"))]
    pub user_id: Uuid,
    #[validate(length(min = 1, message = "start_date is required"))]
    #[schema(example = "07-2025")]
    pub start_date: String,
    #[schema(example = "12-2025")]
    pub end_date: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Validate, ToSchema)]
#[serde(default)]
pub struct TotalCostModel {
    #[validate(length(min = 1, message = "start_date is required"))]
    #[schema(example = "01-2025")]
    pub start_date: String,
    #[validate(length(min = 1, message = "end_date is required"))]
    #[schema(example = "12-2025")]
    pub end_date: String,
    pub user_id: Option<Uuid>,
    pub service_name: Option<String>,
}

/// Period and optional conjunctive filters of a total-cost query, already normalized.
#[derive(Debug, Clone, PartialEq)]
pub struct TotalCostFilter {
    pub period_start: DateTime<Utc>,
    pub period_end: DateTime<Utc>,
    pub user_id: Option<Uuid>,
    pub service_name: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, ToSchema)]
pub struct TotalCostDto {
    pub total_cost: i64,
}

/// Raw `limit`/`offset` query parameters. Kept as strings so that malformed
/// values fall back to defaults instead of rejecting the request.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ListSubscriptionsQuery {
    pub limit: Option<String>,
    pub offset: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pagination {
    pub limit: i64,
    pub offset: i64,
}

impl Default for Pagination {
    fn default() -> Self {
        Self {
            limit: DEFAULT_LIST_LIMIT,
            offset: DEFAULT_LIST_OFFSET,
        }
    }
}

impl ListSubscriptionsQuery {
    pub fn pagination(&self) -> Pagination {
        let defaults = Pagination::default();

        Pagination {
            limit: parse_non_negative(self.limit.as_deref()).unwrap_or(defaults.limit),
            offset: parse_non_negative(self.offset.as_deref()).unwrap_or(defaults.offset),
        }
    }
}

fn parse_non_negative(raw: Option<&str>) -> Option<i64> {
    raw?.trim().parse::<i64>().ok().filter(|value| *value >= 0)
}

fn validate_user_id(user_id: &Uuid) -> Result<(), ValidationError> {
    if user_id.is_nil() {
        let mut err = ValidationError::new("required");
        err.message = Some("user_id is required".into());
        return Err(err);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_insert_model() -> InsertSubscriptionModel {
        InsertSubscriptionModel {
            service_name: "Yandex Plus".to_string(),
            price: 400,
            user_id: Uuid::new_v4(),
            start_date: "07-2025".to_string(),
            end_date: None,
        }
    }

    #[test]
    fn accepts_complete_insert_model() {
        assert!(valid_insert_model().validate().is_ok());
    }

    #[test]
    fn rejects_missing_required_fields() {
        let model: InsertSubscriptionModel = serde_json::from_str("{}").unwrap();
        let errors = model.validate().unwrap_err();
        let fields = errors.field_errors();

        assert!(fields.contains_key("service_name"));
        assert!(fields.contains_key("price"));
        assert!(fields.contains_key("user_id"));
        assert!(fields.contains_key("start_date"));
    }

    #[test]
    fn rejects_non_positive_price() {
        let model = InsertSubscriptionModel {
            price: 0,
            ..valid_insert_model()
        };
        let errors = model.validate().unwrap_err();

        assert!(errors.field_errors().contains_key("price"));
        assert_eq!(errors.field_errors().len(), 1);
    }

    #[test]
    fn end_date_is_optional_in_json() {
        let user_id = Uuid::new_v4();
        let body = format!(
            r#"{{"service_name":"Yandex Plus","price":400,"user_id":"{user_id}","start_date":"07-2025"}}"#
        );
        let model: InsertSubscriptionModel = serde_json::from_str(&body).unwrap();

        assert_eq!(model.end_date, None);
        assert_eq!(model.user_id, user_id);
    }

    #[test]
    fn subscription_model_serializes_open_end_as_null() {
        let model = SubscriptionModel {
            id: 1,
            service_name: "Yandex Plus".to_string(),
            price: 400,
            user_id: Uuid::nil(),
            start_date: "2025-07-01T00:00:00Z".parse().unwrap(),
            end_date: None,
        };
        let json = serde_json::to_value(&model).unwrap();

        assert_eq!(json["start_date"], "2025-07-01T00:00:00Z");
        assert!(json["end_date"].is_null());
    }

    #[test]
    fn pagination_defaults_when_absent() {
        let query = ListSubscriptionsQuery::default();
        assert_eq!(query.pagination(), Pagination { limit: 10, offset: 0 });
    }

    #[test]
    fn pagination_ignores_malformed_values() {
        let query = ListSubscriptionsQuery {
            limit: Some("ten".to_string()),
            offset: Some("-5".to_string()),
        };
        assert_eq!(query.pagination(), Pagination { limit: 10, offset: 0 });
    }

    #[test]
    fn pagination_uses_supplied_values() {
        let query = ListSubscriptionsQuery {
            limit: Some("25".to_string()),
            offset: Some("50".to_string()),
        };
        assert_eq!(query.pagination(), Pagination { limit: 25, offset: 50 });
    }
}
