use chrono::{DateTime, Utc};
use diesel::prelude::*;
use uuid::Uuid;

use crate::infrastructure::postgres::schema::subscriptions;

#[derive(Debug, Clone, PartialEq, Selectable, Queryable)]
#[diesel(table_name = subscriptions)]
pub struct SubscriptionEntity {
    pub id: i64,
    pub service_name: String,
    pub price: i32,
    pub user_id: Uuid,
    pub start_date: DateTime<Utc>,
    pub end_date: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Insertable)]
#[diesel(table_name = subscriptions)]
pub struct InsertSubscriptionEntity {
    pub service_name: String,
    pub price: i32,
    pub user_id: Uuid,
    pub start_date: DateTime<Utc>,
    pub end_date: Option<DateTime<Utc>>,
}

/// Full replacement of the mutable columns; a `None` end date clears the column.
#[derive(Debug, Clone, PartialEq, AsChangeset)]
#[diesel(table_name = subscriptions, treat_none_as_null = true)]
pub struct EditSubscriptionEntity {
    pub service_name: String,
    pub price: i32,
    pub user_id: Uuid,
    pub start_date: DateTime<Utc>,
    pub end_date: Option<DateTime<Utc>>,
}

impl InsertSubscriptionEntity {
    pub fn into_entity(self, id: i64) -> SubscriptionEntity {
        SubscriptionEntity {
            id,
            service_name: self.service_name,
            price: self.price,
            user_id: self.user_id,
            start_date: self.start_date,
            end_date: self.end_date,
        }
    }
}

impl EditSubscriptionEntity {
    pub fn into_entity(self, id: i64) -> SubscriptionEntity {
        SubscriptionEntity {
            id,
            service_name: self.service_name,
            price: self.price,
            user_id: self.user_id,
            start_date: self.start_date,
            end_date: self.end_date,
        }
    }
}
