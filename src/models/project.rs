//! Project entity model.
//!
//! Projects are the aggregate root of the sync orchestration: each project
//! carries its tracker endpoint, credentials, and tracked remote accounts.

use sea_orm::ActiveModelBehavior;
use sea_orm::entity::prelude::*;
use sea_orm::prelude::DateTimeWithTimeZone;
use serde_json::Value as JsonValue;
use uuid::Uuid;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "projects")]
pub struct Model {
    /// Unique identifier for the project (primary key)
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    /// Human-readable project name
    pub name: String,

    /// Base URL of the tracker site (e.g. `https://acme.atlassian.net`)
    pub tracker_base_url: String,

    /// Account email used for tracker API authentication
    pub tracker_email: String,

    /// Tracker API token paired with the email
    pub tracker_api_token: String,

    /// JSON array of tracked remote account ids
    #[sea_orm(column_type = "JsonBinary")]
    pub tracked_account_ids: JsonValue,

    pub created_at: DateTimeWithTimeZone,
    pub updated_at: DateTimeWithTimeZone,
}

impl Model {
    /// Parse the tracked account ids column into a string list.
    ///
    /// Malformed entries are skipped rather than failing the whole sync.
    pub fn account_ids(&self) -> Vec<String> {
        self.tracked_account_ids
            .as_array()
            .map(|values| {
                values
                    .iter()
                    .filter_map(|value| value.as_str().map(str::to_string))
                    .collect()
            })
            .unwrap_or_default()
    }
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
