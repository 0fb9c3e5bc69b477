//! Kitchen-sink payload: one field of each common wire type, used to exercise
//! table endpoints end to end.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

/// Collection name used for storage and routing.
pub const KITCHEN_SINK_COLLECTION: &str = "kitchensink";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KitchenSinkState {
    None,
    Completed,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct KitchenSink {
    /// Required.
    #[validate(length(min = 1, max = 255))]
    pub string_value: String,
    pub int_value: Option<i64>,
    pub bool_value: Option<bool>,
    pub double_value: Option<f64>,
    /// `YYYY-MM-DD`.
    pub date_value: Option<NaiveDate>,
    pub guid_value: Option<Uuid>,
    pub state_value: Option<KitchenSinkState>,
}

impl KitchenSink {
    /// Payload with only the required field set.
    pub fn named(string_value: impl Into<String>) -> Self {
        Self {
            string_value: string_value.into(),
            int_value: None,
            bool_value: None,
            double_value: None,
            date_value: None,
            guid_value: None,
            state_value: None,
        }
    }
}
