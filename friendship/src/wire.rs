//! Request and response bodies of the friendship REST API.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ValidationError;
use crate::model::Tier;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataResponse<T> {
    pub data: T,
}

impl<T> DataResponse<T> {
    pub fn new(data: T) -> DataResponse<T> {
        DataResponse { data }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageResponse {
    pub message: String,
}

impl MessageResponse {
    pub fn new(message: impl Into<String>) -> MessageResponse {
        MessageResponse { message: message.into() }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendRequestPayload {
    pub friend_id: Uuid,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateTierPayload {
    pub tier: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub custom_tier: Option<String>,
}

impl UpdateTierPayload {
    pub fn into_tier(self) -> Result<Tier, ValidationError> {
        Tier::parse(&self.tier, self.custom_tier.as_deref())
    }
}

impl From<&Tier> for UpdateTierPayload {
    fn from(tier: &Tier) -> Self {
        UpdateTierPayload {
            tier: tier.kind.to_string(),
            custom_tier: tier.custom_label.clone(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CleanupResult {
    pub deleted: u64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SuggestionsQuery {
    #[serde(default)]
    pub limit: Option<u32>,
}
