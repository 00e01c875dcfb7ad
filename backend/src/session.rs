use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Login session; the id doubles as the bearer token.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    id: Uuid,
    user_id: Uuid,
    data: serde_json::Value,
    created_at: DateTime<Utc>,
}

impl Session {
    pub fn new(user_id: Uuid, data: serde_json::Value) -> Session {
        Session {
            id: Uuid::new_v4(),
            user_id,
            data,
            created_at: Utc::now(),
        }
    }

    pub fn from_parts(id: Uuid, user_id: Uuid, data: serde_json::Value, created_at: DateTime<Utc>) -> Session {
        Session {
            id,
            user_id,
            data,
            created_at,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn user_id(&self) -> Uuid {
        self.user_id
    }

    pub fn data(&self) -> &serde_json::Value {
        &self.data
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }
}
