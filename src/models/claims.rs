use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Decoded bearer-token payload. `user_id` and `role` are required by the
/// wire format (§3); everything else passes through verbatim so the
/// template engine (§4.11) and the IDOR rules (§4.7) can reference
/// arbitrary claims by name.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct UserClaims {
    pub user_id: Option<String>,
    pub role: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
    pub exp: Option<i64>,
}

impl UserClaims {
    pub fn anonymous() -> Self {
        Self::default()
    }

    /// Resolve a named claim, checking the required fields first and then
    /// the passthrough map.
    pub fn get(&self, name: &str) -> Option<Value> {
        match name {
            "user_id" => self.user_id.clone().map(Value::String),
            "role" => self.role.clone().map(Value::String),
            other => self.extra.get(other).cloned(),
        }
    }

    pub fn to_value(&self) -> Value {
        let mut map = self.extra.clone();
        if let Some(uid) = &self.user_id {
            map.insert("user_id".to_string(), Value::String(uid.clone()));
        }
        if let Some(role) = &self.role {
            map.insert("role".to_string(), Value::String(role.clone()));
        }
        Value::Object(map)
    }
}
