//! Request and response envelopes
//!
//! A request is `{action, api_key, data}`. A response is
//! `{success, error?, ...fields}` where the result fields of the action are
//! flattened next to `success`.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::action::ActionKind;
use crate::error::ProtocolError;

/// A single call to an agent
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentRequest {
    pub action: ActionKind,
    pub api_key: String,
    #[serde(default)]
    pub data: Value,
}

impl AgentRequest {
    /// Build a request from a typed payload
    pub fn new<T: Serialize>(
        action: ActionKind,
        api_key: impl Into<String>,
        data: &T,
    ) -> Result<Self, ProtocolError> {
        Ok(Self {
            action,
            api_key: api_key.into(),
            data: serde_json::to_value(data)?,
        })
    }

    /// Parse the payload into the type expected for this action
    pub fn parse_data<T: DeserializeOwned>(&self) -> Result<T, ProtocolError> {
        Ok(serde_json::from_value(self.data.clone())?)
    }
}

/// Reply to a single call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentResponse {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

impl AgentResponse {
    /// Successful response carrying the fields of `result`
    pub fn ok<T: Serialize>(result: &T) -> Result<Self, ProtocolError> {
        let fields = match serde_json::to_value(result)? {
            Value::Object(map) => map,
            Value::Null => Map::new(),
            other => {
                let mut map = Map::new();
                map.insert("result".to_string(), other);
                map
            }
        };
        Ok(Self {
            success: true,
            error: None,
            fields,
        })
    }

    /// Failed response with a message
    pub fn err(message: impl Into<String>) -> Self {
        Self {
            success: false,
            error: Some(message.into()),
            fields: Map::new(),
        }
    }

    /// Error message for a failed response
    pub fn failure(&self) -> Option<&str> {
        if self.success {
            None
        } else {
            Some(self.error.as_deref().unwrap_or("agent reported failure"))
        }
    }

    /// Decode the flattened result fields
    pub fn decode_fields<T: DeserializeOwned>(&self) -> Result<T, ProtocolError> {
        Ok(serde_json::from_value(Value::Object(self.fields.clone()))?)
    }
}
