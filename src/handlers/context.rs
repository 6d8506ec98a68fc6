// src/handlers/context.rs
use serde::{de::DeserializeOwned, Deserialize};
use serde_json::Value;

use super::StrategyKind;
use crate::error::PaymasterError;

/// Decodes a JSON value into `T`, reporting any mismatch as a client fault.
///
/// Only JSON objects are accepted, so positional arrays never bind to struct fields.
pub fn decode<T: DeserializeOwned>(what: &str, value: Value) -> Result<T, PaymasterError> {
    if !value.is_object() {
        return Err(PaymasterError::Validation(format!("bad {what}: expected a JSON object")));
    }
    serde_json::from_value(value).map_err(|e| PaymasterError::Validation(format!("bad {what}: {e}")))
}

/// The `context` argument of `pm_sponsorUserOperation`.
///
/// Field names match exactly. Fields other than `type` are ignored.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SponsorshipContext {
    #[serde(rename = "type")]
    pub kind: String,
}

impl SponsorshipContext {
    pub fn from_value(value: Value) -> Result<Self, PaymasterError> {
        let context: Self = decode("context", value)?;
        if context.kind.is_empty() {
            return Err(PaymasterError::Validation(
                "bad context: type must not be empty".to_string(),
            ));
        }
        Ok(context)
    }

    pub fn strategy(&self) -> Result<StrategyKind, PaymasterError> {
        self.kind.parse()
    }
}
