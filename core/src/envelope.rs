//! The typed result envelope returned for every adapted operation.
//!
//! # Design
//! The envelope is a plain sum type so that "exactly one of value or error"
//! holds by construction. Its serialized form keeps the flat
//! `{success, value, error}` layout so logs and non-Rust consumers see the
//! familiar shape; deserialization rejects inputs where `success` disagrees
//! with the populated field.

use serde::de::{self, DeserializeOwned};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::ErrorInfo;

/// Outcome of one asynchronous operation.
///
/// Operations without a meaningful payload (deletions) use
/// `ResultEnvelope<()>`.
#[derive(Debug, Clone, PartialEq)]
pub enum ResultEnvelope<T> {
    Success(T),
    Failure(ErrorInfo),
}

impl<T> ResultEnvelope<T> {
    pub fn success(&self) -> bool {
        matches!(self, ResultEnvelope::Success(_))
    }

    pub fn value(&self) -> Option<&T> {
        match self {
            ResultEnvelope::Success(value) => Some(value),
            ResultEnvelope::Failure(_) => None,
        }
    }

    pub fn error(&self) -> Option<&ErrorInfo> {
        match self {
            ResultEnvelope::Success(_) => None,
            ResultEnvelope::Failure(error) => Some(error),
        }
    }

    pub fn into_result(self) -> Result<T, ErrorInfo> {
        match self {
            ResultEnvelope::Success(value) => Ok(value),
            ResultEnvelope::Failure(error) => Err(error),
        }
    }
}

impl<T> From<Result<T, ErrorInfo>> for ResultEnvelope<T> {
    fn from(result: Result<T, ErrorInfo>) -> Self {
        match result {
            Ok(value) => ResultEnvelope::Success(value),
            Err(error) => ResultEnvelope::Failure(error),
        }
    }
}

#[derive(Serialize)]
struct WireRef<'a, T> {
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    value: Option<&'a T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<&'a ErrorInfo>,
}

#[derive(Deserialize)]
struct WireOwned<T> {
    success: bool,
    value: Option<T>,
    error: Option<ErrorInfo>,
}

impl<T: Serialize> Serialize for ResultEnvelope<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        WireRef {
            success: self.success(),
            value: self.value(),
            error: self.error(),
        }
        .serialize(serializer)
    }
}

impl<'de, T: DeserializeOwned> Deserialize<'de> for ResultEnvelope<T> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let wire = WireOwned::<T>::deserialize(deserializer)?;
        match (wire.success, wire.value, wire.error) {
            (true, Some(value), None) => Ok(ResultEnvelope::Success(value)),
            (false, None, Some(error)) => Ok(ResultEnvelope::Failure(error)),
            // `null` reads back as a missing value; unit payloads land here.
            (true, None, None) => T::deserialize(serde_json::Value::Null)
                .map(ResultEnvelope::Success)
                .map_err(de::Error::custom),
            (success, value, error) => Err(de::Error::custom(format!(
                "inconsistent envelope: success={success}, value present={}, error present={}",
                value.is_some(),
                error.is_some()
            ))),
        }
    }
}
