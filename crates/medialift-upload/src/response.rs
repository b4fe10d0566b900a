//! Validation of the upload endpoint's success body.
//!
//! A 2xx reply only counts as success when its JSON body names the stored
//! file, e.g. `{"FileName":"a1b2c3.png"}`.

use serde_json::Value;

use crate::error::ResponseError;

/// Extract the server-side file name from `body`.
///
/// A field that is absent, not a string, or empty is reported as
/// [`ResponseError::MissingFileName`].
pub fn parse_upload_response(body: &[u8], field: &str) -> Result<String, ResponseError> {
    let value: Value = serde_json::from_slice(body)?;
    match value.get(field) {
        Some(Value::String(name)) if !name.is_empty() => Ok(name.clone()),
        _ => Err(ResponseError::MissingFileName {
            field: field.to_string(),
        }),
    }
}
