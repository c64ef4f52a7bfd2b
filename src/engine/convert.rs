/*!
 * Value Conversion
 * JSON is the value model on the host side of the engine boundary
 */

use super::types::EngineError;
use rquickjs::convert::Coerced;
use rquickjs::{Ctx, Value};
use serde_json::Value as JsonValue;

/// Materialize a host value inside the context
pub fn json_to_js<'js>(ctx: &Ctx<'js>, value: &JsonValue) -> Result<Value<'js>, EngineError> {
    let text =
        serde_json::to_string(value).map_err(|e| EngineError::Conversion(e.to_string()))?;
    ctx.json_parse(text).map_err(|e| {
        let _ = ctx.catch();
        EngineError::Conversion(e.to_string())
    })
}

/// Bring a script value back to the host
///
/// `undefined`, functions and symbols map to `null`, like `JSON.stringify`.
pub fn js_to_json<'js>(ctx: &Ctx<'js>, value: Value<'js>) -> Result<JsonValue, EngineError> {
    if value.is_undefined() || value.is_function() || value.is_symbol() {
        return Ok(JsonValue::Null);
    }
    let text = match ctx.json_stringify(value) {
        Ok(Some(text)) => text
            .to_string()
            .map_err(|e| EngineError::Conversion(e.to_string()))?,
        Ok(None) => return Ok(JsonValue::Null),
        Err(e) => {
            // cyclic structures and BigInt land here
            let _ = ctx.catch();
            return Err(EngineError::Conversion(e.to_string()));
        }
    };
    serde_json::from_str(&text).map_err(|e| EngineError::Conversion(e.to_string()))
}

/// Human-readable description of a caught exception value
pub fn describe_exception(value: &Value<'_>) -> String {
    if let Some(exception) = value.as_exception() {
        let name = exception
            .get::<_, Option<String>>("name")
            .ok()
            .flatten()
            .unwrap_or_else(|| "Error".to_string());
        return match exception.message() {
            Some(message) if !message.is_empty() => format!("{}: {}", name, message),
            _ => name,
        };
    }
    value
        .get::<Coerced<String>>()
        .map(|coerced| coerced.0)
        .unwrap_or_else(|_| "Unknown error".to_string())
}
