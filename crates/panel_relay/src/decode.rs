use crate::DecodeError;

use zbus::zvariant::{Structure, Value};

/// Extract the display message from a received signal.
///
/// Only the first argument is looked at; it has to be a string (or a variant wrapping one).
/// Anything after it is ignored.
pub fn decode(envelope: &zbus::Message) -> std::result::Result<String, DecodeError> {
    // signals without arguments don't carry a body signature at all
    match envelope.body_signature() {
        Ok(signature) if !signature.as_str().is_empty() => {}
        _ => return Err(DecodeError::Empty),
    }

    let body: Structure<'_> = envelope.body().map_err(|e| DecodeError::Malformed(e.to_string()))?;
    decode_fields(body.fields())
}

/// Same as [`decode`], but on the already unpacked arguments of a signal.
pub fn decode_fields(fields: &[Value<'_>]) -> std::result::Result<String, DecodeError> {
    let first = fields.first().ok_or(DecodeError::Empty)?;
    unpack_str(first)
}

fn unpack_str(value: &Value<'_>) -> std::result::Result<String, DecodeError> {
    match value {
        Value::Str(s) => Ok(s.as_str().to_owned()),
        Value::Value(inner) => unpack_str(inner),
        other => Err(DecodeError::WrongType { found: other.value_signature().to_string() }),
    }
}
