use bytes::Bytes;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::errors::InvokeError;

/// Encodes request values and decodes response payloads for typed calls.
///
/// Encode failures are `InvalidArgument` (nothing was sent); decode failures
/// are `Serialization`.
pub trait PayloadCodec<T> {
    const CONTENT_TYPE: &'static str;

    fn encode(value: &T) -> Result<Bytes, InvokeError>;

    fn decode(payload: &[u8]) -> Result<T, InvokeError>;
}

/// JSON via serde.
#[derive(Clone, Copy, Debug, Default)]
pub struct JsonCodec;

impl<T> PayloadCodec<T> for JsonCodec
where
    T: Serialize + DeserializeOwned,
{
    const CONTENT_TYPE: &'static str = "application/json";

    fn encode(value: &T) -> Result<Bytes, InvokeError> {
        serde_json::to_vec(value).map(Bytes::from).map_err(|err| {
            InvokeError::invalid_argument(format!("failed to encode json payload: {err}"))
        })
    }

    fn decode(payload: &[u8]) -> Result<T, InvokeError> {
        serde_json::from_slice(payload).map_err(|err| {
            InvokeError::Serialization(format!("failed to decode json payload: {err}"))
        })
    }
}

/// Protobuf via prost.
#[derive(Clone, Copy, Debug, Default)]
pub struct ProtoCodec;

impl<T> PayloadCodec<T> for ProtoCodec
where
    T: prost::Message + Default,
{
    const CONTENT_TYPE: &'static str = "application/x-protobuf";

    fn encode(value: &T) -> Result<Bytes, InvokeError> {
        Ok(Bytes::from(value.encode_to_vec()))
    }

    fn decode(payload: &[u8]) -> Result<T, InvokeError> {
        T::decode(payload).map_err(|err| {
            InvokeError::Serialization(format!("failed to decode protobuf payload: {err}"))
        })
    }
}
