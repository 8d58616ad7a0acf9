use std::any::type_name;

use anyhow::Result;
use serde::de::DeserializeOwned;

pub struct JsonEncoder;

impl JsonEncoder {
    pub fn encode<T: serde::Serialize>(value: &T) -> Result<Vec<u8>> {
        serde_json::to_vec_pretty(value).map_err(|e| {
            anyhow::anyhow!("error serializing {} into json: {}", type_name::<T>(), e)
        })
    }

    pub fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T> {
        serde_json::from_slice(bytes).map_err(|e| {
            anyhow::anyhow!("error deserializing {} from json: {}", type_name::<T>(), e)
        })
    }
}
