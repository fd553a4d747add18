//! JSON snapshot decoding.

use std::collections::HashMap;
use std::io::Read;
use std::marker::PhantomData;

use serde::de::DeserializeOwned;
use vulnfeed_types::error::DecodeError;

use crate::capability::{Convertible, Decoder};

/// Decodes a JSON object keyed by vendor id into its values.
///
/// Keys are discarded and the resulting order is unspecified.
pub struct JsonMapDecoder<R> {
    _record: PhantomData<fn() -> R>,
}

impl<R> JsonMapDecoder<R> {
    #[must_use]
    pub fn new() -> Self {
        Self {
            _record: PhantomData,
        }
    }
}

impl<R> Default for JsonMapDecoder<R> {
    fn default() -> Self {
        Self::new()
    }
}

impl<R> Decoder for JsonMapDecoder<R>
where
    R: Convertible + DeserializeOwned + Send + 'static,
{
    type Record = R;

    fn decode(&self, reader: &mut dyn Read) -> Result<Vec<R>, DecodeError> {
        let map: HashMap<String, R> = serde_json::from_reader(reader)?;
        Ok(map.into_values().collect())
    }
}
