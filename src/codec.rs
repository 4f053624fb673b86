//! Response encoding

use crate::config::OutputFormat;
use crate::driver::DslResponse;
use crate::error::Result;

/// Turns a build response into bytes and back
pub trait ResponseCodec {
    fn encode(&self, response: &DslResponse) -> Result<Vec<u8>>;
    fn decode(&self, bytes: &[u8]) -> Result<DslResponse>;
}

/// JSON, pretty or compact
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec {
    pub format: OutputFormat,
}

impl JsonCodec {
    pub fn new(format: OutputFormat) -> Self {
        Self { format }
    }
}

impl ResponseCodec for JsonCodec {
    fn encode(&self, response: &DslResponse) -> Result<Vec<u8>> {
        let mut bytes = match self.format {
            OutputFormat::Pretty => serde_json::to_vec_pretty(response)?,
            OutputFormat::Compact => serde_json::to_vec(response)?,
        };
        bytes.push(b'\n');
        Ok(bytes)
    }

    fn decode(&self, bytes: &[u8]) -> Result<DslResponse> {
        Ok(serde_json::from_slice(bytes)?)
    }
}
