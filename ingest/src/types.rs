use serde::{Deserialize, Serialize};
use unchained_format::{Address, BlockRange};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DecodedAppearance {
    pub address: Address,
    pub block_number: u32,
    pub transaction_index: u32,
}

pub struct AppearanceBatch {
    /// Range of the chunk these appearances were decoded from
    pub range: BlockRange,
    /// Name of the chunk file without extension
    pub chunk_name: String,
    pub appearances: Vec<DecodedAppearance>,
    /// Set on the final batch of a chunk. That batch might be empty.
    pub last_in_chunk: bool,
}
