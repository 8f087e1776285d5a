use anyhow::{anyhow, Result};
use unchained_format::BlockRange;

/// Checks that decoding a chunk produced exactly as many appearances as its header declares.
pub fn validate_decoded_count(range: BlockRange, expected: u32, decoded: u64) -> Result<()> {
    if u64::from(expected) != decoded {
        return Err(anyhow!(
            "chunk {} declares {} appearances but {} were decoded",
            range,
            expected,
            decoded
        ));
    }

    Ok(())
}
