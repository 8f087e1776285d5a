use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::Error;

/// Inclusive range of block numbers covered by one chunk/bloom pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct BlockRange(pub u64, pub u64);

impl BlockRange {
    pub fn contains(&self, block: u64) -> bool {
        self.0 <= block && block <= self.1
    }

    pub fn intersects(&self, other: &BlockRange) -> bool {
        self.0 <= other.1 && other.0 <= self.1
    }

    /// The whole range lies before `block`.
    pub fn earlier_than(&self, block: u64) -> bool {
        self.1 < block
    }

    /// The whole range lies after `block`.
    pub fn later_than(&self, block: u64) -> bool {
        self.0 > block
    }

    /// Zero padded form used for file names, e.g. `000000000-000000001`.
    pub fn file_stem(&self) -> String {
        format!("{:09}-{:09}", self.0, self.1)
    }
}

impl fmt::Display for BlockRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.0, self.1)
    }
}

/// Accepts a bare range name, a file name or a path. Directory components and
/// a `.bin`/`.bloom` extension are ignored.
impl FromStr for BlockRange {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || Error::InvalidBlockRange(s.to_owned());

        let name = s.rsplit(['/', '\\']).next().unwrap_or(s);
        let name = name
            .strip_suffix(".bin")
            .or_else(|| name.strip_suffix(".bloom"))
            .unwrap_or(name);

        let (first, last) = name.split_once('-').ok_or_else(invalid)?;
        let first = first.parse::<u64>().map_err(|_| invalid())?;
        let last = last.parse::<u64>().map_err(|_| invalid())?;

        if first > last {
            return Err(invalid());
        }

        Ok(Self(first, last))
    }
}
