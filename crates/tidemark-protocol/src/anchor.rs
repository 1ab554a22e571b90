use std::fmt;
use std::str::FromStr;

use tidemark_types::ContentHash;

use crate::error::ProtocolError;

/// The fixed-shape pointer written to the ledger for one batch:
/// `<operation_count>.<hex content hash>`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AnchorString {
    pub operation_count: usize,
    pub content_hash: ContentHash,
}

impl AnchorString {
    pub fn new(operation_count: usize, content_hash: ContentHash) -> Self {
        Self {
            operation_count,
            content_hash,
        }
    }

    /// Parse an anchor and reject operation counts above `max_operations`.
    pub fn parse_with_limit(s: &str, max_operations: usize) -> Result<Self, ProtocolError> {
        let anchor: Self = s.parse()?;
        if anchor.operation_count > max_operations {
            return Err(ProtocolError::malformed(format!(
                "anchor declares {} operations, limit is {max_operations}",
                anchor.operation_count
            )));
        }
        Ok(anchor)
    }
}

impl FromStr for AnchorString {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (count, hash) = s
            .split_once('.')
            .ok_or_else(|| ProtocolError::malformed(format!("anchor '{s}' has no separator")))?;

        if count.is_empty() || !count.bytes().all(|b| b.is_ascii_digit()) {
            return Err(ProtocolError::malformed(format!(
                "anchor operation count '{count}' is not a number"
            )));
        }
        let operation_count: usize = count
            .parse()
            .map_err(|_| ProtocolError::malformed(format!("anchor operation count '{count}' overflows")))?;
        if operation_count == 0 {
            return Err(ProtocolError::malformed("anchor declares zero operations"));
        }

        let content_hash = ContentHash::from_hex(hash)
            .map_err(|e| ProtocolError::malformed(format!("anchor content hash: {e}")))?;

        Ok(Self {
            operation_count,
            content_hash,
        })
    }
}

impl fmt::Display for AnchorString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.operation_count, self.content_hash.to_hex())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_and_parse_agree() {
        let anchor = AnchorString::new(12, ContentHash::from_bytes(b"batch"));
        let text = anchor.to_string();
        assert!(text.starts_with("12."));
        assert_eq!(text.parse::<AnchorString>().unwrap(), anchor);
    }

    #[test]
    fn rejects_malformed_anchors() {
        let hash = ContentHash::from_bytes(b"batch").to_hex();
        for bad in [
            String::new(),
            "garbage".to_string(),
            format!("0.{hash}"),
            format!("-1.{hash}"),
            format!("+3.{hash}"),
            format!("x.{hash}"),
            "3.abcd".to_string(),
            "3.".to_string(),
            format!("99999999999999999999999.{hash}"),
        ] {
            assert!(
                matches!(bad.parse::<AnchorString>(), Err(ProtocolError::MalformedData(_))),
                "accepted {bad:?}"
            );
        }
    }

    #[test]
    fn limit_is_enforced() {
        let hash = ContentHash::from_bytes(b"batch").to_hex();
        assert!(AnchorString::parse_with_limit(&format!("100.{hash}"), 100).is_ok());
        assert!(AnchorString::parse_with_limit(&format!("101.{hash}"), 100).is_err());
    }
}
