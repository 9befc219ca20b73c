//! HTTP `Range` header parsing and resolution.
//!
//! Single ranges only: `bytes=a-b`, `bytes=a-`, `bytes=-n`. Multi-range and
//! malformed headers resolve to 416 at the edge.

/// Outcome of parsing a `Range` header value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RangeHeader {
    /// A well-formed single range.
    Single(ByteRange),
    /// Present but malformed or multi-range.
    Invalid,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ByteRange {
    pub start: Option<u64>,
    pub end: Option<u64>,
}

impl ByteRange {
    /// Clamp the range against a total size, yielding inclusive bounds.
    /// None means the range cannot be satisfied.
    pub fn resolve(&self, size: u64) -> Option<(u64, u64)> {
        if size == 0 {
            return None;
        }
        match (self.start, self.end) {
            (Some(start), Some(end)) => {
                if start > end || start >= size {
                    return None;
                }
                Some((start, end.min(size - 1)))
            }
            (Some(start), None) => {
                if start >= size {
                    return None;
                }
                Some((start, size - 1))
            }
            (None, Some(suffix_len)) => {
                if suffix_len == 0 {
                    return None;
                }
                Some((size.saturating_sub(suffix_len), size - 1))
            }
            (None, None) => None,
        }
    }
}

pub fn parse_range_header(value: &str) -> RangeHeader {
    let Some(spec) = value.trim().strip_prefix("bytes=") else {
        return RangeHeader::Invalid;
    };
    // Multi-range requests are not supported
    if spec.contains(',') {
        return RangeHeader::Invalid;
    }
    let Some((start_raw, end_raw)) = spec.split_once('-') else {
        return RangeHeader::Invalid;
    };

    let start = match start_raw.trim() {
        "" => None,
        digits => match digits.parse::<u64>() {
            Ok(n) => Some(n),
            Err(_) => return RangeHeader::Invalid,
        },
    };
    let end = match end_raw.trim() {
        "" => None,
        digits => match digits.parse::<u64>() {
            Ok(n) => Some(n),
            Err(_) => return RangeHeader::Invalid,
        },
    };

    if start.is_none() && end.is_none() {
        return RangeHeader::Invalid;
    }
    RangeHeader::Single(ByteRange { start, end })
}
