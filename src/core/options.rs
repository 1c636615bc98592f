//! Query configuration bundle

/// Absolute ceiling on the number of records a draining query may return.
///
/// `query` and `scan` are convenience modes for small fragments of a file;
/// anything larger must go through the iterator methods.
pub const MAX_QUERY_RECORDS: usize = 50_000;

/// Options controlling filtering, bounding and output encoding of a query
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AlignmentOptions {
    /// Maximum number of records to emit; `None` means unbounded
    pub limit: Option<usize>,
    /// Bases below this quality do not contribute to coverage
    pub min_base_quality: u8,
    /// Region queries return only fully contained records instead of any overlap
    pub contained_only: bool,
    /// Quantize per-base qualities on structured output
    pub bin_qualities: bool,
}

impl AlignmentOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// A limit of 0 is treated as "unbounded"
    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = if limit > 0 { Some(limit) } else { None };
        self
    }

    pub fn with_min_base_quality(mut self, min_base_quality: u8) -> Self {
        self.min_base_quality = min_base_quality;
        self
    }

    pub fn with_contained_only(mut self, contained_only: bool) -> Self {
        self.contained_only = contained_only;
        self
    }

    pub fn with_bin_qualities(mut self, bin_qualities: bool) -> Self {
        self.bin_qualities = bin_qualities;
        self
    }

    /// Effective cap for a draining query: `min(limit, MAX_QUERY_RECORDS)`
    pub fn query_limit(&self) -> usize {
        match self.limit {
            Some(limit) if limit > 0 => limit.min(MAX_QUERY_RECORDS),
            _ => MAX_QUERY_RECORDS,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_options() {
        let options = AlignmentOptions::default();
        assert_eq!(options.limit, None);
        assert_eq!(options.min_base_quality, 0);
        assert!(!options.contained_only);
        assert!(!options.bin_qualities);
    }

    #[test]
    fn test_query_limit_unbounded() {
        assert_eq!(AlignmentOptions::default().query_limit(), MAX_QUERY_RECORDS);
    }

    #[test]
    fn test_query_limit_below_ceiling() {
        let options = AlignmentOptions::new().with_limit(5);
        assert_eq!(options.query_limit(), 5);
    }

    #[test]
    fn test_query_limit_capped_at_ceiling() {
        let options = AlignmentOptions::new().with_limit(1_000_000);
        assert_eq!(options.query_limit(), MAX_QUERY_RECORDS);
    }

    #[test]
    fn test_zero_limit_means_unbounded() {
        let options = AlignmentOptions::new().with_limit(0);
        assert_eq!(options.limit, None);
        assert_eq!(options.query_limit(), MAX_QUERY_RECORDS);
    }
}
