//! Genomic region value type
//!
//! A region is an immutable 1-based, closed interval on a chromosome:
//! both `start` and `end` positions belong to the region. Conversion to
//! the 0-based half-open convention happens only at the htslib boundary.

use crate::core::error::RegionError;
use std::fmt;
use std::str::FromStr;

/// An immutable genomic interval (1-based, both ends inclusive)
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Region {
    chromosome: String,
    start: u64,
    end: u64,
}

impl Region {
    /// Create a region, validating `1 <= start <= end`
    pub fn new(chromosome: impl Into<String>, start: u64, end: u64) -> Result<Self, RegionError> {
        let chromosome = chromosome.into();
        if start == 0 || start > end {
            return Err(RegionError::InvalidInterval {
                chromosome,
                start,
                end,
            });
        }
        Ok(Self {
            chromosome,
            start,
            end,
        })
    }

    pub fn chromosome(&self) -> &str {
        &self.chromosome
    }

    /// 1-based inclusive start
    pub fn start(&self) -> u64 {
        self.start
    }

    /// 1-based inclusive end
    pub fn end(&self) -> u64 {
        self.end
    }

    /// Number of positions spanned by the region
    pub fn len(&self) -> u64 {
        self.end - self.start + 1
    }

    pub fn is_empty(&self) -> bool {
        false
    }

    /// 0-based inclusive start for htslib fetch calls
    pub fn fetch_start(&self) -> i64 {
        self.start as i64 - 1
    }

    /// 0-based exclusive end for htslib fetch calls
    pub fn fetch_end(&self) -> i64 {
        self.end as i64
    }
}

impl fmt::Display for Region {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}-{}", self.chromosome, self.start, self.end)
    }
}

impl FromStr for Region {
    type Err = RegionError;

    /// Parse a `chr:start-end` region string
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || RegionError::InvalidFormat(s.to_string());

        let (chromosome, interval) = s.rsplit_once(':').ok_or_else(invalid)?;
        let (start, end) = interval.split_once('-').ok_or_else(invalid)?;

        if chromosome.is_empty() {
            return Err(invalid());
        }

        // Tolerate thousands separators as produced by genome browsers
        let start: u64 = start.replace(',', "").parse().map_err(|_| invalid())?;
        let end: u64 = end.replace(',', "").parse().map_err(|_| invalid())?;

        Region::new(chromosome, start, end)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_region_new_valid() {
        let region = Region::new("chr1", 100, 200).unwrap();
        assert_eq!(region.chromosome(), "chr1");
        assert_eq!(region.start(), 100);
        assert_eq!(region.end(), 200);
        assert_eq!(region.len(), 101);
    }

    #[test]
    fn test_region_single_position() {
        let region = Region::new("chr1", 150, 150).unwrap();
        assert_eq!(region.len(), 1);
    }

    #[test]
    fn test_region_inverted_bounds() {
        assert!(Region::new("chr1", 200, 100).is_err());
    }

    #[test]
    fn test_region_zero_start() {
        assert!(Region::new("chr1", 0, 100).is_err());
    }

    #[test]
    fn test_region_fetch_coordinates() {
        let region = Region::new("chr1", 100, 200).unwrap();
        assert_eq!(region.fetch_start(), 99);
        assert_eq!(region.fetch_end(), 200);
    }

    #[test]
    fn test_region_from_str() {
        let region: Region = "chr1:100-200".parse().unwrap();
        assert_eq!(region.chromosome(), "chr1");
        assert_eq!(region.start(), 100);
        assert_eq!(region.end(), 200);
    }

    #[test]
    fn test_region_from_str_with_separators() {
        let region: Region = "chr2:1,000-2,000".parse().unwrap();
        assert_eq!(region.start(), 1000);
        assert_eq!(region.end(), 2000);
    }

    #[test]
    fn test_region_from_str_colon_in_chrom() {
        let region: Region = "HLA-A*01:01:100-200".parse().unwrap();
        assert_eq!(region.chromosome(), "HLA-A*01:01");
    }

    #[test]
    fn test_region_from_str_invalid() {
        assert!("chr1".parse::<Region>().is_err());
        assert!("chr1:100".parse::<Region>().is_err());
        assert!(":100-200".parse::<Region>().is_err());
        assert!("chr1:abc-200".parse::<Region>().is_err());
        assert!("chr1:200-100".parse::<Region>().is_err());
    }

    #[test]
    fn test_region_display_round_trip() {
        let region = Region::new("chrX", 5, 42).unwrap();
        let parsed: Region = region.to_string().parse().unwrap();
        assert_eq!(region, parsed);
    }
}
