//! Per-base pileup and windowed coverage
//!
//! Coverage is computed over aligned (M/=/X) positions only: a base
//! contributes to the pileup when its observed quality reaches the
//! configured threshold. Windowed coverage is the arithmetic mean of
//! per-base depths over fixed-size, non-overlapping blocks.

use crate::core::error::{CoverageError, CoverageResult};
use crate::core::region::Region;
use rust_htslib::bam::ext::BamRecordExtensions;
use rust_htslib::bam::Record;

/// Coverage values spanning a region
///
/// `values` has one entry per position when `window_size == 1`, otherwise
/// one entry per block of `window_size` positions (the final block may be
/// shorter). Immutable once returned from a coverage call.
#[derive(Debug, Clone, PartialEq)]
pub struct RegionCoverage {
    region: Region,
    window_size: u32,
    values: Vec<f32>,
}

impl RegionCoverage {
    /// Zero-filled per-base coverage (`window_size == 1`)
    pub fn per_base(region: Region) -> Self {
        let len = region.len() as usize;
        Self {
            region,
            window_size: 1,
            values: vec![0.0; len],
        }
    }

    /// Wrap precomputed windowed values, validating the block-count law
    pub fn windowed(region: Region, window_size: u32, values: Vec<f32>) -> CoverageResult<Self> {
        if window_size == 0 {
            return Err(CoverageError::InvalidWindowSize(window_size));
        }
        let expected = WindowedCoverageAggregator::window_count(region.len(), window_size);
        if values.len() != expected {
            return Err(CoverageError::BigWig(format!(
                "expected {} windows of size {} over {}, got {}",
                expected,
                window_size,
                region,
                values.len()
            )));
        }
        Ok(Self {
            region,
            window_size,
            values,
        })
    }

    pub fn region(&self) -> &Region {
        &self.region
    }

    pub fn window_size(&self) -> u32 {
        self.window_size
    }

    pub fn values(&self) -> &[f32] {
        &self.values
    }

    /// Mean depth across all windows
    pub fn mean(&self) -> f32 {
        if self.values.is_empty() {
            return 0.0;
        }
        self.values.iter().sum::<f32>() / self.values.len() as f32
    }

    /// Re-aggregate per-base coverage into blocks of `window_size`
    pub fn rebin(&self, window_size: u32) -> CoverageResult<RegionCoverage> {
        if self.window_size != 1 {
            return Err(CoverageError::InvalidWindowSize(self.window_size));
        }
        let values = WindowedCoverageAggregator::aggregate(&self.values, window_size)?;
        RegionCoverage::windowed(self.region.clone(), window_size, values)
    }

    fn values_mut(&mut self) -> &mut [f32] {
        &mut self.values
    }
}

/// Per-base pileup calculator
///
/// Feeds one accepted, mapped record at a time into a `RegionCoverage`
/// accumulator. Positions outside the target region and bases below the
/// quality threshold are ignored.
#[derive(Debug, Clone, Copy, Default)]
pub struct CoverageCalculator {
    min_base_quality: u8,
}

impl CoverageCalculator {
    pub fn new(min_base_quality: u8) -> Self {
        Self { min_base_quality }
    }

    pub fn update(&self, record: &Record, coverage: &mut RegionCoverage) {
        debug_assert_eq!(coverage.window_size(), 1);

        let start = coverage.region().start();
        let end = coverage.region().end();
        let quals = record.qual();

        for [qpos, rpos] in record.aligned_pairs() {
            // aligned_pairs yields 0-based reference positions
            let pos = rpos as u64 + 1;
            if pos < start || pos > end {
                continue;
            }
            let quality = match quals.get(qpos as usize) {
                Some(q) => *q,
                None => continue,
            };
            if quality >= self.min_base_quality {
                coverage.values_mut()[(pos - start) as usize] += 1.0;
            }
        }
    }
}

/// Block-averaging over per-base depths
pub struct WindowedCoverageAggregator;

impl WindowedCoverageAggregator {
    /// Number of blocks covering a region: `ceil(region_len / window_size)`
    pub fn window_count(region_len: u64, window_size: u32) -> usize {
        (region_len.div_ceil(window_size as u64)) as usize
    }

    /// Arithmetic mean of each contiguous block; the final block may be short
    pub fn aggregate(per_base: &[f32], window_size: u32) -> CoverageResult<Vec<f32>> {
        if window_size == 0 {
            return Err(CoverageError::InvalidWindowSize(window_size));
        }
        Ok(per_base
            .chunks(window_size as usize)
            .map(|block| block.iter().sum::<f32>() / block.len() as f32)
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_htslib::bam::record::{Cigar, CigarString};

    /// A mapped record aligned as a single match block at `pos` (1-based)
    fn mapped_record(pos: u64, len: usize, base_quality: u8) -> Record {
        let mut record = Record::new();
        let cigar = CigarString(vec![Cigar::Match(len as u32)]);
        let seq = vec![b'A'; len];
        let quals = vec![base_quality; len];
        record.set(b"read", Some(&cigar), &seq, &quals);
        record.set_tid(0);
        record.set_pos(pos as i64 - 1);
        record.set_mapq(60);
        record
    }

    #[test]
    fn test_per_base_length_matches_region() {
        let region = Region::new("chr1", 100, 200).unwrap();
        let coverage = RegionCoverage::per_base(region);
        assert_eq!(coverage.values().len(), 101);
        assert_eq!(coverage.window_size(), 1);
    }

    #[test]
    fn test_pileup_counts_overlapping_records() {
        let region = Region::new("chr1", 100, 200).unwrap();
        let mut coverage = RegionCoverage::per_base(region);
        let calculator = CoverageCalculator::new(20);

        // Three records covering position 150 with base quality 25
        for start in [140, 148, 150] {
            calculator.update(&mapped_record(start, 20, 25), &mut coverage);
        }
        assert_eq!(coverage.values()[50], 3.0);
    }

    #[test]
    fn test_pileup_skips_low_quality_bases() {
        let region = Region::new("chr1", 100, 200).unwrap();
        let mut coverage = RegionCoverage::per_base(region);
        let calculator = CoverageCalculator::new(20);

        calculator.update(&mapped_record(140, 20, 25), &mut coverage);
        calculator.update(&mapped_record(148, 20, 25), &mut coverage);
        // Third record's bases are below the threshold
        calculator.update(&mapped_record(150, 20, 10), &mut coverage);

        assert_eq!(coverage.values()[50], 2.0);
    }

    #[test]
    fn test_pileup_ignores_positions_outside_region() {
        let region = Region::new("chr1", 100, 200).unwrap();
        let mut coverage = RegionCoverage::per_base(region);
        let calculator = CoverageCalculator::new(0);

        // Record straddles the region start: only 100..=104 are inside
        calculator.update(&mapped_record(95, 10, 30), &mut coverage);

        assert_eq!(coverage.values()[0], 1.0);
        assert_eq!(coverage.values()[4], 1.0);
        assert_eq!(coverage.values()[5], 0.0);
    }

    #[test]
    fn test_pileup_skips_deleted_reference_bases() {
        let region = Region::new("chr1", 100, 200).unwrap();
        let mut coverage = RegionCoverage::per_base(region);
        let calculator = CoverageCalculator::new(0);

        // 5M3D5M starting at 100: reference positions 105..=107 are deleted
        let mut record = Record::new();
        let cigar = CigarString(vec![Cigar::Match(5), Cigar::Del(3), Cigar::Match(5)]);
        record.set(b"del_read", Some(&cigar), &[b'A'; 10], &[30; 10]);
        record.set_tid(0);
        record.set_pos(99);
        calculator.update(&record, &mut coverage);

        assert_eq!(coverage.values()[0], 1.0); // 100
        assert_eq!(coverage.values()[5], 0.0); // 105 (deletion)
        assert_eq!(coverage.values()[8], 1.0); // 108
    }

    #[test]
    fn test_window_count_law() {
        assert_eq!(WindowedCoverageAggregator::window_count(101, 1), 101);
        assert_eq!(WindowedCoverageAggregator::window_count(101, 10), 11);
        assert_eq!(WindowedCoverageAggregator::window_count(100, 10), 10);
        assert_eq!(WindowedCoverageAggregator::window_count(1, 50), 1);
    }

    #[test]
    fn test_aggregate_block_means() {
        let per_base = vec![1.0, 3.0, 2.0, 4.0, 10.0];
        let windows = WindowedCoverageAggregator::aggregate(&per_base, 2).unwrap();
        assert_eq!(windows, vec![2.0, 3.0, 10.0]);
    }

    #[test]
    fn test_aggregate_rejects_zero_window() {
        assert!(WindowedCoverageAggregator::aggregate(&[1.0], 0).is_err());
    }

    #[test]
    fn test_rebin_matches_manual_aggregation() {
        let region = Region::new("chr1", 1, 5).unwrap();
        let mut coverage = RegionCoverage::per_base(region);
        coverage.values_mut().copy_from_slice(&[2.0, 2.0, 4.0, 4.0, 6.0]);

        let rebinned = coverage.rebin(2).unwrap();
        assert_eq!(rebinned.window_size(), 2);
        assert_eq!(rebinned.values(), &[2.0, 4.0, 6.0]);
    }

    #[test]
    fn test_windowed_validates_block_count() {
        let region = Region::new("chr1", 1, 100).unwrap();
        assert!(RegionCoverage::windowed(region.clone(), 10, vec![0.0; 10]).is_ok());
        assert!(RegionCoverage::windowed(region, 10, vec![0.0; 9]).is_err());
    }
}
