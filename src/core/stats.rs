//! Global alignment statistics
//!
//! Two-stage accumulation: `compute` derives a per-record increment with no
//! shared state, `update` merges increments into a running total. The merge
//! is associative and commutative over the record multiset, so increments
//! may later be computed in parallel and merged in any order.

use rust_htslib::bam::Record;
use serde::ser::SerializeStruct;
use serde::{Serialize, Serializer};

/// Mergeable count/mean/variance accumulator
///
/// Merging uses the count-weighted parallel update (Chan et al.), which is
/// order-independent up to floating-point rounding.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct RunningSummary {
    count: u64,
    mean: f64,
    m2: f64,
}

impl RunningSummary {
    /// Summary of a single observation
    pub fn observe(value: f64) -> Self {
        Self {
            count: 1,
            mean: value,
            m2: 0.0,
        }
    }

    pub fn merge(&mut self, other: &RunningSummary) {
        if other.count == 0 {
            return;
        }
        if self.count == 0 {
            *self = *other;
            return;
        }
        let total = self.count + other.count;
        let delta = other.mean - self.mean;
        self.m2 += other.m2
            + delta * delta * (self.count as f64 * other.count as f64) / total as f64;
        self.mean += delta * other.count as f64 / total as f64;
        self.count = total;
    }

    pub fn count(&self) -> u64 {
        self.count
    }

    pub fn mean(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.mean
        }
    }

    /// Population variance
    pub fn variance(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.m2 / self.count as f64
        }
    }

    pub fn stddev(&self) -> f64 {
        self.variance().sqrt()
    }
}

impl Serialize for RunningSummary {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut state = serializer.serialize_struct("RunningSummary", 3)?;
        state.serialize_field("count", &self.count)?;
        state.serialize_field("mean", &self.mean())?;
        state.serialize_field("stddev", &self.stddev())?;
        state.end()
    }
}

/// Accumulated summary statistics over a scan
#[derive(Debug, Clone, Default, Serialize)]
pub struct AlignmentGlobalStats {
    pub num_total: u64,
    pub num_mapped: u64,
    pub num_unmapped: u64,
    pub num_paired: u64,
    pub num_properly_paired: u64,
    pub num_duplicates: u64,
    pub num_secondary: u64,
    pub num_supplementary: u64,
    pub num_qc_failed: u64,

    /// CIGAR event and clipped-base tallies over mapped records
    pub num_insertions: u64,
    pub num_deletions: u64,
    pub num_soft_clipped_bases: u64,
    pub num_hard_clipped_bases: u64,

    pub mapping_quality: RunningSummary,
    pub read_length: RunningSummary,
    /// Absolute template length of properly paired records with positive TLEN
    pub insert_size: RunningSummary,
}

impl AlignmentGlobalStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Merge another accumulator into this one; counts add, summaries merge
    pub fn merge(&mut self, other: &AlignmentGlobalStats) {
        self.num_total += other.num_total;
        self.num_mapped += other.num_mapped;
        self.num_unmapped += other.num_unmapped;
        self.num_paired += other.num_paired;
        self.num_properly_paired += other.num_properly_paired;
        self.num_duplicates += other.num_duplicates;
        self.num_secondary += other.num_secondary;
        self.num_supplementary += other.num_supplementary;
        self.num_qc_failed += other.num_qc_failed;

        self.num_insertions += other.num_insertions;
        self.num_deletions += other.num_deletions;
        self.num_soft_clipped_bases += other.num_soft_clipped_bases;
        self.num_hard_clipped_bases += other.num_hard_clipped_bases;

        self.mapping_quality.merge(&other.mapping_quality);
        self.read_length.merge(&other.read_length);
        self.insert_size.merge(&other.insert_size);
    }
}

/// Two-stage statistics calculator
pub struct GlobalStatsCalculator;

impl GlobalStatsCalculator {
    /// Pure per-record increment; never touches shared state
    pub fn compute(record: &Record) -> AlignmentGlobalStats {
        let mut stats = AlignmentGlobalStats::new();
        stats.num_total = 1;

        if record.is_paired() {
            stats.num_paired = 1;
        }
        if record.is_proper_pair() {
            stats.num_properly_paired = 1;
        }
        if record.is_duplicate() {
            stats.num_duplicates = 1;
        }
        if record.is_secondary() {
            stats.num_secondary = 1;
        }
        if record.is_supplementary() {
            stats.num_supplementary = 1;
        }
        if record.is_quality_check_failed() {
            stats.num_qc_failed = 1;
        }

        stats.read_length = RunningSummary::observe(record.seq_len() as f64);

        if record.is_unmapped() {
            stats.num_unmapped = 1;
            return stats;
        }

        stats.num_mapped = 1;
        stats.mapping_quality = RunningSummary::observe(record.mapq() as f64);

        use rust_htslib::bam::record::Cigar;
        for op in record.cigar().iter() {
            match op {
                Cigar::Ins(_) => stats.num_insertions += 1,
                Cigar::Del(_) => stats.num_deletions += 1,
                Cigar::SoftClip(len) => stats.num_soft_clipped_bases += *len as u64,
                Cigar::HardClip(len) => stats.num_hard_clipped_bases += *len as u64,
                _ => {}
            }
        }

        // Count each template once, on the leftmost mate
        if record.is_proper_pair() && record.insert_size() > 0 {
            stats.insert_size = RunningSummary::observe(record.insert_size() as f64);
        }

        stats
    }

    /// Merge one record's increment into the running total
    pub fn update(increment: &AlignmentGlobalStats, total: &mut AlignmentGlobalStats) {
        total.merge(increment);
    }
}
