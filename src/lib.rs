//! BamScope - Indexed alignment access for BAM/CRAM files
//!
//! Region-bounded random-access queries, lazy filtered iteration in
//! several output representations, per-base and windowed coverage, and
//! streaming global alignment statistics.
//!
//! # Example
//!
//! ```ignore
//! use bamscope::{AlignmentFilters, AlignmentOptions, BamManager, OutputKind, Region};
//!
//! let mut manager = BamManager::new("sample.bam")?;
//! manager.create_index()?;
//!
//! let region: Region = "chr1:100-200".parse()?;
//! let filters = AlignmentFilters::none().mapped_only().min_mapping_quality(20);
//! let options = AlignmentOptions::new().with_limit(100);
//!
//! let records = manager.query(&region, &filters, &options, OutputKind::Structured)?;
//! let coverage = manager.coverage(&region, &filters, &options)?;
//! ```

pub mod core;
pub mod formats;

// Re-export commonly used types
pub use crate::core::{
    AlignmentFilter, AlignmentFilters, AlignmentGlobalStats, AlignmentOptions, AlignmentValue,
    BamIterator, BamManager, BamScopeError, CoverageCalculator, CoverageError, GlobalStatsCalculator,
    IndexError, LogMalformedHandler, MalformedHandlers, MalformedRecord, MalformedRecordHandler,
    MAX_QUERY_RECORDS, OutputKind, QueryError, ReadAlignment, Region, RegionCoverage, RegionError,
    Result, RunningSummary, WindowedCoverageAggregator,
};
pub use crate::formats::{BamCoverageTool, CoverageTrackGenerator};
