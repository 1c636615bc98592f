//! Top-level alignment access façade
//!
//! A `BamManager` owns the open file handle and composes indexing,
//! iteration, coverage and statistics into one API. Exactly one handle is
//! open at a time; iterators borrow it mutably, so concurrent iterators
//! over the same manager are rejected at compile time. Callers needing
//! parallel scans open independent managers.

use crate::core::coverage::{CoverageCalculator, RegionCoverage};
use crate::core::error::{CoverageError, QueryError, Result};
use crate::core::filters::AlignmentFilters;
use crate::core::index;
use crate::core::iterator::{
    AlignmentValue, BamIterator, ContainmentBound, MalformedHandlers, OutputKind, RecordSource,
};
use crate::core::options::AlignmentOptions;
use crate::core::region::Region;
use crate::core::stats::{AlignmentGlobalStats, GlobalStatsCalculator};
use crate::formats::bigwig::{self, CoverageTrackGenerator};
use rust_htslib::bam::{self, Read};
use std::path::{Path, PathBuf};
use std::sync::Arc;

enum Handle {
    Closed,
    Indexed(bam::IndexedReader),
    Sequential(bam::Reader),
}

/// Indexed alignment-access manager for one BAM/CRAM file
pub struct BamManager {
    path: PathBuf,
    handle: Handle,
    handlers: MalformedHandlers,
}

impl BamManager {
    /// Create a manager for an existing alignment file.
    ///
    /// The handle itself is acquired lazily, with htslib's lenient
    /// tolerance of recoverable malformedness at the record level.
    pub fn new(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        if !path.is_file() {
            return Err(QueryError::FileNotFound(path).into());
        }
        Ok(Self {
            path,
            handle: Handle::Closed,
            handlers: MalformedHandlers::new(),
        })
    }

    /// Attach malformed-record handlers; they flow into every iterator
    pub fn with_malformed_handlers(mut self, handlers: MalformedHandlers) -> Self {
        self.handlers = handlers;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Release the underlying file handle; repeated calls are a no-op
    pub fn close(&mut self) {
        if !matches!(self.handle, Handle::Closed) {
            log::debug!("closing {}", self.path.display());
        }
        self.handle = Handle::Closed;
    }

    pub fn is_closed(&self) -> bool {
        matches!(self.handle, Handle::Closed)
    }

    /// Create the index at the conventional sibling path
    pub fn create_index(&self) -> Result<PathBuf> {
        Ok(index::create_index(&self.path)?)
    }

    /// Create the index at an explicit path
    pub fn create_index_at(&self, output: &Path) -> Result<PathBuf> {
        Ok(index::create_index_at(&self.path, output)?)
    }

    pub fn index_exists(&self) -> bool {
        index::index_exists(&self.path)
    }

    fn indexed_reader(&mut self) -> Result<&mut bam::IndexedReader> {
        if !matches!(self.handle, Handle::Indexed(_)) {
            index::ensure_index(&self.path)?;
            let reader = bam::IndexedReader::from_path(&self.path)?;
            log::debug!("opened indexed reader for {}", self.path.display());
            self.handle = Handle::Indexed(reader);
        }
        match &mut self.handle {
            Handle::Indexed(reader) => Ok(reader),
            // installed just above
            _ => unreachable!("indexed handle was just opened"),
        }
    }

    fn sequential_reader(&mut self) -> Result<&mut bam::Reader> {
        if !matches!(self.handle, Handle::Sequential(_)) {
            let reader = bam::Reader::from_path(&self.path)?;
            log::debug!("opened sequential reader for {}", self.path.display());
            self.handle = Handle::Sequential(reader);
        }
        match &mut self.handle {
            Handle::Sequential(reader) => Ok(reader),
            _ => unreachable!("sequential handle was just opened"),
        }
    }

    /// Region-bounded iterator backed by the random-access index.
    ///
    /// Fails with `MissingIndex` before any seek when the index artifact is
    /// absent. The caller owns the returned iterator; dropping it releases
    /// the borrow of the manager's handle.
    pub fn iterator(
        &mut self,
        region: &Region,
        filters: &AlignmentFilters,
        options: &AlignmentOptions,
        kind: OutputKind,
    ) -> Result<BamIterator<'_>> {
        let handlers = self.handlers.clone();
        let reader = self.indexed_reader()?;

        let tid = reader
            .header()
            .tid(region.chromosome().as_bytes())
            .ok_or_else(|| QueryError::ChromosomeNotFound(region.chromosome().to_string()))?;
        let reference_names = reference_names(reader.header());

        reader
            .fetch((tid, region.fetch_start(), region.fetch_end()))
            .map_err(QueryError::Htslib)?;

        let containment = options.contained_only.then(|| ContainmentBound {
            start: region.fetch_start(),
            end: region.fetch_end(),
        });

        Ok(BamIterator::new(
            RecordSource::Indexed(reader),
            filters,
            options,
            kind,
            reference_names,
            containment,
            handlers,
        ))
    }

    /// Forward-only full-scan iterator from the current file position.
    ///
    /// No index is required; the sequential handle persists between calls,
    /// so consecutive scans continue where the previous one stopped.
    pub fn scan_iterator(
        &mut self,
        filters: &AlignmentFilters,
        options: &AlignmentOptions,
        kind: OutputKind,
    ) -> Result<BamIterator<'_>> {
        let handlers = self.handlers.clone();
        let reader = self.sequential_reader()?;
        let reference_names = reference_names(reader.header());

        Ok(BamIterator::new(
            RecordSource::Sequential(reader),
            filters,
            options,
            kind,
            reference_names,
            None,
            handlers,
        ))
    }

    /// Drain a region iterator into a vector, never exceeding
    /// `min(options.limit, MAX_QUERY_RECORDS)` results.
    pub fn query(
        &mut self,
        region: &Region,
        filters: &AlignmentFilters,
        options: &AlignmentOptions,
        kind: OutputKind,
    ) -> Result<Vec<AlignmentValue>> {
        let iterator = self.iterator(region, filters, options, kind)?;
        Ok(drain(iterator, options.query_limit()))
    }

    /// Full-scan counterpart of `query`, with the same absolute cap
    pub fn scan(
        &mut self,
        filters: &AlignmentFilters,
        options: &AlignmentOptions,
        kind: OutputKind,
    ) -> Result<Vec<AlignmentValue>> {
        let iterator = self.scan_iterator(filters, options, kind)?;
        Ok(drain(iterator, options.query_limit()))
    }

    /// Per-base coverage over a region (`window_size == 1`).
    ///
    /// Unmapped records are skipped before they reach the calculator.
    pub fn coverage(
        &mut self,
        region: &Region,
        filters: &AlignmentFilters,
        options: &AlignmentOptions,
    ) -> Result<RegionCoverage> {
        let calculator = CoverageCalculator::new(options.min_base_quality);
        let mut coverage = RegionCoverage::per_base(region.clone());

        let iterator = self.iterator(region, filters, options, OutputKind::Native)?;
        for value in iterator {
            if let Some(record) = value.as_native() {
                if !record.is_unmapped() {
                    calculator.update(record, &mut coverage);
                }
            }
        }
        Ok(coverage)
    }

    /// Windowed coverage, resolved in fixed order: an explicit track, the
    /// conventional sibling tracks (`<input>.bw`, then `<input>.coverage.bw`),
    /// then direct computation, which is possible only for `window_size == 1`.
    /// Anything else fails with `NoCoverageSource`.
    pub fn windowed_coverage(
        &mut self,
        region: &Region,
        window_size: u32,
        track: Option<&Path>,
    ) -> Result<RegionCoverage> {
        if window_size == 0 {
            return Err(CoverageError::InvalidWindowSize(window_size).into());
        }

        if let Some(track) = track {
            return Ok(bigwig::windowed_coverage(track, region, window_size)?);
        }
        if let Some(sibling) = bigwig::find_sibling_track(&self.path) {
            log::debug!("using precomputed coverage track {}", sibling.display());
            return Ok(bigwig::windowed_coverage(&sibling, region, window_size)?);
        }
        if window_size == 1 {
            return self.coverage(region, &AlignmentFilters::none(), &AlignmentOptions::default());
        }
        Err(CoverageError::NoCoverageSource { window_size }.into())
    }

    /// Global statistics over a full scan
    pub fn stats(
        &mut self,
        filters: &AlignmentFilters,
        options: &AlignmentOptions,
    ) -> Result<AlignmentGlobalStats> {
        let iterator = self.scan_iterator(filters, options, OutputKind::Native)?;
        Ok(accumulate_stats(iterator))
    }

    /// Global statistics over a region
    pub fn region_stats(
        &mut self,
        region: &Region,
        filters: &AlignmentFilters,
        options: &AlignmentOptions,
    ) -> Result<AlignmentGlobalStats> {
        let iterator = self.iterator(region, filters, options, OutputKind::Native)?;
        Ok(accumulate_stats(iterator))
    }

    /// Produce a downsampled coverage track next to the alignment file.
    ///
    /// Delegates to the given generator (an external tool); requires the
    /// index, like every other random-access operation on the file.
    pub fn generate_coverage_track(
        &self,
        generator: &dyn CoverageTrackGenerator,
        output: Option<&Path>,
        window_size: u32,
    ) -> Result<PathBuf> {
        index::ensure_index(&self.path)?;
        let output = output
            .map(Path::to_path_buf)
            .unwrap_or_else(|| bigwig::default_track_path(&self.path));
        Ok(generator.generate(&self.path, &output, window_size)?)
    }
}

fn reference_names(header: &bam::HeaderView) -> Arc<[String]> {
    header
        .target_names()
        .iter()
        .map(|name| String::from_utf8_lossy(name).into_owned())
        .collect::<Vec<_>>()
        .into()
}

fn drain(iterator: BamIterator<'_>, cap: usize) -> Vec<AlignmentValue> {
    let mut results = Vec::new();
    for value in iterator {
        results.push(value);
        if results.len() >= cap {
            break;
        }
    }
    results
}

fn accumulate_stats(iterator: BamIterator<'_>) -> AlignmentGlobalStats {
    let mut total = AlignmentGlobalStats::new();
    for value in iterator {
        if let Some(record) = value.as_native() {
            let increment = GlobalStatsCalculator::compute(record);
            GlobalStatsCalculator::update(&increment, &mut total);
        }
    }
    total
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_manager_rejects_missing_file() {
        let result = BamManager::new("/no/such/reads.bam");
        assert!(matches!(
            result,
            Err(crate::core::error::BamScopeError::Query(
                QueryError::FileNotFound(_)
            ))
        ));
    }

    #[test]
    fn test_close_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("reads.bam");
        std::fs::write(&path, b"").unwrap();

        let mut manager = BamManager::new(&path).unwrap();
        assert!(manager.is_closed());
        manager.close();
        manager.close();
        assert!(manager.is_closed());
    }
}
