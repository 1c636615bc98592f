//! BigWig coverage tracks
//!
//! Reads windowed coverage averages from a precomputed BigWig track and
//! isolates the external tool that produces such tracks behind the
//! `CoverageTrackGenerator` trait. The core never writes BigWig itself.

use crate::core::{CoverageError, CoverageResult, Region, RegionCoverage, WindowedCoverageAggregator};
use bigtools::BigWigRead;
use std::path::{Path, PathBuf};
use std::process::Command;

/// Default averaging window for generated coverage tracks
pub const DEFAULT_TRACK_WINDOW: u32 = 50;

fn append_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path.as_os_str().to_os_string();
    name.push(suffix);
    PathBuf::from(name)
}

/// The two sibling naming conventions, in resolution order
pub fn sibling_tracks(alignment_path: &Path) -> [PathBuf; 2] {
    [
        append_suffix(alignment_path, ".bw"),
        append_suffix(alignment_path, ".coverage.bw"),
    ]
}

/// First existing sibling track, if any
pub fn find_sibling_track(alignment_path: &Path) -> Option<PathBuf> {
    sibling_tracks(alignment_path)
        .into_iter()
        .find(|candidate| candidate.exists())
}

/// Default output path for a generated track (`<input>.coverage.bw`)
pub fn default_track_path(alignment_path: &Path) -> PathBuf {
    append_suffix(alignment_path, ".coverage.bw")
}

/// Read windowed coverage averages for a region from a BigWig track.
///
/// Track values are projected onto a per-base buffer first, so the block
/// boundaries and means are exactly those of the direct pileup path.
pub fn windowed_coverage(
    track: &Path,
    region: &Region,
    window_size: u32,
) -> CoverageResult<RegionCoverage> {
    if window_size == 0 {
        return Err(CoverageError::InvalidWindowSize(window_size));
    }

    let track_str = track
        .to_str()
        .ok_or_else(|| CoverageError::BigWig(format!("non-UTF-8 path: {}", track.display())))?;
    let mut reader =
        BigWigRead::open_file(track_str).map_err(|e| CoverageError::BigWig(e.to_string()))?;

    let start = (region.start() - 1) as u32;
    let end = region.end() as u32;
    let mut per_base = vec![0.0f32; region.len() as usize];

    let intervals = reader
        .get_interval(region.chromosome(), start, end)
        .map_err(|e| CoverageError::BigWig(e.to_string()))?;
    for interval in intervals {
        let interval = interval.map_err(|e| CoverageError::BigWig(e.to_string()))?;
        project_interval(&mut per_base, start, interval.start, interval.end, interval.value);
    }

    let values = WindowedCoverageAggregator::aggregate(&per_base, window_size)?;
    RegionCoverage::windowed(region.clone(), window_size, values)
}

/// Write an interval's value onto the per-base buffer, clamped to the region
fn project_interval(per_base: &mut [f32], region_start: u32, start: u32, end: u32, value: f32) {
    let lo = (start.max(region_start) - region_start) as usize;
    let hi = end
        .min(region_start + per_base.len() as u32)
        .saturating_sub(region_start) as usize;
    if lo >= hi {
        return;
    }
    for slot in &mut per_base[lo..hi] {
        *slot = value;
    }
}

/// Produces a downsampled BigWig coverage track for an alignment file
pub trait CoverageTrackGenerator {
    fn generate(
        &self,
        alignment_path: &Path,
        output: &Path,
        window_size: u32,
    ) -> CoverageResult<PathBuf>;
}

/// deepTools' `bamCoverage` utility, assumed to be on PATH
#[derive(Debug, Clone, Copy, Default)]
pub struct BamCoverageTool;

impl CoverageTrackGenerator for BamCoverageTool {
    fn generate(
        &self,
        alignment_path: &Path,
        output: &Path,
        window_size: u32,
    ) -> CoverageResult<PathBuf> {
        let result = Command::new("bamCoverage")
            .arg("-b")
            .arg(alignment_path)
            .arg("-o")
            .arg(output)
            .arg("-of")
            .arg("bigwig")
            .arg("-bs")
            .arg(window_size.to_string())
            .output();

        match result {
            Ok(out) if out.status.success() => {
                for line in String::from_utf8_lossy(&out.stdout).lines() {
                    log::info!("bamCoverage: {}", line);
                }
                Ok(output.to_path_buf())
            }
            Ok(out) => Err(CoverageError::TrackGeneration {
                tool: "bamCoverage".to_string(),
                message: String::from_utf8_lossy(&out.stderr).into_owned(),
            }),
            Err(e) => Err(CoverageError::TrackGeneration {
                tool: "bamCoverage".to_string(),
                message: e.to_string(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sibling_track_conventions_in_order() {
        let [plain, coverage] = sibling_tracks(Path::new("/data/sample.bam"));
        assert_eq!(plain, PathBuf::from("/data/sample.bam.bw"));
        assert_eq!(coverage, PathBuf::from("/data/sample.bam.coverage.bw"));
    }

    #[test]
    fn test_default_track_path() {
        assert_eq!(
            default_track_path(Path::new("/data/sample.bam")),
            PathBuf::from("/data/sample.bam.coverage.bw")
        );
    }

    #[test]
    fn test_find_sibling_track_prefers_bw() {
        let dir = tempfile::tempdir().unwrap();
        let bam = dir.path().join("reads.bam");
        std::fs::write(&bam, b"").unwrap();
        assert_eq!(find_sibling_track(&bam), None);

        let coverage_bw = append_suffix(&bam, ".coverage.bw");
        std::fs::write(&coverage_bw, b"").unwrap();
        assert_eq!(find_sibling_track(&bam), Some(coverage_bw.clone()));

        // `<input>.bw` wins once both exist
        let plain_bw = append_suffix(&bam, ".bw");
        std::fs::write(&plain_bw, b"").unwrap();
        assert_eq!(find_sibling_track(&bam), Some(plain_bw));
    }

    #[test]
    fn test_project_interval_clamps_to_region() {
        let mut per_base = vec![0.0f32; 10]; // region positions 100..110 (0-based)
        project_interval(&mut per_base, 100, 95, 103, 2.0);
        project_interval(&mut per_base, 100, 108, 140, 5.0);

        assert_eq!(per_base[0], 2.0);
        assert_eq!(per_base[2], 2.0);
        assert_eq!(per_base[3], 0.0);
        assert_eq!(per_base[7], 0.0);
        assert_eq!(per_base[8], 5.0);
        assert_eq!(per_base[9], 5.0);
    }

    #[test]
    fn test_project_interval_outside_region_is_ignored() {
        let mut per_base = vec![0.0f32; 10];
        project_interval(&mut per_base, 100, 40, 60, 9.0);
        project_interval(&mut per_base, 100, 200, 220, 9.0);
        assert!(per_base.iter().all(|v| *v == 0.0));
    }
}
