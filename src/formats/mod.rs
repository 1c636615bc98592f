//! File format adapters
//!
//! Adapters for auxiliary formats consumed next to the alignment file
//! (precomputed BigWig coverage tracks).

pub mod bigwig;

pub use bigwig::{
    BamCoverageTool, CoverageTrackGenerator, DEFAULT_TRACK_WINDOW, default_track_path,
    find_sibling_track, sibling_tracks, windowed_coverage,
};
