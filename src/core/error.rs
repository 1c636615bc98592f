//! Error types for BamScope
//!
//! Defines all error types used throughout the library.

use std::path::PathBuf;
use thiserror::Error;

/// Main error type for BamScope operations
#[derive(Debug, Error)]
pub enum BamScopeError {
    /// Region construction and parsing errors
    #[error("Region error: {0}")]
    Region(#[from] RegionError),

    /// Index creation and lookup errors
    #[error("Index error: {0}")]
    Index(#[from] IndexError),

    /// Query and iteration errors
    #[error("Query error: {0}")]
    Query(#[from] QueryError),

    /// Coverage computation errors
    #[error("Coverage error: {0}")]
    Coverage(#[from] CoverageError),

    /// Errors surfaced by htslib
    #[error("HTSlib error: {0}")]
    Htslib(#[from] rust_htslib::errors::Error),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors that can occur while constructing or parsing a genomic region
#[derive(Debug, Error)]
pub enum RegionError {
    /// Interval bounds are inverted or zero
    #[error("Invalid interval {chromosome}:{start}-{end}: start must be >= 1 and <= end")]
    InvalidInterval {
        chromosome: String,
        start: u64,
        end: u64,
    },

    /// Region string does not match `chr:start-end`
    #[error("Invalid region format '{0}': expected chr:start-end")]
    InvalidFormat(String),
}

/// Errors that can occur while creating or checking a random-access index
#[derive(Debug, Error)]
pub enum IndexError {
    /// Region query attempted without an index artifact
    #[error("Missing index file for {path}: run `bamscope index` first")]
    MissingIndex { path: PathBuf },

    /// Input is not coordinate-sorted
    #[error("Sorted file expected: {path} is not sorted by coordinate (SO:{sort_order})")]
    UnsortedInput { path: PathBuf, sort_order: String },

    /// File format has no random-access index form
    #[error("File format of {path} cannot be indexed: expected .bam or .cram")]
    UnsupportedFormatForIndexing { path: PathBuf },

    /// Index construction failed inside htslib
    #[error("Index build failed: {0}")]
    Build(rust_htslib::errors::Error),

    /// I/O error while checking or writing the index
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors that can occur while querying or iterating alignments
#[derive(Debug, Error)]
pub enum QueryError {
    /// Output kind selector does not name a known representation
    #[error("Unknown output kind '{0}': expected native, structured or json")]
    UnsupportedOutputKind(String),

    /// Chromosome missing from the file header
    #[error("Chromosome not found in header: {0}")]
    ChromosomeNotFound(String),

    /// Input alignment file does not exist
    #[error("Alignment file not found: {0}")]
    FileNotFound(PathBuf),

    /// htslib failed to open or seek the file
    #[error("HTSlib error: {0}")]
    Htslib(#[from] rust_htslib::errors::Error),
}

/// Errors that can occur during coverage computation
#[derive(Debug, Error)]
pub enum CoverageError {
    /// No precomputed track and the window size cannot be computed directly
    #[error("No coverage source for window size {window_size}: \
             no BigWig track found and only window size 1 can be computed from the alignments")]
    NoCoverageSource { window_size: u32 },

    /// Window size must be at least 1
    #[error("Invalid window size: {0}")]
    InvalidWindowSize(u32),

    /// BigWig track could not be read
    #[error("BigWig error: {0}")]
    BigWig(String),

    /// External coverage-track generator failed
    #[error("Coverage track generation failed ({tool}): {message}")]
    TrackGeneration { tool: String, message: String },
}

/// Result type alias for BamScope operations
pub type Result<T> = std::result::Result<T, BamScopeError>;

/// Result type alias for index operations
pub type IndexResult<T> = std::result::Result<T, IndexError>;

/// Result type alias for query operations
pub type QueryResult<T> = std::result::Result<T, QueryError>;

/// Result type alias for coverage operations
pub type CoverageResult<T> = std::result::Result<T, CoverageError>;
