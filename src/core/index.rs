//! Random-access index management
//!
//! Region queries require a BAI (BAM) or CRAI (CRAM) index artifact next to
//! the alignment file. This module owns the sibling-path conventions, the
//! coordinate-sort precondition and index construction via htslib.

use crate::core::error::{IndexError, IndexResult};
use rust_htslib::bam::{self, Read};
use std::path::{Path, PathBuf};

/// Physical formats that have a random-access index form
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum IndexableFormat {
    Bam,
    Cram,
}

impl IndexableFormat {
    fn detect(path: &Path) -> Option<Self> {
        match path.extension().and_then(|ext| ext.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("bam") => Some(IndexableFormat::Bam),
            Some(ext) if ext.eq_ignore_ascii_case("cram") => Some(IndexableFormat::Cram),
            _ => None,
        }
    }

    fn index_extension(self) -> &'static str {
        match self {
            IndexableFormat::Bam => "bai",
            IndexableFormat::Cram => "crai",
        }
    }
}

fn append_extension(path: &Path, ext: &str) -> PathBuf {
    let mut name = path.as_os_str().to_os_string();
    name.push(".");
    name.push(ext);
    PathBuf::from(name)
}

/// Conventional sibling path of the index artifact (`<input>.bai` / `<input>.crai`)
pub fn index_path(alignment_path: &Path) -> PathBuf {
    let ext = IndexableFormat::detect(alignment_path)
        .map(IndexableFormat::index_extension)
        .unwrap_or("bai");
    append_extension(alignment_path, ext)
}

/// Pure existence check on the conventional sibling paths.
///
/// Accepts both naming conventions htslib itself probes:
/// `<input>.bam.bai` and `<input>.bai`.
pub fn index_exists(alignment_path: &Path) -> bool {
    if index_path(alignment_path).exists() {
        return true;
    }
    let ext = IndexableFormat::detect(alignment_path)
        .map(IndexableFormat::index_extension)
        .unwrap_or("bai");
    alignment_path.with_extension(ext).exists()
}

/// Fail with `MissingIndex` when no index artifact is present
pub fn ensure_index(alignment_path: &Path) -> IndexResult<()> {
    if index_exists(alignment_path) {
        Ok(())
    } else {
        Err(IndexError::MissingIndex {
            path: alignment_path.to_path_buf(),
        })
    }
}

/// Create the index at the conventional sibling path
pub fn create_index(alignment_path: &Path) -> IndexResult<PathBuf> {
    let output = index_path(alignment_path);
    create_index_at(alignment_path, &output)
}

/// Create the index at an explicit path, overwriting any previous artifact.
///
/// The input must declare `SO:coordinate` in its header; a header without a
/// sort order is treated as unsorted, matching the SAM specification default.
pub fn create_index_at(alignment_path: &Path, output: &Path) -> IndexResult<PathBuf> {
    if IndexableFormat::detect(alignment_path).is_none() {
        return Err(IndexError::UnsupportedFormatForIndexing {
            path: alignment_path.to_path_buf(),
        });
    }

    let reader = bam::Reader::from_path(alignment_path).map_err(IndexError::Build)?;
    let sort_order = header_sort_order(reader.header());
    if sort_order != "coordinate" {
        return Err(IndexError::UnsortedInput {
            path: alignment_path.to_path_buf(),
            sort_order,
        });
    }
    drop(reader);

    // htslib derives the actual index flavor (BAI/CRAI) from the input format
    bam::index::build(alignment_path, Some(output), bam::index::Type::Bai, 1)
        .map_err(IndexError::Build)?;

    log::info!(
        "created index {} for {}",
        output.display(),
        alignment_path.display()
    );
    Ok(output.to_path_buf())
}

/// Extract the `@HD SO:` value from the header text
fn header_sort_order(header: &bam::HeaderView) -> String {
    let text = String::from_utf8_lossy(header.as_bytes());
    for line in text.lines() {
        if let Some(rest) = line.strip_prefix("@HD") {
            for field in rest.split('\t') {
                if let Some(sort_order) = field.strip_prefix("SO:") {
                    return sort_order.to_string();
                }
            }
        }
    }
    "unsorted".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_index_path_bam() {
        assert_eq!(
            index_path(Path::new("/data/sample.bam")),
            PathBuf::from("/data/sample.bam.bai")
        );
    }

    #[test]
    fn test_index_path_cram() {
        assert_eq!(
            index_path(Path::new("/data/sample.cram")),
            PathBuf::from("/data/sample.cram.crai")
        );
    }

    #[test]
    fn test_unsupported_format_rejected_before_open() {
        // No such file on disk: the format gate must fire first
        let result = create_index_at(Path::new("/no/such/file.sam"), Path::new("/no/such/out.bai"));
        assert!(matches!(
            result,
            Err(IndexError::UnsupportedFormatForIndexing { .. })
        ));
    }

    #[test]
    fn test_index_exists_missing() {
        let dir = tempfile::tempdir().unwrap();
        let bam = dir.path().join("reads.bam");
        std::fs::write(&bam, b"").unwrap();
        assert!(!index_exists(&bam));
        assert!(ensure_index(&bam).is_err());
    }

    #[test]
    fn test_index_exists_appended_convention() {
        let dir = tempfile::tempdir().unwrap();
        let bam = dir.path().join("reads.bam");
        std::fs::write(&bam, b"").unwrap();
        std::fs::write(dir.path().join("reads.bam.bai"), b"").unwrap();
        assert!(index_exists(&bam));
        assert!(ensure_index(&bam).is_ok());
    }

    #[test]
    fn test_index_exists_replaced_extension_convention() {
        let dir = tempfile::tempdir().unwrap();
        let bam = dir.path().join("reads.bam");
        std::fs::write(&bam, b"").unwrap();
        std::fs::write(dir.path().join("reads.bai"), b"").unwrap();
        assert!(index_exists(&bam));
    }
}
