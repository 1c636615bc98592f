//! Lazy alignment iteration and output encoding
//!
//! A `BamIterator` is a forward-only, non-restartable pull over the records
//! of a scan or a region fetch. Filtering, the record limit and the output
//! representation are all fixed at construction time; the output kind is a
//! closed set, so every encoding arm is known statically.

use crate::core::error::{QueryError, QueryResult};
use crate::core::filters::AlignmentFilters;
use crate::core::options::AlignmentOptions;
use rust_htslib::bam::{self, Read, Record};
use serde::Serialize;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

/// htslib does not always advance past a corrupt BGZF block; a bounded run
/// of consecutive read failures ends the scan instead of livelocking.
const MAX_CONSECUTIVE_MALFORMED: u32 = 100;

/// The closed set of record representations an iterator may emit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputKind {
    /// The native htslib record, untouched
    #[default]
    Native,
    /// Schema-structured `ReadAlignment` model
    Structured,
    /// `ReadAlignment` serialized to a JSON wire string
    Json,
}

impl FromStr for OutputKind {
    type Err = QueryError;

    fn from_str(s: &str) -> QueryResult<Self> {
        match s.to_ascii_lowercase().as_str() {
            "native" => Ok(OutputKind::Native),
            "structured" => Ok(OutputKind::Structured),
            "json" => Ok(OutputKind::Json),
            _ => Err(QueryError::UnsupportedOutputKind(s.to_string())),
        }
    }
}

impl fmt::Display for OutputKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OutputKind::Native => write!(f, "native"),
            OutputKind::Structured => write!(f, "structured"),
            OutputKind::Json => write!(f, "json"),
        }
    }
}

/// One emitted record, in the representation selected at construction
#[derive(Debug)]
pub enum AlignmentValue {
    Native(Record),
    Structured(ReadAlignment),
    Json(String),
}

impl AlignmentValue {
    pub fn kind(&self) -> OutputKind {
        match self {
            AlignmentValue::Native(_) => OutputKind::Native,
            AlignmentValue::Structured(_) => OutputKind::Structured,
            AlignmentValue::Json(_) => OutputKind::Json,
        }
    }

    pub fn as_native(&self) -> Option<&Record> {
        match self {
            AlignmentValue::Native(record) => Some(record),
            _ => None,
        }
    }

    pub fn into_native(self) -> Option<Record> {
        match self {
            AlignmentValue::Native(record) => Some(record),
            _ => None,
        }
    }
}

/// Mapped strand of a linear alignment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Strand {
    Forward,
    Reverse,
}

/// CIGAR operation vocabulary of the structured model
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CigarOperation {
    AlignmentMatch,
    Insert,
    Delete,
    Skip,
    ClipSoft,
    ClipHard,
    Pad,
    SequenceMatch,
    SequenceMismatch,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CigarUnit {
    pub operation: CigarOperation,
    pub operation_length: u32,
}

/// 1-based mapped position on a reference sequence
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MappedPosition {
    pub reference_name: String,
    pub position: u64,
    pub strand: Strand,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LinearAlignment {
    pub position: MappedPosition,
    pub mapping_quality: u8,
    pub cigar: Vec<CigarUnit>,
}

/// Schema-structured alignment record
///
/// A serialization-oriented view of one record: flags are decomposed into
/// named booleans and the linear alignment is absent for unmapped reads.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReadAlignment {
    pub fragment_name: String,
    pub proper_placement: bool,
    pub duplicate_fragment: bool,
    pub failed_vendor_quality_checks: bool,
    pub secondary_alignment: bool,
    pub supplementary_alignment: bool,
    /// 2 for paired templates, otherwise 1
    pub number_reads: u32,
    /// 0 for the first read of a template, 1 for the last
    pub read_number: Option<u32>,
    pub fragment_length: i64,
    pub alignment: Option<LinearAlignment>,
    pub aligned_sequence: String,
    pub aligned_quality: Vec<u8>,
}

impl ReadAlignment {
    pub fn from_record(record: &Record, reference_names: &[String], bin_qualities: bool) -> Self {
        let alignment = if record.is_unmapped() {
            None
        } else {
            let reference_name = reference_names
                .get(record.tid() as usize)
                .cloned()
                .unwrap_or_else(|| "*".to_string());
            Some(LinearAlignment {
                position: MappedPosition {
                    reference_name,
                    position: record.pos() as u64 + 1,
                    strand: if record.is_reverse() {
                        Strand::Reverse
                    } else {
                        Strand::Forward
                    },
                },
                mapping_quality: record.mapq(),
                cigar: record
                    .cigar()
                    .iter()
                    .map(|op| CigarUnit {
                        operation: cigar_operation(op),
                        operation_length: op.len(),
                    })
                    .collect(),
            })
        };

        let read_number = if !record.is_paired() {
            None
        } else if record.is_first_in_template() {
            Some(0)
        } else {
            Some(1)
        };

        let mut aligned_quality = record.qual().to_vec();
        if bin_qualities {
            for quality in aligned_quality.iter_mut() {
                *quality = bin_quality(*quality);
            }
        }

        Self {
            fragment_name: String::from_utf8_lossy(record.qname()).into_owned(),
            proper_placement: record.is_proper_pair(),
            duplicate_fragment: record.is_duplicate(),
            failed_vendor_quality_checks: record.is_quality_check_failed(),
            secondary_alignment: record.is_secondary(),
            supplementary_alignment: record.is_supplementary(),
            number_reads: if record.is_paired() { 2 } else { 1 },
            read_number,
            fragment_length: record.insert_size(),
            alignment,
            aligned_sequence: String::from_utf8_lossy(&record.seq().as_bytes()).into_owned(),
            aligned_quality,
        }
    }
}

fn cigar_operation(op: &bam::record::Cigar) -> CigarOperation {
    use bam::record::Cigar;
    match op {
        Cigar::Match(_) => CigarOperation::AlignmentMatch,
        Cigar::Ins(_) => CigarOperation::Insert,
        Cigar::Del(_) => CigarOperation::Delete,
        Cigar::RefSkip(_) => CigarOperation::Skip,
        Cigar::SoftClip(_) => CigarOperation::ClipSoft,
        Cigar::HardClip(_) => CigarOperation::ClipHard,
        Cigar::Pad(_) => CigarOperation::Pad,
        Cigar::Equal(_) => CigarOperation::SequenceMatch,
        Cigar::Diff(_) => CigarOperation::SequenceMismatch,
    }
}

/// Quantize a base quality to the Illumina 8-level binning scheme
pub fn bin_quality(quality: u8) -> u8 {
    match quality {
        0..=1 => quality,
        2..=9 => 6,
        10..=19 => 15,
        20..=24 => 22,
        25..=29 => 27,
        30..=34 => 33,
        35..=39 => 37,
        _ => 40,
    }
}

/// Notice describing one recoverable malformed record
#[derive(Debug, Clone)]
pub struct MalformedRecord {
    /// 1-based ordinal of the record in the scan
    pub ordinal: u64,
    pub message: String,
}

/// Receives malformed-record notices during a scan
pub trait MalformedRecordHandler: Send + Sync {
    fn on_malformed(&self, notice: &MalformedRecord);
}

/// Default handler: logs and moves on
pub struct LogMalformedHandler;

impl MalformedRecordHandler for LogMalformedHandler {
    fn on_malformed(&self, notice: &MalformedRecord) {
        log::warn!(
            "skipping malformed record #{}: {}",
            notice.ordinal,
            notice.message
        );
    }
}

/// Immutable set of malformed-record handlers
#[derive(Clone, Default)]
pub struct MalformedHandlers {
    handlers: Vec<Arc<dyn MalformedRecordHandler>>,
}

impl MalformedHandlers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, handler: Arc<dyn MalformedRecordHandler>) -> Self {
        self.handlers.push(handler);
        self
    }

    pub fn notify(&self, notice: &MalformedRecord) {
        for handler in &self.handlers {
            handler.on_malformed(notice);
        }
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }
}

impl fmt::Debug for MalformedHandlers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MalformedHandlers")
            .field("len", &self.handlers.len())
            .finish()
    }
}

/// The raw record pull backing an iterator
pub(crate) enum RecordSource<'a> {
    Indexed(&'a mut bam::IndexedReader),
    Sequential(&'a mut bam::Reader),
}

impl RecordSource<'_> {
    fn read_into(
        &mut self,
        record: &mut Record,
    ) -> Option<std::result::Result<(), rust_htslib::errors::Error>> {
        match self {
            RecordSource::Indexed(reader) => reader.read(record),
            RecordSource::Sequential(reader) => reader.read(record),
        }
    }
}

/// Containment bound for `contained_only` region queries (0-based half-open)
#[derive(Debug, Clone, Copy)]
pub(crate) struct ContainmentBound {
    pub start: i64,
    pub end: i64,
}

impl ContainmentBound {
    fn contains(&self, record: &Record) -> bool {
        record.pos() >= self.start && record.cigar().end_pos() <= self.end
    }
}

/// Resolved encoding arm: applied to every accepted record
#[derive(Debug, Clone)]
struct RecordEncoder {
    kind: OutputKind,
    bin_qualities: bool,
    reference_names: Arc<[String]>,
}

impl RecordEncoder {
    fn encode(&self, record: Record) -> std::result::Result<AlignmentValue, String> {
        match self.kind {
            OutputKind::Native => Ok(AlignmentValue::Native(record)),
            OutputKind::Structured => Ok(AlignmentValue::Structured(ReadAlignment::from_record(
                &record,
                &self.reference_names,
                self.bin_qualities,
            ))),
            OutputKind::Json => {
                let structured =
                    ReadAlignment::from_record(&record, &self.reference_names, self.bin_qualities);
                serde_json::to_string(&structured).map(AlignmentValue::Json).map_err(|e| {
                    format!("cannot serialize record {}: {}", structured.fragment_name, e)
                })
            }
        }
    }
}

/// Lazy, filtered, bounded, format-converting record sequence.
///
/// `next()` blocks on file I/O as needed; there are no background
/// producers. Dropping the iterator releases its borrow of the manager's
/// handle; `close()` only marks it finished and is safe to call repeatedly.
pub struct BamIterator<'a> {
    source: RecordSource<'a>,
    filters: AlignmentFilters,
    encoder: RecordEncoder,
    containment: Option<ContainmentBound>,
    remaining: Option<usize>,
    handlers: MalformedHandlers,
    ordinal: u64,
    consecutive_failures: u32,
    finished: bool,
}

impl<'a> BamIterator<'a> {
    pub(crate) fn new(
        source: RecordSource<'a>,
        filters: &AlignmentFilters,
        options: &AlignmentOptions,
        kind: OutputKind,
        reference_names: Arc<[String]>,
        containment: Option<ContainmentBound>,
        handlers: MalformedHandlers,
    ) -> Self {
        Self {
            source,
            filters: filters.clone(),
            encoder: RecordEncoder {
                kind,
                bin_qualities: options.bin_qualities,
                reference_names,
            },
            containment,
            remaining: options.limit.filter(|limit| *limit > 0),
            handlers,
            ordinal: 0,
            consecutive_failures: 0,
            finished: false,
        }
    }

    /// The output kind this iterator was constructed with
    pub fn output_kind(&self) -> OutputKind {
        self.encoder.kind
    }

    /// Number of raw records pulled from the source so far
    pub fn records_seen(&self) -> u64 {
        self.ordinal
    }

    /// Mark the iterator finished; repeated calls are a no-op
    pub fn close(&mut self) {
        self.finished = true;
    }

    pub fn is_closed(&self) -> bool {
        self.finished
    }

    fn report_malformed(&mut self, message: String) {
        let notice = MalformedRecord {
            ordinal: self.ordinal,
            message,
        };
        log::warn!(
            "malformed record #{} skipped: {}",
            notice.ordinal,
            notice.message
        );
        self.handlers.notify(&notice);
    }
}

impl Iterator for BamIterator<'_> {
    type Item = AlignmentValue;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }
        if self.remaining == Some(0) {
            self.finished = true;
            return None;
        }

        loop {
            let mut record = Record::new();
            match self.source.read_into(&mut record) {
                None => {
                    self.finished = true;
                    return None;
                }
                Some(Err(error)) => {
                    self.ordinal += 1;
                    self.consecutive_failures += 1;
                    self.report_malformed(error.to_string());
                    if self.consecutive_failures >= MAX_CONSECUTIVE_MALFORMED {
                        log::error!(
                            "{} consecutive unreadable records, ending scan",
                            self.consecutive_failures
                        );
                        self.finished = true;
                        return None;
                    }
                }
                Some(Ok(())) => {
                    self.ordinal += 1;
                    self.consecutive_failures = 0;

                    if let Some(bound) = self.containment {
                        if !bound.contains(&record) {
                            continue;
                        }
                    }
                    if !self.filters.accept(&record) {
                        continue;
                    }

                    match self.encoder.encode(record) {
                        Ok(value) => {
                            if let Some(remaining) = self.remaining.as_mut() {
                                *remaining -= 1;
                            }
                            return Some(value);
                        }
                        Err(message) => self.report_malformed(message),
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_htslib::bam::record::{Cigar, CigarString};
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn sample_record() -> Record {
        let mut record = Record::new();
        let cigar = CigarString(vec![Cigar::SoftClip(2), Cigar::Match(4)]);
        record.set(b"frag/1", Some(&cigar), b"ACGTAC", &[38, 12, 25, 33, 2, 40]);
        record.set_tid(0);
        record.set_pos(99);
        record.set_mapq(55);
        record.set_flags(0x1 | 0x2 | 0x40); // paired, proper, first
        record.set_insert_size(250);
        record
    }

    #[test]
    fn test_output_kind_parsing() {
        assert_eq!("native".parse::<OutputKind>().unwrap(), OutputKind::Native);
        assert_eq!("JSON".parse::<OutputKind>().unwrap(), OutputKind::Json);
        assert_eq!(
            "Structured".parse::<OutputKind>().unwrap(),
            OutputKind::Structured
        );
    }

    #[test]
    fn test_unknown_output_kind_fails_fast() {
        let error = "parquet".parse::<OutputKind>().unwrap_err();
        assert!(matches!(error, QueryError::UnsupportedOutputKind(ref s) if s == "parquet"));
    }

    #[test]
    fn test_read_alignment_from_record() {
        let names = vec!["chr1".to_string()];
        let read = ReadAlignment::from_record(&sample_record(), &names, false);

        assert_eq!(read.fragment_name, "frag/1");
        assert!(read.proper_placement);
        assert_eq!(read.number_reads, 2);
        assert_eq!(read.read_number, Some(0));
        assert_eq!(read.fragment_length, 250);
        assert_eq!(read.aligned_sequence, "ACGTAC");
        assert_eq!(read.aligned_quality, vec![38, 12, 25, 33, 2, 40]);

        let alignment = read.alignment.expect("mapped record");
        assert_eq!(alignment.position.reference_name, "chr1");
        assert_eq!(alignment.position.position, 100);
        assert_eq!(alignment.position.strand, Strand::Forward);
        assert_eq!(alignment.mapping_quality, 55);
        assert_eq!(
            alignment.cigar,
            vec![
                CigarUnit {
                    operation: CigarOperation::ClipSoft,
                    operation_length: 2
                },
                CigarUnit {
                    operation: CigarOperation::AlignmentMatch,
                    operation_length: 4
                },
            ]
        );
    }

    #[test]
    fn test_read_alignment_unmapped_has_no_alignment() {
        let mut record = sample_record();
        record.set_flags(0x4);
        let read = ReadAlignment::from_record(&record, &["chr1".to_string()], false);
        assert!(read.alignment.is_none());
    }

    #[test]
    fn test_quality_binning_on_structured_output() {
        let names = vec!["chr1".to_string()];
        let read = ReadAlignment::from_record(&sample_record(), &names, true);
        assert_eq!(read.aligned_quality, vec![37, 15, 27, 33, 6, 40]);
    }

    #[test]
    fn test_bin_quality_levels() {
        assert_eq!(bin_quality(0), 0);
        assert_eq!(bin_quality(1), 1);
        assert_eq!(bin_quality(2), 6);
        assert_eq!(bin_quality(14), 15);
        assert_eq!(bin_quality(22), 22);
        assert_eq!(bin_quality(28), 27);
        assert_eq!(bin_quality(31), 33);
        assert_eq!(bin_quality(39), 37);
        assert_eq!(bin_quality(42), 40);
    }

    #[test]
    fn test_json_encoding_round_trip() {
        let names: Arc<[String]> = vec!["chr1".to_string()].into();
        let encoder = RecordEncoder {
            kind: OutputKind::Json,
            bin_qualities: false,
            reference_names: names,
        };
        let value = encoder.encode(sample_record()).unwrap();
        let json = match value {
            AlignmentValue::Json(json) => json,
            other => panic!("expected json, got {:?}", other.kind()),
        };
        let parsed: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed["fragment_name"], "frag/1");
        assert_eq!(parsed["alignment"]["position"]["position"], 100);
        assert_eq!(parsed["alignment"]["position"]["strand"], "FORWARD");
    }

    #[test]
    fn test_containment_bound() {
        let bound = ContainmentBound { start: 99, end: 200 };

        let mut inside = sample_record(); // 4M at pos 99
        inside.set_pos(99);
        assert!(bound.contains(&inside));

        let mut straddling = sample_record();
        straddling.set_pos(98);
        assert!(!bound.contains(&straddling));

        let mut past_end = sample_record();
        past_end.set_pos(198);
        assert!(!bound.contains(&past_end));
    }

    struct CountingHandler(AtomicUsize);

    impl MalformedRecordHandler for CountingHandler {
        fn on_malformed(&self, _notice: &MalformedRecord) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn test_handlers_notify_all() {
        let first = Arc::new(CountingHandler(AtomicUsize::new(0)));
        let second = Arc::new(CountingHandler(AtomicUsize::new(0)));
        let handlers = MalformedHandlers::new()
            .with(first.clone())
            .with(second.clone());

        handlers.notify(&MalformedRecord {
            ordinal: 7,
            message: "truncated".to_string(),
        });

        assert_eq!(first.0.load(Ordering::SeqCst), 1);
        assert_eq!(second.0.load(Ordering::SeqCst), 1);
    }
}
