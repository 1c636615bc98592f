//! Global statistics property tests
//!
//! The two-stage accumulator must produce the same totals regardless of
//! the order increments are merged in.

use bamscope::{AlignmentGlobalStats, GlobalStatsCalculator};
use proptest::prelude::*;
use rust_htslib::bam::record::{Cigar, CigarString};
use rust_htslib::bam::Record;

const FLAG_PAIRED: u16 = 0x1;
const FLAG_PROPER_PAIR: u16 = 0x2;
const FLAG_UNMAPPED: u16 = 0x4;
const FLAG_DUPLICATE: u16 = 0x400;

/// Minimal description of a synthetic record
#[derive(Debug, Clone)]
struct RecordCase {
    mapq: u8,
    len: usize,
    flags: u16,
    insert_size: i64,
}

fn arb_record_case() -> impl Strategy<Value = RecordCase> {
    (
        0u8..=60,
        20usize..200,
        prop_oneof![
            Just(0u16),
            Just(FLAG_UNMAPPED),
            Just(FLAG_DUPLICATE),
            Just(FLAG_PAIRED | FLAG_PROPER_PAIR),
        ],
        0i64..1000,
    )
        .prop_map(|(mapq, len, flags, insert_size)| RecordCase {
            mapq,
            len,
            flags,
            insert_size,
        })
}

fn build_record(case: &RecordCase) -> Record {
    let mut record = Record::new();
    let cigar = CigarString(vec![Cigar::Match(case.len as u32)]);
    record.set(b"read", Some(&cigar), &vec![b'A'; case.len], &vec![30; case.len]);
    record.set_tid(0);
    record.set_pos(1000);
    record.set_mapq(case.mapq);
    record.set_flags(case.flags);
    record.set_insert_size(case.insert_size);
    record
}

fn accumulate(increments: &[AlignmentGlobalStats]) -> AlignmentGlobalStats {
    let mut total = AlignmentGlobalStats::new();
    for increment in increments {
        GlobalStatsCalculator::update(increment, &mut total);
    }
    total
}

fn assert_equivalent(a: &AlignmentGlobalStats, b: &AlignmentGlobalStats) {
    assert_eq!(a.num_total, b.num_total);
    assert_eq!(a.num_mapped, b.num_mapped);
    assert_eq!(a.num_unmapped, b.num_unmapped);
    assert_eq!(a.num_duplicates, b.num_duplicates);
    assert_eq!(a.num_properly_paired, b.num_properly_paired);
    assert_eq!(a.mapping_quality.count(), b.mapping_quality.count());
    assert!((a.mapping_quality.mean() - b.mapping_quality.mean()).abs() < 1e-9);
    assert!((a.mapping_quality.variance() - b.mapping_quality.variance()).abs() < 1e-6);
    assert_eq!(a.read_length.count(), b.read_length.count());
    assert!((a.read_length.mean() - b.read_length.mean()).abs() < 1e-9);
    assert_eq!(a.insert_size.count(), b.insert_size.count());
    assert!((a.insert_size.mean() - b.insert_size.mean()).abs() < 1e-9);
}

proptest! {
    /// Property: merge order does not change the accumulated result
    #[test]
    fn prop_merge_permutation_invariance(
        cases in prop::collection::vec(arb_record_case(), 1..50),
        permutation in prop::collection::vec(any::<prop::sample::Index>(), 1..50),
    ) {
        let mut increments: Vec<AlignmentGlobalStats> = cases
            .iter()
            .map(|case| GlobalStatsCalculator::compute(&build_record(case)))
            .collect();

        let forward = accumulate(&increments);

        // Fisher-Yates shuffle driven by the generated indices
        for (i, index) in permutation.iter().enumerate().take(increments.len()) {
            let j = index.index(increments.len() - i) + i;
            let len = increments.len();
            increments.swap(i, j % len);
        }
        let shuffled = accumulate(&increments);

        assert_equivalent(&forward, &shuffled);
    }

    /// Property: merging is associative: pairwise tree merge equals
    /// left-to-right linear merge
    #[test]
    fn prop_merge_associativity(cases in prop::collection::vec(arb_record_case(), 2..40)) {
        let increments: Vec<AlignmentGlobalStats> = cases
            .iter()
            .map(|case| GlobalStatsCalculator::compute(&build_record(case)))
            .collect();

        let linear = accumulate(&increments);

        let mut level: Vec<AlignmentGlobalStats> = increments;
        while level.len() > 1 {
            let mut next = Vec::with_capacity(level.len().div_ceil(2));
            for pair in level.chunks(2) {
                let mut merged = pair[0].clone();
                if let Some(right) = pair.get(1) {
                    merged.merge(right);
                }
                next.push(merged);
            }
            level = next;
        }

        assert_equivalent(&linear, &level[0]);
    }

    /// Property: counts are additive over the record multiset
    #[test]
    fn prop_counts_add_up(cases in prop::collection::vec(arb_record_case(), 1..60)) {
        let total = accumulate(
            &cases
                .iter()
                .map(|case| GlobalStatsCalculator::compute(&build_record(case)))
                .collect::<Vec<_>>(),
        );

        let unmapped = cases.iter().filter(|s| s.flags & FLAG_UNMAPPED != 0).count() as u64;
        prop_assert_eq!(total.num_total, cases.len() as u64);
        prop_assert_eq!(total.num_unmapped, unmapped);
        prop_assert_eq!(total.num_mapped, cases.len() as u64 - unmapped);
        prop_assert_eq!(total.read_length.count(), cases.len() as u64);
        prop_assert_eq!(total.mapping_quality.count(), total.num_mapped);
    }
}

#[test]
fn test_reverse_order_matches_forward_order() {
    let cases: Vec<RecordCase> = (0..20)
        .map(|i| RecordCase {
            mapq: (i * 3 % 61) as u8,
            len: 50 + i,
            flags: if i % 5 == 0 { FLAG_UNMAPPED } else { 0 },
            insert_size: 0,
        })
        .collect();

    let increments: Vec<AlignmentGlobalStats> = cases
        .iter()
        .map(|case| GlobalStatsCalculator::compute(&build_record(case)))
        .collect();

    let forward = accumulate(&increments);
    let reversed: Vec<AlignmentGlobalStats> = increments.into_iter().rev().collect();
    let backward = accumulate(&reversed);

    assert_equivalent(&forward, &backward);
}
