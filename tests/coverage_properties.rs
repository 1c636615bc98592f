//! Coverage property tests
//!
//! Laws for the per-base pileup and windowed block-averaging.

use bamscope::{Region, RegionCoverage, WindowedCoverageAggregator};
use proptest::prelude::*;

/// Generate per-base depth vectors with plausible magnitudes
fn arb_per_base() -> impl Strategy<Value = Vec<f32>> {
    prop::collection::vec((0u32..500).prop_map(|d| d as f32), 1..400)
}

proptest! {
    /// Property: window count equals ceil(len / window_size)
    #[test]
    fn prop_window_count_law(len in 1u64..100_000, window in 1u32..1000) {
        let expected = (len + window as u64 - 1) / window as u64;
        prop_assert_eq!(
            WindowedCoverageAggregator::window_count(len, window) as u64,
            expected
        );
    }

    /// Property: aggregation with window size 1 is the identity
    #[test]
    fn prop_window_one_is_identity(per_base in arb_per_base()) {
        let windows = WindowedCoverageAggregator::aggregate(&per_base, 1).unwrap();
        prop_assert_eq!(windows, per_base);
    }

    /// Property: number of windows matches the window-count law
    #[test]
    fn prop_aggregate_length(per_base in arb_per_base(), window in 1u32..64) {
        let windows = WindowedCoverageAggregator::aggregate(&per_base, window).unwrap();
        prop_assert_eq!(
            windows.len(),
            WindowedCoverageAggregator::window_count(per_base.len() as u64, window)
        );
    }

    /// Property: every window value is the mean of its block of per-base
    /// depths (the final block may be shorter than the window)
    #[test]
    fn prop_window_values_are_block_means(per_base in arb_per_base(), window in 1u32..64) {
        let windows = WindowedCoverageAggregator::aggregate(&per_base, window).unwrap();
        for (i, block) in per_base.chunks(window as usize).enumerate() {
            let mean = block.iter().sum::<f32>() / block.len() as f32;
            prop_assert!((windows[i] - mean).abs() <= f32::EPSILON * block.len() as f32);
        }
    }

    /// Property: block averaging preserves total mass
    /// (sum of window mean * block length equals sum of per-base depths)
    #[test]
    fn prop_aggregate_preserves_mass(per_base in arb_per_base(), window in 1u32..64) {
        let windows = WindowedCoverageAggregator::aggregate(&per_base, window).unwrap();
        let total: f64 = per_base.iter().map(|v| *v as f64).sum();
        let windowed_total: f64 = per_base
            .chunks(window as usize)
            .zip(&windows)
            .map(|(block, mean)| *mean as f64 * block.len() as f64)
            .sum();
        prop_assert!((total - windowed_total).abs() < 1e-2 * (1.0 + total.abs()));
    }

    /// Property: rebinned coverage obeys the length laws for any region
    #[test]
    fn prop_rebin_length(start in 1u64..10_000, len in 1u64..500, window in 1u32..64) {
        let region = Region::new("chr1", start, start + len - 1).unwrap();
        let coverage = RegionCoverage::per_base(region);
        prop_assert_eq!(coverage.values().len() as u64, len);

        let rebinned = coverage.rebin(window).unwrap();
        prop_assert_eq!(
            rebinned.values().len(),
            WindowedCoverageAggregator::window_count(len, window)
        );
    }
}

#[test]
fn test_zero_window_is_rejected() {
    assert!(WindowedCoverageAggregator::aggregate(&[1.0, 2.0], 0).is_err());
}

#[test]
fn test_uneven_tail_window() {
    // 101 positions, window 10: ten full blocks and one single-position tail
    let region = Region::new("chr1", 100, 200).unwrap();
    let coverage = RegionCoverage::per_base(region);
    let rebinned = coverage.rebin(10).unwrap();
    assert_eq!(rebinned.values().len(), 11);
}
