/// Ratio given to entries with no share at all, so they receive leftover points last.
const ZERO_SHARE_RATIO: f64 = 9000.;

/// Converts totals into integer percentages that sum to exactly 100 using the largest remainder
/// method.
///
/// Every total is floored to a whole percentage first. The missing points are then handed out
/// one at a time to the entry whose value would be least inflated by it, i.e. the one with the
/// smallest `(floor + 1) / exact`. Equal ratios go to the lowest index.
///
/// Returns [None] when the totals sum to zero, since there is nothing to divide.
pub fn normalize_percentages(totals: &[u64]) -> Option<Vec<u32>> {
    let sum: u128 = totals.iter().map(|&v| u128::from(v)).sum();
    if sum == 0 {
        return None;
    }

    let exact: Vec<f64> = totals
        .iter()
        .map(|&v| 100. * v as f64 / sum as f64)
        .collect();

    // Floors are computed on integers so they never overshoot because of float error.
    let mut floored: Vec<u32> = totals
        .iter()
        .map(|&v| (100 * u128::from(v) / sum) as u32)
        .collect();

    let mut floored_sum: u32 = floored.iter().sum();
    while floored_sum < 100 {
        let mut best = 0;
        let mut best_ratio = f64::INFINITY;
        for (index, (&floor, &exact)) in floored.iter().zip(&exact).enumerate() {
            let ratio = if exact > 0. {
                (floor as f64 + 1.) / exact
            } else {
                ZERO_SHARE_RATIO
            };
            if ratio < best_ratio {
                best = index;
                best_ratio = ratio;
            }
        }
        floored[best] += 1;
        floored_sum += 1;
    }

    Some(floored)
}
