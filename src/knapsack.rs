//! 0/1 knapsack by dynamic programming, with optional cell-count scaling.

use std::collections::HashSet;

/// Solves the 0/1 knapsack problem, returning the indices of the chosen items.
///
/// `max_cells` bounds the size of the DP table; when the unscaled table would
/// exceed it, weights are scaled up (ceiling) and capacity scaled down
/// (floor) so the table stays within budget. Scaling can only make fewer
/// items fit, never more, so the unscaled capacity constraint still holds.
pub fn solve(weights: &[u64], values: &[u64], capacity: i64, max_cells: Option<u64>) -> HashSet<usize> {
    if capacity <= 0 {
        return HashSet::new();
    }
    let capacity = capacity as u64;
    let n = weights.len();
    let total_weight: u64 = weights.iter().sum();
    if capacity >= total_weight {
        return (0..n).collect();
    }

    let mut weights = weights.to_vec();
    let mut capacity = capacity;
    if let Some(max_cells) = max_cells {
        let max_cells = max_cells.max(2 * (n as u64 + 1));
        let denom = (max_cells - n as u64 - 1).max(1) as f64;
        let scale = (capacity as f64 * (n as f64 + 1.0)) / denom;
        if scale > 1.0 {
            weights = weights.iter().map(|&w| ceil_div(w, scale)).collect();
            capacity = (capacity as f64 / scale).floor() as u64;
        }
    }

    // dp[i][w] = best value achievable using the first i items with capacity w
    let mut dp: Vec<Vec<u64>> = vec![vec![0u64; (capacity + 1) as usize]];
    for i in 1..=n {
        let wt = weights[i - 1];
        let vl = values[i - 1];
        let prev = &dp[i - 1];
        let mut cur = prev.clone();
        if wt <= capacity {
            for w in wt..=capacity {
                let cand = prev[(w - wt) as usize] + vl;
                if cand > cur[w as usize] {
                    cur[w as usize] = cand;
                }
            }
        }
        dp.push(cur);
    }

    let mut chosen = HashSet::new();
    let mut w = capacity;
    for i in (1..=n).rev() {
        if dp[i][w as usize] != dp[i - 1][w as usize] {
            chosen.insert(i - 1);
            w -= weights[i - 1];
        }
    }
    chosen
}

fn ceil_div(w: u64, scale: f64) -> u64 {
    let v = w as f64 / scale;
    let i = v as u64;
    if (i as f64) < v {
        i + 1
    } else {
        i
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_capacity_returns_nothing() {
        assert!(solve(&[1, 2, 3], &[1, 2, 3], 0, None).is_empty());
    }

    #[test]
    fn capacity_covers_everything() {
        let got = solve(&[1, 2, 3], &[1, 2, 3], 10, None);
        assert_eq!(got, (0..3).collect());
    }

    #[test]
    fn picks_best_value_subset() {
        // classic example: weights [1,3,4,5], values [1,4,5,7], cap 7 -> value 9 (items 1,2)
        let got = solve(&[1, 3, 4, 5], &[1, 4, 5, 7], 7, None);
        let total_w: u64 = got.iter().map(|&i| [1u64, 3, 4, 5][i]).sum();
        let total_v: u64 = got.iter().map(|&i| [1u64, 4, 5, 7][i]).sum();
        assert!(total_w <= 7);
        assert_eq!(total_v, 9);
    }

    #[test]
    fn scaling_never_exceeds_unscaled_capacity() {
        let weights: Vec<u64> = (1..=200u64).collect();
        let values: Vec<u64> = (1..=200u64).collect();
        let got = solve(&weights, &values, 5000, Some(64));
        let total_w: u64 = got.iter().map(|&i| weights[i]).sum();
        assert!(total_w <= 5000);
    }
}
