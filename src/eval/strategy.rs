use super::filter::FilterPolicy;

pub const DEFAULT_LIMITS: [usize; 3] = [3, 4, 5];
pub const DEFAULT_THRESHOLDS: [f64; 3] = [0.3, 0.5, 0.7];

// Order is significant: sweep ties resolve by enumeration order.
pub fn strategies(limits: &[usize], thresholds: &[f64]) -> Vec<FilterPolicy> {
    let mut out = Vec::with_capacity(limits.len() * thresholds.len());
    for &limit in limits {
        for &threshold in thresholds {
            out.push(FilterPolicy::new(Some(limit), Some(threshold)));
        }
    }
    out
}

pub fn default_strategies() -> Vec<FilterPolicy> {
    strategies(&DEFAULT_LIMITS, &DEFAULT_THRESHOLDS)
}

#[cfg(test)]
mod tests {
    use super::{default_strategies, strategies};

    #[test]
    fn default_grid_enumerates_limits_outer_thresholds_inner() {
        let pairs = default_strategies()
            .into_iter()
            .map(|policy| (policy.limit.unwrap(), policy.threshold.unwrap()))
            .collect::<Vec<(usize, f64)>>();

        assert_eq!(
            pairs,
            vec![
                (3, 0.3),
                (3, 0.5),
                (3, 0.7),
                (4, 0.3),
                (4, 0.5),
                (4, 0.7),
                (5, 0.3),
                (5, 0.5),
                (5, 0.7),
            ]
        );
    }

    #[test]
    fn empty_axis_yields_no_strategies() {
        assert!(strategies(&[], &[0.3]).is_empty());
        assert!(strategies(&[3], &[]).is_empty());
    }
}
