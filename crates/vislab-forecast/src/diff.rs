//! Differencing and its inverse.

/// Apply `d` rounds of lag-1 differencing.
pub fn difference(series: &[f64], d: usize) -> Vec<f64> {
    let mut result = series.to_vec();
    for _ in 0..d {
        if result.len() <= 1 {
            return Vec::new();
        }
        result = result.windows(2).map(|w| w[1] - w[0]).collect();
    }
    result
}

/// Apply `d` rounds of lag-`period` differencing.
pub fn seasonal_difference(series: &[f64], d: usize, period: usize) -> Vec<f64> {
    if period == 0 {
        return series.to_vec();
    }
    let mut result = series.to_vec();
    for _ in 0..d {
        if result.len() <= period {
            return Vec::new();
        }
        result = result
            .iter()
            .skip(period)
            .zip(result.iter())
            .map(|(curr, prev)| curr - prev)
            .collect();
    }
    result
}

/// Undo `d` rounds of lag-1 differencing for values that continue
/// `original`.
///
/// `differenced` holds future values on the differenced scale; the result
/// holds the same future values on the scale of `original`.
pub fn integrate(differenced: &[f64], original: &[f64], d: usize) -> Vec<f64> {
    let mut result = differenced.to_vec();
    for level in (0..d).rev() {
        let anchor = difference(original, level).last().copied().unwrap_or(0.0);
        let mut cumsum = anchor;
        result = result
            .iter()
            .map(|diff| {
                cumsum += diff;
                cumsum
            })
            .collect();
    }
    result
}

/// Undo `d` rounds of lag-`period` differencing for values that continue
/// `original`.
pub fn integrate_seasonal(differenced: &[f64], original: &[f64], d: usize, period: usize) -> Vec<f64> {
    if period == 0 {
        return differenced.to_vec();
    }
    let mut result = differenced.to_vec();
    for level in (0..d).rev() {
        // History on the scale we are integrating back to.
        let mut history = seasonal_difference(original, level, period);
        let start = history.len();
        for &diff in &result {
            let base = history
                .len()
                .checked_sub(period)
                .map(|i| history[i])
                .unwrap_or(0.0);
            history.push(base + diff);
        }
        result = history.split_off(start);
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_difference_orders() {
        let series = vec![1.0, 4.0, 9.0, 16.0, 25.0];
        assert_eq!(difference(&series, 0), series);
        assert_eq!(difference(&series, 1), vec![3.0, 5.0, 7.0, 9.0]);
        assert_eq!(difference(&series, 2), vec![2.0, 2.0, 2.0]);
        assert!(difference(&[1.0], 1).is_empty());
    }

    #[test]
    fn test_seasonal_difference() {
        let series = vec![1.0, 2.0, 3.0, 11.0, 12.0, 13.0];
        assert_eq!(seasonal_difference(&series, 1, 3), vec![10.0, 10.0, 10.0]);
        assert!(seasonal_difference(&series, 1, 6).is_empty());
        assert_eq!(seasonal_difference(&series, 1, 0), series);
    }

    #[test]
    fn test_integrate_continues_series() {
        let series = vec![1.0, 4.0, 9.0, 16.0, 25.0];
        // Next two squares have second differences of 2.
        let future = integrate(&[2.0, 2.0], &series, 2);
        assert_relative_eq!(future[0], 36.0, epsilon = 1e-12);
        assert_relative_eq!(future[1], 49.0, epsilon = 1e-12);
    }

    #[test]
    fn test_integrate_seasonal_continues_pattern() {
        let series = vec![1.0, 2.0, 3.0, 11.0, 12.0, 13.0];
        let future = integrate_seasonal(&[10.0, 10.0, 10.0, 10.0], &series, 1, 3);
        assert_eq!(future, vec![21.0, 22.0, 23.0, 31.0]);
    }

    #[test]
    fn test_integrate_zero_order_is_identity() {
        assert_eq!(integrate(&[1.5, 2.5], &[9.0], 0), vec![1.5, 2.5]);
        assert_eq!(integrate_seasonal(&[1.5], &[9.0], 0, 4), vec![1.5]);
    }
}
