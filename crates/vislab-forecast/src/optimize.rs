//! Bounded Nelder–Mead simplex minimisation.

use std::cmp::Ordering;

/// Outcome of [`nelder_mead`].
#[derive(Debug, Clone)]
pub struct NelderMeadResult {
    pub point: Vec<f64>,
    pub value: f64,
    pub iterations: usize,
    pub converged: bool,
}

/// Tuning of [`nelder_mead`].
#[derive(Debug, Clone)]
pub struct NelderMeadConfig {
    pub max_iter: usize,
    /// Stop when the spread of simplex values falls below this.
    pub tolerance: f64,
    /// Reflection coefficient.
    pub alpha: f64,
    /// Expansion coefficient.
    pub gamma: f64,
    /// Contraction coefficient.
    pub rho: f64,
    /// Shrink coefficient.
    pub sigma: f64,
    /// Relative step used to build the initial simplex.
    pub initial_step: f64,
}

impl Default for NelderMeadConfig {
    fn default() -> Self {
        Self {
            max_iter: 1000,
            tolerance: 1e-8,
            alpha: 1.0,
            gamma: 2.0,
            rho: 0.5,
            sigma: 0.5,
            initial_step: 0.05,
        }
    }
}

fn by_value(a: &f64, b: &f64) -> Ordering {
    a.partial_cmp(b).unwrap_or(Ordering::Equal)
}

fn clamp(point: &mut [f64], bounds: Option<&[(f64, f64)]>) {
    if let Some(bounds) = bounds {
        for (x, &(lo, hi)) in point.iter_mut().zip(bounds) {
            *x = x.clamp(lo, hi);
        }
    }
}

/// Move `from` towards/away from `centroid`: `centroid + coef * (from - centroid)`.
fn along(centroid: &[f64], from: &[f64], coef: f64, bounds: Option<&[(f64, f64)]>) -> Vec<f64> {
    let mut p: Vec<f64> = centroid
        .iter()
        .zip(from)
        .map(|(c, x)| c + coef * (x - c))
        .collect();
    clamp(&mut p, bounds);
    p
}

/// Minimise `objective` starting at `initial`.
///
/// Every trial point is clamped into `bounds` when given. Non-finite
/// objective values are treated as worse than any finite one.
pub fn nelder_mead<F>(
    objective: F,
    initial: &[f64],
    bounds: Option<&[(f64, f64)]>,
    config: &NelderMeadConfig,
) -> NelderMeadResult
where
    F: Fn(&[f64]) -> f64,
{
    let f = |x: &[f64]| {
        let v = objective(x);
        if v.is_finite() {
            v
        } else {
            f64::MAX
        }
    };

    let n = initial.len();
    if n == 0 {
        return NelderMeadResult {
            point: Vec::new(),
            value: f(initial),
            iterations: 0,
            converged: true,
        };
    }

    let mut start = initial.to_vec();
    clamp(&mut start, bounds);
    let mut simplex = vec![start.clone()];
    for i in 0..n {
        let mut vertex = start.clone();
        let step = if vertex[i].abs() > 1e-10 {
            config.initial_step * vertex[i].abs()
        } else {
            config.initial_step
        };
        vertex[i] += step;
        clamp(&mut vertex, bounds);
        if vertex[i] == start[i] {
            // Pinned at an upper bound: step the other way.
            vertex[i] -= step;
            clamp(&mut vertex, bounds);
        }
        simplex.push(vertex);
    }
    let mut values: Vec<f64> = simplex.iter().map(|v| f(v)).collect();

    let mut iterations = 0;
    let mut converged = false;
    while iterations < config.max_iter {
        iterations += 1;

        let mut order: Vec<usize> = (0..=n).collect();
        order.sort_by(|&a, &b| by_value(&values[a], &values[b]));
        let (best, worst, second_worst) = (order[0], order[n], order[n - 1]);

        if (values[worst] - values[best]).abs() < config.tolerance {
            converged = true;
            break;
        }

        let mut centroid = vec![0.0; n];
        for (_, vertex) in simplex.iter().enumerate().filter(|(i, _)| *i != worst) {
            for (c, x) in centroid.iter_mut().zip(vertex) {
                *c += x / n as f64;
            }
        }

        let reflected = along(&centroid, &simplex[worst], -config.alpha, bounds);
        let fr = f(&reflected);

        if fr < values[best] {
            let expanded = along(&centroid, &reflected, config.gamma, bounds);
            let fe = f(&expanded);
            if fe < fr {
                simplex[worst] = expanded;
                values[worst] = fe;
            } else {
                simplex[worst] = reflected;
                values[worst] = fr;
            }
            continue;
        }
        if fr < values[second_worst] {
            simplex[worst] = reflected;
            values[worst] = fr;
            continue;
        }

        // Outside contraction when the reflection improved on the worst
        // vertex, inside contraction otherwise.
        let contracted = if fr < values[worst] {
            along(&centroid, &reflected, config.rho, bounds)
        } else {
            along(&centroid, &simplex[worst], config.rho, bounds)
        };
        let fc = f(&contracted);
        if fc < values[worst].min(fr) {
            simplex[worst] = contracted;
            values[worst] = fc;
            continue;
        }

        let anchor = simplex[best].clone();
        for i in (0..=n).filter(|&i| i != best) {
            simplex[i] = along(&anchor, &simplex[i], config.sigma, bounds);
            values[i] = f(&simplex[i]);
        }
    }

    let best = values
        .iter()
        .enumerate()
        .min_by(|a, b| by_value(a.1, b.1))
        .map(|(i, _)| i)
        .unwrap_or(0);
    NelderMeadResult {
        point: simplex[best].clone(),
        value: values[best],
        iterations,
        converged,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_nelder_mead_quadratic() {
        let result = nelder_mead(
            |x| (x[0] - 2.0).powi(2) + (x[1] + 3.0).powi(2),
            &[0.0, 0.0],
            None,
            &NelderMeadConfig::default(),
        );
        assert!(result.converged);
        assert_relative_eq!(result.point[0], 2.0, epsilon = 1e-3);
        assert_relative_eq!(result.point[1], -3.0, epsilon = 1e-3);
    }

    #[test]
    fn test_nelder_mead_respects_bounds() {
        let bounds = [(-0.99, 0.99)];
        let result = nelder_mead(
            |x| (x[0] - 5.0).powi(2),
            &[0.0],
            Some(&bounds),
            &NelderMeadConfig::default(),
        );
        assert!(result.point[0] <= 0.99);
        assert_relative_eq!(result.point[0], 0.99, epsilon = 1e-6);
    }

    #[test]
    fn test_nelder_mead_rosenbrock() {
        let config = NelderMeadConfig {
            max_iter: 5000,
            tolerance: 1e-12,
            ..Default::default()
        };
        let result = nelder_mead(
            |x| (1.0 - x[0]).powi(2) + 100.0 * (x[1] - x[0] * x[0]).powi(2),
            &[-1.2, 1.0],
            None,
            &config,
        );
        assert_relative_eq!(result.point[0], 1.0, epsilon = 1e-2);
        assert_relative_eq!(result.point[1], 1.0, epsilon = 1e-2);
    }

    #[test]
    fn test_nelder_mead_non_finite_objective() {
        let result = nelder_mead(
            |x| if x[0] < 0.0 { f64::NAN } else { (x[0] - 1.0).powi(2) },
            &[0.5],
            None,
            &NelderMeadConfig::default(),
        );
        assert_relative_eq!(result.point[0], 1.0, epsilon = 1e-3);
    }

    #[test]
    fn test_nelder_mead_empty() {
        let result = nelder_mead(|_| 4.0, &[], None, &NelderMeadConfig::default());
        assert!(result.point.is_empty());
        assert_eq!(result.value, 4.0);
    }
}
