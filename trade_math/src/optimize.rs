//! Derivative-free minimisation with a Nelder-Mead simplex
//!
//! Parameter constraints are expressed by the objective returning a penalty.

use crate::{MathError, Result};

/// Settings for [`nelder_mead`]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NelderMeadOptions {
    /// Maximum number of simplex iterations
    pub max_iterations: usize,
    /// Stop once the spread of objective values falls below this
    pub tolerance: f64,
    /// Relative size of the initial simplex around the start point
    pub initial_step: f64,
}

impl Default for NelderMeadOptions {
    fn default() -> Self {
        Self {
            max_iterations: 500,
            tolerance: 1e-9,
            initial_step: 0.1,
        }
    }
}

/// Outcome of a minimisation
#[derive(Debug, Clone, PartialEq)]
pub struct Minimum {
    pub point: Vec<f64>,
    pub value: f64,
    pub iterations: usize,
    pub converged: bool,
}

/// Minimise `objective` starting from `start`.
///
/// Non-finite objective values are treated as `+inf`, which lets callers
/// express hard constraints by returning `f64::INFINITY`.
pub fn nelder_mead<F>(objective: F, start: &[f64], options: NelderMeadOptions) -> Result<Minimum>
where
    F: Fn(&[f64]) -> f64,
{
    if start.is_empty() {
        return Err(MathError::InvalidInput(
            "Start point must have at least one dimension".to_string(),
        ));
    }

    let eval = |p: &[f64]| {
        let v = objective(p);
        if v.is_finite() {
            v
        } else {
            f64::INFINITY
        }
    };

    let dim = start.len();
    let mut simplex: Vec<(Vec<f64>, f64)> = Vec::with_capacity(dim + 1);
    simplex.push((start.to_vec(), eval(start)));
    for i in 0..dim {
        let mut vertex = start.to_vec();
        let step = if vertex[i].abs() > 1e-8 {
            vertex[i] * options.initial_step
        } else {
            0.00025
        };
        vertex[i] += step;
        let value = eval(&vertex);
        simplex.push((vertex, value));
    }

    if !simplex[0].1.is_finite() {
        return Err(MathError::InvalidInput(
            "Objective is not finite at the start point".to_string(),
        ));
    }

    let (alpha, gamma, rho, sigma) = (1.0, 2.0, 0.5, 0.5);
    let mut iterations = 0;
    let mut converged = false;

    while iterations < options.max_iterations {
        simplex.sort_by(|a, b| a.1.total_cmp(&b.1));

        let best = simplex[0].1;
        let worst = simplex[dim].1;
        if worst.is_finite() && (worst - best).abs() <= options.tolerance * (1.0 + best.abs()) {
            converged = true;
            break;
        }
        iterations += 1;

        let centroid: Vec<f64> = (0..dim)
            .map(|j| simplex[..dim].iter().map(|(p, _)| p[j]).sum::<f64>() / dim as f64)
            .collect();
        let along = |coef: f64| -> Vec<f64> {
            centroid
                .iter()
                .zip(&simplex[dim].0)
                .map(|(c, w)| c + coef * (w - c))
                .collect()
        };

        let reflected = along(-alpha);
        let reflected_value = eval(&reflected);

        if reflected_value < simplex[0].1 {
            let expanded = along(-gamma);
            let expanded_value = eval(&expanded);
            simplex[dim] = if expanded_value < reflected_value {
                (expanded, expanded_value)
            } else {
                (reflected, reflected_value)
            };
            continue;
        }

        if reflected_value < simplex[dim - 1].1 {
            simplex[dim] = (reflected, reflected_value);
            continue;
        }

        let contracted = along(rho);
        let contracted_value = eval(&contracted);
        if contracted_value < simplex[dim].1 {
            simplex[dim] = (contracted, contracted_value);
            continue;
        }

        // shrink towards the best vertex
        let best_point = simplex[0].0.clone();
        for vertex in simplex.iter_mut().skip(1) {
            let shrunk: Vec<f64> = best_point
                .iter()
                .zip(&vertex.0)
                .map(|(b, v)| b + sigma * (v - b))
                .collect();
            let value = eval(&shrunk);
            *vertex = (shrunk, value);
        }
    }

    simplex.sort_by(|a, b| a.1.total_cmp(&b.1));
    let (point, value) = simplex.swap_remove(0);

    Ok(Minimum {
        point,
        value,
        iterations,
        converged,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn test_minimises_quadratic_bowl() {
        let objective = |p: &[f64]| (p[0] - 1.5).powi(2) + 2.0 * (p[1] + 0.5).powi(2);
        let min = nelder_mead(objective, &[0.0, 0.0], NelderMeadOptions::default()).unwrap();

        assert!(min.converged);
        assert_abs_diff_eq!(min.point[0], 1.5, epsilon = 1e-3);
        assert_abs_diff_eq!(min.point[1], -0.5, epsilon = 1e-3);
    }

    #[test]
    fn test_respects_infinite_penalty() {
        // minimum of (x-2)^2 subject to x <= 1
        let objective = |p: &[f64]| if p[0] > 1.0 { f64::INFINITY } else { (p[0] - 2.0).powi(2) };
        let min = nelder_mead(objective, &[0.0], NelderMeadOptions::default()).unwrap();
        assert!(min.point[0] <= 1.0);
        assert_abs_diff_eq!(min.point[0], 1.0, epsilon = 1e-2);
    }

    #[test]
    fn test_rejects_infeasible_start() {
        let result = nelder_mead(|_| f64::NAN, &[0.0], NelderMeadOptions::default());
        assert!(result.is_err());
    }
}
