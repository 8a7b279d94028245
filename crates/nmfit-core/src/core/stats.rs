use nalgebra::{Matrix2, Vector2};
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum StatsError {
    #[error("Need at least {required} observations for this fit, got {actual}")]
    InsufficientData { required: usize, actual: usize },

    #[error("All abscissa values are identical; slope is undefined")]
    DegenerateAbscissa,

    #[error("Nonlinear fit did not converge after {iterations} iterations")]
    DidNotConverge { iterations: usize },
}

/// Ordinary least-squares line `y = slope * x + intercept`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LinearFit {
    pub slope: f64,
    pub intercept: f64,
}

pub fn fit_line(xs: &[f64], ys: &[f64]) -> Result<LinearFit, StatsError> {
    debug_assert_eq!(xs.len(), ys.len());
    let n = xs.len();
    if n < 2 {
        return Err(StatsError::InsufficientData {
            required: 2,
            actual: n,
        });
    }

    let nf = n as f64;
    let mean_x = xs.iter().sum::<f64>() / nf;
    let mean_y = ys.iter().sum::<f64>() / nf;

    let mut cov = 0.0;
    let mut var_x = 0.0;
    for (&x, &y) in xs.iter().zip(ys) {
        cov += (x - mean_x) * (y - mean_y);
        var_x += (x - mean_x) * (x - mean_x);
    }
    if var_x == 0.0 {
        return Err(StatsError::DegenerateAbscissa);
    }

    let slope = cov / var_x;
    Ok(LinearFit {
        slope,
        intercept: mean_y - slope * mean_x,
    })
}

/// Exponential decay model `y = a * exp(b * (x - 1))`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ExpDecayFit {
    pub a: f64,
    pub b: f64,
}

impl ExpDecayFit {
    pub fn eval(&self, x: f64) -> f64 {
        self.a * (self.b * (x - 1.0)).exp()
    }
}

const LM_MAX_ITERATIONS: usize = 200;
const LM_STEP_TOLERANCE: f64 = 1e-12;

/// Fits `y = a * exp(b * (x - 1))` by Levenberg-Marquardt, starting from the
/// given initial guess.
pub fn fit_exp_decay(
    xs: &[f64],
    ys: &[f64],
    initial_a: f64,
    initial_b: f64,
) -> Result<ExpDecayFit, StatsError> {
    debug_assert_eq!(xs.len(), ys.len());
    if xs.len() < 2 {
        return Err(StatsError::InsufficientData {
            required: 2,
            actual: xs.len(),
        });
    }

    let mut params = Vector2::new(initial_a, initial_b);
    let mut lambda = 1e-3;
    let mut cost = residual_cost(xs, ys, params);

    for _ in 0..LM_MAX_ITERATIONS {
        let mut jtj = Matrix2::zeros();
        let mut jtr = Vector2::zeros();
        let (a, b) = (params[0], params[1]);

        for (&x, &y) in xs.iter().zip(ys) {
            let e = (b * (x - 1.0)).exp();
            let residual = a * e - y;
            let jac = Vector2::new(e, a * (x - 1.0) * e);
            jtj += jac * jac.transpose();
            jtr += jac * residual;
        }

        let damped = jtj + Matrix2::from_diagonal(&(jtj.diagonal() * lambda));
        let Some(inverse) = damped.try_inverse() else {
            lambda *= 10.0;
            continue;
        };
        let step = inverse * jtr;
        let candidate = params - step;
        let candidate_cost = residual_cost(xs, ys, candidate);

        if candidate_cost.is_finite() && candidate_cost < cost {
            params = candidate;
            cost = candidate_cost;
            lambda = (lambda * 0.1).max(1e-12);
            if step.norm() < LM_STEP_TOLERANCE {
                return Ok(ExpDecayFit {
                    a: params[0],
                    b: params[1],
                });
            }
        } else {
            lambda *= 10.0;
            if lambda > 1e12 {
                break;
            }
        }
    }

    // Accept a plateaued fit whose gradient has effectively vanished.
    if cost.is_finite() && gradient_norm(xs, ys, params) < 1e-8 {
        return Ok(ExpDecayFit {
            a: params[0],
            b: params[1],
        });
    }

    Err(StatsError::DidNotConverge {
        iterations: LM_MAX_ITERATIONS,
    })
}

fn residual_cost(xs: &[f64], ys: &[f64], params: Vector2<f64>) -> f64 {
    let (a, b) = (params[0], params[1]);
    xs.iter()
        .zip(ys)
        .map(|(&x, &y)| {
            let r = a * (b * (x - 1.0)).exp() - y;
            r * r
        })
        .sum()
}

fn gradient_norm(xs: &[f64], ys: &[f64], params: Vector2<f64>) -> f64 {
    let (a, b) = (params[0], params[1]);
    let mut grad = Vector2::zeros();
    for (&x, &y) in xs.iter().zip(ys) {
        let e = (b * (x - 1.0)).exp();
        let residual = a * e - y;
        grad += Vector2::new(e, a * (x - 1.0) * e) * residual;
    }
    grad.norm()
}
