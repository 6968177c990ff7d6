//! Regularization-parameter search
//!
//! Minimizes the leave-one-out error over λ with Brent's bounded method
//! (golden-section steps with parabolic interpolation) in log10(λ). Both
//! search bounds are evaluated as well, so a surface without an interior
//! minimum collapses visibly onto a bound instead of stopping just inside it.
//! When the minimizer runs out of iterations a coarse log-spaced grid is
//! evaluated in parallel and the best finite point wins.

use crate::core::{KrlsError, Result, SearchConfig, SearchOutcome, SearchPoint, SearchTrace};
use crate::solver::LooEstimator;
use log::{debug, info, warn};
use rayon::prelude::*;

/// (3 − √5) / 2
const GOLDEN: f64 = 0.381_966_011_250_105_1;

/// Bounded 1-D minimizer over log10(λ)
pub struct RegularizationSearch {
    config: SearchConfig,
}

/// Iterate of the Brent minimizer
struct BrentState {
    x: f64,
    fx: f64,
    converged: bool,
    iterations: usize,
}

impl RegularizationSearch {
    pub fn new(config: SearchConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &SearchConfig {
        &self.config
    }

    /// Minimize `objective(λ)` over [lower, upper]
    ///
    /// Evaluations that return an error or a non-finite value are recorded in
    /// the trace with no LOOE and rank behind every finite value. Fails with
    /// `SearchFailed` only when no evaluation at all is finite.
    pub fn minimize<F>(&self, objective: F) -> Result<SearchOutcome>
    where
        F: Fn(f64) -> Result<f64> + Sync,
    {
        let lo = self.config.lower.log10();
        let hi = self.config.upper.log10();
        let mut trace = SearchTrace::new();

        let evaluate = |lambda: f64| -> SearchPoint {
            let looe = match objective(lambda) {
                Ok(value) if value.is_finite() => Some(value),
                Ok(value) => {
                    debug!("LOOE at lambda = {lambda:e} is {value}");
                    None
                }
                Err(err) => {
                    debug!("LOOE evaluation failed at lambda = {lambda:e}: {err}");
                    None
                }
            };
            SearchPoint { lambda, looe }
        };

        trace.push(evaluate(self.config.lower));
        trace.push(evaluate(self.config.upper));

        let brent = self.brent(lo, hi, |t| {
            let point = evaluate(10f64.powf(t));
            trace.push(point);
            point.score()
        });

        let used_grid_fallback = !brent.converged;
        if used_grid_fallback {
            warn!(
                "Regularization search did not converge in {} iterations, evaluating a {}-point grid",
                self.config.max_iterations, self.config.grid_points
            );
            let steps = (self.config.grid_points - 1) as f64;
            let grid: Vec<SearchPoint> = (0..self.config.grid_points)
                .into_par_iter()
                .map(|i| evaluate(10f64.powf(lo + (hi - lo) * i as f64 / steps)))
                .collect();
            for point in grid {
                trace.push(point);
            }
        } else {
            debug!(
                "Brent converged after {} iterations at log10(lambda) = {:.6} (score {})",
                brent.iterations, brent.x, brent.fx
            );
        }

        let best = trace.best().ok_or_else(|| {
            KrlsError::SearchFailed(format!(
                "All {} leave-one-out evaluations in [{:e}, {:e}] failed or were not finite",
                trace.len(),
                self.config.lower,
                self.config.upper
            ))
        })?;
        let looe = best.score();
        let at_boundary = self.is_at_boundary(best.lambda);

        if at_boundary {
            warn!(
                "Selected lambda = {:e} lies on the search boundary [{:e}, {:e}]; the leave-one-out error has no interior minimum",
                best.lambda, self.config.lower, self.config.upper
            );
        }
        if trace.n_failed() > 0 {
            info!(
                "{} of {} leave-one-out evaluations were not finite",
                trace.n_failed(),
                trace.len()
            );
        }
        info!(
            "Selected lambda = {:e} with LOOE = {looe:.6} after {} evaluations",
            best.lambda,
            trace.len()
        );

        Ok(SearchOutcome {
            lambda: best.lambda,
            looe,
            converged: brent.converged,
            used_grid_fallback,
            at_boundary,
            iterations: brent.iterations,
            trace,
        })
    }

    fn is_at_boundary(&self, lambda: f64) -> bool {
        let t = lambda.log10();
        let margin = 10.0 * self.config.tolerance;
        t - self.config.lower.log10() <= margin || self.config.upper.log10() - t <= margin
    }

    /// Brent's bounded minimization of `f` on [a, b]
    fn brent<F: FnMut(f64) -> f64>(&self, mut a: f64, mut b: f64, mut f: F) -> BrentState {
        let sqrt_eps = f64::EPSILON.sqrt();
        let tol = self.config.tolerance;

        let mut x = a + GOLDEN * (b - a);
        let mut w = x;
        let mut v = x;
        let mut fx = f(x);
        let mut fw = fx;
        let mut fv = fx;
        let mut d = 0.0_f64;
        let mut e = 0.0_f64;

        for iteration in 0..self.config.max_iterations {
            let xm = 0.5 * (a + b);
            let tol1 = sqrt_eps * x.abs() + tol / 3.0;
            let tol2 = 2.0 * tol1;

            if (x - xm).abs() <= tol2 - 0.5 * (b - a) {
                return BrentState {
                    x,
                    fx,
                    converged: true,
                    iterations: iteration,
                };
            }

            let mut golden_step = true;
            if e.abs() > tol1 {
                // Parabola through (v, fv), (w, fw), (x, fx); NaN from infinite
                // scores fails every comparison and falls through to golden
                let r = (x - w) * (fx - fv);
                let mut q = (x - v) * (fx - fw);
                let mut p = (x - v) * q - (x - w) * r;
                q = 2.0 * (q - r);
                if q > 0.0 {
                    p = -p;
                }
                q = q.abs();
                let previous = e;
                e = d;
                if p.abs() < (0.5 * q * previous).abs() && p > q * (a - x) && p < q * (b - x) {
                    d = p / q;
                    let u = x + d;
                    if u - a < tol2 || b - u < tol2 {
                        d = tol1.copysign(xm - x);
                    }
                    golden_step = false;
                }
            }
            if golden_step {
                e = if x >= xm { a - x } else { b - x };
                d = GOLDEN * e;
            }

            let u = if d.abs() >= tol1 {
                x + d
            } else {
                x + tol1.copysign(d)
            };
            let fu = f(u);

            if fu <= fx {
                if u >= x {
                    a = x;
                } else {
                    b = x;
                }
                v = w;
                fv = fw;
                w = x;
                fw = fx;
                x = u;
                fx = fu;
            } else {
                if u < x {
                    a = u;
                } else {
                    b = u;
                }
                if fu <= fw || w == x {
                    v = w;
                    fv = fw;
                    w = u;
                    fw = fu;
                } else if fu <= fv || v == x || v == w {
                    v = u;
                    fv = fu;
                }
            }
        }

        BrentState {
            x,
            fx,
            converged: false,
            iterations: self.config.max_iterations,
        }
    }
}

/// Select λ by minimizing the leave-one-out error of `estimator`
pub fn search_lambda(estimator: &LooEstimator<'_>, config: &SearchConfig) -> Result<SearchOutcome> {
    RegularizationSearch::new(config.clone())?.minimize(|lambda| estimator.evaluate(lambda))
}
