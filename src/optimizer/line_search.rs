//! One-dimensional minimization along a direction.
//!
//! Bracketing by golden-ratio expansion with parabolic extrapolation, then
//! Brent's method (golden section combined with inverse parabolic
//! interpolation) inside the bracket. See Press et al., *Numerical Recipes*,
//! sections 10.1 and 10.2.

use std::cell::Cell;

use ndarray::Array1;

use crate::error::{Result, SemOptError};
use crate::problem::Objective;

use super::config::LineSearchConfig;

/// Counts evaluations of an objective.
pub struct Evaluator<'a, O: Objective> {
    objective: &'a O,
    evals: Cell<usize>,
}

impl<'a, O: Objective> Evaluator<'a, O> {
    pub fn new(objective: &'a O) -> Self {
        Self {
            objective,
            evals: Cell::new(0),
        }
    }

    /// Evaluate the objective at `params`.
    pub fn eval(&self, params: &Array1<f64>) -> Result<f64> {
        self.evals.set(self.evals.get() + 1);
        self.objective.eval(params)
    }

    /// Number of evaluations so far.
    pub fn count(&self) -> usize {
        self.evals.get()
    }
}

/// Three abscissas with `fb <= fa` and `fb <= fc`, `bx` between `ax` and `cx`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bracket {
    pub ax: f64,
    pub bx: f64,
    pub cx: f64,
    pub fa: f64,
    pub fb: f64,
    pub fc: f64,
}

/// `|a|` with the sign of `b`.
fn sign(a: f64, b: f64) -> f64 {
    if b >= 0.0 {
        a.abs()
    } else {
        -a.abs()
    }
}

/// Bracket a minimum of `f` starting from the points `ax` and `bx`.
///
/// # Errors
///
/// * `SemOptError::NumericalInconsistency` if the bracket expands to a
///   non-finite abscissa
/// * `SemOptError::MaxIterationsExceeded` if no bracket is found within
///   `config.max_bracket_steps` expansions
/// * Any error returned by `f`
pub fn bracket<F>(mut f: F, ax: f64, bx: f64, config: &LineSearchConfig) -> Result<Bracket>
where
    F: FnMut(f64) -> Result<f64>,
{
    let (mut ax, mut bx) = (ax, bx);
    let mut fa = f(ax)?;
    let mut fb = f(bx)?;

    // Go downhill from a to b
    if fb > fa {
        std::mem::swap(&mut ax, &mut bx);
        std::mem::swap(&mut fa, &mut fb);
    }

    let mut cx = bx + config.gold * (bx - ax);
    let mut fc = f(cx)?;

    let mut steps = 0;
    while fb > fc {
        steps += 1;
        if steps > config.max_bracket_steps {
            return Err(SemOptError::MaxIterationsExceeded {
                routine: "bracket",
                limit: config.max_bracket_steps,
            });
        }

        let r = (bx - ax) * (fb - fc);
        let q = (bx - cx) * (fb - fa);
        let mut u =
            bx - ((bx - cx) * q - (bx - ax) * r) / (2.0 * sign((q - r).abs().max(config.tiny), q - r));
        let ulim = bx + config.glimit * (cx - bx);
        let mut fu;

        if (bx - u) * (u - cx) > 0.0 {
            // Parabolic u lies between b and c
            fu = f(u)?;
            if fu < fc {
                return Ok(Bracket {
                    ax: bx,
                    bx: u,
                    cx,
                    fa: fb,
                    fb: fu,
                    fc,
                });
            } else if fu > fb {
                return Ok(Bracket {
                    ax,
                    bx,
                    cx: u,
                    fa,
                    fb,
                    fc: fu,
                });
            }
            u = cx + config.gold * (cx - bx);
            fu = f(u)?;
        } else if (cx - u) * (u - ulim) > 0.0 {
            // Parabolic u lies between c and its allowed limit
            fu = f(u)?;
            if fu < fc {
                bx = cx;
                cx = u;
                u = cx + config.gold * (cx - bx);
                fb = fc;
                fc = fu;
                fu = f(u)?;
            }
        } else if (u - ulim) * (ulim - cx) >= 0.0 {
            u = ulim;
            fu = f(u)?;
        } else {
            u = cx + config.gold * (cx - bx);
            fu = f(u)?;
        }

        if !u.is_finite() {
            return Err(SemOptError::NumericalInconsistency(
                "line search bracket expanded to a non-finite point".to_string(),
            ));
        }

        ax = bx;
        bx = cx;
        cx = u;
        fa = fb;
        fb = fc;
        fc = fu;
    }

    Ok(Bracket {
        ax,
        bx,
        cx,
        fa,
        fb,
        fc,
    })
}

/// Locate the minimum inside a bracket with Brent's method.
///
/// `bracket.fb` is taken as the function value at `bracket.bx`.
///
/// # Returns
///
/// * `(xmin, fmin)`
///
/// # Errors
///
/// * `SemOptError::MaxIterationsExceeded` after `config.max_iterations` iterations
/// * Any error returned by `f`
pub fn brent<F>(mut f: F, bracket: &Bracket, config: &LineSearchConfig) -> Result<(f64, f64)>
where
    F: FnMut(f64) -> Result<f64>,
{
    let mut a = bracket.ax.min(bracket.cx);
    let mut b = bracket.ax.max(bracket.cx);
    let (mut x, mut w, mut v) = (bracket.bx, bracket.bx, bracket.bx);
    let (mut fx, mut fw, mut fv) = (bracket.fb, bracket.fb, bracket.fb);
    let mut d: f64 = 0.0;
    let mut e: f64 = 0.0;

    for _ in 0..config.max_iterations {
        let xm = 0.5 * (a + b);
        let tol1 = config.tol * x.abs() + config.zeps;
        let tol2 = 2.0 * tol1;

        if (x - xm).abs() <= tol2 - 0.5 * (b - a) {
            return Ok((x, fx));
        }

        if e.abs() > tol1 {
            // Trial parabolic fit through x, v, w
            let r = (x - w) * (fx - fv);
            let mut q = (x - v) * (fx - fw);
            let mut p = (x - v) * q - (x - w) * r;
            q = 2.0 * (q - r);
            if q > 0.0 {
                p = -p;
            }
            q = q.abs();
            let etemp = e;
            e = d;

            if p.abs() >= (0.5 * q * etemp).abs() || p <= q * (a - x) || p >= q * (b - x) {
                e = if x >= xm { a - x } else { b - x };
                d = config.cgold * e;
            } else {
                d = p / q;
                let u = x + d;
                if u - a < tol2 || b - u < tol2 {
                    d = sign(tol1, xm - x);
                }
            }
        } else {
            e = if x >= xm { a - x } else { b - x };
            d = config.cgold * e;
        }

        let u = if d.abs() >= tol1 {
            x + d
        } else {
            x + sign(tol1, d)
        };
        let fu = f(u)?;

        if fu <= fx {
            if u >= x {
                a = x;
            } else {
                b = x;
            }
            v = w;
            w = x;
            x = u;
            fv = fw;
            fw = fx;
            fx = fu;
        } else {
            if u < x {
                a = u;
            } else {
                b = u;
            }
            if fu <= fw || w == x {
                v = w;
                w = u;
                fv = fw;
                fw = fu;
            } else if fu <= fv || v == x || v == w {
                v = u;
                fv = fu;
            }
        }
    }

    Err(SemOptError::MaxIterationsExceeded {
        routine: "brent",
        limit: config.max_iterations,
    })
}

/// Minimize along `direction` from `point`.
///
/// On return `point` holds the minimum found and `direction` has been scaled
/// by the step length, so it holds the displacement actually taken.
///
/// # Returns
///
/// * The objective value at the new `point`
pub fn minimize_along<O: Objective>(
    evaluator: &Evaluator<'_, O>,
    point: &mut Array1<f64>,
    direction: &mut Array1<f64>,
    config: &LineSearchConfig,
) -> Result<f64> {
    let (xmin, fmin) = {
        let (origin, step) = (&*point, &*direction);
        let line = |t: f64| evaluator.eval(&(origin + &(step * t)));

        let bracketed = bracket(line, 0.0, 1.0, config)?;
        brent(line, &bracketed, config)?
    };

    *direction *= xmin;
    *point += &*direction;
    Ok(fmin)
}
