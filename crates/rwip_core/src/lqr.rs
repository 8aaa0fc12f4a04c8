//! LQR gain synthesis for the pendulum linearized about upright.
//!
//! The continuous-time algebraic Riccati equation
//! `AᵀP + PA − PBR⁻¹BᵀP + Q = 0` is solved through the matrix sign function
//! of the Hamiltonian `[[A, −BR⁻¹Bᵀ], [−Q, −Aᵀ]]`: its stable invariant
//! subspace is spanned by `[I; P]`.

use crate::config::{LqrWeights, PlantParams};
use anyhow::{anyhow, bail, Context, Result};
use nalgebra::{Complex, DMatrix};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// State-space model `x' = Ax + Bu` with
/// `x = [angle, velocity, wheel angle, wheel velocity]` and `u` the motor voltage.
#[derive(Debug, Clone)]
pub struct LinearModel {
    pub a: DMatrix<f64>,
    pub b: DMatrix<f64>,
}

impl LinearModel {
    pub fn from_params(p: &PlantParams) -> Self {
        let a = p.pivot_inertia();
        let b = p.gravity_torque_coefficient();
        let j = p.motor_inertia;
        let r = p.resistance;
        let kt_ng = p.torque_constant * p.gear_ratio;
        let emf = kt_ng * p.back_emf_constant * p.gear_ratio;

        let a21 = b / a;
        let a24 = emf / (a * r);
        let a41 = -b / a;
        let a44 = -(a + j) * emf / (a * j * r);
        let b2 = -kt_ng / (a * r);
        let b4 = (a + j) * kt_ng / (a * j * r);

        #[rustfmt::skip]
        let a_matrix = DMatrix::from_row_slice(4, 4, &[
            0.0, 1.0, 0.0, 0.0,
            a21, 0.0, 0.0, a24,
            0.0, 0.0, 0.0, 1.0,
            a41, 0.0, 0.0, a44,
        ]);
        let b_matrix = DMatrix::from_row_slice(4, 1, &[0.0, b2, 0.0, b4]);

        Self {
            a: a_matrix,
            b: b_matrix,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct SignIterationSettings {
    pub max_steps: usize,
    pub tolerance: f64,
}

impl Default for SignIterationSettings {
    fn default() -> Self {
        Self {
            max_steps: 100,
            tolerance: 1e-12,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ComplexNumber {
    pub re: f64,
    pub im: f64,
}

impl From<Complex<f64>> for ComplexNumber {
    fn from(value: Complex<f64>) -> Self {
        Self {
            re: value.re,
            im: value.im,
        }
    }
}

/// Outcome of the gain design, kept for display and diagnostics.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LqrDesign {
    /// Feedback row `K` for `u = −Kx`.
    pub gain: [f64; 4],
    /// Relative Riccati residual; `None` for a supplied gain.
    pub riccati_residual: Option<f64>,
    pub open_loop_poles: Vec<ComplexNumber>,
    /// Eigenvalues of `A − BK`.
    pub closed_loop_poles: Vec<ComplexNumber>,
}

impl LqrDesign {
    /// Synthesizes the gain from the cost weights.
    pub fn synthesize(params: &PlantParams, weights: &LqrWeights) -> Result<Self> {
        let model = LinearModel::from_params(params);
        let q = DMatrix::from_fn(4, 4, |i, j| weights.q[i][j]);
        let r = DMatrix::from_element(1, 1, weights.r);

        let p = solve_care(&model.a, &model.b, &q, &r, SignIterationSettings::default())
            .context("Failed to solve the Riccati equation for the LQR gain.")?;
        let residual = care_residual(&model.a, &model.b, &q, &r, &p)?;
        if residual > 1e-8 {
            bail!("Riccati solution is inaccurate (relative residual {}).", residual);
        }

        let r_inv = r
            .try_inverse()
            .ok_or_else(|| anyhow!("Control weight R is singular."))?;
        let k = r_inv * model.b.transpose() * &p;
        let gain = [k[(0, 0)], k[(0, 1)], k[(0, 2)], k[(0, 3)]];

        let design = Self::evaluate(&model, gain, Some(residual));
        info!(
            gain = ?design.gain,
            residual,
            "LQR gain synthesized"
        );
        Ok(design)
    }

    /// Wraps an externally supplied gain, still reporting the poles it yields.
    pub fn from_gain(params: &PlantParams, gain: [f64; 4]) -> Self {
        let model = LinearModel::from_params(params);
        Self::evaluate(&model, gain, None)
    }

    fn evaluate(model: &LinearModel, gain: [f64; 4], residual: Option<f64>) -> Self {
        let k = DMatrix::from_row_slice(1, 4, &gain);
        let closed = &model.a - &model.b * k;
        Self {
            gain,
            riccati_residual: residual,
            open_loop_poles: sorted_poles(&model.a),
            closed_loop_poles: sorted_poles(&closed),
        }
    }

    /// True when every closed-loop pole lies strictly in the left half plane.
    pub fn is_stabilizing(&self) -> bool {
        self.closed_loop_poles.iter().all(|pole| pole.re < 0.0)
    }
}

fn sorted_poles(matrix: &DMatrix<f64>) -> Vec<ComplexNumber> {
    let mut poles: Vec<ComplexNumber> = matrix
        .complex_eigenvalues()
        .iter()
        .map(|&c| ComplexNumber::from(c))
        .collect();
    poles.sort_by(|a, b| {
        a.re.partial_cmp(&b.re)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then(a.im.partial_cmp(&b.im).unwrap_or(std::cmp::Ordering::Equal))
    });
    poles
}

/// Stabilizing solution of the continuous-time algebraic Riccati equation.
pub fn solve_care(
    a: &DMatrix<f64>,
    b: &DMatrix<f64>,
    q: &DMatrix<f64>,
    r: &DMatrix<f64>,
    settings: SignIterationSettings,
) -> Result<DMatrix<f64>> {
    let n = a.nrows();
    if n == 0 || a.ncols() != n {
        bail!("A must be square with positive dimension.");
    }
    if b.nrows() != n {
        bail!("B row count mismatch. Expected {}, got {}.", n, b.nrows());
    }
    if q.shape() != (n, n) {
        bail!("Q must be {}x{}.", n, n);
    }
    if r.shape() != (b.ncols(), b.ncols()) {
        bail!("R must be {}x{}.", b.ncols(), b.ncols());
    }
    if settings.max_steps == 0 {
        bail!("max_steps must be greater than zero.");
    }

    let r_inv = r
        .clone()
        .try_inverse()
        .ok_or_else(|| anyhow!("Control weight R is singular."))?;
    let g = b * r_inv * b.transpose();

    let dim = 2 * n;
    let mut z = DMatrix::<f64>::zeros(dim, dim);
    z.view_mut((0, 0), (n, n)).copy_from(a);
    z.view_mut((0, n), (n, n)).copy_from(&(-&g));
    z.view_mut((n, 0), (n, n)).copy_from(&(-q));
    z.view_mut((n, n), (n, n)).copy_from(&(-a.transpose()));

    let mut converged = false;
    for iteration in 0..settings.max_steps {
        let lu = z.clone().lu();
        let det = lu.determinant();
        if det == 0.0 || !det.is_finite() {
            bail!(
                "Hamiltonian iterate became singular at step {}; the plant may have \
                 eigenvalues on the imaginary axis that cannot be stabilized.",
                iteration
            );
        }
        let inverse = lu
            .try_inverse()
            .ok_or_else(|| anyhow!("Hamiltonian iterate is not invertible."))?;

        // Determinant scaling keeps the Newton iteration from stalling.
        let c = det.abs().powf(-1.0 / dim as f64);
        let next = (&z * c + inverse / c) * 0.5;
        let delta = (&next - &z).norm();
        z = next;

        if delta <= settings.tolerance * z.norm() {
            debug!(iterations = iteration + 1, "sign iteration converged");
            converged = true;
            break;
        }
    }
    if !converged {
        bail!(
            "Sign iteration failed to converge in {} steps.",
            settings.max_steps
        );
    }

    // sign(H) [I; P] = −[I; P]
    let identity = DMatrix::<f64>::identity(n, n);
    let w11 = z.view((0, 0), (n, n)).into_owned();
    let w12 = z.view((0, n), (n, n)).into_owned();
    let w21 = z.view((n, 0), (n, n)).into_owned();
    let w22 = z.view((n, n), (n, n)).into_owned();

    let mut lhs = DMatrix::<f64>::zeros(dim, n);
    lhs.view_mut((0, 0), (n, n)).copy_from(&w12);
    lhs.view_mut((n, 0), (n, n)).copy_from(&(w22 + &identity));
    let mut rhs = DMatrix::<f64>::zeros(dim, n);
    rhs.view_mut((0, 0), (n, n)).copy_from(&(-(w11 + &identity)));
    rhs.view_mut((n, 0), (n, n)).copy_from(&(-w21));

    let p = lhs
        .svd(true, true)
        .solve(&rhs, 1e-14)
        .map_err(|e| anyhow!("Least-squares solve for P failed: {}", e))?;
    Ok((&p + p.transpose()) * 0.5)
}

/// Norm of `AᵀP + PA − PBR⁻¹BᵀP + Q` relative to the norms of its terms.
///
/// Weakly actuated plants give entries of P many orders of magnitude above
/// Q, so an absolute residual says little about accuracy.
pub fn care_residual(
    a: &DMatrix<f64>,
    b: &DMatrix<f64>,
    q: &DMatrix<f64>,
    r: &DMatrix<f64>,
    p: &DMatrix<f64>,
) -> Result<f64> {
    let r_inv = r
        .clone()
        .try_inverse()
        .ok_or_else(|| anyhow!("Control weight R is singular."))?;
    let atp = a.transpose() * p;
    let pa = p * a;
    let pgp = p * b * r_inv * b.transpose() * p;
    let scale = atp.norm() + pa.norm() + pgp.norm() + q.norm();
    let residual = (&atp + &pa - &pgp + q).norm();
    Ok(if scale > 0.0 { residual / scale } else { residual })
}

#[cfg(test)]
mod tests {
    use super::{care_residual, solve_care, LinearModel, LqrDesign, SignIterationSettings};
    use crate::config::{LqrWeights, PlantParams};
    use nalgebra::DMatrix;

    fn assert_err_contains<T: std::fmt::Debug>(result: anyhow::Result<T>, needle: &str) {
        let err = result.expect_err("expected error");
        let message = format!("{err:#}");
        assert!(
            message.contains(needle),
            "expected error to contain \"{needle}\", got \"{message}\""
        );
    }

    #[test]
    fn scalar_riccati_matches_closed_form() {
        // a = 1, b = 1, q = 1, r = 1: p^2 - 2p - 1 = 0, p = 1 + sqrt(2)
        let a = DMatrix::from_element(1, 1, 1.0);
        let b = DMatrix::from_element(1, 1, 1.0);
        let q = DMatrix::from_element(1, 1, 1.0);
        let r = DMatrix::from_element(1, 1, 1.0);
        let p = solve_care(&a, &b, &q, &r, SignIterationSettings::default())
            .expect("scalar CARE should solve");
        assert!((p[(0, 0)] - (1.0 + 2.0_f64.sqrt())).abs() < 1e-10);
    }

    #[test]
    fn double_integrator_gain_matches_known_solution() {
        // x'' = u with Q = I, R = 1 gives K = [1, sqrt(3)].
        let a = DMatrix::from_row_slice(2, 2, &[0.0, 1.0, 0.0, 0.0]);
        let b = DMatrix::from_row_slice(2, 1, &[0.0, 1.0]);
        let q = DMatrix::identity(2, 2);
        let r = DMatrix::from_element(1, 1, 1.0);
        let p = solve_care(&a, &b, &q, &r, SignIterationSettings::default())
            .expect("double integrator CARE should solve");
        let k = b.transpose() * &p;
        assert!((k[(0, 0)] - 1.0).abs() < 1e-9);
        assert!((k[(0, 1)] - 3.0_f64.sqrt()).abs() < 1e-9);
        let residual = care_residual(&a, &b, &q, &r, &p).expect("residual");
        assert!(residual < 1e-12);
    }

    #[test]
    fn rejects_mismatched_shapes() {
        let a = DMatrix::identity(2, 2);
        let b = DMatrix::from_element(3, 1, 1.0);
        let q = DMatrix::identity(2, 2);
        let r = DMatrix::from_element(1, 1, 1.0);
        assert_err_contains(
            solve_care(&a, &b, &q, &r, SignIterationSettings::default()),
            "row count mismatch",
        );
    }

    #[test]
    fn upright_model_is_open_loop_unstable() {
        let model = LinearModel::from_params(&PlantParams::default());
        let design = LqrDesign::from_gain(&PlantParams::default(), [0.0; 4]);
        assert_eq!(model.a.nrows(), 4);
        assert!(design.open_loop_poles.iter().any(|pole| pole.re > 0.0));
        assert!(!design.is_stabilizing());
    }

    #[test]
    fn reference_weights_stabilize_the_linear_model() {
        let params = PlantParams::default();
        let design = LqrDesign::synthesize(&params, &LqrWeights::default())
            .expect("reference LQR design should succeed");
        assert!(design.is_stabilizing(), "poles: {:?}", design.closed_loop_poles);
        assert!(design.riccati_residual.is_some());
        assert_eq!(design.closed_loop_poles.len(), 4);
        // Positive voltage pushes the pendulum back, so the angle gain is negative.
        assert!(design.gain[0] < 0.0);
    }
}
