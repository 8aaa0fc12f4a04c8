use num_traits::{Float, FromPrimitive};
use std::fmt::Debug;

/// Floating-point types the plant and demo integrators are generic over.
pub trait Scalar: Float + FromPrimitive + Debug + 'static {
    /// Converts a physical constant, falling back to zero if it does not fit.
    fn of(value: f64) -> Self {
        Self::from_f64(value).unwrap_or_else(Self::zero)
    }
}

impl<T: Float + FromPrimitive + Debug + 'static> Scalar for T {}

/// Right-hand side of `dx/dt = f(t, x)`.
pub trait DynamicalSystem<T: Scalar> {
    fn dimension(&self) -> usize;

    /// Writes `f(t, x)` into `out`; both slices have length `dimension()`.
    fn apply(&self, t: T, x: &[T], out: &mut [T]);

    /// Allocating form of [`DynamicalSystem::apply`], for sampling.
    fn derivative(&self, t: T, x: &[T]) -> Vec<T> {
        let mut out = vec![T::zero(); self.dimension()];
        self.apply(t, x, &mut out);
        out
    }
}

/// Fixed-step integrator.
pub trait Steppable<T: Scalar> {
    /// Moves `state` from `t` to `t + dt` in place.
    fn step(&mut self, system: &impl DynamicalSystem<T>, t: &mut T, state: &mut [T], dt: T);
}
