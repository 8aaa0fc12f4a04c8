use crate::traits::{DynamicalSystem, Scalar, Steppable};

/// Classic Runge-Kutta 4th order solver.
///
/// Used by the pendulum demos, which are smooth enough that a fixed step
/// of a few milliseconds tracks them well.
pub struct RK4<T: Scalar> {
    stages: [Vec<T>; 4],
    tmp: Vec<T>,
}

impl<T: Scalar> RK4<T> {
    pub fn new(dim: usize) -> Self {
        Self {
            stages: std::array::from_fn(|_| vec![T::zero(); dim]),
            tmp: vec![T::zero(); dim],
        }
    }
}

impl<T: Scalar> Steppable<T> for RK4<T> {
    fn step(&mut self, system: &impl DynamicalSystem<T>, t: &mut T, state: &mut [T], dt: T) {
        let half = T::of(0.5);
        let two = T::of(2.0);
        let sixth = T::of(1.0 / 6.0);
        let t0 = *t;
        let [k1, k2, k3, k4] = &mut self.stages;

        system.apply(t0, state, k1);

        for ((tmp, &x), &k) in self.tmp.iter_mut().zip(state.iter()).zip(k1.iter()) {
            *tmp = x + dt * half * k;
        }
        system.apply(t0 + dt * half, &self.tmp, k2);

        for ((tmp, &x), &k) in self.tmp.iter_mut().zip(state.iter()).zip(k2.iter()) {
            *tmp = x + dt * half * k;
        }
        system.apply(t0 + dt * half, &self.tmp, k3);

        for ((tmp, &x), &k) in self.tmp.iter_mut().zip(state.iter()).zip(k3.iter()) {
            *tmp = x + dt * k;
        }
        system.apply(t0 + dt, &self.tmp, k4);

        for (i, x) in state.iter_mut().enumerate() {
            *x = *x + dt * sixth * (k1[i] + two * k2[i] + two * k3[i] + k4[i]);
        }

        *t = t0 + dt;
    }
}

/// Semi-implicit (symplectic) Euler for second-order systems.
///
/// The state must be laid out as `[q_0..q_n, v_0..v_n]` with
/// `dq_i/dt = v_i`. Velocities are advanced first and the positions are
/// then advanced with the *updated* velocities.
pub struct SemiImplicitEuler<T: Scalar> {
    deriv: Vec<T>,
}

impl<T: Scalar> SemiImplicitEuler<T> {
    pub fn new(dim: usize) -> Self {
        debug_assert!(dim % 2 == 0, "semi-implicit Euler needs [positions, velocities]");
        Self {
            deriv: vec![T::zero(); dim],
        }
    }
}

impl<T: Scalar> Steppable<T> for SemiImplicitEuler<T> {
    fn step(&mut self, system: &impl DynamicalSystem<T>, t: &mut T, state: &mut [T], dt: T) {
        let half = state.len() / 2;
        system.apply(*t, state, &mut self.deriv);

        for i in half..state.len() {
            state[i] = state[i] + self.deriv[i] * dt;
        }
        for i in 0..half {
            state[i] = state[i] + state[half + i] * dt;
        }

        *t = *t + dt;
    }
}

#[cfg(test)]
mod tests {
    use super::{SemiImplicitEuler, RK4};
    use crate::traits::{DynamicalSystem, Scalar, Steppable};

    struct Decay {
        rate: f64,
    }

    impl DynamicalSystem<f64> for Decay {
        fn dimension(&self) -> usize {
            1
        }

        fn apply(&self, _t: f64, x: &[f64], out: &mut [f64]) {
            out[0] = -self.rate * x[0];
        }
    }

    /// x'' = -x, laid out as [x, v].
    struct Oscillator;

    impl DynamicalSystem<f64> for Oscillator {
        fn dimension(&self) -> usize {
            2
        }

        fn apply(&self, _t: f64, x: &[f64], out: &mut [f64]) {
            out[0] = x[1];
            out[1] = -x[0];
        }
    }

    #[test]
    fn rk4_matches_exponential_decay() {
        let system = Decay { rate: 2.0 };
        let mut solver = RK4::new(1);
        let mut t = 0.0;
        let mut state = vec![1.0];
        for _ in 0..100 {
            solver.step(&system, &mut t, &mut state, 0.01);
        }
        assert!((t - 1.0).abs() < 1e-12);
        assert!((state[0] - (-2.0_f64).exp()).abs() < 1e-9);
    }

    #[test]
    fn derivative_allocates_the_vector_field() {
        let system = Decay { rate: 2.0 };
        assert_eq!(system.derivative(0.0, &[3.0]), vec![-6.0]);
        assert_eq!(f32::of(0.25), 0.25_f32);
    }

    #[test]
    fn semi_implicit_euler_uses_updated_velocity() {
        let mut solver = SemiImplicitEuler::new(2);
        let mut t = 0.0;
        let mut state = vec![1.0, 0.0];
        solver.step(&Oscillator, &mut t, &mut state, 0.1);
        // v1 = 0 - 0.1 * 1 = -0.1, x1 = 1 + 0.1 * v1
        assert!((state[1] + 0.1).abs() < 1e-15);
        assert!((state[0] - 0.99).abs() < 1e-15);
        assert!((t - 0.1).abs() < 1e-15);
    }

    #[test]
    fn semi_implicit_euler_keeps_oscillator_energy_bounded() {
        let mut solver = SemiImplicitEuler::new(2);
        let mut t = 0.0;
        let mut state = vec![1.0, 0.0];
        for _ in 0..10_000 {
            solver.step(&Oscillator, &mut t, &mut state, 0.01);
        }
        let energy = 0.5 * (state[0] * state[0] + state[1] * state[1]);
        assert!((energy - 0.5).abs() < 0.01);
    }
}
