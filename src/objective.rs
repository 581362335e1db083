//! The contract between the t-walk engine and a statistical model.

/// An unnormalized target distribution in negative-log-energy form.
///
/// The engine drives the chain toward the stationary distribution
/// `exp(-U(x))`, where `U` is [`Objective::energy`]. Implementations may keep
/// derived per-candidate state (the age-depth model caches its section ages);
/// such state is refreshed by [`Objective::is_admissible`], which is why
/// `energy` may only be called immediately after a successful admissibility
/// check of the same vector. The engine upholds this ordering.
pub trait Objective {
    /// Dimension of the parameter space, fixed for the model's lifetime.
    fn dim(&self) -> usize;

    /// Whether `x` lies in the support of the target.
    ///
    /// May refresh model-internal derived state for `x` as a side effect.
    /// Calling it repeatedly on the same vector must keep returning the same
    /// answer and must not modify `x`.
    fn is_admissible(&mut self, x: &[f64]) -> bool;

    /// Negative log of the unnormalized target density at `x`.
    ///
    /// Only valid immediately after `is_admissible(x)` returned `true`.
    /// `prime` says which of the two walkers is being evaluated, for
    /// implementations that keep per-walker bookkeeping.
    fn energy(&mut self, x: &[f64], prime: bool) -> f64;

    /// Diagnostic hook invoked when a proposal for the given walker is
    /// accepted. Must not affect sampling semantics.
    fn accepted(&mut self, _prime: bool) {}

    /// Diagnostic hook invoked when a proposal for the given walker is
    /// rejected. Must not affect sampling semantics.
    fn rejected(&mut self, _prime: bool) {}
}
