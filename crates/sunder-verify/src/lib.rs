//! # sunder-verify — The "Law" of SUNDER
//!
//! Kani proof harnesses for the lattice laws the engine's termination
//! argument rests on: combine is an idempotent upper bound, and a
//! widened bound never moves again. Unit tests sample these properties;
//! the harnesses prove them for all inputs via symbolic execution.
//!
//! Run with `cargo kani -p sunder-verify`.

extern crate sunder_domain;

#[cfg(kani)]
use sunder_domain::interval::{ExtInt, Interval};

#[cfg(kani)]
mod proofs {
    use super::*;

    /// A symbolic non-empty interval with unconstrained finite bounds,
    /// optionally open on either side.
    fn any_interval() -> Interval {
        let lo = if kani::any() {
            ExtInt::NegInf
        } else {
            ExtInt::Finite(kani::any())
        };
        let hi = if kani::any() {
            ExtInt::PosInf
        } else {
            ExtInt::Finite(kani::any())
        };
        match Interval::new(lo, hi) {
            Some(interval) => interval,
            None => {
                kani::assume(false);
                Interval::top()
            }
        }
    }

    /// **Proof: join is idempotent.** Combining a summary with itself
    /// gains nothing: this is what lets a worker drop redelivered
    /// messages as no new information.
    #[kani::proof]
    fn verify_join_idempotent() {
        let a = any_interval();
        assert_eq!(a.join(&a), a);
    }

    /// **Proof: join is an upper bound of both operands.** The merged
    /// summary covers everything either operand covered, so dropping
    /// the operands after a combine never loses reachable states.
    #[kani::proof]
    fn verify_join_upper_bound() {
        let a = any_interval();
        let b = any_interval();
        let joined = a.join(&b);
        assert!(joined.contains(&a));
        assert!(joined.contains(&b));
    }

    /// **Proof: join is commutative.** Messages from different senders
    /// arrive in no particular order; the fixpoint must not depend on it.
    #[kani::proof]
    fn verify_join_commutative() {
        let a = any_interval();
        let b = any_interval();
        assert_eq!(a.join(&b), b.join(&a));
    }

    /// **Proof: widening stabilizes.** Once a bound has been widened to
    /// infinity it cannot move again, so any ascending chain of
    /// summaries on a fixed edge settles after at most two widenings.
    #[kani::proof]
    fn verify_widen_stabilizes() {
        let a = any_interval();
        let b = any_interval();
        let c = any_interval();
        let once = a.widen(&b);
        let twice = once.widen(&once.join(&c));
        // A bound that survived the first widening was not growing; a
        // bound that grew is already infinite.
        assert_eq!(twice.widen(&twice.join(&c)), twice);
    }

    /// **Proof: widening is an upper bound of its old operand.** The
    /// widened summary still covers everything previously known.
    #[kani::proof]
    fn verify_widen_covers_old() {
        let a = any_interval();
        let b = any_interval();
        assert!(a.widen(&b).contains(&a));
    }
}
