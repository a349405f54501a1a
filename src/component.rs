//! # The attribute algebra
//!
//! [`Component`] is the per-block payload carried on every graph element
//! (node and edge). The core is generic over it: it never inspects a
//! component's contents, only combines and splits them through the four
//! operations below. Implementations are supplied by the embedding host
//! (for example, a flux-capacity value in a dynamics simulation) and are
//! trusted to satisfy the algebraic laws documented on each method —
//! the core does not and cannot verify them at runtime.

/// A client-supplied per-block attribute, combined and partitioned by the
/// core's structural mutations so that the sum of element attributes
/// always equals the sum of per-block contributions.
///
/// All four operations are total except [`Component::del`], whose
/// precondition is documented on the method. Implementations should be
/// cheap — these run on every single-block placement and removal.
pub trait Component: Clone {
	/// The canonical component representing `n` lattice cells. `n` may be
	/// zero (the additive identity).
	fn from_length(n: u64) -> Self;

	/// Associatively combines two components.
	///
	/// Laws: `add(a, from_length(0)) == a` for all `a`, and `add` is
	/// associative: `add(add(a, b), c) == add(a, add(b, c))`.
	fn add(a: &Self, b: &Self) -> Self;

	/// The inverse of [`Component::add`] on the right.
	///
	/// Law: `del(add(a, b), b) == a`.
	///
	/// # Precondition
	///
	/// `b` must previously have been combined into the value passed as
	/// `a` via `add`. Calling `del` otherwise is a misuse of the algebra;
	/// per the core's error model this is never trapped by the core —
	/// the component implementation defines the outcome (it may panic,
	/// saturate, or return nonsense, but it must not violate Rust memory
	/// safety).
	fn del(a: &Self, b: &Self) -> Self;

	/// Splits `a` into two parts whose sizes are proportional to `l:r`.
	///
	/// Law: `add(&partition(a, l, r).0, &partition(a, l, r).1) == a`.
	/// Defined for `l + r >= 1`. When one side is zero-length the other
	/// side receives the whole of `a` and the zero side receives
	/// `from_length(0)`.
	///
	/// When *both* `l` and `r` are zero the ratio is undefined; the source
	/// behaviour this specification preserves (see `DESIGN.md`) has
	/// callers pass `max(l, 1)`/`max(r, 1)` instead of a bare `0, 0`,
	/// trading strict proportionality for totality in that one degenerate
	/// case. `Component::partition` itself only needs to special-case a
	/// single zero side (returning `from_length(0)` on that side and the
	/// whole of `a` on the other), never a `0, 0` pair.
	fn partition(a: &Self, l: u64, r: u64) -> (Self, Self);
}

/// A trivial, always-available [`Component`] implementation for tests,
/// doctests, and examples — not gated behind `#[cfg(test)]` since
/// integration tests and doctests need it from outside the crate too.
pub mod test_support {
	use super::Component;

	/// A reference `Component`: an integer "capacity" where
	/// `from_length(n) = 100n`, `add = +`, `del = -`, and `partition`
	/// splits proportionally with a rounded left share.
	#[derive(Debug, Clone, Copy, PartialEq, Eq)]
	pub struct Capacity(pub u64);

	impl Component for Capacity {
		fn from_length(n: u64) -> Self {
			Capacity(100 * n)
		}

		fn add(a: &Self, b: &Self) -> Self {
			Capacity(a.0 + b.0)
		}

		fn del(a: &Self, b: &Self) -> Self {
			Capacity(a.0.saturating_sub(b.0))
		}

		fn partition(a: &Self, l: u64, r: u64) -> (Self, Self) {
			if l == 0 {
				return (Capacity(0), *a);
			}
			if r == 0 {
				return (*a, Capacity(0));
			}
			let left = (a.0 as u128 * l as u128 / (l as u128 + r as u128)) as u64;
			(Capacity(left), Capacity(a.0 - left))
		}
	}
}

#[cfg(test)]
mod tests {
	use super::test_support::Capacity;
	use super::Component;

	#[test]
	fn add_identity() {
		let a = Capacity::from_length(3);
		assert_eq!(Component::add(&a, &Capacity::from_length(0)), a);
	}

	#[test]
	fn del_inverts_add() {
		let a = Capacity::from_length(3);
		let b = Capacity::from_length(2);
		let combined = Component::add(&a, &b);
		assert_eq!(Component::del(&combined, &b), a);
	}

	#[test]
	fn partition_conserves_total() {
		let a = Capacity::from_length(4);
		let (l, r) = Component::partition(&a, 1, 3);
		assert_eq!(Component::add(&l, &r), a);
	}

	#[test]
	fn partition_zero_side_takes_all() {
		let a = Capacity::from_length(4);
		let (l, r) = Component::partition(&a, 0, 3);
		assert_eq!(r, a);
		assert_eq!(l, Capacity::from_length(0));
	}
}
