//! Protocol suites offering arithmetic on secret-shared ring elements.
//!
//! * [`dummy`] keeps every value in the clear and is used to test applications and the engine.
//! * [`additive`] is a passively secure additive secret-sharing scheme over `Z/2^(k+s)` with
//!   preprocessing supplied by a [`dealer::FakeDealer`].

pub mod additive;
pub mod dealer;
pub mod dummy;

use crate::{dag::Deferred, protocol::Suite, ring::RingElement};

/// A suite that can share, combine and open ring elements.
///
/// Every constructor returns a protocol of the suite; [`crate::builder::Builder`] offers typed
/// helpers that register them with the right dependencies. Except for `open`, the protocols
/// output a [`Numeric::Share`], `open` outputs a [`RingElement`].
pub trait Numeric: Suite {
    /// One party's share of a secret ring element.
    type Share: Clone + Send + 'static;

    /// Shares a value known to all parties.
    fn known(value: RingElement) -> Self::Native;

    /// Shares a private input of `owner`; the value is only present at the owner.
    fn input(owner: usize, value: Option<RingElement>) -> Self::Native;

    /// `a + b`
    fn add(a: Deferred<Self::Share>, b: Deferred<Self::Share>) -> Self::Native;

    /// `a - b`
    fn sub(a: Deferred<Self::Share>, b: Deferred<Self::Share>) -> Self::Native;

    /// `a * b`
    fn mult(a: Deferred<Self::Share>, b: Deferred<Self::Share>) -> Self::Native;

    /// Reveals a shared value to all parties and records it in the opened value store.
    fn open(a: Deferred<Self::Share>) -> Self::Native;
}
