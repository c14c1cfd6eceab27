//! A round-based engine for secure multi-party computation (MPC).
//!
//! Parties jointly evaluate a function over secret-shared inputs without learning anything but
//! the output. Applications are written once against a protocol suite and run unchanged with
//! different secret-sharing schemes and evaluation strategies.
//!
//! ## Main Components
//!
//! * [`builder`]: Lazily builds a graph of protocols from sequential and parallel blocks.
//! * [`protocol`]: The round-based state machine every protocol implements.
//! * [`engine`]: Evaluates the graph for a single party, exchanging messages once per round.
//! * [`ring`]: Modular arithmetic over `Z/2^k` and small moduli.
//! * [`suite`]: Protocol suites implementing arithmetic on secret-shared values.
//! * [`broadcast`] and [`commitment`]: Consistent broadcast and commit-then-open among parties.
//! * [`channel`] and [`network`]: Communication abstractions for exchanging data between parties.
//! * [`pool`]: Identity, randomness and suite state of a party.
//!
//! ## Basic Usage
//!
//! To run a computation, each participating party needs to:
//!
//! 1. Set up a [`channel::Channel`] to the other parties and wrap it in a [`network::Network`]
//! 2. Create a [`pool::ResourcePool`] with its generators and the suite state
//! 3. Call [`engine::Engine::run`] with a function that builds the computation
//!
//! For simulated environments (testing/development), [`simulation::simulate`] runs all parties
//! in one process.
//!
//! ## Example
//!
//! ```
//! use conclave::{
//!     config::EngineConfig,
//!     ring::Ring,
//!     simulation::{seeded_pools, simulate},
//!     suite::dummy::{DummyState, DummySuite},
//! };
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> Result<(), conclave::error::Error> {
//! let ring = Ring::modulo(13)?;
//! let pools = seeded_pools(2, 0, |_| DummyState::new(ring))?;
//! let outputs = simulate::<DummySuite, _, _>(&EngineConfig::default(), pools, |b| {
//!     let x = b.input(0, (b.party_id() == 0).then_some(7))?;
//!     let y = b.input(1, (b.party_id() == 1).then_some(6))?;
//!     let product = b.mult(x, y);
//!     Ok(b.open(product))
//! })
//! .await?;
//! assert!(outputs.iter().all(|v| v.value() == 3));
//! # Ok(())
//! # }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod broadcast;
pub mod builder;
pub mod channel;
pub mod commitment;
pub mod config;
mod dag;
pub mod engine;
pub mod error;
mod evaluator;
pub mod network;
pub mod pool;
pub mod protocol;
pub mod ring;
pub mod simulation;
pub mod suite;

pub use evaluator::EvaluationStats;
