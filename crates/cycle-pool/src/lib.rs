//! # cycle-pool
//!
//! The discriminator history buffer ("image pool").
//!
//! Each domain keeps up to `capacity` previously generated samples. Once the
//! buffer is full, every insertion either swaps the new sample for a random
//! stored one (returning the old sample) or passes the new sample straight
//! through. Training the discriminators on this mix instead of only the
//! newest generator output keeps them from chasing the generator's
//! instantaneous distribution.
//!
//! ## Key Components
//!
//! - [`ImagePool`]: the bounded buffer, generic over the stored item
//! - [`ReplaySource`]: injected randomness (replay decision + slot choice)
//! - [`RandomReplay`]: seeded production source (p = 0.5, uniform slot)
//! - [`FixedReplay`]: deterministic source for scripted runs
//!
//! ## Architecture Rules
//!
//! - Only detached samples are stored; the pool never owns model state.
//! - Mutated from the orchestration thread only.

pub mod pool;
pub mod replay;

pub use pool::ImagePool;
pub use replay::{FixedReplay, RandomReplay, ReplaySource};
