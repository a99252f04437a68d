//! # cycle-data
//!
//! Unpaired image data for the cycle-consistent training loop.
//!
//! ## Key Components
//!
//! - [`BatchSource`]: one domain's finite, restartable sequence of batches,
//!   produced one batch at a time; [`Batches`] iterates a pass
//! - [`InMemorySource`]: decoded images held on-device, shuffled (training)
//!   or stable-order (evaluation)
//! - [`SourcePair`]: the A and B sources of one split
//! - [`Augmenter`]: resize → random crop → random horizontal flip
//! - [`for_each_pair`]: drives one epoch of paired batches under a
//!   [`PairingPolicy`]
//! - [`image_io`]: folder loading and tensor ↔ PNG conversion
//!
//! ## Conventions
//!
//! - Batches are `(batch, C, H, W)` `f32` tensors normalized to `[-1, 1]`.
//! - Sources never mutate a returned batch; augmentation produces new
//!   tensors.
//!
//! [`PairingPolicy`]: cycle_core::PairingPolicy

pub mod augment;
pub mod image_io;
pub mod pairing;
pub mod source;

pub use augment::{AugmentConfig, Augmenter};
pub use pairing::for_each_pair;
pub use source::{BatchSource, Batches, InMemorySource, Order, SourcePair};
