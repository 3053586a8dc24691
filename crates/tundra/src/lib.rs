//! Umbrella crate that re-exports the tundra engine core building blocks.
//!
//! This crate is intended as a convenient entrypoint: the movement core
//! and the task core are independent, but engines typically use both (the
//! movement tick is commonly driven by a periodic task sleeping on the
//! kernel's time server).

#![cfg_attr(docsrs, feature(doc_cfg))]
#![forbid(unsafe_code)]

#[cfg(feature = "movement")]
#[cfg_attr(docsrs, doc(cfg(feature = "movement")))]
pub use tundra_move as movement;

#[cfg(feature = "task")]
#[cfg_attr(docsrs, doc(cfg(feature = "task")))]
pub use tundra_task as task;

#[cfg(feature = "bevy")]
#[cfg_attr(docsrs, doc(cfg(feature = "bevy")))]
pub use tundra_bevy as bevy;
