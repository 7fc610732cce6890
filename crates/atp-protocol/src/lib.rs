//! Wire-level types for the ATP control plane: frames, the dual JSON/binary
//! codec, signature verification, and the clock/ID ports shared by every
//! higher-level crate.
//!
//! This crate has no knowledge of sessions, routing, or scheduling — it only
//! knows how a [`Frame`] is shaped and how to get one on and off the wire
//! intact.

pub mod clock;
pub mod codec;
pub mod errors;
pub mod frame;
pub mod sign;

pub use errors::{AtpErrorCode, Error, Result, TaxonomyError};
pub use frame::{ControlStatusKind, Frame, FrameFlag, FrameMeta, FrameType, Payload, QosTier, Window};
