//! Virtual machine module
//!
//! Only the frame surface consumed by context construction lives here.

pub mod frame;

pub use frame::{Frame, MAX_ARGS};
