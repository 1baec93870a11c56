//! Data models for Lockbox

mod lockbox;

pub use lockbox::{LockBox, LockBoxInput, PayloadField};
