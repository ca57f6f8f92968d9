//! Wire protocol spoken with the remote CLR runtime.
//!
//! # Architecture
//!
//! - **protocol**: Message catalog (scalars, arrays, vector/matrix, control requests)
//! - **codec**: Binary framing of messages over a [`crate::channel`] reader/writer

pub mod codec;
pub mod protocol;
