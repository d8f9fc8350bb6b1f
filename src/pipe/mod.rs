//! Buffer chains and the upstream pipe pump (C6, C9; spec §4.4).
//!
//! The source keeps buffers as a singly-linked chain of ref-counted blocks so
//! a chunk can be shared between the read side and the write side without a
//! copy. Safe Rust has no shared mutable ref-counted buffer without
//! `Rc`/`Arc`, so each block here is an `Arc<Vec<u8>>` slice window
//! (`start`/`end`) - cloning a block is a refcount bump, same as the source's
//! "shadow buffer", and a fully-drained block is dropped from the chain
//! exactly like the source recycles it back to the free list.

mod buffer;
mod upstream;

pub use buffer::{Buf, Chain};
pub use upstream::{PipeError, PumpOutcome, UpstreamPipe};
