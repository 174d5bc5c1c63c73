#![deny(missing_docs)]
//! Support types shared across the `sip-dispatch` workspace.

mod arcstr;

pub use arcstr::*;
