//! MDM Crypto Utilities
//!
//! Certificate hashing and parsing, `Mdm-Signature` extraction and device
//! certificate verification.

mod cert;
mod signature;
mod verify;

pub use cert::*;
pub use signature::*;
pub use verify::*;
