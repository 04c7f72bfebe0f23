//! MDM Core Types
//!
//! Core types and protocol definitions for Apple MDM: the enrollment identity
//! model, check-in and command codecs, and the per-request context.

mod checkin;
mod command;
mod data;
mod enrollment;
mod error;
mod push;
mod request;

pub use checkin::*;
pub use command::*;
pub use enrollment::*;
pub use error::*;
pub use push::*;
pub use request::*;
