//! Core types and trait definitions for the Gatehouse access-control service.
//!
//! This crate is deliberately free of HTTP and database dependencies. The
//! access state machine, shift audit rules and OTP checks are pure functions
//! over snapshots; storage backends load the snapshot and commit the result
//! inside one transaction.

pub mod access;
pub mod clock;
pub mod equipment;
pub mod error;
pub mod mail;
pub mod notify;
pub mod otp;
pub mod person;
pub mod shift;
pub mod store;

pub use error::{Rejection, Result};
