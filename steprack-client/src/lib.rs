// Copyright 2023-Present StepRack maintainers
// SPDX-License-Identifier: Apache-2.0
#![cfg_attr(not(test), deny(clippy::panic))]
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]
#![cfg_attr(not(test), deny(clippy::todo))]
#![cfg_attr(not(test), deny(clippy::unimplemented))]

//! Host-side client for StepRack multi-axis stepper controllers.
//!
//! The controller speaks a line-oriented ASCII protocol over TCP (default
//! port 5000); a system holds up to 16 racks of 8 drivers, addressed as
//! `rack*10 + index`. This crate provides:
//!
//! - [`Controller`]: system-level command surface (discovery, multi-axis
//!   queries and moves, racks, firmware programming primitives);
//! - [`Axis`]: per-axis command surface (registers, motion, homing,
//!   tracking, table uploads);
//! - [`Group`] and the motion driver: ordered multi-axis groups, a
//!   `(states, positions)` progress iterator, the `ensure_power` scope and
//!   a rate limiter;
//! - [`backup`] and [`firmware`]: the operator flows built on top.
//!
//! ```no_run
//! use steprack_client::Controller;
//! use steprack_protocol::PositionRegister;
//!
//! fn main() -> steprack_client::Result<()> {
//!     let ctrl = Controller::from_url("tcp://rack03:5000")?;
//!     let alive = ctrl.find_axes(true)?;
//!     let pos = ctrl.get_pos(&alive, PositionRegister::Axis)?;
//!     println!("{alive:?} at {pos:?}");
//!     Ok(())
//! }
//! ```
//!
//! All I/O is blocking; one request is in flight per controller at any
//! time. Handles ([`Controller`], [`Axis`]) are cheap clones over a shared
//! session and safe to use from several threads.

pub mod backup;
pub mod firmware;

mod axis;
mod controller;
mod endpoint;
mod error;
mod parse;
mod session;
mod tcp;

pub mod group;

pub use axis::{Axis, ECAM_TABLE_MAX_WORDS};
pub use controller::Controller;
pub use endpoint::Endpoint;
pub use error::{Error, Result};
pub use group::{ensure_power, ensure_power_state, Group, Motion, PowerGuard, RateLimiter};
pub use session::{Reply, Session};

use std::sync::{Mutex, MutexGuard};

/// Lock a mutex, panicking on poisoning.
///
/// Poisoning only happens when another thread panicked while holding the
/// lock; there is no session state worth salvaging at that point.
pub(crate) trait MutexExt<T> {
    fn lock_or_panic(&self) -> MutexGuard<'_, T>;
}

impl<T> MutexExt<T> for Mutex<T> {
    #[inline(always)]
    #[track_caller]
    fn lock_or_panic(&self) -> MutexGuard<'_, T> {
        #[allow(clippy::unwrap_used)]
        #[allow(clippy::panic)]
        self.lock().unwrap()
    }
}
