// Copyright 2023-Present StepRack maintainers
// SPDX-License-Identifier: Apache-2.0
//! Groups of axes and the cooperative motion driver.
//!
//! A [`Group`] is an ordered set of axes belonging to one controller. Its
//! accessors first try the one-shot multi-axis query; if that fails they
//! fall back to per-axis queries, substituting a default for axes that
//! cannot answer, so the result always has one entry per axis in group
//! order.
//!
//! The [`Motion`] iterator is the progress driver: each step samples
//! `(states, positions)` and the sequence ends on the first sample where
//! no axis moves. Callers space the iteration with a [`RateLimiter`] and
//! recover from interruption by issuing [`Group::start_stop`] and
//! draining a fresh iterator.

use crate::axis::Axis;
use crate::controller::Controller;
use crate::error::{Error, Result};
use std::thread;
use std::time::{Duration, Instant};
use steprack_protocol::{PositionRegister, State};
use tracing::{debug, warn};

/// An ordered group of axes on one controller.
pub struct Group {
    ctrl: Controller,
    axes: Vec<Axis>,
    addrs: Vec<u16>,
}

impl Group {
    /// Build a group. All axes must belong to the same controller.
    pub fn new(axes: Vec<Axis>) -> Result<Group> {
        let first = axes
            .first()
            .ok_or_else(|| Error::Usage("empty group".into()))?;
        let ctrl = first.controller().clone();
        if !axes.iter().all(|a| a.controller().same_controller(&ctrl)) {
            return Err(Error::Usage(
                "all axes of a group must belong to the same controller".into(),
            ));
        }
        let addrs = axes.iter().map(Axis::addr).collect();
        Ok(Group { ctrl, axes, addrs })
    }

    pub fn controller(&self) -> &Controller {
        &self.ctrl
    }

    pub fn axes(&self) -> &[Axis] {
        &self.axes
    }

    pub fn addresses(&self) -> &[u16] {
        &self.addrs
    }

    pub fn len(&self) -> usize {
        self.axes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.axes.is_empty()
    }

    /// One-shot fan-out with per-axis fallback. Always returns one entry
    /// per axis, in group order.
    fn fan_out<T: Clone>(
        &self,
        bulk: impl Fn(&Controller, &[u16]) -> Result<Vec<T>>,
        default: T,
    ) -> Vec<T> {
        match bulk(&self.ctrl, &self.addrs) {
            Ok(values) if values.len() == self.addrs.len() => values,
            _ => self
                .addrs
                .iter()
                .map(|addr| {
                    bulk(&self.ctrl, std::slice::from_ref(addr))
                        .ok()
                        .and_then(|mut v| v.pop())
                        .unwrap_or_else(|| default.clone())
                })
                .collect(),
        }
    }

    /// Axis names; an unreadable name becomes an empty string.
    pub fn names(&self) -> Vec<String> {
        self.axes
            .iter()
            .map(|axis| axis.name().unwrap_or_default())
            .collect()
    }

    pub fn get_states(&self) -> Vec<State> {
        self.fan_out(|c, a| c.get_states(a), State::new(0))
    }

    pub fn get_pos(&self) -> Vec<i64> {
        self.fan_out(|c, a| c.get_pos(a, PositionRegister::Axis), 0)
    }

    pub fn get_fpos(&self) -> Vec<i64> {
        self.fan_out(|c, a| c.get_fpos(a, PositionRegister::Axis), 0)
    }

    pub fn get_velocity(&self) -> Vec<f64> {
        self.fan_out(|c, a| c.get_velocity(a), 0.0)
    }

    pub fn get_acctime(&self) -> Vec<f64> {
        self.fan_out(|c, a| c.get_acctime(a), 0.0)
    }

    pub fn get_power(&self) -> Vec<bool> {
        self.fan_out(|c, a| c.get_power(a), false)
    }

    /// Start an atomic absolute move of the whole group.
    pub fn start_move(&self, positions: &[i64]) -> Result<()> {
        self.start_move_with(positions, true, false)
    }

    pub fn start_move_with(&self, positions: &[i64], group: bool, strict: bool) -> Result<()> {
        let pairs = self.pairs(positions)?;
        self.ctrl.move_axes(&pairs, group, strict)
    }

    /// Start an atomic relative move of the whole group.
    pub fn start_rmove(&self, deltas: &[i64]) -> Result<()> {
        self.start_rmove_with(deltas, true, false)
    }

    pub fn start_rmove_with(&self, deltas: &[i64], group: bool, strict: bool) -> Result<()> {
        let pairs = self.pairs(deltas)?;
        self.ctrl.rmove_axes(&pairs, group, strict)
    }

    /// Stop every axis of the group.
    pub fn start_stop(&self) -> Result<()> {
        self.ctrl.stop(&self.addrs)
    }

    fn pairs(&self, values: &[i64]) -> Result<Vec<(u16, i64)>> {
        if values.len() != self.addrs.len() {
            return Err(Error::Usage(format!(
                "{} values for a group of {} axes",
                values.len(),
                self.addrs.len()
            )));
        }
        Ok(self.addrs.iter().copied().zip(values.iter().copied()).collect())
    }

    pub fn is_moving(&self) -> bool {
        self.get_states().iter().any(State::is_moving)
    }

    /// Poll until no axis moves. Returns false on timeout.
    pub fn wait_stopped(&self, timeout: Option<Duration>, interval: Duration) -> bool {
        let start = Instant::now();
        while self.is_moving() {
            thread::sleep(interval);
            if let Some(limit) = timeout {
                if start.elapsed() > limit {
                    return false;
                }
            }
        }
        true
    }

    /// A fresh motion iterator over this group.
    pub fn motion(&self) -> Motion<'_> {
        Motion {
            group: self,
            done: false,
        }
    }
}

/// Lazy, finite stream of `(states, positions)` samples.
///
/// Terminates after yielding the first sample where no axis reports
/// motion, so a consumer always observes the settled end state.
pub struct Motion<'g> {
    group: &'g Group,
    done: bool,
}

impl Iterator for Motion<'_> {
    type Item = (Vec<State>, Vec<i64>);

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        let states = self.group.get_states();
        let positions = self.group.get_pos();
        if !states.iter().any(State::is_moving) {
            self.done = true;
        }
        Some((states, positions))
    }
}

/// Paces a polling loop: [`RateLimiter::pace`] sleeps whatever remains of
/// the period since the previous call.
pub struct RateLimiter {
    period: Duration,
    last: Option<Instant>,
}

impl RateLimiter {
    pub fn new(period: Duration) -> RateLimiter {
        RateLimiter { period, last: None }
    }

    pub fn pace(&mut self) {
        if let Some(last) = self.last {
            let nap = self.period.saturating_sub(last.elapsed());
            if !nap.is_zero() {
                thread::sleep(nap);
            }
        }
        self.last = Some(Instant::now());
    }
}

/// Scoped power acquisition.
///
/// On entry, axes whose measured power state differs from the desired one
/// are flipped; on drop (normal or error path) exactly those are flipped
/// back. Nesting is safe because each scope operates on measured, not
/// desired, deltas.
pub struct PowerGuard<'g> {
    group: &'g Group,
    flipped: Vec<u16>,
    desired: bool,
    released: bool,
}

/// Ensure every axis of the group is powered on for the duration of the
/// returned guard.
pub fn ensure_power(group: &Group) -> Result<PowerGuard<'_>> {
    ensure_power_state(group, true)
}

/// Ensure every axis of the group has the desired power state for the
/// duration of the returned guard.
pub fn ensure_power_state(group: &Group, desired: bool) -> Result<PowerGuard<'_>> {
    let current = group.get_power();
    let flipped: Vec<u16> = group
        .addresses()
        .iter()
        .zip(&current)
        .filter(|(_, state)| **state != desired)
        .map(|(addr, _)| *addr)
        .collect();
    if !flipped.is_empty() {
        debug!(axes = ?flipped, desired, "flipping power");
        group.controller().set_power(&flipped, desired)?;
    }
    Ok(PowerGuard {
        group,
        flipped,
        desired,
        released: false,
    })
}

impl PowerGuard<'_> {
    /// Axes this scope changed on entry.
    pub fn flipped(&self) -> &[u16] {
        &self.flipped
    }

    fn restore_inner(&mut self) -> Result<()> {
        if self.released {
            return Ok(());
        }
        self.released = true;
        if self.flipped.is_empty() {
            return Ok(());
        }
        debug!(axes = ?self.flipped, desired = !self.desired, "restoring power");
        self.group.controller().set_power(&self.flipped, !self.desired)
    }

    /// Restore the entry power state now, surfacing any error.
    pub fn restore(mut self) -> Result<()> {
        self.restore_inner()
    }
}

impl Drop for PowerGuard<'_> {
    fn drop(&mut self) {
        if let Err(e) = self.restore_inner() {
            warn!("failed to restore power state: {e}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rate_limiter_spaces_iterations() {
        let period = Duration::from_millis(30);
        let mut limiter = RateLimiter::new(period);
        limiter.pace(); // first call never sleeps
        let start = Instant::now();
        limiter.pace();
        limiter.pace();
        assert!(start.elapsed() >= Duration::from_millis(55));
    }

    #[test]
    fn rate_limiter_does_not_sleep_when_late() {
        let mut limiter = RateLimiter::new(Duration::from_millis(10));
        limiter.pace();
        thread::sleep(Duration::from_millis(20));
        let start = Instant::now();
        limiter.pace();
        assert!(start.elapsed() < Duration::from_millis(5));
    }
}
