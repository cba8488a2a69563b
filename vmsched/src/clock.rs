/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Virtual simulation clock.
//!
//! Every time value in the simulator (deadlines, end times, "now") is a
//! [`SimTime`] measured in virtual seconds from the start of the run.  The
//! clock only moves when the run driver advances it, so identical inputs and
//! seeds always produce identical schedules.

/// Virtual time in seconds since the start of the run.
pub type SimTime = f64;

/// Smallest step the driver uses when it has to move strictly past an
/// instant (reclamation releases a task only when `end_time < now`).
pub const MIN_TICK: SimTime = 1e-6;

/// Monotonic virtual clock owned by the run driver.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct SimClock {
    now: SimTime,
}

impl SimClock {
    /// Clock starting at `t = 0`.
    pub fn new() -> Self {
        Self::default()
    }

    /// Clock starting at an arbitrary instant.
    pub fn starting_at(now: SimTime) -> Self {
        Self { now }
    }

    pub fn now(&self) -> SimTime {
        self.now
    }

    /// Move the clock forward by `delta` seconds.  Negative or NaN deltas are
    /// ignored so the clock never runs backwards.
    pub fn advance(&mut self, delta: SimTime) -> SimTime {
        if delta > 0.0 {
            self.now += delta;
        }
        self.now
    }

    /// Jump to `t` if it lies in the future; otherwise leave the clock alone.
    pub fn advance_to(&mut self, t: SimTime) -> SimTime {
        if t > self.now {
            self.now = t;
        }
        self.now
    }
}
