use std::fmt;
use std::time::Duration;

use crate::config::{EdgePolicy, EventClock, Level, OutputMode};
use crate::error::AppError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EdgeKind {
    Rising,
    Falling,
}

impl EdgeKind {
    pub fn matches(self, policy: EdgePolicy) -> bool {
        match policy {
            EdgePolicy::Rising => self == EdgeKind::Rising,
            EdgePolicy::Falling => self == EdgeKind::Falling,
            EdgePolicy::Both => true,
        }
    }
}

impl fmt::Display for EdgeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EdgeKind::Rising => f.write_str("Rising"),
            EdgeKind::Falling => f.write_str("Falling"),
        }
    }
}

/// A single edge as reported by the driver. `timestamp_ns` is in the clock
/// domain the input line was requested with, not the time it was read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EdgeEvent {
    pub offset: u32,
    pub kind: EdgeKind,
    pub timestamp_ns: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Set(Level),
    Pulse(Duration),
}

/// Maps an edge to what the output line should do. Pulse mode reacts to
/// rising edges only.
pub fn output_action(mode: OutputMode, kind: EdgeKind, hold: Duration) -> Option<Action> {
    match (mode, kind) {
        (OutputMode::Pulse, EdgeKind::Rising) => Some(Action::Pulse(hold)),
        (OutputMode::Pulse, EdgeKind::Falling) => None,
        (OutputMode::Follow, EdgeKind::Rising) => Some(Action::Set(Level::High)),
        (OutputMode::Follow, EdgeKind::Falling) => Some(Action::Set(Level::Low)),
    }
}

pub trait GpioBackend: Send + Sync {
    type Chip: GpioChip;

    fn open_controller(&self, device_path: &str) -> Result<Self::Chip, AppError>;
}

/// Controller handle. Lines requested from it must be released before it.
pub trait GpioChip {
    type Input: InputLine;
    type Output: OutputLine;

    fn path(&self) -> &str;
    fn request_input(
        &mut self,
        offset: u32,
        policy: EdgePolicy,
        clock: EventClock,
        label: &str,
    ) -> Result<Self::Input, AppError>;
    fn request_output(
        &mut self,
        offset: u32,
        initial: Level,
        label: &str,
    ) -> Result<Self::Output, AppError>;
    /// Idempotent.
    fn release(&mut self);
    fn is_released(&self) -> bool;
}

pub trait InputLine {
    fn offset(&self) -> u32;
    /// Blocks for at most `timeout`. `Ok(None)` means nothing arrived.
    fn wait_event(&mut self, timeout: Duration) -> Result<Option<EdgeEvent>, AppError>;
    /// Drops every event already pending on the line and returns how many.
    fn discard_pending(&mut self) -> Result<usize, AppError>;
    /// Idempotent.
    fn release(&mut self);
    fn is_released(&self) -> bool;
}

pub trait OutputLine {
    fn offset(&self) -> u32;
    fn set_value(&mut self, level: Level) -> Result<(), AppError>;
    /// Idempotent.
    fn release(&mut self);
    fn is_released(&self) -> bool;
}
