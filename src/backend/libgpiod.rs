use log::{debug, warn};
use std::path::PathBuf;
use std::time::Duration;

use libgpiod::{chip::Chip, line, request};

use crate::config::{EdgePolicy, EventClock, Level};
use crate::error::AppError;
use crate::gpio::{EdgeEvent, EdgeKind, GpioBackend, GpioChip, InputLine, OutputLine};

// One event per read: edges are consumed as the loop asks for them and
// never collected in user space.
const LIBGPIOD_BACKEND_EVENT_BUFFER_CAPACITY: usize = 1;

pub struct LibgpiodBackend;

impl LibgpiodBackend {
    pub fn new() -> Result<Self, AppError> {
        Ok(Self)
    }
}

impl GpioBackend for LibgpiodBackend {
    type Chip = LibgpiodChip;

    fn open_controller(&self, device_path: &str) -> Result<LibgpiodChip, AppError> {
        let p = PathBuf::from(device_path);
        let chip = Chip::open(&p)
            .map_err(|e| AppError::DeviceUnavailable(format!("open chip {device_path}: {e}")))?;
        let num_lines = chip
            .info()
            .map_err(|e| AppError::DeviceUnavailable(format!("chip info {device_path}: {e}")))?
            .num_lines();
        debug!("opened {device_path} with {num_lines} lines");

        Ok(LibgpiodChip {
            path: device_path.to_string(),
            num_lines,
            chip: Some(chip),
        })
    }
}

pub struct LibgpiodChip {
    path: String,
    num_lines: usize,
    chip: Option<Chip>,
}

impl LibgpiodChip {
    fn check_offset(&self, offset: u32) -> Result<(), AppError> {
        if offset as usize >= self.num_lines {
            return Err(AppError::InvalidOffset(format!(
                "line {offset} on {} (chip has {} lines)",
                self.path, self.num_lines
            )));
        }
        Ok(())
    }

    fn request_line(
        &self,
        offset: u32,
        settings: line::Settings,
        label: &str,
    ) -> Result<request::Request, AppError> {
        let chip = self
            .chip
            .as_ref()
            .ok_or_else(|| AppError::Released(format!("controller {}", self.path)))?;

        let mut line_cfg =
            line::Config::new().map_err(|e| AppError::LineUnavailable(format!("line config: {e}")))?;
        line_cfg
            .add_line_settings(&[offset], settings)
            .map_err(|e| AppError::LineUnavailable(format!("line config add settings: {e}")))?;

        let mut req_cfg = request::Config::new()
            .map_err(|e| AppError::LineUnavailable(format!("request config: {e}")))?;
        req_cfg
            .set_consumer(label)
            .map_err(|e| AppError::LineUnavailable(format!("request consumer: {e}")))?;

        chip.request_lines(Some(&req_cfg), &line_cfg).map_err(|e| {
            AppError::LineUnavailable(format!("request line {offset} on {}: {e}", self.path))
        })
    }

    fn input_settings(policy: EdgePolicy, clock: EventClock) -> Result<line::Settings, AppError> {
        let mut ls = line::Settings::new()
            .map_err(|e| AppError::LineUnavailable(format!("libgpiod settings: {e}")))?;

        let edge = match policy {
            EdgePolicy::Rising => line::Edge::Rising,
            EdgePolicy::Falling => line::Edge::Falling,
            EdgePolicy::Both => line::Edge::Both,
        };
        let clock = match clock {
            EventClock::Monotonic => line::EventClock::Monotonic,
            EventClock::Realtime => line::EventClock::Realtime,
        };

        ls.set_direction(line::Direction::Input)
            .map_err(|e| AppError::LineUnavailable(format!("set direction: {e}")))?;
        ls.set_edge_detection(Some(edge))
            .map_err(|e| AppError::LineUnavailable(format!("set edge detection: {e}")))?;
        ls.set_event_clock(clock)
            .map_err(|e| AppError::LineUnavailable(format!("set event clock: {e}")))?;
        Ok(ls)
    }

    fn output_settings(initial: Level) -> Result<line::Settings, AppError> {
        let mut ls = line::Settings::new()
            .map_err(|e| AppError::LineUnavailable(format!("libgpiod settings: {e}")))?;

        ls.set_direction(line::Direction::Output)
            .map_err(|e| AppError::LineUnavailable(format!("set direction: {e}")))?;
        ls.set_drive(line::Drive::PushPull)
            .map_err(|e| AppError::LineUnavailable(format!("set drive: {e}")))?;
        ls.set_output_value(to_value(initial))
            .map_err(|e| AppError::LineUnavailable(format!("set output value: {e}")))?;
        Ok(ls)
    }
}

impl GpioChip for LibgpiodChip {
    type Input = LibgpiodInput;
    type Output = LibgpiodOutput;

    fn path(&self) -> &str {
        &self.path
    }

    fn request_input(
        &mut self,
        offset: u32,
        policy: EdgePolicy,
        clock: EventClock,
        label: &str,
    ) -> Result<LibgpiodInput, AppError> {
        self.check_offset(offset)?;
        let settings = Self::input_settings(policy, clock)?;
        let request = self.request_line(offset, settings, label)?;
        let buffer = request::Buffer::new(LIBGPIOD_BACKEND_EVENT_BUFFER_CAPACITY)
            .map_err(|e| AppError::LineUnavailable(format!("event buffer: {e}")))?;

        Ok(LibgpiodInput {
            offset,
            request: Some(request),
            buffer,
        })
    }

    fn request_output(
        &mut self,
        offset: u32,
        initial: Level,
        label: &str,
    ) -> Result<LibgpiodOutput, AppError> {
        self.check_offset(offset)?;
        let settings = Self::output_settings(initial)?;
        let request = self.request_line(offset, settings, label)?;

        Ok(LibgpiodOutput {
            offset,
            request: Some(request),
        })
    }

    fn release(&mut self) {
        drop(self.chip.take());
    }

    fn is_released(&self) -> bool {
        self.chip.is_none()
    }
}

pub struct LibgpiodInput {
    offset: u32,
    request: Option<request::Request>, // closed on drop
    buffer: request::Buffer,
}

impl LibgpiodInput {
    fn read_one(&mut self) -> Result<Option<EdgeEvent>, AppError> {
        let offset = self.offset;
        let req = self
            .request
            .as_ref()
            .ok_or_else(|| AppError::Released(format!("input line {offset}")))?;

        let events = req
            .read_edge_events(&mut self.buffer)
            .map_err(|e| AppError::WaitError(format!("read edge events on line {offset}: {e}")))?;

        for evt in events {
            let evt = match evt {
                Ok(e) => e,
                Err(e) => {
                    warn!("skipping unreadable event on line {offset}: {e}");
                    continue;
                }
            };
            let kind = match evt.event_type() {
                Ok(line::EdgeKind::Rising) => EdgeKind::Rising,
                Ok(line::EdgeKind::Falling) => EdgeKind::Falling,
                Err(e) => {
                    warn!("skipping event with unknown edge on line {offset}: {e}");
                    continue;
                }
            };
            return Ok(Some(EdgeEvent {
                offset,
                kind,
                timestamp_ns: u64::try_from(evt.timestamp().as_nanos()).unwrap_or(u64::MAX),
            }));
        }
        Ok(None)
    }

    fn has_event(&self, timeout: Duration) -> Result<bool, AppError> {
        let offset = self.offset;
        self.request
            .as_ref()
            .ok_or_else(|| AppError::Released(format!("input line {offset}")))?
            .wait_edge_events(Some(timeout))
            .map_err(|e| AppError::WaitError(format!("wait edge events on line {offset}: {e}")))
    }
}

impl InputLine for LibgpiodInput {
    fn offset(&self) -> u32 {
        self.offset
    }

    fn wait_event(&mut self, timeout: Duration) -> Result<Option<EdgeEvent>, AppError> {
        if !self.has_event(timeout)? {
            return Ok(None);
        }
        self.read_one()
    }

    fn discard_pending(&mut self) -> Result<usize, AppError> {
        let mut discarded = 0;
        while self.has_event(Duration::ZERO)? {
            if self.read_one()?.is_some() {
                discarded += 1;
            }
        }
        Ok(discarded)
    }

    fn release(&mut self) {
        drop(self.request.take());
    }

    fn is_released(&self) -> bool {
        self.request.is_none()
    }
}

pub struct LibgpiodOutput {
    offset: u32,
    request: Option<request::Request>, // closed on drop
}

impl OutputLine for LibgpiodOutput {
    fn offset(&self) -> u32 {
        self.offset
    }

    fn set_value(&mut self, level: Level) -> Result<(), AppError> {
        let offset = self.offset;
        self.request
            .as_mut()
            .ok_or_else(|| AppError::Released(format!("output line {offset}")))?
            .set_value(offset, to_value(level))
            .map_err(|e| AppError::WriteError(format!("set value on line {offset}: {e}")))?;
        Ok(())
    }

    fn release(&mut self) {
        drop(self.request.take());
    }

    fn is_released(&self) -> bool {
        self.request.is_none()
    }
}

fn to_value(level: Level) -> line::Value {
    match level {
        Level::Low => line::Value::InActive,
        Level::High => line::Value::Active,
    }
}
