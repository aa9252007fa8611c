use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use parking_lot::Mutex;

use crate::config::{EdgePolicy, EventClock, Level};
use crate::error::AppError;
use crate::gpio::{EdgeEvent, EdgeKind, GpioBackend, GpioChip, InputLine, OutputLine};

const MOCK_DEFAULT_DEVICE: &str = "/dev/gpiochip0";
const MOCK_DEFAULT_NUM_LINES: u32 = 64;

/// One scripted happening on an input line, scheduled relative to the moment
/// the line is requested.
#[derive(Debug, Clone, PartialEq)]
pub enum ScriptStep {
    Edge { after: Duration, kind: EdgeKind },
    Fail { after: Duration, message: String },
}

impl ScriptStep {
    pub fn rising(after_ms: u64) -> Self {
        ScriptStep::Edge {
            after: Duration::from_millis(after_ms),
            kind: EdgeKind::Rising,
        }
    }

    pub fn falling(after_ms: u64) -> Self {
        ScriptStep::Edge {
            after: Duration::from_millis(after_ms),
            kind: EdgeKind::Falling,
        }
    }

    fn after(&self) -> Duration {
        match self {
            ScriptStep::Edge { after, .. } | ScriptStep::Fail { after, .. } => *after,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WriteRecord {
    pub offset: u32,
    pub level: Level,
    pub at: Instant,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReleaseRecord {
    Output(u32),
    Input(u32),
    Chip,
}

struct MockState {
    device_path: String,
    num_lines: u32,
    claimed: HashSet<u32>,
    levels: HashMap<u32, Level>,
    scripts: HashMap<u32, Vec<ScriptStep>>,
    writes: Vec<WriteRecord>,
    releases: Vec<ReleaseRecord>,
    failing_writes: usize,
    failing_at: HashSet<usize>,
    write_attempts: usize,
    started: Instant,
}

/// In-memory controller. Clones share state, so a test can keep one handle
/// for inspection while the monitor owns another.
#[derive(Clone)]
pub struct MockGpioBackend {
    state: Arc<Mutex<MockState>>,
}

impl Default for MockGpioBackend {
    fn default() -> Self {
        Self::with_device(MOCK_DEFAULT_DEVICE, MOCK_DEFAULT_NUM_LINES)
    }
}

impl MockGpioBackend {
    pub fn new(num_lines: u32) -> Self {
        Self::with_device(MOCK_DEFAULT_DEVICE, num_lines)
    }

    pub fn with_device(device_path: &str, num_lines: u32) -> Self {
        Self {
            state: Arc::new(Mutex::new(MockState {
                device_path: device_path.to_string(),
                num_lines,
                claimed: HashSet::new(),
                levels: HashMap::new(),
                scripts: HashMap::new(),
                writes: Vec::new(),
                releases: Vec::new(),
                failing_writes: 0,
                failing_at: HashSet::new(),
                write_attempts: 0,
                started: Instant::now(),
            })),
        }
    }

    /// Replaces the script the next request of `offset` will play back.
    pub fn script_input(&self, offset: u32, steps: Vec<ScriptStep>) {
        self.state.lock().scripts.insert(offset, steps);
    }

    /// Marks a line as held by some other consumer.
    pub fn claim_externally(&self, offset: u32) {
        self.state.lock().claimed.insert(offset);
    }

    /// The next `count` output writes fail.
    pub fn fail_next_writes(&self, count: usize) {
        self.state.lock().failing_writes = count;
    }

    /// The write attempt with zero-based index `index` fails, counted over
    /// the backend's lifetime.
    pub fn fail_write_at(&self, index: usize) {
        self.state.lock().failing_at.insert(index);
    }

    pub fn is_claimed(&self, offset: u32) -> bool {
        self.state.lock().claimed.contains(&offset)
    }

    pub fn level(&self, offset: u32) -> Option<Level> {
        self.state.lock().levels.get(&offset).copied()
    }

    pub fn writes(&self) -> Vec<WriteRecord> {
        self.state.lock().writes.clone()
    }

    pub fn releases(&self) -> Vec<ReleaseRecord> {
        self.state.lock().releases.clone()
    }
}

impl GpioBackend for MockGpioBackend {
    type Chip = MockChip;

    fn open_controller(&self, device_path: &str) -> Result<MockChip, AppError> {
        if self.state.lock().device_path != device_path {
            return Err(AppError::DeviceUnavailable(format!(
                "open chip {device_path}: No such file or directory"
            )));
        }
        Ok(MockChip {
            path: device_path.to_string(),
            state: self.state.clone(),
            released: false,
        })
    }
}

pub struct MockChip {
    path: String,
    state: Arc<Mutex<MockState>>,
    released: bool,
}

impl MockChip {
    fn claim(&self, offset: u32) -> Result<(), AppError> {
        if self.released {
            return Err(AppError::Released(format!("controller {}", self.path)));
        }
        let mut state = self.state.lock();
        if offset >= state.num_lines {
            return Err(AppError::InvalidOffset(format!(
                "line {offset} on {} (chip has {} lines)",
                self.path, state.num_lines
            )));
        }
        if !state.claimed.insert(offset) {
            return Err(AppError::LineUnavailable(format!(
                "line {offset} on {}: Device or resource busy",
                self.path
            )));
        }
        Ok(())
    }
}

impl GpioChip for MockChip {
    type Input = MockInput;
    type Output = MockOutput;

    fn path(&self) -> &str {
        &self.path
    }

    fn request_input(
        &mut self,
        offset: u32,
        policy: EdgePolicy,
        clock: EventClock,
        _label: &str,
    ) -> Result<MockInput, AppError> {
        self.claim(offset)?;
        let script = self
            .state
            .lock()
            .scripts
            .remove(&offset)
            .unwrap_or_default()
            .into_iter()
            .filter(|step| match step {
                ScriptStep::Edge { kind, .. } => kind.matches(policy),
                ScriptStep::Fail { .. } => true,
            })
            .collect();

        Ok(MockInput {
            offset,
            clock,
            script,
            requested_at: Instant::now(),
            state: self.state.clone(),
            released: false,
        })
    }

    fn request_output(
        &mut self,
        offset: u32,
        initial: Level,
        _label: &str,
    ) -> Result<MockOutput, AppError> {
        self.claim(offset)?;
        self.state.lock().levels.insert(offset, initial);
        Ok(MockOutput {
            offset,
            state: self.state.clone(),
            released: false,
        })
    }

    fn release(&mut self) {
        if !self.released {
            self.released = true;
            self.state.lock().releases.push(ReleaseRecord::Chip);
        }
    }

    fn is_released(&self) -> bool {
        self.released
    }
}

pub struct MockInput {
    offset: u32,
    clock: EventClock,
    script: VecDeque<ScriptStep>,
    requested_at: Instant,
    state: Arc<Mutex<MockState>>,
    released: bool,
}

impl MockInput {
    fn due(&self, step: &ScriptStep) -> Instant {
        self.requested_at + step.after()
    }

    fn timestamp_ns(&self, due: Instant) -> u64 {
        match self.clock {
            EventClock::Monotonic => {
                let started = self.state.lock().started;
                u64::try_from(due.saturating_duration_since(started).as_nanos())
                    .unwrap_or(u64::MAX)
            }
            EventClock::Realtime => {
                let late = Instant::now().saturating_duration_since(due);
                SystemTime::now()
                    .duration_since(UNIX_EPOCH)
                    .map(|d| u64::try_from(d.saturating_sub(late).as_nanos()).unwrap_or(u64::MAX))
                    .unwrap_or(0)
            }
        }
    }
}

impl InputLine for MockInput {
    fn offset(&self) -> u32 {
        self.offset
    }

    fn wait_event(&mut self, timeout: Duration) -> Result<Option<EdgeEvent>, AppError> {
        if self.released {
            return Err(AppError::Released(format!("input line {}", self.offset)));
        }

        let Some(due) = self.script.front().map(|step| self.due(step)) else {
            thread::sleep(timeout);
            return Ok(None);
        };

        let now = Instant::now();
        if due > now {
            let remaining = due - now;
            if remaining > timeout {
                thread::sleep(timeout);
                return Ok(None);
            }
            thread::sleep(remaining);
        }

        match self.script.pop_front() {
            Some(ScriptStep::Edge { kind, .. }) => Ok(Some(EdgeEvent {
                offset: self.offset,
                kind,
                timestamp_ns: self.timestamp_ns(due),
            })),
            Some(ScriptStep::Fail { message, .. }) => Err(AppError::WaitError(format!(
                "read edge events on line {}: {message}",
                self.offset
            ))),
            None => Ok(None),
        }
    }

    fn discard_pending(&mut self) -> Result<usize, AppError> {
        if self.released {
            return Err(AppError::Released(format!("input line {}", self.offset)));
        }

        let now = Instant::now();
        let mut discarded = 0;
        while let Some(step) = self.script.front() {
            if !matches!(step, ScriptStep::Edge { .. }) || self.due(step) > now {
                break;
            }
            self.script.pop_front();
            discarded += 1;
        }
        Ok(discarded)
    }

    fn release(&mut self) {
        if !self.released {
            self.released = true;
            let mut state = self.state.lock();
            state.claimed.remove(&self.offset);
            state.releases.push(ReleaseRecord::Input(self.offset));
        }
    }

    fn is_released(&self) -> bool {
        self.released
    }
}

impl Drop for MockInput {
    fn drop(&mut self) {
        self.release();
    }
}

pub struct MockOutput {
    offset: u32,
    state: Arc<Mutex<MockState>>,
    released: bool,
}

impl OutputLine for MockOutput {
    fn offset(&self) -> u32 {
        self.offset
    }

    fn set_value(&mut self, level: Level) -> Result<(), AppError> {
        if self.released {
            return Err(AppError::Released(format!("output line {}", self.offset)));
        }

        let mut state = self.state.lock();
        let attempt = state.write_attempts;
        state.write_attempts += 1;
        let scheduled = state.failing_at.remove(&attempt);
        if scheduled || state.failing_writes > 0 {
            if !scheduled {
                state.failing_writes -= 1;
            }
            return Err(AppError::WriteError(format!(
                "set value on line {}: Input/output error",
                self.offset
            )));
        }
        state.levels.insert(self.offset, level);
        state.writes.push(WriteRecord {
            offset: self.offset,
            level,
            at: Instant::now(),
        });
        Ok(())
    }

    fn release(&mut self) {
        if !self.released {
            self.released = true;
            let mut state = self.state.lock();
            state.claimed.remove(&self.offset);
            state.releases.push(ReleaseRecord::Output(self.offset));
        }
    }

    fn is_released(&self) -> bool {
        self.released
    }
}

impl Drop for MockOutput {
    fn drop(&mut self) {
        self.release();
    }
}

impl Drop for MockChip {
    fn drop(&mut self) {
        self.release();
    }
}
