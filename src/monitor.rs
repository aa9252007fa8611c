use log::{debug, info, warn};
use std::fmt;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use crate::config::{Level, MonitorConfig};
use crate::error::AppError;
use crate::gpio::{Action, EdgeEvent, GpioBackend, InputLine, OutputLine, output_action};
use crate::lines::LineBundle;
use crate::shutdown::CancelToken;
use crate::timestamp::format_timestamp;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitOutcome {
    Event(EdgeEvent),
    Timeout,
    Cancelled,
}

/// Counters collected over one monitoring session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MonitorReport {
    pub edges: u64,
    pub actions: u64,
    pub write_failures: u64,
    pub timeouts: u64,
    pub missed: u64,
}

impl fmt::Display for MonitorReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} edges, {} output actions, {} write failures, {} timeouts, {} edges missed during pulses",
            self.edges, self.actions, self.write_failures, self.timeouts, self.missed
        )
    }
}

/// Blocks until an edge arrives, `timeout` expires, or `cancel` is set.
///
/// The driver wait is cut into slices of at most `slice` so that the token
/// is checked regularly even when no timeout is configured.
pub fn wait_for_edge<I: InputLine>(
    input: &mut I,
    timeout: Option<Duration>,
    slice: Duration,
    cancel: &CancelToken,
) -> Result<WaitOutcome, AppError> {
    let deadline = timeout.map(|t| Instant::now() + t);

    loop {
        if cancel.is_cancelled() {
            return Ok(WaitOutcome::Cancelled);
        }

        let wait = match deadline {
            Some(deadline) => {
                let now = Instant::now();
                if now >= deadline {
                    return Ok(WaitOutcome::Timeout);
                }
                (deadline - now).min(slice)
            }
            None => slice,
        };

        if let Some(event) = input.wait_event(wait)? {
            return Ok(WaitOutcome::Event(event));
        }
    }
}

/// High, hold, Low. The hold blocks the calling thread; a failed High write
/// skips the rest of the pulse. The flag tells whether the hold ran.
pub fn pulse<O: OutputLine>(output: &mut O, hold: Duration) -> (bool, Result<(), AppError>) {
    if let Err(e) = output.set_value(Level::High) {
        return (false, Err(e));
    }
    thread::sleep(hold);
    (true, output.set_value(Level::Low))
}

pub struct EdgeMonitor<B: GpioBackend> {
    config: Arc<MonitorConfig>,
    backend: Arc<B>,
}

impl<B: GpioBackend> EdgeMonitor<B> {
    pub fn new(config: Arc<MonitorConfig>, backend: Arc<B>) -> Self {
        Self { config, backend }
    }

    /// Acquires both lines, relays edges until `cancel` is set, then releases
    /// everything. Returns `Ok` only for a cancelled session; lines are
    /// released on every path.
    pub fn run(&self, cancel: &CancelToken) -> Result<MonitorReport, AppError> {
        self.config.validate()?;

        let mut lines = LineBundle::acquire(self.backend.as_ref(), &self.config)?;

        info!(
            "Monitoring GPIO pin {} on {} for {:?} edges, driving pin {} in {:?} mode. Press Ctrl+C to exit.",
            self.config.input_offset,
            self.config.device_path,
            self.config.edge_policy,
            self.config.output_offset,
            self.config.output_mode,
        );

        let result = self.relay(&mut lines, cancel);
        lines.release();

        match &result {
            Ok(report) => info!("Monitor stopped, lines released: {report}"),
            Err(_) => info!("Monitor aborted, lines released"),
        }
        result
    }

    fn relay(
        &self,
        lines: &mut LineBundle<B::Chip>,
        cancel: &CancelToken,
    ) -> Result<MonitorReport, AppError> {
        let (input, output) = lines.lines_mut()?;
        let timeout = self.config.wait_timeout();
        let slice = self.config.poll_interval();
        let mut report = MonitorReport::default();

        loop {
            match wait_for_edge(input, timeout, slice, cancel)? {
                WaitOutcome::Cancelled => return Ok(report),
                WaitOutcome::Timeout => {
                    report.timeouts += 1;
                    info!(
                        "No edge on GPIO pin {} within {} ms",
                        self.config.input_offset,
                        timeout.map(|t| t.as_millis()).unwrap_or_default()
                    );
                }
                WaitOutcome::Event(event) => {
                    report.edges += 1;
                    info!(
                        "{} edge detected on GPIO pin {} at {}",
                        event.kind,
                        event.offset,
                        format_timestamp(event.timestamp_ns, self.config.event_clock)
                    );
                    self.dispatch(&event, input, output, &mut report)?;
                }
            }
        }
    }

    fn dispatch<I: InputLine, O: OutputLine>(
        &self,
        event: &EdgeEvent,
        input: &mut I,
        output: &mut O,
        report: &mut MonitorReport,
    ) -> Result<(), AppError> {
        let hold = self.config.pulse_duration();
        let Some(action) = output_action(self.config.output_mode, event.kind, hold) else {
            debug!("no output action for {} edge", event.kind);
            return Ok(());
        };

        let (held, written) = match action {
            Action::Set(level) => (false, output.set_value(level)),
            Action::Pulse(hold) => pulse(output, hold),
        };
        match written {
            Ok(()) => report.actions += 1,
            Err(e) if e.is_recoverable() => {
                report.write_failures += 1;
                warn!("GPIO pin {}: {e}", output.offset());
            }
            Err(e) => return Err(e),
        }

        // only edges that arrived while the hold blocked the loop are dropped
        if held {
            let missed = input.discard_pending()?;
            if missed > 0 {
                report.missed += missed as u64;
                debug!("{missed} edges arrived during the pulse hold and were dropped");
            }
        }
        Ok(())
    }
}
