pub mod backend;
pub mod config;
pub mod error;
pub mod gpio;
pub mod lines;
pub mod monitor;
pub mod shutdown;
pub mod timestamp;

pub use config::{EdgePolicy, EventClock, Level, MonitorConfig, OutputMode};
pub use error::AppError;
pub use gpio::{
    Action, EdgeEvent, EdgeKind, GpioBackend, GpioChip, InputLine, OutputLine, output_action,
};
pub use lines::LineBundle;
pub use monitor::{EdgeMonitor, MonitorReport, WaitOutcome};
pub use shutdown::CancelToken;

#[cfg(feature = "hardware-gpio")]
pub use backend::LibgpiodBackend;
pub use backend::MockGpioBackend;
