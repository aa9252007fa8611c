#[cfg(feature = "hardware-gpio")]
pub mod libgpiod;
pub mod mock;

#[cfg(feature = "hardware-gpio")]
pub use self::libgpiod::LibgpiodBackend;
pub use mock::{MockGpioBackend, ReleaseRecord, ScriptStep, WriteRecord};
