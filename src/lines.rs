use log::{debug, warn};
use std::sync::atomic::{AtomicBool, Ordering};

use crate::config::MonitorConfig;
use crate::error::AppError;
use crate::gpio::{GpioBackend, GpioChip, InputLine, OutputLine};

/// Controller plus the two lines the monitor owns. Fields are dropped in
/// reverse acquisition order by `release`.
pub struct LineBundle<C: GpioChip> {
    chip: Option<C>,
    input: Option<C::Input>,
    output: Option<C::Output>,
    released: AtomicBool,
}

impl<C: GpioChip> LineBundle<C> {
    /// Opens the controller and requests both lines. Anything acquired before
    /// a failing step is released before the error is returned.
    pub fn acquire<B>(backend: &B, config: &MonitorConfig) -> Result<Self, AppError>
    where
        B: GpioBackend<Chip = C>,
    {
        let chip = backend.open_controller(&config.device_path)?;
        let mut bundle = Self {
            chip: Some(chip),
            input: None,
            output: None,
            released: AtomicBool::new(false),
        };

        if let Err(e) = bundle.request_lines(config) {
            warn!("line acquisition failed, rolling back: {e}");
            bundle.release();
            return Err(e);
        }

        Ok(bundle)
    }

    fn request_lines(&mut self, config: &MonitorConfig) -> Result<(), AppError> {
        let chip = self
            .chip
            .as_mut()
            .ok_or_else(|| AppError::Released("controller".into()))?;

        let input = chip.request_input(
            config.input_offset,
            config.edge_policy,
            config.event_clock,
            &config.consumer,
        )?;
        debug!("requested input line {} on {}", input.offset(), chip.path());
        self.input = Some(input);

        let output =
            chip.request_output(config.output_offset, config.initial_level, &config.consumer)?;
        debug!("requested output line {} on {}", output.offset(), chip.path());
        self.output = Some(output);

        Ok(())
    }

    pub fn lines_mut(&mut self) -> Result<(&mut C::Input, &mut C::Output), AppError> {
        match (self.input.as_mut(), self.output.as_mut()) {
            (Some(input), Some(output)) => Ok((input, output)),
            _ => Err(AppError::Released("input or output line".into())),
        }
    }

    pub fn is_released(&self) -> bool {
        self.released.load(Ordering::Acquire)
    }

    /// Releases output, input, then controller. Only the first call does
    /// anything; it returns whether this call performed the release.
    pub fn release(&mut self) -> bool {
        if self
            .released
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return false;
        }

        if let Some(mut output) = self.output.take() {
            output.release();
            debug!("released output line {}", output.offset());
        }
        if let Some(mut input) = self.input.take() {
            input.release();
            debug!("released input line {}", input.offset());
        }
        if let Some(mut chip) = self.chip.take() {
            chip.release();
            debug!("released controller {}", chip.path());
        }
        true
    }
}

impl<C: GpioChip> Drop for LineBundle<C> {
    fn drop(&mut self) {
        self.release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::mock::{MockGpioBackend, ReleaseRecord};

    fn config() -> MonitorConfig {
        MonitorConfig {
            input_offset: 3,
            output_offset: 4,
            ..MonitorConfig::default()
        }
    }

    #[test]
    fn release_runs_once_in_reverse_order() {
        let backend = MockGpioBackend::new(8);
        let mut bundle = LineBundle::acquire(&backend, &config()).expect("acquire");

        assert!(bundle.release());
        assert!(!bundle.release());
        assert!(bundle.is_released());
        assert!(bundle.lines_mut().is_err());
        drop(bundle);

        assert_eq!(
            backend.releases(),
            vec![
                ReleaseRecord::Output(4),
                ReleaseRecord::Input(3),
                ReleaseRecord::Chip,
            ]
        );
    }

    #[test]
    fn drop_releases_everything() {
        let backend = MockGpioBackend::new(8);
        {
            let _bundle = LineBundle::acquire(&backend, &config()).expect("acquire");
            assert!(backend.is_claimed(3));
            assert!(backend.is_claimed(4));
        }
        assert!(!backend.is_claimed(3));
        assert!(!backend.is_claimed(4));
        assert_eq!(backend.releases().len(), 3);
    }

    #[test]
    fn output_failure_rolls_back_input() {
        let backend = MockGpioBackend::new(8);
        backend.claim_externally(4);

        let err = LineBundle::acquire(&backend, &config())
            .err()
            .expect("output line is busy");
        assert!(matches!(err, AppError::LineUnavailable(_)));
        assert!(!backend.is_claimed(3));
        assert_eq!(
            backend.releases(),
            vec![ReleaseRecord::Input(3), ReleaseRecord::Chip]
        );
    }

    #[test]
    fn invalid_input_offset_releases_controller() {
        let backend = MockGpioBackend::new(2);

        let err = LineBundle::acquire(&backend, &config())
            .err()
            .expect("offset out of range");
        assert!(matches!(err, AppError::InvalidOffset(_)));
        assert_eq!(backend.releases(), vec![ReleaseRecord::Chip]);
    }

    #[test]
    fn missing_device_acquires_nothing() {
        let backend = MockGpioBackend::new(8);
        let cfg = MonitorConfig {
            device_path: "/dev/gpiochip9".into(),
            ..config()
        };

        let err = LineBundle::acquire(&backend, &cfg)
            .err()
            .expect("no such device");
        assert!(matches!(err, AppError::DeviceUnavailable(_)));
        assert!(backend.releases().is_empty());
    }
}
