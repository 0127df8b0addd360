//! # VL6180X Time-of-Flight Ranging and Ambient Light Sensor Driver
//!
//! This crate provides a `no_std` driver for ST-Microelectronics' VL6180X proximity and
//! ambient light sensor. The driver is blocking by default; enable the `async` feature to
//! build the same API on top of `embedded-hal-async`.
//!
//! ## Basic Usage
//!
//! ```rust,no_run
//! use vl6180x::{AlsGain, VL6180x};
//!
//! let i2c = embedded_hal_mock::eh1::i2c::Mock::new(&[]);
//! let delay = embedded_hal_mock::eh1::delay::NoopDelay;
//!
//! // Construction checks the model ID and loads the default settings.
//! let mut sensor = VL6180x::new(i2c, delay).unwrap();
//!
//! let range_mm = sensor.range().unwrap();
//! if sensor.range_status().unwrap().is_valid() {
//!     println!("Distance: {} mm", range_mm);
//! }
//!
//! let lux = sensor.read_lux(AlsGain::Gain1).unwrap();
//! println!("Light: {} lux", lux);
//! ```
//!
//! ## Sharing the bus
//!
//! The driver owns the I2C device it is given. Every register access is issued as a single
//! bus transaction (a `write` or a repeated-start `write_read`), so when several devices sit
//! on one physical bus, hand each driver a shared-bus device such as
//! `embedded_hal_bus::i2c::RefCellDevice` and the bus lock covers the whole access.
#![no_std]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

mod fmt; // <-- must be first module!

#[cfg(not(feature = "async"))]
use embedded_hal::{delay::DelayNs, i2c::I2c};
#[cfg(feature = "async")]
use embedded_hal_async::{delay::DelayNs, i2c::I2c};

/// The factory-default 7-bit I2C address of the VL6180X.
pub const DEFAULT_ADDRESS: u8 = 0x29;

/// Value of the model identification register for a VL6180X.
pub const MODEL_ID: u8 = 0xB4;

/// Number of slots in the result history buffer.
pub const HISTORY_LEN: usize = 16;

/// Shortest supported inter-measurement period for continuous ranging.
pub const MIN_CONTINUOUS_PERIOD_MS: u16 = 20;

/// Longest supported inter-measurement period for continuous ranging.
pub const MAX_CONTINUOUS_PERIOD_MS: u16 = 2550;

// Calibrated ALS counts to lux at 1x gain and 100 ms integration.
const ALS_LUX_PER_COUNT: f32 = 0.32;
const ALS_INTEGRATION_PERIOD_MS: u16 = 100;

// Settling time after stopping a sensor found ranging continuously at start-up.
const CONTINUOUS_STOP_SETTLE_MS: u32 = 100;

// Start/stop toggle written to SYSRANGE__START and SYSALS__START.
const START_STOP: u8 = 0x01;
const RANGE_START_CONTINUOUS: u8 = 0x03;
const CLEAR_ALL_INTERRUPTS: u8 = 0x07;

const HISTORY_ENABLE: u8 = 0x01;
const HISTORY_MODE_ALS: u8 = 0x02;

const RANGE_DEVICE_READY: u8 = 0x01;
const RANGE_NEW_SAMPLE_READY: u8 = 0x04;

// 3-bit ALS field of SYSTEM__INTERRUPT_CONFIG_GPIO and RESULT__INTERRUPT_STATUS_GPIO.
const ALS_INTERRUPT_SHIFT: u8 = 3;
const ALS_INTERRUPT_MASK: u8 = 0x07 << ALS_INTERRUPT_SHIFT;
const ALS_NEW_SAMPLE_READY: u8 = 0x04;

// Analogue gain register: bit 6 must be set, the light gain sits in bits 0-2.
const ALS_ANALOGUE_GAIN_BASE: u8 = 0x40;

// Private and recommended settings from application note AN4545 ("SR03 settings"), in the
// order they must be written.
const VL6180X_DEFAULT_CONFIGURATION: [(u16, u8); 39] = [
    // mandatory private registers
    (0x0207, 0x01),
    (0x0208, 0x01),
    (0x0096, 0x00),
    (0x0097, 0xFD),
    (0x00E3, 0x00),
    (0x00E4, 0x04),
    (0x00E5, 0x02),
    (0x00E6, 0x01),
    (0x00E7, 0x03),
    (0x00F5, 0x02),
    (0x00D9, 0x05),
    (0x00DB, 0xCE),
    (0x00DC, 0x03),
    (0x00DD, 0xF8),
    (0x009F, 0x00),
    (0x00A3, 0x3C),
    (0x00B7, 0x00),
    (0x00BB, 0x3C),
    (0x00B2, 0x09),
    (0x00CA, 0x09),
    (0x0198, 0x01),
    (0x01B0, 0x17),
    (0x01AD, 0x00),
    (0x00FF, 0x05),
    (0x0100, 0x05),
    (0x0199, 0x05),
    (0x01A6, 0x1B),
    (0x01AC, 0x3E),
    (0x01A7, 0x1F),
    (0x0030, 0x00),
    // recommended public registers
    (0x0011, 0x10), /* GPIO1 polled for new sample ready */
    (0x010A, 0x30), /* averaging sample period */
    (0x003F, 0x46), /* ALS light and dark gain, dark gain must stay */
    (0x0031, 0xFF), /* ranges between auto calibrations */
    (0x0040, 0x63), /* ALS integration time 100 ms */
    (0x002E, 0x01), /* one-off temperature calibration */
    // optional public registers
    (0x001B, 0x09), /* range inter-measurement period 100 ms */
    (0x003E, 0x31), /* ALS inter-measurement period 500 ms */
    (0x0014, 0x24), /* interrupt on new sample ready */
];

/// Register addresses for the VL6180X sensor.
#[repr(u16)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Register {
    /// Identification model ID register (0x000)
    IdentificationModelId = 0x000,
    /// System history control register (0x012)
    SystemHistoryCtrl = 0x012,
    /// System interrupt configuration register (0x014)
    SystemInterruptConfigGpio = 0x014,
    /// System interrupt clear register (0x015)
    SystemInterruptClear = 0x015,
    /// Fresh out of reset register (0x016)
    SystemFreshOutOfReset = 0x016,
    /// Range start register (0x018)
    SysrangeStart = 0x018,
    /// Range inter-measurement period register (0x01B)
    SysrangeIntermeasurementPeriod = 0x01B,
    /// Part-to-part range offset register (0x024)
    SysrangePartToPartRangeOffset = 0x024,
    /// ALS start register (0x038)
    SysalsStart = 0x038,
    /// ALS analogue gain register (0x03F)
    SysalsAnalogueGain = 0x03F,
    /// ALS integration period high byte register (0x040)
    SysalsIntegrationPeriodHi = 0x040,
    /// ALS integration period low byte register (0x041)
    SysalsIntegrationPeriodLo = 0x041,
    /// Result range status register (0x04D)
    ResultRangeStatus = 0x04D,
    /// Result interrupt status register (0x04F)
    ResultInterruptStatusGpio = 0x04F,
    /// Result ALS value register (0x050)
    ResultAlsVal = 0x050,
    /// First result history buffer register (0x052)
    ResultHistoryBuffer0 = 0x052,
    /// Result range value register (0x062)
    ResultRangeVal = 0x062,
}

impl From<Register> for u16 {
    fn from(r: Register) -> Self {
        r as u16
    }
}

/// Analogue gain applied to ambient light readings.
///
/// The discriminants are the codes the sensor expects in its analogue gain register.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum AlsGain {
    /// 20x gain
    Gain20 = 0x00,
    /// 10x gain
    Gain10 = 0x01,
    /// 5x gain
    Gain5 = 0x02,
    /// 2.5x gain
    Gain2_5 = 0x03,
    /// 1.67x gain
    Gain1_67 = 0x04,
    /// 1.25x gain
    Gain1_25 = 0x05,
    /// 1x gain
    Gain1 = 0x06,
    /// 40x gain, the highest code the sensor supports
    Gain40 = 0x07,
}

impl AlsGain {
    /// Returns the nominal multiplier this gain applies to the raw light count.
    #[must_use]
    pub fn multiplier(self) -> f32 {
        match self {
            AlsGain::Gain1 => 1.0,
            AlsGain::Gain1_25 => 1.25,
            AlsGain::Gain1_67 => 1.67,
            AlsGain::Gain2_5 => 2.5,
            AlsGain::Gain5 => 5.0,
            AlsGain::Gain10 => 10.0,
            AlsGain::Gain20 => 20.0,
            AlsGain::Gain40 => 40.0,
        }
    }
}

impl From<AlsGain> for u8 {
    fn from(gain: AlsGain) -> Self {
        gain as u8
    }
}

/// Codes above the 40x code are clamped to [`AlsGain::Gain40`].
impl From<u8> for AlsGain {
    fn from(value: u8) -> Self {
        match value {
            0x00 => AlsGain::Gain20,
            0x01 => AlsGain::Gain10,
            0x02 => AlsGain::Gain5,
            0x03 => AlsGain::Gain2_5,
            0x04 => AlsGain::Gain1_67,
            0x05 => AlsGain::Gain1_25,
            0x06 => AlsGain::Gain1,
            0x07 => AlsGain::Gain40,
            _ => {
                warn!("ALS gain code {} out of range, clamping to 40x", value);
                AlsGain::Gain40
            }
        }
    }
}

/// Error code reported by the sensor for the last range measurement.
///
/// The sensor never raises these as errors on its own. Check [`VL6180x::range_status`]
/// after each range read to decide whether the returned distance can be trusted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum RangeStatus {
    /// Valid measurement
    NoError,
    /// System error 1, VCSEL continuity test failed
    SystemError1,
    /// System error 5, PLL lock failure
    SystemError5,
    /// Early convergence estimate failed
    EceFailure,
    /// No target detected before the maximum convergence time
    NoConvergence,
    /// Ignore threshold check failed
    RangeIgnore,
    /// Ambient conditions too high, signal to noise too low
    Snr,
    /// Raw range result underflow
    RawUnderflow,
    /// Raw range result overflow
    RawOverflow,
    /// Range result below zero after offset correction
    RangeUnderflow,
    /// Range result out of measurable range
    RangeOverflow,
    /// Code not covered above
    Unknown(u8),
}

impl RangeStatus {
    /// Returns `true` when the last range measurement completed without error.
    #[must_use]
    pub fn is_valid(self) -> bool {
        self == RangeStatus::NoError
    }
}

impl From<RangeStatus> for u8 {
    fn from(status: RangeStatus) -> Self {
        match status {
            RangeStatus::NoError => 0,
            RangeStatus::SystemError1 => 1,
            RangeStatus::SystemError5 => 5,
            RangeStatus::EceFailure => 6,
            RangeStatus::NoConvergence => 7,
            RangeStatus::RangeIgnore => 8,
            RangeStatus::Snr => 11,
            RangeStatus::RawUnderflow => 12,
            RangeStatus::RawOverflow => 13,
            RangeStatus::RangeUnderflow => 14,
            RangeStatus::RangeOverflow => 15,
            RangeStatus::Unknown(value) => value,
        }
    }
}

impl From<u8> for RangeStatus {
    fn from(value: u8) -> Self {
        match value {
            0 => RangeStatus::NoError,
            1 => RangeStatus::SystemError1,
            5 => RangeStatus::SystemError5,
            6 => RangeStatus::EceFailure,
            7 => RangeStatus::NoConvergence,
            8 => RangeStatus::RangeIgnore,
            11 => RangeStatus::Snr,
            12 => RangeStatus::RawUnderflow,
            13 => RangeStatus::RawOverflow,
            14 => RangeStatus::RangeUnderflow,
            15 => RangeStatus::RangeOverflow,
            _ => {
                debug!("Unknown range status code: {}", value);
                RangeStatus::Unknown(value)
            }
        }
    }
}

/// How the driver waits on the sensor's status registers.
///
/// Every blocking operation polls a status register until the sensor reports that it is
/// ready. By default the driver polls back-to-back and never gives up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct PollConfig {
    /// Delay between two polls of a status register, `0` polls back-to-back
    pub interval_ms: u32,
    /// Polls before giving up with [`Error::Timeout`], `None` waits forever
    pub max_attempts: Option<u32>,
}

impl PollConfig {
    /// Polls back-to-back until the sensor is ready, however long that takes.
    #[must_use]
    pub const fn unbounded() -> Self {
        Self {
            interval_ms: 0,
            max_attempts: None,
        }
    }

    /// Polls every `interval_ms` and fails after `max_attempts` unsuccessful polls.
    ///
    /// The resulting timeout is roughly `interval_ms * max_attempts` milliseconds.
    #[must_use]
    pub const fn bounded(interval_ms: u32, max_attempts: u32) -> Self {
        Self {
            interval_ms,
            max_attempts: Some(max_attempts),
        }
    }
}

impl Default for PollConfig {
    fn default() -> Self {
        Self::unbounded()
    }
}

/// Construction parameters for [`VL6180x`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Config {
    /// 7-bit I2C address of the sensor
    pub address: u8,
    /// Part-to-part range offset in millimeters, written during initialization
    pub offset_mm: i8,
    /// Status register polling behavior
    pub poll: PollConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            address: DEFAULT_ADDRESS,
            offset_mm: 0,
            poll: PollConfig::default(),
        }
    }
}

/// VL6180X time-of-flight ranging and ambient light sensor driver.
///
/// The driver is generic over the I2C and delay implementations. A value of this type only
/// exists for a sensor that answered with the right model ID and has been initialized.
pub struct VL6180x<I2C, D> {
    /// I2C interface for communication with the sensor
    i2c: I2C,
    /// Delay implementation for timing operations
    delay: D,
    config: Config,
    /// Last offset successfully written to the sensor
    offset_mm: i8,
}

#[maybe_async_cfg::maybe(
    sync(cfg(not(feature = "async")), keep_self),
    async(feature = "async", keep_self)
)]
impl<I2C, E, D> VL6180x<I2C, D>
where
    I2C: I2c<Error = E>,
    E: core::fmt::Debug,
    D: DelayNs,
{
    /// Creates and initializes a driver for a sensor at the default address (0x29) with a
    /// zero range offset.
    ///
    /// See [`with_config`](Self::with_config) for what initialization does.
    ///
    /// # Errors
    ///
    /// * `Err(Error::DeviceNotFound(id))` - If the model ID register did not read `0xB4`
    /// * `Err(Error::I2cError(E))` - If there was an I2C communication error
    ///
    /// # Examples
    ///
    /// ```rust,no_run
    /// use vl6180x::VL6180x;
    ///
    /// let i2c = embedded_hal_mock::eh1::i2c::Mock::new(&[]);
    /// let delay = embedded_hal_mock::eh1::delay::NoopDelay;
    ///
    /// let mut sensor = VL6180x::new(i2c, delay).unwrap();
    /// ```
    pub async fn new(i2c: I2C, delay: D) -> Result<Self, Error<E>> {
        Self::with_config(i2c, delay, Config::default()).await
    }

    /// Creates and initializes a driver with the given configuration.
    ///
    /// Initialization performs, in order:
    /// 1. Reads the model ID register and fails unless it is `0xB4`. Nothing is written to
    ///    a device that does not identify as a VL6180X.
    /// 2. Writes the fixed settings from application note AN4545. Their order matters.
    /// 3. Clears the fresh-out-of-reset flag.
    /// 4. Writes the configured part-to-part range offset.
    /// 5. Stops continuous ranging left running by an earlier session and waits 100 ms.
    /// 6. Enables the result history buffer for range data.
    ///
    /// # Errors
    ///
    /// * `Err(Error::DeviceNotFound(id))` - If the model ID register did not read `0xB4`
    /// * `Err(Error::I2cError(E))` - If there was an I2C communication error
    ///
    /// # Examples
    ///
    /// ```rust,no_run
    /// use vl6180x::{Config, PollConfig, VL6180x};
    ///
    /// let i2c = embedded_hal_mock::eh1::i2c::Mock::new(&[]);
    /// let delay = embedded_hal_mock::eh1::delay::NoopDelay;
    ///
    /// let config = Config {
    ///     offset_mm: -3,
    ///     poll: PollConfig::bounded(1, 500),
    ///     ..Config::default()
    /// };
    /// let mut sensor = VL6180x::with_config(i2c, delay, config).unwrap();
    /// ```
    pub async fn with_config(i2c: I2C, delay: D, config: Config) -> Result<Self, Error<E>> {
        let mut sensor = Self {
            i2c,
            delay,
            config,
            offset_mm: 0,
        };
        sensor.sensor_init().await?;
        Ok(sensor)
    }

    async fn sensor_init(&mut self) -> Result<(), Error<E>> {
        let model_id = self.read_byte(Register::IdentificationModelId).await?;
        if model_id != MODEL_ID {
            error!("Could not find VL6180X, model ID was {}", model_id);
            return Err(Error::DeviceNotFound(model_id));
        }

        info!("Loading default configuration");
        for &(register, value) in &VL6180X_DEFAULT_CONFIGURATION {
            self.write_byte(register, value).await?;
        }
        self.write_byte(Register::SystemFreshOutOfReset, 0x00)
            .await?;

        self.set_offset(self.config.offset_mm).await?;

        if self.continuous_mode_enabled().await? {
            info!("Stopping continuous ranging left over from a previous session");
            self.write_byte(Register::SysrangeStart, START_STOP).await?;
            self.delay.delay_ms(CONTINUOUS_STOP_SETTLE_MS).await;
        }

        self.write_byte(Register::SystemHistoryCtrl, HISTORY_ENABLE)
            .await?;
        Ok(())
    }

    /// Returns the configuration the driver was created with.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Consumes the driver and hands back the I2C and delay implementations.
    pub fn release(self) -> (I2C, D) {
        (self.i2c, self.delay)
    }

    /// Measures the distance to the target in millimeters.
    ///
    /// In continuous mode this waits for the next sample the sensor produces on its own.
    /// Otherwise it waits until the sensor is ready, triggers a single-shot measurement and
    /// waits for its result. Either way the interrupt flags are cleared afterwards.
    ///
    /// Call [`range_status`](Self::range_status) to find out whether the value is valid.
    ///
    /// # Errors
    ///
    /// * `Err(Error::I2cError(E))` - If there was an I2C communication error
    /// * `Err(Error::Timeout)` - If bounded polling gave up before the sensor was ready
    ///
    /// # Examples
    ///
    /// ```rust,no_run
    /// use vl6180x::VL6180x;
    ///
    /// let i2c = embedded_hal_mock::eh1::i2c::Mock::new(&[]);
    /// let delay = embedded_hal_mock::eh1::delay::NoopDelay;
    /// let mut sensor = VL6180x::new(i2c, delay).unwrap();
    ///
    /// let range_mm = sensor.range().unwrap();
    /// ```
    pub async fn range(&mut self) -> Result<u8, Error<E>> {
        if self.continuous_mode_enabled().await? {
            return self.read_range_continuous().await;
        }
        self.read_range_single().await
    }

    async fn read_range_single(&mut self) -> Result<u8, Error<E>> {
        self.wait_for(Register::ResultRangeStatus, |status| {
            status & RANGE_DEVICE_READY != 0
        })
        .await?;
        self.write_byte(Register::SysrangeStart, START_STOP).await?;
        self.read_range_continuous().await
    }

    async fn read_range_continuous(&mut self) -> Result<u8, Error<E>> {
        self.wait_for(Register::ResultInterruptStatusGpio, |status| {
            status & RANGE_NEW_SAMPLE_READY != 0
        })
        .await?;
        let range_mm = self.read_byte(Register::ResultRangeVal).await?;
        self.clear_interrupts().await?;
        Ok(range_mm)
    }

    /// Reads the most recent range sample from the history buffer without waiting for a
    /// new measurement.
    ///
    /// Reading faster than the sensor measures returns the same sample again.
    ///
    /// # Returns
    ///
    /// * `Ok(Some(u8))` - The latest range in millimeters
    /// * `Ok(None)` - If the history buffer does not hold range data
    ///
    /// # Errors
    ///
    /// * `Err(Error::I2cError(E))` - If there was an I2C communication error
    pub async fn range_from_history(&mut self) -> Result<Option<u8>, Error<E>> {
        if !self.range_history_enabled().await? {
            return Ok(None);
        }
        let range_mm = self.read_byte(Register::ResultHistoryBuffer0).await?;
        Ok(Some(range_mm))
    }

    /// Reads all 16 slots of the range history buffer.
    ///
    /// The array is indexed by age: element 0 is the most recent sample, element 15 the
    /// oldest.
    ///
    /// # Returns
    ///
    /// * `Ok(Some([u8; 16]))` - The buffered ranges in millimeters
    /// * `Ok(None)` - If the history buffer does not hold range data
    ///
    /// # Errors
    ///
    /// * `Err(Error::I2cError(E))` - If there was an I2C communication error
    pub async fn ranges_from_history(&mut self) -> Result<Option<[u8; HISTORY_LEN]>, Error<E>> {
        if !self.range_history_enabled().await? {
            return Ok(None);
        }
        let mut ranges = [0u8; HISTORY_LEN];
        for (age, range_mm) in (0u16..).zip(ranges.iter_mut()) {
            *range_mm = self
                .read_byte(u16::from(Register::ResultHistoryBuffer0) + age)
                .await?;
        }
        Ok(Some(ranges))
    }

    /// Checks whether the history buffer is enabled and stores range data.
    ///
    /// # Errors
    ///
    /// * `Err(Error::I2cError(E))` - If there was an I2C communication error
    pub async fn range_history_enabled(&mut self) -> Result<bool, Error<E>> {
        let history_ctrl = self.read_byte(Register::SystemHistoryCtrl).await?;

        if history_ctrl & HISTORY_ENABLE == 0 {
            warn!("History buffering not enabled");
            return Ok(false);
        }
        if history_ctrl & HISTORY_MODE_ALS != 0 {
            warn!("History buffer stores ALS data, not range");
            return Ok(false);
        }
        Ok(true)
    }

    /// Starts continuous ranging with `period_ms` between measurements.
    ///
    /// The sensor counts the period in 10 ms steps, so the value is floored to a multiple
    /// of 10 ms: 157 ms behaves exactly like 150 ms.
    ///
    /// After [`stop_range_continuous`](Self::stop_range_continuous), wait about 300 ms
    /// before starting again, otherwise pending interrupt flags can leave the sensor stuck.
    /// The driver does not enforce this.
    ///
    /// # Arguments
    ///
    /// * `period_ms` - Inter-measurement period, 20 to 2550 ms inclusive
    ///
    /// # Errors
    ///
    /// * `Err(Error::InvalidArgument)` - If `period_ms` is out of range, nothing is written
    /// * `Err(Error::I2cError(E))` - If there was an I2C communication error
    ///
    /// # Examples
    ///
    /// ```rust,no_run
    /// use vl6180x::VL6180x;
    ///
    /// let i2c = embedded_hal_mock::eh1::i2c::Mock::new(&[]);
    /// let delay = embedded_hal_mock::eh1::delay::NoopDelay;
    /// let mut sensor = VL6180x::new(i2c, delay).unwrap();
    ///
    /// sensor.start_range_continuous(50).unwrap();
    /// for _ in 0..10 {
    ///     let range_mm = sensor.range().unwrap();
    /// }
    /// sensor.stop_range_continuous().unwrap();
    /// ```
    pub async fn start_range_continuous(&mut self, period_ms: u16) -> Result<(), Error<E>> {
        if !(MIN_CONTINUOUS_PERIOD_MS..=MAX_CONTINUOUS_PERIOD_MS).contains(&period_ms) {
            error!("Invalid continuous ranging period in ms: {}", period_ms);
            return Err(Error::InvalidArgument);
        }
        #[allow(clippy::cast_possible_truncation)]
        let period_reg = (period_ms / 10 - 1) as u8;
        self.write_byte(Register::SysrangeIntermeasurementPeriod, period_reg)
            .await?;
        self.write_byte(Register::SysrangeStart, RANGE_START_CONTINUOUS)
            .await?;
        Ok(())
    }

    /// Stops continuous ranging. Does nothing if continuous ranging is not running.
    ///
    /// Wait about 300 ms before starting another measurement.
    ///
    /// # Errors
    ///
    /// * `Err(Error::I2cError(E))` - If there was an I2C communication error
    pub async fn stop_range_continuous(&mut self) -> Result<(), Error<E>> {
        if self.continuous_mode_enabled().await? {
            debug!("Stopping continuous ranging");
            self.write_byte(Register::SysrangeStart, START_STOP).await?;
        }
        Ok(())
    }

    /// Checks whether the sensor is ranging in continuous mode.
    ///
    /// # Errors
    ///
    /// * `Err(Error::I2cError(E))` - If there was an I2C communication error
    pub async fn continuous_mode_enabled(&mut self) -> Result<bool, Error<E>> {
        // bit 1 selects continuous mode, bit 0 is the start/stop toggle
        let sysrange_start = self.read_byte(Register::SysrangeStart).await?;
        Ok(sysrange_start > 1)
    }

    /// Returns the part-to-part range offset in millimeters, without touching the bus.
    pub fn offset(&self) -> i8 {
        self.offset_mm
    }

    /// Sets the part-to-part range offset in millimeters.
    ///
    /// The sensor adds this correction to every range it measures, e.g. to compensate for a
    /// cover glass.
    ///
    /// # Errors
    ///
    /// * `Err(Error::I2cError(E))` - If there was an I2C communication error, the previous
    ///   offset is kept
    pub async fn set_offset(&mut self, offset_mm: i8) -> Result<(), Error<E>> {
        let [offset_reg] = offset_mm.to_be_bytes();
        self.write_byte(Register::SysrangePartToPartRangeOffset, offset_reg)
            .await?;
        self.offset_mm = offset_mm;
        Ok(())
    }

    /// Measures the ambient light level in lux.
    ///
    /// Runs a single ALS measurement with a 100 ms integration period at the given gain and
    /// waits for its result. Higher gains resolve darker scenes.
    ///
    /// # Errors
    ///
    /// * `Err(Error::I2cError(E))` - If there was an I2C communication error
    /// * `Err(Error::Timeout)` - If bounded polling gave up before the sample was ready
    ///
    /// # Examples
    ///
    /// ```rust,no_run
    /// use vl6180x::{AlsGain, VL6180x};
    ///
    /// let i2c = embedded_hal_mock::eh1::i2c::Mock::new(&[]);
    /// let delay = embedded_hal_mock::eh1::delay::NoopDelay;
    /// let mut sensor = VL6180x::new(i2c, delay).unwrap();
    ///
    /// let lux = sensor.read_lux(AlsGain::Gain5).unwrap();
    /// ```
    pub async fn read_lux(&mut self, gain: AlsGain) -> Result<f32, Error<E>> {
        // interrupt on ALS new sample ready
        let mut interrupt_config = self.read_byte(Register::SystemInterruptConfigGpio).await?;
        interrupt_config &= !ALS_INTERRUPT_MASK;
        interrupt_config |= ALS_NEW_SAMPLE_READY << ALS_INTERRUPT_SHIFT;
        self.write_byte(Register::SystemInterruptConfigGpio, interrupt_config)
            .await?;

        let [period_hi, period_lo] = ALS_INTEGRATION_PERIOD_MS.to_be_bytes();
        self.write_byte(Register::SysalsIntegrationPeriodHi, period_hi)
            .await?;
        self.write_byte(Register::SysalsIntegrationPeriodLo, period_lo)
            .await?;

        self.write_byte(
            Register::SysalsAnalogueGain,
            ALS_ANALOGUE_GAIN_BASE | u8::from(gain),
        )
        .await?;
        self.write_byte(Register::SysalsStart, START_STOP).await?;

        self.wait_for(Register::ResultInterruptStatusGpio, |status| {
            (status & ALS_INTERRUPT_MASK) >> ALS_INTERRUPT_SHIFT == ALS_NEW_SAMPLE_READY
        })
        .await?;

        let raw = self.read_word(Register::ResultAlsVal).await?;
        self.clear_interrupts().await?;
        Ok(lux_from_raw(raw, gain))
    }

    /// Reads the error code of the last range measurement.
    ///
    /// # Errors
    ///
    /// * `Err(Error::I2cError(E))` - If there was an I2C communication error
    pub async fn range_status(&mut self) -> Result<RangeStatus, Error<E>> {
        let status = self.read_byte(Register::ResultRangeStatus).await?;
        Ok(RangeStatus::from(status >> 4))
    }

    /// Clears the range, ALS and error interrupt flags.
    ///
    /// # Errors
    ///
    /// * `Err(Error::I2cError(E))` - If there was an I2C communication error
    pub async fn clear_interrupts(&mut self) -> Result<(), Error<E>> {
        self.write_byte(Register::SystemInterruptClear, CLEAR_ALL_INTERRUPTS)
            .await
    }

    /// Polls `register` until `ready` accepts its value, honoring the poll configuration.
    async fn wait_for(&mut self, register: Register, ready: fn(u8) -> bool) -> Result<u8, Error<E>> {
        let poll = self.config.poll;
        let mut attempts = 0u32;
        loop {
            let value = self.read_byte(register).await?;
            if ready(value) {
                break Ok(value);
            }

            attempts = attempts.saturating_add(1);
            if poll.max_attempts.is_some_and(|max| attempts >= max) {
                error!("Timed out waiting on register {}", u16::from(register));
                break Err(Error::Timeout);
            }

            if poll.interval_ms > 0 {
                self.delay.delay_ms(poll.interval_ms).await;
            }
        }
    }

    /// Writes a single byte to a 16-bit register address.
    ///
    /// # Errors
    ///
    /// * `Err(Error::I2cError(E))` - If there was an I2C communication error
    pub async fn write_byte<R>(&mut self, register_address: R, value: u8) -> Result<(), Error<E>>
    where
        R: Into<u16>,
    {
        let reg: u16 = register_address.into();
        let [reg_hi, reg_lo] = reg.to_be_bytes();
        self.i2c
            .write(self.config.address, &[reg_hi, reg_lo, value])
            .await?;
        Ok(())
    }

    /// Reads a single byte from a 16-bit register address.
    ///
    /// # Errors
    ///
    /// * `Err(Error::I2cError(E))` - If there was an I2C communication error
    pub async fn read_byte<R>(&mut self, register_address: R) -> Result<u8, Error<E>>
    where
        R: Into<u16>,
    {
        let reg: u16 = register_address.into();
        let write_buffer = reg.to_be_bytes();
        let mut read_buffer = [0u8; 1];
        self.i2c
            .write_read(self.config.address, &write_buffer, &mut read_buffer)
            .await?;
        Ok(read_buffer[0])
    }

    /// Writes a big-endian 16-bit value to a 16-bit register address.
    ///
    /// # Errors
    ///
    /// * `Err(Error::I2cError(E))` - If there was an I2C communication error
    pub async fn write_word<R>(&mut self, register_address: R, value: u16) -> Result<(), Error<E>>
    where
        R: Into<u16>,
    {
        let reg: u16 = register_address.into();
        let mut buffer = [0u8; 4];
        buffer[0..2].copy_from_slice(&reg.to_be_bytes());
        buffer[2..4].copy_from_slice(&value.to_be_bytes());
        self.i2c.write(self.config.address, &buffer).await?;
        Ok(())
    }

    /// Reads a big-endian 16-bit value from a 16-bit register address.
    ///
    /// # Errors
    ///
    /// * `Err(Error::I2cError(E))` - If there was an I2C communication error
    pub async fn read_word<R>(&mut self, register_address: R) -> Result<u16, Error<E>>
    where
        R: Into<u16>,
    {
        let reg: u16 = register_address.into();
        let write_buffer = reg.to_be_bytes();
        let mut read_buffer = [0u8; 2];
        self.i2c
            .write_read(self.config.address, &write_buffer, &mut read_buffer)
            .await?;
        Ok(u16::from_be_bytes(read_buffer))
    }
}

fn lux_from_raw(raw: u16, gain: AlsGain) -> f32 {
    let lux = f32::from(raw) * ALS_LUX_PER_COUNT / gain.multiplier();
    // counts scale linearly with integration time, calibrated at 100 ms
    lux * 100.0 / f32::from(ALS_INTEGRATION_PERIOD_MS)
}

/// Error type for VL6180X sensor operations.
///
/// # Examples
///
/// ```rust,no_run
/// use vl6180x::{Error, VL6180x};
///
/// let i2c = embedded_hal_mock::eh1::i2c::Mock::new(&[]);
/// let delay = embedded_hal_mock::eh1::delay::NoopDelay;
///
/// match VL6180x::new(i2c, delay) {
///     Ok(_sensor) => println!("Sensor initialized successfully"),
///     Err(Error::DeviceNotFound(id)) => println!("Not a VL6180X, model ID {:#04x}", id),
///     Err(Error::I2cError(e)) => println!("I2C communication error: {:?}", e),
///     Err(e) => println!("Initialization failed: {}", e),
/// }
/// ```
#[derive(Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Error<E: core::fmt::Debug> {
    /// The underlying I2C transaction failed. The sensor may need to be re-initialized.
    I2cError(E),
    /// The model ID register held this value instead of `0xB4`
    DeviceNotFound(u8),
    /// Polling gave up before the sensor reported ready
    Timeout,
    /// A parameter was outside its valid range
    InvalidArgument,
}

impl<E: core::fmt::Debug> core::fmt::Display for Error<E> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{self:?}")
    }
}

impl<E: core::fmt::Debug> From<E> for Error<E> {
    fn from(error: E) -> Self {
        Error::I2cError(error)
    }
}
