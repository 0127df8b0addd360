//! Bus-level tests for the blocking driver against a mocked I2C bus.
#![cfg(not(feature = "async"))]

use core::cell::RefCell;

use embedded_hal::i2c::ErrorKind;
use embedded_hal_bus::i2c::RefCellDevice;
use embedded_hal_mock::eh1::delay::NoopDelay;
use embedded_hal_mock::eh1::i2c::{Mock as I2cMock, Transaction as I2cTransaction};
use vl6180x::{AlsGain, Config, Error, PollConfig, RangeStatus, VL6180x, DEFAULT_ADDRESS};

const SETTINGS: [(u16, u8); 39] = [
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
    (0x0011, 0x10),
    (0x010A, 0x30),
    (0x003F, 0x46),
    (0x0031, 0xFF),
    (0x0040, 0x63),
    (0x002E, 0x01),
    (0x001B, 0x09),
    (0x003E, 0x31),
    (0x0014, 0x24),
];

fn read_at(address: u8, reg: u16, value: u8) -> I2cTransaction {
    I2cTransaction::write_read(address, reg.to_be_bytes().to_vec(), vec![value])
}

fn write_at(address: u8, reg: u16, value: u8) -> I2cTransaction {
    let [hi, lo] = reg.to_be_bytes();
    I2cTransaction::write(address, vec![hi, lo, value])
}

fn read(reg: u16, value: u8) -> I2cTransaction {
    read_at(DEFAULT_ADDRESS, reg, value)
}

fn write(reg: u16, value: u8) -> I2cTransaction {
    write_at(DEFAULT_ADDRESS, reg, value)
}

/// Everything construction puts on the bus, given what SYSRANGE__START reads back.
fn init_at(address: u8, offset_reg: u8, sysrange_start: u8) -> Vec<I2cTransaction> {
    let mut transactions = vec![read_at(address, 0x000, 0xB4)];
    transactions.extend(
        SETTINGS
            .iter()
            .map(|&(reg, value)| write_at(address, reg, value)),
    );
    transactions.push(write_at(address, 0x016, 0x00));
    transactions.push(write_at(address, 0x024, offset_reg));
    transactions.push(read_at(address, 0x018, sysrange_start));
    if sysrange_start > 1 {
        transactions.push(write_at(address, 0x018, 0x01));
    }
    transactions.push(write_at(address, 0x012, 0x01));
    transactions
}

fn init() -> Vec<I2cTransaction> {
    init_at(DEFAULT_ADDRESS, 0x00, 0x00)
}

fn sensor_with(
    mut expectations: Vec<I2cTransaction>,
    after_init: Vec<I2cTransaction>,
    config: Config,
) -> (VL6180x<I2cMock, NoopDelay>, I2cMock) {
    expectations.extend(after_init);
    let i2c = I2cMock::new(&expectations);
    let sensor = VL6180x::with_config(i2c.clone(), NoopDelay, config).unwrap();
    (sensor, i2c)
}

fn sensor(after_init: Vec<I2cTransaction>) -> (VL6180x<I2cMock, NoopDelay>, I2cMock) {
    sensor_with(init(), after_init, Config::default())
}

#[test]
fn init_writes_settings_in_order() {
    let (sensor, mut i2c) = sensor(vec![]);
    assert_eq!(sensor.offset(), 0);
    assert_eq!(sensor.config().address, DEFAULT_ADDRESS);
    drop(sensor.release());
    i2c.done();
}

#[test]
fn init_rejects_wrong_model_id() {
    let expectations = [read(0x000, 0xB3)];
    let mut i2c = I2cMock::new(&expectations);
    let result = VL6180x::new(i2c.clone(), NoopDelay);
    assert!(matches!(result, Err(Error::DeviceNotFound(0xB3))));
    i2c.done();
}

#[test]
fn init_propagates_bus_errors() {
    let expectations =
        [I2cTransaction::write_read(DEFAULT_ADDRESS, vec![0x00, 0x00], vec![0x00])
            .with_error(ErrorKind::Other)];
    let mut i2c = I2cMock::new(&expectations);
    let result = VL6180x::new(i2c.clone(), NoopDelay);
    assert!(matches!(result, Err(Error::I2cError(ErrorKind::Other))));
    i2c.done();
}

#[test]
fn init_stops_leftover_continuous_ranging() {
    let (sensor, mut i2c) = sensor_with(init_at(DEFAULT_ADDRESS, 0x00, 0x03), vec![], Config::default());
    drop(sensor);
    i2c.done();
}

#[test]
fn init_writes_configured_offset_and_address() {
    let config = Config {
        address: 0x30,
        offset_mm: -128,
        ..Config::default()
    };
    let (sensor, mut i2c) = sensor_with(init_at(0x30, 0x80, 0x00), vec![], config);
    assert_eq!(sensor.offset(), -128);
    drop(sensor);
    i2c.done();
}

#[test]
fn continuous_period_is_floored_to_10ms() {
    let (mut sensor, mut i2c) = sensor(vec![
        write(0x01B, 14),
        write(0x018, 0x03),
        write(0x01B, 14),
        write(0x018, 0x03),
        write(0x01B, 1),
        write(0x018, 0x03),
        write(0x01B, 254),
        write(0x018, 0x03),
    ]);
    sensor.start_range_continuous(157).unwrap();
    sensor.start_range_continuous(150).unwrap();
    sensor.start_range_continuous(20).unwrap();
    sensor.start_range_continuous(2550).unwrap();
    drop(sensor);
    i2c.done();
}

#[test]
fn continuous_period_out_of_range_writes_nothing() {
    let (mut sensor, mut i2c) = sensor(vec![]);
    for period_ms in [0, 19, 2551, u16::MAX] {
        assert!(matches!(
            sensor.start_range_continuous(period_ms),
            Err(Error::InvalidArgument)
        ));
    }
    drop(sensor);
    i2c.done();
}

#[test]
fn continuous_mode_follows_start_and_stop() {
    let (mut sensor, mut i2c) = sensor(vec![
        write(0x01B, 9),
        write(0x018, 0x03),
        read(0x018, 0x03),
        // stop
        read(0x018, 0x03),
        write(0x018, 0x01),
        read(0x018, 0x01),
        // stopping again is a no-op
        read(0x018, 0x00),
    ]);
    sensor.start_range_continuous(100).unwrap();
    assert!(sensor.continuous_mode_enabled().unwrap());
    sensor.stop_range_continuous().unwrap();
    assert!(!sensor.continuous_mode_enabled().unwrap());
    sensor.stop_range_continuous().unwrap();
    drop(sensor);
    i2c.done();
}

#[test]
fn continuous_mode_enabled_from_raw_value_two() {
    let (mut sensor, mut i2c) = sensor(vec![read(0x018, 0x02), read(0x018, 0x01)]);
    assert!(sensor.continuous_mode_enabled().unwrap());
    assert!(!sensor.continuous_mode_enabled().unwrap());
    drop(sensor);
    i2c.done();
}

#[test]
fn range_single_shot() {
    let (mut sensor, mut i2c) = sensor(vec![
        read(0x018, 0x00),
        read(0x04D, 0x00),
        read(0x04D, 0x01),
        write(0x018, 0x01),
        read(0x04F, 0x00),
        read(0x04F, 0x04),
        read(0x062, 123),
        write(0x015, 0x07),
    ]);
    assert_eq!(sensor.range().unwrap(), 123);
    drop(sensor);
    i2c.done();
}

#[test]
fn range_in_continuous_mode_does_not_rearm() {
    let (mut sensor, mut i2c) = sensor(vec![
        read(0x018, 0x03),
        read(0x04F, 0x04),
        read(0x062, 87),
        write(0x015, 0x07),
    ]);
    assert_eq!(sensor.range().unwrap(), 87);
    drop(sensor);
    i2c.done();
}

#[test]
fn bounded_polling_times_out() {
    let config = Config {
        poll: PollConfig::bounded(1, 3),
        ..Config::default()
    };
    let (mut sensor, mut i2c) = sensor_with(
        init(),
        vec![
            read(0x018, 0x00),
            read(0x04D, 0x00),
            read(0x04D, 0x00),
            read(0x04D, 0x00),
        ],
        config,
    );
    assert!(matches!(sensor.range(), Err(Error::Timeout)));
    drop(sensor);
    i2c.done();
}

#[test]
fn offset_is_written_as_twos_complement() {
    let (mut sensor, mut i2c) = sensor(vec![
        write(0x024, 0xFB),
        write(0x024, 0x7F),
        write(0x024, 0x80),
    ]);
    sensor.set_offset(-5).unwrap();
    assert_eq!(sensor.offset(), -5);
    sensor.set_offset(127).unwrap();
    assert_eq!(sensor.offset(), 127);
    sensor.set_offset(-128).unwrap();
    assert_eq!(sensor.offset(), -128);
    drop(sensor);
    i2c.done();
}

#[test]
fn failed_offset_write_keeps_previous_offset() {
    let (mut sensor, mut i2c) = sensor(vec![
        I2cTransaction::write(DEFAULT_ADDRESS, vec![0x00, 0x24, 0x0A]).with_error(ErrorKind::Other),
    ]);
    assert!(sensor.set_offset(10).is_err());
    assert_eq!(sensor.offset(), 0);
    drop(sensor);
    i2c.done();
}

fn lux_transactions(interrupt_config: u8, gain_reg: u8, raw: u16) -> Vec<I2cTransaction> {
    let mut transactions = vec![
        read(0x014, interrupt_config),
        write(0x014, (interrupt_config & !0x38) | 0x20),
        write(0x040, 0x00),
        write(0x041, 100),
        write(0x03F, gain_reg),
        write(0x038, 0x01),
        read(0x04F, 0x00),
        read(0x04F, 0x04),
        read(0x04F, 0x20),
    ];
    transactions.push(I2cTransaction::write_read(
        DEFAULT_ADDRESS,
        vec![0x00, 0x50],
        raw.to_be_bytes().to_vec(),
    ));
    transactions.push(write(0x015, 0x07));
    transactions
}

#[test]
fn read_lux_at_unity_gain() {
    let (mut sensor, mut i2c) = sensor(lux_transactions(0x24, 0x46, 1000));
    let lux = sensor.read_lux(AlsGain::Gain1).unwrap();
    assert!((lux - 320.0).abs() < 1e-3);
    drop(sensor);
    i2c.done();
}

#[test]
fn read_lux_divides_by_gain() {
    let (mut sensor, mut i2c) = sensor(lux_transactions(0xFF, 0x41, 1000));
    let lux = sensor.read_lux(AlsGain::Gain10).unwrap();
    assert!((lux - 32.0).abs() < 1e-3);
    drop(sensor);
    i2c.done();
}

#[test]
fn read_lux_clamps_gain_code_to_40x() {
    let (mut sensor, mut i2c) = sensor(lux_transactions(0x00, 0x47, 1000));
    let lux = sensor.read_lux(AlsGain::from(0x0A)).unwrap();
    assert!((lux - 8.0).abs() < 1e-3);
    drop(sensor);
    i2c.done();
}

#[test]
fn history_enabled_depends_on_control_bits() {
    let (mut sensor, mut i2c) = sensor(vec![
        read(0x012, 0x00),
        read(0x012, 0x03),
        read(0x012, 0x01),
    ]);
    assert!(!sensor.range_history_enabled().unwrap());
    assert!(!sensor.range_history_enabled().unwrap());
    assert!(sensor.range_history_enabled().unwrap());
    drop(sensor);
    i2c.done();
}

#[test]
fn range_from_history_reads_latest_slot() {
    let (mut sensor, mut i2c) = sensor(vec![
        read(0x012, 0x01),
        read(0x052, 42),
        read(0x012, 0x02),
    ]);
    assert_eq!(sensor.range_from_history().unwrap(), Some(42));
    assert_eq!(sensor.range_from_history().unwrap(), None);
    drop(sensor);
    i2c.done();
}

#[test]
fn ranges_from_history_reads_all_slots_newest_first() {
    let mut after_init = vec![read(0x012, 0x01)];
    after_init.extend((0..16u8).map(|age| read(0x052 + u16::from(age), 100 + age)));
    after_init.push(read(0x012, 0x00));
    let (mut sensor, mut i2c) = sensor(after_init);

    let ranges = sensor.ranges_from_history().unwrap().unwrap();
    assert_eq!(ranges.len(), 16);
    assert_eq!(ranges[0], 100);
    assert_eq!(ranges[15], 115);
    assert_eq!(sensor.ranges_from_history().unwrap(), None);
    drop(sensor);
    i2c.done();
}

#[test]
fn range_status_decodes_upper_nibble() {
    let (mut sensor, mut i2c) = sensor(vec![
        read(0x04D, 0x01),
        read(0x04D, 0xB1),
        read(0x04D, 0xF0),
    ]);
    assert_eq!(sensor.range_status().unwrap(), RangeStatus::NoError);
    assert_eq!(sensor.range_status().unwrap(), RangeStatus::Snr);
    assert_eq!(sensor.range_status().unwrap(), RangeStatus::RangeOverflow);
    drop(sensor);
    i2c.done();
}

#[test]
fn word_primitives_are_big_endian() {
    let (mut sensor, mut i2c) = sensor(vec![
        I2cTransaction::write(DEFAULT_ADDRESS, vec![0x01, 0x2C, 0xAB, 0xCD]),
        I2cTransaction::write_read(DEFAULT_ADDRESS, vec![0x00, 0x50], vec![0x12, 0x34]),
    ]);
    sensor.write_word(0x012Cu16, 0xABCD).unwrap();
    assert_eq!(sensor.read_word(0x0050u16).unwrap(), 0x1234);
    drop(sensor);
    i2c.done();
}

#[test]
fn two_sensors_share_one_bus() {
    let mut expectations = init_at(0x29, 0x00, 0x00);
    expectations.extend(init_at(0x30, 0x00, 0x00));
    expectations.push(read_at(0x29, 0x04D, 0x00));
    expectations.push(read_at(0x30, 0x04D, 0xE0));
    let bus = RefCell::new(I2cMock::new(&expectations));

    {
        let mut left = VL6180x::new(RefCellDevice::new(&bus), NoopDelay).unwrap();
        let config = Config {
            address: 0x30,
            ..Config::default()
        };
        let mut right = VL6180x::with_config(RefCellDevice::new(&bus), NoopDelay, config).unwrap();

        assert_eq!(left.range_status().unwrap(), RangeStatus::NoError);
        assert_eq!(right.range_status().unwrap(), RangeStatus::RangeUnderflow);
    }

    bus.into_inner().done();
}
