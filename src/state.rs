use crate::mode::Mode;

/// Everything the air unit reports, read out in one go by
/// [`AirUnit::fetch_state`](crate::air_unit::AirUnit::fetch_state).
///
/// Temperatures are `None` when the sensor reported an implausible value.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct AirUnitState {
    pub unit_name: String,
    pub unit_serial_number: String,
    pub mode: Mode,
    pub boost: bool,
    pub supply_fan_speed: i16,
    pub extract_fan_speed: i16,
    pub manual_fan_step: u8,
    pub filter_life: f32,
    pub filter_period: u8,
    pub supply_fan_step: u8,
    pub extract_fan_step: u8,
    pub night_cooling: bool,
    pub bypass: bool,
    pub humidity: f32,
    pub room_temperature: Option<f32>,
    pub room_temperature_calculated: Option<f32>,
    pub outdoor_temperature: Option<f32>,
    pub supply_temperature: Option<f32>,
    pub extract_temperature: Option<f32>,
    pub exhaust_temperature: Option<f32>,
    pub battery_life: u8,
    pub current_time: jiff::Zoned,
}
