//! Typed access to the registers of an air unit.
//!
//! Every read goes through a decoder that turns the raw response into a [`Decoded`] value. Most
//! decoders either produce a value or reject the response as [`Decoded::Invalid`]. Temperatures
//! are special: the sensors occasionally report nonsense for a single sample, so an out of range
//! temperature decodes to [`Decoded::Absent`] and reads back as `None` instead of failing.

use crate::connection::Channel;
use crate::mode::{Mode, NotWritable, WritableMode};
use crate::registers::{self, Kind, Property};
use crate::state::AirUnitState;
use jiff::Zoned;
use jiff::tz::TimeZone;
use num_traits::FromPrimitive as _;
use tracing::{trace, warn};

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error("air unit responded with an implausible `{1}` value")]
    InvalidResponse(#[source] InvalidResponse, &'static str),
    #[error("refusing to write to the air unit")]
    InvalidArgument(#[source] InvalidArgument),
}

/// The air unit answered, but what it said makes no sense.
#[derive(thiserror::Error, Debug)]
pub enum InvalidResponse {
    #[error("response holds {got} bytes, but {expected} are required")]
    Truncated { expected: usize, got: usize },
    #[error("manual fan step {0} is outside of the 0..=10 range")]
    FanStep(u8),
    #[error("{0} is not a known mode")]
    Mode(u8),
    #[error("{day}.{month}.{year} {hour}:{minute}:{second} is not a valid point in time")]
    Timestamp {
        year: i16,
        month: i8,
        day: i8,
        hour: i8,
        minute: i8,
        second: i8,
        #[source]
        source: jiff::Error,
    },
    #[error("the value is out of the plausible range")]
    Implausible,
}

#[derive(thiserror::Error, Debug)]
pub enum InvalidArgument {
    #[error(transparent)]
    Mode(#[from] NotWritable),
    #[error("manual fan step must be a percentage, got {0}")]
    ManualFanStep(u8),
    #[error("`{0}` is read-only")]
    ReadOnly(&'static str),
}

/// Outcome of decoding a response.
#[derive(Debug)]
pub enum Decoded<T> {
    Value(T),
    /// The response was well formed but the value is physically implausible.
    Absent,
    Invalid(InvalidResponse),
}

impl<T> Decoded<T> {
    /// `Absent` becomes `None`.
    pub fn into_option(self) -> Result<Option<T>, InvalidResponse> {
        match self {
            Decoded::Value(v) => Ok(Some(v)),
            Decoded::Absent => Ok(None),
            Decoded::Invalid(e) => Err(e),
        }
    }

    /// `Absent` is rejected as implausible.
    pub fn into_value(self) -> Result<T, InvalidResponse> {
        self.into_option()?.ok_or(InvalidResponse::Implausible)
    }
}

impl<T> From<Result<T, InvalidResponse>> for Decoded<T> {
    fn from(result: Result<T, InvalidResponse>) -> Self {
        match result {
            Ok(v) => Decoded::Value(v),
            Err(e) => Decoded::Invalid(e),
        }
    }
}

fn fixed<const N: usize>(bytes: &[u8]) -> Result<&[u8; N], InvalidResponse> {
    bytes.first_chunk::<N>().ok_or(InvalidResponse::Truncated { expected: N, got: bytes.len() })
}

/// First byte is the length of the ASCII text that follows.
pub fn decode_text(bytes: &[u8]) -> Decoded<String> {
    let Some((&length, rest)) = bytes.split_first() else {
        return Decoded::Invalid(InvalidResponse::Truncated { expected: 1, got: 0 });
    };
    let length = usize::from(length);
    let Some(text) = rest.get(..length) else {
        return Decoded::Invalid(InvalidResponse::Truncated {
            expected: length + 1,
            got: bytes.len(),
        });
    };
    let text = text.iter().map(|&b| match b.is_ascii() {
        true => char::from(b),
        false => char::REPLACEMENT_CHARACTER,
    });
    Decoded::Value(text.collect())
}

pub fn decode_serial(bytes: &[u8]) -> Decoded<String> {
    fixed::<2>(bytes).map(|&word| i16::from_be_bytes(word).to_string()).into()
}

/// Fan speeds are words too. Negative values are passed through as-is.
pub fn decode_word(bytes: &[u8]) -> Decoded<i16> {
    fixed::<2>(bytes).map(|&word| i16::from_be_bytes(word)).into()
}

pub fn decode_byte(bytes: &[u8]) -> Decoded<u8> {
    fixed::<1>(bytes).map(|&[byte]| byte).into()
}

pub fn decode_flag(bytes: &[u8]) -> Decoded<bool> {
    fixed::<1>(bytes).map(|&[byte]| byte != 0).into()
}

/// Scales 0..=255 to 0..=100.
pub fn decode_percent(bytes: &[u8]) -> Decoded<f32> {
    fixed::<1>(bytes).map(|&[byte]| f32::from(byte) * 100.0 / 255.0).into()
}

/// The fan has ten discrete steps, each worth ten percent.
pub fn decode_ten_steps(bytes: &[u8]) -> Decoded<u8> {
    match fixed::<1>(bytes) {
        Err(e) => Decoded::Invalid(e),
        Ok(&[step @ 0..=10]) => Decoded::Value(step * 10),
        Ok(&[step]) => Decoded::Invalid(InvalidResponse::FanStep(step)),
    }
}

pub fn decode_mode(bytes: &[u8]) -> Decoded<Mode> {
    match fixed::<1>(bytes) {
        Err(e) => Decoded::Invalid(e),
        Ok(&[index]) => match Mode::from_u8(index) {
            Some(mode) => Decoded::Value(mode),
            None => Decoded::Invalid(InvalidResponse::Mode(index)),
        },
    }
}

pub fn decode_temperature(bytes: &[u8]) -> Decoded<f32> {
    let raw = match fixed::<2>(bytes) {
        Err(e) => return Decoded::Invalid(e),
        Ok(&word) => i16::from_be_bytes(word),
    };
    let celsius = f32::from(raw) / 100.0;
    if celsius <= -274.0 || celsius > 100.0 {
        warn!(message = "air unit reported an implausible temperature", celsius, raw);
        return Decoded::Absent;
    }
    Decoded::Value(celsius)
}

/// The top three bits of the hour and day bytes carry flags unrelated to the time.
pub fn decode_timestamp(bytes: &[u8], time_zone: &TimeZone) -> Decoded<Zoned> {
    let &[second, minute, hour, day, month, year] = match fixed::<6>(bytes) {
        Err(e) => return Decoded::Invalid(e),
        Ok(raw) => raw,
    };
    let (second, minute, month) = (second as i8, minute as i8, month as i8);
    let (hour, day) = ((hour & 0x1f) as i8, (day & 0x1f) as i8);
    let year = 2000 + i16::from(year as i8);
    let zoned = jiff::civil::DateTime::new(year, month, day, hour, minute, second, 0)
        .and_then(|datetime| datetime.to_zoned(time_zone.clone()));
    match zoned {
        Ok(zoned) => Decoded::Value(zoned),
        Err(source) => Decoded::Invalid(InvalidResponse::Timestamp {
            year,
            month,
            day,
            hour,
            minute,
            second,
            source,
        }),
    }
}

/// Payload for a manual fan step write: `percent` rounded to the nearest of the ten steps, with
/// ties rounding up.
pub fn encode_ten_steps(percent: u8) -> Result<u8, InvalidArgument> {
    if percent > 100 {
        return Err(InvalidArgument::ManualFanStep(percent));
    }
    Ok((percent + 5) / 10)
}

/// Any value an air unit property can take.
#[derive(Debug, Clone, PartialEq)]
pub enum PropertyValue {
    Text(String),
    Flag(bool),
    Word(i16),
    Byte(u8),
    Percent(f32),
    Temperature(Option<f32>),
    Mode(Mode),
    Timestamp(Zoned),
}

impl std::fmt::Display for PropertyValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PropertyValue::Text(s) => f.write_str(s),
            PropertyValue::Flag(b) => f.write_str(if *b { "on" } else { "off" }),
            PropertyValue::Word(n) => f.write_fmt(format_args!("{n}")),
            PropertyValue::Byte(n) => f.write_fmt(format_args!("{n}")),
            PropertyValue::Percent(n) => f.write_fmt(format_args!("{n:.1}")),
            PropertyValue::Temperature(Some(t)) => f.write_fmt(format_args!("{t:.2}")),
            PropertyValue::Temperature(None) => f.write_str("n/a"),
            PropertyValue::Mode(m) => f.write_fmt(format_args!("{m}")),
            PropertyValue::Timestamp(t) => f.write_fmt(format_args!("{}", t.datetime())),
        }
    }
}

impl serde::Serialize for PropertyValue {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            PropertyValue::Text(s) => serializer.serialize_str(s),
            PropertyValue::Flag(b) => serializer.serialize_bool(*b),
            PropertyValue::Word(n) => serializer.serialize_i16(*n),
            PropertyValue::Byte(n) => serializer.serialize_u8(*n),
            PropertyValue::Percent(n) => serializer.serialize_f32(*n),
            PropertyValue::Temperature(t) => serde::Serialize::serialize(t, serializer),
            PropertyValue::Mode(m) => serde::Serialize::serialize(m, serializer),
            PropertyValue::Timestamp(t) => serde::Serialize::serialize(t, serializer),
        }
    }
}

/// A Danfoss Air unit reachable over some [`Channel`].
pub struct AirUnit<C> {
    channel: C,
    time_zone: TimeZone,
}

impl<C: Channel> AirUnit<C> {
    /// The air unit clock is interpreted in the system time zone.
    pub fn new(channel: C) -> Self {
        Self { channel, time_zone: TimeZone::system() }
    }

    pub fn with_time_zone(self, time_zone: TimeZone) -> Self {
        Self { time_zone, ..self }
    }

    pub fn channel(&self) -> &C {
        &self.channel
    }

    async fn read<T>(
        &self,
        property: &Property,
        decode: impl FnOnce(&[u8]) -> Decoded<T>,
    ) -> Result<Decoded<T>, Error> {
        let response = self.channel.send_request(property.read_request()).await?;
        trace!(message = "read", property = property.name, ?response);
        Ok(decode(&response))
    }

    async fn read_value<T>(
        &self,
        property: &Property,
        decode: impl FnOnce(&[u8]) -> Decoded<T>,
    ) -> Result<T, Error> {
        let decoded = self.read(property, decode).await?;
        decoded.into_value().map_err(|e| Error::InvalidResponse(e, property.name))
    }

    async fn read_temperature(&self, property: &Property) -> Result<Option<f32>, Error> {
        let decoded = self.read(property, decode_temperature).await?;
        decoded.into_option().map_err(|e| Error::InvalidResponse(e, property.name))
    }

    async fn write(&self, property: &Property, value: u8) -> Result<(), Error> {
        let request = property
            .write_request(value)
            .ok_or(Error::InvalidArgument(InvalidArgument::ReadOnly(property.name)))?;
        trace!(message = "write", property = property.name, value);
        self.channel.send_request(request).await?;
        Ok(())
    }

    pub async fn unit_name(&self) -> Result<String, Error> {
        self.read_value(&registers::UNIT_NAME, decode_text).await
    }

    pub async fn unit_serial_number(&self) -> Result<String, Error> {
        self.read_value(&registers::UNIT_SERIAL, decode_serial).await
    }

    pub async fn mode(&self) -> Result<Mode, Error> {
        self.read_value(&registers::MODE, decode_mode).await
    }

    /// Fails without talking to the air unit if `mode` is [`Mode::NotApplicable`].
    pub async fn set_mode(&self, mode: Mode) -> Result<(), Error> {
        let mode = WritableMode::try_from(mode)
            .map_err(|e| Error::InvalidArgument(InvalidArgument::Mode(e)))?;
        self.set_writable_mode(mode).await
    }

    pub async fn set_writable_mode(&self, mode: WritableMode) -> Result<(), Error> {
        self.write(&registers::MODE, mode.ordinal()).await
    }

    pub async fn boost(&self) -> Result<bool, Error> {
        self.read_value(&registers::BOOST, decode_flag).await
    }

    pub async fn set_boost(&self, boost: bool) -> Result<(), Error> {
        self.write(&registers::BOOST, u8::from(boost)).await
    }

    pub async fn supply_fan_speed(&self) -> Result<i16, Error> {
        self.read_value(&registers::SUPPLY_FAN_SPEED, decode_word).await
    }

    pub async fn extract_fan_speed(&self) -> Result<i16, Error> {
        self.read_value(&registers::EXTRACT_FAN_SPEED, decode_word).await
    }

    /// In percent, always a multiple of ten.
    pub async fn manual_fan_step(&self) -> Result<u8, Error> {
        self.read_value(&registers::MANUAL_FAN_STEP, decode_ten_steps).await
    }

    /// The air unit only has ten steps, so `percent` is rounded to the closest one.
    pub async fn set_manual_fan_step(&self, percent: u8) -> Result<(), Error> {
        let step = encode_ten_steps(percent).map_err(Error::InvalidArgument)?;
        self.write(&registers::MANUAL_FAN_STEP, step).await
    }

    pub async fn filter_life(&self) -> Result<f32, Error> {
        self.read_value(&registers::FILTER_LIFE, decode_percent).await
    }

    pub async fn filter_period(&self) -> Result<u8, Error> {
        self.read_value(&registers::FILTER_PERIOD, decode_byte).await
    }

    pub async fn supply_fan_step(&self) -> Result<u8, Error> {
        self.read_value(&registers::SUPPLY_FAN_STEP, decode_byte).await
    }

    pub async fn extract_fan_step(&self) -> Result<u8, Error> {
        self.read_value(&registers::EXTRACT_FAN_STEP, decode_byte).await
    }

    pub async fn night_cooling(&self) -> Result<bool, Error> {
        self.read_value(&registers::NIGHT_COOLING, decode_flag).await
    }

    pub async fn set_night_cooling(&self, night_cooling: bool) -> Result<(), Error> {
        self.write(&registers::NIGHT_COOLING, u8::from(night_cooling)).await
    }

    pub async fn bypass(&self) -> Result<bool, Error> {
        self.read_value(&registers::BYPASS, decode_flag).await
    }

    pub async fn set_bypass(&self, bypass: bool) -> Result<(), Error> {
        self.write(&registers::BYPASS, u8::from(bypass)).await
    }

    pub async fn humidity(&self) -> Result<f32, Error> {
        self.read_value(&registers::HUMIDITY, decode_percent).await
    }

    pub async fn room_temperature(&self) -> Result<Option<f32>, Error> {
        self.read_temperature(&registers::ROOM_TEMPERATURE).await
    }

    pub async fn room_temperature_calculated(&self) -> Result<Option<f32>, Error> {
        self.read_temperature(&registers::ROOM_TEMPERATURE_CALCULATED).await
    }

    pub async fn outdoor_temperature(&self) -> Result<Option<f32>, Error> {
        self.read_temperature(&registers::OUTDOOR_TEMPERATURE).await
    }

    pub async fn supply_temperature(&self) -> Result<Option<f32>, Error> {
        self.read_temperature(&registers::SUPPLY_TEMPERATURE).await
    }

    pub async fn extract_temperature(&self) -> Result<Option<f32>, Error> {
        self.read_temperature(&registers::EXTRACT_TEMPERATURE).await
    }

    pub async fn exhaust_temperature(&self) -> Result<Option<f32>, Error> {
        self.read_temperature(&registers::EXHAUST_TEMPERATURE).await
    }

    pub async fn battery_life(&self) -> Result<u8, Error> {
        self.read_value(&registers::BATTERY_LIFE, decode_byte).await
    }

    pub async fn current_time(&self) -> Result<Zoned, Error> {
        let time_zone = &self.time_zone;
        let decode = |bytes: &[u8]| decode_timestamp(bytes, time_zone);
        self.read_value(&registers::CURRENT_TIME, decode).await
    }

    /// Read any property, decoding it according to its [`Kind`].
    pub async fn read_property(&self, property: &Property) -> Result<PropertyValue, Error> {
        Ok(match property.kind {
            Kind::Text => PropertyValue::Text(self.read_value(property, decode_text).await?),
            Kind::Serial => PropertyValue::Text(self.read_value(property, decode_serial).await?),
            Kind::Mode => PropertyValue::Mode(self.read_value(property, decode_mode).await?),
            Kind::Flag => PropertyValue::Flag(self.read_value(property, decode_flag).await?),
            Kind::Word => PropertyValue::Word(self.read_value(property, decode_word).await?),
            Kind::TenSteps => {
                PropertyValue::Byte(self.read_value(property, decode_ten_steps).await?)
            }
            Kind::Percent => {
                PropertyValue::Percent(self.read_value(property, decode_percent).await?)
            }
            Kind::Byte => PropertyValue::Byte(self.read_value(property, decode_byte).await?),
            Kind::Temperature => {
                PropertyValue::Temperature(self.read_temperature(property).await?)
            }
            Kind::Timestamp => {
                let time_zone = &self.time_zone;
                let decode = |bytes: &[u8]| decode_timestamp(bytes, time_zone);
                PropertyValue::Timestamp(self.read_value(property, decode).await?)
            }
        })
    }

    /// Read out every property. The first failing read aborts the whole snapshot.
    pub async fn fetch_state(&self) -> Result<AirUnitState, Error> {
        Ok(AirUnitState {
            unit_name: self.unit_name().await?,
            unit_serial_number: self.unit_serial_number().await?,
            mode: self.mode().await?,
            boost: self.boost().await?,
            supply_fan_speed: self.supply_fan_speed().await?,
            extract_fan_speed: self.extract_fan_speed().await?,
            manual_fan_step: self.manual_fan_step().await?,
            filter_life: self.filter_life().await?,
            filter_period: self.filter_period().await?,
            supply_fan_step: self.supply_fan_step().await?,
            extract_fan_step: self.extract_fan_step().await?,
            night_cooling: self.night_cooling().await?,
            bypass: self.bypass().await?,
            humidity: self.humidity().await?,
            room_temperature: self.room_temperature().await?,
            room_temperature_calculated: self.room_temperature_calculated().await?,
            outdoor_temperature: self.outdoor_temperature().await?,
            supply_temperature: self.supply_temperature().await?,
            extract_temperature: self.extract_temperature().await?,
            exhaust_temperature: self.exhaust_temperature().await?,
            battery_life: self.battery_life().await?,
            current_time: self.current_time().await?,
        })
    }
}
