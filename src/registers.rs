use crate::frame::Request;

/// The operation code half of a register reference.
///
/// Reads and writes never share an operation code, so a [`Property`] is read with
/// [`Property::read`] and written only ever with [`Operation::WritePage1`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Operation {
    ReadPage0,
    ReadPage1,
    ReadPage4,
    WritePage1,
}

impl Operation {
    pub const fn code(self) -> [u8; 2] {
        match self {
            Self::ReadPage0 => [0x00, 0x04],
            Self::ReadPage1 => [0x01, 0x04],
            Self::ReadPage4 => [0x04, 0x04],
            Self::WritePage1 => [0x01, 0x06],
        }
    }

    pub const fn is_write(self) -> bool {
        matches!(self, Self::WritePage1)
    }
}

impl std::fmt::Display for Operation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let [page, kind] = self.code();
        f.write_fmt(format_args!("{page:02X} {kind:02X}"))
    }
}

impl serde::Serialize for Operation {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

/// A register address within a page.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(transparent)]
pub struct Address(pub [u8; 2]);

impl Address {
    pub const fn as_u16(self) -> u16 {
        u16::from_be_bytes(self.0)
    }
}

impl std::fmt::Display for Address {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_fmt(format_args!("0x{:04X}", self.as_u16()))
    }
}

impl serde::Serialize for Address {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u16(self.as_u16())
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
#[repr(transparent)]
pub struct Access(u8);

impl serde::Serialize for Access {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl std::fmt::Display for Access {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(if self.0 & Self::R.0 == 0 { "-" } else { "R" })?;
        f.write_str(if self.0 & Self::W.0 == 0 { "-" } else { "W" })?;
        Ok(())
    }
}

impl Access {
    pub const R: Self = Self(1 << 0);
    pub const W: Self = Self(1 << 1);
    pub const RW: Self = Self(Self::R.0 | Self::W.0);
    const R_: Self = Self::R;

    pub const fn is_writable(self) -> bool {
        self.0 & Self::W.0 != 0
    }
}

/// How the bytes of a response are turned into a value.
#[derive(Clone, Copy, Debug, PartialEq, Eq, strum::Display, serde::Serialize)]
#[strum(serialize_all = "kebab-case")]
#[serde(rename_all = "kebab-case")]
pub enum Kind {
    /// Length-prefixed ASCII.
    Text,
    /// Signed big-endian word, reported as decimal text.
    Serial,
    /// Index into [`crate::mode::Mode`].
    Mode,
    /// Non-zero byte means on.
    Flag,
    /// Signed big-endian word.
    Word,
    /// Byte in tenths, reported as a percentage.
    TenSteps,
    /// Byte in 1/255ths, reported as a percentage.
    Percent,
    Byte,
    /// Signed big-endian word in hundredths of a degree Celsius.
    Temperature,
    /// Second, minute, hour, day, month, year since 2000.
    Timestamp,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize)]
pub struct Property {
    pub name: &'static str,
    pub read: Operation,
    pub address: Address,
    pub access: Access,
    pub kind: Kind,
    pub description: &'static str,
}

impl Property {
    pub const fn read_request(&self) -> Request {
        Request { operation: self.read, address: self.address, value: None }
    }

    /// Returns `None` for properties that the air unit does not allow writing to.
    pub const fn write_request(&self, value: u8) -> Option<Request> {
        if !self.access.is_writable() {
            return None;
        }
        Some(Request { operation: Operation::WritePage1, address: self.address, value: Some(value) })
    }

    pub fn is_match(&self, pattern: &str) -> bool {
        let pattern = pattern.to_uppercase();
        if self.name.contains(&pattern.replace('-', "_")) {
            return true;
        }
        if self.description.to_uppercase().contains(&pattern) {
            return true;
        }
        if self.address.to_string().contains(&pattern) {
            return true;
        }
        return false;
    }
}

macro_rules! properties {
    ($($ident:ident: $op:ident [$hi:literal, $lo:literal], $access:ident, $kind:ident, $description:literal;)*) => {
        $(
            pub const $ident: Property = Property {
                name: stringify!($ident),
                read: Operation::$op,
                address: Address([$hi, $lo]),
                access: Access::$access,
                kind: Kind::$kind,
                description: $description,
            };
        )*

        /// Every property known to this tool, in the order they are read out.
        pub const PROPERTIES: &[Property] = &[$($ident),*];
    };
}

properties! {
    UNIT_NAME:                   ReadPage1 [0x15, 0xe5], R_, Text,        "model name of the air unit";
    UNIT_SERIAL:                 ReadPage4 [0x00, 0x25], R_, Serial,      "serial number of the air unit";
    MODE:                        ReadPage1 [0x14, 0x12], RW, Mode,        "operating mode";
    BOOST:                       ReadPage1 [0x15, 0x30], RW, Flag,        "boost ventilation";
    SUPPLY_FAN_SPEED:            ReadPage4 [0x14, 0x50], R_, Word,        "supply fan speed in rpm";
    EXTRACT_FAN_SPEED:           ReadPage4 [0x14, 0x51], R_, Word,        "extract fan speed in rpm";
    MANUAL_FAN_STEP:             ReadPage1 [0x15, 0x61], RW, TenSteps,    "fan step used in manual mode, %";
    FILTER_LIFE:                 ReadPage1 [0x14, 0x6a], R_, Percent,     "remaining filter life, %";
    FILTER_PERIOD:               ReadPage0 [0x14, 0x69], R_, Byte,        "filter replacement period in months";
    SUPPLY_FAN_STEP:             ReadPage4 [0x14, 0x28], R_, Byte,        "current supply fan step";
    EXTRACT_FAN_STEP:            ReadPage4 [0x14, 0x29], R_, Byte,        "current extract fan step";
    NIGHT_COOLING:               ReadPage1 [0x15, 0x71], RW, Flag,        "night cooling";
    BYPASS:                      ReadPage1 [0x14, 0x60], RW, Flag,        "heat exchanger bypass";
    HUMIDITY:                    ReadPage1 [0x14, 0x70], R_, Percent,     "relative humidity of the extract air, %";
    ROOM_TEMPERATURE:            ReadPage1 [0x03, 0x00], R_, Temperature, "room temperature as measured by the control panel, °C";
    ROOM_TEMPERATURE_CALCULATED: ReadPage0 [0x14, 0x96], R_, Temperature, "room temperature calculated by the air unit, °C";
    OUTDOOR_TEMPERATURE:         ReadPage1 [0x03, 0x34], R_, Temperature, "outdoor air temperature, °C";
    SUPPLY_TEMPERATURE:          ReadPage4 [0x14, 0x73], R_, Temperature, "supply air temperature, °C";
    EXTRACT_TEMPERATURE:         ReadPage4 [0x14, 0x74], R_, Temperature, "extract air temperature, °C";
    EXHAUST_TEMPERATURE:         ReadPage4 [0x14, 0x75], R_, Temperature, "exhaust air temperature, °C";
    BATTERY_LIFE:                ReadPage1 [0x03, 0x0f], R_, Byte,        "remaining control panel battery life, %";
    CURRENT_TIME:                ReadPage1 [0x15, 0xe0], R_, Timestamp,   "clock of the air unit";
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_never_use_the_write_operation() {
        for property in PROPERTIES {
            assert!(!property.read.is_write(), "{} is read with a write code", property.name);
            assert!(!property.read_request().operation.is_write());
        }
    }

    #[test]
    fn writes_go_to_page_one_at_the_same_address() {
        let request = BOOST.write_request(1).unwrap();
        assert_eq!(request.operation, Operation::WritePage1);
        assert_eq!(request.operation.code(), [0x01, 0x06]);
        assert_eq!(request.address, Address([0x15, 0x30]));
        assert_eq!(request.value, Some(1));
    }

    #[test]
    fn read_only_properties_refuse_write_requests() {
        assert!(FILTER_LIFE.write_request(0).is_none());
        assert!(CURRENT_TIME.write_request(0).is_none());
        let writable = PROPERTIES.iter().filter(|p| p.access.is_writable()).map(|p| p.name);
        assert_eq!(
            writable.collect::<Vec<_>>(),
            ["MODE", "BOOST", "MANUAL_FAN_STEP", "NIGHT_COOLING", "BYPASS"]
        );
    }

    #[test]
    fn names_are_unique() {
        for (i, a) in PROPERTIES.iter().enumerate() {
            for b in &PROPERTIES[i + 1..] {
                assert_ne!(a.name, b.name);
            }
        }
    }

    #[test]
    fn matching() {
        assert!(HUMIDITY.is_match("humid"));
        assert!(SUPPLY_TEMPERATURE.is_match("supply air"));
        assert!(UNIT_NAME.is_match("15E5"));
        assert!(MANUAL_FAN_STEP.is_match("manual-fan"));
        assert!(!BOOST.is_match("temperature"));
    }

    #[test]
    fn display() {
        assert_eq!(Operation::ReadPage4.to_string(), "04 04");
        assert_eq!(CURRENT_TIME.address.to_string(), "0x15E0");
        assert_eq!(MODE.access.to_string(), "RW");
        assert_eq!(HUMIDITY.access.to_string(), "R-");
        assert_eq!(Kind::TenSteps.to_string(), "ten-steps");
    }
}
