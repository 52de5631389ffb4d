use crate::air_unit::AirUnit;
use crate::connection::{self, TcpConnection};
use crate::discovery::{self, Discovery, DiscoveryCache};
use std::sync::Arc;
use tracing::info;

#[derive(thiserror::Error, Debug)]
pub enum LocateError {
    #[error("no air unit found on the local network")]
    NotFound,
}

fn runtime() -> std::io::Result<tokio::runtime::Runtime> {
    tokio::runtime::Builder::new_current_thread().enable_all().build()
}

/// Connect to the air unit named by `--host`, or to whichever one answers a discovery scan.
async fn air_unit(
    connection: connection::Args,
    discovery: discovery::Args,
) -> Result<AirUnit<TcpConnection>, LocateError> {
    let host = match &connection.host {
        Some(host) => host.clone(),
        None => {
            let discovery = Discovery::new(discovery, Arc::new(DiscoveryCache::default()));
            discovery.scan_for_device().await;
            discovery.cache().host().ok_or(LocateError::NotFound)?
        }
    };
    info!(message = "using air unit", %host);
    Ok(AirUnit::new(TcpConnection::new(host, connection)))
}

pub mod discover {
    use super::*;

    /// Look for an air unit on the local network and print its host name.
    #[derive(clap::Parser)]
    pub struct Args {
        #[clap(flatten)]
        discovery: discovery::Args,
    }

    #[derive(thiserror::Error, Debug)]
    pub enum Error {
        #[error("could not start the async runtime")]
        Runtime(#[source] std::io::Error),
        #[error(transparent)]
        Locate(#[from] LocateError),
    }

    pub fn run(args: Args) -> Result<(), Error> {
        let runtime = runtime().map_err(Error::Runtime)?;
        let cache = Arc::new(DiscoveryCache::default());
        let discovery = Discovery::new(args.discovery, Arc::clone(&cache));
        runtime.block_on(discovery.scan_for_device());
        let host = cache.host().ok_or(LocateError::NotFound)?;
        println!("{host}");
        Ok(())
    }
}

pub mod read {
    use super::*;
    use crate::output;
    use crate::registers::{PROPERTIES, Property};

    /// Read out the current values of the air unit properties.
    #[derive(clap::Parser)]
    pub struct Args {
        /// Only read the properties whose name, description or address contains this text.
        filter: Option<String>,
        #[clap(flatten)]
        connection: connection::Args,
        #[clap(flatten)]
        discovery: discovery::Args,
        #[clap(flatten)]
        output: output::Args,
    }

    #[derive(thiserror::Error, Debug)]
    pub enum Error {
        #[error("could not start the async runtime")]
        Runtime(#[source] std::io::Error),
        #[error(transparent)]
        Locate(#[from] LocateError),
        #[error("no property matches `{0}`")]
        NoMatch(String),
        #[error("could not read `{1}`")]
        Read(#[source] crate::air_unit::Error, &'static str),
        #[error("could not output the values")]
        Output(#[from] output::Error),
    }

    #[derive(serde::Serialize)]
    struct Record<'a> {
        property: &'static str,
        value: &'a crate::air_unit::PropertyValue,
    }

    pub fn run(args: Args) -> Result<(), Error> {
        let properties = PROPERTIES
            .iter()
            .filter(|p| args.filter.as_ref().is_none_or(|f| p.is_match(f)))
            .collect::<Vec<&Property>>();
        if properties.is_empty() {
            return Err(Error::NoMatch(args.filter.unwrap_or_default()));
        }
        let Args { connection, discovery, output, .. } = args;
        let runtime = runtime().map_err(Error::Runtime)?;
        let values = runtime.block_on(async {
            let unit = air_unit(connection, discovery).await?;
            let mut values = Vec::with_capacity(properties.len());
            for property in properties {
                let value = unit.read_property(property).await;
                values.push((property, value.map_err(|e| Error::Read(e, property.name))?));
            }
            Ok::<_, Error>(values)
        })?;
        let mut output = output.open(&["Property", "Value", "Description"])?;
        for (property, value) in &values {
            let cells = vec![
                property.name.to_string(),
                value.to_string(),
                property.description.to_string(),
            ];
            output.row(cells, &Record { property: property.name, value })?;
        }
        output.finish()?;
        Ok(())
    }
}

pub mod state {
    use super::*;

    /// Read out every property and print them as a single JSON document.
    #[derive(clap::Parser)]
    pub struct Args {
        #[clap(flatten)]
        connection: connection::Args,
        #[clap(flatten)]
        discovery: discovery::Args,
    }

    #[derive(thiserror::Error, Debug)]
    pub enum Error {
        #[error("could not start the async runtime")]
        Runtime(#[source] std::io::Error),
        #[error(transparent)]
        Locate(#[from] LocateError),
        #[error("could not read the air unit state")]
        Read(#[from] crate::air_unit::Error),
        #[error("could not serialize the air unit state to JSON")]
        SerializeJson(#[source] serde_json::Error),
    }

    pub fn run(args: Args) -> Result<(), Error> {
        let runtime = runtime().map_err(Error::Runtime)?;
        let state = runtime.block_on(async {
            let unit = air_unit(args.connection, args.discovery).await?;
            Ok::<_, Error>(unit.fetch_state().await?)
        })?;
        let json = serde_json::to_string_pretty(&state).map_err(Error::SerializeJson)?;
        println!("{json}");
        Ok(())
    }
}

pub mod set {
    use super::*;
    use crate::air_unit::PropertyValue;
    use crate::mode::WritableMode;
    use crate::registers::{self, Property};

    #[derive(clap::ValueEnum, Clone, Copy, Debug)]
    pub enum Switch {
        On,
        Off,
    }

    impl From<Switch> for bool {
        fn from(switch: Switch) -> bool {
            matches!(switch, Switch::On)
        }
    }

    fn parse_mode(mode: &str) -> Result<WritableMode, strum::ParseError> {
        mode.parse()
    }

    #[derive(clap::Subcommand, Clone, Debug)]
    pub enum Setting {
        /// Switch boost ventilation on or off.
        Boost {
            #[arg(value_enum)]
            switch: Switch,
        },
        /// Switch night cooling on or off.
        NightCooling {
            #[arg(value_enum)]
            switch: Switch,
        },
        /// Switch the heat exchanger bypass on or off.
        Bypass {
            #[arg(value_enum)]
            switch: Switch,
        },
        /// Change the operating mode: demand, program, manual or off.
        Mode {
            #[arg(value_parser = parse_mode)]
            mode: WritableMode,
        },
        /// Set the fan speed used in manual mode, in percent. Rounded to steps of ten.
        ManualFanStep {
            #[arg(value_parser = clap::value_parser!(u8).range(0..=100))]
            percent: u8,
        },
    }

    /// Change a setting of the air unit.
    #[derive(clap::Parser)]
    pub struct Args {
        #[command(subcommand)]
        setting: Setting,
        #[clap(flatten)]
        connection: connection::Args,
        #[clap(flatten)]
        discovery: discovery::Args,
    }

    #[derive(thiserror::Error, Debug)]
    pub enum Error {
        #[error("could not start the async runtime")]
        Runtime(#[source] std::io::Error),
        #[error(transparent)]
        Locate(#[from] LocateError),
        #[error("could not write `{1}`")]
        Write(#[source] crate::air_unit::Error, &'static str),
        #[error("could not read back `{1}`")]
        ReadBack(#[source] crate::air_unit::Error, &'static str),
    }

    pub fn run(args: Args) -> Result<(), Error> {
        let runtime = runtime().map_err(Error::Runtime)?;
        let value = runtime.block_on(async {
            let unit = air_unit(args.connection, args.discovery).await?;
            let (property, result): (&Property, _) = match args.setting {
                Setting::Boost { switch } => (&registers::BOOST, unit.set_boost(switch.into()).await),
                Setting::NightCooling { switch } => {
                    (&registers::NIGHT_COOLING, unit.set_night_cooling(switch.into()).await)
                }
                Setting::Bypass { switch } => {
                    (&registers::BYPASS, unit.set_bypass(switch.into()).await)
                }
                Setting::Mode { mode } => (&registers::MODE, unit.set_writable_mode(mode).await),
                Setting::ManualFanStep { percent } => {
                    (&registers::MANUAL_FAN_STEP, unit.set_manual_fan_step(percent).await)
                }
            };
            result.map_err(|e| Error::Write(e, property.name))?;
            let value = unit.read_property(property).await;
            Ok::<(&Property, PropertyValue), Error>((
                property,
                value.map_err(|e| Error::ReadBack(e, property.name))?,
            ))
        })?;
        let (property, value) = value;
        println!("{}: {value}", property.name);
        Ok(())
    }
}

pub mod registers {
    use crate::output;
    use crate::registers::{PROPERTIES, Property};

    /// List the registers this tool knows about.
    #[derive(clap::Parser)]
    pub struct Args {
        /// Only list the properties whose name, description or address contains this text.
        filter: Option<String>,
        #[clap(flatten)]
        output: output::Args,
    }

    #[derive(thiserror::Error, Debug)]
    pub enum Error {
        #[error("could not output the register list")]
        Output(#[from] output::Error),
    }

    pub fn run(args: Args) -> Result<(), Error> {
        let header = ["Name", "Operation", "Address", "Access", "Kind", "Description"];
        let mut output = args.output.open(&header)?;
        for property in PROPERTIES {
            if let Some(pattern) = &args.filter {
                if !property.is_match(pattern) {
                    continue;
                }
            }
            output.row(cells(property), property)?;
        }
        output.finish()?;
        Ok(())
    }

    fn cells(property: &Property) -> Vec<String> {
        vec![
            property.name.to_string(),
            property.read.to_string(),
            property.address.to_string(),
            property.access.to_string(),
            property.kind.to_string(),
            property.description.to_string(),
        ]
    }
}
