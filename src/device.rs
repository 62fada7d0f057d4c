//! Device lookup by index. Indices follow cpal's enumeration order for the default host,
//! counted separately for input and output devices.

use cpal::traits::{DeviceTrait, HostTrait};
use cpal::{Device, Host};

use crate::session::{SessionError, SessionResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Input,
    Output,
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Direction::Input => write!(f, "input"),
            Direction::Output => write!(f, "output"),
        }
    }
}

/// What a device reports as its preferred stream format.
#[derive(Debug, Clone, PartialEq)]
pub struct DeviceInfo {
    pub index: usize,
    pub name: String,
    pub channels: u16,
    pub sample_rate: u32,
}

/// Finds the device at `index`, or the host's default device when `index` is `None`.
pub fn find_device(host: &Host, direction: Direction, index: Option<usize>) -> SessionResult<Device> {
    let device = match index {
        Some(i) => {
            let mut devices: Box<dyn Iterator<Item = Device>> = match direction {
                Direction::Input => Box::new(host.input_devices()?),
                Direction::Output => Box::new(host.output_devices()?),
            };
            devices
                .nth(i)
                .ok_or(SessionError::DeviceNotFound { direction, index: i })?
        }
        None => match direction {
            Direction::Input => host.default_input_device(),
            Direction::Output => host.default_output_device(),
        }
        .ok_or(SessionError::NoDefaultDevice(direction))?,
    };
    log::info!("Using {} device: {}", direction, device_name(&device));
    Ok(device)
}

/// Default channel count and sample rate of a device.
pub fn describe(device: &Device, direction: Direction) -> SessionResult<(u16, u32)> {
    let config = match direction {
        Direction::Input => device.default_input_config()?,
        Direction::Output => device.default_output_config()?,
    };
    Ok((config.channels(), config.sample_rate()))
}

/// Every device of one direction with its default format. Devices whose format cannot be
/// queried are skipped.
pub fn list_devices(host: &Host, direction: Direction) -> SessionResult<Vec<DeviceInfo>> {
    let devices: Vec<Device> = match direction {
        Direction::Input => host.input_devices()?.collect(),
        Direction::Output => host.output_devices()?.collect(),
    };
    Ok(devices
        .iter()
        .enumerate()
        .filter_map(|(index, device)| {
            let (channels, sample_rate) = describe(device, direction).ok()?;
            Some(DeviceInfo {
                index,
                name: device_name(device),
                channels,
                sample_rate,
            })
        })
        .collect())
}

#[allow(deprecated)]
fn device_name(device: &Device) -> String {
    device.name().unwrap_or_else(|_| "Unknown".to_string())
}
