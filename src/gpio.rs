//! Minimal sysfs GPIO access for the key line and the amplifier enable.
//!
//! Pin export and direction are assumed to be done by the platform setup;
//! this only reads and writes the value file.

use std::fs;
use std::io;
use std::path::PathBuf;

pub struct SysfsPin {
    value_path: PathBuf,
}

impl SysfsPin {
    pub fn new(pin: u32) -> Self {
        Self {
            value_path: PathBuf::from(format!("/sys/class/gpio/gpio{}/value", pin)),
        }
    }

    #[cfg(test)]
    pub fn with_value_path(path: PathBuf) -> Self {
        Self { value_path: path }
    }

    /// Current level of the line.
    pub fn read(&self) -> io::Result<bool> {
        let raw = fs::read_to_string(&self.value_path)?;
        Ok(raw.trim_start().starts_with('1'))
    }

    /// Drive the line high or low.
    pub fn write(&self, high: bool) -> io::Result<()> {
        fs::write(&self.value_path, if high { "1" } else { "0" })
    }
}
