//! Serial port channel implementation
//!
//! Provides the [`Channel`] used against real hardware and the port
//! enumeration used to find the controller.
//!
//! Supports:
//! - Port enumeration and discovery by USB vendor/product id
//! - Baud rate and RTS/CTS flow control configuration
//! - Non-blocking reads of whatever the driver has buffered

use super::Channel;
use std::io::{self, Read, Write};
use std::time::Duration;
use tinyg_link_core::{ConnectionError, Error, Result};
use tinyg_link_settings::ConnectionSettings;

/// USB vendor id of the FTDI bridge on the controller board
pub const TINYG_USB_VID: u16 = 0x0403;
/// USB product id of the FTDI bridge on the controller board
pub const TINYG_USB_PID: u16 = 0x6015;

/// Information about an available serial port
#[derive(Debug, Clone)]
pub struct SerialPortInfo {
    /// Port name (e.g., "/dev/ttyUSB0", "COM3")
    pub port_name: String,

    /// Port description (e.g., "USB Serial Port")
    pub description: String,

    /// Manufacturer name if available
    pub manufacturer: Option<String>,

    /// Serial number if available
    pub serial_number: Option<String>,

    /// USB vendor ID if applicable
    pub vid: Option<u16>,

    /// USB product ID if applicable
    pub pid: Option<u16>,
}

impl SerialPortInfo {
    /// Create a new port info
    pub fn new(port_name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            port_name: port_name.into(),
            description: description.into(),
            manufacturer: None,
            serial_number: None,
            vid: None,
            pid: None,
        }
    }

    /// Set manufacturer
    pub fn with_manufacturer(mut self, manufacturer: impl Into<String>) -> Self {
        self.manufacturer = Some(manufacturer.into());
        self
    }

    /// Set serial number
    pub fn with_serial_number(mut self, serial_number: impl Into<String>) -> Self {
        self.serial_number = Some(serial_number.into());
        self
    }

    /// Set USB IDs
    pub fn with_usb_ids(mut self, vid: u16, pid: u16) -> Self {
        self.vid = Some(vid);
        self.pid = Some(pid);
        self
    }

    /// Whether this port is the controller's USB bridge
    pub fn is_tinyg(&self) -> bool {
        self.vid == Some(TINYG_USB_VID) && self.pid == Some(TINYG_USB_PID)
    }
}

/// List available serial ports on the system
///
/// Only device names that look like USB or RS-232 adapters are returned:
/// - Windows: COM* (e.g., COM1, COM3)
/// - Linux: /dev/ttyUSB*, /dev/ttyACM*
/// - macOS: /dev/cu.usbserial-*, /dev/cu.usbmodem*
pub fn list_ports() -> Result<Vec<SerialPortInfo>> {
    let ports = serialport::available_ports().map_err(|e| {
        tracing::error!("Failed to enumerate serial ports: {}", e);
        Error::other(format!("Failed to enumerate ports: {}", e))
    })?;

    Ok(ports
        .iter()
        .filter(|port| is_valid_controller_port(&port.port_name))
        .map(|port| {
            let info = SerialPortInfo::new(&port.port_name, get_port_description(port));

            match &port.port_type {
                serialport::SerialPortType::UsbPort(usb_info) => {
                    let mut info = info.with_usb_ids(usb_info.vid, usb_info.pid);
                    if let Some(ref mfg) = usb_info.manufacturer {
                        info = info.with_manufacturer(mfg);
                    }
                    if let Some(ref serial) = usb_info.serial_number {
                        info = info.with_serial_number(serial);
                    }
                    info
                }
                _ => info,
            }
        })
        .collect())
}

/// Find the port the controller is attached to
pub fn find_tinyg_port() -> Result<String> {
    select_tinyg_port(&list_ports()?).ok_or_else(|| {
        ConnectionError::PortNotFound {
            port: format!("VID:PID={:04X}:{:04X}", TINYG_USB_VID, TINYG_USB_PID),
        }
        .into()
    })
}

fn select_tinyg_port(ports: &[SerialPortInfo]) -> Option<String> {
    ports
        .iter()
        .find(|port| port.is_tinyg())
        .map(|port| port.port_name.clone())
}

fn is_valid_controller_port(port_name: &str) -> bool {
    if let Some(number) = port_name.strip_prefix("COM") {
        return !number.is_empty() && number.chars().all(|c| c.is_ascii_digit());
    }

    port_name.starts_with("/dev/ttyUSB")
        || port_name.starts_with("/dev/ttyACM")
        || port_name.starts_with("/dev/cu.usbserial-")
        || port_name.starts_with("/dev/cu.usbmodem")
}

/// Get a user-friendly description for a port
fn get_port_description(port: &serialport::SerialPortInfo) -> String {
    match &port.port_type {
        serialport::SerialPortType::UsbPort(usb_info) => {
            format!(
                "USB {} {}",
                usb_info.manufacturer.as_deref().unwrap_or("Device"),
                usb_info.product.as_deref().unwrap_or("Serial Port")
            )
        }
        serialport::SerialPortType::BluetoothPort => "Bluetooth Serial".to_string(),
        serialport::SerialPortType::PciPort => "PCI Serial".to_string(),
        _ => "Serial Port".to_string(),
    }
}

/// Serial port channel backed by the `serialport` crate
pub struct SerialChannel {
    port: Box<dyn serialport::SerialPort>,
    name: String,
}

impl SerialChannel {
    /// Open the port named in `settings`, discovering it when set to "auto"
    ///
    /// The port opens without flow control; the link turns RTS/CTS on once
    /// the controller has been told to use it.
    pub fn open(settings: &ConnectionSettings) -> Result<Self> {
        if settings.baud_rate == 0 {
            return Err(ConnectionError::InvalidParameters {
                reason: "baud rate must be > 0".to_string(),
            }
            .into());
        }

        let name = if settings.is_auto_port() {
            find_tinyg_port()?
        } else {
            settings.port.clone()
        };

        let port = serialport::new(&name, settings.baud_rate)
            .timeout(Duration::from_millis(settings.timeout_ms))
            .data_bits(serialport::DataBits::Eight)
            .stop_bits(serialport::StopBits::One)
            .parity(serialport::Parity::None)
            .flow_control(serialport::FlowControl::None)
            .open()
            .map_err(|e| {
                tracing::warn!("Failed to open serial port {}: {}", name, e);
                ConnectionError::FailedToOpen {
                    port: name.clone(),
                    reason: e.to_string(),
                }
            })?;

        tracing::info!("Opened {} at {} baud", name, settings.baud_rate);
        Ok(Self { port, name })
    }
}

impl Channel for SerialChannel {
    fn write_all(&mut self, data: &[u8]) -> io::Result<()> {
        self.port.write_all(data)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.port.flush()
    }

    fn bytes_pending(&self) -> io::Result<usize> {
        Ok(self.port.bytes_to_read()? as usize)
    }

    fn read_available(&mut self) -> io::Result<Vec<u8>> {
        let pending = self.bytes_pending()?;
        if pending == 0 {
            return Ok(Vec::new());
        }

        let mut buf = vec![0u8; pending];
        match self.port.read(&mut buf) {
            Ok(n) => {
                buf.truncate(n);
                Ok(buf)
            }
            Err(e) if e.kind() == io::ErrorKind::TimedOut => Ok(Vec::new()),
            Err(e) => Err(e),
        }
    }

    fn clear_input(&mut self) -> io::Result<()> {
        Ok(self.port.clear(serialport::ClearBuffer::Input)?)
    }

    fn clear_output(&mut self) -> io::Result<()> {
        Ok(self.port.clear(serialport::ClearBuffer::Output)?)
    }

    fn set_hardware_flow_control(&mut self, enabled: bool) -> io::Result<()> {
        let flow = if enabled {
            serialport::FlowControl::Hardware
        } else {
            serialport::FlowControl::None
        };
        Ok(self.port.set_flow_control(flow)?)
    }

    fn name(&self) -> String {
        self.name.clone()
    }
}
