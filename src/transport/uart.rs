//! ==============================================================================
//! uart.rs - REAL serial backend (rppal)
//! ==============================================================================
//!
//! configures the tty exactly once at open:
//!     - 8 data bits, no parity, 1 stop bit
//!     - raw (non-canonical) mode, no echo (rppal puts the fd in raw mode)
//!     - no hardware (RTS/CTS) or software (XON/XOFF) flow control
//!     - blocking read that waits for at least 1 byte, unless a read
//!       timeout is configured
//!
//! ==============================================================================

use super::{BaudRate, SerialBackend};
use crate::error::TransportError;
use rppal::uart::{Error as UartError, Parity, Uart};
use std::io::ErrorKind;
use std::time::Duration;

pub struct UartBackend {
    device: String,
    baud_rate: u32,
    read_timeout: Option<Duration>,
    uart: Option<Uart>,
}

impl UartBackend {
    pub fn new(device: &str, baud_rate: u32, read_timeout: Option<Duration>) -> Self {
        tracing::info!(device, "using REAL serial backend (rppal uart)");
        Self { device: device.to_string(), baud_rate, read_timeout, uart: None }
    }

    fn configure(&self, baud: BaudRate) -> Result<Uart, UartError> {
        let mut uart = Uart::with_path(&self.device, baud.as_u32(), Parity::None, 8, 1)?;
        uart.set_hardware_flow_control(false)?;
        uart.set_software_flow_control(false)?;
        match self.read_timeout {
            // VMIN=0/VTIME=t: a silent device yields 0 bytes after the timeout
            Some(timeout) => uart.set_read_mode(0, timeout)?,
            None => uart.set_read_mode(1, Duration::default())?,
        }
        uart.set_write_mode(true)?;
        Ok(uart)
    }

    fn port(&mut self) -> Result<&mut Uart, TransportError> {
        self.uart.as_mut().ok_or(TransportError::NotOpen)
    }
}

impl SerialBackend for UartBackend {
    fn device(&self) -> &str {
        &self.device
    }

    fn baud_rate(&self) -> u32 {
        self.baud_rate
    }

    fn open(&mut self, baud: BaudRate) -> Result<(), TransportError> {
        let uart = self.configure(baud).map_err(|e| TransportError::Open {
            device: self.device.clone(),
            message: e.to_string(),
        })?;
        self.uart = Some(uart);
        Ok(())
    }

    fn close(&mut self) {
        // dropping the Uart closes the file descriptor
        self.uart = None;
    }

    fn read(&mut self, buf: &mut [u8]) -> Result<usize, TransportError> {
        match self.port()?.read(buf) {
            Ok(n) => Ok(n),
            Err(UartError::Io(e))
                if matches!(
                    e.kind(),
                    ErrorKind::Interrupted | ErrorKind::WouldBlock | ErrorKind::TimedOut
                ) =>
            {
                Ok(0)
            }
            Err(e) => Err(TransportError::Read(e.to_string())),
        }
    }

    fn write(&mut self, data: &[u8]) -> Result<usize, TransportError> {
        self.port()?.write(data).map_err(|e| TransportError::Write(e.to_string()))
    }
}
