//! ==============================================================================
//! transport - Serial Line Transport
//! ==============================================================================
//!
//! purpose:
//!     provides a unified, line-oriented interface to the temperature sensor.
//!     abstracts away the difference between a real serial device
//!     (`rppal` uart, feature = "hardware") and the in-process simulated
//!     sensor used on development machines.
//!
//! design:
//!     - SerialBackend: raw byte access (open/close/read/write). One impl per
//!       device kind, chosen from the config at startup.
//!     - LineTransport: the Closed/Open state machine plus the fixed-capacity
//!       line buffer that turns byte chunks into newline-delimited lines.
//!       The aggregation engine never sees backend details.
//!
//! relationships:
//!     - used by: service.rs (one ReadLine per measurement tick)
//!     - used by: bin/simulator.rs (writes lines to a real port)
//!     - uses: uart.rs (rppal), simulated.rs (TemperatureModel)
//!
//! ==============================================================================

mod simulated;
#[cfg(all(feature = "hardware", target_os = "linux"))]
mod uart;

pub use simulated::SimulatedBackend;
#[cfg(all(feature = "hardware", target_os = "linux"))]
pub use uart::UartBackend;

use crate::config::{BackendKind, SerialConfig, SimulatorConfig};
use crate::error::{ConfigError, TransportError};
use crate::simulator::TemperatureModel;

/// Size of the internal line buffer. A line longer than this is discarded.
pub const LINE_BUFFER_CAPACITY: usize = 256;

/// The explicitly supported baud rates. Anything else is a configuration
/// error, never clamped to a neighbour.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BaudRate {
    B9600,
    B115200,
}

impl BaudRate {
    pub fn as_u32(self) -> u32 {
        match self {
            BaudRate::B9600 => 9600,
            BaudRate::B115200 => 115_200,
        }
    }
}

impl TryFrom<u32> for BaudRate {
    type Error = ConfigError;

    fn try_from(rate: u32) -> Result<Self, Self::Error> {
        match rate {
            9600 => Ok(BaudRate::B9600),
            115_200 => Ok(BaudRate::B115200),
            other => Err(ConfigError::UnsupportedBaudRate(other)),
        }
    }
}

// ==============================================================================
// backend trait
// ==============================================================================

/// Raw byte access to one serial device.
///
/// `LineTransport` owns the state machine, so backends may assume `open` is
/// only called while closed and `read`/`write` only while open.
pub trait SerialBackend: Send {
    /// device identifier for diagnostics
    fn device(&self) -> &str;
    /// requested baud rate, validated by the transport before `open`
    fn baud_rate(&self) -> u32;
    /// 8N1, raw mode, no flow control
    fn open(&mut self, baud: BaudRate) -> Result<(), TransportError>;
    fn close(&mut self);
    /// 0 means "nothing right now" (EOF, timeout, interrupted), not an error
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, TransportError>;
    /// returns the number of bytes the device accepted
    fn write(&mut self, data: &[u8]) -> Result<usize, TransportError>;
}

impl<B: SerialBackend + ?Sized> SerialBackend for Box<B> {
    fn device(&self) -> &str {
        (**self).device()
    }
    fn baud_rate(&self) -> u32 {
        (**self).baud_rate()
    }
    fn open(&mut self, baud: BaudRate) -> Result<(), TransportError> {
        (**self).open(baud)
    }
    fn close(&mut self) {
        (**self).close()
    }
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, TransportError> {
        (**self).read(buf)
    }
    fn write(&mut self, data: &[u8]) -> Result<usize, TransportError> {
        (**self).write(data)
    }
}

/// Build the backend selected by `serial.backend`.
pub fn backend_for(
    serial: &SerialConfig,
    simulator: &SimulatorConfig,
) -> Result<Box<dyn SerialBackend>, ConfigError> {
    match serial.backend {
        BackendKind::Simulated => {
            let model = TemperatureModel::from_config(simulator);
            Ok(Box::new(SimulatedBackend::new(&serial.port, serial.baud_rate, model)))
        }
        #[cfg(all(feature = "hardware", target_os = "linux"))]
        BackendKind::Uart => {
            let timeout = serial.read_timeout_ms.map(std::time::Duration::from_millis);
            Ok(Box::new(UartBackend::new(&serial.port, serial.baud_rate, timeout)))
        }
        #[cfg(not(all(feature = "hardware", target_os = "linux")))]
        BackendKind::Uart => Err(ConfigError::BackendUnavailable("uart")),
    }
}

// ==============================================================================
// line transport
// ==============================================================================

/// Closed/Open state machine over a backend, with newline framing.
pub struct LineTransport<B: SerialBackend> {
    backend: B,
    open: bool,
    buffer: [u8; LINE_BUFFER_CAPACITY],
    filled: usize,
}

impl<B: SerialBackend> LineTransport<B> {
    pub fn new(backend: B) -> Self {
        Self { backend, open: false, buffer: [0; LINE_BUFFER_CAPACITY], filled: 0 }
    }

    pub fn device(&self) -> &str {
        self.backend.device()
    }

    /// Establish the connection. No-op when already open.
    ///
    /// An unsupported baud rate fails here as a configuration error, before
    /// the device is touched.
    pub fn open(&mut self) -> crate::Result<()> {
        if self.open {
            return Ok(());
        }
        let baud = BaudRate::try_from(self.backend.baud_rate())?;
        self.backend.open(baud)?;
        self.open = true;
        self.filled = 0;
        tracing::info!(device = self.backend.device(), baud = baud.as_u32(), "serial port open");
        Ok(())
    }

    /// Release the handle. No-op when already closed.
    pub fn close(&mut self) {
        if !self.open {
            return;
        }
        self.backend.close();
        self.open = false;
        self.filled = 0;
        tracing::info!(device = self.backend.device(), "serial port closed");
    }

    pub fn is_open(&self) -> bool {
        self.open
    }

    fn ensure_open(&self) -> Result<(), TransportError> {
        if self.open {
            Ok(())
        } else {
            Err(TransportError::NotOpen)
        }
    }

    /// Read whatever is available, up to `buf.len()` bytes.
    pub fn read(&mut self, buf: &mut [u8]) -> Result<usize, TransportError> {
        self.ensure_open()?;
        self.backend.read(buf)
    }

    /// Full blocking write; fewer bytes than requested is an error.
    pub fn write(&mut self, data: &[u8]) -> Result<(), TransportError> {
        self.ensure_open()?;
        let written = self.backend.write(data)?;
        if written != data.len() {
            return Err(TransportError::ShortWrite { written, expected: data.len() });
        }
        Ok(())
    }

    /// Next newline-delimited line, delimiter (and a trailing `\r`) stripped.
    ///
    /// Bytes after the newline stay buffered for the next call. If the device
    /// runs dry before a newline arrives, the partial content gathered so far
    /// is returned (possibly empty). A buffer full of bytes with no newline is
    /// dropped and reported as [`TransportError::LineTooLong`].
    pub fn read_line(&mut self) -> Result<String, TransportError> {
        self.ensure_open()?;

        loop {
            if let Some(pos) = self.buffer[..self.filled].iter().position(|&b| b == b'\n') {
                let line = decode_line(&self.buffer[..pos]);
                self.buffer.copy_within(pos + 1..self.filled, 0);
                self.filled -= pos + 1;
                return Ok(line);
            }

            if self.filled == LINE_BUFFER_CAPACITY {
                self.filled = 0;
                return Err(TransportError::LineTooLong { capacity: LINE_BUFFER_CAPACITY });
            }

            let n = self.backend.read(&mut self.buffer[self.filled..])?;
            if n == 0 {
                let partial = decode_line(&self.buffer[..self.filled]);
                self.filled = 0;
                return Ok(partial);
            }
            self.filled += n;
        }
    }
}

impl<B: SerialBackend> Drop for LineTransport<B> {
    fn drop(&mut self) {
        self.close();
    }
}

fn decode_line(bytes: &[u8]) -> String {
    let bytes = bytes.strip_suffix(b"\r").unwrap_or(bytes);
    String::from_utf8_lossy(bytes).into_owned()
}

// ==============================================================================
// tests
// ==============================================================================
#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::error::Error;
    use std::collections::VecDeque;
    use std::sync::{Arc, Mutex};

    /// In-memory backend fed with byte chunks; an exhausted script reads 0.
    pub(crate) struct ScriptedBackend {
        pub chunks: VecDeque<Vec<u8>>,
        pub written: Arc<Mutex<Vec<u8>>>,
        pub baud_rate: u32,
        pub fail_open: bool,
        pub accept_limit: Option<usize>,
        pub opens: usize,
    }

    impl ScriptedBackend {
        pub(crate) fn new<I, S>(chunks: I) -> Self
        where
            I: IntoIterator<Item = S>,
            S: AsRef<[u8]>,
        {
            Self {
                chunks: chunks.into_iter().map(|c| c.as_ref().to_vec()).collect(),
                written: Arc::new(Mutex::new(Vec::new())),
                baud_rate: 9600,
                fail_open: false,
                accept_limit: None,
                opens: 0,
            }
        }
    }

    impl SerialBackend for ScriptedBackend {
        fn device(&self) -> &str {
            "scripted"
        }
        fn baud_rate(&self) -> u32 {
            self.baud_rate
        }
        fn open(&mut self, _baud: BaudRate) -> Result<(), TransportError> {
            if self.fail_open {
                return Err(TransportError::Open {
                    device: "scripted".to_string(),
                    message: "No such file or directory (os error 2)".to_string(),
                });
            }
            self.opens += 1;
            Ok(())
        }
        fn close(&mut self) {}
        fn read(&mut self, buf: &mut [u8]) -> Result<usize, TransportError> {
            let Some(mut chunk) = self.chunks.pop_front() else {
                return Ok(0);
            };
            let n = chunk.len().min(buf.len());
            buf[..n].copy_from_slice(&chunk[..n]);
            if n < chunk.len() {
                self.chunks.push_front(chunk.split_off(n));
            }
            Ok(n)
        }
        fn write(&mut self, data: &[u8]) -> Result<usize, TransportError> {
            let n = self.accept_limit.map_or(data.len(), |limit| limit.min(data.len()));
            self.written.lock().unwrap().extend_from_slice(&data[..n]);
            Ok(n)
        }
    }

    fn open_transport(backend: ScriptedBackend) -> LineTransport<ScriptedBackend> {
        let mut transport = LineTransport::new(backend);
        transport.open().expect("open");
        transport
    }

    #[test]
    fn supported_baud_rates_round_trip() {
        assert_eq!(BaudRate::try_from(9600).unwrap().as_u32(), 9600);
        assert_eq!(BaudRate::try_from(115_200).unwrap().as_u32(), 115_200);
        assert!(matches!(BaudRate::try_from(57_600), Err(ConfigError::UnsupportedBaudRate(57_600))));
    }

    #[test]
    fn open_rejects_unsupported_baud_before_touching_device() {
        let mut backend = ScriptedBackend::new(Vec::<&[u8]>::new());
        backend.baud_rate = 4800;
        let mut transport = LineTransport::new(backend);

        let err = transport.open().unwrap_err();
        assert!(matches!(err, Error::Config(ConfigError::UnsupportedBaudRate(4800))));
        assert!(!transport.is_open());
        assert_eq!(transport.backend.opens, 0);
    }

    #[test]
    fn open_failure_carries_os_diagnostic() {
        let mut backend = ScriptedBackend::new(Vec::<&[u8]>::new());
        backend.fail_open = true;
        let mut transport = LineTransport::new(backend);

        let err = transport.open().unwrap_err();
        assert!(err.to_string().contains("No such file or directory"));
        assert!(!transport.is_open());
    }

    #[test]
    fn open_and_close_are_idempotent() {
        let mut transport = open_transport(ScriptedBackend::new(Vec::<&[u8]>::new()));
        transport.open().unwrap();
        assert_eq!(transport.backend.opens, 1);

        transport.close();
        transport.close();
        assert!(!transport.is_open());
    }

    #[test]
    fn operations_require_open_state() {
        let mut transport = LineTransport::new(ScriptedBackend::new(["21.5\n"]));
        assert!(matches!(transport.read_line(), Err(TransportError::NotOpen)));
        assert!(matches!(transport.write(b"x"), Err(TransportError::NotOpen)));
        let mut buf = [0u8; 4];
        assert!(matches!(transport.read(&mut buf), Err(TransportError::NotOpen)));
    }

    #[test]
    fn read_line_splits_and_keeps_remainder() {
        let mut transport = open_transport(ScriptedBackend::new(["21.5\n22.", "0\n23.25\r\n"]));

        assert_eq!(transport.read_line().unwrap(), "21.5");
        assert_eq!(transport.read_line().unwrap(), "22.0");
        assert_eq!(transport.read_line().unwrap(), "23.25");
        assert_eq!(transport.read_line().unwrap(), "");
    }

    #[test]
    fn read_line_returns_partial_content_when_device_runs_dry() {
        let mut transport = open_transport(ScriptedBackend::new(["19.", "75"]));

        assert_eq!(transport.read_line().unwrap(), "19.75");
        // partial content was consumed
        assert_eq!(transport.read_line().unwrap(), "");
    }

    #[test]
    fn overlong_line_is_reported_and_discarded() {
        let noise = vec![b'7'; LINE_BUFFER_CAPACITY + 10];
        let mut transport = open_transport(ScriptedBackend::new([noise, b"\n20.5\n".to_vec()]));

        assert!(matches!(
            transport.read_line(),
            Err(TransportError::LineTooLong { capacity: LINE_BUFFER_CAPACITY })
        ));
        // the 10 leftover digits form the tail of the broken line
        assert_eq!(transport.read_line().unwrap(), "7777777777");
        assert_eq!(transport.read_line().unwrap(), "20.5");
    }

    #[test]
    fn write_delivers_all_bytes() {
        let backend = ScriptedBackend::new(Vec::<&[u8]>::new());
        let sink = Arc::clone(&backend.written);
        let mut transport = open_transport(backend);

        transport.write(b"20.5\n").unwrap();
        assert_eq!(sink.lock().unwrap().as_slice(), b"20.5\n");
    }

    #[test]
    fn short_write_is_an_error() {
        let mut backend = ScriptedBackend::new(Vec::<&[u8]>::new());
        backend.accept_limit = Some(2);
        let mut transport = open_transport(backend);

        assert!(matches!(
            transport.write(b"20.5\n"),
            Err(TransportError::ShortWrite { written: 2, expected: 5 })
        ));
    }

    #[test]
    fn simulated_backend_is_always_available() {
        let serial = SerialConfig { backend: BackendKind::Simulated, ..SerialConfig::default() };
        let backend = backend_for(&serial, &SimulatorConfig::default()).expect("simulated backend");
        assert_eq!(backend.device(), serial.port);
    }
}
