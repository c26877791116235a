use super::{BaudRate, SerialBackend};
use crate::error::TransportError;
use crate::simulator::TemperatureModel;
use chrono::Utc;

/// In-process sensor: every read that finds nothing pending produces one
/// fresh `"<temperature>\n"` line from the waveform. Writes are discarded.
pub struct SimulatedBackend {
    device: String,
    baud_rate: u32,
    model: TemperatureModel,
    pending: Vec<u8>,
    open: bool,
}

impl SimulatedBackend {
    pub fn new(device: &str, baud_rate: u32, model: TemperatureModel) -> Self {
        tracing::info!(device, "using simulated serial backend (no hardware access)");
        Self { device: device.to_string(), baud_rate, model, pending: Vec::new(), open: false }
    }
}

impl SerialBackend for SimulatedBackend {
    fn device(&self) -> &str {
        &self.device
    }

    fn baud_rate(&self) -> u32 {
        self.baud_rate
    }

    fn open(&mut self, _baud: BaudRate) -> Result<(), TransportError> {
        self.open = true;
        Ok(())
    }

    fn close(&mut self) {
        self.open = false;
        self.pending.clear();
    }

    fn read(&mut self, buf: &mut [u8]) -> Result<usize, TransportError> {
        if !self.open {
            return Err(TransportError::NotOpen);
        }
        if self.pending.is_empty() {
            let temperature = self.model.temperature_at(Utc::now());
            self.pending = format!("{temperature:.3}\n").into_bytes();
        }
        let n = self.pending.len().min(buf.len());
        buf[..n].copy_from_slice(&self.pending[..n]);
        self.pending.drain(..n);
        Ok(n)
    }

    fn write(&mut self, data: &[u8]) -> Result<usize, TransportError> {
        tracing::debug!(bytes = data.len(), "[SIM] write discarded");
        Ok(data.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::LineTransport;

    #[test]
    fn produces_parseable_lines() {
        let model = TemperatureModel::new(20.0, 15.0, 1.0);
        let mut transport = LineTransport::new(SimulatedBackend::new("sim0", 9600, model));
        transport.open().unwrap();

        for _ in 0..3 {
            let line = transport.read_line().unwrap();
            let value: f64 = line.parse().expect("numeric line");
            assert!((-100.0..=100.0).contains(&value));
        }
    }

    #[test]
    fn small_reads_are_stitched_back_together() {
        let model = TemperatureModel::new(20.0, 0.0, 0.0);
        let mut backend = SimulatedBackend::new("sim0", 9600, model);
        backend.open(BaudRate::B9600).unwrap();

        let mut collected = Vec::new();
        let mut byte = [0u8; 1];
        while collected.last() != Some(&b'\n') {
            assert_eq!(backend.read(&mut byte).unwrap(), 1);
            collected.push(byte[0]);
        }
        let text = String::from_utf8(collected).unwrap();
        assert!(text.trim_end().parse::<f64>().is_ok(), "{text:?}");
    }
}
