//! Serial port transport using tokio-serial.

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use log::{debug, warn};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio_serial::{SerialPort, SerialPortBuilderExt, SerialStream};

use super::config::{DataBits, Parity, SerialConfig, StopBits};
use super::{Transport, TransportKind};
use crate::error::TransportError;

const CHUNK_SIZE: usize = 1024;

impl From<DataBits> for tokio_serial::DataBits {
    fn from(bits: DataBits) -> Self {
        match bits {
            DataBits::Five => tokio_serial::DataBits::Five,
            DataBits::Six => tokio_serial::DataBits::Six,
            DataBits::Seven => tokio_serial::DataBits::Seven,
            DataBits::Eight => tokio_serial::DataBits::Eight,
        }
    }
}

impl From<Parity> for tokio_serial::Parity {
    fn from(parity: Parity) -> Self {
        match parity {
            Parity::None => tokio_serial::Parity::None,
            Parity::Odd => tokio_serial::Parity::Odd,
            Parity::Even => tokio_serial::Parity::Even,
        }
    }
}

impl From<StopBits> for tokio_serial::StopBits {
    fn from(bits: StopBits) -> Self {
        match bits {
            StopBits::One => tokio_serial::StopBits::One,
            StopBits::Two => tokio_serial::StopBits::Two,
        }
    }
}

/// Serial port transport.
pub struct SerialTransport {
    config: SerialConfig,
    port: Option<SerialStream>,
}

impl SerialTransport {
    /// Open the configured port.
    pub fn open(config: SerialConfig) -> Result<Self, TransportError> {
        let port = tokio_serial::new(&config.port, config.baud_rate)
            .data_bits(config.data_bits.into())
            .parity(config.parity.into())
            .stop_bits(config.stop_bits.into())
            .timeout(config.timeout)
            .open_native_async()
            .map_err(|e| TransportError::Serial {
                port: config.port.clone(),
                message: e.to_string(),
            })?;

        debug!(
            "Opened serial port {} at {} baud",
            config.port, config.baud_rate
        );
        Ok(Self {
            config,
            port: Some(port),
        })
    }
}

#[async_trait]
impl Transport for SerialTransport {
    async fn send(&mut self, data: &[u8]) -> Result<(), TransportError> {
        let port = self.port.as_mut().ok_or(TransportError::Disconnected)?;
        port.write_all(data).await?;
        port.flush().await?;
        Ok(())
    }

    async fn receive(&mut self) -> Result<Option<Bytes>, TransportError> {
        let Some(port) = self.port.as_mut() else {
            return Ok(None);
        };

        let mut buf = vec![0u8; CHUNK_SIZE];
        loop {
            match port.read(&mut buf).await {
                // A serial line has no end of stream; a zero read is just idle
                Ok(0) => tokio::time::sleep(Duration::from_millis(10)).await,
                Ok(n) => {
                    buf.truncate(n);
                    return Ok(Some(Bytes::from(buf)));
                }
                Err(e) if e.kind() == std::io::ErrorKind::TimedOut => continue,
                Err(e) => return Err(e.into()),
            }
        }
    }

    fn set_timeout(&mut self, timeout: Duration) -> bool {
        self.config.timeout = timeout;
        match self.port.as_mut() {
            Some(port) => match port.set_timeout(timeout) {
                Ok(()) => true,
                Err(e) => {
                    warn!("Failed to set timeout on {}: {}", self.config.port, e);
                    false
                }
            },
            None => false,
        }
    }

    fn is_connected(&self) -> bool {
        self.port.is_some()
    }

    async fn close(&mut self) -> bool {
        self.port.take().is_some()
    }

    fn kind(&self) -> TransportKind {
        TransportKind::Serial
    }

    fn peer(&self) -> String {
        format!("serial://{}@{}", self.config.port, self.config.baud_rate)
    }

    fn bytes_waiting(&self) -> Option<usize> {
        self.port
            .as_ref()
            .and_then(|port| port.bytes_to_read().ok())
            .map(|n| n as usize)
    }
}
