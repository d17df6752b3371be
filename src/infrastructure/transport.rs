// Byte sources for the wristband link
use crate::infrastructure::config::{TransportConfig, TransportKind};
use anyhow::{Context, Result};
use tokio::io::AsyncRead;
use tokio_serial::SerialPortBuilderExt;

pub type ByteSource = Box<dyn AsyncRead + Send + Unpin>;

/// Open the configured link. Serial ports are 8N1 without flow control.
pub async fn open(config: &TransportConfig) -> Result<ByteSource> {
    match config.kind {
        TransportKind::Serial => {
            let port = tokio_serial::new(config.path.as_str(), config.baud_rate)
                .data_bits(tokio_serial::DataBits::Eight)
                .parity(tokio_serial::Parity::None)
                .stop_bits(tokio_serial::StopBits::One)
                .flow_control(tokio_serial::FlowControl::None)
                .open_native_async()
                .with_context(|| format!("Failed to open serial port {}", config.path))?;
            Ok(Box::new(port))
        }
        TransportKind::Tcp => {
            let stream = tokio::net::TcpStream::connect(&config.address)
                .await
                .with_context(|| format!("Failed to connect to {}", config.address))?;
            Ok(Box::new(stream))
        }
        TransportKind::File => {
            let file = tokio::fs::File::open(&config.path)
                .await
                .with_context(|| format!("Failed to open replay file {}", config.path))?;
            Ok(Box::new(file))
        }
    }
}
