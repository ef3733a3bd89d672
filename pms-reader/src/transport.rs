use std::io;
use std::path::PathBuf;

use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio_serial::{DataBits, Parity, SerialPortBuilderExt, SerialStream, StopBits};
use tracing::debug;

use crate::config::{FlowControl, SerialConfig};

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("failed to open serial device {device}: {source}")]
    Open {
        device: PathBuf,
        #[source]
        source: tokio_serial::Error,
    },

    #[error("failed to write to serial device: {0}")]
    Write(#[source] io::Error),

    #[error("serial device is closed")]
    Closed,
}

impl From<FlowControl> for tokio_serial::FlowControl {
    fn from(value: FlowControl) -> Self {
        match value {
            FlowControl::None => tokio_serial::FlowControl::None,
            FlowControl::Software => tokio_serial::FlowControl::Software,
            FlowControl::Hardware => tokio_serial::FlowControl::Hardware,
        }
    }
}

/// Open the sensor's serial device as 8N1 at the configured baud rate.
///
/// Must be called from within a tokio runtime.
pub fn open(config: &SerialConfig) -> Result<SerialStream, TransportError> {
    tokio_serial::new(config.device.to_string_lossy(), config.baud_rate)
        .data_bits(DataBits::Eight)
        .parity(Parity::None)
        .stop_bits(StopBits::One)
        .flow_control(config.flow_control.into())
        .open_native_async()
        .map_err(|source| TransportError::Open {
            device: config.device.clone(),
            source,
        })
}

/// Write the whole of `buf`, retrying short writes with the remaining suffix.
pub async fn write_all<W>(writer: &mut W, mut buf: &[u8]) -> Result<(), TransportError>
where
    W: AsyncWrite + Unpin,
{
    let total = buf.len();
    let mut calls = 0u32;

    while !buf.is_empty() {
        calls += 1;
        let n = match writer.write(buf).await {
            Ok(0) => return Err(TransportError::Closed),
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(TransportError::Write(e)),
        };
        buf = &buf[n..];
    }

    writer.flush().await.map_err(TransportError::Write)?;
    debug!(bytes = total, calls, "Sent frame");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::pin::Pin;
    use std::task::{Context, Poll};

    /// Accepts at most `chunk` bytes per write call.
    struct ShortWriter {
        chunk: usize,
        written: Vec<u8>,
        calls: usize,
        fail_after: Option<usize>,
    }

    impl ShortWriter {
        fn new(chunk: usize) -> Self {
            Self {
                chunk,
                written: Vec::new(),
                calls: 0,
                fail_after: None,
            }
        }
    }

    impl AsyncWrite for ShortWriter {
        fn poll_write(
            mut self: Pin<&mut Self>,
            _cx: &mut Context<'_>,
            buf: &[u8],
        ) -> Poll<io::Result<usize>> {
            self.calls += 1;
            if self.fail_after.is_some_and(|limit| self.calls > limit) {
                return Poll::Ready(Err(io::Error::new(io::ErrorKind::BrokenPipe, "unplugged")));
            }
            let n = buf.len().min(self.chunk);
            self.written.extend_from_slice(&buf[..n]);
            Poll::Ready(Ok(n))
        }

        fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
            Poll::Ready(Ok(()))
        }

        fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
            Poll::Ready(Ok(()))
        }
    }

    #[tokio::test]
    async fn short_writes_are_retried() {
        let frame = pms_core::Command::WakeUp.frame();
        let mut writer = ShortWriter::new(3);

        write_all(&mut writer, frame).await.unwrap();

        assert_eq!(writer.written, frame);
        assert_eq!(writer.calls, 3);
    }

    #[tokio::test]
    async fn fatal_write_error_is_reported() {
        let mut writer = ShortWriter::new(2);
        writer.fail_after = Some(1);

        let result = write_all(&mut writer, pms_core::Command::Sleep.frame()).await;

        assert!(matches!(result, Err(TransportError::Write(_))));
        assert_eq!(writer.written.len(), 2);
    }

    #[tokio::test]
    async fn zero_length_write_means_closed() {
        let mut writer = ShortWriter::new(0);
        let result = write_all(&mut writer, pms_core::Command::Sleep.frame()).await;
        assert!(matches!(result, Err(TransportError::Closed)));
    }
}
