use std::time::Duration;

use pms_core::{
    Command, DecoderStats, FrameDecoder, Ingest, MeasurementRecord, OperatingMode,
    WAKE_STABILIZATION,
};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, ReadHalf, WriteHalf};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_serial::SerialStream;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, trace, warn};

use crate::config::SerialConfig;
use crate::state::{self, Reading, ReadingPublisher, SensorState};
use crate::transport::{self, TransportError};

/// A particulate-matter sensor attached to a byte stream.
///
/// Incoming bytes are decoded on a background task, so waiting for a frame
/// never stalls ingestion. Commands are written from the caller's task.
pub struct PmsSensor<S> {
    writer: Option<WriteHalf<S>>,
    reader: Option<JoinHandle<()>>,
    state: SensorState,
    cancel: CancellationToken,
    mode: OperatingMode,
    woken_at: Option<Instant>,
}

impl PmsSensor<SerialStream> {
    /// Open the serial device and start decoding its output.
    ///
    /// Must be called from within a tokio runtime. The sensor stops when
    /// `cancel` fires or when [`shutdown`](Self::shutdown) is called.
    pub fn initialize(
        config: &SerialConfig,
        read_buffer_size: usize,
        cancel: &CancellationToken,
    ) -> Result<Self, TransportError> {
        let stream = transport::open(config).inspect_err(|e| {
            error!(error = %e, "Could not open serial device");
        })?;

        info!(
            device = %config.device.display(),
            baud_rate = config.baud_rate,
            "Opened serial device"
        );

        Ok(Self::from_stream(stream, read_buffer_size, cancel))
    }
}

impl<S> PmsSensor<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    /// Drive a sensor over any byte stream.
    pub fn from_stream(stream: S, read_buffer_size: usize, cancel: &CancellationToken) -> Self {
        let (reader, writer) = tokio::io::split(stream);
        let (publisher, state) = state::channel();
        let cancel = cancel.child_token();

        let handle = tokio::spawn(run_reader(
            reader,
            publisher,
            cancel.clone(),
            read_buffer_size.max(1),
        ));

        Self {
            writer: Some(writer),
            reader: Some(handle),
            state,
            cancel,
            mode: OperatingMode::default(),
            woken_at: None,
        }
    }

    /// Put the sensor into standby.
    pub async fn sleep(&mut self) -> Result<(), TransportError> {
        self.send(Command::Sleep).await
    }

    /// Resume from standby.
    ///
    /// Readings stay unreliable for [`WAKE_STABILIZATION`] afterwards, see
    /// [`is_stabilizing`](Self::is_stabilizing).
    pub async fn wake_up(&mut self) -> Result<(), TransportError> {
        self.send(Command::WakeUp).await?;
        self.woken_at = Some(Instant::now());
        Ok(())
    }

    pub async fn set_active_mode(&mut self) -> Result<(), TransportError> {
        self.send(Command::SetActiveMode).await
    }

    pub async fn set_passive_mode(&mut self) -> Result<(), TransportError> {
        self.send(Command::SetPassiveMode).await
    }

    /// Switch to `mode` by sending the matching command.
    pub async fn set_mode(&mut self, mode: OperatingMode) -> Result<(), TransportError> {
        match mode {
            OperatingMode::Active => self.set_active_mode().await,
            OperatingMode::Passive => self.set_passive_mode().await,
        }
    }

    /// Ask for one frame. Only sent in passive mode.
    ///
    /// Returns whether the request was transmitted.
    pub async fn request_read(&mut self) -> Result<bool, TransportError> {
        if self.mode != OperatingMode::Passive {
            debug!(mode = ?self.mode, "Skipping read request outside passive mode");
            return Ok(false);
        }
        self.send(Command::RequestRead).await?;
        Ok(true)
    }

    async fn send(&mut self, command: Command) -> Result<(), TransportError> {
        let writer = self.writer.as_mut().ok_or(TransportError::Closed)?;

        if let Err(e) = transport::write_all(writer, command.frame()).await {
            error!(%command, error = %e, "Could not send command");
            return Err(e);
        }

        if let Some(mode) = command.resulting_mode() {
            self.mode = mode;
        }
        debug!(%command, "Sent command");
        Ok(())
    }

    /// Whether a validated frame has been published. Never blocks.
    pub fn poll_once(&self) -> bool {
        self.state.is_ok()
    }

    /// Wait up to `timeout` for a frame newer than the one visible now.
    pub async fn poll_until(&self, timeout: Duration) -> bool {
        self.wait_for_record(timeout).await.is_some()
    }

    /// Wait up to `timeout` for a fresh frame and return its record.
    pub async fn wait_for_record(&self, timeout: Duration) -> Option<MeasurementRecord> {
        self.wait_for_reading(timeout)
            .await
            .map(|reading| reading.record)
    }

    pub async fn wait_for_reading(&self, timeout: Duration) -> Option<Reading> {
        self.wait_newer_than(self.sequence(), timeout).await
    }

    /// Wait up to `timeout` for a frame published after `sequence`.
    ///
    /// Returns at once if one already was.
    pub async fn wait_newer_than(&self, sequence: u64, timeout: Duration) -> Option<Reading> {
        self.state.wait_newer_than(sequence, timeout, &self.cancel).await
    }

    /// Number of frames published so far.
    pub fn sequence(&self) -> u64 {
        self.state.current().sequence
    }

    /// The most recently published record, or [`MeasurementRecord::NO_DATA`].
    pub fn latest_record(&self) -> MeasurementRecord {
        self.state.current().record
    }

    pub fn latest_reading(&self) -> Reading {
        self.state.current()
    }

    /// A handle for observing published frames from other tasks.
    pub fn state(&self) -> SensorState {
        self.state.clone()
    }

    pub async fn stats(&self) -> DecoderStats {
        self.state.stats().await
    }

    pub async fn is_connected(&self) -> bool {
        self.state.is_connected().await
    }

    pub fn mode(&self) -> OperatingMode {
        self.mode
    }

    /// Whether the last wake-up happened less than [`WAKE_STABILIZATION`] ago.
    pub fn is_stabilizing(&self) -> bool {
        self.woken_at
            .is_some_and(|woken_at| woken_at.elapsed() < WAKE_STABILIZATION)
    }

    /// Stop decoding and close the stream. Calling it again does nothing.
    pub async fn shutdown(&mut self) {
        let Some(mut writer) = self.writer.take() else {
            debug!("Sensor already shut down");
            return;
        };

        self.cancel.cancel();

        if let Some(handle) = self.reader.take() {
            if let Err(e) = handle.await {
                warn!(error = %e, "Reader task ended abnormally");
            }
        }

        if let Err(e) = writer.shutdown().await {
            warn!(error = %e, "Could not close serial device");
        }

        info!("Sensor shut down");
    }
}

impl<S> Drop for PmsSensor<S> {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

#[instrument(name = "pms_reader", skip_all)]
async fn run_reader<S>(
    mut reader: ReadHalf<S>,
    publisher: ReadingPublisher,
    cancel: CancellationToken,
    buffer_size: usize,
) where
    S: AsyncRead + Unpin,
{
    let mut decoder = FrameDecoder::new();
    let mut buf = vec![0u8; buffer_size];

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                debug!("Shutdown signal received");
                break;
            }
            read = reader.read(&mut buf) => {
                let n = match read {
                    Ok(0) => {
                        warn!("Serial device closed");
                        break;
                    }
                    Ok(n) => n,
                    Err(e) => {
                        error!(error = %e, "Could not read from serial device");
                        break;
                    }
                };

                trace!(bytes = n, "Received data");

                for &byte in &buf[..n] {
                    match decoder.ingest(byte) {
                        Ingest::Pending => {}
                        Ingest::Complete(record) => {
                            trace!(?record, "Decoded frame");
                            publisher.publish(record);
                        }
                        Ingest::Discarded(reason) => {
                            debug!(?reason, "Discarded frame");
                        }
                    }
                }

                publisher.update_stats(decoder.stats()).await;
            }
        }
    }

    publisher.disconnected().await;
}
