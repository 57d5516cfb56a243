//! Serial/TCP byte-stream transport and cancellation-aware reconnection
//! timing shared by the Davis and (via re-export) Campbell ingesters.
//!
//! Both ingesters need the same reconnect shape — dial with timeout, sleep
//! with cancellation so shutdown pre-empts every wait — so this module is
//! that one routine, grounded in the teacher-pack's repeated reconnect-loop
//! shape (`UplinkSession` in `uplink.rs`) generalized over the byte-stream
//! type.
//!
//! The teacher workspace has no serial-port dependency anywhere (none of
//! its services talk to a physical serial line); `tokio-serial` is pulled in
//! here as the ecosystem-standard async serial port crate — the same kind
//! of enrichment this repository makes for gRPC via `tonic`/`prost`.

use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::net::TcpStream;
use tokio_serial::SerialPortBuilderExt;
use tokio_util::sync::CancellationToken;
use weather_types::Transport;

/// Either half of a Davis/Campbell connection: a serial line or a plain TCP
/// socket, behind one `AsyncRead + AsyncWrite` type.
pub enum AnyStream {
    Serial(tokio_serial::SerialStream),
    Tcp(TcpStream),
}

impl AsyncRead for AnyStream {
    fn poll_read(self: Pin<&mut Self>, cx: &mut Context<'_>, buf: &mut ReadBuf<'_>) -> Poll<io::Result<()>> {
        match self.get_mut() {
            AnyStream::Serial(s) => Pin::new(s).poll_read(cx, buf),
            AnyStream::Tcp(s) => Pin::new(s).poll_read(cx, buf),
        }
    }
}

impl AsyncWrite for AnyStream {
    fn poll_write(self: Pin<&mut Self>, cx: &mut Context<'_>, buf: &[u8]) -> Poll<io::Result<usize>> {
        match self.get_mut() {
            AnyStream::Serial(s) => Pin::new(s).poll_write(cx, buf),
            AnyStream::Tcp(s) => Pin::new(s).poll_write(cx, buf),
        }
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.get_mut() {
            AnyStream::Serial(s) => Pin::new(s).poll_flush(cx),
            AnyStream::Tcp(s) => Pin::new(s).poll_flush(cx),
        }
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.get_mut() {
            AnyStream::Serial(s) => Pin::new(s).poll_shutdown(cx),
            AnyStream::Tcp(s) => Pin::new(s).poll_shutdown(cx),
        }
    }
}

/// TCP connect timeout.
pub const TCP_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
/// Delay before a TCP reconnect attempt after a failure.
pub const TCP_RETRY_DELAY: Duration = Duration::from_secs(5);
/// Delay before reopening a serial device after a failure.
pub const SERIAL_REOPEN_DELAY: Duration = Duration::from_secs(30);
/// Read deadline, rearmed on every successfully read packet.
pub const READ_DEADLINE: Duration = Duration::from_secs(30);

#[derive(Debug, thiserror::Error)]
pub enum DialError {
    #[error("connect timed out")]
    Timeout,
    #[error(transparent)]
    Io(#[from] io::Error),
}

/// Open the configured transport once. Does not retry; callers loop this
/// with [`sleep_cancellable`] between attempts.
pub async fn dial(transport: &Transport) -> Result<AnyStream, DialError> {
    match transport {
        Transport::Serial { device, baud } => {
            let port = tokio_serial::new(device, *baud)
                .timeout(Duration::from_millis(100))
                .open_native_async()?;
            Ok(AnyStream::Serial(port))
        }
        Transport::Tcp { hostname, port } => {
            let addr = format!("{hostname}:{port}");
            let stream = tokio::time::timeout(TCP_CONNECT_TIMEOUT, TcpStream::connect(&addr))
                .await
                .map_err(|_| DialError::Timeout)??;
            Ok(AnyStream::Tcp(stream))
        }
    }
}

/// The delay to wait before the next reconnect attempt for this transport
/// kind: a slower 30 s reopen for serial (matching how long a console takes
/// to come back after a cable bounce), a quicker 5 s retry for TCP.
pub fn reconnect_delay(transport: &Transport) -> Duration {
    match transport {
        Transport::Serial { .. } => SERIAL_REOPEN_DELAY,
        Transport::Tcp { .. } => TCP_RETRY_DELAY,
    }
}

/// Sleep for `duration`, but return early (and report cancellation) if
/// `shutdown` fires first. Every reconnect/backoff wait in this workspace
/// goes through this function so shutdown preempts it.
///
/// Returns `true` if the sleep ran to completion, `false` if it was cut
/// short by cancellation.
pub async fn sleep_cancellable(duration: Duration, shutdown: &CancellationToken) -> bool {
    tokio::select! {
        biased;
        () = shutdown.cancelled() => false,
        () = tokio::time::sleep(duration) => true,
    }
}
