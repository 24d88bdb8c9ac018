//! TCP transport implementation.
//!
//! Plain framed TCP: the backend speaks one JSON object per segment, which
//! holds for the small frames this protocol exchanges. Reads are drained
//! non-blockingly so the engine tick never stalls on the socket.

use std::io::ErrorKind;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tracing::debug;

use crate::transport::{Transport, TransportError, MAX_FRAME_LEN};

const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// TCP-backed [`Transport`].
pub struct TcpTransport {
    stream: Option<TcpStream>,
    /// Frame pulled off the socket by `available`, pending the next `read`.
    buffered: Option<Vec<u8>>,
    connect_timeout: Duration,
}

impl TcpTransport {
    pub fn new() -> Self {
        Self {
            stream: None,
            buffered: None,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
        }
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    fn drop_stream(&mut self) {
        self.stream = None;
        self.buffered = None;
    }
}

impl Default for TcpTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Transport for TcpTransport {
    async fn connect(&mut self, host: &str, port: u16) -> Result<(), TransportError> {
        self.drop_stream();
        let addr = format!("{host}:{port}");
        debug!(addr = %addr, "opening tcp stream");

        match tokio::time::timeout(self.connect_timeout, TcpStream::connect(&addr)).await {
            Ok(Ok(stream)) => {
                stream.set_nodelay(true).ok();
                self.stream = Some(stream);
                Ok(())
            }
            Ok(Err(e)) => Err(TransportError::ConnectFailed(e.to_string())),
            Err(_) => Err(TransportError::Timeout),
        }
    }

    fn connected(&self) -> bool {
        self.stream.is_some()
    }

    async fn available(&mut self) -> bool {
        if self.buffered.is_some() {
            return true;
        }
        let Some(stream) = self.stream.as_ref() else {
            return false;
        };
        let mut buf = vec![0u8; MAX_FRAME_LEN];
        match stream.try_read(&mut buf) {
            // A zero-length read means the peer closed the stream.
            Ok(0) => {
                self.drop_stream();
                false
            }
            Ok(n) => {
                buf.truncate(n);
                self.buffered = Some(buf);
                true
            }
            Err(e) if e.kind() == ErrorKind::WouldBlock => false,
            Err(_) => {
                self.drop_stream();
                false
            }
        }
    }

    async fn read(&mut self, buf: &mut [u8]) -> Result<usize, TransportError> {
        if let Some(frame) = self.buffered.take() {
            let n = frame.len().min(buf.len());
            buf[..n].copy_from_slice(&frame[..n]);
            return Ok(n);
        }
        let Some(stream) = self.stream.as_ref() else {
            return Err(TransportError::NotConnected);
        };
        match stream.try_read(buf) {
            Ok(0) => {
                self.drop_stream();
                Ok(0)
            }
            Ok(n) => Ok(n),
            Err(e) if e.kind() == ErrorKind::WouldBlock => Ok(0),
            Err(e) => {
                self.drop_stream();
                Err(TransportError::Io(e.to_string()))
            }
        }
    }

    async fn write(&mut self, buf: &[u8]) -> Result<(), TransportError> {
        let Some(stream) = self.stream.as_mut() else {
            return Err(TransportError::NotConnected);
        };
        if let Err(e) = stream.write_all(buf).await {
            self.drop_stream();
            return Err(TransportError::Io(e.to_string()));
        }
        Ok(())
    }

    async fn flush(&mut self) -> Result<(), TransportError> {
        let Some(stream) = self.stream.as_mut() else {
            return Err(TransportError::NotConnected);
        };
        if let Err(e) = stream.flush().await {
            self.drop_stream();
            return Err(TransportError::Io(e.to_string()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncReadExt;
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn connect_refused_reports_failure() {
        let mut transport = TcpTransport::new();
        // Port 1 is essentially never listening.
        let result = transport.connect("127.0.0.1", 1).await;
        assert!(result.is_err());
        assert!(!transport.connected());
    }

    #[tokio::test]
    async fn writes_reach_the_peer() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let mut transport = TcpTransport::new();
        transport.connect("127.0.0.1", addr.port()).await.unwrap();
        assert!(transport.connected());

        let (mut server, _) = listener.accept().await.unwrap();
        transport.write(br#"{"event":"HEARTBEAT"}"#).await.unwrap();
        transport.flush().await.unwrap();

        let mut buf = [0u8; 64];
        let n = server.read(&mut buf).await.unwrap();
        assert_eq!(&buf[..n], br#"{"event":"HEARTBEAT"}"#);
    }

    #[tokio::test]
    async fn available_buffers_one_frame() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let mut transport = TcpTransport::new();
        transport.connect("127.0.0.1", addr.port()).await.unwrap();
        let (mut server, _) = listener.accept().await.unwrap();

        tokio::io::AsyncWriteExt::write_all(&mut server, br#"{"event":"HEARTBEAT"}"#)
            .await
            .unwrap();

        // Give the frame time to land in the socket buffer.
        for _ in 0..50 {
            if transport.available().await {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(transport.available().await);

        let mut buf = [0u8; MAX_FRAME_LEN];
        let n = transport.read(&mut buf).await.unwrap();
        assert_eq!(&buf[..n], br#"{"event":"HEARTBEAT"}"#);
    }
}
