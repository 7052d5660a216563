//! Cleanup signaling to the supervising process
//!
//! The link keeps one TCP connection to a supervisor on localhost for its
//! whole lifetime. The connection is established during `setup()` before any
//! UDP work — if no supervisor is listening, the link refuses to come up,
//! because nobody would be able to clean up after a mid-run failure.
//!
//! The protocol is a single byte: `0x01` means "this link failed
//! unexpectedly, run cleanup". The supervisor decides what cleanup means
//! (typically tearing down or restarting the peer process).

use crate::error::{Error, Result};
use parking_lot::Mutex;
use std::io::{self, Write};
use std::net::TcpStream;
use std::time::Duration;

/// The one defined distress byte
const DISTRESS: u8 = 0x01;

/// Read timeout applied to the supervisor connection
const SUPERVISOR_TIMEOUT: Duration = Duration::from_secs(10);

/// TCP client holding the distress channel to the supervisor.
///
/// Shared between the controlling thread and the worker threads via `Arc`;
/// the stream slot is locked so a concurrent `signal()` and `close()`
/// cannot race on the descriptor.
pub struct CleanupClient {
    port: u16,
    stream: Mutex<Option<TcpStream>>,
}

impl CleanupClient {
    /// Connect to the supervisor on `localhost:port`.
    pub fn connect(port: u16) -> Result<Self> {
        let stream = TcpStream::connect(("localhost", port))
            .map_err(|e| Error::Supervisor(format!("localhost:{}: {}", port, e)))?;

        if let Err(e) = stream.set_read_timeout(Some(SUPERVISOR_TIMEOUT)) {
            log::warn!("Failed to set supervisor read timeout: {}", e);
        }

        log::info!("Connected to supervisor on localhost:{}", port);
        Ok(Self {
            port,
            stream: Mutex::new(Some(stream)),
        })
    }

    /// Send the distress byte.
    ///
    /// A failed send marks the connection dead; callers log the error and
    /// carry on with shutdown, they never block on it.
    pub fn signal(&self) -> io::Result<()> {
        let mut guard = self.stream.lock();
        let stream = guard
            .as_mut()
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotConnected, "supervisor closed"))?;

        match stream.write_all(&[DISTRESS]) {
            Ok(()) => {
                log::info!("Distress signal sent to supervisor on port {}", self.port);
                Ok(())
            }
            Err(e) => {
                *guard = None;
                Err(e)
            }
        }
    }

    /// Drop the supervisor connection. Idempotent.
    pub fn close(&self) {
        let mut guard = self.stream.lock();
        if guard.take().is_some() {
            log::info!("Supervisor connection closed");
        }
    }

    pub fn is_connected(&self) -> bool {
        self.stream.lock().is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;
    use std::net::TcpListener;
    use std::thread;

    #[test]
    fn test_connect_refused_without_supervisor() {
        // Port 1 is essentially never listening
        assert!(matches!(
            CleanupClient::connect(1),
            Err(Error::Supervisor(_))
        ));
    }

    #[test]
    fn test_signal_delivers_distress_byte() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();

        let accept = thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();
            let mut buf = [0u8; 1];
            stream.read_exact(&mut buf).unwrap();
            buf[0]
        });

        let client = CleanupClient::connect(port).unwrap();
        assert!(client.is_connected());
        client.signal().unwrap();

        assert_eq!(accept.join().unwrap(), DISTRESS);
    }

    #[test]
    fn test_signal_after_close_fails() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        let _accept = thread::spawn(move || listener.accept());

        let client = CleanupClient::connect(port).unwrap();
        client.close();
        client.close(); // idempotent
        assert!(!client.is_connected());
        assert!(client.signal().is_err());
    }
}
