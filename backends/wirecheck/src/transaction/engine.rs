use std::io::{self, Read, Write};
use std::net::TcpStream;
use std::thread;
use std::time::Duration;

use crate::errors::{ConnectionError, ConnectionErrorKind};
use crate::target::Target;
use crate::transaction::TransactionSpec;

/// Upper bound of the single response read.
pub const RECEIVE_BUFFER_SIZE: usize = 16 * 1024;

/// `set_read_timeout` rejects a zero duration.
const MIN_TIMEOUT: Duration = Duration::from_millis(1);

/// Runs [`TransactionSpec`]s against a base target with a default timeout.
#[derive(Debug, Clone)]
pub struct RawTransactionEngine {
    default_timeout: Duration,
}

impl RawTransactionEngine {
    #[must_use]
    pub const fn new(default_timeout: Duration) -> Self {
        Self { default_timeout }
    }

    #[must_use]
    pub const fn default_timeout(&self) -> Duration {
        self.default_timeout
    }

    /// Executes `spec` against `base`, honouring its port offset and timeout override.
    ///
    /// # Errors
    ///
    /// Every socket failure comes back as a [`ConnectionError`] value.
    pub fn run(&self, base: &Target, spec: &TransactionSpec) -> Result<Vec<u8>, ConnectionError> {
        let target = if spec.get_port_offset() == 0 {
            base.clone()
        } else {
            base.offset(spec.get_port_offset())
        };
        let timeout = spec.get_timeout().unwrap_or(self.default_timeout);
        let delivery = spec.delivery();
        execute(&target, &delivery.fragments(), delivery.delays(), timeout)
    }
}

impl Default for RawTransactionEngine {
    fn default() -> Self {
        Self::new(Duration::from_secs(10))
    }
}

/// Opens one connection, writes `fragments` in order and performs one bounded read.
///
/// After fragment `i` (except the last) the call sleeps `delays[i]`; missing
/// delays count as zero and surplus ones are ignored. `timeout` applies to the
/// connect and to every individual read or write. Zero bytes read is returned
/// as an empty buffer, the caller decides what that means.
///
/// # Errors
///
/// Refusal, reset, timeout and resolution failures are returned as
/// [`ConnectionError`]; nothing panics or escapes as a fault.
pub fn execute<F: AsRef<[u8]>>(
    target: &Target,
    fragments: &[F],
    delays: &[Duration],
    timeout: Duration,
) -> Result<Vec<u8>, ConnectionError> {
    let timeout = timeout.max(MIN_TIMEOUT);
    let mut stream = connect(target, timeout)?;
    stream.set_read_timeout(Some(timeout))?;
    stream.set_write_timeout(Some(timeout))?;
    stream.set_nodelay(true)?;

    if let Err(write_error) = deliver(&mut stream, fragments, delays) {
        tracing::debug!("write to {target} failed: {write_error}, checking for an early reply");
        // The server may have answered (e.g. 413) and closed before reading everything.
        return match read_once(&mut stream) {
            Ok(bytes) if !bytes.is_empty() => Ok(bytes),
            _ => Err(write_error.into()),
        };
    }

    let bytes = read_once(&mut stream)?;
    tracing::debug!("read {} bytes from {target}", bytes.len());
    Ok(bytes)
}

fn connect(target: &Target, timeout: Duration) -> Result<TcpStream, ConnectionError> {
    let addrs = target.socket_addrs().map_err(|err| {
        ConnectionError::new(ConnectionErrorKind::Unresolved, format!("{target}: {err}"))
    })?;

    let mut last_error = None;
    for addr in addrs {
        match TcpStream::connect_timeout(&addr, timeout) {
            Ok(stream) => {
                tracing::debug!("connected to {addr}");
                return Ok(stream);
            }
            Err(err) => last_error = Some(err),
        }
    }

    Err(last_error.map_or_else(
        || ConnectionError::new(ConnectionErrorKind::Unresolved, format!("{target}: no addresses")),
        ConnectionError::from,
    ))
}

fn deliver<F: AsRef<[u8]>>(
    stream: &mut TcpStream,
    fragments: &[F],
    delays: &[Duration],
) -> io::Result<()> {
    let last = fragments.len().saturating_sub(1);
    for (index, fragment) in fragments.iter().enumerate() {
        let bytes = fragment.as_ref();
        if !bytes.is_empty() {
            stream.write_all(bytes)?;
            stream.flush()?;
            tracing::trace!("wrote fragment {index} ({} bytes)", bytes.len());
        }

        if index < last {
            if let Some(delay) = delays.get(index).filter(|delay| !delay.is_zero()) {
                thread::sleep(*delay);
            }
        }
    }
    Ok(())
}

fn read_once(stream: &mut TcpStream) -> io::Result<Vec<u8>> {
    let mut buffer = vec![0u8; RECEIVE_BUFFER_SIZE];
    loop {
        match stream.read(&mut buffer) {
            Ok(count) => {
                buffer.truncate(count);
                return Ok(buffer);
            }
            Err(err) if err.kind() == io::ErrorKind::Interrupted => {}
            Err(err) => return Err(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::TcpListener;
    use std::time::Instant;

    fn one_shot_server<F>(handler: F) -> (Target, thread::JoinHandle<Vec<u8>>)
    where
        F: FnOnce(&mut TcpStream) -> Vec<u8> + Send + 'static,
    {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        let handle = thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();
            handler(&mut stream)
        });
        (Target::new("127.0.0.1", port), handle)
    }

    #[test]
    fn returns_raw_reply_bytes() {
        let (target, server) = one_shot_server(|stream| {
            let mut buf = [0u8; 256];
            let n = stream.read(&mut buf).unwrap();
            stream.write_all(b"HTTP/1.1 200 OK\r\n\r\n\xff\x00").unwrap();
            buf[..n].to_vec()
        });

        let reply = execute(&target, &[b"GET / HTTP/1.1\r\n\r\n"], &[], Duration::from_secs(2)).unwrap();
        assert_eq!(reply, b"HTTP/1.1 200 OK\r\n\r\n\xff\x00");
        assert_eq!(server.join().unwrap(), b"GET / HTTP/1.1\r\n\r\n");
    }

    #[test]
    fn fragments_arrive_in_order_and_byte_exact() {
        let (target, server) = one_shot_server(|stream| {
            let mut received = Vec::new();
            let mut buf = [0u8; 64];
            while !received.ends_with(b"\r\n\r\n") {
                let n = stream.read(&mut buf).unwrap();
                if n == 0 {
                    break;
                }
                received.extend_from_slice(&buf[..n]);
            }
            stream.write_all(b"HTTP/1.1 204 No Content\r\n\r\n").unwrap();
            received
        });

        let fragments: [&[u8]; 3] = [b"GET /\x00", b"\t\xe9 HTTP/1.1\r\n", b"\r\n"];
        let delays = [Duration::from_millis(20); 5];
        let started = Instant::now();
        let reply = execute(&target, &fragments, &delays, Duration::from_secs(2)).unwrap();

        assert!(started.elapsed() >= Duration::from_millis(40));
        assert!(reply.starts_with(b"HTTP/1.1 204"));
        assert_eq!(server.join().unwrap(), b"GET /\x00\t\xe9 HTTP/1.1\r\n\r\n");
    }

    #[test]
    fn silent_server_times_out() {
        let (target, server) = one_shot_server(|stream| {
            thread::sleep(Duration::from_millis(400));
            let _ = stream.write_all(b"late");
            Vec::new()
        });

        let err = execute(&target, &[b"GET / HTTP/1.1\r\n\r\n"], &[], Duration::from_millis(100)).unwrap_err();
        assert_eq!(err.kind(), ConnectionErrorKind::Timeout);
        server.join().unwrap();
    }

    #[test]
    fn closed_connection_yields_empty_bytes() {
        let (target, server) = one_shot_server(|_stream| Vec::new());
        let reply = execute(&target, &[b"GET / HTTP/1.1\r\n\r\n"], &[], Duration::from_secs(2));
        server.join().unwrap();
        // either a clean EOF or a reset depending on timing, never a panic
        match reply {
            Ok(bytes) => assert!(bytes.is_empty()),
            Err(err) => assert_eq!(err.kind(), ConnectionErrorKind::Reset),
        }
    }

    #[test]
    fn early_reply_survives_a_failed_write() {
        let (target, server) = one_shot_server(|stream| {
            let mut head = Vec::new();
            let mut buf = [0u8; 1024];
            while !head.windows(4).any(|window| window == b"\r\n\r\n") {
                let n = stream.read(&mut buf).unwrap();
                if n == 0 {
                    break;
                }
                head.extend_from_slice(&buf[..n]);
            }
            stream
                .write_all(b"HTTP/1.1 413 Payload Too Large\r\nContent-Length: 0\r\n\r\n")
                .unwrap();
            // closing with most of the body unread resets the client's write
            head
        });

        let body = vec![b'x'; 16 * 1024 * 1024];
        let head = format!("POST / HTTP/1.1\r\nHost: localhost\r\nContent-Length: {}\r\n\r\n", body.len());
        let fragments: [&[u8]; 2] = [head.as_bytes(), &body];

        let reply = execute(&target, &fragments, &[], Duration::from_secs(5)).unwrap();
        assert!(reply.starts_with(b"HTTP/1.1 413"), "{:?}", String::from_utf8_lossy(&reply));
        assert!(server.join().unwrap().starts_with(b"POST / HTTP/1.1\r\n"));
    }

    #[test]
    fn refused_port_is_reported() {
        let port = {
            let listener = TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap().port()
        };
        let err = execute(&Target::new("127.0.0.1", port), &[b"x"], &[], Duration::from_secs(1)).unwrap_err();
        assert_eq!(err.kind(), ConnectionErrorKind::Refused);
    }

    #[test]
    fn engine_applies_port_offset() {
        let (target, server) = one_shot_server(|stream| {
            let mut buf = [0u8; 64];
            let _ = stream.read(&mut buf).unwrap();
            stream.write_all(b"HTTP/1.1 200 OK\r\n\r\n").unwrap();
            Vec::new()
        });
        let base = Target::new("127.0.0.1", target.port() - 1);
        let spec = TransactionSpec::whole("GET / HTTP/1.1\r\n\r\n").port_offset(1).timeout_secs(2);

        let reply = RawTransactionEngine::default().run(&base, &spec).unwrap();
        assert!(reply.starts_with(b"HTTP/1.1 200"));
        server.join().unwrap();
    }
}
