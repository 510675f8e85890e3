//! In-process stub server.
//!
//! WHY: End-to-end tests need a live socket that answers raw HTTP/1.1 the way a
//! strict server would, including slow and half-sent requests.
//!
//! WHAT: `StubServer` listens on localhost, buffers each request until it is
//! complete or the client goes quiet, and answers once with a rendered
//! [`StubReply`] before closing the connection.
//!
//! HOW: stdlib `TcpListener` with a nonblocking accept loop and one thread per
//! connection. Requests are never parsed here; the handler sees raw bytes.

use std::io::{self, Read, Write};
use std::net::{Shutdown, SocketAddr, TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crate::reference::{self, Progress, StubReply};

/// How long a connection may stay silent before the buffered bytes are answered.
pub const IDLE_TIMEOUT: Duration = Duration::from_secs(1);

const ACCEPT_BACKOFF: Duration = Duration::from_millis(10);

/// Maps the raw bytes of one request to its reply.
pub type Handler = Arc<dyn Fn(&[u8]) -> StubReply + Send + Sync>;

/// Stub HTTP server for integration testing.
///
/// # Examples
///
/// ```rust
/// use wirecheck_testing::StubServer;
///
/// let server = StubServer::start().unwrap();
/// assert_eq!(server.host(), "127.0.0.1");
/// assert!(server.port() > 0);
///
/// // Server stops when dropped
/// ```
pub struct StubServer {
    addr: SocketAddr,
    running: Arc<AtomicBool>,
    connections: Arc<AtomicUsize>,
    handle: Option<thread::JoinHandle<()>>,
}

impl StubServer {
    /// Starts a server on a random localhost port using the reference responder.
    ///
    /// # Errors
    ///
    /// Fails when no local port can be bound.
    pub fn start() -> io::Result<Self> {
        Self::bind("127.0.0.1:0", Arc::new(reference::respond))
    }

    /// Starts a server on a random localhost port with a custom handler.
    ///
    /// # Errors
    ///
    /// Fails when no local port can be bound.
    pub fn with_handler<F>(handler: F) -> io::Result<Self>
    where
        F: Fn(&[u8]) -> StubReply + Send + Sync + 'static,
    {
        Self::bind("127.0.0.1:0", Arc::new(handler))
    }

    /// Starts a server on `addr`.
    ///
    /// # Errors
    ///
    /// Fails when `addr` cannot be bound or switched to nonblocking mode.
    pub fn bind(addr: &str, handler: Handler) -> io::Result<Self> {
        let listener = TcpListener::bind(addr)?;
        listener.set_nonblocking(true)?;
        let addr = listener.local_addr()?;

        let running = Arc::new(AtomicBool::new(true));
        let connections = Arc::new(AtomicUsize::new(0));

        let running_clone = Arc::clone(&running);
        let connections_clone = Arc::clone(&connections);
        let handle = thread::Builder::new()
            .name(format!("stub-server-{}", addr.port()))
            .spawn(move || accept_loop(&listener, &running_clone, &connections_clone, &handler))?;

        tracing::info!("stub server listening on {addr}");
        Ok(Self {
            addr,
            running,
            connections,
            handle: Some(handle),
        })
    }

    #[must_use]
    pub const fn addr(&self) -> SocketAddr {
        self.addr
    }

    #[must_use]
    pub fn host(&self) -> String {
        self.addr.ip().to_string()
    }

    #[must_use]
    pub const fn port(&self) -> u16 {
        self.addr.port()
    }

    /// Connections accepted so far.
    #[must_use]
    pub fn connections(&self) -> usize {
        self.connections.load(Ordering::Relaxed)
    }

    /// Blocks the calling thread until the accept loop ends.
    pub fn wait(mut self) {
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                tracing::error!("stub server accept loop panicked");
            }
        }
    }

    /// Stops accepting and joins the accept loop. In-flight connections finish on their own.
    pub fn stop(mut self) {
        self.running.store(false, Ordering::Relaxed);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for StubServer {
    fn drop(&mut self) {
        // Thread will exit on next loop iteration
        self.running.store(false, Ordering::Relaxed);
    }
}

fn accept_loop(listener: &TcpListener, running: &AtomicBool, connections: &AtomicUsize, handler: &Handler) {
    while running.load(Ordering::Relaxed) {
        match listener.accept() {
            Ok((stream, peer)) => {
                connections.fetch_add(1, Ordering::Relaxed);
                tracing::debug!("accepted connection from {peer}");
                let handler = Arc::clone(handler);
                thread::spawn(move || {
                    if let Err(err) = handle_connection(stream, &handler) {
                        tracing::debug!("connection from {peer} ended with: {err}");
                    }
                });
            }
            Err(ref err) if err.kind() == io::ErrorKind::WouldBlock => {
                thread::sleep(ACCEPT_BACKOFF);
            }
            Err(err) => {
                tracing::error!("stub server accept failed: {err}");
                break;
            }
        }
    }
    tracing::debug!("stub server accept loop finished");
}

fn handle_connection(mut stream: TcpStream, handler: &Handler) -> io::Result<()> {
    stream.set_nonblocking(false)?;
    stream.set_read_timeout(Some(IDLE_TIMEOUT))?;

    let request = read_request(&mut stream)?;
    if request.is_empty() {
        // Nothing to answer; closing without a reply is what the client sees as an empty response.
        return Ok(());
    }

    let reply = handler(&request);
    tracing::debug!("answering {} byte request with {reply}", request.len());
    stream.write_all(&reply.render())?;
    stream.flush()?;
    stream.shutdown(Shutdown::Write)?;

    drain(&mut stream);
    Ok(())
}

/// Reads until the request is complete, the peer closes, or it goes idle.
fn read_request(stream: &mut TcpStream) -> io::Result<Vec<u8>> {
    let mut request = Vec::new();
    let mut chunk = [0u8; 8192];
    while reference::progress(&request) != Progress::Complete {
        match stream.read(&mut chunk) {
            Ok(0) => break,
            Ok(count) => request.extend_from_slice(&chunk[..count]),
            Err(err) if matches!(err.kind(), io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut) => {
                tracing::debug!("client idle with {} bytes buffered", request.len());
                break;
            }
            Err(err) if err.kind() == io::ErrorKind::Interrupted => {}
            Err(err) => return Err(err),
        }
    }
    Ok(request)
}

/// Reads leftovers so closing the socket does not reset the reply away.
fn drain(stream: &mut TcpStream) {
    let mut chunk = [0u8; 8192];
    let _ = stream.set_read_timeout(Some(Duration::from_millis(100)));
    while matches!(stream.read(&mut chunk), Ok(count) if count > 0) {}
}
