use super::service::AppService;
use crate::application::Application;
use may::coroutine::JoinHandle;
use may_minihttp::HttpServerWithHeaders;
use std::io;
use std::net::{SocketAddr, TcpStream, ToSocketAddrs};
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Request headers accepted per request; proxies routinely add a dozen.
pub const MAX_REQUEST_HEADERS: usize = 32;

/// Serves one [`Application`] through [`AppService`].
///
/// ```rust,no_run
/// use brrtweb::action;
/// use brrtweb::application::Application;
/// use brrtweb::body::Body;
/// use brrtweb::dispatcher::Controller;
/// use brrtweb::server::HttpServer;
///
/// let root = Controller::new().action("index", action::text().handler(|_, _| Ok(Body::from("hi"))));
/// let handle = HttpServer::new(Application::new(root)).start("127.0.0.1:8080").unwrap();
/// handle.join().ok();
/// ```
pub struct HttpServer(pub AppService);

impl HttpServer {
    #[must_use]
    pub fn new(app: Application) -> Self {
        HttpServer(AppService::new(app))
    }

    /// Bind the first address `addr` resolves to and start accepting
    /// connections on a `may` coroutine. Each connection gets its own clone
    /// of the service.
    ///
    /// # Errors
    ///
    /// An address that resolves to nothing, or a failed bind.
    pub fn start<A: ToSocketAddrs>(self, addr: A) -> io::Result<ServerHandle> {
        let addr = addr
            .to_socket_addrs()?
            .next()
            .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "address resolves to nothing"))?;
        let coroutine = HttpServerWithHeaders::<_, MAX_REQUEST_HEADERS>(self.0).start(addr)?;
        info!(%addr, "Application listening");
        Ok(ServerHandle { addr, coroutine })
    }
}

impl From<Application> for HttpServer {
    fn from(app: Application) -> Self {
        HttpServer::new(app)
    }
}

/// A listening application.
pub struct ServerHandle {
    addr: SocketAddr,
    coroutine: JoinHandle<()>,
}

impl ServerHandle {
    /// Bound address; useful after binding port 0.
    #[must_use]
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// [`Self::wait_ready_for`] with a 250ms budget.
    ///
    /// # Errors
    ///
    /// `TimedOut` when nothing accepts a connection in time.
    pub fn wait_ready(&self) -> io::Result<()> {
        self.wait_ready_for(Duration::from_millis(250))
    }

    /// Poll the bound address until a TCP connection succeeds.
    ///
    /// # Errors
    ///
    /// `TimedOut` when `budget` runs out first.
    pub fn wait_ready_for(&self, budget: Duration) -> io::Result<()> {
        let deadline = Instant::now() + budget;
        loop {
            if TcpStream::connect(self.addr).is_ok() {
                return Ok(());
            }
            if Instant::now() >= deadline {
                warn!(addr = %self.addr, ?budget, "Application did not come up");
                return Err(io::Error::new(io::ErrorKind::TimedOut, "server not ready"));
            }
            thread::sleep(Duration::from_millis(5));
        }
    }

    /// Cancel the accept loop and wait for it. Requests in flight on open
    /// connections are not drained.
    pub fn stop(self) {
        // SAFETY: `cancel` is unsafe in may; the coroutine is owned by this
        // handle, which is consumed, so nothing resumes it afterwards.
        unsafe {
            self.coroutine.coroutine().cancel();
        }
        if self.coroutine.join().is_err() {
            debug!(addr = %self.addr, "Accept loop ended by cancellation");
        }
        info!(addr = %self.addr, "Application stopped");
    }

    /// Block until the accept loop ends; it normally runs forever.
    ///
    /// # Errors
    ///
    /// The panic payload when the accept loop panicked.
    pub fn join(self) -> thread::Result<()> {
        self.coroutine.join()
    }
}
