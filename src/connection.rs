use crate::frame::{FrameCodec, Request};
use futures::{SinkExt as _, StreamExt as _};
use std::future::Future;
use std::io;
use tokio::net::TcpStream;
use tokio_util::codec::Framed;
use tracing::{debug, info, trace};

pub const DEFAULT_PORT: u16 = 30046;

/// A request/response link to an air unit.
///
/// Implementations own connection establishment, framing and retries. Callers treat
/// [`Channel::send_request`] as a plain function call that either produces the raw response bytes
/// or fails with an I/O error.
pub trait Channel: Send + Sync {
    fn send_request(&self, request: Request) -> impl Future<Output = io::Result<Vec<u8>>> + Send;
}

impl<C: Channel> Channel for std::sync::Arc<C> {
    fn send_request(&self, request: Request) -> impl Future<Output = io::Result<Vec<u8>>> + Send {
        C::send_request(self, request)
    }
}

#[derive(clap::Parser, Clone, Debug)]
#[group(id = "connection::Args")]
pub struct Args {
    /// Talk to the air unit at this address instead of discovering one on the local network.
    #[arg(long)]
    pub host: Option<String>,

    /// The TCP port the air unit accepts register requests on.
    #[arg(long, default_value = "30046")]
    pub port: u16,

    /// Give up connecting to the air unit after this amount of time.
    #[arg(long, default_value = "5s")]
    pub connect_timeout: humantime::Duration,

    /// Consider a request failed if the full response isn't received in this amount of time.
    #[arg(long, default_value = "5s")]
    pub read_timeout: humantime::Duration,
}

impl Default for Args {
    fn default() -> Self {
        Self {
            host: None,
            port: DEFAULT_PORT,
            connect_timeout: std::time::Duration::from_secs(5).into(),
            read_timeout: std::time::Duration::from_secs(5).into(),
        }
    }
}

type TcpIo = Framed<TcpStream, FrameCodec>;

/// [`Channel`] over the air unit's TCP interface.
///
/// Every request opens a fresh connection and closes it once the response arrives. A request
/// that fails mid-way is retried once over a new connection. Requests are serialized.
pub struct TcpConnection {
    host: String,
    args: Args,
    io: tokio::sync::Mutex<Option<TcpIo>>,
}

impl TcpConnection {
    pub fn new(host: String, args: Args) -> Self {
        Self { host, args, io: tokio::sync::Mutex::new(None) }
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub async fn connect(&self) -> io::Result<()> {
        let mut io = self.io.lock().await;
        self.connect_locked(&mut io).await
    }

    pub async fn disconnect(&self) {
        let mut io = self.io.lock().await;
        Self::disconnect_locked(&mut io).await
    }

    async fn connect_locked(&self, io: &mut Option<TcpIo>) -> io::Result<()> {
        if io.is_some() {
            return Ok(());
        }
        let (host, port) = (self.host.as_str(), self.args.port);
        debug!(message = "connecting...", host, port);
        let connect = TcpStream::connect((host, port));
        let socket = tokio::time::timeout(*self.args.connect_timeout, connect)
            .await
            .map_err(|_| io::Error::new(io::ErrorKind::TimedOut, "connecting timed out"))??;
        let nodelay_result = socket.set_nodelay(true);
        trace!(message = "setting nodelay", is_error = ?nodelay_result.err());
        debug!(message = "connected");
        *io = Some(Framed::new(socket, FrameCodec {}));
        Ok(())
    }

    async fn disconnect_locked(io: &mut Option<TcpIo>) {
        let Some(mut framed) = io.take() else {
            return;
        };
        if let Err(e) = framed.close().await {
            debug!(
                message = "connection could not be closed gracefully",
                error = (&e as &dyn std::error::Error)
            );
        }
    }

    async fn exchange(&self, io: &mut Option<TcpIo>, request: Request) -> io::Result<Vec<u8>> {
        let framed = io
            .as_mut()
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotConnected, "not connected"))?;
        framed.send(request).await?;
        let response = tokio::time::timeout(*self.args.read_timeout, framed.next())
            .await
            .map_err(|_| io::Error::new(io::ErrorKind::TimedOut, "reading a response timed out"))?;
        match response {
            Some(response) => response,
            None => Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "connection closed before a response was received",
            )),
        }
    }
}

impl Channel for TcpConnection {
    async fn send_request(&self, request: Request) -> io::Result<Vec<u8>> {
        let mut io = self.io.lock().await;
        self.connect_locked(&mut io).await?;
        let result = match self.exchange(&mut io, request).await {
            Ok(response) => Ok(response),
            Err(e) => {
                info!(
                    message = "request failed, will reconnect and retry once",
                    error = (&e as &dyn std::error::Error)
                );
                Self::disconnect_locked(&mut io).await;
                self.connect_locked(&mut io).await?;
                self.exchange(&mut io, request).await
            }
        };
        Self::disconnect_locked(&mut io).await;
        result
    }
}
