//! `serve`: a stand-in controller for dry runs.
//!
//! Binds a ZMTP `REP` socket and answers each request with a fixed reply or
//! an echo. Requesters are served one at a time.

use std::time::Duration;

use anyhow::{Context, Result};
use bytes::{BufMut, Bytes, BytesMut};
use clap::Args;
use record_control_core::TransportError;
use record_control_transport::RepSocket;
use tokio::{
    io::{AsyncRead, AsyncWrite},
    net::TcpListener,
};

use crate::config::ControlConfig;

/// Reply to a zero-length request.
pub const EMPTY_REQUEST_REPLY: &str = "Received zero-length message";

const ACCEPT_BACKOFF_MIN: Duration = Duration::from_millis(100);
const ACCEPT_BACKOFF_MAX: Duration = Duration::from_secs(1);

#[derive(Debug, Args)]
pub struct ServeArgs {
    /// Address to listen on; the port comes from `--port`
    #[arg(long, default_value = "127.0.0.1")]
    pub bind: String,

    /// Reply sent for every request
    #[arg(long, default_value = "OK")]
    pub reply: String,

    /// Reply with `ACK:<request>` instead of the fixed reply
    #[arg(long, conflicts_with = "reply")]
    pub echo: bool,

    /// Exit after the first requester disconnects
    #[arg(long)]
    pub once: bool,
}

/// How the stand-in controller answers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Responder {
    Fixed(Bytes),
    Echo,
}

impl Responder {
    #[must_use]
    pub fn respond(&self, request: &[u8]) -> Bytes {
        if request.is_empty() {
            return Bytes::from_static(EMPTY_REQUEST_REPLY.as_bytes());
        }
        match self {
            Self::Fixed(reply) => reply.clone(),
            Self::Echo => {
                let mut out = BytesMut::with_capacity(4 + request.len());
                out.put_slice(b"ACK:");
                out.put_slice(request);
                out.freeze()
            }
        }
    }
}

/// Delay before retrying a failed accept. Doubles per consecutive failure
/// up to a cap and resets once a connection is accepted.
#[derive(Debug)]
struct AcceptBackoff {
    next: Duration,
}

impl AcceptBackoff {
    const fn new() -> Self {
        Self {
            next: ACCEPT_BACKOFF_MIN,
        }
    }

    fn next_delay(&mut self) -> Duration {
        let delay = self.next;
        self.next = (delay * 2).min(ACCEPT_BACKOFF_MAX);
        delay
    }

    const fn reset(&mut self) {
        self.next = ACCEPT_BACKOFF_MIN;
    }
}

pub async fn run(config: &ControlConfig, args: ServeArgs) -> Result<()> {
    let address = format!("{}:{}", args.bind, config.port);
    let listener = TcpListener::bind(&address)
        .await
        .with_context(|| format!("failed to bind {address}"))?;
    tracing::info!("Listening on tcp://{}", listener.local_addr()?);

    let responder = if args.echo {
        Responder::Echo
    } else {
        Responder::Fixed(Bytes::from(args.reply))
    };
    let handshake_timeout = config.endpoint().timeout;

    tokio::select! {
        result = accept_loop(&listener, &responder, handshake_timeout, args.once) => result,
        signal = tokio::signal::ctrl_c() => {
            signal.context("failed to listen for Ctrl-C")?;
            tracing::info!("Interrupted, shutting down");
            Ok(())
        }
    }
}

async fn accept_loop(
    listener: &TcpListener,
    responder: &Responder,
    handshake_timeout: Duration,
    once: bool,
) -> Result<()> {
    let mut backoff = AcceptBackoff::new();
    loop {
        let socket = match RepSocket::accept(listener, handshake_timeout).await {
            Ok(socket) => {
                backoff.reset();
                socket
            }
            Err(e) => {
                let delay = backoff.next_delay();
                tracing::warn!("Rejected connection: {e}; retrying in {delay:?}");
                tokio::time::sleep(delay).await;
                continue;
            }
        };
        let peer = socket.peer().to_string();
        tracing::info!("Requester connected from {peer}");

        match serve_connection(socket, responder).await {
            Ok(served) => tracing::info!("{peer} disconnected after {served} requests"),
            Err(e) => tracing::warn!("Connection from {peer} failed: {e}"),
        }
        if once {
            return Ok(());
        }
    }
}

/// Answer requests on one connection until the requester hangs up.
/// Returns the number of requests served.
pub async fn serve_connection<S>(
    mut socket: RepSocket<S>,
    responder: &Responder,
) -> Result<usize, TransportError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut served = 0;
    while let Some(request) = socket.recv_request().await? {
        tracing::info!("Request: {}", String::from_utf8_lossy(&request));
        socket.send_reply(responder.respond(&request)).await?;
        served += 1;
    }
    Ok(served)
}
