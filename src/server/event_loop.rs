//! Event-loop connection server.
//!
//! A fixed number of OS threads each run a single-threaded runtime that
//! multiplexes its share of the connections. The acceptor hands sockets to
//! the loops round-robin. Each connection keeps a [`Client`] holding its
//! unconsumed input and pending output, so a request split across reads is
//! completed by later data and all replies produced by one read go out in a
//! single write.

use std::net::TcpStream as StdTcpStream;
use std::thread;

use bytes::BytesMut;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::runtime::Builder;
use tokio::sync::mpsc;
use tokio_util::codec::Decoder;
use tracing::{debug, error, info, warn};

use crate::cache::Cache;
use crate::command::{dispatch, Action};
use crate::error::Result;
use crate::protocol::{Frame, RespCodec};
use crate::server::ServerContext;

const READ_CHUNK: usize = 16 * 1024;

// == Client ==
/// Per-connection buffers.
#[derive(Debug, Default)]
pub struct Client {
    input: BytesMut,
    output: BytesMut,
    codec: RespCodec,
}

impl Client {
    pub fn new() -> Self {
        Self::default()
    }

    /// Buffer that incoming bytes are appended to.
    pub fn input_mut(&mut self) -> &mut BytesMut {
        &mut self.input
    }

    /// Replies produced so far and not yet written.
    pub fn output(&self) -> &[u8] {
        &self.output
    }

    pub fn clear_output(&mut self) {
        self.output.clear();
    }

    /// Executes every complete request in the input buffer, appending the
    /// replies to the output buffer. A trailing partial request stays
    /// buffered.
    ///
    /// Stops early at QUIT, SHUTDOWN or a framing error and returns what the
    /// connection should do next. Requests after that point are ignored.
    pub fn process(&mut self, cache: &Cache) -> Action {
        loop {
            match self.codec.decode(&mut self.input) {
                Ok(Some(args)) => {
                    let (reply, action) = dispatch(args, cache);
                    reply.encode(&mut self.output);
                    if action != Action::Continue {
                        return action;
                    }
                }
                Ok(None) => return Action::Continue,
                Err(err) => {
                    Frame::error(&err).encode(&mut self.output);
                    return Action::Close;
                }
            }
        }
    }
}

// == Acceptor ==
/// Starts `loops` event-loop threads and feeds them accepted connections
/// until shutdown.
pub async fn serve(listener: TcpListener, loops: usize, ctx: ServerContext) -> Result<()> {
    let loops = loops.max(1);
    let mut queues = Vec::with_capacity(loops);
    for id in 0..loops {
        let (tx, rx) = mpsc::unbounded_channel();
        let ctx = ctx.clone();
        thread::Builder::new()
            .name(format!("doppio-loop-{}", id))
            .spawn(move || run_loop(id, rx, ctx))?;
        queues.push(tx);
    }
    info!(loops, "Serving connections on event loops");

    let mut next = 0;
    loop {
        let accepted = tokio::select! {
            accepted = listener.accept() => accepted,
            _ = ctx.shutdown.wait() => return Ok(()),
        };
        let (socket, addr) = match accepted {
            Ok(accepted) => accepted,
            Err(err) => {
                warn!(error = %err, "Failed to accept connection");
                continue;
            }
        };
        if let Err(err) = socket.set_nodelay(true) {
            debug!(%addr, error = %err, "Failed to set TCP_NODELAY");
        }

        // Sockets are moved between runtimes in their std form.
        let socket = match socket.into_std() {
            Ok(socket) => socket,
            Err(err) => {
                warn!(%addr, error = %err, "Failed to detach connection");
                continue;
            }
        };
        debug!(%addr, event_loop = next, "Accepted connection");
        if queues[next].send(socket).is_err() {
            error!(event_loop = next, "Event loop stopped, dropping connection");
        }
        next = (next + 1) % loops;
    }
}

fn run_loop(id: usize, mut sockets: mpsc::UnboundedReceiver<StdTcpStream>, ctx: ServerContext) {
    let runtime = match Builder::new_current_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(err) => {
            error!(event_loop = id, error = %err, "Failed to start event loop");
            return;
        }
    };

    runtime.block_on(async move {
        loop {
            let socket = tokio::select! {
                socket = sockets.recv() => match socket {
                    Some(socket) => socket,
                    None => break,
                },
                _ = ctx.shutdown.wait() => break,
            };
            let socket = match TcpStream::from_std(socket) {
                Ok(socket) => socket,
                Err(err) => {
                    warn!(event_loop = id, error = %err, "Failed to register connection");
                    continue;
                }
            };

            let ctx = ctx.clone();
            tokio::spawn(async move {
                if let Err(err) = handle_connection(socket, ctx).await {
                    debug!(event_loop = id, error = %err, "Connection closed with error");
                }
            });
        }
    });
    debug!(event_loop = id, "Event loop stopped");
}

/// Drives one connection: read whatever is available, process it, flush
/// the replies.
pub async fn handle_connection<S>(mut stream: S, ctx: ServerContext) -> Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut client = Client::new();
    loop {
        client.input_mut().reserve(READ_CHUNK);
        if stream.read_buf(client.input_mut()).await? == 0 {
            return Ok(());
        }

        let action = client.process(&ctx.cache);
        if !client.output().is_empty() {
            stream.write_all(client.output()).await?;
            client.clear_output();
        }

        match action {
            Action::Continue => {}
            Action::Close => return Ok(()),
            Action::Shutdown => {
                ctx.shutdown.trigger();
                return Ok(());
            }
        }
    }
}
