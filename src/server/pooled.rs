//! Pooled connection server.
//!
//! Every accepted connection gets its own task on the multi-threaded
//! runtime. Requests are read one at a time through a framed stream and
//! each reply is written before the next request is decoded.

use futures::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpListener;
use tokio_util::codec::Framed;
use tracing::{debug, info, warn};

use crate::command::{dispatch, Action};
use crate::error::Result;
use crate::protocol::{Frame, RespCodec};
use crate::server::ServerContext;

/// Accepts connections until shutdown, spawning a task for each.
pub async fn serve(listener: TcpListener, ctx: ServerContext) -> Result<()> {
    info!("Serving connections on the worker pool");
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
        debug!(%addr, "Accepted connection");

        let ctx = ctx.clone();
        tokio::spawn(async move {
            match handle_connection(socket, ctx).await {
                Ok(()) => debug!(%addr, "Connection closed"),
                Err(err) => debug!(%addr, error = %err, "Connection closed with error"),
            }
        });
    }
}

/// Drives one connection until the peer leaves, sends QUIT or SHUTDOWN, or
/// breaks the framing.
pub async fn handle_connection<S>(stream: S, ctx: ServerContext) -> Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut framed = Framed::new(stream, RespCodec::new());

    while let Some(request) = framed.next().await {
        let args = match request {
            Ok(args) => args,
            Err(err) if err.is_protocol() => {
                framed.send(Frame::error(&err)).await?;
                return Ok(());
            }
            Err(err) => return Err(err),
        };

        let (reply, action) = dispatch(args, &ctx.cache);
        framed.send(reply).await?;

        match action {
            Action::Continue => {}
            Action::Close => return Ok(()),
            Action::Shutdown => {
                ctx.shutdown.trigger();
                return Ok(());
            }
        }
    }
    Ok(())
}
