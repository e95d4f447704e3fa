//! Background tasks: the host's accept loop and the symmetric read/flush loop.
//!
//! Both check their cancellation token at every iteration boundary and never
//! abandon a write half way through.

use crate::session::context::SessionContext;
use crate::transport::Connection;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Pause after a failed accept before trying again
const ACCEPT_BACKOFF: Duration = Duration::from_millis(50);

/// Accept joining clients until the registry is full or the session stops.
///
/// The listener is dropped, closing the listening socket, when this returns.
pub async fn accept_loop(ctx: Arc<SessionContext>, listener: TcpListener, cancel: CancellationToken) {
    loop {
        let full = ctx.registry().map(|r| r.is_full()).unwrap_or(true);
        if full {
            info!("Peer capacity reached, no longer accepting connections");
            break;
        }

        tokio::select! {
            _ = cancel.cancelled() => break,
            accepted = listener.accept() => match accepted {
                Ok((stream, addr)) => {
                    let registered = Connection::new(stream)
                        .and_then(|conn| ctx.accept_connection(conn));
                    if let Err(e) = registered {
                        warn!(%addr, error = %e, "Could not register incoming connection");
                        ctx.metrics().connection_error();
                    }
                }
                Err(e) => {
                    warn!(error = %e, "Accept failed");
                    ctx.metrics().connection_error();
                    tokio::select! {
                        _ = cancel.cancelled() => break,
                        _ = tokio::time::sleep(ACCEPT_BACKOFF) => {}
                    }
                }
            }
        }
    }
    debug!("Accept loop stopped");
}

/// Each cycle: drain readable bytes from every remote peer and dispatch them,
/// then write one bounded batch from the outbound queue.
pub async fn run(ctx: Arc<SessionContext>, cancel: CancellationToken) {
    let mut ticker = tokio::time::interval(ctx.config().io.poll_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {}
        }

        ctx.poll_inbound();
        ctx.flush_outbound().await;
    }
    debug!("I/O loop stopped");
}
