//! Queue transport server
//!
//! Exposes the three shared queues plus the read-only constant-args
//! handle over TCP: handshake first, then one codec-encoded request per
//! frame, one response per request. `Get` and `Put` carry client-chosen
//! timeouts, so the server holds the request open instead of making
//! workers poll the network.
//!
//! The serving task deliberately takes no part in signal handling (the
//! `Ignore` disposition): the server process must outlive an interrupt
//! long enough to persist state, so the transport is torn down last,
//! explicitly, with a bounded wait.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::broadcast;
use tokio::task::{JoinHandle, JoinSet};
use tracing::{debug, error, info, warn};

use foreman_wire::protocol::MAX_WAIT_MS;
use foreman_wire::{
    serve_handshake, AnyCodec, FailureRecord, FrameCodec, JobValue, QueueItem, QueueName, Request,
    Response, WireError, WireResult,
};
use tokio_util::codec::Framed;

use crate::error::{ServerError, ServerResult};
use crate::queue::SharedQueue;

const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);

/// The three wire-exposed queues, shared between the dispatcher and
/// every client connection.
#[derive(Debug)]
pub(crate) struct QueueHub {
    pub(crate) job_q: SharedQueue<JobValue>,
    pub(crate) result_q: SharedQueue<(JobValue, JobValue)>,
    pub(crate) fail_q: SharedQueue<FailureRecord>,
}

impl QueueHub {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self {
            job_q: SharedQueue::unbounded(),
            result_q: SharedQueue::unbounded(),
            fail_q: SharedQueue::unbounded(),
        })
    }
}

struct ConnectionCtx {
    authkey: Arc<Vec<u8>>,
    codec: AnyCodec,
    hub: Arc<QueueHub>,
    const_args: Option<JobValue>,
}

/// Running transport server.
pub(crate) struct QueueTransport {
    local_addr: SocketAddr,
    shutdown_tx: broadcast::Sender<()>,
    accept_task: JoinHandle<()>,
}

impl QueueTransport {
    /// Bind the listener and start serving connections in a background
    /// task.
    pub(crate) async fn bind(
        addr: SocketAddr,
        authkey: Vec<u8>,
        codec: AnyCodec,
        hub: Arc<QueueHub>,
        const_args: Option<JobValue>,
    ) -> ServerResult<Self> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|source| ServerError::Bind { addr, source })?;
        let local_addr = listener.local_addr()?;
        info!(%local_addr, "queue transport listening");

        let (shutdown_tx, mut shutdown_rx) = broadcast::channel(1);
        let authkey = Arc::new(authkey);
        let accept_task = tokio::spawn(async move {
            let mut connections = JoinSet::new();
            loop {
                tokio::select! {
                    _ = shutdown_rx.recv() => {
                        debug!("queue transport received shutdown signal");
                        break;
                    }
                    accepted = listener.accept() => match accepted {
                        Ok((stream, peer)) => {
                            debug!(%peer, "accepted queue connection");
                            let ctx = ConnectionCtx {
                                authkey: authkey.clone(),
                                codec,
                                hub: hub.clone(),
                                const_args: const_args.clone(),
                            };
                            connections.spawn(async move {
                                match serve_connection(stream, peer, ctx).await {
                                    Ok(()) => {}
                                    Err(WireError::AuthFailed) => {
                                        warn!(%peer, "rejected client with wrong authkey");
                                    }
                                    Err(WireError::ConnectionClosed) => {
                                        debug!(%peer, "client dropped the connection mid-exchange");
                                    }
                                    Err(e) => {
                                        warn!(%peer, error = %e, "queue connection failed");
                                    }
                                }
                            });
                        }
                        Err(e) => {
                            error!(error = %e, "failed to accept queue connection");
                            break;
                        }
                    }
                }
            }
            debug!(active = connections.len(), "closing queue connections");
            connections.shutdown().await;
        });

        Ok(Self {
            local_addr,
            shutdown_tx,
            accept_task,
        })
    }

    pub(crate) fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Stop accepting, close every connection, and wait up to `wait` for
    /// the serving task to finish.
    pub(crate) async fn shutdown(mut self, wait: Duration) {
        let _ = self.shutdown_tx.send(());
        if tokio::time::timeout(wait, &mut self.accept_task)
            .await
            .is_err()
        {
            warn!("queue transport did not stop within {wait:?}, aborting");
            self.accept_task.abort();
        }
        debug!("queue transport stopped");
    }
}

async fn serve_connection(
    stream: TcpStream,
    peer: SocketAddr,
    ctx: ConnectionCtx,
) -> WireResult<()> {
    let mut framed = Framed::new(stream, FrameCodec::new());
    tokio::time::timeout(
        HANDSHAKE_TIMEOUT,
        serve_handshake(&mut framed, &ctx.authkey),
    )
    .await
    .map_err(|_| WireError::protocol("handshake timed out"))??;
    debug!(%peer, "client authenticated");

    while let Some(frame) = framed.next().await {
        let frame = frame?;
        let response = match ctx.codec.decode::<Request>(&frame) {
            Ok(request) => handle_request(&ctx, request).await,
            Err(e) => Response::Error(format!("undecodable request: {e}")),
        };
        let encoded = ctx.codec.encode(&response)?;
        framed.send(Bytes::from(encoded)).await?;
    }
    debug!(%peer, "client disconnected");
    Ok(())
}

async fn handle_request(ctx: &ConnectionCtx, request: Request) -> Response {
    match request {
        Request::ConstArgs => Response::ConstArgs(ctx.const_args.clone()),
        Request::Get { queue, timeout_ms } => {
            let wait = clamp_wait(timeout_ms);
            match queue {
                QueueName::Job => match ctx.hub.job_q.pop_timeout(wait).await {
                    Some(arg) => Response::Item(QueueItem::Job(arg)),
                    None => Response::Empty,
                },
                QueueName::Result => match ctx.hub.result_q.pop_timeout(wait).await {
                    Some((arg, result)) => Response::Item(QueueItem::Outcome { arg, result }),
                    None => Response::Empty,
                },
                QueueName::Fail => match ctx.hub.fail_q.pop_timeout(wait).await {
                    Some(record) => Response::Item(QueueItem::Failure(record)),
                    None => Response::Empty,
                },
            }
        }
        Request::Put {
            queue,
            item,
            timeout_ms,
        } => {
            if item.queue() != queue {
                return Response::Error(format!(
                    "item shape belongs to {}, not {queue}",
                    item.queue()
                ));
            }
            let wait = clamp_wait(timeout_ms);
            let stored = match item {
                QueueItem::Job(arg) => ctx.hub.job_q.push_timeout(arg, wait).await.is_ok(),
                QueueItem::Outcome { arg, result } => ctx
                    .hub
                    .result_q
                    .push_timeout((arg, result), wait)
                    .await
                    .is_ok(),
                QueueItem::Failure(record) => {
                    ctx.hub.fail_q.push_timeout(record, wait).await.is_ok()
                }
            };
            if stored {
                Response::Accepted
            } else {
                Response::Full
            }
        }
    }
}

fn clamp_wait(timeout_ms: u64) -> Duration {
    Duration::from_millis(timeout_ms.min(MAX_WAIT_MS))
}

#[cfg(test)]
mod tests {
    use super::*;
    use foreman_wire::join_handshake;

    async fn start_transport(const_args: Option<JobValue>) -> (QueueTransport, Arc<QueueHub>) {
        let hub = QueueHub::new();
        let transport = QueueTransport::bind(
            "127.0.0.1:0".parse().unwrap(),
            b"test key".to_vec(),
            AnyCodec::default(),
            hub.clone(),
            const_args,
        )
        .await
        .unwrap();
        (transport, hub)
    }

    async fn connect(addr: SocketAddr, authkey: &[u8]) -> WireResult<Framed<TcpStream, FrameCodec>> {
        let stream = TcpStream::connect(addr).await?;
        let mut framed = Framed::new(stream, FrameCodec::new());
        join_handshake(&mut framed, authkey).await?;
        Ok(framed)
    }

    async fn roundtrip(
        framed: &mut Framed<TcpStream, FrameCodec>,
        codec: &AnyCodec,
        request: &Request,
    ) -> Response {
        let bytes = codec.encode(request).unwrap();
        framed.send(Bytes::from(bytes)).await.unwrap();
        let frame = framed.next().await.unwrap().unwrap();
        codec.decode(&frame).unwrap()
    }

    #[tokio::test]
    async fn serves_queues_and_const_args() {
        let codec = AnyCodec::default();
        let konst = JobValue::from_serialize(&codec, &"params").unwrap();
        let (transport, hub) = start_transport(Some(konst.clone())).await;
        let mut framed = connect(transport.local_addr(), b"test key").await.unwrap();

        // Constant args come back as published.
        let response = roundtrip(&mut framed, &codec, &Request::ConstArgs).await;
        assert_eq!(response, Response::ConstArgs(Some(konst)));

        // A job seeded server-side is visible through Get.
        let arg = JobValue::from_serialize(&codec, &11u32).unwrap();
        hub.job_q.try_push(arg.clone()).unwrap();
        let response = roundtrip(
            &mut framed,
            &codec,
            &Request::Get {
                queue: QueueName::Job,
                timeout_ms: 1000,
            },
        )
        .await;
        assert_eq!(response, Response::Item(QueueItem::Job(arg.clone())));

        // A result pushed by the client lands in the result queue.
        let response = roundtrip(
            &mut framed,
            &codec,
            &Request::Put {
                queue: QueueName::Result,
                item: QueueItem::Outcome {
                    arg: arg.clone(),
                    result: arg.clone(),
                },
                timeout_ms: 1000,
            },
        )
        .await;
        assert_eq!(response, Response::Accepted);
        assert_eq!(hub.result_q.try_pop(), Some((arg.clone(), arg)));

        transport.shutdown(Duration::from_secs(2)).await;
    }

    #[tokio::test]
    async fn empty_get_times_out_with_empty_not_error() {
        let codec = AnyCodec::default();
        let (transport, _hub) = start_transport(None).await;
        let mut framed = connect(transport.local_addr(), b"test key").await.unwrap();
        let response = roundtrip(
            &mut framed,
            &codec,
            &Request::Get {
                queue: QueueName::Job,
                timeout_ms: 50,
            },
        )
        .await;
        assert_eq!(response, Response::Empty);
        transport.shutdown(Duration::from_secs(2)).await;
    }

    #[tokio::test]
    async fn wrong_key_is_disconnected() {
        let (transport, _hub) = start_transport(None).await;
        let outcome = connect(transport.local_addr(), b"wrong key").await;
        assert!(matches!(outcome, Err(WireError::AuthFailed)));
        transport.shutdown(Duration::from_secs(2)).await;
    }

    #[tokio::test]
    async fn mismatched_item_shape_is_rejected() {
        let codec = AnyCodec::default();
        let (transport, hub) = start_transport(None).await;
        let mut framed = connect(transport.local_addr(), b"test key").await.unwrap();
        let arg = JobValue::from_serialize(&codec, &1u8).unwrap();
        let response = roundtrip(
            &mut framed,
            &codec,
            &Request::Put {
                queue: QueueName::Result,
                item: QueueItem::Job(arg),
                timeout_ms: 100,
            },
        )
        .await;
        assert!(matches!(response, Response::Error(_)));
        assert!(hub.result_q.is_empty());
        transport.shutdown(Duration::from_secs(2)).await;
    }

    #[tokio::test]
    async fn shutdown_severs_connected_clients() {
        let (transport, _hub) = start_transport(None).await;
        let mut framed = connect(transport.local_addr(), b"test key").await.unwrap();
        transport.shutdown(Duration::from_secs(2)).await;
        // The closed connection surfaces as end-of-stream, the
        // transport-fault workers treat as fatal.
        let next = framed.next().await;
        assert!(next.is_none() || next.unwrap().is_err());
    }
}
