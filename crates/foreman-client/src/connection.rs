//! Client side of the queue transport
//!
//! One authenticated TCP connection per worker: frame out a request,
//! frame in the response. The typed helpers below keep the worker loop
//! free of protocol details and make the one distinction that matters
//! explicit - `Ok(None)` is "queue empty", an error is "server gone".

use std::time::Duration;

use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_util::codec::Framed;
use tracing::debug;

use foreman_wire::{
    join_handshake, AnyCodec, FailureRecord, FrameCodec, JobValue, QueueItem, QueueName, Request,
    Response, WireError,
};

use crate::error::{ClientError, ClientResult};

/// An authenticated connection to a foreman server.
pub struct ServerConnection {
    framed: Framed<TcpStream, FrameCodec>,
    codec: AnyCodec,
}

impl ServerConnection {
    /// Dial, frame, and authenticate.
    pub async fn connect(
        host: &str,
        port: u16,
        authkey: &[u8],
        codec: AnyCodec,
    ) -> ClientResult<Self> {
        let addr = format!("{host}:{port}");
        let stream = TcpStream::connect(&addr)
            .await
            .map_err(|source| ClientError::Connect {
                addr: addr.clone(),
                source,
            })?;
        let mut framed = Framed::new(stream, FrameCodec::new());
        match join_handshake(&mut framed, authkey).await {
            Ok(()) => {}
            Err(WireError::AuthFailed) => return Err(ClientError::AuthRejected),
            Err(e) => return Err(e.into()),
        }
        debug!(%addr, "connected and authenticated");
        Ok(Self { framed, codec })
    }

    async fn request(&mut self, request: &Request) -> ClientResult<Response> {
        let encoded = self.codec.encode(request)?;
        self.framed.send(Bytes::from(encoded)).await?;
        match self.framed.next().await {
            Some(Ok(frame)) => Ok(self.codec.decode(&frame)?),
            Some(Err(e)) => Err(e.into()),
            None => Err(ClientError::disconnected("connection closed by server")),
        }
    }

    async fn put(
        &mut self,
        queue: QueueName,
        item: QueueItem,
        timeout: Duration,
    ) -> ClientResult<bool> {
        let response = self
            .request(&Request::Put {
                queue,
                item,
                timeout_ms: timeout.as_millis() as u64,
            })
            .await?;
        match response {
            Response::Accepted => Ok(true),
            Response::Full => Ok(false),
            Response::Error(detail) => Err(ClientError::protocol(detail)),
            other => Err(ClientError::protocol(format!(
                "unexpected response to put: {other:?}"
            ))),
        }
    }

    /// Pull one argument; `Ok(None)` means the queue stayed empty for
    /// the whole timeout.
    pub async fn get_job(&mut self, timeout: Duration) -> ClientResult<Option<JobValue>> {
        let response = self
            .request(&Request::Get {
                queue: QueueName::Job,
                timeout_ms: timeout.as_millis() as u64,
            })
            .await?;
        match response {
            Response::Item(QueueItem::Job(arg)) => Ok(Some(arg)),
            Response::Empty => Ok(None),
            Response::Error(detail) => Err(ClientError::protocol(detail)),
            other => Err(ClientError::protocol(format!(
                "unexpected response to job get: {other:?}"
            ))),
        }
    }

    /// Push a processed `(argument, result)` pair.
    pub async fn put_result(
        &mut self,
        arg: JobValue,
        result: JobValue,
        timeout: Duration,
    ) -> ClientResult<bool> {
        self.put(
            QueueName::Result,
            QueueItem::Outcome { arg, result },
            timeout,
        )
        .await
    }

    /// Push a failure record.
    pub async fn put_failure(
        &mut self,
        record: FailureRecord,
        timeout: Duration,
    ) -> ClientResult<bool> {
        self.put(QueueName::Fail, QueueItem::Failure(record), timeout)
            .await
    }

    /// Hand an unprocessed argument back to the job queue (stop-while-
    /// holding path).
    pub async fn requeue_job(&mut self, arg: JobValue, timeout: Duration) -> ClientResult<bool> {
        self.put(QueueName::Job, QueueItem::Job(arg), timeout).await
    }

    /// Fetch the read-only constant-args bundle.
    pub async fn const_args(&mut self) -> ClientResult<Option<JobValue>> {
        match self.request(&Request::ConstArgs).await? {
            Response::ConstArgs(konst) => Ok(konst),
            Response::Error(detail) => Err(ClientError::protocol(detail)),
            other => Err(ClientError::protocol(format!(
                "unexpected response to const-args get: {other:?}"
            ))),
        }
    }
}
