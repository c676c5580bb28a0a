//! Queue protocol messages
//!
//! After the handshake, every exchange is one request frame followed by
//! one response frame. Three named queues and the constant-args handle
//! make up the whole surface. Timeouts ride along with `Get`/`Put` so the
//! server can hold the request open instead of forcing the client to
//! poll the network.

use core::fmt;

use serde::{Deserialize, Serialize};

use crate::value::{FailureRecord, JobValue};

/// Default listen port of the queue transport.
pub const DEFAULT_PORT: u16 = 42524;

/// Cap a server applies to client-supplied wait times.
pub const MAX_WAIT_MS: u64 = 60_000;

/// The three wire-exposed queues.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum QueueName {
    /// Arguments waiting to be processed (server fills, workers drain)
    Job,
    /// `(argument, result)` pairs (workers fill, server drains)
    Result,
    /// Failure records (workers fill, server drains at shutdown)
    Fail,
}

impl fmt::Display for QueueName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Job => f.write_str("job_q"),
            Self::Result => f.write_str("result_q"),
            Self::Fail => f.write_str("fail_q"),
        }
    }
}

/// One element of one queue.
///
/// Each variant belongs to exactly one queue; the server rejects a `Put`
/// whose item shape does not match the addressed queue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum QueueItem {
    /// An argument on the job queue
    Job(JobValue),
    /// A processed pair on the result queue
    Outcome {
        /// The argument the worker pulled
        arg: JobValue,
        /// What the user function returned for it
        result: JobValue,
    },
    /// A failure report on the fail queue
    Failure(FailureRecord),
}

impl QueueItem {
    /// The queue this item shape belongs to.
    pub fn queue(&self) -> QueueName {
        match self {
            Self::Job(_) => QueueName::Job,
            Self::Outcome { .. } => QueueName::Result,
            Self::Failure(_) => QueueName::Fail,
        }
    }
}

/// Client-to-server request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Request {
    /// Pop one item, waiting up to `timeout_ms` for one to appear.
    Get {
        /// Which queue to pop from
        queue: QueueName,
        /// How long the server may hold the request (capped at
        /// [`MAX_WAIT_MS`])
        timeout_ms: u64,
    },
    /// Push one item, waiting up to `timeout_ms` for space.
    Put {
        /// Which queue to push to
        queue: QueueName,
        /// The item; its shape must match `queue`
        item: QueueItem,
        /// How long the server may hold the request (capped at
        /// [`MAX_WAIT_MS`])
        timeout_ms: u64,
    },
    /// Fetch the read-only constant-args bundle.
    ConstArgs,
}

/// Server-to-client response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Response {
    /// `Get` produced an item
    Item(QueueItem),
    /// `Get` timed out with the queue still empty
    Empty,
    /// `Put` stored the item
    Accepted,
    /// `Put` timed out with the queue still full
    Full,
    /// The constant-args bundle, if the server has one
    ConstArgs(Option<JobValue>),
    /// The request could not be served
    Error(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::AnyCodec;

    #[test]
    fn requests_roundtrip_through_the_codec() {
        let codec = AnyCodec::default();
        let arg = JobValue::from_serialize(&codec, &0.25f64).unwrap();
        let requests = [
            Request::Get {
                queue: QueueName::Job,
                timeout_ms: 100,
            },
            Request::Put {
                queue: QueueName::Result,
                item: QueueItem::Outcome {
                    arg: arg.clone(),
                    result: arg.clone(),
                },
                timeout_ms: 10_000,
            },
            Request::Put {
                queue: QueueName::Fail,
                item: QueueItem::Failure(FailureRecord::new(arg, "JobError", "host-1")),
                timeout_ms: 10_000,
            },
            Request::ConstArgs,
        ];
        for request in requests {
            let bytes = codec.encode(&request).unwrap();
            let back: Request = codec.decode(&bytes).unwrap();
            assert_eq!(back, request);
        }
    }

    #[test]
    fn item_shapes_name_their_queue() {
        let codec = AnyCodec::default();
        let v = JobValue::from_serialize(&codec, &1u8).unwrap();
        assert_eq!(QueueItem::Job(v.clone()).queue(), QueueName::Job);
        assert_eq!(
            QueueItem::Outcome {
                arg: v.clone(),
                result: v.clone()
            }
            .queue(),
            QueueName::Result
        );
        assert_eq!(
            QueueItem::Failure(FailureRecord::new(v, "x", "h")).queue(),
            QueueName::Fail
        );
    }

    #[test]
    fn queue_names_display_like_the_fields_they_serve() {
        assert_eq!(QueueName::Job.to_string(), "job_q");
        assert_eq!(QueueName::Result.to_string(), "result_q");
        assert_eq!(QueueName::Fail.to_string(), "fail_q");
    }
}
