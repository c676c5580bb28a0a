//! # Foreman Client
//!
//! The worker side of the dispatch plane: connect to a foreman server,
//! pull arguments off the shared job queue, run the user function, and
//! push results - or failure reports - back.
//!
//! Faults stay where they belong: one bad argument produces a failure
//! record and a local traceback file and never takes the pool down,
//! while a lost server connection ends the affected worker immediately.
//! SIGINT/SIGTERM stop every worker cooperatively; a worker holding an
//! argument puts it back on the job queue before exiting so the server
//! can hand it to someone else.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use foreman_client::{ClientConfig, JobClient, JobError};
//! use foreman_wire::{AnyCodec, JobValue};
//!
//! # async fn example() -> foreman_client::ClientResult<()> {
//! let codec = AnyCodec::default();
//! let config = ClientConfig::builder("server.example", "shared secret").build();
//! let client = JobClient::new(config, move |arg: &JobValue, _konst: Option<&JobValue>| {
//!     let n: u64 = arg.decode(&codec).map_err(|e| JobError::new("DecodeError", e))?;
//!     JobValue::from_serialize(&codec, &(n * n)).map_err(|e| JobError::new("EncodeError", e))
//! });
//! let report = client.run().await?;
//! println!("processed {} jobs", report.jobs_done);
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]

pub mod config;
pub mod connection;
pub mod error;
pub mod pool;
pub mod worker;

pub use config::{ClientConfig, ClientConfigBuilder};
pub use connection::ServerConnection;
pub use error::{ClientError, ClientResult};
pub use pool::{ClientReport, JobClient, PoolShutdownHandle};
pub use worker::{JobError, JobFunction};
