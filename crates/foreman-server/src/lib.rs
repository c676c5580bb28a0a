//! # Foreman Server
//!
//! The dispatch plane's server side: seed arguments, publish them over
//! the shared-queue transport, fold incoming results into a user-defined
//! aggregate, and on shutdown persist everything still owed - the
//! aggregate, the unprocessed arguments, and the reported failures - so
//! that no argument is silently lost.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use foreman_server::{JobServer, PairsAggregator, ServerConfig};
//!
//! # async fn example() -> foreman_server::ServerResult<()> {
//! let config = ServerConfig::builder("shared secret").port(42524).build();
//! let server = JobServer::bind(config, PairsAggregator::default()).await?;
//! for i in 0..100u32 {
//!     server.put_arg(&i).await?;
//! }
//! let report = server.run().await?;
//! println!("folded {} results", report.counters.numresults);
//! # Ok(())
//! # }
//! ```
//!
//! The drain loop ends when every outstanding argument has either been
//! folded or reported as failed; failures are terminal and never block
//! termination. SIGINT/SIGTERM convert to an orderly shutdown that still
//! runs the whole dump sequence.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod ledger;
mod queue;
mod reporter;
mod transport;

pub mod config;
pub mod dispatcher;
pub mod error;

pub use config::{DumpPolicy, ServerConfig, ServerConfigBuilder, DEFAULT_PORT};
pub use dispatcher::{
    Aggregator, FoldError, JobServer, PairsAggregator, RunReport, ShutdownHandle,
};
pub use error::{ServerError, ServerResult};
