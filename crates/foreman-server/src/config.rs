//! Server configuration

use std::net::{IpAddr, Ipv4Addr};
use std::path::{Path, PathBuf};
use std::time::Duration;

use foreman_wire::{AnyCodec, JobValue};

pub use foreman_wire::DEFAULT_PORT;

/// Where (and whether) a shutdown dump is written.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum DumpPolicy {
    /// Skip this dump entirely
    Disabled,
    /// Timestamped file name `YYYY_MM_DD_hh_mm_ss_<kind>.dump` in the
    /// configured dump directory
    #[default]
    Auto,
    /// Exactly this path
    Path(PathBuf),
}

impl DumpPolicy {
    pub(crate) fn resolve(&self, dir: &Path, kind: &str, stamp: &str) -> Option<PathBuf> {
        match self {
            Self::Disabled => None,
            Self::Auto => Some(dir.join(format!("{stamp}_{kind}.dump"))),
            Self::Path(path) => Some(path.clone()),
        }
    }
}

/// Configuration of a [`JobServer`](crate::JobServer).
///
/// Build one with [`ServerConfig::builder`].
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Shared transport secret; clients must present the same key
    pub authkey: Vec<u8>,
    /// Listen address (default: all interfaces)
    pub bind_ip: IpAddr,
    /// Listen port (default [`DEFAULT_PORT`]; 0 picks an ephemeral port)
    pub port: u16,
    /// Constant arguments published read-only to every client
    pub const_args: Option<JobValue>,
    /// Status report refresh period
    pub msg_interval: Duration,
    /// Aggregate persistence policy
    pub dump_aggregate: DumpPolicy,
    /// Leftover-arguments persistence policy
    pub dump_args: DumpPolicy,
    /// Failure-list persistence policy
    pub dump_failures: DumpPolicy,
    /// Directory that `Auto` dump names resolve into
    pub dump_dir: PathBuf,
    /// Disable the periodic status report
    pub no_status_bar: bool,
    /// Log volume, 0-2 (0 also disables the status report)
    pub verbose: u8,
    /// Wire and dump codec
    pub codec: AnyCodec,
    /// How long the server keeps folding late results after the
    /// termination gate opens
    pub settle_delay: Duration,
    /// Poll interval of the drain loop on the result queue
    pub result_poll: Duration,
    /// Bounded wait for the transport to stop during shutdown
    pub transport_shutdown_wait: Duration,
}

impl ServerConfig {
    /// Start building a configuration with the required shared secret.
    pub fn builder(authkey: impl Into<Vec<u8>>) -> ServerConfigBuilder {
        ServerConfigBuilder {
            config: ServerConfig {
                authkey: authkey.into(),
                bind_ip: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
                port: DEFAULT_PORT,
                const_args: None,
                msg_interval: Duration::from_secs(1),
                dump_aggregate: DumpPolicy::Auto,
                dump_args: DumpPolicy::Auto,
                dump_failures: DumpPolicy::Auto,
                dump_dir: PathBuf::from("."),
                no_status_bar: false,
                verbose: 1,
                codec: AnyCodec::default(),
                settle_delay: Duration::from_secs(2),
                result_poll: Duration::from_secs(1),
                transport_shutdown_wait: Duration::from_secs(2),
            },
        }
    }
}

/// Builder for [`ServerConfig`]
#[derive(Debug)]
pub struct ServerConfigBuilder {
    config: ServerConfig,
}

impl ServerConfigBuilder {
    /// Set the listen address
    #[must_use]
    pub fn bind_ip(mut self, ip: IpAddr) -> Self {
        self.config.bind_ip = ip;
        self
    }

    /// Set the listen port (0 picks an ephemeral port)
    #[must_use]
    pub fn port(mut self, port: u16) -> Self {
        self.config.port = port;
        self
    }

    /// Publish a constant-args bundle to every client
    #[must_use]
    pub fn const_args(mut self, const_args: JobValue) -> Self {
        self.config.const_args = Some(const_args);
        self
    }

    /// Set the status report refresh period
    #[must_use]
    pub fn msg_interval(mut self, interval: Duration) -> Self {
        self.config.msg_interval = interval;
        self
    }

    /// Set the aggregate persistence policy
    #[must_use]
    pub fn dump_aggregate(mut self, policy: DumpPolicy) -> Self {
        self.config.dump_aggregate = policy;
        self
    }

    /// Set the leftover-arguments persistence policy
    #[must_use]
    pub fn dump_args(mut self, policy: DumpPolicy) -> Self {
        self.config.dump_args = policy;
        self
    }

    /// Set the failure-list persistence policy
    #[must_use]
    pub fn dump_failures(mut self, policy: DumpPolicy) -> Self {
        self.config.dump_failures = policy;
        self
    }

    /// Set the directory that `Auto` dump names resolve into
    #[must_use]
    pub fn dump_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.dump_dir = dir.into();
        self
    }

    /// Disable the periodic status report
    #[must_use]
    pub fn no_status_bar(mut self, disabled: bool) -> Self {
        self.config.no_status_bar = disabled;
        self
    }

    /// Set the log volume (0-2)
    #[must_use]
    pub fn verbose(mut self, verbose: u8) -> Self {
        self.config.verbose = verbose;
        self
    }

    /// Set the wire and dump codec
    #[must_use]
    pub fn codec(mut self, codec: AnyCodec) -> Self {
        self.config.codec = codec;
        self
    }

    /// Shrink or stretch the settling delay (mostly for tests)
    #[must_use]
    pub fn settle_delay(mut self, delay: Duration) -> Self {
        self.config.settle_delay = delay;
        self
    }

    /// Set the drain loop's result-queue poll interval
    #[must_use]
    pub fn result_poll(mut self, poll: Duration) -> Self {
        self.config.result_poll = poll;
        self
    }

    /// Set the bounded wait for transport teardown
    #[must_use]
    pub fn transport_shutdown_wait(mut self, wait: Duration) -> Self {
        self.config.transport_shutdown_wait = wait;
        self
    }

    /// Finish the configuration
    #[must_use]
    pub fn build(self) -> ServerConfig {
        self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_the_documented_surface() {
        let config = ServerConfig::builder("secret").build();
        assert_eq!(config.port, 42524);
        assert_eq!(config.authkey, b"secret");
        assert_eq!(config.msg_interval, Duration::from_secs(1));
        assert_eq!(config.dump_aggregate, DumpPolicy::Auto);
        assert_eq!(config.verbose, 1);
        assert!(!config.no_status_bar);
    }

    #[test]
    fn dump_policy_resolution() {
        let dir = Path::new("/var/dumps");
        assert_eq!(DumpPolicy::Disabled.resolve(dir, "args", "2026_08_01_12_00_00"), None);
        assert_eq!(
            DumpPolicy::Auto.resolve(dir, "args", "2026_08_01_12_00_00"),
            Some(PathBuf::from("/var/dumps/2026_08_01_12_00_00_args.dump"))
        );
        assert_eq!(
            DumpPolicy::Path(PathBuf::from("explicit.dump")).resolve(dir, "args", "x"),
            Some(PathBuf::from("explicit.dump"))
        );
    }
}
