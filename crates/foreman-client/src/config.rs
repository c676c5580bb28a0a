//! Client configuration

use std::path::PathBuf;

use foreman_wire::AnyCodec;

/// Configuration of a [`JobClient`](crate::JobClient).
///
/// Build one with [`ClientConfig::builder`].
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Server hostname or IP address
    pub host: String,
    /// Server port
    pub port: u16,
    /// Shared transport secret
    pub authkey: Vec<u8>,
    /// Worker count: positive means exactly that many; zero or negative
    /// means `max(1, cpu_count + nproc)`
    pub nproc: i32,
    /// Niceness the client process runs its workers at
    pub nice: i32,
    /// Log volume, 0-2
    pub verbose: u8,
    /// Suppress non-essential warnings
    pub quiet_warnings: bool,
    /// Wire codec; must match the server's
    pub codec: AnyCodec,
    /// Directory traceback files are written into
    pub traceback_dir: PathBuf,
}

impl ClientConfig {
    /// Start building a configuration for the given server.
    pub fn builder(host: impl Into<String>, authkey: impl Into<Vec<u8>>) -> ClientConfigBuilder {
        ClientConfigBuilder {
            config: ClientConfig {
                host: host.into(),
                port: foreman_wire::DEFAULT_PORT,
                authkey: authkey.into(),
                nproc: 0,
                nice: 19,
                verbose: 1,
                quiet_warnings: false,
                codec: AnyCodec::default(),
                traceback_dir: PathBuf::from("."),
            },
        }
    }

    /// Resolve `nproc` against the machine's core count.
    pub fn worker_count(&self) -> usize {
        if self.nproc > 0 {
            self.nproc as usize
        } else {
            let cores = num_cpus::get() as i32;
            (cores + self.nproc).max(1) as usize
        }
    }
}

/// Builder for [`ClientConfig`]
#[derive(Debug)]
pub struct ClientConfigBuilder {
    config: ClientConfig,
}

impl ClientConfigBuilder {
    /// Set the server port
    #[must_use]
    pub fn port(mut self, port: u16) -> Self {
        self.config.port = port;
        self
    }

    /// Set the worker count rule (see [`ClientConfig::nproc`])
    #[must_use]
    pub fn nproc(mut self, nproc: i32) -> Self {
        self.config.nproc = nproc;
        self
    }

    /// Set the niceness applied at startup
    #[must_use]
    pub fn nice(mut self, nice: i32) -> Self {
        self.config.nice = nice;
        self
    }

    /// Set the log volume (0-2)
    #[must_use]
    pub fn verbose(mut self, verbose: u8) -> Self {
        self.config.verbose = verbose;
        self
    }

    /// Suppress non-essential warnings
    #[must_use]
    pub fn quiet_warnings(mut self, quiet: bool) -> Self {
        self.config.quiet_warnings = quiet;
        self
    }

    /// Set the wire codec; must match the server's
    #[must_use]
    pub fn codec(mut self, codec: AnyCodec) -> Self {
        self.config.codec = codec;
        self
    }

    /// Set the directory traceback files are written into
    #[must_use]
    pub fn traceback_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.traceback_dir = dir.into();
        self
    }

    /// Finish the configuration
    #[must_use]
    pub fn build(self) -> ClientConfig {
        self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config_with_nproc(nproc: i32) -> ClientConfig {
        ClientConfig::builder("localhost", "key").nproc(nproc).build()
    }

    #[test]
    fn worker_sizing_rule() {
        let cores = num_cpus::get() as i32;

        assert_eq!(config_with_nproc(4).worker_count(), 4);
        assert_eq!(config_with_nproc(0).worker_count(), cores as usize);
        if cores > 1 {
            assert_eq!(config_with_nproc(-1).worker_count(), (cores - 1) as usize);
        }
        // Even nproc = -cpu_count (and beyond) yields at least one worker.
        assert_eq!(config_with_nproc(-cores).worker_count(), 1);
        assert_eq!(config_with_nproc(-cores - 10).worker_count(), 1);
    }

    #[test]
    fn defaults() {
        let config = ClientConfig::builder("host", "key").build();
        assert_eq!(config.port, 42524);
        assert_eq!(config.nice, 19);
        assert_eq!(config.nproc, 0);
        assert!(!config.quiet_warnings);
    }
}
