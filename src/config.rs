/*!
 * Process Configuration
 *
 * Command-line flags parsed once at startup into a read-only object:
 * snapshot directory and filename, listening port, and the optional
 * replica role with its master address. Nothing in the server mutates
 * configuration after parse.
 */

use anyhow::{Context, Result};
use log::warn;
use std::path::PathBuf;

/// Master address for an instance running as a replica
#[derive(Debug, Clone, PartialEq)]
pub struct ReplicaOf {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone)]
pub struct Config {
    dir: String,
    dbfilename: String,
    port: u16,
    replica_of: Option<ReplicaOf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            dir: ".".to_string(),
            dbfilename: "dump.rdb".to_string(),
            port: crate::DEFAULT_PORT,
            replica_of: None,
        }
    }
}

impl Config {
    /// Parse configuration from command-line arguments (program name
    /// already stripped)
    ///
    /// Recognized flags: `--dir <path>`, `--dbfilename <name>`,
    /// `--port <n>`, `--replicaof "<host> <port>"`. The master address
    /// is also accepted as two separate arguments. Unrecognized flags
    /// are skipped with a warning rather than rejected.
    pub fn from_args<I>(args: I) -> Result<Self>
    where
        I: IntoIterator<Item = String>,
    {
        let mut cfg = Config::default();
        let mut it = args.into_iter();

        while let Some(flag) = it.next() {
            match flag.as_str() {
                "--dir" => {
                    cfg.dir = it.next().context("--dir requires a value")?;
                }
                "--dbfilename" => {
                    cfg.dbfilename = it.next().context("--dbfilename requires a value")?;
                }
                "--port" => {
                    let raw = it.next().context("--port requires a value")?;
                    cfg.port = raw
                        .parse()
                        .with_context(|| format!("invalid port '{raw}'"))?;
                }
                "--replicaof" => {
                    let first = it.next().context("--replicaof requires a master address")?;
                    // Either one quoted "host port" argument or host and
                    // port as two arguments.
                    let (host, port_raw) = match first.split_once(char::is_whitespace) {
                        Some((host, port)) => (host.to_string(), port.trim().to_string()),
                        None => {
                            let port = it.next().context("--replicaof requires a master port")?;
                            (first, port)
                        }
                    };
                    let port = port_raw
                        .parse()
                        .with_context(|| format!("invalid master port '{port_raw}'"))?;
                    cfg.replica_of = Some(ReplicaOf { host, port });
                }
                other => warn!("ignoring unrecognized flag '{other}'"),
            }
        }

        Ok(cfg)
    }

    pub fn dir(&self) -> &str {
        &self.dir
    }

    pub fn dbfilename(&self) -> &str {
        &self.dbfilename
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn is_replica(&self) -> bool {
        self.replica_of.is_some()
    }

    pub fn replica_of(&self) -> Option<&ReplicaOf> {
        self.replica_of.as_ref()
    }

    /// Full path of the snapshot file to load at startup
    pub fn snapshot_path(&self) -> PathBuf {
        PathBuf::from(&self.dir).join(&self.dbfilename)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(v: &[&str]) -> Vec<String> {
        v.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn defaults_without_flags() {
        let cfg = Config::from_args(args(&[])).unwrap();
        assert_eq!(cfg.dir(), ".");
        assert_eq!(cfg.dbfilename(), "dump.rdb");
        assert_eq!(cfg.port(), crate::DEFAULT_PORT);
        assert!(!cfg.is_replica());
    }

    #[test]
    fn replicaof_single_and_split_forms() {
        let quoted = Config::from_args(args(&["--replicaof", "localhost 6380"])).unwrap();
        let split = Config::from_args(args(&["--replicaof", "localhost", "6380"])).unwrap();
        let expected = ReplicaOf { host: "localhost".into(), port: 6380 };
        assert_eq!(quoted.replica_of(), Some(&expected));
        assert_eq!(split.replica_of(), Some(&expected));
    }

    #[test]
    fn bad_port_is_a_startup_error() {
        assert!(Config::from_args(args(&["--port", "not-a-port"])).is_err());
    }
}
