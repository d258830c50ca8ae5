/*!
 * Command Dispatch
 *
 * Maps one decoded request to one encoded response. The dispatcher only
 * reads configuration and goes through the keyspace for data access; it
 * owns no I/O, which keeps every command a pure request-to-bytes mapping
 * the tests can drive directly.
 *
 * Dispatch is by the first request element, uppercased before lookup so
 * matching is case-insensitive. Errors mirror the reference database's
 * conventions: an `ERR` category word followed by a human-readable
 * message.
 */

use crate::config::Config;
use crate::protocol::{resp_array, resp_bulk, resp_error, resp_null, resp_simple};
use crate::storage::Keyspace;
use log::debug;
use std::sync::Arc;

/// Fixed process-lifetime replication identifier, reported verbatim by
/// INFO and PSYNC. Offset advancement is not implemented; the offset is
/// always zero.
pub const REPLICATION_ID: &str = "3d8c6fa24e17b5a9c0f1d2e84b6a97c35f08d1ab";
pub const REPLICATION_OFFSET: u64 = 0;

pub struct CommandHandler {
    config: Arc<Config>,
    store: Arc<Keyspace>,
}

impl CommandHandler {
    pub fn new(config: Arc<Config>, store: Arc<Keyspace>) -> Self {
        Self { config, store }
    }

    /// Execute one request and return the encoded response frame
    pub fn handle(&self, request: &[String]) -> Vec<u8> {
        let Some(name) = request.first() else {
            return resp_error("ERR empty command");
        };
        let args = &request[1..];
        debug!("dispatching {} with {} args", name, args.len());

        match name.to_ascii_uppercase().as_str() {
            "PING" => resp_simple("PONG"),
            "ECHO" => self.echo(args),
            "SET" => self.set(args),
            "GET" => self.get(args),
            "CONFIG" => self.config_get(args),
            "KEYS" => self.keys(args),
            "INFO" => self.info(args),
            // Arguments are accepted and ignored at this stage of
            // replication support.
            "REPLCONF" => resp_simple("OK"),
            "PSYNC" => self.psync(args),
            _ => resp_error(&format!("ERR unknown command '{name}'")),
        }
    }

    fn echo(&self, args: &[String]) -> Vec<u8> {
        match args.first() {
            Some(message) => resp_bulk(message),
            None => resp_error("ERR wrong number of arguments for 'echo' command"),
        }
    }

    fn set(&self, args: &[String]) -> Vec<u8> {
        if args.len() < 2 {
            return resp_error("ERR wrong number of arguments for 'set' command");
        }
        let key = args[0].clone();
        let value = args[1].clone();

        if args.len() >= 4 && args[2].eq_ignore_ascii_case("PX") {
            let Ok(ttl_ms) = args[3].parse::<i64>() else {
                return resp_error("ERR invalid expire time in 'set' command");
            };
            self.store.set_with_expiry(key, value, ttl_ms);
            return resp_simple("OK");
        }

        // Any option other than PX falls through to a plain SET.
        self.store.set(key, value);
        resp_simple("OK")
    }

    fn get(&self, args: &[String]) -> Vec<u8> {
        match args.first() {
            Some(key) => match self.store.get(key) {
                Some(value) => resp_bulk(&value),
                None => resp_null(),
            },
            None => resp_error("ERR wrong number of arguments for 'get' command"),
        }
    }

    fn config_get(&self, args: &[String]) -> Vec<u8> {
        if args.len() < 2 {
            return resp_error("ERR wrong number of arguments for 'config' command");
        }
        if !args[0].eq_ignore_ascii_case("GET") {
            return resp_error("ERR Unknown CONFIG subcommand");
        }

        let param = args[1].to_ascii_lowercase();
        let value = match param.as_str() {
            "dir" => self.config.dir().to_string(),
            "dbfilename" => self.config.dbfilename().to_string(),
            _ => return resp_array(&[]),
        };
        resp_array(&[param, value])
    }

    fn keys(&self, args: &[String]) -> Vec<u8> {
        match args.first().map(String::as_str) {
            None => resp_error("ERR wrong number of arguments for 'keys' command"),
            Some("*") => resp_array(&self.store.all_keys()),
            Some(_) => resp_error("ERR pattern not supported"),
        }
    }

    fn info(&self, args: &[String]) -> Vec<u8> {
        if let Some(section) = args.first() {
            if section.eq_ignore_ascii_case("replication") {
                let role = if self.config.is_replica() { "slave" } else { "master" };
                let mut report = format!("role:{role}\r\n");
                if !self.config.is_replica() {
                    report.push_str(&format!("master_replid:{REPLICATION_ID}\r\n"));
                    report.push_str(&format!("master_repl_offset:{REPLICATION_OFFSET}"));
                }
                return resp_bulk(&report);
            }
        }
        resp_error("ERR wrong section for 'info' command")
    }

    fn psync(&self, args: &[String]) -> Vec<u8> {
        if args.len() != 2 {
            return resp_error("ERR wrong number of arguments for 'psync' command");
        }
        // Full-resync acknowledgment only; no snapshot payload follows it.
        resp_simple(&format!("FULLRESYNC {REPLICATION_ID} {REPLICATION_OFFSET}"))
    }
}
