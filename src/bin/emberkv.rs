/*!
 * emberkv Server Entry Point
 *
 * Initializes logging, parses the command-line configuration, builds the
 * keyspace, and hands control to the server: snapshot load, optional
 * replica handshake, then the event loop. Runs until externally
 * terminated.
 */

use anyhow::Result;
use emberkv::{Config, Keyspace, Server};
use std::sync::Arc;

#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

fn main() -> Result<()> {
    // Respects RUST_LOG, e.g. RUST_LOG=debug cargo run --release
    env_logger::init();

    let config = Arc::new(Config::from_args(std::env::args().skip(1))?);
    let store = Arc::new(Keyspace::new());

    let mut server = Server::bind(config, store)?;
    server.run()
}
