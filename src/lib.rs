// Core modules for the emberkv key-value server
pub mod protocol; // RESP encoders + request/reply decoding
pub mod storage; // Keyspace + Entry (in-memory store with expiry)
pub mod snapshot; // RDB snapshot loader
pub mod config; // command-line configuration
pub mod command; // CommandHandler (request dispatch)
pub mod replica; // replica -> master handshake
pub mod net; // listener setup + poller + serve loop

// Re-export all public items from modules for easier access
pub use command::*;
pub use config::*;
pub use net::*;
pub use protocol::*;
pub use replica::*;
pub use snapshot::*;
pub use storage::*;

// Default listening port - matches the reference database
pub const DEFAULT_PORT: u16 = 6379;
