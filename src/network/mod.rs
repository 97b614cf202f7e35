// Network module - TCP server speaking the JSON-lines RPC framing

pub mod server;

pub use server::Server;
