// JSON-RPC server: method dispatch over a Unix socket.

pub mod methods;
pub mod context;
pub mod unix;
