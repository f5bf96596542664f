pub mod connection;
pub mod decode;

pub use connection::OrderStream;
pub use decode::decode_order;
