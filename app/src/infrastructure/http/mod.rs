pub mod middleware;
mod transport;

pub use self::transport::{ReqwestTransport, TransportOptions, UIT_AUTH_HEADER};
