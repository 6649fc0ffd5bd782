mod code_receiver;
mod env;
mod transport;

#[rustfmt::skip]
pub use self::{
    code_receiver::{AuthorizationCallback, AuthorizationCodeReceiver},
    env::EnvLookup,
    transport::{HttpRequest, HttpResponse, HttpTransport, Method, RequestBody},
};

#[cfg(any(test, feature = "mock"))]
pub use self::transport::MockHttpTransport;
