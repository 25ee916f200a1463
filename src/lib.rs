//! `http-rpc-transport` is a pluggable async HTTP transport for generated
//! service clients.
//!
//! Callers issue logical requests (an endpoint prefix plus named parameters
//! and/or a raw payload) and receive raw response bytes:
//! - [`Transport`] is the interchangeable capability set
//! - [`HttpTransport`] builds requests, retries per [`RetryPolicy`] and
//!   records the last [`ResponseRecord`]
//! - [`ServiceClient`] turns transport failures into [`ServiceError`]s

mod client;
mod envelope;
mod error;
mod executor;
mod options;
mod params;
mod policy;
mod response;
mod transport;

pub use client::ServiceClient;
pub use envelope::{HttpMethod, RequestEnvelope};
pub use error::{ServiceError, TransportError, ERROR_DOMAIN};
pub use executor::{HttpExecutor, ReqwestExecutor};
pub use options::{TransportOptions, DEFAULT_USER_AGENT};
pub use params::{FormEncoder, ParamsEncoder, RequestParams};
pub use policy::{DefaultRetryPolicy, RetryPolicy};
pub use response::{RawResponse, ResponseRecord};
pub use transport::{CancelHandle, HttpTransport, Transport};

pub type Result<T> = std::result::Result<T, TransportError>;
