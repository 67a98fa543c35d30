#![forbid(unsafe_code)]

mod connector;
mod endpoints;
mod error;
mod estimate;
mod files;
mod multipart;
mod transport;

pub use endpoints::Endpoints;
pub use error::{Error, Result};
pub use estimate::{estimate_http1_request_bytes, estimate_http1_response_head_bytes};
pub use files::FileStore;
pub use transport::{DEFAULT_CONNECT_TIMEOUT, HttpSession, HttpTransport, HttpTransportConfig};
