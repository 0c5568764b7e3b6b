// thermosync-api: async HTTP client for device state endpoints

pub mod client;
pub mod error;
pub mod transport;

pub use client::{Credentials, HttpDeviceClient};
pub use error::Error;
pub use transport::{TlsMode, TransportConfig};
