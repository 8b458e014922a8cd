pub mod backend;
pub mod error;
pub mod frames;
pub mod ids;

pub use backend::{ChatBackend, ChatSession};
pub use error::RelayError;
pub use frames::{Frame, ProxyMethod, ProxyRequest};
pub use ids::ClientId;
