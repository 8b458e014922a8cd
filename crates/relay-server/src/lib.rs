pub mod dispatch;
pub mod gateway;
pub mod keepalive;
pub mod proxy;
pub mod registry;
pub mod sessions;

pub use dispatch::Dispatcher;
pub use gateway::{build_router, start, Gateway, GatewayConfig, GatewayHandle};
pub use proxy::RequestProxy;
pub use registry::{ConnectionRegistry, FrameSender};
pub use sessions::SessionStore;
