pub mod in_memory;
pub mod realtime_ws;
pub mod rest;
pub mod token;

pub use in_memory::{InMemoryBackend, RealtimeMode};
pub use realtime_ws::WebSocketRealtime;
pub use rest::RestBackend;
pub use token::AccessTokenSlot;
