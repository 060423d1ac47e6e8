mod settings;

pub use settings::{ServerConfig, Settings, WebSocketConfig};
