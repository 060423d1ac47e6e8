// Infrastructure layer (shared components)
pub mod config;

// Domain layer (registry and fan-out)
pub mod dispatcher;
pub mod registry;

// Application layer
pub mod server;
pub mod websocket;
