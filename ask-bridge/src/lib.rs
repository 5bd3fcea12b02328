pub mod client;
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod handlers;
pub mod hub;
pub mod registry;
pub mod resolution;
pub mod routes;
pub mod selection;
pub mod surface;
pub mod transport;
pub mod websocket;
