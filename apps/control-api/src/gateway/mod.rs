pub mod dispatcher;
pub mod error;
pub mod history;
pub mod registry;
pub mod rooms;
pub mod server;
