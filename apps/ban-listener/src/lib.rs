pub mod backoff;
pub mod config;
pub mod error;
pub mod feed;
pub mod listener;
pub mod live;
pub mod session;

pub use listener::{run, BanListener, Channel, Delivery, Handled, ListenerState};
pub use session::{HttpSession, SessionControl};
