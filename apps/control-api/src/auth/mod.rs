pub mod credentials;
pub mod keys;
pub mod login;
pub mod middleware;
