pub mod delegate;
pub mod notifier;
