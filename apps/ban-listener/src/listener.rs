//! Deduplicating ban handler shared by the live and feed subscriptions.
//!
//! Both channels report the same persisted ban, so every notice is reduced
//! to its `(timestamp, reason)` identity before anything happens. The first
//! unique identity moves the listener from `Listening` to `Handling`; the
//! session is invalidated, the banned view is shown and the listener ends in
//! `Terminal`. Anything arriving later is recorded and otherwise ignored.

use std::collections::HashSet;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::watch;
use warden_common::{BanEventId, BanNotice};

use crate::config::Config;
use crate::session::SessionControl;

/// Which subscription delivered a notice.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Channel {
    Live,
    Feed,
}

impl Channel {
    pub fn as_str(self) -> &'static str {
        match self {
            Channel::Live => "live",
            Channel::Feed => "feed",
        }
    }
}

/// The notice that drove the listener out of `Listening`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    pub notice: BanNotice,
    pub channel: Channel,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ListenerState {
    Listening,
    Handling(Delivery),
    Terminal(Delivery),
}

/// Result of feeding one notice to the listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Handled {
    /// Same identity seen before.
    Duplicate,
    /// New identity, but a ban is already being handled.
    Recorded,
    /// This notice triggered sign-out and redirect.
    Terminated,
}

pub struct BanListener {
    processed: Mutex<HashSet<BanEventId>>,
    state: watch::Sender<ListenerState>,
    session: Arc<dyn SessionControl>,
}

impl BanListener {
    pub fn new(session: Arc<dyn SessionControl>) -> Self {
        let (state, _) = watch::channel(ListenerState::Listening);
        Self {
            processed: Mutex::new(HashSet::new()),
            state,
            session,
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<ListenerState> {
        self.state.subscribe()
    }

    pub fn state(&self) -> ListenerState {
        self.state.borrow().clone()
    }

    pub async fn handle(&self, notice: BanNotice, channel: Channel) -> Handled {
        let event_id = notice.event_id();
        if !self.processed.lock().insert(event_id.clone()) {
            tracing::debug!(%event_id, channel = channel.as_str(), "duplicate ban event");
            return Handled::Duplicate;
        }

        let delivery = Delivery { notice, channel };
        let claimed = self.state.send_if_modified(|state| {
            if *state == ListenerState::Listening {
                *state = ListenerState::Handling(delivery.clone());
                true
            } else {
                false
            }
        });
        if !claimed {
            tracing::info!(%event_id, channel = channel.as_str(), "ban event recorded after handling began");
            return Handled::Recorded;
        }

        tracing::info!(
            %event_id,
            channel = channel.as_str(),
            reason = %delivery.notice.reason,
            banned_by = %delivery.notice.banned_by,
            "ban received, signing out"
        );

        if let Err(e) = self.session.invalidate().await {
            tracing::warn!(error = %e, code = e.code(), "session invalidation failed, redirecting anyway");
        }
        self.session.show_banned(&delivery.notice);
        self.state.send_replace(ListenerState::Terminal(delivery));

        Handled::Terminated
    }

    /// Resolves once the listener is `Terminal`.
    pub async fn wait_terminal(&self) -> Option<Delivery> {
        let mut rx = self.state.subscribe();
        let state = rx
            .wait_for(|s| matches!(s, ListenerState::Terminal(_)))
            .await
            .ok()?;
        match &*state {
            ListenerState::Terminal(delivery) => Some(delivery.clone()),
            _ => None,
        }
    }
}

/// Run both subscriptions until a ban is handled, then stop them.
pub async fn run(config: Config, session: Arc<dyn SessionControl>) -> Option<Delivery> {
    let listener = Arc::new(BanListener::new(session));

    let live = tokio::spawn(crate::live::run(config.clone(), listener.clone()));
    let feed = tokio::spawn(crate::feed::run(config, listener.clone()));

    let delivery = listener.wait_terminal().await;
    live.abort();
    feed.abort();
    delivery
}
