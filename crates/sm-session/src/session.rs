//! Shared registry and in-process transport.
//!
//! A [`Session`] is a cheap handle (`Clone` shares the same state). Devices
//! and monitors each own a mailbox; sending pushes into the recipient's
//! mailbox and wakes any thread blocked in [`Session::receive`].

use std::collections::{BTreeMap, BTreeSet, HashMap, VecDeque};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use sm_config::SessionConfig;
use sm_core::{Clock, MapperError, MapperResult, MonitorId, Timetag};
use tracing::{debug, warn};

use crate::link::{LinkKey, LinkState, LinkTable};
use crate::message::{Message, Notification};

/// Address of a mailbox.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Endpoint {
    Device(String),
    Monitor(MonitorId),
}

impl Endpoint {
    pub fn device(name: impl Into<String>) -> Self {
        Endpoint::Device(name.into())
    }
}

impl std::fmt::Display for Endpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Endpoint::Device(name) => write!(f, "device '{name}'"),
            Endpoint::Monitor(id) => write!(f, "monitor {id}"),
        }
    }
}

#[derive(Default)]
struct SessionState {
    devices: BTreeSet<String>,
    monitors: BTreeSet<MonitorId>,
    next_monitor: u32,
    mailboxes: HashMap<Endpoint, VecDeque<Message>>,
    links: LinkTable,
}

impl SessionState {
    /// Returns false when the recipient has no mailbox.
    fn deliver(&mut self, to: &Endpoint, message: Message) -> bool {
        match self.mailboxes.get_mut(to) {
            Some(mailbox) => {
                mailbox.push_back(message);
                true
            }
            None => {
                warn!(recipient = %to, kind = message.kind(), "dropping message for unknown recipient");
                false
            }
        }
    }

    fn notify_monitors(&mut self, notification: &Notification) {
        let monitors: Vec<MonitorId> = self.monitors.iter().copied().collect();
        for id in monitors {
            self.deliver(&Endpoint::Monitor(id), Message::Notify(notification.clone()));
        }
    }
}

struct Inner {
    state: Mutex<SessionState>,
    arrived: Condvar,
    clock: Box<dyn Clock>,
    config: SessionConfig,
}

/// Registry of devices and monitors plus the transport between them.
#[derive(Clone)]
pub struct Session {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("config", &self.inner.config)
            .finish_non_exhaustive()
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

impl Session {
    pub fn new() -> Self {
        Self::with_config(SessionConfig::default())
    }

    pub fn with_config(config: SessionConfig) -> Self {
        let clock = config.clock.build();
        Self::with_clock(config, clock)
    }

    /// Use a caller-supplied clock instead of the one named in `config`.
    pub fn with_clock(config: SessionConfig, clock: Box<dyn Clock>) -> Self {
        Self {
            inner: Arc::new(Inner {
                state: Mutex::new(SessionState::default()),
                arrived: Condvar::new(),
                clock,
                config,
            }),
        }
    }

    pub fn config(&self) -> &SessionConfig {
        &self.inner.config
    }

    pub fn now(&self) -> Timetag {
        self.inner.clock.now()
    }

    fn lock(&self) -> MutexGuard<'_, SessionState> {
        self.inner
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    // ---------------------------------------------------------------------
    // Registry
    // ---------------------------------------------------------------------

    /// Reserve `name` and queue the self-addressed `Announce` that makes the
    /// device ready on its first poll.
    pub fn register_device(&self, name: &str) -> MapperResult<()> {
        let mut state = self.lock();
        if !state.devices.insert(name.to_string()) {
            return Err(MapperError::NameConflict {
                name: name.to_string(),
            });
        }
        state
            .mailboxes
            .insert(Endpoint::device(name), VecDeque::from([Message::Announce]));
        drop(state);
        debug!(device = name, "registered device");
        self.inner.arrived.notify_all();
        Ok(())
    }

    /// Release `name`, drop its links and tell peers and monitors.
    pub fn unregister_device(&self, name: &str) {
        let mut state = self.lock();
        if !state.devices.remove(name) {
            return;
        }
        state.mailboxes.remove(&Endpoint::device(name));

        let removed = state.links.remove_device(name);
        let mut peers = BTreeSet::new();
        for key in &removed {
            let peer = if key.src == name { &key.dst } else { &key.src };
            peers.insert(peer.clone());
        }
        for peer in peers {
            state.deliver(
                &Endpoint::device(peer),
                Message::PeerRemoved {
                    device: name.to_string(),
                },
            );
        }
        for key in removed {
            state.notify_monitors(&Notification::LinkRemoved {
                src: key.src,
                dst: key.dst,
            });
        }
        state.notify_monitors(&Notification::DeviceRemoved {
            name: name.to_string(),
        });
        drop(state);
        debug!(device = name, "unregistered device");
        self.inner.arrived.notify_all();
    }

    pub fn is_registered(&self, name: &str) -> bool {
        self.lock().devices.contains(name)
    }

    pub fn device_names(&self) -> Vec<String> {
        self.lock().devices.iter().cloned().collect()
    }

    pub fn register_monitor(&self) -> MonitorId {
        let mut state = self.lock();
        let id = MonitorId::from_index(state.next_monitor);
        state.next_monitor = state.next_monitor.saturating_add(1);
        state.monitors.insert(id);
        state.mailboxes.insert(Endpoint::Monitor(id), VecDeque::new());
        debug!(monitor = %id, "registered monitor");
        id
    }

    pub fn unregister_monitor(&self, id: MonitorId) {
        let mut state = self.lock();
        state.monitors.remove(&id);
        state.mailboxes.remove(&Endpoint::Monitor(id));
    }

    // ---------------------------------------------------------------------
    // Transport
    // ---------------------------------------------------------------------

    /// Deliver one message. Returns false if the recipient is unknown.
    pub fn send(&self, to: &Endpoint, message: Message) -> bool {
        let delivered = self.lock().deliver(to, message);
        if delivered {
            self.inner.arrived.notify_all();
        }
        delivered
    }

    /// Deliver several messages under one lock so no receiver observes a
    /// partial batch. Returns how many were delivered.
    pub fn send_all(&self, messages: Vec<(Endpoint, Message)>) -> usize {
        let mut state = self.lock();
        let mut delivered = 0;
        for (to, message) in messages {
            if state.deliver(&to, message) {
                delivered += 1;
            }
        }
        drop(state);
        if delivered > 0 {
            self.inner.arrived.notify_all();
        }
        delivered
    }

    pub fn notify_monitors(&self, notification: Notification) {
        self.lock().notify_monitors(&notification);
        self.inner.arrived.notify_all();
    }

    /// Take every pending message for `endpoint`. With a timeout, block up
    /// to that long for the first message to arrive.
    pub fn receive(&self, endpoint: &Endpoint, timeout: Option<Duration>) -> Vec<Message> {
        let mut state = self.lock();
        if let Some(timeout) = timeout.filter(|t| !t.is_zero()) {
            let (guard, _) = self
                .inner
                .arrived
                .wait_timeout_while(state, timeout, |s| {
                    s.mailboxes.get(endpoint).is_some_and(VecDeque::is_empty)
                })
                .unwrap_or_else(PoisonError::into_inner);
            state = guard;
        }
        state
            .mailboxes
            .get_mut(endpoint)
            .map(|mailbox| mailbox.drain(..).collect())
            .unwrap_or_default()
    }

    pub fn pending(&self, endpoint: &Endpoint) -> usize {
        self.lock().mailboxes.get(endpoint).map_or(0, VecDeque::len)
    }

    // ---------------------------------------------------------------------
    // Link table
    // ---------------------------------------------------------------------

    /// Record a link request from `src` to `dst` and forward it to `src`.
    ///
    /// Returns `Ok(false)` without sending anything if the link is already
    /// requested or established.
    pub fn request_link(&self, src: &str, dst: &str) -> MapperResult<bool> {
        let mut state = self.lock();
        for name in [src, dst] {
            if !state.devices.contains(name) {
                return Err(MapperError::UnknownDevice {
                    name: name.to_string(),
                });
            }
        }
        let key = LinkKey::new(src, dst);
        if matches!(
            state.links.state(&key),
            Some(LinkState::Requested | LinkState::Established)
        ) {
            debug!(src, dst, "link already present");
            return Ok(false);
        }
        state.links.set(key, LinkState::Requested);
        state.deliver(
            &Endpoint::device(src),
            Message::LinkRequest {
                src: src.to_string(),
                dst: dst.to_string(),
            },
        );
        drop(state);
        self.inner.arrived.notify_all();
        Ok(true)
    }

    pub fn link_state(&self, src: &str, dst: &str) -> Option<LinkState> {
        self.lock().links.state(&LinkKey::new(src, dst))
    }

    /// Record a link transition and report it to monitors.
    pub fn set_link_state(&self, src: &str, dst: &str, link_state: LinkState) {
        let mut state = self.lock();
        let key = LinkKey::new(src, dst);
        let notification = match link_state {
            LinkState::Established => Some(Notification::LinkEstablished {
                src: src.to_string(),
                dst: dst.to_string(),
            }),
            LinkState::Removed => {
                state.links.remove(&key);
                Some(Notification::LinkRemoved {
                    src: src.to_string(),
                    dst: dst.to_string(),
                })
            }
            LinkState::Requested => None,
        };
        if link_state != LinkState::Removed {
            state.links.set(key, link_state);
        }
        if let Some(notification) = notification {
            state.notify_monitors(&notification);
        }
        drop(state);
        self.inner.arrived.notify_all();
    }

    pub fn links(&self) -> BTreeMap<LinkKey, LinkState> {
        self.lock().links.snapshot()
    }
}
