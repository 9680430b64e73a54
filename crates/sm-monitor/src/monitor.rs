//! Monitor: asks devices to link and connect, and watches what happens.
//!
//! Every request is asynchronous. The monitor only checks what it can check
//! synchronously (registration, link state) and then sends the request to the
//! source device; progress is observed through device counters or through
//! this monitor's database after [`Monitor::poll`].

use std::time::Duration;

use sm_core::{ConnectOptions, ConnectionProps, MapperError, MapperResult, MonitorId, SignalPath};
use sm_session::{DeviceInfo, Endpoint, LinkState, Message, Session};
use tracing::{debug, warn};

use crate::database::Database;

pub struct Monitor {
    session: Session,
    id: MonitorId,
    db: Database,
}

impl std::fmt::Debug for Monitor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Monitor")
            .field("id", &self.id)
            .field("db", &self.db)
            .finish_non_exhaustive()
    }
}

impl Drop for Monitor {
    fn drop(&mut self) {
        self.session.unregister_monitor(self.id);
    }
}

impl Monitor {
    /// Register a monitor. Devices and links that already exist are seeded
    /// into the database; everything later arrives as notifications.
    pub fn new(session: &Session) -> Self {
        let id = session.register_monitor();
        let mut db = Database::new();
        for name in session.device_names() {
            db.seed_device(&name);
        }
        for (key, state) in session.links() {
            if state == LinkState::Established {
                db.seed_link(&key.src, &key.dst);
            }
        }
        Self {
            session: session.clone(),
            id,
            db,
        }
    }

    pub fn id(&self) -> MonitorId {
        self.id
    }

    fn require_device(&self, name: &str) -> MapperResult<()> {
        if self.session.is_registered(name) {
            Ok(())
        } else {
            Err(MapperError::UnknownDevice {
                name: name.to_string(),
            })
        }
    }

    fn require_link(&self, src: &str, dst: &str) -> MapperResult<()> {
        self.require_device(src)?;
        self.require_device(dst)?;
        match self.session.link_state(src, dst) {
            Some(LinkState::Established) => Ok(()),
            _ => Err(MapperError::NoLinkEstablished {
                src: src.to_string(),
                dst: dst.to_string(),
            }),
        }
    }

    fn send_to(&self, device: &str, message: Message) {
        debug!(monitor = %self.id, device, kind = message.kind(), "sending request");
        if !self.session.send(&Endpoint::device(device), message) {
            warn!(monitor = %self.id, device, "request not delivered");
        }
    }

    /// Ask `src` to link to `dst`. Asking again while the link is requested
    /// or established does nothing.
    pub fn link(&mut self, src: &str, dst: &str) -> MapperResult<()> {
        self.session.request_link(src, dst)?;
        Ok(())
    }

    pub fn unlink(&mut self, src: &str, dst: &str) -> MapperResult<()> {
        self.require_device(src)?;
        self.require_device(dst)?;
        if self.session.link_state(src, dst).is_none() {
            return Err(MapperError::NoLinkEstablished {
                src: src.to_string(),
                dst: dst.to_string(),
            });
        }
        self.send_to(
            src,
            Message::UnlinkRequest {
                src: src.to_string(),
                dst: dst.to_string(),
            },
        );
        Ok(())
    }

    /// Ask the source device to connect `src` to `dst`. The devices must
    /// already be linked.
    pub fn connect(
        &mut self,
        src: &SignalPath,
        dst: &SignalPath,
        options: ConnectOptions,
    ) -> MapperResult<()> {
        self.require_link(&src.device, &dst.device)?;
        self.send_to(
            &src.device,
            Message::ConnectRequest {
                src: src.clone(),
                dst: dst.clone(),
                options,
            },
        );
        Ok(())
    }

    /// Change the properties of an existing connection. Only the fields set
    /// in `options` change.
    pub fn modify(
        &mut self,
        src: &SignalPath,
        dst: &SignalPath,
        options: ConnectOptions,
    ) -> MapperResult<()> {
        self.require_link(&src.device, &dst.device)?;
        self.send_to(
            &src.device,
            Message::ModifyRequest {
                src: src.clone(),
                dst: dst.clone(),
                options,
            },
        );
        Ok(())
    }

    pub fn disconnect(&mut self, src: &SignalPath, dst: &SignalPath) -> MapperResult<()> {
        self.require_link(&src.device, &dst.device)?;
        self.send_to(
            &src.device,
            Message::DisconnectRequest {
                src: src.clone(),
                dst: dst.clone(),
            },
        );
        Ok(())
    }

    /// Fold pending notifications into the database, waiting up to
    /// `timeout_ms` for the first one. Returns how many were handled.
    pub fn poll(&mut self, timeout_ms: u64) -> usize {
        let timeout = (timeout_ms > 0).then(|| Duration::from_millis(timeout_ms));
        let messages = self.session.receive(&Endpoint::Monitor(self.id), timeout);
        let count = messages.len();
        for message in messages {
            match message {
                Message::Notify(notification) => self.db.apply(notification),
                other => warn!(monitor = %self.id, kind = other.kind(), "unexpected message"),
            }
        }
        count
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    pub fn devices(&self) -> impl Iterator<Item = &DeviceInfo> {
        self.db.devices()
    }

    pub fn links(&self) -> impl Iterator<Item = (&str, &str)> {
        self.db.links()
    }

    pub fn connections(&self) -> impl Iterator<Item = &ConnectionProps> {
        self.db.connections()
    }

    pub fn connection(&self, src: &SignalPath, dst: &SignalPath) -> Option<&ConnectionProps> {
        self.db.connection(src, dst)
    }
}
