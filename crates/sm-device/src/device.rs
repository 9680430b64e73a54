//! Devices: named owners of signals that talk to peers through a session.
//!
//! All network activity happens inside [`Device::poll`]: readiness, link and
//! connection negotiation, and delivery of incoming bundles to handlers.
//! Updating an output signal sends immediately unless a queue is open.

use std::collections::{BTreeMap, BTreeSet};
use std::time::Duration;

use sm_config::{RetryDef, SessionConfig};
use sm_core::{
    ConnectOptions, ConnectionProps, Direction, MapperError, MapperResult, MonotonicStamp, SignalPath, SignalValue,
    Timetag,
};
use sm_session::{Bundle, DeviceInfo, Endpoint, Message, Notification, Session};
use tracing::{debug, info, warn};

use crate::connection::{DestinationInfo, OutboundConnection, SourceInfo};
use crate::handler::UpdateHandler;
use crate::queue::{self, Queue};
use crate::router::Router;
use crate::signal::{Signal, SignalHandle, SignalProps, SignalSpec};

/// Bounded polling loop settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_rounds: u32,
    pub poll_timeout_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryDef::default().into()
    }
}

impl From<RetryDef> for RetryPolicy {
    fn from(def: RetryDef) -> Self {
        Self {
            max_rounds: def.max_rounds,
            poll_timeout_ms: def.poll_timeout_ms,
        }
    }
}

impl RetryPolicy {
    pub fn from_config(config: &SessionConfig) -> Self {
        config.retry.into()
    }
}

/// Poll every device in turn until `done` holds or the rounds run out.
/// Returns whether `done` was satisfied.
pub fn poll_until(
    devices: &mut [&mut Device],
    retry: RetryPolicy,
    mut done: impl FnMut(&[&mut Device]) -> bool,
) -> bool {
    for _ in 0..retry.max_rounds {
        if done(devices) {
            return true;
        }
        let mut handled = 0;
        for device in devices.iter_mut() {
            handled += device.poll(0);
        }
        if handled == 0 {
            if let Some(first) = devices.first_mut() {
                first.poll(retry.poll_timeout_ms);
            }
        }
    }
    done(devices)
}

pub struct Device {
    session: Session,
    name: String,
    endpoint: Endpoint,
    ready: bool,
    signals: Vec<Signal>,
    next_handle: u32,
    routers: BTreeMap<String, Router>,
    inbound_links: BTreeSet<String>,
    inbound_connections: BTreeSet<(SignalPath, SignalPath)>,
    queue: Option<Queue>,
    stamp: MonotonicStamp,
}

impl std::fmt::Debug for Device {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Device")
            .field("name", &self.name)
            .field("ready", &self.ready)
            .field("signals", &self.signals)
            .field("links_out", &self.num_links_out())
            .field("links_in", &self.inbound_links.len())
            .finish_non_exhaustive()
    }
}

impl Drop for Device {
    fn drop(&mut self) {
        self.session.unregister_device(&self.name);
    }
}

impl Device {
    /// Register a new device under `name`. Fails with `NameConflict` if the
    /// session already has a device by that name.
    pub fn new(session: &Session, name: &str) -> MapperResult<Self> {
        session.register_device(name)?;
        info!(device = name, "created device");
        Ok(Self {
            session: session.clone(),
            name: name.to_string(),
            endpoint: Endpoint::device(name),
            ready: false,
            signals: Vec::new(),
            next_handle: 0,
            routers: BTreeMap::new(),
            inbound_links: BTreeSet::new(),
            inbound_connections: BTreeSet::new(),
            queue: None,
            stamp: MonotonicStamp::default(),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn ready(&self) -> bool {
        self.ready
    }

    /// Current session time, never earlier than a previous reading.
    pub fn now(&mut self) -> Timetag {
        self.stamp.observe(self.session.now())
    }

    // ---------------------------------------------------------------------
    // Signals
    // ---------------------------------------------------------------------

    pub fn add_output(&mut self, spec: SignalSpec) -> MapperResult<SignalHandle> {
        self.add_signal(spec, Direction::Output, None)
    }

    pub fn add_input(&mut self, spec: SignalSpec) -> MapperResult<SignalHandle> {
        self.add_signal(spec, Direction::Input, None)
    }

    pub fn add_input_with_handler(
        &mut self,
        spec: SignalSpec,
        handler: impl UpdateHandler + 'static,
    ) -> MapperResult<SignalHandle> {
        self.add_signal(spec, Direction::Input, Some(Box::new(handler)))
    }

    fn add_signal(
        &mut self,
        spec: SignalSpec,
        direction: Direction,
        handler: Option<Box<dyn UpdateHandler>>,
    ) -> MapperResult<SignalHandle> {
        spec.validate()?;
        if self.signals.iter().any(|s| s.name() == spec.name) {
            return Err(MapperError::InvalidSignalSpec {
                name: spec.name,
                what: "name already used on this device".to_string(),
            });
        }
        let handle = SignalHandle(self.next_handle);
        self.next_handle += 1;
        debug!(device = %self.name, signal = %spec.name, ?direction, "added signal");
        self.signals
            .push(Signal::new(handle, SignalProps::from_spec(spec, direction), handler));
        Ok(handle)
    }

    /// Remove a signal along with the outbound connections it feeds.
    pub fn remove_signal(&mut self, handle: SignalHandle) -> MapperResult<()> {
        let index = self.index_of(handle)?;
        let signal = self.signals.remove(index);
        let name = signal.name().to_string();

        let mut messages = Vec::new();
        for router in self.routers.values_mut() {
            for connection in router.remove_source(&name) {
                let props = connection.props();
                messages.push((
                    Endpoint::device(props.dst.device.clone()),
                    Message::Disconnect {
                        src: props.src.clone(),
                        dst: props.dst.clone(),
                    },
                ));
                self.session.notify_monitors(Notification::Disconnected {
                    src: props.src.clone(),
                    dst: props.dst.clone(),
                });
            }
        }
        self.session.send_all(messages);
        self.inbound_connections.retain(|(_, dst)| dst.signal != name);
        debug!(device = %self.name, signal = %name, "removed signal");
        Ok(())
    }

    fn index_of(&self, handle: SignalHandle) -> MapperResult<usize> {
        self.signals
            .iter()
            .position(|s| s.handle() == handle)
            .ok_or_else(|| MapperError::UnknownSignal {
                path: format!("/{}#{}", self.name, handle.0),
            })
    }

    pub fn signal(&self, handle: SignalHandle) -> MapperResult<&Signal> {
        let index = self.index_of(handle)?;
        Ok(&self.signals[index])
    }

    pub fn signal_mut(&mut self, handle: SignalHandle) -> MapperResult<SignalMut<'_>> {
        let index = self.index_of(handle)?;
        Ok(SignalMut {
            device: self,
            index,
        })
    }

    pub fn find_signal(&self, name: &str) -> Option<SignalHandle> {
        let name = sm_core::normalize_signal_name(name);
        self.signals
            .iter()
            .find(|s| s.name() == name)
            .map(Signal::handle)
    }

    pub fn signals(&self) -> impl Iterator<Item = &Signal> {
        self.signals.iter()
    }

    pub fn outputs(&self) -> impl Iterator<Item = &Signal> {
        self.signals.iter().filter(|s| s.is_output())
    }

    pub fn inputs(&self) -> impl Iterator<Item = &Signal> {
        self.signals.iter().filter(|s| !s.is_output())
    }

    pub fn path(&self, handle: SignalHandle) -> MapperResult<SignalPath> {
        Ok(SignalPath::new(self.name.clone(), self.signal(handle)?.name()))
    }

    fn update_at(&mut self, index: usize, value: SignalValue) -> MapperResult<()> {
        let policy = self.session.config().out_of_bounds;
        let value = self.signals[index].check_value(&value, policy)?;
        let timetag = match self.queue_open() {
            Some(timetag) => timetag,
            None => self.now(),
        };
        let signal = &mut self.signals[index];
        signal.store(value.clone(), timetag);
        let name = signal.name().to_string();

        match self.queue.as_mut() {
            Some(queue) => queue.push(name, value),
            None => self.dispatch(vec![(name, value)], timetag),
        }
        Ok(())
    }

    // ---------------------------------------------------------------------
    // Queues
    // ---------------------------------------------------------------------

    /// Open a batch at `timetag`; updates are held until `send_queue`.
    pub fn start_queue(&mut self, timetag: Timetag) -> MapperResult<()> {
        queue::start(&mut self.queue, timetag)
    }

    /// Send everything queued since `start_queue(timetag)`, one bundle per
    /// destination device, all stamped `timetag`.
    pub fn send_queue(&mut self, timetag: Timetag) -> MapperResult<()> {
        let queue = queue::finish(&mut self.queue, timetag)?;
        debug!(device = %self.name, %timetag, updates = queue.len(), "sending queue");
        self.dispatch(queue.into_updates(), timetag);
        Ok(())
    }

    pub fn queue_open(&self) -> Option<Timetag> {
        self.queue.as_ref().map(Queue::timetag)
    }

    fn dispatch(&mut self, updates: Vec<(String, SignalValue)>, timetag: Timetag) {
        let mut messages = Vec::new();
        for router in self.routers.values_mut().filter(|r| r.is_established()) {
            let mut routed = Vec::new();
            for (signal, value) in &updates {
                routed.extend(router.route(signal, value));
            }
            if routed.is_empty() {
                continue;
            }
            messages.push((
                Endpoint::device(router.peer()),
                Message::Bundle(Bundle {
                    from: self.name.clone(),
                    timetag,
                    updates: routed,
                }),
            ));
        }
        if !messages.is_empty() {
            self.session.send_all(messages);
        }
    }

    // ---------------------------------------------------------------------
    // Counters
    // ---------------------------------------------------------------------

    pub fn num_links_out(&self) -> usize {
        self.routers.values().filter(|r| r.is_established()).count()
    }

    pub fn num_links_in(&self) -> usize {
        self.inbound_links.len()
    }

    pub fn num_connections_out(&self) -> usize {
        self.routers
            .values()
            .flat_map(Router::connections)
            .filter(|c| c.is_established())
            .count()
    }

    pub fn num_connections_in(&self) -> usize {
        self.inbound_connections.len()
    }

    /// Negotiated properties of an outbound connection.
    pub fn connection(&self, src: &SignalPath, dst: &SignalPath) -> Option<&ConnectionProps> {
        self.routers
            .get(&dst.device)
            .and_then(|r| r.connection(src, dst))
            .map(OutboundConnection::props)
    }

    pub fn info(&self) -> DeviceInfo {
        DeviceInfo {
            name: self.name.clone(),
            outputs: self.outputs().map(|s| s.name().to_string()).collect(),
            inputs: self.inputs().map(|s| s.name().to_string()).collect(),
        }
    }

    // ---------------------------------------------------------------------
    // Polling
    // ---------------------------------------------------------------------

    /// Handle pending messages, waiting up to `timeout_ms` for the first one.
    /// Returns how many messages were handled.
    pub fn poll(&mut self, timeout_ms: u64) -> usize {
        let timeout = (timeout_ms > 0).then(|| Duration::from_millis(timeout_ms));
        let messages = self.session.receive(&self.endpoint, timeout);
        let count = messages.len();
        for message in messages {
            self.handle(message);
        }
        count
    }

    fn send(&self, device: &str, message: Message) {
        self.session.send(&Endpoint::device(device), message);
    }

    fn handle(&mut self, message: Message) {
        match message {
            Message::Announce => {
                self.ready = true;
                info!(device = %self.name, "device ready");
                self.session
                    .notify_monitors(Notification::DeviceReady(self.info()));
            }
            Message::LinkRequest { src, dst } => self.on_link_request(src, dst),
            Message::Link { src, dst } => {
                debug!(device = %self.name, %src, "accepting link");
                self.inbound_links.insert(src.clone());
                let reply = Message::LinkAck {
                    src: src.clone(),
                    dst,
                };
                self.send(&src, reply);
            }
            Message::LinkAck { src, dst } => match self.routers.get_mut(&dst) {
                Some(router) => {
                    router.establish();
                    info!(%src, %dst, "link established");
                    self.session
                        .set_link_state(&src, &dst, sm_session::LinkState::Established);
                }
                None => warn!(device = %self.name, %dst, "link ack for unknown router"),
            },
            Message::UnlinkRequest { src, dst } => self.on_unlink_request(src, dst),
            Message::Unlink { src, .. } => {
                debug!(device = %self.name, %src, "dropping inbound link");
                self.drop_inbound_from(&src);
            }
            Message::ConnectRequest { src, dst, options } => {
                self.on_connect_request(src, dst, &options)
            }
            Message::Connect { src, dst, .. } => self.on_connect(src, dst),
            Message::ConnectAck {
                src,
                dst,
                dst_type,
                dst_length,
                dst_min,
                dst_max,
            } => self.on_connect_ack(
                src,
                dst,
                DestinationInfo {
                    ty: dst_type,
                    length: dst_length,
                    min: dst_min,
                    max: dst_max,
                },
            ),
            Message::ConnectNack { src, dst, reason } => {
                warn!(%src, %dst, %reason, "connection refused");
                if let Some(router) = self.routers.get_mut(&dst.device) {
                    router.remove(&src, &dst);
                }
            }
            Message::ModifyRequest { src, dst, options } => self.on_modify(src, dst, &options),
            Message::DisconnectRequest { src, dst } => self.on_disconnect_request(src, dst),
            Message::Disconnect { src, dst } => {
                debug!(%src, %dst, "inbound connection removed");
                self.inbound_connections.remove(&(src, dst));
            }
            Message::PeerRemoved { device } => self.on_peer_removed(&device),
            Message::Bundle(bundle) => self.on_bundle(bundle),
            Message::Notify(_) => {
                debug!(device = %self.name, "ignoring monitor notification");
            }
        }
    }

    fn on_link_request(&mut self, src: String, dst: String) {
        if src != self.name {
            warn!(device = %self.name, %src, "link request addressed to another device");
            return;
        }
        let router = self
            .routers
            .entry(dst.clone())
            .or_insert_with(|| Router::new(dst.clone()));
        if router.is_established() {
            self.session
                .set_link_state(&src, &dst, sm_session::LinkState::Established);
            return;
        }
        debug!(%src, %dst, "requesting link");
        let request = Message::Link {
            src,
            dst: dst.clone(),
        };
        self.send(&dst, request);
    }

    fn on_unlink_request(&mut self, src: String, dst: String) {
        if let Some(router) = self.routers.remove(&dst) {
            for connection in router.into_connections() {
                let props = connection.props();
                self.session.notify_monitors(Notification::Disconnected {
                    src: props.src.clone(),
                    dst: props.dst.clone(),
                });
            }
        }
        info!(%src, %dst, "link removed");
        self.send(
            &dst,
            Message::Unlink {
                src: src.clone(),
                dst: dst.clone(),
            },
        );
        self.session
            .set_link_state(&src, &dst, sm_session::LinkState::Removed);
    }

    fn drop_inbound_from(&mut self, peer: &str) {
        self.inbound_links.remove(peer);
        self.inbound_connections
            .retain(|(src, _)| src.device != peer);
    }

    fn on_peer_removed(&mut self, peer: &str) {
        if let Some(router) = self.routers.remove(peer) {
            for connection in router.into_connections() {
                let props = connection.props();
                self.session.notify_monitors(Notification::Disconnected {
                    src: props.src.clone(),
                    dst: props.dst.clone(),
                });
            }
        }
        self.drop_inbound_from(peer);
        debug!(device = %self.name, %peer, "peer removed");
    }

    fn on_connect_request(&mut self, src: SignalPath, dst: SignalPath, options: &ConnectOptions) {
        let Some(signal) = self
            .signals
            .iter()
            .find(|s| s.is_output() && s.name() == src.signal)
        else {
            warn!(device = %self.name, %src, "connect request for unknown output");
            return;
        };
        let source = SourceInfo {
            path: src.clone(),
            ty: signal.props().ty,
            length: signal.props().length,
            min: signal.props().min.clone(),
            max: signal.props().max.clone(),
        };
        let defaults = self.session.config().defaults;

        let Some(router) = self
            .routers
            .get_mut(&dst.device)
            .filter(|r| r.is_established())
        else {
            warn!(%src, %dst, "connect request without an established link");
            return;
        };
        if router.connection(&src, &dst).is_some() {
            debug!(%src, %dst, "connection already present");
            return;
        }

        let connection = OutboundConnection::new(source, dst.clone(), options, defaults);
        let props = connection.props();
        let message = Message::Connect {
            src: src.clone(),
            dst: dst.clone(),
            src_type: props.src_type,
            src_length: props.src_length,
            range: props.range.clone(),
        };
        router.add(connection);
        debug!(%src, %dst, "requesting connection");
        self.send(&dst.device, message);
    }

    fn on_connect(&mut self, src: SignalPath, dst: SignalPath) {
        if !self.inbound_links.contains(&src.device) {
            warn!(%src, %dst, "connect from unlinked device");
            let reply = Message::ConnectNack {
                reason: format!("no link from {}", src.device),
                src: src.clone(),
                dst,
            };
            self.send(&src.device, reply);
            return;
        }
        let target = self
            .signals
            .iter()
            .find(|s| !s.is_output() && s.name() == dst.signal)
            .map(|s| s.props().clone());
        let reply = match target {
            Some(props) => {
                self.inbound_connections.insert((src.clone(), dst.clone()));
                debug!(%src, %dst, "accepting connection");
                Message::ConnectAck {
                    src: src.clone(),
                    dst,
                    dst_type: props.ty,
                    dst_length: props.length,
                    dst_min: props.min,
                    dst_max: props.max,
                }
            }
            None => Message::ConnectNack {
                src: src.clone(),
                dst: dst.clone(),
                reason: format!("no input signal {dst}"),
            },
        };
        self.send(&src.device, reply);
    }

    fn on_connect_ack(&mut self, src: SignalPath, dst: SignalPath, info: DestinationInfo) {
        let Some(router) = self.routers.get_mut(&dst.device) else {
            warn!(%src, %dst, "connect ack without a router");
            return;
        };
        let Some(connection) = router.connection_mut(&src, &dst) else {
            warn!(%src, %dst, "connect ack for unknown connection");
            return;
        };
        match connection.establish(info) {
            Ok(()) => {
                let props = connection.props().clone();
                info!(%src, %dst, mode = %props.mode, "connection established");
                self.session.notify_monitors(Notification::Connected(props));
            }
            Err(e) => {
                warn!(%src, %dst, error = %e, "connection failed");
                router.remove(&src, &dst);
                let device = dst.device.clone();
                self.send(&device, Message::Disconnect { src, dst });
            }
        }
    }

    fn on_modify(&mut self, src: SignalPath, dst: SignalPath, options: &ConnectOptions) {
        let Some(connection) = self
            .routers
            .get_mut(&dst.device)
            .and_then(|r| r.connection_mut(&src, &dst))
        else {
            warn!(%src, %dst, "modify request for unknown connection");
            return;
        };
        match connection.modify(options) {
            Ok(()) => {
                let props = connection.props().clone();
                debug!(%src, %dst, mode = %props.mode, "connection modified");
                self.session
                    .notify_monitors(Notification::ConnectionModified(props));
            }
            Err(e) => warn!(%src, %dst, error = %e, "modify rejected"),
        }
    }

    fn on_disconnect_request(&mut self, src: SignalPath, dst: SignalPath) {
        let removed = self
            .routers
            .get_mut(&dst.device)
            .and_then(|r| r.remove(&src, &dst));
        if removed.is_none() {
            warn!(%src, %dst, "disconnect request for unknown connection");
            return;
        }
        info!(%src, %dst, "connection removed");
        self.send(
            &dst.device,
            Message::Disconnect {
                src: src.clone(),
                dst: dst.clone(),
            },
        );
        self.session
            .notify_monitors(Notification::Disconnected { src, dst });
    }

    /// Apply a bundle: every update is stored first-to-last and each input's
    /// handler sees the bundle's timetag.
    fn on_bundle(&mut self, bundle: Bundle) {
        for update in bundle.updates {
            let Some(signal) = self
                .signals
                .iter_mut()
                .find(|s| !s.is_output() && s.name() == update.signal)
            else {
                warn!(device = %self.name, signal = %update.signal, from = %bundle.from, "update for unknown input");
                continue;
            };
            if update.value.len() != signal.props().length {
                warn!(
                    signal = %update.signal,
                    expected = signal.props().length,
                    actual = update.value.len(),
                    "dropping update with wrong length"
                );
                continue;
            }
            let value = update.value.cast(signal.props().ty);
            signal.deliver(value, bundle.timetag);
        }
    }
}

/// Mutable access to one signal of a device.
pub struct SignalMut<'a> {
    device: &'a mut Device,
    index: usize,
}

impl SignalMut<'_> {
    pub fn props(&self) -> &SignalProps {
        self.device.signals[self.index].props()
    }

    pub fn value(&self) -> Option<&SignalValue> {
        self.device.signals[self.index].value()
    }

    /// Set the signal's value and publish it: immediately, as a
    /// single-update bundle at `now()`, or into the open queue.
    pub fn update(&mut self, value: impl Into<SignalValue>) -> MapperResult<()> {
        self.device.update_at(self.index, value.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sm_core::{OutOfBoundsPolicy, ScalarType};

    fn ready(session: &Session, name: &str) -> Device {
        let mut device = Device::new(session, name).unwrap();
        device.poll(0);
        assert!(device.ready());
        device
    }

    #[test]
    fn creating_same_name_twice_conflicts() {
        let session = Session::new();
        let _a = Device::new(&session, "dev").unwrap();
        assert!(matches!(
            Device::new(&session, "dev"),
            Err(MapperError::NameConflict { .. })
        ));
    }

    #[test]
    fn dropping_device_frees_name() {
        let session = Session::new();
        drop(Device::new(&session, "dev").unwrap());
        assert!(Device::new(&session, "dev").is_ok());
    }

    #[test]
    fn becomes_ready_on_first_poll() {
        let session = Session::new();
        let mut device = Device::new(&session, "dev").unwrap();
        assert!(!device.ready());
        assert_eq!(device.poll(0), 1);
        assert!(device.ready());
    }

    #[test]
    fn signals_round_trip_through_inspection() {
        let session = Session::new();
        let mut device = ready(&session, "dev");
        let out = device
            .add_output(
                SignalSpec::new("pos", 2, ScalarType::Float64)
                    .with_unit("m")
                    .with_min(vec![0.0, -1.0])
                    .with_max(vec![1.0, 1.0]),
            )
            .unwrap();
        let props = device.signal(out).unwrap().props().clone();
        assert_eq!(props.name, "/pos");
        assert_eq!(props.length, 2);
        assert_eq!(props.ty, ScalarType::Float64);
        assert_eq!(props.unit.as_deref(), Some("m"));
        assert_eq!(props.min, Some(vec![0.0, -1.0]));
        assert_eq!(device.find_signal("pos"), Some(out));
        assert_eq!(device.outputs().count(), 1);
        assert_eq!(device.inputs().count(), 0);
    }

    #[test]
    fn duplicate_signal_name_is_invalid() {
        let session = Session::new();
        let mut device = ready(&session, "dev");
        device
            .add_output(SignalSpec::scalar("x", ScalarType::Int32))
            .unwrap();
        assert!(matches!(
            device.add_input(SignalSpec::scalar("/x", ScalarType::Int32)),
            Err(MapperError::InvalidSignalSpec { .. })
        ));
    }

    #[test]
    fn removed_signal_handle_is_unknown() {
        let session = Session::new();
        let mut device = ready(&session, "dev");
        let out = device
            .add_output(SignalSpec::scalar("x", ScalarType::Int32))
            .unwrap();
        device.remove_signal(out).unwrap();
        assert!(matches!(
            device.signal(out),
            Err(MapperError::UnknownSignal { .. })
        ));
        assert!(device.signal_mut(out).is_err());
    }

    #[test]
    fn update_records_value_and_time() {
        let session = Session::new();
        let mut device = ready(&session, "dev");
        let out = device
            .add_output(SignalSpec::scalar("x", ScalarType::Int32).with_range(0.0, 10.0))
            .unwrap();
        device.signal_mut(out).unwrap().update(4).unwrap();
        let signal = device.signal(out).unwrap();
        assert_eq!(signal.value(), Some(&SignalValue::Int32(vec![4])));
        assert!(signal.timetag().is_some());
    }

    #[test]
    fn connect_from_unlinked_device_is_refused() {
        let session = Session::new();
        session.register_device("src").unwrap();
        let mut dst = ready(&session, "dst");
        dst.add_input(SignalSpec::scalar("in", ScalarType::Float32))
            .unwrap();
        let src_path = SignalPath::new("src", "out");
        let dst_path = SignalPath::new("dst", "in");
        session.send(
            &Endpoint::device("dst"),
            Message::Connect {
                src: src_path.clone(),
                dst: dst_path.clone(),
                src_type: ScalarType::Float32,
                src_length: 1,
                range: sm_core::Range::default(),
            },
        );
        dst.poll(0);
        assert_eq!(dst.num_connections_in(), 0);
        let replies = session.receive(&Endpoint::device("src"), None);
        assert!(replies.iter().any(|m| matches!(
            m,
            Message::ConnectNack { src, dst, .. } if *src == src_path && *dst == dst_path
        )));
    }

    #[test]
    fn clamp_policy_from_config() {
        let config = SessionConfig {
            out_of_bounds: OutOfBoundsPolicy::Clamp,
            ..SessionConfig::default()
        };
        let session = Session::with_config(config);
        let mut device = ready(&session, "dev");
        let out = device
            .add_output(SignalSpec::scalar("x", ScalarType::Int32).with_range(0.0, 10.0))
            .unwrap();
        device.signal_mut(out).unwrap().update(11).unwrap();
        assert_eq!(
            device.signal(out).unwrap().value(),
            Some(&SignalValue::Int32(vec![10]))
        );
    }

    #[test]
    fn queued_updates_take_queue_timetag() {
        let session = Session::new();
        let mut device = ready(&session, "dev");
        let out = device
            .add_output(SignalSpec::scalar("x", ScalarType::Int32))
            .unwrap();
        let t = Timetag::new(42, 0);
        device.start_queue(t).unwrap();
        device.signal_mut(out).unwrap().update(1).unwrap();
        assert_eq!(device.signal(out).unwrap().timetag(), Some(t));
        assert_eq!(device.queue_open(), Some(t));
        device.send_queue(t).unwrap();
        assert_eq!(device.queue_open(), None);
        assert_eq!(device.send_queue(t), Err(MapperError::NoActiveQueue));
    }

    #[test]
    fn now_never_goes_backwards() {
        let session = Session::new();
        let mut device = ready(&session, "dev");
        let a = device.now();
        let b = device.now();
        assert!(b >= a);
    }
}
