use std::sync::{Arc, Mutex};

use sm_config::SessionConfig;
use sm_core::{
    BoundaryAction, ConnectOptions, InstanceId, MapMode, MapperError, OutOfBoundsPolicy,
    ScalarType, SignalPath, SignalValue, Timetag,
};
use sm_device::{Device, RetryPolicy, SignalHandle, SignalProps, SignalSpec, poll_until};
use sm_session::{Endpoint, LinkState, Message, Session};

type Received = Arc<Mutex<Vec<(SignalValue, Timetag)>>>;

struct Pair {
    session: Session,
    src: Device,
    dst: Device,
    out: SignalHandle,
    received: Received,
}

fn retry() -> RetryPolicy {
    RetryPolicy {
        max_rounds: 50,
        poll_timeout_ms: 1,
    }
}

fn pair_with(config: SessionConfig, out: SignalSpec, input: SignalSpec) -> Pair {
    let session = Session::with_config(config);
    let mut src = Device::new(&session, "src").unwrap();
    let mut dst = Device::new(&session, "dst").unwrap();
    let out = src.add_output(out).unwrap();
    let received: Received = Arc::default();
    let sink = Arc::clone(&received);
    dst.add_input_with_handler(
        input,
        move |_: &SignalProps, _: InstanceId, value: &SignalValue, t: Timetag| {
            sink.lock().unwrap().push((value.clone(), t));
        },
    )
    .unwrap();
    assert!(poll_until(&mut [&mut src, &mut dst], retry(), |d| {
        d.iter().all(|d| d.ready())
    }));
    Pair {
        session,
        src,
        dst,
        out,
        received,
    }
}

fn pair(out: SignalSpec, input: SignalSpec) -> Pair {
    pair_with(SessionConfig::default(), out, input)
}

impl Pair {
    fn link(&mut self) {
        assert!(self.session.request_link("src", "dst").unwrap());
        assert!(poll_until(
            &mut [&mut self.src, &mut self.dst],
            retry(),
            |d| d[0].num_links_out() == 1 && d[1].num_links_in() == 1,
        ));
        assert_eq!(
            self.session.link_state("src", "dst"),
            Some(LinkState::Established)
        );
    }

    fn connect(&mut self, src: &str, dst: &str, options: ConnectOptions) {
        self.session.send(
            &Endpoint::device("src"),
            Message::ConnectRequest {
                src: SignalPath::new("src", src),
                dst: SignalPath::new("dst", dst),
                options,
            },
        );
        assert!(poll_until(
            &mut [&mut self.src, &mut self.dst],
            retry(),
            |d| d[0].num_connections_out() == 1 && d[1].num_connections_in() == 1,
        ));
    }

    fn deliver(&mut self) {
        poll_until(&mut [&mut self.src, &mut self.dst], retry(), |d| {
            d[1].session().pending(&Endpoint::device("dst")) == 0
        });
    }

    fn values(&self) -> Vec<f64> {
        self.received
            .lock()
            .unwrap()
            .iter()
            .filter_map(|(v, _)| v.first())
            .collect()
    }
}

#[test]
fn linear_connection_scales_queued_updates() {
    let mut p = pair(
        SignalSpec::scalar("outsig1", ScalarType::Int32).with_range(0.0, 1000.0),
        SignalSpec::scalar("insig1", ScalarType::Float32).with_range(0.0, 1.0),
    );
    p.link();
    p.connect("outsig1", "insig1", ConnectOptions::new().with_mode(MapMode::Linear));

    for i in 0..10 {
        let t = p.src.now();
        p.src.start_queue(t).unwrap();
        p.src.signal_mut(p.out).unwrap().update(i).unwrap();
        p.src.send_queue(t).unwrap();
    }
    p.deliver();

    let values = p.values();
    assert_eq!(values.len(), 10);
    for (i, v) in values.iter().enumerate() {
        assert!((v - i as f64 / 1000.0).abs() < 1e-6, "{i}: {v}");
    }
}

#[test]
fn queued_bundle_carries_one_timetag() {
    let session_config = SessionConfig::default();
    let mut p = pair_with(
        session_config,
        SignalSpec::scalar("out", ScalarType::Float64),
        SignalSpec::scalar("in", ScalarType::Float64),
    );
    p.link();
    p.connect("out", "in", ConnectOptions::new().with_mode(MapMode::Bypass));

    let t = Timetag::new(100, 7);
    p.src.start_queue(t).unwrap();
    p.src.signal_mut(p.out).unwrap().update(1.0).unwrap();
    p.src.signal_mut(p.out).unwrap().update(2.0).unwrap();
    p.src.send_queue(t).unwrap();
    p.deliver();

    let received = p.received.lock().unwrap();
    assert_eq!(received.len(), 2);
    assert!(received.iter().all(|(_, at)| *at == t));
}

#[test]
fn unqueued_updates_arrive_in_order() {
    let mut p = pair(
        SignalSpec::scalar("out", ScalarType::Int32),
        SignalSpec::scalar("in", ScalarType::Int32),
    );
    p.link();
    p.connect("out", "in", ConnectOptions::new());
    for i in [3, 1, 2] {
        p.src.signal_mut(p.out).unwrap().update(i).unwrap();
    }
    p.deliver();
    assert_eq!(p.values(), vec![3.0, 1.0, 2.0]);
}

#[test]
fn update_without_connection_is_local_only() {
    let mut p = pair(
        SignalSpec::scalar("out", ScalarType::Int32),
        SignalSpec::scalar("in", ScalarType::Int32),
    );
    p.src.signal_mut(p.out).unwrap().update(5).unwrap();
    p.deliver();
    assert!(p.values().is_empty());
    assert_eq!(
        p.src.signal(p.out).unwrap().value(),
        Some(&SignalValue::Int32(vec![5]))
    );
}

#[test]
fn boundary_clamp_limits_delivered_value() {
    let mut p = pair(
        SignalSpec::scalar("out", ScalarType::Float64),
        SignalSpec::scalar("in", ScalarType::Float64).with_range(0.0, 1.0),
    );
    p.link();
    p.connect(
        "out",
        "in",
        ConnectOptions::new()
            .with_mode(MapMode::Bypass)
            .with_bounds(BoundaryAction::Clamp, BoundaryAction::Clamp),
    );
    for v in [-0.5, 0.5, 1.5] {
        p.src.signal_mut(p.out).unwrap().update(v).unwrap();
    }
    p.deliver();
    assert_eq!(p.values(), vec![0.0, 0.5, 1.0]);
}

#[test]
fn boundary_mute_drops_value() {
    let mut p = pair(
        SignalSpec::scalar("out", ScalarType::Float64),
        SignalSpec::scalar("in", ScalarType::Float64).with_range(0.0, 1.0),
    );
    p.link();
    p.connect(
        "out",
        "in",
        ConnectOptions::new()
            .with_mode(MapMode::Bypass)
            .with_bounds(BoundaryAction::Mute, BoundaryAction::Mute),
    );
    for v in [0.25, 2.0, 0.75] {
        p.src.signal_mut(p.out).unwrap().update(v).unwrap();
    }
    p.deliver();
    assert_eq!(p.values(), vec![0.25, 0.75]);
}

#[test]
fn expression_connection_uses_history() {
    let mut p = pair(
        SignalSpec::scalar("out", ScalarType::Float64),
        SignalSpec::scalar("in", ScalarType::Float64),
    );
    p.link();
    p.connect(
        "out",
        "in",
        ConnectOptions::new()
            .with_mode(MapMode::Expression)
            .with_expression("y=x+x{-1}"),
    );
    for v in [1.0, 2.0, 3.0] {
        p.src.signal_mut(p.out).unwrap().update(v).unwrap();
    }
    p.deliver();
    assert_eq!(p.values(), vec![1.0, 3.0, 5.0]);
}

#[test]
fn update_at_bounds_and_beyond() {
    let session = Session::new();
    let mut device = Device::new(&session, "dev").unwrap();
    let out = device
        .add_output(SignalSpec::scalar("out", ScalarType::Int32).with_range(0.0, 1000.0))
        .unwrap();
    let mut signal = device.signal_mut(out).unwrap();
    signal.update(0).unwrap();
    signal.update(1000).unwrap();
    assert!(matches!(
        signal.update(1001),
        Err(MapperError::OutOfBounds { .. })
    ));
    assert!(matches!(
        signal.update(-1),
        Err(MapperError::OutOfBounds { .. })
    ));
    assert_eq!(signal.value(), Some(&SignalValue::Int32(vec![1000])));
}

#[test]
fn clamp_session_limits_updates() {
    let config = SessionConfig {
        out_of_bounds: OutOfBoundsPolicy::Clamp,
        ..SessionConfig::default()
    };
    let session = Session::with_config(config);
    let mut device = Device::new(&session, "dev").unwrap();
    let out = device
        .add_output(SignalSpec::scalar("out", ScalarType::Int32).with_range(0.0, 1000.0))
        .unwrap();
    let mut signal = device.signal_mut(out).unwrap();
    signal.update(-1).unwrap();
    assert_eq!(signal.value(), Some(&SignalValue::Int32(vec![0])));
    signal.update(1001).unwrap();
    assert_eq!(signal.value(), Some(&SignalValue::Int32(vec![1000])));
}

#[test]
fn nan_update_is_rejected_under_both_policies() {
    for policy in [OutOfBoundsPolicy::Reject, OutOfBoundsPolicy::Clamp] {
        let config = SessionConfig {
            out_of_bounds: policy,
            ..SessionConfig::default()
        };
        let session = Session::with_config(config);
        let mut device = Device::new(&session, "dev").unwrap();
        let out = device
            .add_output(SignalSpec::scalar("x", ScalarType::Float64).with_range(0.0, 1.0))
            .unwrap();
        let mut signal = device.signal_mut(out).unwrap();
        signal.update(0.5).unwrap();
        assert!(
            matches!(signal.update(f64::NAN), Err(MapperError::OutOfBounds { .. })),
            "{policy:?}"
        );
        assert_eq!(signal.value(), Some(&SignalValue::Float64(vec![0.5])));
    }
}

#[test]
fn wrong_length_update_is_rejected() {
    let session = Session::new();
    let mut device = Device::new(&session, "dev").unwrap();
    let out = device
        .add_output(SignalSpec::new("vec", 3, ScalarType::Float32))
        .unwrap();
    let err = device
        .signal_mut(out)
        .unwrap()
        .update(vec![1.0f32, 2.0])
        .unwrap_err();
    assert_eq!(
        err,
        MapperError::ShapeMismatch {
            signal: "/vec".to_string(),
            expected: 3,
            actual: 2,
        }
    );
}

#[test]
fn queue_misuse_reports_errors() {
    let session = Session::new();
    let mut device = Device::new(&session, "dev").unwrap();
    let a = Timetag::new(1, 0);
    let b = Timetag::new(2, 0);
    assert_eq!(device.send_queue(a), Err(MapperError::NoActiveQueue));
    device.start_queue(a).unwrap();
    device.start_queue(a).unwrap();
    assert!(matches!(
        device.start_queue(b),
        Err(MapperError::QueueAlreadyOpen { .. })
    ));
    assert!(matches!(
        device.send_queue(b),
        Err(MapperError::TimestampMismatch { .. })
    ));
    device.send_queue(a).unwrap();
}

#[test]
fn removing_peer_drops_link_and_connections() {
    let mut p = pair(
        SignalSpec::scalar("out", ScalarType::Int32),
        SignalSpec::scalar("in", ScalarType::Int32),
    );
    p.link();
    p.connect("out", "in", ConnectOptions::new());
    let Pair {
        session,
        mut src,
        dst,
        ..
    } = p;
    drop(dst);
    src.poll(0);
    assert_eq!(src.num_links_out(), 0);
    assert_eq!(src.num_connections_out(), 0);
    assert_eq!(session.link_state("src", "dst"), None);
}

#[test]
fn removing_signal_disconnects() {
    let mut p = pair(
        SignalSpec::scalar("out", ScalarType::Int32),
        SignalSpec::scalar("in", ScalarType::Int32),
    );
    p.link();
    p.connect("out", "in", ConnectOptions::new());
    p.src.remove_signal(p.out).unwrap();
    p.dst.poll(0);
    assert_eq!(p.src.num_connections_out(), 0);
    assert_eq!(p.dst.num_connections_in(), 0);
    assert_eq!(p.src.num_links_out(), 1);
}
