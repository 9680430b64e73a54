use sm_core::{ConnectOptions, MapMode, SignalPath, SignalValue, Timetag};
use sm_session::{Bundle, Message, Notification, Update};

#[test]
fn bundle_serializes_with_type_tag() {
    let message = Message::Bundle(Bundle {
        from: "src".to_string(),
        timetag: Timetag::new(5, 0),
        updates: vec![Update {
            signal: "/insig1".to_string(),
            value: SignalValue::Float32(vec![0.5]),
        }],
    });
    let json = serde_json::to_value(&message).unwrap();
    assert_eq!(json["type"], "bundle");
    assert_eq!(json["from"], "src");

    let back: Message = serde_json::from_value(json).unwrap();
    assert_eq!(back, message);
}

#[test]
fn connect_request_carries_options() {
    let message = Message::ConnectRequest {
        src: SignalPath::new("src", "outsig1"),
        dst: SignalPath::new("dest", "insig1"),
        options: ConnectOptions::new().with_mode(MapMode::Linear),
    };
    let text = serde_json::to_string(&message).unwrap();
    assert!(text.contains("connect_request"));
    assert!(text.contains("linear"));
    assert_eq!(message.kind(), "connect_request");
}

#[test]
fn notifications_nest_inside_messages() {
    let message = Message::Notify(Notification::DeviceRemoved {
        name: "dest".to_string(),
    });
    let json = serde_json::to_value(&message).unwrap();
    assert_eq!(json["type"], "notify");
    assert_eq!(json["event"], "device_removed");
}
