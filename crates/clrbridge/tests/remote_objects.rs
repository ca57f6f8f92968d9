mod common;

use clrbridge::bridge::protocol::{Message, ObjectRef, TemplateInfo};
use clrbridge::{Attribute, BridgeError, Value};
use common::{FakeServer, Reply, points, touching};

#[test]
fn proxy_resolves_methods_and_properties() {
    let server = FakeServer::start(points());
    let session = server.connect();

    let point = session
        .create("Point", &[Value::from(3), Value::from(4)])
        .unwrap()
        .into_object()
        .unwrap();
    assert!(!point.is_bound());
    assert_eq!(point.to_string(), "<Point: 7>");

    assert_eq!(point.call("Magnitude", &[]).unwrap(), Value::Float(5.0));
    assert!(point.is_bound());
    assert_eq!(point.get("X").unwrap(), Value::Float(3.0));

    point.set("X", 2.0).unwrap();
    assert_eq!(point.get("X").unwrap(), Value::Float(2.0));
    assert_eq!(point.call("Scale", &[Value::from(3)]).unwrap(), Value::Float(6.0));

    assert!(matches!(
        point.get("Magnitude"),
        Err(BridgeError::NotAProperty { .. })
    ));
    assert!(matches!(
        point.call("X", &[]),
        Err(BridgeError::NotCallable { .. })
    ));
    assert!(matches!(
        point.attr("Z"),
        Err(BridgeError::UnknownMember { ref member, .. }) if member == "Z"
    ));

    drop(point);
    session.close();

    let requests = server.requests();
    let templates = requests
        .iter()
        .filter(|m| matches!(m, Message::TemplateReq { .. }))
        .count();
    assert_eq!(templates, 1);
    assert_eq!(requests.last(), Some(&Message::Release { object_id: 7 }));
}

#[test]
fn template_shared_between_instances() {
    let server = FakeServer::start(points());
    let session = server.connect();

    let a = session.create("Point", &[]).unwrap().into_object().unwrap();
    let b = session.create("Point", &[]).unwrap().into_object().unwrap();
    assert_ne!(a.id(), b.id());

    a.call("Magnitude", &[]).unwrap();
    b.call("Magnitude", &[]).unwrap();
    assert!(std::sync::Arc::ptr_eq(&a.class().unwrap(), &b.class().unwrap()));

    drop((a, b));
    session.close();
    let templates = server
        .requests()
        .into_iter()
        .filter(|m| matches!(m, Message::TemplateReq { .. }))
        .count();
    assert_eq!(templates, 1);
}

#[test]
fn cached_method_is_reused() {
    let server = FakeServer::start(points());
    let session = server.connect();
    let point = session.create("Point", &[]).unwrap().into_object().unwrap();

    let first = point.method("Magnitude").unwrap();
    let Attribute::Cache(names) = point.attr("cache").unwrap() else {
        panic!("cache is a reserved attribute");
    };
    assert_eq!(names, ["Magnitude"]);

    let again = point.method("Magnitude").unwrap();
    assert_eq!(first.name(), again.name());
    assert_eq!(again.call(&[]).unwrap(), Value::Float(5.0));

    drop(point);
    // The callable does not keep the proxy alive.
    assert!(matches!(first.call(&[]), Err(BridgeError::Released(7))));
    session.close();
    server.requests();
}

#[test]
fn release_sent_exactly_once() {
    let server = FakeServer::start(points());
    let session = server.connect();

    let point = session.create("Point", &[]).unwrap().into_object().unwrap();
    let alias = point.clone();
    point.call("Magnitude", &[]).unwrap();

    point.release().unwrap();
    assert!(matches!(alias.call("Magnitude", &[]), Err(BridgeError::Released(7))));
    assert!(matches!(
        session.call(0, "Magnitude", &[Value::from(alias.clone())]),
        Err(BridgeError::Released(7))
    ));
    drop(alias);
    session.close();

    let requests = server.requests();
    let for_seven = touching(&requests, 7);
    assert_eq!(for_seven.last(), Some(&&Message::Release { object_id: 7 }));
    assert_eq!(
        for_seven
            .iter()
            .filter(|m| matches!(m, Message::Release { .. }))
            .count(),
        1
    );
}

#[test]
fn objects_pass_as_object_references_not_arrays() {
    let server = FakeServer::start(points());
    let session = server.connect();

    let point = session.create("Point", &[]).unwrap().into_object().unwrap();
    assert_eq!(session.registry().classify(&Value::from(point.clone())), Some("object"));

    // Origin ignores its arguments; only the encoding matters here.
    let origin = session
        .call_static("Point", "Origin", &[Value::from(point.clone())])
        .unwrap();

    drop((point, origin));
    session.close();
    let requests = server.requests();
    assert_eq!(
        requests[1],
        Message::CallStaticMethod {
            classname: "Point".into(),
            method: "Origin".into(),
            args: vec![Message::Object(ObjectRef::new(7, Some("Point".into())))],
        }
    );
}

#[test]
fn protect_is_issued_without_reply() {
    let server = FakeServer::start(points());
    let session = server.connect();

    let point = session.create("Point", &[]).unwrap().into_object().unwrap();
    point.protect().unwrap();
    assert_eq!(point.call("Magnitude", &[]).unwrap(), Value::Float(5.0));

    drop(point);
    session.close();
    let requests = server.requests();
    assert_eq!(requests[1], Message::Protect { object_id: 7 });
}

#[test]
fn indexed_access() {
    let server = FakeServer::start(|request| match request {
        Message::Create { .. } => {
            Reply::Message(Message::Object(ObjectRef::new(5, Some("System.Collections.ArrayList".into()))))
        }
        Message::GetIndexed { index, .. } => Reply::Message(Message::Int32(index * 10)),
        Message::GetIndexedProperty { property, index, .. } => {
            Reply::Message(Message::String(format!("{property}[{index}]")))
        }
        _ => Reply::Nothing,
    });
    let session = server.connect();

    let list = session.create("ArrayList", &[]).unwrap().into_object().unwrap();
    assert_eq!(list.class_name(), Some("ArrayList"));
    assert_eq!(list.get_indexed(2).unwrap(), Value::Int(20));
    assert_eq!(
        list.get_indexed_property("Item", 1).unwrap(),
        Value::from("Item[1]")
    );

    drop(list);
    session.close();
    assert_eq!(server.requests().len(), 4);
}

#[test]
fn dropping_after_close_sends_nothing() {
    let server = FakeServer::start(points());
    let session = server.connect();

    let point = session.create("Point", &[]).unwrap().into_object().unwrap();
    session.close();
    drop(point);

    assert_eq!(server.requests().len(), 1);
}

#[test]
fn same_handle_twice_shares_one_proxy() {
    let server = FakeServer::start(|request| match request {
        Message::GetIndexed { .. } => {
            Reply::Message(Message::Object(ObjectRef::new(5, Some("Widget".into()))))
        }
        Message::TemplateReq { .. } => Reply::Message(Message::TemplateReply(TemplateInfo {
            properties: vec![],
            methods: vec!["Touch".into()],
            static_methods: vec![],
        })),
        Message::CallMethod { .. } => Reply::Message(Message::Null),
        _ => Reply::Nothing,
    });
    let session = server.connect();

    let first = session.get_indexed(1, 0).unwrap().into_object().unwrap();
    let second = session.get_indexed(1, 1).unwrap().into_object().unwrap();
    assert_eq!(first, second);
    assert_eq!(session.live_objects(), 1);

    // The handle stays valid while any holder remains.
    drop(first);
    assert_eq!(second.call("Touch", &[]).unwrap(), Value::Null);
    drop(second);
    assert_eq!(session.live_objects(), 0);

    session.close();
    let requests = server.requests();
    assert_eq!(
        touching(&requests, 5),
        [
            &Message::CallMethod {
                object_id: 5,
                method: "Touch".into(),
                args: vec![],
            },
            &Message::Release { object_id: 5 },
        ]
    );
}

#[test]
fn released_handle_gets_a_fresh_proxy() {
    let server = FakeServer::start(|request| match request {
        Message::GetIndexed { .. } => Reply::Message(Message::Object(ObjectRef::new(5, None))),
        _ => Reply::Nothing,
    });
    let session = server.connect();

    let first = session.get_indexed(1, 0).unwrap().into_object().unwrap();
    first.release().unwrap();
    let again = session.get_indexed(1, 0).unwrap().into_object().unwrap();
    assert!(!again.is_released());
    drop(again);

    session.close();
    let releases = server
        .requests()
        .into_iter()
        .filter(|m| matches!(m, Message::Release { object_id: 5 }))
        .count();
    assert_eq!(releases, 2);
}
