use proptest::collection::vec;
use proptest::prelude::*;

use std::thread;

use rmp_envelope::decode::DEFAULT_MAX_DEPTH;
use rmp_envelope::{
    decode, encode, encode_notification, encode_request, encode_response, AnyMessage, Codec,
    CodecConfig, DecodeError, EncodeError, Notification, ReadError, Request, Response, Value,
};

#[test]
fn get_current_line() {
    let req = Request::new(42, "nvim_get_current_line", vec![]);
    let buf = encode_request(&req).unwrap();
    let decoded = decode(&buf).unwrap();
    assert_eq!(decoded.bytes_read, buf.len());

    let got = decoded.message.into_request().unwrap();
    assert_eq!(u32::from(got.msgid), 42);
    assert_eq!(got.method, "nvim_get_current_line");
    assert_eq!(got.params, Value::Array(vec![]));
}

#[test]
fn response_with_error_and_result() {
    let rsp = Response {
        msgid: 9.into(),
        error: Some(Value::from("oops")),
        result: Some(Value::Int(17)),
    };
    let buf = encode_response(&rsp).unwrap();
    let decoded = decode(&buf).unwrap();
    assert_eq!(decoded.bytes_read, buf.len());
    assert_eq!(decoded.message, AnyMessage::Response(rsp));
}

#[test]
fn response_presence_combinations() {
    let slots = [None, Some(Value::from("err")), Some(Value::Array(vec![]))];
    for error in &slots {
        for result in &slots {
            let rsp = Response {
                msgid: 1.into(),
                error: error.clone(),
                result: result.clone(),
            };
            let buf = encode_response(&rsp).unwrap();
            let got = decode(&buf).unwrap().message;
            assert_eq!(got, AnyMessage::Response(rsp));
        }
    }
}

#[test]
fn notification() {
    let nfy = Notification::new(
        "redraw",
        vec![Value::Array(vec!["grid_line".into(), 1.into()])],
    );
    let buf = encode_notification(&nfy).unwrap();
    let got = decode(&buf).unwrap().message.into_notification().unwrap();
    assert_eq!(got, nfy);
}

#[test]
fn stream_of_frames() {
    let msgs: Vec<AnyMessage> = vec![
        Request::new(1, "a", vec![1.into()]).into(),
        Notification::new("b", vec![]).into(),
        Response::ok(1, "done".into()).into(),
    ];
    let mut stream = Vec::new();
    for msg in &msgs {
        stream.extend(encode(msg).unwrap());
    }
    // trailing partial frame
    let partial = encode(&msgs[0]).unwrap();
    stream.extend_from_slice(&partial[..partial.len() - 1]);

    let mut pos = 0;
    let mut got = Vec::new();
    loop {
        match decode(&stream[pos..]) {
            Ok(decoded) => {
                pos += decoded.bytes_read;
                got.push(decoded.message);
            }
            Err(e) => {
                assert!(e.is_incomplete(), "{:?}", e);
                break;
            }
        }
    }
    assert_eq!(got, msgs);
    assert_eq!(stream.len() - pos, partial.len() - 1);
}

#[test]
fn trailing_garbage_not_counted() {
    let nfy = Notification::new("x", vec![]);
    let frame = encode_notification(&nfy).unwrap();
    let mut buf = frame.clone();
    buf.extend_from_slice(&[0xc1, 0xff, 0x00]);
    assert_eq!(decode(&buf).unwrap().bytes_read, frame.len());
}

#[test]
fn decoded_message_is_independent_of_buffer() {
    let req = Request::new(7, "owned", vec!["payload".into(), vec![1u8, 2, 3].into()]);
    let mut buf = encode_request(&req).unwrap();
    let got = decode(&buf).unwrap().message;
    for b in buf.iter_mut() {
        *b = 0;
    }
    drop(buf);
    assert_eq!(got, AnyMessage::Request(req));
    rmp_envelope::release(got);
}

#[test]
fn tag_0x10_rejected() {
    let buf = [0x94, 0x10, 0x01, 0xa1, b'm', 0x90];
    assert_eq!(decode(&buf), Err(DecodeError::InvalidMessageType));
}

#[test]
fn timestamp_shaped_ext_refused() {
    let req = Request::new(1, "m", vec![Value::Ext(-1, vec![0xff; 8])]);
    assert_eq!(encode_request(&req), Err(EncodeError::TimestampExt(8)));
    let req = Request::new(1, "m", vec![Value::Ext(-1, vec![0, 0, 1, 0])]);
    assert_eq!(encode_request(&req), Err(EncodeError::TimestampExt(4)));

    let ts = Value::Timestamp {
        seconds: 256,
        nanoseconds: 0,
    };
    let req = Request::new(1, "m", vec![ts, Value::Ext(-1, vec![0xff; 3])]);
    let got = decode(&encode_request(&req).unwrap()).unwrap().message;
    assert_eq!(got, AnyMessage::Request(req));
}

/// `n` arrays wrapped around a nil
fn nested(n: usize) -> Value {
    let mut value = Value::Nil;
    for _ in 0..n {
        value = Value::Array(vec![value]);
    }
    value
}

/// Run `f` on a thread with the usual 2 MiB stack
fn on_default_stack<T: Send + 'static>(f: impl FnOnce() -> T + Send + 'static) -> T {
    thread::Builder::new()
        .stack_size(2 << 20)
        .spawn(f)
        .unwrap()
        .join()
        .unwrap()
}

#[test]
fn nesting_limit_boundary() {
    on_default_stack(|| {
        // The envelope is the first level
        let deepest = Request {
            msgid: 1.into(),
            method: "m".to_owned(),
            params: nested(DEFAULT_MAX_DEPTH - 1),
        };
        let buf = encode_request(&deepest).unwrap();
        let got = decode(&buf).unwrap();
        assert_eq!(got.bytes_read, buf.len());
        assert_eq!(got.message, AnyMessage::Request(deepest));

        let too_deep = Request {
            msgid: 1.into(),
            method: "m".to_owned(),
            params: nested(DEFAULT_MAX_DEPTH),
        };
        assert_eq!(
            encode_request(&too_deep),
            Err(EncodeError::DepthLimitExceeded(DEFAULT_MAX_DEPTH))
        );
        let lenient = Codec::new(CodecConfig::default().max_depth(DEFAULT_MAX_DEPTH + 1));
        let buf = lenient.encode_request(&too_deep).unwrap();
        assert_eq!(
            decode(&buf),
            Err(DecodeError::Read(ReadError::DepthLimitExceeded(
                DEFAULT_MAX_DEPTH
            )))
        );
        assert!(lenient.decode(&buf).is_ok());
    });
}

#[test]
fn hostile_nesting_within_limit() {
    on_default_stack(|| {
        let mut buf = vec![0x93, 0x02, 0xa1, b'm'];
        buf.extend(std::iter::repeat(0x91).take(DEFAULT_MAX_DEPTH - 1));
        buf.push(0xc0);
        let got = decode(&buf).unwrap();
        assert_eq!(got.bytes_read, buf.len());
        let nfy = got.message.into_notification().unwrap();
        assert_eq!(nfy.params, nested(DEFAULT_MAX_DEPTH - 1));

        // One more level inside the same envelope is refused without
        // exhausting the stack
        let mut buf = vec![0x93, 0x02, 0xa1, b'm'];
        buf.extend(std::iter::repeat(0x91).take(DEFAULT_MAX_DEPTH));
        buf.push(0xc0);
        assert_eq!(
            decode(&buf),
            Err(DecodeError::Read(ReadError::DepthLimitExceeded(
                DEFAULT_MAX_DEPTH
            )))
        );
    });
}

/// Ext -1 payloads of timestamp length cannot be written as plain extensions
fn has_timestamp_ext(value: &Value) -> bool {
    match value {
        Value::Ext(-1, data) => matches!(data.len(), 4 | 8 | 12),
        Value::Array(items) => items.iter().any(has_timestamp_ext),
        Value::Map(entries) => entries.iter().any(|(_, v)| has_timestamp_ext(v)),
        _ => false,
    }
}

fn arb_value() -> impl Strategy<Value = Value> {
    let leaf = prop_oneof![
        Just(Value::Nil),
        any::<bool>().prop_map(Value::Bool),
        any::<i64>().prop_map(Value::Int),
        any::<u64>().prop_map(Value::UInt),
        (-1.0e12f64..1.0e12).prop_map(Value::Float),
        vec(any::<u8>(), 0..40).prop_map(Value::Str),
        vec(any::<u8>(), 0..300).prop_map(Value::Bin),
        (prop_oneof![Just(-1i8), any::<i8>()], vec(any::<u8>(), 0..20))
            .prop_map(|(ty, data)| Value::Ext(ty, data)),
        (any::<i64>(), 0u32..1_000_000_000).prop_map(|(seconds, nanoseconds)| {
            Value::Timestamp {
                seconds,
                nanoseconds,
            }
        }),
    ];
    leaf.prop_recursive(6, 128, 20, |inner| {
        prop_oneof![
            vec(inner.clone(), 0..20).prop_map(Value::Array),
            vec(("[a-z]{0,6}", inner), 0..20).prop_map(Value::Map),
        ]
    })
}

proptest! {
    #[test]
    fn request_round_trip(msgid in any::<u32>(), method in "\\PC{0,16}", params in arb_value()) {
        let req = Request { msgid: msgid.into(), method, params };
        let encoded = encode_request(&req);
        if has_timestamp_ext(&req.params) {
            prop_assert!(matches!(encoded, Err(EncodeError::TimestampExt(_))), "{:?}", encoded);
            return Ok(());
        }
        let buf = encoded.unwrap();
        let decoded = decode(&buf).unwrap();
        prop_assert_eq!(decoded.bytes_read, buf.len());
        prop_assert_eq!(decoded.message, AnyMessage::Request(req));
    }

    #[test]
    fn notification_round_trip(method in "\\PC{0,16}", params in arb_value(), trailing in vec(any::<u8>(), 0..8)) {
        let nfy = Notification { method, params };
        let encoded = encode_notification(&nfy);
        if has_timestamp_ext(&nfy.params) {
            prop_assert!(matches!(encoded, Err(EncodeError::TimestampExt(_))), "{:?}", encoded);
            return Ok(());
        }
        let frame = encoded.unwrap();
        let mut buf = frame.clone();
        buf.extend(trailing);
        let decoded = decode(&buf).unwrap();
        prop_assert_eq!(decoded.bytes_read, frame.len());
        prop_assert_eq!(decoded.message, AnyMessage::Notification(nfy));
    }

    #[test]
    fn response_round_trip(
        msgid in any::<u32>(),
        error in proptest::option::of(arb_value()),
        result in proptest::option::of(arb_value()),
    ) {
        // A present nil reads back as absent
        let rsp = Response {
            msgid: msgid.into(),
            error: error.filter(|v| !v.is_nil()),
            result: result.filter(|v| !v.is_nil()),
        };
        let encoded = encode_response(&rsp);
        if rsp.error.iter().chain(&rsp.result).any(has_timestamp_ext) {
            prop_assert!(matches!(encoded, Err(EncodeError::TimestampExt(_))), "{:?}", encoded);
            return Ok(());
        }
        let buf = encoded.unwrap();
        let decoded = decode(&buf).unwrap();
        prop_assert_eq!(decoded.bytes_read, buf.len());
        prop_assert_eq!(decoded.message, AnyMessage::Response(rsp));
    }

    #[test]
    fn arbitrary_bytes_never_panic(buf in vec(any::<u8>(), 0..64)) {
        if let Ok(decoded) = decode(&buf) {
            prop_assert!(decoded.bytes_read <= buf.len());
        }
    }
}
