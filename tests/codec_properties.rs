//! Universal codec properties: shortest encoding, skip-is-read, grammar
//! rejection
// (c) 2025 Ross Younger

use pretty_assertions::assert_eq;
use rstest::rstest;
use shapepack::{ErrorKind, MessagePackSerializer, Reader, Result, Timestamp, Writer};

/// The writer's output length for any integer fits the shortest-encoding
/// rule, verified at the encoding-class boundaries.
#[rstest]
#[case(0, 1)]
#[case(127, 1)] // top of positive fixint
#[case(128, 2)] // uint8
#[case(255, 2)]
#[case(256, 3)] // uint16
#[case(65_535, 3)]
#[case(65_536, 5)] // uint32
#[case(4_294_967_295, 5)]
#[case(4_294_967_296, 9)] // uint64
#[case(u64::MAX, 9)]
fn unsigned_boundaries(#[case] value: u64, #[case] expected_len: usize) -> Result<()> {
    let mp = MessagePackSerializer::default();
    let bytes = mp.serialize(&value)?;
    assert_eq!(bytes.len(), expected_len, "value {value}");
    assert_eq!(mp.deserialize::<u64>(&bytes)?, value);
    Ok(())
}

#[rstest]
#[case(-1, 1)] // negative fixint
#[case(-32, 1)] // bottom of negative fixint
#[case(-33, 2)] // int8
#[case(-128, 2)]
#[case(-129, 3)] // int16
#[case(-32_768, 3)]
#[case(-32_769, 5)] // int32
#[case(-2_147_483_648, 5)]
#[case(-2_147_483_649, 9)] // int64
#[case(i64::MIN, 9)]
fn signed_boundaries(#[case] value: i64, #[case] expected_len: usize) -> Result<()> {
    let mp = MessagePackSerializer::default();
    let bytes = mp.serialize(&value)?;
    assert_eq!(bytes.len(), expected_len, "value {value}");
    assert_eq!(mp.deserialize::<i64>(&bytes)?, value);
    Ok(())
}

/// One buffer exercising every encoding family
fn kitchen_sink() -> Result<Vec<u8>> {
    let mut w = Writer::new();
    w.write_map_header(6)?;
    w.write_str("ints")?;
    w.write_array_header(4)?;
    w.write_uint(3);
    w.write_int(-300);
    w.write_uint(70_000);
    w.write_int(i64::MIN);
    w.write_str("floats")?;
    w.write_array_header(2)?;
    w.write_f32(1.25);
    w.write_f64(-0.5);
    w.write_str("blob")?;
    w.write_bin(&[0xde, 0xad, 0xbe, 0xef])?;
    w.write_str("when")?;
    w.write_timestamp(Timestamp::new(1_700_000_000, 123)?)?;
    w.write_str("deep")?;
    w.write_map_header(1)?;
    w.write_nil();
    w.write_array_header(0)?;
    w.write_str("flags")?;
    w.write_array_header(2)?;
    w.write_bool(true);
    w.write_bool(false);
    Ok(w.into_vec())
}

/// `skip` must advance to exactly the position a full read would
#[test]
fn skip_consumes_exactly_one_structure() -> Result<()> {
    let bytes = kitchen_sink()?;
    let mut r = Reader::new(&bytes);
    r.skip_structure()?;
    assert_eq!(r.position(), bytes.len());
    assert!(!r.has_next());
    Ok(())
}

#[test]
fn raw_capture_equals_the_input() -> Result<()> {
    let bytes = kitchen_sink()?;
    let mut r = Reader::new(&bytes);
    let raw = r.read_raw_structure()?;
    assert_eq!(raw, &bytes[..]);
    Ok(())
}

#[test]
fn peek_reader_leaves_no_trace() -> Result<()> {
    let bytes = kitchen_sink()?;
    let r = Reader::new(&bytes);
    let mut peek = r.clone();
    assert_eq!(peek.read_map_header()?, 6);
    assert_eq!(peek.read_str()?, "ints");
    assert_eq!(r.position(), 0);
    Ok(())
}

#[test]
fn the_reserved_byte_is_rejected() {
    let mp = MessagePackSerializer::default();
    let err = mp.deserialize::<u64>(&[0xc1]).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Malformed);
}

#[test]
fn truncated_input_is_end_of_stream_at_the_right_offset() -> Result<()> {
    let bytes = kitchen_sink()?;
    let truncated = &bytes[..bytes.len() - 3];
    let mut r = Reader::new(truncated);
    let err = r.skip_structure().unwrap_err();
    assert_eq!(err.kind(), ErrorKind::EndOfStream);
    assert!(err.offset().is_some());
    Ok(())
}

#[test]
fn timestamps_roundtrip_through_the_facade() -> Result<()> {
    let mp = MessagePackSerializer::default();
    for ts in [
        Timestamp::EPOCH,
        Timestamp::new(1_700_000_000, 0)?,
        Timestamp::new(1_700_000_000, 999_999_999)?,
        Timestamp::new(-62_135_596_800, 0)?, // year 1
        Timestamp::new(1 << 40, 1)?,
    ] {
        let bytes = mp.serialize(&ts)?;
        assert_eq!(mp.deserialize::<Timestamp>(&bytes)?, ts);
        assert!(mp.deep_equal(&ts, &mp.deserialize::<Timestamp>(&bytes)?)?);
    }
    Ok(())
}

#[test]
fn float_widening_only_goes_one_way() -> Result<()> {
    let mp = MessagePackSerializer::default();
    // an f32 payload is accepted by an f64 read
    let narrow = mp.serialize(&1.5f32)?;
    assert_eq!(mp.deserialize::<f64>(&narrow)?, 1.5);
    // but an f64 payload is not silently narrowed to f32
    let wide = mp.serialize(&1.5f64)?;
    let err = mp.deserialize::<f32>(&wide).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Malformed);
    Ok(())
}
