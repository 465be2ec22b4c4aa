//! Facade behaviors: composition, contexts, cancellation
// (c) 2025 Ross Younger

use pretty_assertions::assert_eq;
use shapepack::{
    EnumShape, ErrorKind, MessagePackSerializer, Reader, Result, SerializerConfig, Shape, Shaped,
    Writer,
};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

#[test]
fn several_structures_share_one_buffer() -> Result<()> {
    let mp = MessagePackSerializer::default();
    let mut w = Writer::new();
    let mut cx = mp.context();
    mp.serialize_into(&mut w, &1u32, &mut cx)?;
    mp.serialize_into(&mut w, &"two".to_string(), &mut cx)?;
    mp.serialize_into(&mut w, &vec![3u8, 4], &mut cx)?;
    let bytes = w.into_vec();

    let mut r = Reader::new(&bytes);
    let mut cx = mp.context();
    assert_eq!(mp.read_from::<u32>(&mut r, &mut cx)?, 1);
    assert_eq!(mp.read_from::<String>(&mut r, &mut cx)?, "two");
    assert_eq!(mp.read_from::<Vec<u8>>(&mut r, &mut cx)?, vec![3, 4]);
    assert!(!r.has_next());
    Ok(())
}

#[test]
fn cancellation_applies_to_the_sync_path_too() {
    let mp = MessagePackSerializer::default();
    let token = CancellationToken::new();
    token.cancel();
    let mut cx = mp.context_with_cancellation(token);
    let err = mp
        .serialize_with_context(&vec![1u8, 2, 3], &mut cx)
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Cancelled);
}

#[test]
fn starting_state_reaches_the_per_call_context() -> Result<()> {
    let mp = MessagePackSerializer::new(
        SerializerConfig::default().with_starting_state("tenant", Arc::new("acme".to_string())),
    )?;
    let cx = mp.context();
    assert_eq!(*cx.state::<String>("tenant").unwrap(), "acme");
    assert!(cx.state::<String>("missing").is_none());
    // A wrongly-typed fetch is None, not a panic.
    assert!(cx.state::<u32>("tenant").is_none());
    Ok(())
}

#[derive(Clone, Copy, Debug, PartialEq)]
enum Color {
    Red = 0,
    Green = 1,
    Blue = 2,
}

impl Shaped for Color {
    fn shape() -> Shape<Self> {
        EnumShape::new(
            "Color",
            |c: &Color| *c as i64,
            |ord| match ord {
                0 => Some(Color::Red),
                1 => Some(Color::Green),
                2 => Some(Color::Blue),
                _ => None,
            },
        )
        .with_entry(0, "Red")
        .with_entry(1, "Green")
        .with_entry(2, "Blue")
        .into_shape()
    }
}

#[test]
fn enum_modes_interoperate() -> Result<()> {
    let by_ordinal = MessagePackSerializer::default();
    let by_name = MessagePackSerializer::new(SerializerConfig::default().with_enum_by_name(true))?;

    let ordinal_bytes = by_ordinal.serialize(&Color::Green)?;
    assert_eq!(ordinal_bytes, [0x01]);
    let name_bytes = by_name.serialize(&Color::Green)?;
    assert_eq!(name_bytes[0], 0xa5); // fixstr "Green"

    // Either reader accepts either wire form.
    assert_eq!(by_name.deserialize::<Color>(&ordinal_bytes)?, Color::Green);
    assert_eq!(by_ordinal.deserialize::<Color>(&name_bytes)?, Color::Green);
    assert!(by_ordinal.deep_equal(&Color::Green, &Color::Green)?);
    assert!(!by_ordinal.deep_equal(&Color::Green, &Color::Blue)?);
    Ok(())
}

#[test]
fn custom_converter_overrides_take_precedence() -> Result<()> {
    use shapepack::{Context, Converter};

    /// Writes u32 as a string, to prove the override is in effect
    struct Stringly;
    impl Converter<u32> for Stringly {
        fn write(&self, writer: &mut Writer, value: &u32, _cx: &mut Context) -> Result<()> {
            writer.write_str(&value.to_string())
        }
        fn read(&self, reader: &mut Reader<'_>, _cx: &mut Context) -> Result<u32> {
            let start = reader.position();
            reader.read_str()?.parse().map_err(|_| {
                shapepack::Error::malformed(start, "expected a stringified integer")
            })
        }
    }

    let mp = MessagePackSerializer::new(
        SerializerConfig::default().with_converter::<u32>(Arc::new(Stringly)),
    )?;
    let bytes = mp.serialize(&42u32)?;
    assert_eq!(bytes, [0xa2, b'4', b'2']);
    assert_eq!(mp.deserialize::<u32>(&bytes)?, 42);

    // The override also applies when u32 appears as a child shape.
    let nested = mp.serialize(&vec![7u32])?;
    assert_eq!(nested, [0x91, 0xa1, b'7']);

    // A differently-configured facade is unaffected.
    let plain = MessagePackSerializer::default();
    assert_eq!(plain.serialize(&42u32)?, [0x2a]);
    Ok(())
}

#[test]
fn configs_are_reported_back() -> Result<()> {
    let config = SerializerConfig::default()
        .with_max_depth(9)
        .with_intern_strings(true);
    let mp = MessagePackSerializer::new(config)?;
    assert_eq!(mp.config().max_depth, 9);
    assert!(mp.config().intern_strings);
    // Debug output exists and does not leak internals.
    let rendered = format!("{mp:?}");
    assert!(rendered.contains("max_depth"), "got {rendered}");
    Ok(())
}
