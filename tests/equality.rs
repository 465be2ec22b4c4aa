//! Universal properties: roundtrip under structural equality, and
//! hash-follows-equality
// (c) 2025 Ross Younger

use pretty_assertions::assert_eq;
use shapepack::{
    MessagePackSerializer, ObjectShape, PropertyDef, Result, Shape, Shaped, Timestamp,
};
use std::collections::HashMap;

#[derive(Clone, Debug, Default, PartialEq)]
struct Reading {
    label: String,
    value: f64,
    at: Option<Timestamp>,
    history: Vec<f64>,
    attributes: HashMap<String, u32>,
}

impl Shaped for Reading {
    fn shape() -> Shape<Self> {
        ObjectShape::new("Reading")
            .with_default_ctor(Reading::default)
            .with_property(
                PropertyDef::new("label", |r: &Reading| &r.label).with_setter(|r, v| r.label = v),
            )
            .with_property(
                PropertyDef::new("value", |r: &Reading| &r.value).with_setter(|r, v| r.value = v),
            )
            .with_property(PropertyDef::new("at", |r: &Reading| &r.at).with_setter(|r, v| r.at = v))
            .with_property(
                PropertyDef::new("history", |r: &Reading| &r.history)
                    .with_setter(|r, v| r.history = v),
            )
            .with_property(
                PropertyDef::new("attributes", |r: &Reading| &r.attributes)
                    .with_setter(|r, v| r.attributes = v),
            )
            .into_shape()
    }
}

fn sample() -> Reading {
    let mut attributes = HashMap::new();
    let _ = attributes.insert("channel".to_string(), 4u32);
    let _ = attributes.insert("gain".to_string(), 9);
    Reading {
        label: "probe-a".into(),
        value: -0.0,
        at: Some(Timestamp::new(1_700_000_000, 250).unwrap()),
        history: vec![1.0, f64::NAN, 3.5],
        attributes,
    }
}

#[test]
fn roundtrip_preserves_structural_equality() -> Result<()> {
    let mp = MessagePackSerializer::default();
    let value = sample();
    let decoded: Reading = mp.deserialize(&mp.serialize(&value)?)?;
    // Plain PartialEq fails on the NaN in history; structural equality
    // must not.
    assert!(mp.deep_equal(&value, &decoded)?);
    assert_eq!(mp.deep_hash(&value)?, mp.deep_hash(&decoded)?);
    Ok(())
}

#[test]
fn equal_values_hash_equal_across_zero_signs_and_nan_patterns() -> Result<()> {
    let mp = MessagePackSerializer::default();
    let mut positive_zero = sample();
    positive_zero.value = 0.0;
    let negative_zero = sample(); // value: -0.0
    assert!(mp.deep_equal(&positive_zero, &negative_zero)?);
    assert_eq!(mp.deep_hash(&positive_zero)?, mp.deep_hash(&negative_zero)?);

    let mut other_nan = sample();
    other_nan.history[1] = f64::from_bits(0xfff8_0000_0000_1234);
    assert!(other_nan.history[1].is_nan());
    assert!(mp.deep_equal(&sample(), &other_nan)?);
    assert_eq!(mp.deep_hash(&sample())?, mp.deep_hash(&other_nan)?);
    Ok(())
}

#[test]
fn distinct_values_are_distinguished() -> Result<()> {
    let mp = MessagePackSerializer::default();
    let a = sample();
    let mut b = sample();
    b.history.push(0.0);
    assert!(!mp.deep_equal(&a, &b)?);
    assert_ne!(mp.deep_hash(&a)?, mp.deep_hash(&b)?);
    Ok(())
}

#[test]
fn option_states_are_distinguished() -> Result<()> {
    let mp = MessagePackSerializer::default();
    let some = sample();
    let mut none = sample();
    none.at = None;
    assert!(!mp.deep_equal(&some, &none)?);
    assert_ne!(mp.deep_hash(&some)?, mp.deep_hash(&none)?);
    Ok(())
}

#[test]
fn scalar_sequences_roundtrip_via_facade() -> Result<()> {
    let mp = MessagePackSerializer::default();
    let values: Vec<i64> = vec![0, 1, -1, 127, 128, -32, -33, 65535, -65536, i64::MAX, i64::MIN];
    let bytes = mp.serialize(&values)?;
    assert_eq!(mp.deserialize::<Vec<i64>>(&bytes)?, values);
    Ok(())
}

#[test]
fn fixed_arrays_roundtrip() -> Result<()> {
    let mp = MessagePackSerializer::default();
    let arr: [u16; 4] = [10, 20, 30, 40];
    let bytes = mp.serialize(&arr)?;
    assert_eq!(mp.deserialize::<[u16; 4]>(&bytes)?, arr);
    assert!(mp.deep_equal(&arr, &arr)?);
    Ok(())
}

#[test]
fn grids_roundtrip_in_both_formats() -> Result<()> {
    use shapepack::{Grid, MultiDimFormat, SerializerConfig};
    let grid = Grid(vec![vec![1u32, 2, 3], vec![4, 5, 6]]);

    let nested = MessagePackSerializer::default();
    let bytes = nested.serialize(&grid)?;
    assert_eq!(bytes[0], 0x92); // two rows
    assert_eq!(nested.deserialize::<Grid<u32>>(&bytes)?, grid);

    let flat = MessagePackSerializer::new(
        SerializerConfig::default().with_multi_dim_format(MultiDimFormat::Flattened),
    )?;
    let bytes = flat.serialize(&grid)?;
    assert_eq!(bytes[0], 0x97); // 1 header + 6 elements
    assert_eq!(flat.deserialize::<Grid<u32>>(&bytes)?, grid);
    Ok(())
}

#[test]
fn surrogate_shapes_roundtrip() -> Result<()> {
    // A type serialized through a string surrogate.
    #[derive(Clone, Debug, PartialEq)]
    struct Celsius(f64);
    impl Shaped for Celsius {
        fn shape() -> Shape<Self> {
            Shape::surrogate::<String>(
                |c: &Celsius| format!("{}C", c.0),
                |s| Celsius(s.trim_end_matches('C').parse().unwrap_or(0.0)),
            )
        }
    }
    let mp = MessagePackSerializer::default();
    let c = Celsius(21.5);
    let bytes = mp.serialize(&c)?;
    assert_eq!(bytes[0], 0xa5); // fixstr "21.5C"
    assert_eq!(mp.deserialize::<Celsius>(&bytes)?, c);
    assert!(mp.deep_equal(&c, &c.clone())?);
    Ok(())
}
