//! Enum converters: by-ordinal and by-name modes
// (c) 2025 Ross Younger
//!
//! By-ordinal (the default) writes the underlying integer directly.
//! By-name writes the declared name as a string. Readers are tolerant in
//! both modes: an integer token is accepted even when names are expected
//! (old data), and a name is accepted even in ordinal mode. Name matching
//! is case-insensitive over a table indexed at build time; when two names
//! collide case-insensitively the first declared wins.

use std::collections::HashMap;
use std::sync::Arc;

use crate::codec::{Reader, TokenKind, Writer};
use crate::context::Context;
use crate::convert::registry::Generation;
use crate::convert::Converter;
use crate::error::{Error, Result};
use crate::shape::{EnumShape, Shaped};

pub(crate) fn build<T: Shaped>(
    shape: Arc<EnumShape<T>>,
    gen: &mut Generation<'_>,
) -> Result<Arc<dyn Converter<T>>> {
    let mut by_lower_name: HashMap<String, i64> = HashMap::new();
    let mut name_of: HashMap<i64, &'static str> = HashMap::new();
    for &(ordinal, name) in &shape.entries {
        // first declared wins on both tables
        let _ = by_lower_name.entry(name.to_lowercase()).or_insert(ordinal);
        let _ = name_of.entry(ordinal).or_insert(name);
    }
    Ok(Arc::new(EnumConverter {
        shape,
        by_name: gen.config().enum_by_name,
        by_lower_name,
        name_of,
    }))
}

pub(crate) struct EnumConverter<T: 'static> {
    shape: Arc<EnumShape<T>>,
    by_name: bool,
    by_lower_name: HashMap<String, i64>,
    name_of: HashMap<i64, &'static str>,
}

impl<T: Send + Sync> Converter<T> for EnumConverter<T> {
    fn write(&self, writer: &mut Writer, value: &T, _cx: &mut Context) -> Result<()> {
        let ordinal = (self.shape.to_ordinal)(value);
        if self.by_name {
            if let Some(name) = self.name_of.get(&ordinal) {
                return writer.write_str(name);
            }
            // Unnamed member; the integer form keeps it round-trippable.
        }
        writer.write_int(ordinal);
        Ok(())
    }

    fn read(&self, reader: &mut Reader<'_>, _cx: &mut Context) -> Result<T> {
        let start = reader.position();
        let ordinal = match reader.peek_kind()? {
            TokenKind::String => {
                let name = reader.read_str()?;
                self.by_lower_name
                    .get(&name.to_lowercase())
                    .copied()
                    .ok_or_else(|| {
                        Error::overflow(
                            start,
                            format!("'{name}' is not a member of {}", self.shape.type_name),
                        )
                    })?
            }
            TokenKind::Integer => reader.read_i64()?,
            _ => {
                return Err(Error::malformed(
                    start,
                    "expected an enum name or underlying integer",
                ))
            }
        };
        (self.shape.from_ordinal)(ordinal).ok_or_else(|| {
            Error::overflow(
                start,
                format!("{ordinal} is not a member of {}", self.shape.type_name),
            )
        })
    }
}

#[cfg(test)]
mod tests {
    use crate::config::SerializerConfig;
    use crate::context::Context;
    use crate::codec::{Reader, Writer};
    use crate::convert::ConverterRegistry;
    use crate::error::{ErrorKind, Result};
    use crate::shape::{EnumShape, Shape, Shaped};
    use pretty_assertions::assert_eq;

    #[derive(Clone, Copy, Debug, PartialEq, strum_macros::FromRepr)]
    enum Suit {
        Clubs = 0,
        Diamonds = 1,
        Hearts = 2,
        Spades = 3,
    }

    impl Shaped for Suit {
        fn shape() -> Shape<Self> {
            EnumShape::new(
                "Suit",
                |s: &Suit| *s as i64,
                |ord| usize::try_from(ord).ok().and_then(Suit::from_repr),
            )
            .with_entry(0, "Clubs")
            .with_entry(1, "Diamonds")
            .with_entry(2, "Hearts")
            .with_entry(3, "Spades")
            .into_shape()
        }
    }

    fn roundtrip(registry: &ConverterRegistry, value: Suit) -> Result<(Vec<u8>, Suit)> {
        let conv = registry.converter_for::<Suit>()?;
        let mut w = Writer::new();
        conv.write(&mut w, &value, &mut Context::new(8))?;
        let bytes = w.into_vec();
        let decoded = conv.read(&mut Reader::new(&bytes), &mut Context::new(8))?;
        Ok((bytes, decoded))
    }

    #[test]
    fn ordinal_mode() -> Result<()> {
        let registry = ConverterRegistry::new(SerializerConfig::default());
        let (bytes, decoded) = roundtrip(&registry, Suit::Hearts)?;
        assert_eq!(bytes, [0x02]);
        assert_eq!(decoded, Suit::Hearts);
        Ok(())
    }

    #[test]
    fn name_mode() -> Result<()> {
        let registry =
            ConverterRegistry::new(SerializerConfig::default().with_enum_by_name(true));
        let (bytes, decoded) = roundtrip(&registry, Suit::Spades)?;
        assert_eq!(bytes[0], 0xa6); // fixstr "Spades"
        assert_eq!(decoded, Suit::Spades);
        Ok(())
    }

    #[test]
    fn name_matching_is_case_insensitive() -> Result<()> {
        let registry = ConverterRegistry::new(SerializerConfig::default());
        let conv = registry.converter_for::<Suit>()?;
        let mut w = Writer::new();
        w.write_str("hEaRtS")?;
        let bytes = w.into_vec();
        let decoded = conv.read(&mut Reader::new(&bytes), &mut Context::new(8))?;
        assert_eq!(decoded, Suit::Hearts);
        Ok(())
    }

    #[test]
    fn integer_fallback_in_name_mode() -> Result<()> {
        let registry =
            ConverterRegistry::new(SerializerConfig::default().with_enum_by_name(true));
        let conv = registry.converter_for::<Suit>()?;
        let decoded = conv.read(&mut Reader::new(&[0x01]), &mut Context::new(8))?;
        assert_eq!(decoded, Suit::Diamonds);
        Ok(())
    }

    #[test]
    fn unknown_members_overflow() -> Result<()> {
        let registry = ConverterRegistry::new(SerializerConfig::default());
        let conv = registry.converter_for::<Suit>()?;
        let err = conv
            .read(&mut Reader::new(&[0x63]), &mut Context::new(8))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Overflow);

        let mut w = Writer::new();
        w.write_str("Cups")?;
        let bytes = w.into_vec();
        let err = conv
            .read(&mut Reader::new(&bytes), &mut Context::new(8))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Overflow);
        Ok(())
    }
}
