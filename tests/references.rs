//! Reference preservation behaviors
// (c) 2025 Ross Younger

use pretty_assertions::assert_eq;
use shapepack::{ErrorKind, MessagePackSerializer, Result, SerializerConfig, Writer};
use std::sync::Arc;

fn preserving() -> Result<MessagePackSerializer> {
    MessagePackSerializer::new(SerializerConfig::default().with_preserve_references(true))
}

#[test]
fn repeated_references_deduplicate_on_the_wire() -> Result<()> {
    let shared: Arc<String> = Arc::new("a rather long shared string value".to_string());
    let value: Vec<Arc<String>> = vec![Arc::clone(&shared), Arc::clone(&shared), shared];

    let plain = MessagePackSerializer::default();
    let preserving = preserving()?;
    let plain_bytes = plain.serialize(&value)?;
    let preserved_bytes = preserving.serialize(&value)?;
    // Two of the three occurrences collapse to small back-references.
    assert!(preserved_bytes.len() < plain_bytes.len());

    let decoded: Vec<Arc<String>> = preserving.deserialize(&preserved_bytes)?;
    assert_eq!(decoded.len(), 3);
    assert_eq!(*decoded[0], *decoded[1]);
    assert!(Arc::ptr_eq(&decoded[0], &decoded[1]));
    assert!(Arc::ptr_eq(&decoded[0], &decoded[2]));
    assert!(preserving.deep_equal(&value, &decoded)?);
    Ok(())
}

#[test]
fn distinct_references_stay_distinct() -> Result<()> {
    let preserving = preserving()?;
    let value: Vec<Arc<String>> = vec![
        Arc::new("one".to_string()),
        Arc::new("two".to_string()),
    ];
    let decoded: Vec<Arc<String>> = preserving.deserialize(&preserving.serialize(&value)?)?;
    assert!(!Arc::ptr_eq(&decoded[0], &decoded[1]));
    assert_eq!(*decoded[0], "one");
    assert_eq!(*decoded[1], "two");
    Ok(())
}

#[test]
fn plain_data_decodes_under_a_preserving_reader() -> Result<()> {
    // Data written WITHOUT preservation decodes under a preserving reader.
    let plain = MessagePackSerializer::default();
    let preserving = preserving()?;
    let value: Arc<String> = Arc::new("portable".to_string());
    let bytes = plain.serialize(&value)?;
    let decoded: Arc<String> = preserving.deserialize(&bytes)?;
    assert_eq!(*decoded, "portable");
    Ok(())
}

#[test]
fn unresolved_back_reference_reports_a_cycle() -> Result<()> {
    let preserving = preserving()?;
    // A back-reference to identity 0 with no prior first occurrence.
    let mut w = Writer::new();
    w.write_ext(121, &0u32.to_be_bytes())?;
    let err = preserving
        .deserialize::<Arc<String>>(&w.into_vec())
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::CyclicGraph);
    Ok(())
}

#[test]
fn extension_codes_are_remappable() -> Result<()> {
    use shapepack::ExtensionCodes;
    let custom = MessagePackSerializer::new(
        SerializerConfig::default()
            .with_preserve_references(true)
            .with_extension_codes(ExtensionCodes {
                reference_id: 40,
                back_reference: 41,
            }),
    )?;
    let shared: Arc<String> = Arc::new("x".to_string());
    let value: Vec<Arc<String>> = vec![Arc::clone(&shared), shared];
    let bytes = custom.serialize(&value)?;
    // fixext4 with type 41 marks the back-reference.
    let tail = &bytes[bytes.len() - 6..];
    assert_eq!(tail[0], 0xd6);
    assert_eq!(tail[1] as i8, 41);
    let decoded: Vec<Arc<String>> = custom.deserialize(&bytes)?;
    assert!(Arc::ptr_eq(&decoded[0], &decoded[1]));
    Ok(())
}
