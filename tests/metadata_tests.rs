mod common;

use cloudsync_decrypt::format::tlv::{TlvDecoder, TlvKey, TlvMap, TlvValue};
use cloudsync_decrypt::metadata::{MetadataExtractor, ParsedMetadata, extract_metadata};
use cloudsync_decrypt::{CloudSyncError, SchemaError};

use common::{tlv_bytes, tlv_int, tlv_map, tlv_str};

fn extract(stream: &[Vec<u8>]) -> Result<ParsedMetadata, CloudSyncError> {
    let data: Vec<u8> = stream.concat();
    extract_metadata(TlvDecoder::new(&data))
}

fn metadata(fields: &[(Vec<u8>, Vec<u8>)]) -> Vec<u8> {
    let mut entries = vec![(tlv_str("type"), tlv_str("metadata"))];
    entries.extend_from_slice(fields);
    tlv_map(&entries)
}

fn data(value: Vec<u8>) -> Vec<u8> {
    tlv_map(&[(tlv_str("type"), tlv_str("data")), (tlv_str("data"), value)])
}

fn assert_wrong_type(result: Result<ParsedMetadata, CloudSyncError>, expected_field: &str) {
    match result {
        Err(CloudSyncError::Schema(SchemaError::WrongType { field, .. })) => {
            assert_eq!(field, expected_field)
        }
        other => panic!("expected WrongType for {expected_field}, got {other:?}"),
    }
}

#[test]
fn extracts_all_metadata_fields() {
    let parsed = extract(&[metadata(&[
        (tlv_str("enc_key1"), tlv_str("QUJD")),
        (tlv_str("salt"), tlv_bytes(b"\x00\x01salt")),
        (tlv_str("compress"), tlv_int(1)),
        (tlv_str("file_md5"), tlv_str("d41d8cd98f00b204e9800998ecf8427e")),
        (tlv_str("version"), tlv_int(3)),
    ])])
    .unwrap();

    assert_eq!(parsed.encrypted_session_key.as_deref(), Some("QUJD"));
    assert_eq!(parsed.salt.as_deref(), Some(&b"\x00\x01salt"[..]));
    assert_eq!(parsed.compress_flag, 1);
    assert!(parsed.is_compressed());
    assert_eq!(
        parsed.expected_md5.as_deref(),
        Some("d41d8cd98f00b204e9800998ecf8427e")
    );
    assert!(parsed.ciphertext_chunks.is_empty());
}

#[test]
fn defaults_when_fields_are_missing() {
    let parsed = extract(&[metadata(&[])]).unwrap();

    assert!(parsed.encrypted_session_key.is_none());
    assert!(parsed.salt.is_none());
    assert_eq!(parsed.compress_flag, 0);
    assert!(parsed.expected_md5.is_none());
}

#[test]
fn salt_string_is_converted_latin1() {
    let parsed = extract(&[metadata(&[(tlv_str("salt"), tlv_str("ab\u{e9}"))])]).unwrap();
    assert_eq!(parsed.salt, Some(vec![b'a', b'b', 0xe9]));
}

#[test]
fn salt_outside_latin1_is_rejected() {
    let err = extract(&[metadata(&[(tlv_str("salt"), tlv_str("\u{4e2d}"))])]).unwrap_err();
    assert!(matches!(
        err,
        CloudSyncError::Schema(SchemaError::NotLatin1 { field: "salt" })
    ));
}

#[test]
fn rejects_wrongly_typed_fields() {
    assert_wrong_type(
        extract(&[metadata(&[(tlv_str("enc_key1"), tlv_bytes(b"QUJD"))])]),
        "enc_key1",
    );
    assert_wrong_type(
        extract(&[metadata(&[(tlv_str("salt"), tlv_int(5))])]),
        "salt",
    );
    assert_wrong_type(
        extract(&[metadata(&[(tlv_str("compress"), tlv_str("1"))])]),
        "compress",
    );
    assert_wrong_type(
        extract(&[metadata(&[(tlv_str("file_md5"), tlv_bytes(b"abc"))])]),
        "file_md5",
    );
    assert_wrong_type(extract(&[data(tlv_str("not bytes"))]), "data chunk");
}

#[test]
fn present_but_absent_field_is_a_type_error() {
    let mut stream = vec![0x42];
    stream.extend(tlv_str("type"));
    stream.extend(tlv_str("metadata"));
    stream.extend(tlv_str("enc_key1"));
    stream.push(0x40);

    assert_wrong_type(extract(&[stream]), "enc_key1");
}

#[test]
fn empty_data_is_skipped() {
    let parsed = extract(&[
        data(tlv_bytes(b"")),
        data(tlv_str("")),
        data(tlv_int(0)),
        tlv_map(&[(tlv_str("type"), tlv_str("data"))]),
    ])
    .unwrap();

    assert!(parsed.ciphertext_chunks.is_empty());
}

#[test]
fn chunks_keep_stream_order() {
    let parsed = extract(&[
        data(tlv_bytes(b"first")),
        metadata(&[(tlv_str("compress"), tlv_int(0))]),
        data(tlv_bytes(b"second")),
        data(tlv_bytes(b"third")),
    ])
    .unwrap();

    assert_eq!(
        parsed.ciphertext_chunks,
        vec![b"first".to_vec(), b"second".to_vec(), b"third".to_vec()]
    );
}

#[test]
fn ignores_unknown_and_untyped_objects() {
    let parsed = extract(&[
        tlv_map(&[(tlv_str("type"), tlv_str("thumbnail")), (tlv_str("data"), tlv_int(7))]),
        tlv_map(&[(tlv_str("data"), tlv_str("no type"))]),
        tlv_map(&[(tlv_bytes(b"type"), tlv_str("data")), (tlv_str("data"), tlv_int(7))]),
        tlv_map(&[(tlv_str("type"), tlv_int(1))]),
        tlv_str("top-level string"),
        data(tlv_bytes(b"kept")),
    ])
    .unwrap();

    assert_eq!(parsed.ciphertext_chunks, vec![b"kept".to_vec()]);
}

#[test]
fn later_metadata_overrides_earlier() {
    let parsed = extract(&[
        metadata(&[(tlv_str("compress"), tlv_int(1)), (tlv_str("file_md5"), tlv_str("aa"))]),
        metadata(&[(tlv_str("compress"), tlv_int(0)), (tlv_str("file_md5"), tlv_str(""))]),
    ])
    .unwrap();

    assert_eq!(parsed.compress_flag, 0);
    // 空 file_md5 视为未提供
    assert!(parsed.expected_md5.is_none());
}

#[test]
fn extractor_accepts_values_built_in_memory() {
    let mut map = TlvMap::new();
    map.insert(TlvKey::from("type"), TlvValue::String("data".into()));
    map.insert(TlvKey::from("data"), TlvValue::Bytes(vec![1, 2, 3]));

    let mut extractor = MetadataExtractor::new();
    extractor.ingest(TlvValue::Map(map)).unwrap();
    extractor.ingest(TlvValue::Bytes(vec![9])).unwrap();
    assert_eq!(extractor.objects_seen(), 2);

    let parsed = extractor.finish();
    assert_eq!(parsed.ciphertext_chunks, vec![vec![1, 2, 3]]);
}
