//! File round trips through the framed container.

use config_rules::config::ContainerOptions;
use config_rules::container::{pack, unpack, PayloadKind, HEADER_LEN};
use config_rules::{compile, decompile, find_version, CompiledRules, ContainerError};
use std::fs;
use tempfile::TempDir;

const SOURCE: &str = "// version:5\nset:(Profile=\"low\")\n";

#[test]
fn test_compiled_file_round_trip() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("rules.bin");

    let bytes = compile(SOURCE, false).unwrap();
    let rules = CompiledRules::from_bytes(&bytes).unwrap();
    let framed = pack(
        &bytes,
        PayloadKind::Compiled,
        i32::from(rules.rule_version),
        None,
        &ContainerOptions::default(),
    )
    .unwrap();
    fs::write(&path, &framed).unwrap();

    let unpacked = unpack(&fs::read(&path).unwrap(), None).unwrap();
    assert_eq!(unpacked.kind, PayloadKind::Compiled);
    assert_eq!(unpacked.rule_version, 5);
    assert_eq!(unpacked.data, bytes);
    assert!(decompile(&unpacked.data, false).unwrap().contains("set:(Profile=\"low\")"));
}

#[test]
fn test_encrypted_raw_text_round_trip() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("rules.txt.bin");

    let version = find_version(SOURCE).unwrap();
    let framed = pack(
        SOURCE.as_bytes(),
        PayloadKind::Text,
        i32::from(version),
        Some("correct horse"),
        &ContainerOptions {
            compression_level: 9,
        },
    )
    .unwrap();
    fs::write(&path, &framed).unwrap();
    let stored = fs::read(&path).unwrap();

    assert!(!stored.windows(7).any(|w| w == b"Profile"));

    let unpacked = unpack(&stored, Some("correct horse")).unwrap();
    assert_eq!(unpacked.kind, PayloadKind::Text);
    assert_eq!(unpacked.rule_version, 5);
    assert_eq!(String::from_utf8(unpacked.data).unwrap(), SOURCE);

    assert_eq!(
        unpack(&stored, Some("battery staple")),
        Err(ContainerError::Decryption)
    );
}

#[test]
fn test_truncated_file() {
    let framed = pack(
        b"some rule text",
        PayloadKind::Text,
        1,
        None,
        &ContainerOptions::default(),
    )
    .unwrap();
    let cut = &framed[..HEADER_LEN + 3];
    assert!(matches!(
        unpack(cut, None),
        Err(ContainerError::Decompression(_) | ContainerError::SizeMismatch { .. })
    ));
}
