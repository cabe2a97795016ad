use std::path::PathBuf;
use std::time::{SystemTime, UNIX_EPOCH};

use tabload::ImportError;
use tabload::ingestion::EncodingResolver;
use tabload::types::{SourceFormat, TextEncoding};

fn tmp_file(name: &str, contents: &[u8]) -> PathBuf {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_nanos();
    let path = std::env::temp_dir().join(format!("tabload-encoding-{name}-{nanos}.csv"));
    std::fs::write(&path, contents).unwrap();
    path
}

fn latin1(s: &str) -> Vec<u8> {
    s.chars().map(|c| u8::try_from(u32::from(c)).unwrap()).collect()
}

#[test]
fn latin1_semicolon_file_falls_through_utf8() {
    let path = tmp_file(
        "latin1",
        &latin1("codigo;descricao\n1;MAÇÃ VERDE\n2;CAFÉ, TORRADO\n"),
    );

    let resolution = EncodingResolver::new(&TextEncoding::CASCADE, None, 10_000)
        .resolve(&path)
        .unwrap();

    let src = &resolution.descriptor;
    assert_eq!(src.format(), SourceFormat::DelimitedText);
    assert_eq!(src.encoding(), Some(TextEncoding::Latin1));
    assert_eq!(src.dialect().unwrap().delimiter, b';');
    assert!(!resolution.permissive);

    let tried: Vec<_> = resolution.attempts.iter().map(|a| a.encoding).collect();
    assert_eq!(tried, [TextEncoding::Utf8, TextEncoding::Latin1]);
    assert!(resolution.attempts[0].error.as_deref().unwrap().contains("utf-8"));
    assert!(resolution.attempts[1].error.is_none());

    let _ = std::fs::remove_file(&path);
}

#[test]
fn utf8_file_is_adopted_on_first_probe() {
    let path = tmp_file("utf8", "id,descricao\n1,cadeira giratória\n".as_bytes());

    let resolution = EncodingResolver::new(&TextEncoding::CASCADE, None, 10_000)
        .resolve(&path)
        .unwrap();
    assert_eq!(resolution.descriptor.encoding(), Some(TextEncoding::Utf8));
    assert_eq!(resolution.descriptor.dialect().unwrap().delimiter, b',');
    assert_eq!(resolution.attempts.len(), 1);

    let _ = std::fs::remove_file(&path);
}

#[test]
fn candidates_are_tried_in_the_given_order() {
    let path = tmp_file("order", &latin1("id,descricao\n1,AÇÚCAR\n"));

    let order = [TextEncoding::Utf8, TextEncoding::Windows1252, TextEncoding::Latin1];
    let resolution = EncodingResolver::new(&order, None, 10_000)
        .resolve(&path)
        .unwrap();
    assert_eq!(resolution.descriptor.encoding(), Some(TextEncoding::Windows1252));

    let _ = std::fs::remove_file(&path);
}

#[test]
fn explicit_delimiter_skips_sniffing() {
    // More semicolons than commas, but the caller knows better.
    let path = tmp_file("explicit", b"id,nota\n1,a;b;c\n2,d;e\n");

    let resolution = EncodingResolver::new(&TextEncoding::CASCADE, Some(b','), 10_000)
        .resolve(&path)
        .unwrap();
    assert_eq!(resolution.descriptor.dialect().unwrap().delimiter, b',');

    let _ = std::fs::remove_file(&path);
}

#[test]
fn exhausted_candidates_fall_back_to_permissive_latin1() {
    let path = tmp_file("permissive", &latin1("id;descricao\n1;FEIJÃO\n"));

    let resolution = EncodingResolver::new(&[TextEncoding::Utf8], None, 10_000)
        .resolve(&path)
        .unwrap();
    assert!(resolution.permissive);
    let dialect = resolution.descriptor.dialect().unwrap();
    assert_eq!(resolution.descriptor.encoding(), Some(TextEncoding::Latin1));
    assert!(!dialect.quoting);
    assert_eq!(dialect.escape, Some(b'\\'));

    let _ = std::fs::remove_file(&path);
}

#[test]
fn empty_file_exhausts_every_encoding() {
    let path = tmp_file("empty", b"");

    let err = EncodingResolver::new(&TextEncoding::CASCADE, None, 10_000)
        .resolve(&path)
        .unwrap_err();
    match err {
        ImportError::EncodingExhausted { attempts, .. } => {
            // Four candidates plus the permissive fallback.
            assert_eq!(attempts.len(), 5);
            assert!(attempts[4].contains("permissive"));
        }
        other => panic!("unexpected error: {other}"),
    }

    let _ = std::fs::remove_file(&path);
}
