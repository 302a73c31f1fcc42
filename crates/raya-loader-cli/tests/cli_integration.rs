//! Integration tests for the raya-loader CLI commands.
//!
//! Exercises the command functions behind `raya-loader resolve` and
//! `raya-loader raw` against real loaders.

use ed25519_dalek::{Signer, SigningKey};
use raya_loader::format::encode_unit;
use raya_loader::{MemoryLocator, TransformingLoader, UnitTable};
use raya_loader_cli::commands::{raw, resolve};
use raya_loader_cli::setup::LoaderOptions;
use std::io::{Cursor, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::TempDir;
use termcolor::ColorChoice;
use zip::write::SimpleFileOptions;
use zip::ZipWriter;

fn signature_record(entry: &str, signer: &str, key: &SigningKey, data: &[u8]) -> String {
    format!(
        "[[signature]]\nentry = \"{}\"\nsigner = \"{}\"\npublic-key = \"{}\"\nsignature = \"{}\"\n\n",
        entry,
        signer,
        hex::encode(key.verifying_key().as_bytes()),
        hex::encode(key.sign(data).to_bytes()),
    )
}

/// Write a unit archive holding `a/b/Signed.ryb`, signed by two keys.
fn write_signed_archive(dir: &Path) -> PathBuf {
    let raw = encode_unit(0, b"signed");
    let release = SigningKey::from_bytes(&[1; 32]);
    let audit = SigningKey::from_bytes(&[2; 32]);
    let sig = format!(
        "{}{}",
        signature_record("a/b/Signed.ryb", "release", &release, &raw),
        signature_record("a/b/Signed.ryb", "audit", &audit, &raw),
    );
    let manifest = "[package]\nname = \"widgets\"\nversion = \"1.0.0\"\n";

    let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
    for (name, data) in [
        ("a/b/Signed.ryb", raw),
        ("raya.toml", manifest.as_bytes().to_vec()),
        ("raya.sig", sig.into_bytes()),
    ] {
        zip.start_file(name, SimpleFileOptions::default()).unwrap();
        zip.write_all(&data).unwrap();
    }
    let bytes = zip.finish().unwrap().into_inner();

    let path = dir.join("widgets.rya");
    std::fs::write(&path, bytes).unwrap();
    path
}

fn names(names: &[&str]) -> Vec<String> {
    names.iter().map(|n| n.to_string()).collect()
}

// ────────────────────────────────────────────────────────────────────────────
// resolve
// ────────────────────────────────────────────────────────────────────────────

#[test]
fn test_resolve_json_reports_signed_archive_unit() {
    let dir = TempDir::new().unwrap();
    let archive = write_signed_archive(dir.path());
    let options = LoaderOptions {
        config: None,
        paths: vec![archive],
    };
    let (loader, _) = options.build().unwrap();

    let reports = resolve::reports(&loader, &names(&["a.b.Signed", "a.b.Missing"]));
    let json: serde_json::Value =
        serde_json::from_str(&resolve::render_json(&reports).unwrap()).unwrap();

    let signed = &json[0];
    assert_eq!(signed["name"], "a.b.Signed");
    let digest = signed["digest"].as_str().unwrap();
    assert_eq!(digest.len(), 64);
    assert!(digest.chars().all(|c| c.is_ascii_hexdigit()));
    assert!(signed["origin"].as_str().unwrap().ends_with("widgets.rya"));
    assert_eq!(signed["signers"], serde_json::json!(["release", "audit"]));
    assert!(signed.get("error").is_none());

    let missing = &json[1];
    assert_eq!(missing["error"]["kind"], "ResourceNotFound");
    assert!(missing.get("digest").is_none());
}

#[test]
fn test_resolve_returns_false_when_a_name_fails() {
    let dir = TempDir::new().unwrap();
    let options = LoaderOptions {
        config: None,
        paths: vec![write_signed_archive(dir.path())],
    };

    let ok = resolve::execute(&options, &names(&["a.b.Signed"]), true, ColorChoice::Never);
    assert!(ok.unwrap());

    let ok = resolve::execute(
        &options,
        &names(&["a.b.Signed", "a.b.Missing"]),
        true,
        ColorChoice::Never,
    );
    assert!(!ok.unwrap());
}

#[test]
fn test_poisoned_report_names_the_original_failure() {
    let units = Arc::new(MemoryLocator::new());
    let runtime = Arc::new(UnitTable::new(Arc::new(MemoryLocator::new())));
    let loader = TransformingLoader::new(units, runtime);

    let first = loader.resolve("app.Gone");
    let second = loader.resolve("app.Gone");
    assert_eq!(second.as_ref().unwrap_err().kind(), raya_loader::ErrorKind::Poisoned);

    for result in [&first, &second] {
        let report = resolve::UnitReport::from_result("app.Gone", result);
        let error = report.error.expect("failed lookups carry an error");
        assert_eq!(error.kind, "ResourceNotFound");
    }
}

// ────────────────────────────────────────────────────────────────────────────
// raw
// ────────────────────────────────────────────────────────────────────────────

#[test]
fn test_raw_host_reads_through_host_runtime() {
    let units = Arc::new(MemoryLocator::new());
    let native = Arc::new(MemoryLocator::new());
    units.insert("app/Main.ryb", b"loader".to_vec());
    native.insert("app/Main.ryb", b"host".to_vec());
    let loader = TransformingLoader::new(units, Arc::new(UnitTable::new(native)));

    assert_eq!(raw::read(&loader, "app.Main", true).unwrap(), b"host");
    assert_eq!(raw::read(&loader, "app.Main", false).unwrap(), b"loader");
    assert!(raw::read(&loader, "app.Other", true).is_err());
    assert_eq!(loader.stats().total(), 0);
}
