//! Shared fixtures for loader integration tests

#![allow(dead_code)]

use ed25519_dalek::{Signer, SigningKey};
use raya_loader::patch::from_fn;
use raya_loader::{
    BytePatcher, MemoryLocator, Resource, ResourceLocator, SearchPath, SearchPathEntry,
    UnitArchive,
};
use std::io::{self, Cursor, Write};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use url::Url;
use zip::write::SimpleFileOptions;
use zip::ZipWriter;

pub use raya_loader::format::encode_unit;

/// Locator wrapper that counts `locate` calls
pub struct CountingLocator<L> {
    inner: L,
    calls: AtomicUsize,
}

impl<L: ResourceLocator> CountingLocator<L> {
    pub fn new(inner: L) -> Self {
        Self {
            inner,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn inner(&self) -> &L {
        &self.inner
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl<L: ResourceLocator> ResourceLocator for CountingLocator<L> {
    fn locate(&self, path: &str) -> io::Result<Option<Resource>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.inner.locate(path)
    }
}

pub fn counting_memory() -> Arc<CountingLocator<MemoryLocator>> {
    Arc::new(CountingLocator::new(MemoryLocator::new()))
}

/// Patch that appends `byte` and counts its invocations
pub fn appending_patch(name: &str, byte: u8) -> (Arc<dyn BytePatcher>, Arc<AtomicUsize>) {
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = calls.clone();
    let patch = from_fn(name, move |_, _, mut bytes| {
        counter.fetch_add(1, Ordering::SeqCst);
        bytes.push(byte);
        Ok(bytes)
    });
    (patch, calls)
}

pub fn signing_key(seed: u8) -> SigningKey {
    SigningKey::from_bytes(&[seed; 32])
}

/// One `[[signature]]` record of a `raya.sig` table
pub fn signature_record(entry: &str, signer: &str, key: &SigningKey, data: &[u8]) -> String {
    format!(
        "[[signature]]\nentry = \"{}\"\nsigner = \"{}\"\npublic-key = \"{}\"\nsignature = \"{}\"\n\n",
        entry,
        signer,
        hex::encode(key.verifying_key().as_bytes()),
        hex::encode(key.sign(data).to_bytes()),
    )
}

pub fn zip_bytes(entries: &[(&str, Vec<u8>)]) -> Vec<u8> {
    let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
    for (name, data) in entries {
        zip.start_file(*name, SimpleFileOptions::default()).unwrap();
        zip.write_all(data).unwrap();
    }
    zip.finish().unwrap().into_inner()
}

pub fn origin(name: &str) -> Url {
    Url::parse(&format!("file:///opt/units/{}.rya", name)).unwrap()
}

/// In-memory unit archive named `name`
pub fn archive(name: &str, entries: &[(&str, Vec<u8>)]) -> Arc<UnitArchive> {
    Arc::new(UnitArchive::from_bytes(origin(name), zip_bytes(entries)).unwrap())
}

pub fn archive_path(archives: &[Arc<UnitArchive>]) -> Arc<SearchPath> {
    Arc::new(SearchPath::new(
        archives
            .iter()
            .cloned()
            .map(SearchPathEntry::Archive)
            .collect(),
    ))
}
