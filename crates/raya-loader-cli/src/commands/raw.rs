//! `raya-loader raw`: Inspect a unit's untransformed bytes.

use crate::setup::LoaderOptions;
use raya_loader::{PatchContext, TransformingLoader};
use sha2::{Digest, Sha256};

/// Untransformed bytes of `name`, from the loader's search path or, with
/// `host`, from the host runtime's.
pub fn read(loader: &TransformingLoader, name: &str, host: bool) -> anyhow::Result<Vec<u8>> {
    let bytes = if host {
        loader.read_classpath_resource(name)?
    } else {
        loader.read_raw_bytes(name)?
    };
    bytes.ok_or_else(|| anyhow::anyhow!("No resource found for {}", name))
}

pub fn execute(options: &LoaderOptions, name: &str, host: bool) -> anyhow::Result<()> {
    let (loader, _) = options.build()?;
    let bytes = read(&loader, name, host)?;

    println!("Unit:    {}", name);
    println!("Size:    {} bytes", bytes.len());
    println!("SHA-256: {}", hex::encode(Sha256::digest(&bytes)));
    Ok(())
}
