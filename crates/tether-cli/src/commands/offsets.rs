//! Offset table management.

use std::path::Path;

use anyhow::{Result, bail};
use tether::{OffsetTable, save_offsets};

/// Write the template table to `path`.
pub fn run(path: &Path, force: bool) -> Result<()> {
    if path.exists() && !force {
        bail!("{} already exists (use --force to overwrite)", path.display());
    }
    save_offsets(path, &OffsetTable::template())?;
    println!("Wrote template offset table to {}", path.display());
    println!("Fill in the offsets for your target build before running `tether run`.");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_init_refuses_to_overwrite() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("offsets.json");

        run(&path, false).unwrap();
        let table = tether::load_offsets(&path).unwrap();
        assert_eq!(table, OffsetTable::template());

        assert!(run(&path, false).is_err());
        run(&path, true).unwrap();
    }
}
