//! Fetching the GeoNames `cities500` dump.

use std::fs::File;
use std::io::{self, BufWriter};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;

use crate::error::{Error, Result};

pub const GEONAMES_URL: &str = "https://download.geonames.org/export/dump/cities500.zip";

/// Return `txt_path`, downloading and extracting the dump first if missing.
///
/// The archive is kept next to the text file so reruns skip the download.
pub async fn ensure_gazetteer(txt_path: &Path, url: &str) -> Result<PathBuf> {
    if txt_path.exists() {
        return Ok(txt_path.to_path_buf());
    }

    let zip_path = txt_path.with_extension("zip");
    if !zip_path.exists() {
        download(url, &zip_path).await?;
    }

    let txt = txt_path.to_path_buf();
    tokio::task::spawn_blocking(move || extract_dump(&zip_path, &txt))
        .await
        .map_err(|e| Error::unavailable("gazetteer", format!("extraction task failed: {}", e)))?
}

async fn download(url: &str, dest: &Path) -> Result<()> {
    info!("Downloading gazetteer from {}", url);

    let client = reqwest::Client::builder()
        .user_agent("placemend/0.1")
        .timeout(Duration::from_secs(600))
        .build()?;

    let response = client
        .get(url)
        .send()
        .await
        .map_err(|e| Error::unavailable("gazetteer", e.to_string()))?;
    if !response.status().is_success() {
        return Err(Error::unavailable(
            "gazetteer",
            format!("{} returned HTTP {}", url, response.status()),
        ));
    }

    let bytes = response
        .bytes()
        .await
        .map_err(|e| Error::unavailable("gazetteer", e.to_string()))?;

    if let Some(parent) = dest.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    // Partial downloads never carry the final name
    let partial = dest.with_extension("zip.part");
    tokio::fs::write(&partial, &bytes).await?;
    tokio::fs::rename(&partial, dest).await?;

    info!("  {:.1} MiB written to {}", bytes.len() as f64 / (1024.0 * 1024.0), dest.display());
    Ok(())
}

/// Extract the member named like `target`'s file name from `zip_path`
pub fn extract_dump(zip_path: &Path, target: &Path) -> Result<PathBuf> {
    let member = target
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| Error::config(format!("invalid gazetteer path {}", target.display())))?;

    info!("Extracting {} from {}", member, zip_path.display());

    let mut archive = zip::ZipArchive::new(File::open(zip_path)?)?;
    let mut entry = archive.by_name(member).map_err(|e| {
        Error::unavailable("gazetteer", format!("{} not found in {}: {}", member, zip_path.display(), e))
    })?;

    let mut out = BufWriter::new(File::create(target)?);
    io::copy(&mut entry, &mut out)?;
    Ok(target.to_path_buf())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use zip::write::SimpleFileOptions;
    use zip::CompressionMethod;

    fn write_zip(path: &Path, member: &str, content: &[u8]) {
        let mut writer = zip::ZipWriter::new(File::create(path).unwrap());
        let options = SimpleFileOptions::default().compression_method(CompressionMethod::Stored);
        writer.start_file(member, options).unwrap();
        writer.write_all(content).unwrap();
        writer.finish().unwrap();
    }

    #[test]
    fn test_extract_member() {
        let dir = tempfile::tempdir().unwrap();
        let zip_path = dir.path().join("cities500.zip");
        write_zip(&zip_path, "cities500.txt", b"hello\n");

        let target = dir.path().join("cities500.txt");
        let out = extract_dump(&zip_path, &target).unwrap();
        assert_eq!(std::fs::read(out).unwrap(), b"hello\n");
    }

    #[test]
    fn test_missing_member_is_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        let zip_path = dir.path().join("cities500.zip");
        write_zip(&zip_path, "readme.txt", b"nothing here");

        let err = extract_dump(&zip_path, &dir.path().join("cities500.txt")).unwrap_err();
        assert!(matches!(err, Error::ExternalSourceUnavailable { .. }));
    }

    #[tokio::test]
    async fn test_existing_dump_skips_download() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("cities500.txt");
        std::fs::write(&target, "x").unwrap();

        // Unroutable URL: must not be contacted
        let path = ensure_gazetteer(&target, "http://127.0.0.1:9/none.zip").await.unwrap();
        assert_eq!(path, target);
    }

    #[tokio::test]
    async fn test_cached_archive_is_extracted() {
        let dir = tempfile::tempdir().unwrap();
        write_zip(&dir.path().join("cities500.zip"), "cities500.txt", b"cached\n");

        let target = dir.path().join("cities500.txt");
        ensure_gazetteer(&target, "http://127.0.0.1:9/none.zip").await.unwrap();
        assert_eq!(std::fs::read_to_string(target).unwrap(), "cached\n");
    }
}
