//! Raw page archival
//!
//! Packs a run's raw pages into a zip, verifies the archive by re-reading
//! every entry and checking its hash against the run manifest, and only then
//! deletes the raw directory. A verification failure removes the bad archive
//! and leaves the raw pages exactly where they were.

use std::fs;
use std::io::{self, Read, Write};

use anyhow::{Context, Result, bail};
use hustings_bundle::{BundleLayout, RunId, RunManifest, RunStage};
use log::{info, warn};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

/// Archive `run`'s raw pages and delete them once the archive verifies.
///
/// Idempotent: a run already archived is a no-op. Requires the run to be
/// reduced first, since archival removes the reducer's input.
pub fn archive_run(layout: &BundleLayout, run: &RunId) -> Result<()> {
    let stage = RunStage::detect(layout, run);
    if stage >= RunStage::Archived {
        info!("run {run} already archived");
        return Ok(());
    }
    if stage < RunStage::Reduced {
        bail!("run {run} is {stage}, reduce it before archiving");
    }

    let manifest = RunManifest::read_from(&layout.manifest_path(run))?;
    let pages = layout.raw_page_paths(run)?;
    if pages.len() != manifest.page_hashes.len() {
        bail!(
            "run {run}: {} raw pages on disk but manifest records {}",
            pages.len(),
            manifest.page_hashes.len()
        );
    }

    let final_path = layout.archive_path(run);
    if let Some(parent) = final_path.parent() {
        fs::create_dir_all(parent).with_context(|| format!("cannot create {}", parent.display()))?;
    }
    let tmp_path = final_path.with_extension("zip.tmp");

    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
    let file = fs::File::create(&tmp_path)
        .with_context(|| format!("cannot create {}", tmp_path.display()))?;
    let mut writer = ZipWriter::new(file);
    for path in &pages {
        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .with_context(|| format!("bad page filename {}", path.display()))?;
        writer
            .start_file(name, options)
            .with_context(|| format!("cannot add {name} to archive"))?;
        let mut src = fs::File::open(path)
            .with_context(|| format!("cannot read {}", path.display()))?;
        io::copy(&mut src, &mut writer)
            .with_context(|| format!("cannot compress {name}"))?;
    }
    writer.finish().context("cannot finalize archive")?.flush()?;

    if let Err(e) = verify_archive(&tmp_path, &manifest) {
        warn!("run {run}: archive failed verification, keeping raw pages");
        fs::remove_file(&tmp_path)
            .with_context(|| format!("cannot remove bad archive {}", tmp_path.display()))?;
        return Err(e);
    }

    fs::rename(&tmp_path, &final_path)
        .with_context(|| format!("failed to rename {} into place", tmp_path.display()))?;

    // Raw deletion happens last, and only after the verified archive is in
    // its final location.
    let raw_dir = layout.run_raw_dir(run);
    fs::remove_dir_all(&raw_dir)
        .with_context(|| format!("cannot remove {}", raw_dir.display()))?;
    info!("run {run}: archived {} pages", pages.len());
    Ok(())
}

/// Re-read every archive entry and check it against the manifest hashes.
fn verify_archive(path: &std::path::Path, manifest: &RunManifest) -> Result<()> {
    let file =
        fs::File::open(path).with_context(|| format!("cannot open {}", path.display()))?;
    let mut archive = ZipArchive::new(file).context("archive is unreadable")?;
    if archive.len() != manifest.page_hashes.len() {
        bail!(
            "archive holds {} entries, manifest records {}",
            archive.len(),
            manifest.page_hashes.len()
        );
    }
    for i in 0..archive.len() {
        let mut entry = archive.by_index(i).context("archive entry is unreadable")?;
        let name = entry.name().to_string();
        let expected = manifest
            .page_hashes
            .get(&name)
            .with_context(|| format!("archive entry {name} is not in the manifest"))?;
        let mut bytes = Vec::with_capacity(entry.size() as usize);
        entry
            .read_to_end(&mut bytes)
            .with_context(|| format!("cannot decompress {name}"))?;
        let actual = blake3::hash(&bytes).to_hex().to_string();
        if &actual != expected {
            bail!("archive entry {name} does not match its recorded hash");
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn fixed_run() -> RunId {
        RunId::from_datetime(chrono::Utc.with_ymd_and_hms(2015, 2, 24, 12, 0, 0).unwrap())
    }

    /// Lay down a run that has been collected and reduced.
    fn reduced_run(layout: &BundleLayout, run: &RunId) {
        let raw = layout.run_raw_dir(run);
        std::fs::create_dir_all(&raw).unwrap();
        std::fs::write(raw.join("rahm_0000.json"), b"{\"posts\":[1]}").unwrap();
        std::fs::write(raw.join("rahm_0001.json"), b"{\"posts\":[2]}").unwrap();

        let mut manifest = RunManifest::new(*run);
        manifest.finished_at = Some(chrono::Utc::now());
        manifest.page_hashes = RunManifest::compute_page_hashes(layout, run).unwrap();
        manifest.write_to(&layout.manifest_path(run)).unwrap();

        std::fs::create_dir_all(layout.reduced_path(run).parent().unwrap()).unwrap();
        std::fs::write(layout.reduced_path(run), b"[{\"id\":1}]").unwrap();
    }

    #[test]
    fn archives_and_deletes_raw() {
        let dir = tempfile::tempdir().unwrap();
        let layout = BundleLayout::new(dir.path());
        let run = fixed_run();
        reduced_run(&layout, &run);

        archive_run(&layout, &run).unwrap();

        assert!(layout.archive_path(&run).exists());
        assert!(!layout.run_raw_dir(&run).exists());
        assert_eq!(RunStage::detect(&layout, &run), RunStage::Archived);

        // Archive round-trips the page bytes.
        let file = std::fs::File::open(layout.archive_path(&run)).unwrap();
        let mut archive = ZipArchive::new(file).unwrap();
        let mut entry = archive.by_name("rahm_0000.json").unwrap();
        let mut bytes = Vec::new();
        entry.read_to_end(&mut bytes).unwrap();
        assert_eq!(bytes, b"{\"posts\":[1]}");
    }

    #[test]
    fn idempotent_once_archived() {
        let dir = tempfile::tempdir().unwrap();
        let layout = BundleLayout::new(dir.path());
        let run = fixed_run();
        reduced_run(&layout, &run);

        archive_run(&layout, &run).unwrap();
        let first = std::fs::metadata(layout.archive_path(&run)).unwrap().modified().unwrap();
        archive_run(&layout, &run).unwrap();
        let second = std::fs::metadata(layout.archive_path(&run)).unwrap().modified().unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn refuses_unreduced_run() {
        let dir = tempfile::tempdir().unwrap();
        let layout = BundleLayout::new(dir.path());
        let run = fixed_run();
        let raw = layout.run_raw_dir(&run);
        std::fs::create_dir_all(&raw).unwrap();
        std::fs::write(raw.join("rahm_0000.json"), b"{}").unwrap();

        let err = archive_run(&layout, &run).unwrap_err();
        assert!(err.to_string().contains("reduce"));
        assert!(layout.run_raw_dir(&run).exists());
    }

    #[test]
    fn verification_failure_preserves_raw() {
        let dir = tempfile::tempdir().unwrap();
        let layout = BundleLayout::new(dir.path());
        let run = fixed_run();
        reduced_run(&layout, &run);

        // Corrupt the recorded hash so verification must fail.
        let mut manifest = RunManifest::read_from(&layout.manifest_path(&run)).unwrap();
        manifest
            .page_hashes
            .insert("rahm_0000.json".into(), "0".repeat(64));
        manifest.write_to(&layout.manifest_path(&run)).unwrap();

        let err = archive_run(&layout, &run).unwrap_err();
        assert!(err.to_string().contains("hash"));
        assert!(layout.run_raw_dir(&run).join("rahm_0000.json").exists());
        assert!(!layout.archive_path(&run).exists());
        // No stray tmp archive either.
        assert!(!layout.archive_path(&run).with_extension("zip.tmp").exists());
    }

    #[test]
    fn page_count_mismatch_is_refused() {
        let dir = tempfile::tempdir().unwrap();
        let layout = BundleLayout::new(dir.path());
        let run = fixed_run();
        reduced_run(&layout, &run);

        // A page appeared after the manifest was written.
        std::fs::write(layout.run_raw_dir(&run).join("zzz_0000.json"), b"{}").unwrap();
        let err = archive_run(&layout, &run).unwrap_err();
        assert!(err.to_string().contains("manifest records"));
        assert!(layout.run_raw_dir(&run).exists());
    }
}
