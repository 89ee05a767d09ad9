use anyhow::{anyhow, Context};
use chrono::Utc;
use rusqlite::Connection;
use serde::Serialize;
use serde_json::json;
use std::fs::File;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use zip::write::FileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

use crate::db::DB_FILE_NAME;

const MANIFEST_ENTRY: &str = "manifest.json";
const DB_ENTRY: &str = "db/erp.sqlite3";
pub const BUNDLE_FORMAT: &str = "erpd-backup-v1";
const BUNDLE_EXT: &str = "zip";

/// Tables whose row counts are recorded in the manifest.
const COUNTED_TABLES: &[&str] = &[
    "users",
    "students",
    "courses",
    "grades",
    "attendance",
    "employees",
    "payrolls",
    "leave_requests",
    "invoices",
    "payments",
    "campaigns",
    "notifications",
];

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BundleInfo {
    pub file_name: String,
    pub size: u64,
    pub created_at: String,
    pub app_version: String,
    pub row_counts: serde_json::Value,
}

/// Snapshot the live database with `VACUUM INTO` and pack it with a manifest.
pub fn create_bundle(conn: &Connection, backups_dir: &Path) -> anyhow::Result<BundleInfo> {
    std::fs::create_dir_all(backups_dir).with_context(|| {
        format!(
            "failed to create directory {}",
            backups_dir.to_string_lossy()
        )
    })?;

    let now = Utc::now();
    let stamp = now.format("%Y%m%dT%H%M%S%.3fZ").to_string();
    let snapshot = backups_dir.join(format!("snapshot-{}.sqlite3", stamp));
    if snapshot.exists() {
        std::fs::remove_file(&snapshot).ok();
    }
    let snapshot_path = snapshot.to_string_lossy().to_string();
    conn.execute("VACUUM INTO ?", [&snapshot_path])
        .context("failed to snapshot database")?;

    let mut counts = serde_json::Map::new();
    for table in COUNTED_TABLES {
        let n: i64 = conn
            .query_row(&format!("SELECT COUNT(*) FROM {}", table), [], |r| r.get(0))
            .with_context(|| format!("failed to count {}", table))?;
        counts.insert(table.to_string(), json!(n));
    }

    let file_name = format!("erp-backup-{}.{}", stamp, BUNDLE_EXT);
    let out_path = backups_dir.join(&file_name);
    let written = write_bundle(&out_path, &snapshot, &now.to_rfc3339(), &counts);
    std::fs::remove_file(&snapshot).ok();
    written?;

    let size = std::fs::metadata(&out_path)
        .with_context(|| format!("failed to stat {}", out_path.to_string_lossy()))?
        .len();
    Ok(BundleInfo {
        file_name,
        size,
        created_at: now.to_rfc3339(),
        app_version: env!("CARGO_PKG_VERSION").to_string(),
        row_counts: serde_json::Value::Object(counts),
    })
}

fn write_bundle(
    out_path: &Path,
    snapshot: &Path,
    created_at: &str,
    counts: &serde_json::Map<String, serde_json::Value>,
) -> anyhow::Result<()> {
    let out_file = File::create(out_path).with_context(|| {
        format!(
            "failed to create output file {}",
            out_path.to_string_lossy()
        )
    })?;
    let mut zip = ZipWriter::new(out_file);
    let opts = FileOptions::default().compression_method(CompressionMethod::Deflated);

    let manifest = json!({
        "format": BUNDLE_FORMAT,
        "appVersion": env!("CARGO_PKG_VERSION"),
        "createdAt": created_at,
        "rowCounts": counts,
    });
    zip.start_file(MANIFEST_ENTRY, opts)
        .context("failed to start manifest entry")?;
    zip.write_all(
        serde_json::to_string_pretty(&manifest)
            .context("failed to serialize manifest")?
            .as_bytes(),
    )
    .context("failed to write manifest entry")?;

    zip.start_file(DB_ENTRY, opts)
        .context("failed to start database entry")?;
    let mut db_file = File::open(snapshot)
        .with_context(|| format!("failed to open snapshot {}", snapshot.to_string_lossy()))?;
    std::io::copy(&mut db_file, &mut zip).context("failed to write database entry")?;

    zip.finish().context("failed to finalize zip bundle")?;
    Ok(())
}

pub fn read_manifest(bundle: &Path) -> anyhow::Result<serde_json::Value> {
    let f = File::open(bundle)
        .with_context(|| format!("failed to open bundle {}", bundle.to_string_lossy()))?;
    let mut archive = ZipArchive::new(f).context("invalid zip archive")?;
    let mut text = String::new();
    archive
        .by_name(MANIFEST_ENTRY)
        .context("bundle missing manifest.json")?
        .read_to_string(&mut text)
        .context("failed to read manifest.json")?;
    let manifest: serde_json::Value =
        serde_json::from_str(&text).context("manifest.json is invalid JSON")?;
    let format = manifest
        .get("format")
        .and_then(|v| v.as_str())
        .unwrap_or("");
    if format != BUNDLE_FORMAT {
        return Err(anyhow!("unsupported bundle format: {}", format));
    }
    Ok(manifest)
}

/// Bundles in `backups_dir`, newest first. Unreadable files are skipped.
pub fn list_bundles(backups_dir: &Path) -> anyhow::Result<Vec<BundleInfo>> {
    if !backups_dir.is_dir() {
        return Ok(Vec::new());
    }
    let mut out = Vec::new();
    for entry in std::fs::read_dir(backups_dir)
        .with_context(|| format!("failed to read {}", backups_dir.to_string_lossy()))?
    {
        let path = entry?.path();
        if path.extension().and_then(|e| e.to_str()) != Some(BUNDLE_EXT) {
            continue;
        }
        let manifest = match read_manifest(&path) {
            Ok(m) => m,
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "skipping unreadable backup");
                continue;
            }
        };
        let str_field = |k: &str| {
            manifest
                .get(k)
                .and_then(|v| v.as_str())
                .unwrap_or_default()
                .to_string()
        };
        out.push(BundleInfo {
            file_name: path
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_default(),
            size: std::fs::metadata(&path)?.len(),
            created_at: str_field("createdAt"),
            app_version: str_field("appVersion"),
            row_counts: manifest.get("rowCounts").cloned().unwrap_or(json!({})),
        });
    }
    out.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    Ok(out)
}

/// Replace the database in `data_dir` with the one in `bundle`. The server must not be running.
pub fn restore_bundle(bundle: &Path, data_dir: &Path) -> anyhow::Result<PathBuf> {
    read_manifest(bundle)?;
    std::fs::create_dir_all(data_dir)
        .with_context(|| format!("failed to create {}", data_dir.to_string_lossy()))?;

    let f = File::open(bundle)
        .with_context(|| format!("failed to open bundle {}", bundle.to_string_lossy()))?;
    let mut archive = ZipArchive::new(f).context("invalid zip archive")?;
    let dst = data_dir.join(DB_FILE_NAME);
    let tmp_dst = data_dir.join(format!("{}.restoring", DB_FILE_NAME));
    if tmp_dst.exists() {
        std::fs::remove_file(&tmp_dst).ok();
    }

    let mut db_out = File::create(&tmp_dst).with_context(|| {
        format!(
            "failed to create temp database {}",
            tmp_dst.to_string_lossy()
        )
    })?;
    {
        let mut db_entry = archive
            .by_name(DB_ENTRY)
            .context("bundle missing db/erp.sqlite3")?;
        std::io::copy(&mut db_entry, &mut db_out).context("failed to extract database entry")?;
    }
    db_out.flush().context("failed to flush extracted database")?;
    drop(db_out);

    // Stale WAL/journal files would be replayed over the restored database.
    for suffix in ["-wal", "-shm", "-journal"] {
        let side = data_dir.join(format!("{}{}", DB_FILE_NAME, suffix));
        if side.exists() {
            std::fs::remove_file(&side).ok();
        }
    }
    std::fs::rename(&tmp_dst, &dst).with_context(|| {
        format!(
            "failed to move restored database to {}",
            dst.to_string_lossy()
        )
    })?;
    Ok(dst)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn bundle_restores_into_fresh_data_dir() {
        let src = tempfile::tempdir().expect("tempdir");
        let dst = tempfile::tempdir().expect("tempdir");
        let conn = crate::db::open_db(src.path()).expect("open");
        conn.execute(
            "INSERT INTO faculties(id, name) VALUES('f1', 'Science')",
            [],
        )
        .expect("seed");

        let backups = src.path().join("backups");
        let info = create_bundle(&conn, &backups).expect("bundle");
        assert!(info.file_name.starts_with("erp-backup-"));
        assert_eq!(info.row_counts["users"], json!(0));

        let listed = list_bundles(&backups).expect("list");
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].file_name, info.file_name);
        // The temporary snapshot never lingers next to the bundle.
        assert_eq!(std::fs::read_dir(&backups).expect("read").count(), 1);

        restore_bundle(&backups.join(&info.file_name), dst.path()).expect("restore");
        let restored = crate::db::open_db(dst.path()).expect("reopen");
        let name: String = restored
            .query_row("SELECT name FROM faculties WHERE id = 'f1'", [], |r| r.get(0))
            .expect("row");
        assert_eq!(name, "Science");
    }

    #[test]
    fn foreign_files_are_not_listed() {
        let dir = tempfile::tempdir().expect("tempdir");
        std::fs::write(dir.path().join("notes.zip"), b"not a zip").expect("write");
        std::fs::write(dir.path().join("readme.txt"), b"hello").expect("write");
        assert!(list_bundles(dir.path()).expect("list").is_empty());
        assert!(list_bundles(&dir.path().join("missing")).expect("list").is_empty());
    }

    #[test]
    fn restore_rejects_unknown_format() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("other.zip");
        {
            let mut zip = ZipWriter::new(File::create(&path).expect("create"));
            zip.start_file(MANIFEST_ENTRY, FileOptions::default())
                .expect("entry");
            zip.write_all(br#"{"format":"other-tool-v3"}"#).expect("write");
            zip.finish().expect("finish");
        }
        let e = restore_bundle(&path, dir.path()).expect_err("format");
        assert!(e.to_string().contains("unsupported bundle format"));
    }
}
