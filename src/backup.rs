use crate::model::Collection;
use crate::storage::KeyValueStorage;
use crate::store::{validate_collection_blob, RecordStore};
use anyhow::{anyhow, Context};
use serde_json::json;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};
use zip::write::FileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

const MANIFEST_ENTRY: &str = "manifest.json";
pub const BUNDLE_FORMAT_V1: &str = "campus-store-v1";

#[derive(Debug, Clone)]
pub struct ExportSummary {
    pub bundle_format: String,
    pub entry_count: usize,
    pub record_counts: BTreeMap<String, usize>,
}

#[derive(Debug, Clone)]
pub struct ImportSummary {
    pub bundle_format_detected: String,
    pub record_counts: BTreeMap<String, usize>,
}

fn collection_entry(collection: Collection) -> String {
    format!("collections/{}.json", collection.name())
}

fn sha256_hex(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

/// Write every collection blob plus a manifest with per-entry digests.
/// Collections that fail to decode are refused rather than exported.
pub fn export_store_bundle<S: KeyValueStorage>(
    store: &RecordStore<S>,
    out_path: &Path,
) -> anyhow::Result<ExportSummary> {
    let mut blobs: Vec<(Collection, String, usize)> = Vec::new();
    for c in Collection::ALL {
        let records = store
            .try_get_collection(c)
            .with_context(|| format!("cannot export collection {}", c.name()))?;
        let raw = serde_json::to_string(&records)
            .with_context(|| format!("failed to serialize collection {}", c.name()))?;
        blobs.push((c, raw, records.len()));
    }

    if let Some(parent) = out_path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create directory {}", parent.to_string_lossy()))?;
    }
    let out_file = File::create(out_path).with_context(|| {
        format!(
            "failed to create output file {}",
            out_path.to_string_lossy()
        )
    })?;
    let mut zip = ZipWriter::new(out_file);
    let opts = FileOptions::default().compression_method(CompressionMethod::Deflated);

    let exported_at = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs();
    let mut digests = serde_json::Map::new();
    let mut record_counts = BTreeMap::new();
    for (c, raw, count) in &blobs {
        digests.insert(c.name().to_string(), json!(sha256_hex(raw.as_bytes())));
        record_counts.insert(c.name().to_string(), *count);
    }
    let manifest = json!({
        "format": BUNDLE_FORMAT_V1,
        "version": 1,
        "appVersion": env!("CARGO_PKG_VERSION"),
        "exportedAt": exported_at,
        "sha256": digests,
    });
    zip.start_file(MANIFEST_ENTRY, opts)
        .context("failed to start manifest entry")?;
    zip.write_all(
        serde_json::to_string_pretty(&manifest)
            .context("failed to serialize manifest")?
            .as_bytes(),
    )
    .context("failed to write manifest entry")?;

    for (c, raw, _) in &blobs {
        zip.start_file(collection_entry(*c), opts)
            .with_context(|| format!("failed to start entry for {}", c.name()))?;
        zip.write_all(raw.as_bytes())
            .with_context(|| format!("failed to write entry for {}", c.name()))?;
    }

    zip.finish().context("failed to finalize zip bundle")?;

    Ok(ExportSummary {
        bundle_format: BUNDLE_FORMAT_V1.to_string(),
        entry_count: blobs.len() + 1,
        record_counts,
    })
}

/// Replace every collection with the bundle's contents. All entries are read
/// and verified before the first write.
pub fn import_store_bundle<S: KeyValueStorage>(
    store: &mut RecordStore<S>,
    in_path: &Path,
) -> anyhow::Result<ImportSummary> {
    let in_file = File::open(in_path)
        .with_context(|| format!("failed to open bundle {}", in_path.to_string_lossy()))?;
    let mut archive = ZipArchive::new(in_file).context("invalid zip archive")?;

    let mut manifest_text = String::new();
    archive
        .by_name(MANIFEST_ENTRY)
        .context("bundle missing manifest.json")?
        .read_to_string(&mut manifest_text)
        .context("failed to read manifest.json")?;
    let manifest: serde_json::Value =
        serde_json::from_str(&manifest_text).context("manifest.json is invalid JSON")?;
    let format = manifest
        .get("format")
        .and_then(|v| v.as_str())
        .unwrap_or("");
    if format != BUNDLE_FORMAT_V1 {
        return Err(anyhow!("unsupported bundle format: {}", format));
    }

    let mut staged: Vec<(Collection, String)> = Vec::new();
    for c in Collection::ALL {
        let mut raw = String::new();
        archive
            .by_name(&collection_entry(c))
            .with_context(|| format!("bundle missing {}", collection_entry(c)))?
            .read_to_string(&mut raw)
            .with_context(|| format!("failed to read {}", collection_entry(c)))?;
        let expected = manifest
            .get("sha256")
            .and_then(|d| d.get(c.name()))
            .and_then(|v| v.as_str())
            .ok_or_else(|| anyhow!("manifest has no digest for {}", c.name()))?;
        if sha256_hex(raw.as_bytes()) != expected {
            return Err(anyhow!("digest mismatch for {}", c.name()));
        }
        validate_collection_blob(c, &raw)
            .with_context(|| format!("bundle entry for {} is malformed", c.name()))?;
        staged.push((c, raw));
    }

    let mut record_counts = BTreeMap::new();
    for (c, raw) in staged {
        let count = store
            .restore_raw_collection(c, &raw)
            .with_context(|| format!("failed to restore collection {}", c.name()))?;
        record_counts.insert(c.name().to_string(), count);
    }

    Ok(ImportSummary {
        bundle_format_detected: BUNDLE_FORMAT_V1.to_string(),
        record_counts,
    })
}
