use campusd::backup;
use campusd::model::{Collection, FeeRecord, Lead, LeadStatus};
use campusd::storage::{KeyValueStorage, MemoryStorage};
use campusd::store::RecordStore;
use serde_json::{json, Map};
use std::fs::File;
use std::io::{Read, Write};
use std::path::PathBuf;
use std::time::{SystemTime, UNIX_EPOCH};

fn temp_dir(prefix: &str) -> PathBuf {
    let p = std::env::temp_dir().join(format!(
        "{}-{}",
        prefix,
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("clock")
            .as_nanos()
    ));
    std::fs::create_dir_all(&p).expect("create temp dir");
    p
}

fn seeded_store() -> RecordStore<MemoryStorage> {
    let mut store = RecordStore::new(MemoryStorage::new());
    store
        .save(&FeeRecord {
            student_email: "ana@campus.test".into(),
            total_amount: 500.0,
            paid_amount: 125.0,
            payments: Vec::new(),
            due_date: None,
            extra: Map::new(),
        })
        .expect("save fee");
    store
        .save(&Lead {
            id: "lead-1".into(),
            name: "Prospect".into(),
            email: None,
            phone: None,
            course: Some("Web".into()),
            status: LeadStatus::Contacted,
            notes: None,
            created_at: None,
            extra: Map::new(),
        })
        .expect("save lead");
    store
}

#[test]
fn zip_export_and_import_roundtrip() {
    let out_dir = temp_dir("campus-backup-out");
    let bundle_path = out_dir.join("store.zip");

    let source = seeded_store();
    let export = backup::export_store_bundle(&source, &bundle_path).expect("export bundle");
    assert_eq!(export.bundle_format, backup::BUNDLE_FORMAT_V1);
    assert_eq!(export.entry_count, Collection::ALL.len() + 1);
    assert_eq!(export.record_counts.get("fees"), Some(&1));
    assert_eq!(export.record_counts.get("users"), Some(&0));

    let f = File::open(&bundle_path).expect("open bundle");
    let mut archive = zip::ZipArchive::new(f).expect("open zip archive");
    let mut manifest = String::new();
    archive
        .by_name("manifest.json")
        .expect("manifest entry")
        .read_to_string(&mut manifest)
        .expect("read manifest");
    assert!(manifest.contains(backup::BUNDLE_FORMAT_V1));
    archive
        .by_name("collections/crm_leads.json")
        .expect("crm entry in bundle");

    let mut target = RecordStore::new(MemoryStorage::new());
    target
        .save(&FeeRecord {
            student_email: "stale@campus.test".into(),
            total_amount: 1.0,
            paid_amount: 0.0,
            payments: Vec::new(),
            due_date: None,
            extra: Map::new(),
        })
        .expect("save stale fee");

    let import = backup::import_store_bundle(&mut target, &bundle_path).expect("import bundle");
    assert_eq!(import.bundle_format_detected, backup::BUNDLE_FORMAT_V1);
    assert_eq!(import.record_counts.get("crm_leads"), Some(&1));

    let fees = target.load::<FeeRecord>();
    assert_eq!(fees.len(), 1);
    assert_eq!(fees[0].student_email, "ana@campus.test");
    assert_eq!(fees[0].pending_amount(), 375.0);
    let lead = target.find::<Lead>("lead-1").expect("lead restored");
    assert_eq!(lead.status, LeadStatus::Contacted);

    let _ = std::fs::remove_dir_all(out_dir);
}

#[test]
fn tampered_entry_is_rejected_before_any_write() {
    let out_dir = temp_dir("campus-backup-tamper");
    let good_path = out_dir.join("good.zip");
    let bad_path = out_dir.join("bad.zip");
    backup::export_store_bundle(&seeded_store(), &good_path).expect("export bundle");

    // Copy every entry, swapping the fees payload but keeping the manifest.
    let mut src = zip::ZipArchive::new(File::open(&good_path).expect("open good")).expect("read good");
    let mut dst = zip::ZipWriter::new(File::create(&bad_path).expect("create bad"));
    for i in 0..src.len() {
        let mut entry = src.by_index(i).expect("entry");
        let name = entry.name().to_string();
        let mut body = String::new();
        entry.read_to_string(&mut body).expect("read entry");
        if name == "collections/fees.json" {
            body = json!([{ "studentEmail": "mallory@campus.test", "totalAmount": 0 }]).to_string();
        }
        dst.start_file(name, zip::write::FileOptions::default())
            .expect("start entry");
        dst.write_all(body.as_bytes()).expect("write entry");
    }
    dst.finish().expect("finish bad bundle");

    let mut target = RecordStore::new(MemoryStorage::new());
    target
        .save(&FeeRecord {
            student_email: "keep@campus.test".into(),
            total_amount: 10.0,
            paid_amount: 0.0,
            payments: Vec::new(),
            due_date: None,
            extra: Map::new(),
        })
        .expect("seed target");
    let before = target.storage().keys().expect("keys");

    let err = backup::import_store_bundle(&mut target, &bad_path).expect_err("tampered bundle");
    assert!(format!("{err:#}").contains("digest mismatch"), "{err:#}");
    assert_eq!(target.storage().keys().expect("keys"), before);
    let fees = target.load::<FeeRecord>();
    assert_eq!(fees.len(), 1);
    assert_eq!(fees[0].student_email, "keep@campus.test");

    let _ = std::fs::remove_dir_all(out_dir);
}

#[test]
fn export_refuses_a_corrupted_collection() {
    let out_dir = temp_dir("campus-backup-corrupt");
    let bundle_path = out_dir.join("never.zip");

    let mut storage = MemoryStorage::new();
    storage
        .set_item("projects", "{not an array")
        .expect("write corrupt blob");
    let store = RecordStore::new(storage);

    let err = backup::export_store_bundle(&store, &bundle_path).expect_err("corrupt export");
    assert!(format!("{err:#}").contains("projects"), "{err:#}");
    assert!(!bundle_path.exists());

    let _ = std::fs::remove_dir_all(out_dir);
}

#[test]
fn non_bundle_files_are_rejected() {
    let out_dir = temp_dir("campus-backup-garbage");
    let path = out_dir.join("notes.txt");
    std::fs::write(&path, b"just some text").expect("write file");

    let mut target = RecordStore::new(MemoryStorage::new());
    assert!(backup::import_store_bundle(&mut target, &path).is_err());

    let _ = std::fs::remove_dir_all(out_dir);
}
