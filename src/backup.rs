use anyhow::{anyhow, Context};
use rusqlite::{Connection, OpenFlags};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;
use zip::write::FileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

const DB_FILE: &str = "feeledger.sqlite3";
const MANIFEST_ENTRY: &str = "manifest.json";
const DB_ENTRY: &str = "db/feeledger.sqlite3";
pub const BUNDLE_FORMAT: &str = "feeledger-workspace-v1";
pub const LEGACY_FORMAT: &str = "legacy-sqlite3";

const ZIP_SIGNATURE: [u8; 4] = [0x50, 0x4B, 0x03, 0x04];
const SQLITE_SIGNATURE: &[u8; 16] = b"SQLite format 3\0";
const PAID_TOLERANCE: f64 = 0.005;

/// Per-school counts written into the manifest and re-derived from the
/// restored database on import.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SchoolTally {
    pub id: String,
    pub name: String,
    pub classes: i64,
    pub students: i64,
    pub fee_types: i64,
    pub payments: i64,
    pub total_paid: f64,
}

impl SchoolTally {
    fn agrees_with(&self, other: &SchoolTally) -> bool {
        self.id == other.id
            && self.name == other.name
            && self.classes == other.classes
            && self.students == other.students
            && self.fee_types == other.fee_types
            && self.payments == other.payments
            && (self.total_paid - other.total_paid).abs() < PAID_TOLERANCE
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Manifest {
    format: String,
    #[serde(default)]
    version: u32,
    #[serde(default)]
    app_version: String,
    #[serde(default)]
    exported_at: Option<String>,
    db_sha256: String,
    #[serde(default)]
    db_bytes: u64,
    schools: Vec<SchoolTally>,
}

#[derive(Debug, Clone)]
pub struct ExportSummary {
    pub bundle_format: String,
    pub db_sha256: String,
    pub schools: Vec<SchoolTally>,
}

#[derive(Debug, Clone)]
pub struct ImportSummary {
    pub bundle_format_detected: String,
    pub db_sha256: String,
    pub schools: Vec<SchoolTally>,
}

/// What a file would restore, read without touching any workspace.
#[derive(Debug, Clone)]
pub struct BundleInfo {
    pub bundle_format: String,
    pub exported_at: Option<String>,
    pub schools: Vec<SchoolTally>,
}

pub fn school_tallies(conn: &Connection) -> anyhow::Result<Vec<SchoolTally>> {
    let mut stmt = conn
        .prepare(
            "SELECT
               sc.id,
               sc.name,
               (SELECT COUNT(*) FROM classes c WHERE c.school_id = sc.id),
               (SELECT COUNT(*) FROM students s WHERE s.school_id = sc.id),
               (SELECT COUNT(*) FROM fee_types f WHERE f.school_id = sc.id),
               (SELECT COUNT(*) FROM payments p WHERE p.school_id = sc.id),
               (SELECT COALESCE(SUM(p.amount_paid), 0.0) FROM payments p WHERE p.school_id = sc.id)
             FROM schools sc
             ORDER BY sc.id",
        )
        .context("not a fee ledger database")?;
    let rows = stmt
        .query_map([], |r| {
            Ok(SchoolTally {
                id: r.get(0)?,
                name: r.get(1)?,
                classes: r.get(2)?,
                students: r.get(3)?,
                fee_types: r.get(4)?,
                payments: r.get(5)?,
                total_paid: r.get(6)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

fn tallies_at(db_path: &Path) -> anyhow::Result<Vec<SchoolTally>> {
    let conn = Connection::open_with_flags(db_path, OpenFlags::SQLITE_OPEN_READ_ONLY)
        .with_context(|| format!("failed to open {}", db_path.to_string_lossy()))?;
    school_tallies(&conn)
}

fn hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}

/// Copies `reader` into `writer`, returning the SHA-256 of the bytes copied.
fn copy_hashed(reader: &mut impl Read, writer: &mut impl Write) -> anyhow::Result<String> {
    let mut hasher = Sha256::new();
    let mut buf = [0u8; 64 * 1024];
    loop {
        let n = reader.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
        writer.write_all(&buf[..n])?;
    }
    Ok(hex(&hasher.finalize()))
}

pub fn file_sha256(path: &Path) -> anyhow::Result<String> {
    let mut f = File::open(path)
        .with_context(|| format!("failed to open {}", path.to_string_lossy()))?;
    copy_hashed(&mut f, &mut std::io::sink())
}

/// Writes the workspace database behind `conn` into a zip bundle whose
/// manifest records the checksum and every school's tallies.
pub fn export_workspace_bundle(
    conn: &Connection,
    workspace_path: &Path,
    out_path: &Path,
) -> anyhow::Result<ExportSummary> {
    let db_path = workspace_path.join(DB_FILE);
    if !db_path.is_file() {
        return Err(anyhow!(
            "workspace database not found: {}",
            db_path.to_string_lossy()
        ));
    }
    if let Some(parent) = out_path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create directory {}", parent.to_string_lossy()))?;
    }

    let schools = school_tallies(conn)?;
    let db_sha256 = file_sha256(&db_path)?;
    let db_bytes = std::fs::metadata(&db_path)
        .with_context(|| format!("failed to stat {}", db_path.to_string_lossy()))?
        .len();
    let manifest = Manifest {
        format: BUNDLE_FORMAT.to_string(),
        version: 1,
        app_version: env!("CARGO_PKG_VERSION").to_string(),
        exported_at: Some(chrono::Utc::now().to_rfc3339()),
        db_sha256: db_sha256.clone(),
        db_bytes,
        schools: schools.clone(),
    };

    let out_file = File::create(out_path).with_context(|| {
        format!(
            "failed to create output file {}",
            out_path.to_string_lossy()
        )
    })?;
    let mut zip = ZipWriter::new(out_file);
    let opts = FileOptions::default().compression_method(CompressionMethod::Deflated);

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
    let mut db_file = File::open(&db_path)
        .with_context(|| format!("failed to open database {}", db_path.to_string_lossy()))?;
    std::io::copy(&mut db_file, &mut zip).context("failed to write database entry")?;
    zip.finish().context("failed to finalize zip bundle")?;

    Ok(ExportSummary {
        bundle_format: BUNDLE_FORMAT.to_string(),
        db_sha256,
        schools,
    })
}

/// Reports what `in_path` holds: the manifest of a bundle, or the tallies
/// of a bare fee ledger database.
pub fn inspect_bundle(in_path: &Path) -> anyhow::Result<BundleInfo> {
    match signature(in_path)? {
        Signature::Zip => {
            let mut archive = open_archive(in_path)?;
            let manifest = read_manifest(&mut archive)?;
            Ok(BundleInfo {
                bundle_format: manifest.format,
                exported_at: manifest.exported_at,
                schools: manifest.schools,
            })
        }
        Signature::Sqlite => Ok(BundleInfo {
            bundle_format: LEGACY_FORMAT.to_string(),
            exported_at: None,
            schools: tallies_at(in_path)?,
        }),
        Signature::Unknown => Err(unknown_file(in_path)),
    }
}

/// Restores a bundle (or a bare fee ledger database) into `workspace_path`.
/// The database is written to a temp file and only renamed into place once
/// its checksum and school tallies match the manifest.
pub fn import_workspace_bundle(
    in_path: &Path,
    workspace_path: &Path,
) -> anyhow::Result<ImportSummary> {
    std::fs::create_dir_all(workspace_path).with_context(|| {
        format!(
            "failed to create workspace {}",
            workspace_path.to_string_lossy()
        )
    })?;
    let dst = workspace_path.join(DB_FILE);
    let tmp_dst = workspace_path.join(format!("{}.importing", DB_FILE));
    if tmp_dst.exists() {
        let _ = std::fs::remove_file(&tmp_dst);
    }

    let staged = match signature(in_path)? {
        Signature::Zip => stage_bundle(in_path, &tmp_dst),
        Signature::Sqlite => stage_legacy(in_path, &tmp_dst),
        Signature::Unknown => Err(unknown_file(in_path)),
    };
    let summary = match staged {
        Ok(v) => v,
        Err(e) => {
            let _ = std::fs::remove_file(&tmp_dst);
            return Err(e);
        }
    };

    if dst.exists() {
        std::fs::remove_file(&dst).with_context(|| {
            format!(
                "failed to remove existing database {}",
                dst.to_string_lossy()
            )
        })?;
    }
    std::fs::rename(&tmp_dst, &dst).with_context(|| {
        format!(
            "failed to move restored database to {}",
            dst.to_string_lossy()
        )
    })?;
    Ok(summary)
}

fn open_archive(in_path: &Path) -> anyhow::Result<ZipArchive<File>> {
    let in_file = File::open(in_path)
        .with_context(|| format!("failed to open bundle {}", in_path.to_string_lossy()))?;
    ZipArchive::new(in_file).context("invalid zip archive")
}

fn read_manifest(archive: &mut ZipArchive<File>) -> anyhow::Result<Manifest> {
    let mut text = String::new();
    archive
        .by_name(MANIFEST_ENTRY)
        .context("bundle missing manifest.json")?
        .read_to_string(&mut text)
        .context("failed to read manifest.json")?;
    let manifest: Manifest = serde_json::from_str(&text).context("manifest.json is invalid")?;
    if manifest.format != BUNDLE_FORMAT {
        return Err(anyhow!("unsupported bundle format: {}", manifest.format));
    }
    Ok(manifest)
}

fn stage_bundle(in_path: &Path, tmp_dst: &Path) -> anyhow::Result<ImportSummary> {
    let mut archive = open_archive(in_path)?;
    let manifest = read_manifest(&mut archive)?;

    let mut db_out = File::create(tmp_dst).with_context(|| {
        format!(
            "failed to create temp database {}",
            tmp_dst.to_string_lossy()
        )
    })?;
    let actual = {
        let mut db_entry = archive
            .by_name(DB_ENTRY)
            .context("bundle missing db/feeledger.sqlite3")?;
        copy_hashed(&mut db_entry, &mut db_out).context("failed to extract database entry")?
    };
    db_out
        .flush()
        .context("failed to flush extracted database")?;
    drop(db_out);

    let expected = manifest.db_sha256.to_ascii_lowercase();
    if actual != expected {
        return Err(anyhow!(
            "database checksum mismatch: manifest {}, bundle {}",
            expected,
            actual
        ));
    }

    let restored = tallies_at(tmp_dst)?;
    let agrees = restored.len() == manifest.schools.len()
        && restored
            .iter()
            .zip(manifest.schools.iter())
            .all(|(a, b)| a.agrees_with(b));
    if !agrees {
        return Err(anyhow!(
            "school roster mismatch: manifest lists {} school(s), database holds {}",
            manifest.schools.len(),
            restored.len()
        ));
    }
    Ok(ImportSummary {
        bundle_format_detected: BUNDLE_FORMAT.to_string(),
        db_sha256: actual,
        schools: restored,
    })
}

fn stage_legacy(in_path: &Path, tmp_dst: &Path) -> anyhow::Result<ImportSummary> {
    let mut src = File::open(in_path)
        .with_context(|| format!("failed to open {}", in_path.to_string_lossy()))?;
    let mut out = File::create(tmp_dst).with_context(|| {
        format!(
            "failed to create temp database {}",
            tmp_dst.to_string_lossy()
        )
    })?;
    let db_sha256 = copy_hashed(&mut src, &mut out).with_context(|| {
        format!(
            "failed to copy database from {}",
            in_path.to_string_lossy()
        )
    })?;
    out.flush().context("failed to flush copied database")?;
    drop(out);

    let schools = tallies_at(tmp_dst)?;
    Ok(ImportSummary {
        bundle_format_detected: LEGACY_FORMAT.to_string(),
        db_sha256,
        schools,
    })
}

fn unknown_file(path: &Path) -> anyhow::Error {
    anyhow!(
        "{} is neither a workspace bundle nor a SQLite database",
        path.to_string_lossy()
    )
}

enum Signature {
    Zip,
    Sqlite,
    Unknown,
}

fn signature(path: &Path) -> anyhow::Result<Signature> {
    let mut f = File::open(path)
        .with_context(|| format!("failed to open input file {}", path.to_string_lossy()))?;
    let mut head = [0u8; 16];
    let mut filled = 0;
    while filled < head.len() {
        let n = f
            .read(&mut head[filled..])
            .context("failed to read file signature")?;
        if n == 0 {
            break;
        }
        filled += n;
    }
    if filled >= 4 && head[..4] == ZIP_SIGNATURE {
        return Ok(Signature::Zip);
    }
    if filled == head.len() && &head == SQLITE_SIGNATURE {
        return Ok(Signature::Sqlite);
    }
    Ok(Signature::Unknown)
}
