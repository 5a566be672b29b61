//! Classification oracle — a pure function from file metadata to an
//! [`Action`]. An ordered table of predicates, first match wins; no I/O,
//! no side effects.

use crate::model::FileRecord;

const GHOST_LINK_THRESHOLD: u64 = 5 * 1024 * 1024 * 1024; // 5 GiB
const COLD_STORAGE_THRESHOLD: u64 = 50 * 1_000_000_000; // 50 GB (decimal)
const LARGE_TEXT_DUMP_THRESHOLD: u64 = 10 * 1024 * 1024; // 10 MB

const NOISE_BASENAMES: &[&str] = &[".ds_store", "thumbs.db", "desktop.ini"];
const NOISE_EXTENSIONS: &[&str] = &["bak", "swp", "swo", "tmp", "log", "~"];
const NOISE_DIRS: &[&str] = &["node_modules", ".git", ".svn", ".hg", "target", "dist", "build", "__pycache__", ".cache"];

const RAW_VIDEO_EXTENSIONS: &[&str] = &["r3d", "braw", "ari", "arriraw"];
const ARCHIVE_MODE_CONTAINER_VIDEO_EXTENSIONS: &[&str] = &["mkv", "mov", "mxf"];

const LOSSLESS_AUDIO_EXTENSIONS: &[&str] = &["wav", "aiff", "aif"];
const UNCOMPRESSED_IMAGE_EXTENSIONS: &[&str] = &["bmp", "tiff", "tif"];
const LARGE_TEXT_DUMP_EXTENSIONS: &[&str] = &["sql", "csv", "json"];

/// Priority hint carried alongside `convert`/`compress` actions, consumed
/// by the external processor that actually performs the conversion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Priority {
    Low,
    Medium,
    High,
    Immediate,
}

/// Target for a ghost link.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkTarget {
    SourceLocation,
    ColdStorage,
}

/// Conversion format for `convert` actions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConvertFormat {
    Flac,
    Webp,
}

/// Compression algorithm for `compress` actions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompressAlgorithm {
    Zstd,
}

/// The classification oracle's decision for one file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Ignore,
    Transfer { priority: Priority },
    Link(LinkTarget),
    Convert { format: ConvertFormat, priority: Priority },
    Compress { algorithm: CompressAlgorithm, priority: Priority },
}

/// Selects between the base ghost-link thresholds and the `archive_mode`
/// variant that additionally routes oversized container-video formats to
/// cold storage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Ruleset {
    #[default]
    Default,
    ArchiveMode,
}

/// Classify one file against a ruleset. Pure: never fails, never blocks;
/// unknown extensions fall through to the default transfer rule.
pub fn classify(file: &FileRecord, ruleset: Ruleset) -> Action {
    if file.is_dir {
        return Action::Ignore;
    }

    let ext = file.extension();

    // Rule 1: noise rejection.
    let basename_lower = file.name.to_ascii_lowercase();
    if NOISE_BASENAMES.contains(&basename_lower.as_str()) {
        return Action::Ignore;
    }
    if let Some(ext) = &ext {
        if NOISE_EXTENSIONS.contains(&ext.as_str()) || file.name.ends_with('~') {
            return Action::Ignore;
        }
    }
    if let Some(parent) = file.parent_dir_name() {
        if NOISE_DIRS.contains(&parent.to_ascii_lowercase().as_str()) {
            return Action::Ignore;
        }
    }

    // Rule 2: ghost link by size (strict greater-than).
    if file.size > COLD_STORAGE_THRESHOLD {
        let is_raw_video = ext.as_deref().is_some_and(|e| RAW_VIDEO_EXTENSIONS.contains(&e));
        let is_archive_container = ruleset == Ruleset::ArchiveMode
            && ext.as_deref().is_some_and(|e| ARCHIVE_MODE_CONTAINER_VIDEO_EXTENSIONS.contains(&e));
        if is_raw_video || is_archive_container {
            return Action::Link(LinkTarget::ColdStorage);
        }
    }
    if file.size > GHOST_LINK_THRESHOLD {
        return Action::Link(LinkTarget::SourceLocation);
    }

    // Rule 3: lossless audio -> FLAC.
    if ext.as_deref().is_some_and(|e| LOSSLESS_AUDIO_EXTENSIONS.contains(&e)) {
        return Action::Convert { format: ConvertFormat::Flac, priority: Priority::Medium };
    }

    // Rule 4: uncompressed images -> WebP.
    if ext.as_deref().is_some_and(|e| UNCOMPRESSED_IMAGE_EXTENSIONS.contains(&e)) {
        return Action::Convert { format: ConvertFormat::Webp, priority: Priority::Low };
    }

    // Rule 5: large text dumps compress.
    if ext.as_deref().is_some_and(|e| LARGE_TEXT_DUMP_EXTENSIONS.contains(&e)) && file.size > LARGE_TEXT_DUMP_THRESHOLD {
        let priority = if ext.as_deref() == Some("json") { Priority::Medium } else { Priority::High };
        return Action::Compress { algorithm: CompressAlgorithm::Zstd, priority };
    }

    // Rules 6 & 7: everything else transfers as-is.
    Action::Transfer { priority: Priority::Immediate }
}

/// Result of partitioning a batch of files by classification. The
/// coordinator only consumes `transfer`, `link`, and `ignore`;
/// `convert`/`compress` are forwarded unchanged to an external processor.
#[derive(Debug, Clone, Default)]
pub struct Partition {
    pub transfer: Vec<FileRecord>,
    pub link: Vec<(FileRecord, LinkTarget)>,
    pub ignore: Vec<FileRecord>,
    pub convert: Vec<(FileRecord, ConvertFormat, Priority)>,
    pub compress: Vec<(FileRecord, CompressAlgorithm, Priority)>,
}

/// Apply [`classify`] to every file and bucket the results.
pub fn partition(files: impl IntoIterator<Item = FileRecord>, ruleset: Ruleset) -> Partition {
    let mut result = Partition::default();
    for file in files {
        match classify(&file, ruleset) {
            Action::Ignore => result.ignore.push(file),
            Action::Transfer { .. } => result.transfer.push(file),
            Action::Link(target) => result.link.push((file, target)),
            Action::Convert { format, priority } => result.convert.push((file, format, priority)),
            Action::Compress { algorithm, priority } => result.compress.push((file, algorithm, priority)),
        }
    }
    result
}
