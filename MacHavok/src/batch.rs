//! Batch HKX operations
//!
//! Discovers `.hkx` files and converts them in parallel, one file per unit
//! of work. Files share nothing but the read-only reference type set.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use rayon::prelude::*;
use walkdir::WalkDir;

use crate::hkx::{HkxFile, HkxFormat};
use crate::options::EngineVersion;
use crate::types::TypeSet;

/// Result of a batch conversion
#[derive(Debug, Clone)]
pub struct BatchConvertResult {
    /// Number of successful conversions
    pub success_count: usize,
    /// Number of failed conversions
    pub fail_count: usize,
    /// Messages for each file processed
    pub results: Vec<String>,
}

/// Progress of a batch conversion, reported once per file
#[derive(Debug, Clone)]
pub struct BatchProgress {
    pub current: usize,
    pub total: usize,
    pub file: String,
}

/// What to produce for each input file
#[derive(Debug, Clone)]
pub struct BatchConvertOptions<'a> {
    pub output_format: HkxFormat,
    /// Needed for XML input and for version conversion.
    pub reference: Option<&'a TypeSet>,
    pub target_version: Option<EngineVersion>,
}

impl BatchConvertOptions<'_> {
    /// Extension written for the output format.
    #[must_use]
    pub fn output_extension(&self) -> &'static str {
        match self.output_format {
            HkxFormat::Xml => "xml",
            HkxFormat::Tagfile | HkxFormat::Packfile => "hkx",
        }
    }
}

/// Find all .hkx files in a directory recursively
///
/// # Returns
/// A sorted list of paths to .hkx files found in the directory tree.
pub fn find_hkx_files<P: AsRef<Path>>(dir: P) -> Vec<PathBuf> {
    let mut hkx_files: Vec<_> = WalkDir::new(dir)
        .follow_links(true)
        .into_iter()
        .filter_map(std::result::Result::ok)
        .filter(|e| {
            e.path().is_file()
                && e.path()
                    .extension()
                    .is_some_and(|ext| ext.eq_ignore_ascii_case("hkx"))
        })
        .map(|e| e.path().to_path_buf())
        .collect();

    hkx_files.sort();
    hkx_files
}

/// Batch convert HKX files in parallel
///
/// Each file is written under `dest_base` at its path relative to
/// `source_base`, with the extension of the output format.
///
/// # Arguments
/// * `hkx_files` - Files to convert
/// * `source_base` - Base directory of the source (for calculating relative paths)
/// * `dest_base` - Destination directory
/// * `options` - Output format, reference types and target version
/// * `progress` - Callback for progress updates
///
/// # Returns
/// Summary of the batch conversion.
pub fn batch_convert<F>(
    hkx_files: &[PathBuf],
    source_base: &Path,
    dest_base: &Path,
    options: &BatchConvertOptions<'_>,
    progress: F,
) -> BatchConvertResult
where
    F: Fn(&BatchProgress) + Send + Sync,
{
    let success_counter = AtomicUsize::new(0);
    let fail_counter = AtomicUsize::new(0);
    let processed = AtomicUsize::new(0);
    let total = hkx_files.len();

    let results: Vec<String> = hkx_files
        .par_iter()
        .map(|hkx_path| {
            let relative_path = hkx_path
                .strip_prefix(source_base)
                .unwrap_or(hkx_path.as_path());
            let display_path = relative_path.to_string_lossy();

            let current = processed.fetch_add(1, Ordering::SeqCst) + 1;
            progress(&BatchProgress {
                current,
                total,
                file: display_path.to_string(),
            });

            let dest = dest_base
                .join(relative_path)
                .with_extension(options.output_extension());

            match convert_one(hkx_path, &dest, options) {
                Ok(()) => {
                    success_counter.fetch_add(1, Ordering::SeqCst);
                    format!("Converted: {display_path}")
                }
                Err(e) => {
                    tracing::warn!("Failed to convert {}: {}", display_path, e);
                    fail_counter.fetch_add(1, Ordering::SeqCst);
                    format!("Failed {display_path}: {e}")
                }
            }
        })
        .collect();

    BatchConvertResult {
        success_count: success_counter.load(Ordering::SeqCst),
        fail_count: fail_counter.load(Ordering::SeqCst),
        results,
    }
}

fn convert_one(input: &Path, output: &Path, options: &BatchConvertOptions<'_>) -> crate::Result<()> {
    let mut file = HkxFile::read(input, options.reference)?;
    if let Some(to) = options.target_version {
        let reference = options
            .reference
            .ok_or_else(|| crate::Error::missing_type("reference type set", "engine version conversion"))?;
        file.convert_types(reference, to)?;
    }
    file.write(output, options.output_format)
}
