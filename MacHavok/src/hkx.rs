//! Whole-file access to `.hkx` containers
//!
//! [`HkxFile`] sniffs which of the three container formats it was given,
//! decodes it to a type set plus object graph, and writes that pair back out
//! as a binary or XML tagfile. [`convert_file`] chains both with an optional
//! engine-version conversion.

use crate::convert::{TypeConverter, member_renames};
use crate::error::{Error, Result};
use crate::graph::ObjectGraph;
use crate::options::{EngineVersion, PointerWidth, TagfileOptions, XmlOptions};
use crate::packfile;
use crate::tagfile;
use crate::types::TypeSet;
use crate::xml;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Container format of an `.hkx` file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum HkxFormat {
    /// Binary tagfile (`TAG0`).
    Tagfile,
    /// Legacy binary packfile.
    Packfile,
    /// XML tagfile.
    Xml,
}

impl HkxFormat {
    #[must_use]
    pub fn display_name(&self) -> &'static str {
        match self {
            HkxFormat::Tagfile => "Tagfile",
            HkxFormat::Packfile => "Packfile",
            HkxFormat::Xml => "XML",
        }
    }

    /// Whether this crate can write the format.
    #[must_use]
    pub fn is_writable(&self) -> bool {
        !matches!(self, HkxFormat::Packfile)
    }
}

/// Identify the container format from the leading bytes.
///
/// # Errors
/// Returns [`Error::UnknownFormat`] when no format matches.
pub fn detect_format(data: &[u8]) -> Result<HkxFormat> {
    if tagfile::is_tagfile(data) {
        return Ok(HkxFormat::Tagfile);
    }
    if packfile::is_packfile(data) {
        return Ok(HkxFormat::Packfile);
    }

    let text = data.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(data);
    let start = text.iter().position(|b| !b.is_ascii_whitespace()).unwrap_or(text.len());
    let text = &text[start..];
    if text.starts_with(b"<?xml") || text.starts_with(b"<hktagfile") {
        return Ok(HkxFormat::Xml);
    }

    let magic: Vec<String> = data.iter().take(8).map(|b| format!("{b:02X}")).collect();
    Err(Error::UnknownFormat(magic.join(" ")))
}

/// A decoded `.hkx` file.
#[derive(Debug, Clone)]
pub struct HkxFile {
    /// Format the file was read from.
    pub format: HkxFormat,
    pub sdk_version: String,
    pub pointer_width: PointerWidth,
    pub types: TypeSet,
    pub graph: ObjectGraph,
}

impl HkxFile {
    /// Decode any supported container.
    ///
    /// XML tagfiles carry no type tables, and packfiles may omit them; both
    /// decode against `reference` in that case.
    ///
    /// # Errors
    /// Returns [`Error::UnknownFormat`] for unrecognized data,
    /// [`Error::MissingTypeReference`] when a type set is needed and
    /// `reference` is `None`, and any decoding error of the format itself.
    pub fn from_bytes(data: &[u8], reference: Option<&TypeSet>) -> Result<Self> {
        let format = detect_format(data)?;
        tracing::debug!("Detected {} ({} bytes)", format.display_name(), data.len());

        match format {
            HkxFormat::Tagfile => {
                let file = tagfile::parse_tagfile(data)?;
                Ok(Self {
                    format,
                    sdk_version: file.sdk_version,
                    pointer_width: file.pointer_width,
                    types: file.types,
                    graph: file.graph,
                })
            }
            HkxFormat::Packfile => {
                let file = match reference {
                    Some(reference) => packfile::parse_packfile_with_types(data, reference)?,
                    None => packfile::parse_packfile(data)?,
                };
                Ok(Self {
                    format,
                    sdk_version: file.header.contents_version,
                    pointer_width: file.pointer_width,
                    types: file.types,
                    graph: file.graph,
                })
            }
            HkxFormat::Xml => {
                let types = reference.ok_or_else(|| Error::missing_type("reference type set", "XML tagfile"))?;
                let content = String::from_utf8(data.to_vec())?;
                let file = xml::parse_xml(&content, types)?;
                Ok(Self {
                    format,
                    sdk_version: file.sdk_version,
                    pointer_width: PointerWidth::Eight,
                    types: types.clone(),
                    graph: file.graph,
                })
            }
        }
    }

    /// Read and decode a file from disk
    ///
    /// # Errors
    /// Returns an error if the file cannot be read or decoded.
    pub fn read<P: AsRef<Path>>(path: P, reference: Option<&TypeSet>) -> Result<Self> {
        let path = path.as_ref();
        tracing::info!("Reading {}", path.display());
        let data = std::fs::read(path)?;
        Self::from_bytes(&data, reference)
    }

    /// Engine generation named by the SDK version, if recognized.
    #[must_use]
    pub fn engine_version(&self) -> Option<EngineVersion> {
        EngineVersion::from_sdk_string(&self.sdk_version)
    }

    /// Encode as `format`.
    ///
    /// A tagfile keeps this file's SDK version when it fits the 8-character
    /// `SDKV` field and falls back to the 2018 default otherwise.
    ///
    /// # Errors
    /// Returns [`Error::UnsupportedConversion`] for packfile output, or any
    /// packing error.
    pub fn to_bytes(&self, format: HkxFormat) -> Result<Vec<u8>> {
        match format {
            HkxFormat::Tagfile => {
                let mut options = TagfileOptions::new().with_pointer_width(self.pointer_width);
                if self.sdk_version.len() == 8 && self.sdk_version.is_ascii() {
                    options = options.with_sdk_version(self.sdk_version.clone());
                }
                tagfile::serialize_tagfile(&self.types, &self.graph, &options)
            }
            HkxFormat::Xml => {
                let options = XmlOptions::new().with_sdk_version(self.sdk_version.clone());
                Ok(xml::serialize_xml(&self.types, &self.graph, &options)?.into_bytes())
            }
            HkxFormat::Packfile => Err(Error::UnsupportedConversion {
                from: self.format.display_name().to_string(),
                to: format.display_name().to_string(),
            }),
        }
    }

    /// Encode as `format` and write to `path`
    ///
    /// # Errors
    /// Returns an error if encoding fails or the file cannot be written.
    pub fn write<P: AsRef<Path>>(&self, path: P, format: HkxFormat) -> Result<()> {
        let bytes = self.to_bytes(format)?;
        if let Some(parent) = path.as_ref().parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, bytes)?;
        Ok(())
    }

    /// Convert the type set to an older engine generation and point every
    /// object at its converted type.
    ///
    /// Object values move with their members: renamed members keep their
    /// value, redirected integers are narrowed, and removed members are no
    /// longer written.
    ///
    /// # Errors
    /// Returns [`Error::UnsupportedConversion`] when the file's own engine
    /// version is unknown or newer-than-requested conversion is impossible,
    /// and [`Error::MissingTypeReference`] when an object's type was removed.
    pub fn convert_types(&mut self, reference: &TypeSet, to: EngineVersion) -> Result<()> {
        let from = self.engine_version().ok_or_else(|| Error::UnsupportedConversion {
            from: self.sdk_version.clone(),
            to: format!("{to:?}"),
        })?;
        let converted = TypeConverter::new(reference, self.pointer_width).convert(&self.types, from, to)?;
        let renames = member_renames(from, to)?;
        self.graph.retarget(&self.types, &converted, &renames)?;
        self.types = converted;
        self.sdk_version = to.sdk_string().to_string();
        Ok(())
    }
}

/// Read `input`, optionally convert its types, and write it as `format`.
///
/// # Errors
/// Returns any error from reading, converting or writing.
pub fn convert_file<P: AsRef<Path>, Q: AsRef<Path>>(
    input: P,
    output: Q,
    format: HkxFormat,
    reference: Option<&TypeSet>,
    target_version: Option<EngineVersion>,
) -> Result<()> {
    let mut file = HkxFile::read(&input, reference)?;
    if let Some(to) = target_version {
        let reference =
            reference.ok_or_else(|| Error::missing_type("reference type set", "engine version conversion"))?;
        file.convert_types(reference, to)?;
    }
    file.write(&output, format)?;
    tracing::info!(
        "Converted {} -> {} ({})",
        input.as_ref().display(),
        output.as_ref().display(),
        format.display_name()
    );
    Ok(())
}
