//! # MacHavok
//!
//! A pure-Rust reflective codec for Havok `.hkx` container files.
//!
//! ## Supported Formats
//!
//! - **Tagfile** - Binary tagfiles (`TAG0`), read and write
//! - **XML tagfile** - Text twin of the tagfile, read and write
//! - **Packfile** - Legacy flat containers with fixup tables, read only
//!
//! Every format decodes to the same pair: a [`types::TypeSet`] describing
//! the engine types and an [`graph::ObjectGraph`] holding the objects.
//!
//! ## Quick Start
//!
//! ### Reading and Re-encoding
//!
//! ```no_run
//! use machavok::hkx::{HkxFile, HkxFormat};
//!
//! // Any container format is detected from its leading bytes
//! let file = HkxFile::read("skeleton.hkx", None)?;
//! println!("{} objects, {} types", file.graph.len(), file.types.len());
//!
//! // Write it back as a binary tagfile
//! file.write("skeleton_out.hkx", HkxFormat::Tagfile)?;
//! # Ok::<(), machavok::Error>(())
//! ```
//!
//! ### Converting Between Engine Versions
//!
//! ```no_run
//! use machavok::prelude::*;
//!
//! let reference = TypeSet::load("hk2010_types.json")?;
//! convert_file(
//!     "animation_2018.hkx",
//!     "animation_2010.xml",
//!     HkxFormat::Xml,
//!     Some(&reference),
//!     Some(EngineVersion::Hk2010),
//! )?;
//! # Ok::<(), machavok::Error>(())
//! ```
//!
//! ### Using the Prelude
//!
//! ```
//! use machavok::prelude::*;
//!
//! // Now you have access to:
//! // - HkxFile, HkxFormat, detect_format, convert_file
//! // - TypeSet, TypeDescriptor, ObjectGraph, Value
//! // - TypeConverter, EngineVersion, PointerWidth
//! // - Error, Result, and more
//! ```

pub mod error;
pub mod options;
pub mod types;
pub mod graph;
pub mod tagfile;
pub mod packfile;
pub mod xml;
pub mod convert;
pub mod hkx;
pub mod batch;

// Re-exports for convenience
pub use error::{Error, Result};

/// Prelude module for common imports
pub mod prelude {
    pub use crate::error::{Error, Result};
    pub use crate::options::{EngineVersion, PointerWidth, TagfileOptions, XmlOptions};
    pub use crate::types::{Member, TagKind, TypeDescriptor, TypeIndex, TypeSet};
    pub use crate::graph::{HkObject, MemberRename, ObjectGraph, ObjectId, Value, VariantRule, VariantSelector};

    // Container formats
    pub use crate::tagfile::{Tagfile, parse_tagfile, read_tagfile, serialize_tagfile, write_tagfile};
    pub use crate::packfile::{Packfile, parse_packfile, parse_packfile_with_types, read_packfile};
    pub use crate::xml::{XmlTagfile, parse_xml, read_xml, serialize_xml, write_xml};

    pub use crate::convert::TypeConverter;
    pub use crate::hkx::{HkxFile, HkxFormat, convert_file, detect_format};
    pub use crate::batch::{BatchConvertOptions, BatchConvertResult, batch_convert, find_hkx_files};
}

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
