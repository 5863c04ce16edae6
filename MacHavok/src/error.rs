//! Error types for `MacHavok`

use thiserror::Error;

/// The error type for `MacHavok` operations.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum Error {
    // ==================== IO Errors ====================
    /// IO error from file operations.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Unexpected end of data while reading a structure.
    #[error("unexpected end of data")]
    UnexpectedEof,

    // ==================== Container Framing Errors ====================
    /// Bad magic, truncated section, or a header field out of range.
    #[error("malformed header at offset {offset:#x}: {message}")]
    MalformedHeader {
        /// Description of what is wrong.
        message: String,
        /// Byte offset of the offending field.
        offset: usize,
    },

    /// The bytes do not look like any supported Havok container.
    #[error("unrecognized Havok container format (leading bytes {0})")]
    UnknownFormat(String),

    /// An item index in the packed data does not exist or has the wrong kind.
    #[error("invalid item index {index} referenced at data offset {offset:#x}")]
    InvalidItemIndex {
        /// The item index found in the data.
        index: u32,
        /// Offset of the reference within the data section.
        offset: usize,
    },

    // ==================== Type System Errors ====================
    /// A packfile class member has a (type, subtype) pair with no known layout.
    #[error("unknown member layout for {class_name}.{member}: type {member_type}, subtype {subtype}")]
    UnknownMemberLayout {
        /// Declaring class.
        class_name: String,
        /// Member name.
        member: String,
        /// Raw `hkClassMember::Type`.
        member_type: u8,
        /// Raw `hkClassMember` subtype.
        subtype: u8,
    },

    /// A type index or name cannot be resolved.
    #[error("missing type reference '{name}' ({context})")]
    MissingTypeReference {
        /// The unresolved type name or index.
        name: String,
        /// Where the reference was found.
        context: String,
    },

    /// Pointer width is not 4 or 8 bytes.
    #[error("invalid pointer width: {0} (expected 4 or 8)")]
    InvalidPointerWidth(u32),

    /// No conversion path exists between the two engine versions.
    #[error("unsupported type conversion from {from} to {to}")]
    UnsupportedConversion {
        /// Source engine version.
        from: String,
        /// Requested engine version.
        to: String,
    },

    // ==================== Object Graph Errors ====================
    /// Packing reached an object without an identity index, or a dangling object id.
    #[error("incomplete object graph: object {object}: {message}")]
    IncompleteGraph {
        /// Arena id of the offending object.
        object: usize,
        /// Description of what is missing.
        message: String,
    },

    /// No variant rule matched an object's members.
    #[error("no variant of {base} matches members [{}]", .members.join(", "))]
    UnknownVariant {
        /// The abstract base type being resolved.
        base: String,
        /// Member names present on the object.
        members: Vec<String>,
    },

    /// Integer outside the tagfile varint range.
    #[error("varint overflow: {value:#x}{}", .offset.map(|o| format!(" at offset {o:#x}")).unwrap_or_default())]
    VarIntOverflow {
        /// The value (or leading byte when decoding) that cannot be represented.
        value: u64,
        /// Offset in the input when decoding.
        offset: Option<usize>,
    },

    // ==================== Parsing Errors ====================
    /// XML parsing error.
    #[error("XML parse error: {0}")]
    XmlError(#[from] quick_xml::Error),

    /// XML attribute error.
    #[error("XML attribute error: {0}")]
    XmlAttrError(String),

    /// JSON parsing or serialization error.
    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    /// UTF-8 conversion error.
    #[error("UTF-8 conversion error: {0}")]
    Utf8Error(#[from] std::string::FromUtf8Error),

    /// Invalid format error (use specific variants when possible).
    #[error("invalid format: {0}")]
    InvalidFormat(String),
}

impl Error {
    pub(crate) fn malformed(message: impl Into<String>, offset: usize) -> Self {
        Error::MalformedHeader {
            message: message.into(),
            offset,
        }
    }

    pub(crate) fn missing_type(name: impl Into<String>, context: impl Into<String>) -> Self {
        Error::MissingTypeReference {
            name: name.into(),
            context: context.into(),
        }
    }
}

// Add conversion from quick_xml::events::attributes::AttrError
impl From<quick_xml::events::attributes::AttrError> for Error {
    fn from(err: quick_xml::events::attributes::AttrError) -> Self {
        Error::XmlAttrError(err.to_string())
    }
}

/// A specialized Result type for `MacHavok` operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_messages_name_offsets() {
        let err = Error::malformed("bad magic", 0x10);
        assert_eq!(err.to_string(), "malformed header at offset 0x10: bad magic");

        let err = Error::VarIntOverflow { value: 0x8000000, offset: None };
        assert_eq!(err.to_string(), "varint overflow: 0x8000000");

        let err = Error::VarIntOverflow { value: 0xF0, offset: Some(4) };
        assert_eq!(err.to_string(), "varint overflow: 0xf0 at offset 0x4");
    }

    #[test]
    fn test_unknown_variant_lists_members() {
        let err = Error::UnknownVariant {
            base: "hkpShape".to_string(),
            members: vec!["a".to_string(), "b".to_string()],
        };
        assert_eq!(err.to_string(), "no variant of hkpShape matches members [a, b]");
    }
}
