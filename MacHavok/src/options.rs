//! Codec configuration: pointer width, engine versions and writer options

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Pointer width of the target platform layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum PointerWidth {
    /// 32-bit layouts (4-byte pointers).
    Four,
    /// 64-bit layouts (8-byte pointers).
    #[default]
    Eight,
}

impl PointerWidth {
    /// Width in bytes.
    #[must_use]
    pub const fn bytes(self) -> u32 {
        match self {
            Self::Four => 4,
            Self::Eight => 8,
        }
    }

    /// Width in bytes as `usize`.
    #[must_use]
    pub const fn size(self) -> usize {
        self.bytes() as usize
    }
}

impl TryFrom<u32> for PointerWidth {
    type Error = Error;

    fn try_from(value: u32) -> Result<Self> {
        match value {
            4 => Ok(Self::Four),
            8 => Ok(Self::Eight),
            other => Err(Error::InvalidPointerWidth(other)),
        }
    }
}

/// Havok engine generations the codec knows about.
///
/// Ordered oldest first, so `Hk2010 < Hk2018`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum EngineVersion {
    /// Havok 2010 (packfile generation).
    Hk2010,
    /// Havok 2014 (packfile / XML tagfile generation).
    Hk2014,
    /// Havok 2015 (binary tagfile).
    Hk2015,
    /// Havok 2016 (binary tagfile).
    Hk2016,
    /// Havok 2018 (binary tagfile).
    Hk2018,
}

impl EngineVersion {
    /// SDK version string as written in packfile headers and XML tagfiles.
    #[must_use]
    pub const fn sdk_string(self) -> &'static str {
        match self {
            Self::Hk2010 => "hk_2010.2.0-r1",
            Self::Hk2014 => "hk_2014.1.0-r1",
            Self::Hk2015 => "20150100",
            Self::Hk2016 => "20160100",
            Self::Hk2018 => "20180100",
        }
    }

    /// Guess the generation from an SDK version string (`SDKV` section, packfile
    /// contents version or XML `sdkversion` attribute).
    #[must_use]
    pub fn from_sdk_string(sdk: &str) -> Option<Self> {
        let sdk = sdk.trim_end_matches(['\0', '\u{ff}']);
        if sdk.starts_with("hk_2010") {
            Some(Self::Hk2010)
        } else if sdk.starts_with("hk_2012") || sdk.starts_with("hk_2013") || sdk.starts_with("hk_2014") {
            Some(Self::Hk2014)
        } else if sdk.starts_with("2015") {
            Some(Self::Hk2015)
        } else if sdk.starts_with("2016") || sdk.starts_with("2017") {
            Some(Self::Hk2016)
        } else if sdk.starts_with("2018") || sdk.starts_with("2019") {
            Some(Self::Hk2018)
        } else {
            None
        }
    }
}

impl fmt::Display for EngineVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.sdk_string())
    }
}

/// Options for writing binary tagfiles.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TagfileOptions {
    /// Pointer width used for item references in `DATA`.
    pub pointer_width: PointerWidth,
    /// Eight-character `SDKV` payload, e.g. `20180100`.
    pub sdk_version: String,
}

impl Default for TagfileOptions {
    fn default() -> Self {
        Self {
            pointer_width: PointerWidth::Eight,
            sdk_version: EngineVersion::Hk2018.sdk_string().to_string(),
        }
    }
}

impl TagfileOptions {
    /// Create options with the 2018 defaults
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the pointer width
    #[must_use]
    pub fn with_pointer_width(mut self, pointer_width: PointerWidth) -> Self {
        self.pointer_width = pointer_width;
        self
    }

    /// Set the SDK version string
    #[must_use]
    pub fn with_sdk_version(mut self, sdk_version: impl Into<String>) -> Self {
        self.sdk_version = sdk_version.into();
        self
    }

    /// Validate the options
    pub fn validate(&self) -> Result<()> {
        if self.sdk_version.len() != 8 || !self.sdk_version.is_ascii() {
            return Err(Error::InvalidFormat(format!(
                "SDKV must be 8 ASCII characters, got {:?}",
                self.sdk_version
            )));
        }
        Ok(())
    }
}

/// Options for writing XML tagfiles.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct XmlOptions {
    /// Value of the `sdkversion` attribute.
    pub sdk_version: String,
    /// Value of the `version` attribute of `hktagfile`.
    pub tagfile_version: u32,
}

impl Default for XmlOptions {
    fn default() -> Self {
        Self {
            sdk_version: EngineVersion::Hk2014.sdk_string().to_string(),
            tagfile_version: 2,
        }
    }
}

impl XmlOptions {
    /// Create options with the 2014 defaults
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the SDK version string
    #[must_use]
    pub fn with_sdk_version(mut self, sdk_version: impl Into<String>) -> Self {
        self.sdk_version = sdk_version.into();
        self
    }

    /// Validate the options
    pub fn validate(&self) -> Result<()> {
        if self.sdk_version.is_empty() {
            return Err(Error::InvalidFormat("sdkversion must not be empty".to_string()));
        }
        if !(1..=3).contains(&self.tagfile_version) {
            return Err(Error::InvalidFormat(format!(
                "unsupported XML tagfile version {}",
                self.tagfile_version
            )));
        }
        Ok(())
    }
}
