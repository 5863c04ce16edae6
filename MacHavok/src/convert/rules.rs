//! Per-hop type conversion rules
//!
//! Each downward hop between engine generations is a fixed list of
//! [`ConversionStep`]s. Steps run in order against the target set.

use crate::options::EngineVersion;
use lazy_static::lazy_static;

/// One rule of a conversion hop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConversionStep {
    /// Lower the type's version to at most `version`.
    CapVersion { type_name: String, version: u32 },
    /// Drop members that the older generation does not have.
    RemoveMembers { type_name: String, members: Vec<String> },
    RenameMember { type_name: String, from: String, to: String },
    /// Copy member flags from the reference definition.
    CopyMemberFlags { type_name: String },
    /// Bring a whole type over from the reference, with everything it uses.
    ImportType { type_name: String },
    /// Point a member at another reference type. The old member type is
    /// removed once nothing refers to it.
    RedirectMember {
        type_name: String,
        member: String,
        new_type: String,
    },
    /// Override the alignment of the named types.
    Realign { alignment: u32, types: Vec<String> },
    /// Pin a member at a fixed offset whenever its type is laid out.
    ForceOffset {
        type_name: String,
        member: String,
        offset: u32,
    },
}

impl ConversionStep {
    pub fn cap_version(type_name: &str, version: u32) -> Self {
        Self::CapVersion {
            type_name: type_name.to_string(),
            version,
        }
    }

    pub fn remove_members(type_name: &str, members: &[&str]) -> Self {
        Self::RemoveMembers {
            type_name: type_name.to_string(),
            members: members.iter().map(ToString::to_string).collect(),
        }
    }

    pub fn rename_member(type_name: &str, from: &str, to: &str) -> Self {
        Self::RenameMember {
            type_name: type_name.to_string(),
            from: from.to_string(),
            to: to.to_string(),
        }
    }

    pub fn copy_member_flags(type_name: &str) -> Self {
        Self::CopyMemberFlags {
            type_name: type_name.to_string(),
        }
    }

    pub fn import_type(type_name: &str) -> Self {
        Self::ImportType {
            type_name: type_name.to_string(),
        }
    }

    pub fn redirect_member(type_name: &str, member: &str, new_type: &str) -> Self {
        Self::RedirectMember {
            type_name: type_name.to_string(),
            member: member.to_string(),
            new_type: new_type.to_string(),
        }
    }

    pub fn realign(alignment: u32, types: &[&str]) -> Self {
        Self::Realign {
            alignment,
            types: types.iter().map(ToString::to_string).collect(),
        }
    }

    pub fn force_offset(type_name: &str, member: &str, offset: u32) -> Self {
        Self::ForceOffset {
            type_name: type_name.to_string(),
            member: member.to_string(),
            offset,
        }
    }

    /// Type the reference set must define for this step to run.
    ///
    /// Layout steps return `None`: they only touch types already present.
    #[must_use]
    pub fn reference_type(&self) -> Option<&str> {
        match self {
            Self::CapVersion { type_name, .. }
            | Self::RemoveMembers { type_name, .. }
            | Self::RenameMember { type_name, .. }
            | Self::CopyMemberFlags { type_name }
            | Self::ImportType { type_name }
            | Self::RedirectMember { type_name, .. } => Some(type_name.as_str()),
            Self::Realign { .. } | Self::ForceOffset { .. } => None,
        }
    }
}

lazy_static! {
    /// 2015, 2016 and 2018 tagfile types down to the 2014 generation.
    static ref TAGFILE_TO_2014: Vec<ConversionStep> = vec![
        ConversionStep::rename_member("hkReferencedObject", "sizeAndFlags", "memSizeAndFlags"),
        ConversionStep::rename_member("hkReferencedObject", "refCount", "referenceCount"),
        ConversionStep::redirect_member("hkReferencedObject", "memSizeAndFlags", "hkUint16"),
        ConversionStep::redirect_member("hkReferencedObject", "referenceCount", "hkInt16"),
        ConversionStep::redirect_member("hkRootLevelContainerNamedVariant", "variant", "hkRefVariant"),
        ConversionStep::copy_member_flags("hkRootLevelContainerNamedVariant"),
        ConversionStep::copy_member_flags("hkaBone"),
        ConversionStep::copy_member_flags("hkaSkeleton"),
        ConversionStep::cap_version("hkaSkeleton", 5),
        ConversionStep::cap_version("hkaAnimationContainer", 1),
        ConversionStep::cap_version("hkaAnimationBinding", 3),
        ConversionStep::realign(16, &["hkVector4", "hkQuaternion", "hkQsTransform"]),
    ];

    /// 2014 types down to the 2010 generation.
    static ref HK2014_TO_2010: Vec<ConversionStep> = vec![
        ConversionStep::remove_members("hkaSkeleton", &["partitions"]),
        ConversionStep::remove_members("hkaAnimationBinding", &["partitionIndices"]),
        ConversionStep::import_type("hkaSkeletonMapper"),
        ConversionStep::copy_member_flags("hkaAnimationBinding"),
        ConversionStep::cap_version("hkaSkeleton", 3),
        ConversionStep::cap_version("hkaAnimationBinding", 1),
        ConversionStep::cap_version("hkRootLevelContainer", 0),
    ];
}

/// Rules for one single-generation hop, if the hop exists.
#[must_use]
pub fn hop_rules(from: EngineVersion, to: EngineVersion) -> Option<&'static [ConversionStep]> {
    use EngineVersion::{Hk2010, Hk2014, Hk2015, Hk2016, Hk2018};
    match (from, to) {
        (Hk2015 | Hk2016 | Hk2018, Hk2014) => Some(TAGFILE_TO_2014.as_slice()),
        (Hk2014, Hk2010) => Some(HK2014_TO_2010.as_slice()),
        _ => None,
    }
}

/// Every type the built-in rules expect the reference set to define.
#[must_use]
pub fn required_reference_types() -> Vec<&'static str> {
    let mut names: Vec<&'static str> = Vec::new();
    for step in TAGFILE_TO_2014.iter().chain(HK2014_TO_2010.iter()) {
        let mut push = |name: &'static str| {
            if !names.contains(&name) {
                names.push(name);
            }
        };
        if let Some(name) = step.reference_type() {
            push(name);
        }
        if let ConversionStep::RedirectMember { new_type, .. } = step {
            push(new_type.as_str());
        }
    }
    names
}
