//! XML tagfile form
//!
//! The textual twin of the binary tagfile:
//!
//! ```xml
//! <hktagfile version="2" sdkversion="hk_2014.1.0-r1">
//!     <class name="Node" version="1">
//!         <member name="value" type="int"/>
//!     </class>
//!     <object id="#0001" type="Node">
//!         <int name="value">7</int>
//!     </object>
//! </hktagfile>
//! ```
//!
//! Reals are written as `x` followed by their IEEE-754 bits in hex, so values
//! survive the text form bit for bit. Blocks made only of floats (`hkVector4`,
//! `hkQsTransform`, ...) use compact `vec4`/`vec8`/`vec12`/`vec16` tags.

pub mod reader;
pub mod writer;

pub use reader::{XmlTagfile, parse_xml, parse_xml_with_selector, read_xml};
pub use writer::{serialize_xml, write_xml};

use crate::error::{Error, Result};
use crate::types::{TagKind, TypeIndex, TypeSet};

/// Float counts that get a compact `vecN` tag.
const VEC_SIZES: [usize; 4] = [4, 8, 12, 16];

/// Number of floats in a type made only of floats, or `None`.
fn float_count(types: &TypeSet, type_index: TypeIndex) -> Result<Option<usize>> {
    let base = types.resolve_base(type_index)?;
    Ok(match types.kind(base)? {
        TagKind::Float => Some(1),
        TagKind::Tuple => {
            let count = types.data_type(base)?.tuple_count() as usize;
            float_count(types, types.element_type(type_index)?)?.map(|n| n * count)
        }
        TagKind::Class => {
            let members = types.all_members(type_index)?;
            if members.is_empty() {
                return Ok(None);
            }
            let mut total = 0;
            for member in members {
                match float_count(types, member.type_index)? {
                    Some(n) => total += n,
                    None => return Ok(None),
                }
            }
            Some(total)
        }
        _ => None,
    })
}

/// `vecN` tag for float blocks written compactly.
fn vec_tag(types: &TypeSet, type_index: TypeIndex) -> Result<Option<String>> {
    let kind = types.kind(type_index)?;
    if !matches!(kind, TagKind::Tuple | TagKind::Class) {
        return Ok(None);
    }
    Ok(float_count(types, type_index)?
        .filter(|n| VEC_SIZES.contains(n))
        .map(|n| format!("vec{n}")))
}

/// Whether elements of this type are written as whitespace-separated tokens.
fn is_token_kind(types: &TypeSet, type_index: TypeIndex) -> Result<bool> {
    Ok(matches!(
        types.kind(type_index)?,
        TagKind::Bool | TagKind::Char | TagKind::Int | TagKind::Float | TagKind::Pointer
    ))
}

fn format_real(value: f64, size: u32) -> String {
    match size {
        2 => format!("x{:04x}", half::f16::from_f64(value).to_bits()),
        8 => format!("x{:016x}", value.to_bits()),
        _ => format!("x{:08x}", (value as f32).to_bits()),
    }
}

fn parse_real(token: &str, size: u32) -> Result<f64> {
    let bad = || Error::InvalidFormat(format!("invalid real '{token}'"));
    let Some(hex) = token.strip_prefix('x') else {
        return token.parse::<f64>().map_err(|_| bad());
    };
    let bits = u64::from_str_radix(hex, 16).map_err(|_| bad())?;
    Ok(match size {
        2 => half::f16::from_bits(bits as u16).to_f64(),
        8 => f64::from_bits(bits),
        _ => f64::from(f32::from_bits(bits as u32)),
    })
}

fn format_ref(index: u32) -> String {
    format!("#{index:04}")
}

fn parse_ref(token: &str) -> Result<u32> {
    token
        .trim()
        .trim_start_matches('#')
        .parse()
        .map_err(|_| Error::InvalidFormat(format!("invalid object reference '{token}'")))
}
