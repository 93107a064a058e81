//! Node attributes: opaque key/value pairs with "dormant" (cleared-but-retained) state.

use std::collections::BTreeMap;
use std::fmt;

/// An opaque attribute name.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct AttrKey(pub String);

impl fmt::Display for AttrKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for AttrKey {
    fn from(s: &str) -> Self {
        AttrKey(s.to_string())
    }
}

/// An opaque attribute value.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct AttrValue(pub String);

impl fmt::Display for AttrValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for AttrValue {
    fn from(s: &str) -> Self {
        AttrValue(s.to_string())
    }
}

/// `attrs` is a mapping `AttrKey -> (live, AttrValue)`. A "dormant" entry
/// (`live == false`) is a cleared attribute retained so the clear can
/// participate in later merges (spec §3, "Dormant attr").
pub type AttrMap = BTreeMap<AttrKey, (bool, AttrValue)>;

pub fn is_live(attrs: &AttrMap, key: &AttrKey) -> bool {
    attrs.get(key).is_some_and(|(live, _)| *live)
}
