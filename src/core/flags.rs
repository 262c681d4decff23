use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// SGLI Level-2 QA_flag bit names (bit 0 first)
pub const SGLI_L2_FLAGS: [&str; 15] = [
    "NODATA", "LAND", "ATMFAIL", "CLDICE", "CLDICEWARN", "STRAYLIGHT", "HIGLINT", "MODGLINT",
    "HISOLZEN", "HIAIRSOLTHK", "LOWLW", "TURBIDW", "SHALLOW", "CDOMFAIL", "CHLFAIL",
];

pub const SGLI_L2_INVALID: [&str; 6] = ["ATMFAIL", "LAND", "HIGLINT", "STRAYLIGHT", "CLDICE", "NODATA"];

/// SeaDAS l2gen `l2_flags` bit names (bit 0 first)
pub const SEADAS_L2_FLAGS: [&str; 32] = [
    "ATMFAIL", "LAND", "PRODWARN", "HIGLINT", "HILT", "HISATZEN", "COASTZ", "SPARE",
    "STRAYLIGHT", "CLDICE", "COCCOLITH", "TURBIDW", "HISOLZEN", "SPARE", "LOWLW", "CHLFAIL",
    "NAVWARN", "ABSAER", "SPARE", "MAXAERITER", "MODGLINT", "CHLWARN", "ATMWARN", "SPARE",
    "SEAICE", "NAVFAIL", "FILTER", "SPARE", "BOWTIEDEL", "HIPOL", "PRODFAIL", "SPARE",
];

pub const SEADAS_L2_INVALID: [&str; 9] = [
    "ATMFAIL", "LAND", "HIGLINT", "HILT", "STRAYLIGHT", "CLDICE", "LOWLW", "NAVFAIL", "NAVWARN",
];

/// Decode a bitmask into the names of its set bits.
///
/// Bit `k` maps to `names[k]`; bits beyond `names` are ignored.
pub fn decode<S: AsRef<str>>(bitmask: u64, names: &[S]) -> BTreeSet<&str> {
    names
        .iter()
        .enumerate()
        .take(64)
        .filter(|(bit, _)| bitmask & (1u64 << bit) != 0)
        .map(|(_, name)| name.as_ref())
        .collect()
}

/// True when none of the decoded flags is in `invalid`
pub fn is_pure<S: AsRef<str>>(bitmask: u64, names: &[S], invalid: &BTreeSet<String>) -> bool {
    decode(bitmask, names)
        .into_iter()
        .all(|name| !invalid.contains(name))
}

/// Ordered flag vocabulary of a product family plus its disqualifying subset
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "FlagSetDef", into = "FlagSetDef")]
pub struct FlagSet {
    names: Vec<String>,
    invalid: BTreeSet<String>,
    invalid_mask: u64,
}

#[derive(Serialize, Deserialize)]
struct FlagSetDef {
    names: Vec<String>,
    invalid: BTreeSet<String>,
}

impl TryFrom<FlagSetDef> for FlagSet {
    type Error = crate::types::OcError;

    fn try_from(def: FlagSetDef) -> Result<Self, Self::Error> {
        FlagSet::new(def.names, def.invalid)
    }
}

impl From<FlagSet> for FlagSetDef {
    fn from(set: FlagSet) -> Self {
        FlagSetDef {
            names: set.names,
            invalid: set.invalid,
        }
    }
}

impl FlagSet {
    /// Build a flag set. Invalid names that are not part of the vocabulary
    /// are rejected since they could never match.
    pub fn new<N, I>(names: N, invalid: I) -> crate::types::OcResult<Self>
    where
        N: IntoIterator,
        N::Item: Into<String>,
        I: IntoIterator,
        I::Item: Into<String>,
    {
        let names: Vec<String> = names.into_iter().map(Into::into).collect();
        if names.len() > 64 {
            return Err(crate::types::OcError::InvalidParameter {
                name: "flag_names",
                value: names.len().to_string(),
                reason: "at most 64 flag bits are supported".to_string(),
            });
        }

        let invalid: BTreeSet<String> = invalid.into_iter().map(Into::into).collect();
        if let Some(unknown) = invalid.iter().find(|name| !names.contains(name)) {
            return Err(crate::types::OcError::Config(format!(
                "invalid flag '{}' is not part of the flag vocabulary",
                unknown
            )));
        }

        let invalid_mask = Self::mask_for(&names, &invalid);
        Ok(Self {
            names,
            invalid,
            invalid_mask,
        })
    }

    fn mask_for(names: &[String], invalid: &BTreeSet<String>) -> u64 {
        names
            .iter()
            .enumerate()
            .filter(|(_, name)| invalid.contains(*name))
            .fold(0u64, |mask, (bit, _)| mask | (1u64 << bit))
    }

    /// SGLI Level-2 standard product QA flags
    pub fn sgli_l2() -> Self {
        Self::from_static(&SGLI_L2_FLAGS, &SGLI_L2_INVALID)
    }

    /// SeaDAS l2gen output flags
    pub fn seadas_l2() -> Self {
        Self::from_static(&SEADAS_L2_FLAGS, &SEADAS_L2_INVALID)
    }

    /// OC-SMART output, where any set bit disqualifies a pixel
    pub fn ocsmart() -> Self {
        let names: Vec<String> = (0..32).map(|bit| format!("BIT{}", bit)).collect();
        let invalid: BTreeSet<String> = names.iter().cloned().collect();
        let invalid_mask = Self::mask_for(&names, &invalid);
        Self {
            names,
            invalid,
            invalid_mask,
        }
    }

    fn from_static(names: &[&str], invalid: &[&str]) -> Self {
        let names: Vec<String> = names.iter().map(|s| s.to_string()).collect();
        let invalid: BTreeSet<String> = invalid.iter().map(|s| s.to_string()).collect();
        let invalid_mask = Self::mask_for(&names, &invalid);
        Self {
            names,
            invalid,
            invalid_mask,
        }
    }

    /// Same vocabulary with a different disqualifying subset
    pub fn with_invalid<I>(self, invalid: I) -> crate::types::OcResult<Self>
    where
        I: IntoIterator,
        I::Item: Into<String>,
    {
        Self::new(self.names, invalid)
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn invalid(&self) -> &BTreeSet<String> {
        &self.invalid
    }

    pub fn decode(&self, bitmask: u64) -> BTreeSet<&str> {
        decode(bitmask, &self.names)
    }

    pub fn is_pure(&self, bitmask: u64) -> bool {
        bitmask & self.invalid_mask == 0
    }
}
