use std::fmt;
use std::sync::Arc;

use strum::IntoEnumIterator;
use strum_macros::EnumIter;

use crate::decode::Response;
use crate::definitions::ControlUnitDefinition;

/// Identity field compared between a reply and a candidate definition.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, EnumIter)]
#[repr(u8)]
pub enum MatchField {
    PartNumber = 0x01,
    SoftwareVersion = 0x02,
    HardwareVersion = 0x04,
    CodingIndex = 0x08,
}

/// Set of [`MatchField`]s that agreed.
#[derive(Copy, Clone, PartialEq, Eq, Hash, Default)]
pub struct MatchFlags(u8);

impl MatchFlags {
    pub const NONE: MatchFlags = MatchFlags(0);
    pub const ALL: MatchFlags = MatchFlags(0x0f);

    pub fn bits(&self) -> u8 {
        self.0
    }

    pub fn contains(&self, field: MatchField) -> bool {
        self.0 & field as u8 != 0
    }

    pub fn insert(&mut self, field: MatchField) {
        self.0 |= field as u8;
    }

    pub fn remove(&mut self, field: MatchField) {
        self.0 &= !(field as u8);
    }

    pub fn is_all(&self) -> bool {
        *self == MatchFlags::ALL
    }

    pub fn fields(&self) -> impl Iterator<Item = MatchField> + '_ {
        MatchField::iter().filter(|field| self.contains(*field))
    }
}

impl fmt::Debug for MatchFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            MatchFlags::ALL => write!(f, "MatchFlags(All)"),
            MatchFlags::NONE => write!(f, "MatchFlags(None)"),
            _ => f.debug_tuple("MatchFlags").field(&self.fields().collect::<Vec<_>>()).finish(),
        }
    }
}

/// Outcome of a successful identification.
#[derive(Debug, Clone, PartialEq)]
pub struct Identification {
    pub definition: Arc<ControlUnitDefinition>,
    pub flags: MatchFlags,
    /// The reply decoded with the winning definition's identify operation
    pub response: Response,
}
