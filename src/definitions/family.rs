use strum_macros::{Display, EnumIter, EnumString, FromRepr};

/// Well known ECU families and the bus address each answers on.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Display, EnumIter, EnumString, FromRepr)]
#[strum(ascii_case_insensitive)]
#[repr(u8)]
pub enum Family {
    GM = 0x00,
    DME = 0x12,
    EGS = 0x32,
    EWS = 0x44,
    ABS = 0x56,
    IHKA = 0x5b,
    KOMBI = 0x80,
    AIRBAG = 0xa4,
    LCM = 0xd0,
}

impl Family {
    pub fn address(&self) -> u8 {
        *self as u8
    }
}

/// Bus address of a family given by name, case insensitive.
pub fn address_for_family(name: &str) -> Option<u8> {
    name.parse::<Family>().ok().map(|family| family.address())
}
