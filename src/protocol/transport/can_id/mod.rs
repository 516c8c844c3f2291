//! Standard (11-bit) and extended (29-bit) CAN identifiers used to address
//! OBD-II requests and to match their replies.
use crate::error::CanIdBuildError;
use embedded_can::{ExtendedId, Id, StandardId};

/// Largest 11-bit identifier.
pub const MAX_STANDARD_ID: u32 = 0x7FF;
/// Largest 29-bit identifier.
pub const MAX_EXTENDED_ID: u32 = 0x1FFF_FFFF;

/// Offset between an OBD-II physical request id and its reply id
/// (0x7E0 → 0x7E8, 0x18DA10F1 → 0x18DA10F9).
const RESPONSE_ID_BIT: u32 = 0x08;

//==================================================================================CAN_ID
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
/// Validated CAN arbitration identifier together with its frame format.
pub struct CanId {
    raw: u32,
    extended: bool,
}

impl CanId {
    /// Build an identifier, rejecting values that do not fit the selected format.
    pub fn new(raw: u32, extended: bool) -> Result<Self, CanIdBuildError> {
        let max = if extended {
            MAX_EXTENDED_ID
        } else {
            MAX_STANDARD_ID
        };
        if raw > max {
            return Err(CanIdBuildError::OutOfRange { id: raw, extended });
        }
        Ok(Self { raw, extended })
    }

    /// 11-bit identifier.
    pub fn standard(raw: u16) -> Result<Self, CanIdBuildError> {
        Self::new(raw as u32, false)
    }

    /// 29-bit identifier.
    pub fn extended(raw: u32) -> Result<Self, CanIdBuildError> {
        Self::new(raw, true)
    }

    /// Raw identifier bits.
    pub fn raw(&self) -> u32 {
        self.raw
    }

    /// Whether the identifier uses the 29-bit format.
    pub fn is_extended(&self) -> bool {
        self.extended
    }

    /// Reply identifier an ECU uses when answering a physical request sent to `self`.
    /// Setting bit 3 never leaves the identifier's range.
    pub fn default_response(&self) -> Self {
        Self {
            raw: self.raw | RESPONSE_ID_BIT,
            extended: self.extended,
        }
    }
}

impl From<StandardId> for CanId {
    fn from(id: StandardId) -> Self {
        Self {
            raw: id.as_raw() as u32,
            extended: false,
        }
    }
}

impl From<ExtendedId> for CanId {
    fn from(id: ExtendedId) -> Self {
        Self {
            raw: id.as_raw(),
            extended: true,
        }
    }
}

impl From<Id> for CanId {
    fn from(id: Id) -> Self {
        match id {
            Id::Standard(id) => id.into(),
            Id::Extended(id) => id.into(),
        }
    }
}

impl From<CanId> for Id {
    fn from(id: CanId) -> Self {
        // Range was checked when the CanId was built.
        if id.extended {
            Id::Extended(ExtendedId::new(id.raw).unwrap_or(ExtendedId::MAX))
        } else {
            Id::Standard(StandardId::new(id.raw as u16).unwrap_or(StandardId::MAX))
        }
    }
}
