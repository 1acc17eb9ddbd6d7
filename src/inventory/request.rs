//! Inventory request builders
//!
//! Each protocol has its own start request. The optional sub-parameters
//! (TID read, user-data read) carry fixed memory windows; callers only say
//! whether they want them.

use serde::{Deserialize, Serialize};

use crate::transport::Request;
use crate::types::{AntennaMask, ReadMode, TagProtocol};

/// TID read mode: let the tag decide how many words to return.
pub const TID_MODE_ADAPTIVE: u8 = 0;
/// TID length requested from 6C and GB tags, in words.
pub const TID_LEN_WORDS: u8 = 6;
/// User-data window for 6C and GB tags, in words.
pub const USER_DATA_LEN_WORDS: u8 = 4;
/// 6B area selector reading TID and user data together.
pub const ISO6B_AREA_TID_AND_USER_DATA: u8 = 1;
/// User-data window for 6B tags, in bytes.
pub const ISO6B_USER_DATA_LEN_BYTES: u8 = 8;
/// GB user sub-area 0.
pub const GB_USER_CHILD_AREA: u8 = 0x30;

/// TID read sub-parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TidRead {
    /// Read mode selector
    pub mode: u8,
    /// Length in words
    pub len: u8,
}

impl Default for TidRead {
    fn default() -> Self {
        Self {
            mode: TID_MODE_ADAPTIVE,
            len: TID_LEN_WORDS,
        }
    }
}

/// User-data read window. `len` is in words for 6C/GB and bytes for 6B.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserDataRead {
    /// First word (or byte, for 6B)
    pub start: u16,
    /// Length of the window
    pub len: u8,
}

/// GB user-data read window with its sub-area selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GbUserDataRead {
    /// Sub-area selector
    pub child_area: u8,
    /// First word
    pub start: u16,
    /// Length in words
    pub len: u8,
}

/// Optional reads attached to a 6C or GB inventory.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReadOptions {
    /// Read TID
    pub read_tid: bool,
    /// Read user memory
    pub read_user_data: bool,
}

impl ReadOptions {
    /// Options with the given reads.
    pub fn new(read_tid: bool, read_user_data: bool) -> Self {
        Self {
            read_tid,
            read_user_data,
        }
    }
}

/// EPC (6C) inventory start request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EpcInventoryRequest {
    /// Antennas to scan
    pub antennas: AntennaMask,
    /// Single or continuous
    pub mode: ReadMode,
    /// TID read, if requested
    pub read_tid: Option<TidRead>,
    /// User-data read, if requested
    pub read_user_data: Option<UserDataRead>,
}

impl EpcInventoryRequest {
    /// Builds the request from `options`.
    pub fn new(antennas: AntennaMask, mode: ReadMode, options: ReadOptions) -> Self {
        Self {
            antennas,
            mode,
            read_tid: options.read_tid.then(TidRead::default),
            read_user_data: options.read_user_data.then_some(UserDataRead {
                start: 0,
                len: USER_DATA_LEN_WORDS,
            }),
        }
    }
}

/// ISO 6B inventory start request. The 6B request always reads TID and user
/// data together, so it has no optional reads.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Iso6bInventoryRequest {
    /// Antennas to scan
    pub antennas: AntennaMask,
    /// Single or continuous
    pub mode: ReadMode,
    /// Area selector
    pub area: u8,
    /// User-data window
    pub read_user_data: UserDataRead,
}

impl Iso6bInventoryRequest {
    /// Request reading TID and 8 bytes of user data.
    pub fn new(antennas: AntennaMask, mode: ReadMode) -> Self {
        Self {
            antennas,
            mode,
            area: ISO6B_AREA_TID_AND_USER_DATA,
            read_user_data: UserDataRead {
                start: 0,
                len: ISO6B_USER_DATA_LEN_BYTES,
            },
        }
    }
}

/// GB inventory start request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GbInventoryRequest {
    /// Antennas to scan
    pub antennas: AntennaMask,
    /// Single or continuous
    pub mode: ReadMode,
    /// TID read, if requested
    pub read_tid: Option<TidRead>,
    /// User-data read, if requested
    pub read_user_data: Option<GbUserDataRead>,
}

impl GbInventoryRequest {
    /// Builds the request from `options`.
    pub fn new(antennas: AntennaMask, mode: ReadMode, options: ReadOptions) -> Self {
        Self {
            antennas,
            mode,
            read_tid: options.read_tid.then(TidRead::default),
            read_user_data: options.read_user_data.then_some(GbUserDataRead {
                child_area: GB_USER_CHILD_AREA,
                start: 0,
                len: USER_DATA_LEN_WORDS,
            }),
        }
    }
}

/// A start request together with the protocol it scans for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StartRequest {
    /// Protocol being scanned
    pub protocol: TagProtocol,
    /// Antennas being scanned
    pub antennas: AntennaMask,
    /// Wire request
    pub request: Request,
}

impl StartRequest {
    /// EPC 6C scan.
    pub fn epc(antennas: AntennaMask, mode: ReadMode, options: ReadOptions) -> Self {
        Self {
            protocol: TagProtocol::Epc6c,
            antennas,
            request: Request::InventoryEpc(EpcInventoryRequest::new(antennas, mode, options)),
        }
    }

    /// ISO 6B scan.
    pub fn iso6b(antennas: AntennaMask, mode: ReadMode) -> Self {
        Self {
            protocol: TagProtocol::Iso6b,
            antennas,
            request: Request::Inventory6b(Iso6bInventoryRequest::new(antennas, mode)),
        }
    }

    /// GB scan.
    pub fn gb(antennas: AntennaMask, mode: ReadMode, options: ReadOptions) -> Self {
        Self {
            protocol: TagProtocol::Gb,
            antennas,
            request: Request::InventoryGb(GbInventoryRequest::new(antennas, mode, options)),
        }
    }

    /// Builds the start request for `protocol`, or `None` if the protocol
    /// has none (see [`TagProtocol::can_start`]). 6B ignores `options`.
    pub fn for_protocol(
        protocol: TagProtocol,
        antennas: AntennaMask,
        mode: ReadMode,
        options: ReadOptions,
    ) -> Option<Self> {
        let start = match protocol {
            TagProtocol::Epc6c => Self::epc(antennas, mode, options),
            TagProtocol::Iso6b => Self::iso6b(antennas, mode),
            TagProtocol::Gb => Self::gb(antennas, mode, options),
            TagProtocol::Gjb => return None,
        };
        Some(start)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_epc_request_optional_reads() {
        let mask = AntennaMask::from_bits(0b0001);
        let bare = EpcInventoryRequest::new(mask, ReadMode::Continuous, ReadOptions::default());
        assert!(bare.read_tid.is_none());
        assert!(bare.read_user_data.is_none());

        let full = EpcInventoryRequest::new(mask, ReadMode::Single, ReadOptions::new(true, true));
        assert_eq!(
            full.read_tid,
            Some(TidRead {
                mode: TID_MODE_ADAPTIVE,
                len: 6
            })
        );
        assert_eq!(full.read_user_data, Some(UserDataRead { start: 0, len: 4 }));
    }

    #[test]
    fn test_iso6b_request_always_reads_both_areas() {
        let req = Iso6bInventoryRequest::new(AntennaMask::default(), ReadMode::Continuous);
        assert_eq!(req.area, ISO6B_AREA_TID_AND_USER_DATA);
        assert_eq!(req.read_user_data, UserDataRead { start: 0, len: 8 });
    }

    #[test]
    fn test_gb_user_data_selects_child_area() {
        let req = GbInventoryRequest::new(
            AntennaMask::default(),
            ReadMode::Continuous,
            ReadOptions::new(false, true),
        );
        assert!(req.read_tid.is_none());
        let user = req.read_user_data.unwrap();
        assert_eq!(user.child_area, 0x30);
        assert_eq!(user.len, USER_DATA_LEN_WORDS);
    }

    #[test]
    fn test_start_request_tags_protocol() {
        let start = StartRequest::gb(
            AntennaMask::default(),
            ReadMode::Single,
            ReadOptions::default(),
        );
        assert_eq!(start.protocol, TagProtocol::Gb);
        assert_eq!(start.request.name(), "inventory-gb");
    }

    #[test]
    fn test_for_protocol_matches_can_start() {
        let mask = AntennaMask::from_bits(0b0001);
        for protocol in TagProtocol::ALL {
            let options = ReadOptions::default();
            let start = StartRequest::for_protocol(protocol, mask, ReadMode::Single, options);
            assert_eq!(start.is_some(), protocol.can_start());
            if let Some(start) = start {
                assert_eq!(start.protocol, protocol);
            }
        }
    }
}
