use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// Modification time in nanoseconds since the Unix epoch
pub type Timestamp = u64;

/// Stable 32-bit identifier for an interned path.
///
/// Id 0 is the null location and is never handed out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct LocationId(u32);

impl LocationId {
    pub const NULL: LocationId = LocationId(0);

    /// Smallest id the interner allocates
    pub const FIRST: LocationId = LocationId(1);

    pub const fn new(raw: u32) -> Self {
        Self(raw)
    }

    pub const fn get(self) -> u32 {
        self.0
    }

    pub const fn is_null(self) -> bool {
        self.0 == 0
    }

    /// Fixed-width key/value form used in the tables
    pub fn to_le_bytes(self) -> [u8; 4] {
        self.0.to_le_bytes()
    }

    /// Parse the fixed-width form; `None` unless `bytes` is exactly 4 bytes
    pub fn from_le_bytes(bytes: &[u8]) -> Option<Self> {
        let raw: [u8; 4] = bytes.try_into().ok()?;
        Some(Self(u32::from_le_bytes(raw)))
    }
}

impl fmt::Display for LocationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Source language of a translation unit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[repr(u16)]
pub enum Language {
    #[default]
    Unknown = 0,
    C = 1,
    Cpp = 2,
    ObjC = 3,
    ObjCpp = 4,
    CHeader = 5,
    CppHeader = 6,
}

impl Language {
    pub fn from_extension(ext: &str) -> Self {
        match ext.to_lowercase().as_str() {
            "c" => Language::C,
            "cpp" | "cc" | "cxx" | "c++" | "cp" => Language::Cpp,
            "m" => Language::ObjC,
            "mm" => Language::ObjCpp,
            "h" => Language::CHeader,
            "hpp" | "hxx" | "hh" | "h++" | "tcc" | "inl" => Language::CppHeader,
            _ => Language::Unknown,
        }
    }

    /// Inverse of `self as u16`; unknown tags map to `Unknown`
    pub fn from_u16(tag: u16) -> Self {
        match tag {
            1 => Language::C,
            2 => Language::Cpp,
            3 => Language::ObjC,
            4 => Language::ObjCpp,
            5 => Language::CHeader,
            6 => Language::CppHeader,
            _ => Language::Unknown,
        }
    }

    pub fn is_header(self) -> bool {
        matches!(self, Language::CHeader | Language::CppHeader)
    }
}

/// Project database metadata stored in meta.json
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DbMeta {
    pub version: u32,
    pub root_path: PathBuf,
    pub created_at: u64,
    pub updated_at: u64,
}

impl DbMeta {
    pub const VERSION: u32 = 1;
}

impl Default for DbMeta {
    fn default() -> Self {
        Self {
            version: Self::VERSION,
            root_path: PathBuf::new(),
            created_at: 0,
            updated_at: 0,
        }
    }
}
