// src/error.rs

use crate::header::ItemKind;

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum UicardError {
    /// The image ended before a full item header or body could be read.
    IncompleteImage,

    /// The 8-byte image magic did not match.
    InvalidMagic,

    /// An item type byte is not one of the known tags.
    InvalidItemKind(u8),

    /// A life-cycle status byte is not one of the known codings.
    InvalidLcs(u8),

    /// A tree root has the wrong type (first tree must be an MF, every
    /// later tree an ADF).
    MisplacedRoot(ItemKind),

    /// An item's size field disagrees with the space its parent grants it.
    BrokenContainment,

    /// The folder walk needed more than the bounded cursor stack allows.
    NestingTooDeep,

    /// The forest already holds 255 trees (the tree index is 8-bit).
    TooManyTrees,

    /// A caller-supplied argument is out of range or malformed.
    BadParameters,

    /// The destination buffer cannot hold the encoded output.
    BufferTooShort,

    /// Lookup missed: no file with that FID/SID/AID, or no such record.
    NotFound,

    /// Declared but deliberately unimplemented operation (DF-name, path,
    /// and data-offset selection).
    NotImplemented,

    /// No handler claimed the APDU (proprietary class without a hook).
    ApduUnhandled,

    /// A JSON disk description violates the schema. Carries a short
    /// static reason.
    BadDescription(&'static str),

    /// Filesystem failure while loading or saving an image.
    #[cfg(feature = "std")]
    Io(std::io::ErrorKind),
}

// Manual implementation of Display for no_std environments.
impl core::fmt::Display for UicardError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::IncompleteImage => write!(f, "Incomplete disk image"),
            Self::InvalidMagic => write!(f, "Invalid image magic"),
            Self::InvalidItemKind(t) => write!(f, "Invalid item type: 0x{:02x}", t),
            Self::InvalidLcs(b) => write!(f, "Invalid life-cycle status: 0x{:02x}", b),
            Self::MisplacedRoot(kind) => {
                write!(f, "Tree root has type {:?} (expected MF then ADFs)", kind)
            }
            Self::BrokenContainment => write!(f, "Item size exceeds its parent's extent"),
            Self::NestingTooDeep => write!(f, "File nesting exceeds the depth bound"),
            Self::TooManyTrees => write!(f, "Disk already holds 255 trees"),
            Self::BadParameters => write!(f, "Bad parameters"),
            Self::BufferTooShort => write!(f, "Buffer too short"),
            Self::NotFound => write!(f, "Not found"),
            Self::NotImplemented => write!(f, "Operation not implemented"),
            Self::ApduUnhandled => write!(f, "APDU not handled"),
            Self::BadDescription(why) => write!(f, "Bad disk description: {}", why),
            #[cfg(feature = "std")]
            Self::Io(kind) => write!(f, "I/O error: {:?}", kind),
        }
    }
}

// Enable standard Error trait if the "std" feature is on.
#[cfg(feature = "std")]
impl std::error::Error for UicardError {}

#[cfg(feature = "std")]
impl From<std::io::Error> for UicardError {
    fn from(e: std::io::Error) -> Self {
        UicardError::Io(e.kind())
    }
}
