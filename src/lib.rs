#![no_std]

#[cfg(any(feature = "std", test))]
extern crate std;

// Needed for Vec
extern crate alloc;

pub mod apdu;
pub mod card;
pub mod disk;
pub mod error;
pub mod header;
pub mod lut;
pub mod tlv;
pub mod va;

#[cfg(feature = "json")]
pub mod json;

pub use apdu::{ClaKind, Command, Reply, ResBuffer, Response, DATA_MAX_SHRT};
pub use card::{Card, ProprietaryHandler};
pub use disk::{Disk, File, Tree};
pub use error::UicardError;
pub use header::{FileHdr, FileSpec, ItemHdr, ItemKind, Lcs};
pub use va::{Va, FID_MF};
