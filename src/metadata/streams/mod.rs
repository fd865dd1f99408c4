//! Metadata stream heaps and the tables-stream header.
//!
//! A metadata root carries up to five streams: `#~` (the token tables),
//! `#Strings` (UTF-8 identifier strings), `#US` (UTF-16 user strings),
//! `#GUID` and `#Blob`. Each heap here holds a shared reference to the
//! image buffer and addresses it by offset, so heaps stay valid for the
//! lifetime of the [`crate::metadata::image::Image`] that owns them.

mod blob;
mod guid;
mod strings;
mod tablesheader;
mod userstrings;

pub use blob::Blob;
pub use guid::Guid;
pub use strings::Strings;
pub use tablesheader::TablesHeader;
pub use userstrings::UserStrings;
