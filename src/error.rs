use thiserror::Error;

use crate::metadata::token::Token;

macro_rules! malformed_error {
    // Single string version
    ($msg:expr) => {
        crate::Error::Malformed {
            message: $msg.to_string(),
            file: file!(),
            line: line!(),
        }
    };

    // Format string with arguments version
    ($fmt:expr, $($arg:tt)*) => {
        crate::Error::Malformed {
            message: format!($fmt, $($arg)*),
            file: file!(),
            line: line!(),
        }
    };
}

/// The generic Error type, covering every failure this library can report.
///
/// # Error Categories
///
/// ## Image loading
/// - [`Error::Malformed`] - Corrupted or invalid metadata structure
/// - [`Error::OutOfBounds`] - Attempted read beyond the image boundaries
/// - [`Error::NotSupported`] - Unsupported file format or feature
/// - [`Error::Empty`] - Empty input provided
/// - [`Error::UnresolvedType`] - A type reference could not be linked after phase 2
/// - [`Error::TypeRedefined`] - The same (scope, namespace, name) was defined twice
/// - [`Error::BadMemberRange`] - A field/method/param token range is backward or dangling
///
/// ## Layout
/// - [`Error::LayoutCycle`] - A value type directly or indirectly embeds itself
/// - [`Error::LayoutInvalidPacking`] - Packing size outside {0,1,2,4,8}
/// - [`Error::VtableOverflow`] - More than 65535 virtual slots
/// - [`Error::LayoutFailed`] - A field or parent type could not be laid out
///
/// Layout errors leave only the failing class unusable. Resolution "not
/// found" outcomes are `None` results rather than errors, and invocation
/// faults travel through the thread's pending-exception slot (see
/// [`crate::engine`]), never through this enum.
#[derive(Error, Debug)]
pub enum Error {
    /// The image is damaged and could not be parsed.
    ///
    /// Includes the source location where the malformation was detected
    /// for debugging purposes.
    #[error("Malformed - {file}:{line}: {message}")]
    Malformed {
        /// The message to be printed for the Malformed error
        message: String,
        /// The source file in which this error occured
        file: &'static str,
        /// The source line in which this error occured
        line: u32,
    },

    /// An out of bound access was attempted while parsing the image.
    #[error("Out of Bound read would have occurred!")]
    OutOfBounds,

    /// This file type is not supported.
    #[error("This file type is not supported")]
    NotSupported,

    /// Provided input was empty.
    #[error("Provided input was empty")]
    Empty,

    /// File I/O error.
    #[error("{0}")]
    FileError(#[from] std::io::Error),

    /// Error from the goblin crate during PE parsing.
    #[error("{0}")]
    GoblinErr(#[from] goblin::error::Error),

    /// A type reference could not be resolved after phase-2 fixups.
    ///
    /// Reported when loading completes and a `TypeRef` still has neither a
    /// local definition nor a cross-image link, unless the loader was told
    /// to skip resolution (object-file mode).
    #[error("Unresolved type reference {namespace}.{name} ({token})")]
    UnresolvedType {
        /// Token of the dangling `TypeRef`
        token: Token,
        /// Namespace of the unresolved type (may be empty)
        namespace: String,
        /// Name of the unresolved type
        name: String,
    },

    /// A type with the same (scope, namespace, name) is defined twice.
    #[error("Type defined multiple times - {0}")]
    TypeRedefined(Token),

    /// A member token range is backward, or points past its table.
    #[error("Invalid member token range for {0}")]
    BadMemberRange(Token),

    /// Failed to find an item for the given token.
    #[error("Failed to find metadata item - {0}")]
    TokenNotFound(Token),

    /// A value type directly or indirectly embeds itself.
    #[error("Layout cycle detected in {0}")]
    LayoutCycle(Token),

    /// The explicit packing size is not one of 0, 1, 2, 4 or 8.
    #[error("Invalid packing size {size} for {token}")]
    LayoutInvalidPacking {
        /// Class whose layout declaration is invalid
        token: Token,
        /// The rejected packing value
        size: u16,
    },

    /// The class requires more than 65535 vtable slots.
    #[error("Vtable overflow in {0}")]
    VtableOverflow(Token),

    /// A field type or ancestor of the class could not be laid out.
    #[error("Layout failed for {0}")]
    LayoutFailed(Token),

    /// Control structure growth hit its configured limit.
    ///
    /// Raised instead of aborting when a registry or stack cannot grow;
    /// the embedder decides whether the process survives.
    #[error("Resource limit exhausted: {0}")]
    ResourceExhausted(&'static str),

    /// Generic error for miscellaneous failures.
    #[error("{0}")]
    Error(String),
}
