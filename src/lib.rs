//! # cilrun
//!
//! A metadata-driven type system and method-invocation engine for CLI
//! (.NET-like) metadata images.
//!
//! `cilrun` loads a binary metadata image, builds an in-memory class/type
//! graph, computes physical layout (field offsets, vtables, static storage)
//! for every type on first use, resolves overloaded members and standard
//! conversions, and drives invocation of managed methods from native code
//! through a stack-based calling convention shared with pluggable backends.
//!
//! ## Architecture
//!
//! - [`metadata`] - token tables, heaps, signatures and the phased loader
//! - [`typesystem`] - the `Class`/member graph and cross-image resolution
//! - [`layout`] - memoized, cycle-aware class layout and vtable assignment
//! - [`coerce`] - standard/user-defined conversions and overload betterness
//! - [`engine`] - the native/managed call boundary and coder helpers
//!
//! Data flows one way at load time (metadata store → class model → layout,
//! lazily) and one way at call time (caller → coercion engine → invocation
//! engine → backend → invocation engine).
//!
//! ## Examples
//!
//! ```rust,no_run
//! use cilrun::metadata::image::Image;
//! use cilrun::typesystem::Context;
//! use std::path::Path;
//!
//! let context = Context::new();
//! let image = Image::from_file(&context, Path::new("assembly.dll"))?;
//! for class in image.classes() {
//!     println!("{} (token {})", class.fullname(), class.token());
//! }
//! # Ok::<(), cilrun::Error>(())
//! ```
//!
//! ## Thread safety
//!
//! The metadata store and class model are append-only after load and safe
//! for concurrent readers. First-time layout is serialized per [`Context`]
//! ("compute once, read many"). Each [`engine::ExecThread`] owns its
//! operand and frame stacks exclusively.
//!
//! [`Context`]: typesystem::Context

#![warn(missing_docs)]

#[macro_use]
mod error;

pub(crate) mod file;

pub mod coerce;
pub mod engine;
pub mod layout;
pub mod metadata;
pub mod typesystem;

pub use error::Error;

/// Convenience alias for `Result<T, cilrun::Error>`.
pub type Result<T> = std::result::Result<T, Error>;
