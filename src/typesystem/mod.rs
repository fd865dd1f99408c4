//! The class model: classes, members and the process-wide registry.
//!
//! # Key Components
//!
//! - [`Class`] - a type definition or an unresolved reference to one
//! - [`Field`] / [`Method`] / [`Property`] / [`Event`] - class members
//! - [`TypeDesc`] - structural type descriptors over the class graph
//! - [`Context`] - process-wide registry of images and class names
//!
//! The model is append-only after load: members and interface edges are
//! only ever added, and the two mutations a class supports (reference to
//! definition conversion, cross-image linking) are one-shot and observable
//! through the same stable handle.

pub mod attrs;
pub mod class;
pub mod context;
pub mod member;
pub mod types;

pub use attrs::{
    FieldAttributes, LayoutKind, MethodAttributes, MethodSemanticsAttributes, ParamAttributes,
    TypeAttributes, TypeVisibility,
};
pub use class::{Class, ClassRc, ClassRef, ClassScope, ImageId};
pub use context::Context;
pub use member::{Event, Field, Method, Param, PInvokeInfo, Property};
pub use types::{ArrayDim, MethodSigDesc, Primitive, TypeDesc};
