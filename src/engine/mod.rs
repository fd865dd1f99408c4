//! The invocation engine and coder helpers.
//!
//! This layer crosses the native/managed boundary: it marshals native
//! arguments onto the execution stack in the calling convention shared
//! with every backend, drives one call frame through a pluggable
//! [`ExecutionBackend`], and unmarshals the return value — reporting
//! managed faults through the per-thread pending-exception slot instead
//! of crashing the host.
//!
//! The [`coder`], [`arrays`] and [`locals`] modules are the seam a
//! pluggable code generator (interpreter or JIT) is written against.

pub mod arrays;
pub mod call;
pub mod coder;
pub mod locals;
pub mod safepoint;
pub mod stack;
pub mod thread;

pub use call::{call_constructor, call_method, call_named, call_virtual_method, ArgValue, RetValue};
pub use stack::{CallFrame, CvmWord, ObjectRef, WORDS_PER_LONG, WORDS_PER_NATIVE_FLOAT, WORDS_PER_TYPED_REF};
pub use thread::{EntryKind, ExecOutcome, ExecThread, ExecutionBackend, PendingException, RuntimeFault, ThrownException};
