//! Raw row definitions for every table the loader consumes.
//!
//! Raw rows carry heap offsets and table indexes exactly as stored in the
//! image; nothing is resolved at this level. Column layouts follow
//! ECMA-335 §II.22 and are validated structurally only (widths and
//! bounds), leaving semantic checks to the loader.

mod assembly;
mod members;
mod misc;
mod types;

pub use assembly::{
    AssemblyOsRow, AssemblyProcessorRow, AssemblyRefOsRow, AssemblyRefProcessorRow,
    AssemblyRefRow, AssemblyRow, ExportedTypeRow, FileRow, ManifestResourceRow, ModuleRefRow,
    ModuleRow,
};
pub use members::{
    EventMapRow, EventRow, FieldRow, MemberRefRow, MethodDefRow, MethodImplRow,
    MethodSemanticsRow, ParamRow, PropertyMapRow, PropertyRow,
};
pub use misc::{
    ConstantRow, CustomAttributeRow, DeclSecurityRow, FieldLayoutRow, FieldMarshalRow,
    FieldRvaRow, ImplMapRow, StandAloneSigRow,
};
pub use types::{ClassLayoutRow, InterfaceImplRow, NestedClassRow, TypeDefRow, TypeRefRow, TypeSpecRow};
