//! One loaded metadata module.
//!
//! An [`Image`] owns the raw buffer, the heaps, the raw tables and every
//! object created from them (classes, members, signatures) through its
//! token maps — the arena role: objects are never individually freed, they
//! live as long as the image. Cross-image relations go through the
//! [`Context`] class hash, never through raw pointers.

use std::path::Path;
use std::sync::{Arc, OnceLock, Weak};

use crossbeam_skiplist::SkipMap;
use memmap2::Mmap;

use crate::metadata::root::MetadataRoot;
use crate::metadata::streams::{Blob, Guid, Strings, TablesHeader, UserStrings};
use crate::metadata::tables::{MetadataTable, RowReadable, TableId, TableInfo, TableInfoRef};
use crate::metadata::token::Token;
use crate::typesystem::member::{Field, Method, Param, Property, Event};
use crate::typesystem::types::{MethodSigDesc, TypeDesc};
use crate::typesystem::{ClassRc, Context, ImageId};
use crate::Result;

/// Loader behavior switches.
#[derive(Clone, Copy, Debug, Default)]
pub struct LoadFlags {
    /// Skip cross-image reference resolution (object-file mode): dangling
    /// `TypeRef`s are tolerated instead of failing the load.
    pub no_resolve: bool,
}

/// Identity of an assembly (or assembly reference).
#[derive(Clone, Debug)]
pub struct AssemblyInfo {
    /// Assembly simple name
    pub name: String,
    /// Culture; empty for neutral
    pub culture: String,
    /// (major, minor, build, revision)
    pub version: [u16; 4],
    /// `AssemblyFlags` bits
    pub flags: u32,
}

/// An assembly reference with its lazily resolved target image.
#[derive(Debug)]
pub struct AssemblyRefInfo {
    /// Declared identity
    pub identity: AssemblyInfo,
    /// The image this reference resolved to, once dependency linking ran
    pub resolved: OnceLock<ImageId>,
}

/// Signature carried by a `MemberRef`.
#[derive(Clone, Debug)]
pub enum MemberRefSig {
    /// A field reference
    Field(TypeDesc),
    /// A method reference
    Method(Arc<MethodSigDesc>),
}

/// A loaded `MemberRef` row: the owner class plus name and signature,
/// resolved to a concrete member on demand by the resolution engine.
#[derive(Debug)]
pub struct MemberRefInfo {
    /// Owning class (or the class whose scope the member lives in)
    pub class: ClassRc,
    /// Member name
    pub name: String,
    /// Field or method signature
    pub signature: MemberRefSig,
}

/// A signature from the `StandAloneSig` table.
#[derive(Debug)]
pub enum StandaloneSig {
    /// An indirect-call method signature
    Method(Arc<MethodSigDesc>),
    /// A local-variable block signature
    Locals(Vec<TypeDesc>),
}

/// OS / processor requirement rows (Assembly and AssemblyRef variants).
#[derive(Clone, Copy, Debug)]
pub struct PlatformInfo {
    /// Platform or processor id
    pub id: u32,
    /// Version pair for OS rows; zero for processor rows
    pub version: (u32, u32),
}

/// One loaded metadata module and everything created from it.
pub struct Image {
    id: OnceLock<ImageId>,
    context: Weak<Context>,
    data: Arc<[u8]>,
    flags: LoadFlags,

    /// `#Strings` heap, if present
    pub(crate) strings: Option<Strings>,
    /// `#Blob` heap, if present
    pub(crate) blob: Option<Blob>,
    /// `#GUID` heap, if present
    pub(crate) guids: Option<Guid>,
    /// `#US` heap, if present
    pub(crate) user_strings: Option<UserStrings>,
    /// `#~` stream directory, if present
    pub(crate) tables: Option<TablesHeader>,

    /// Module name from the `Module` row
    pub module_name: OnceLock<String>,
    /// Module version id
    pub mvid: OnceLock<uguid::Guid>,
    /// This image's assembly identity, if it has an `Assembly` row
    pub assembly: OnceLock<AssemblyInfo>,
    /// OS/processor requirements declared by the assembly
    pub platform: boxcar::Vec<PlatformInfo>,

    /// Token → class (TypeDef, TypeRef and synthetic tokens)
    pub(crate) classes: SkipMap<Token, ClassRc>,
    /// Token → field
    pub(crate) fields: SkipMap<Token, Arc<Field>>,
    /// Token → method
    pub(crate) methods: SkipMap<Token, Arc<Method>>,
    /// Token → param
    pub(crate) params: SkipMap<Token, Arc<Param>>,
    /// Token → property
    pub(crate) properties: SkipMap<Token, Arc<Property>>,
    /// Token → event
    pub(crate) events: SkipMap<Token, Arc<Event>>,
    /// Token → constructed type from `TypeSpec`
    pub(crate) type_specs: SkipMap<Token, Arc<TypeDesc>>,
    /// Token → member reference
    pub(crate) member_refs: SkipMap<Token, Arc<MemberRefInfo>>,
    /// Token → stand-alone signature
    pub(crate) standalone_sigs: SkipMap<Token, Arc<StandaloneSig>>,
    /// Token → module reference name
    pub(crate) module_refs: SkipMap<Token, String>,
    /// Token → assembly reference
    pub(crate) assembly_refs: SkipMap<Token, Arc<AssemblyRefInfo>>,
    /// Token → file declaration (name, flags)
    pub(crate) files: SkipMap<Token, (String, u32)>,
    /// Token → exported type (namespace, name, implementation token)
    pub(crate) exported_types: SkipMap<Token, (String, String, Token)>,
    /// Token → manifest resource (name, flags, offset)
    pub(crate) resources: SkipMap<Token, (String, u32, u32)>,
}

impl Image {
    /// Create an empty, tableless image attached to `context`.
    ///
    /// Used for synthesized modules and tests; loaded images come from
    /// [`Image::from_file`] or [`Image::from_slice`].
    #[must_use]
    pub fn new(context: &Arc<Context>) -> Arc<Image> {
        let image = Arc::new(Image {
            id: OnceLock::new(),
            context: Arc::downgrade(context),
            data: Arc::from(&[][..]),
            flags: LoadFlags::default(),
            strings: None,
            blob: None,
            guids: None,
            user_strings: None,
            tables: None,
            module_name: OnceLock::new(),
            mvid: OnceLock::new(),
            assembly: OnceLock::new(),
            platform: boxcar::Vec::new(),
            classes: SkipMap::new(),
            fields: SkipMap::new(),
            methods: SkipMap::new(),
            params: SkipMap::new(),
            properties: SkipMap::new(),
            events: SkipMap::new(),
            type_specs: SkipMap::new(),
            member_refs: SkipMap::new(),
            standalone_sigs: SkipMap::new(),
            module_refs: SkipMap::new(),
            assembly_refs: SkipMap::new(),
            files: SkipMap::new(),
            exported_types: SkipMap::new(),
            resources: SkipMap::new(),
        });
        let id = context.attach_image(&image);
        let _ = image.id.set(id);
        image
    }

    /// Load an image from a file (PE executable or raw metadata root).
    ///
    /// # Errors
    /// Returns load errors per the taxonomy in [`crate::Error`]; the whole
    /// image is rejected on the first metadata error.
    pub fn from_file(context: &Arc<Context>, path: &Path) -> Result<Arc<Image>> {
        let file = std::fs::File::open(path)?;
        let mmap = unsafe { Mmap::map(&file)? };
        if mmap.is_empty() {
            return Err(crate::Error::Empty);
        }
        Self::from_slice_with_flags(context, &mmap, LoadFlags::default())
    }

    /// Load an image from a byte buffer.
    ///
    /// # Errors
    /// Same conditions as [`Image::from_file`].
    pub fn from_slice(context: &Arc<Context>, data: &[u8]) -> Result<Arc<Image>> {
        Self::from_slice_with_flags(context, data, LoadFlags::default())
    }

    /// Load an image with explicit [`LoadFlags`].
    ///
    /// # Errors
    /// Same conditions as [`Image::from_file`].
    pub fn from_slice_with_flags(
        context: &Arc<Context>,
        data: &[u8],
        flags: LoadFlags,
    ) -> Result<Arc<Image>> {
        if data.is_empty() {
            return Err(crate::Error::Empty);
        }
        let data: Arc<[u8]> = Arc::from(data);

        // PE envelope, or a bare metadata root
        let root_offset = if data.len() >= 2 && &data[0..2] == b"MZ" {
            clr_metadata_offset(&data)?
        } else {
            0
        };
        let root = MetadataRoot::parse(&data, root_offset)?;

        let locate = |name: &str| {
            root.stream(name)
                .map(|header| (root.base_offset + header.offset as usize, header.size as usize))
        };

        let strings = match locate("#Strings") {
            Some((offset, size)) => Some(Strings::new(data.clone(), offset, size)?),
            None => None,
        };
        let blob = match locate("#Blob") {
            Some((offset, size)) => Some(Blob::new(data.clone(), offset, size)?),
            None => None,
        };
        let guids = match locate("#GUID") {
            Some((offset, size)) => Some(Guid::new(data.clone(), offset, size)?),
            None => None,
        };
        let user_strings = match locate("#US") {
            Some((offset, size)) => Some(UserStrings::new(data.clone(), offset, size)?),
            None => None,
        };
        let tables = match locate("#~") {
            Some((offset, _)) => Some(TablesHeader::new(&data, offset)?),
            None => return Err(crate::Error::NotSupported),
        };

        let image = Arc::new(Image {
            id: OnceLock::new(),
            context: Arc::downgrade(context),
            data,
            flags,
            strings,
            blob,
            guids,
            user_strings,
            tables,
            module_name: OnceLock::new(),
            mvid: OnceLock::new(),
            assembly: OnceLock::new(),
            platform: boxcar::Vec::new(),
            classes: SkipMap::new(),
            fields: SkipMap::new(),
            methods: SkipMap::new(),
            params: SkipMap::new(),
            properties: SkipMap::new(),
            events: SkipMap::new(),
            type_specs: SkipMap::new(),
            member_refs: SkipMap::new(),
            standalone_sigs: SkipMap::new(),
            module_refs: SkipMap::new(),
            assembly_refs: SkipMap::new(),
            files: SkipMap::new(),
            exported_types: SkipMap::new(),
            resources: SkipMap::new(),
        });
        let id = context.attach_image(&image);
        let _ = image.id.set(id);

        crate::metadata::loader::build(context, &image)?;
        Ok(image)
    }

    /// This image's id within its context.
    #[must_use]
    pub fn id(&self) -> ImageId {
        *self.id.get().expect("image not attached to a context")
    }

    /// The owning context, if still alive.
    #[must_use]
    pub fn context(&self) -> Option<Arc<Context>> {
        self.context.upgrade()
    }

    /// Loader flags this image was opened with.
    #[must_use]
    pub fn load_flags(&self) -> LoadFlags {
        self.flags
    }

    /// The raw image buffer.
    #[must_use]
    pub fn data(&self) -> &Arc<[u8]> {
        &self.data
    }

    pub(crate) fn strings_heap(&self) -> Result<&Strings> {
        self.strings.as_ref().ok_or(crate::Error::NotSupported)
    }

    pub(crate) fn blob_heap(&self) -> Result<&Blob> {
        self.blob.as_ref().ok_or(crate::Error::NotSupported)
    }

    /// Index-width bookkeeping for this image's tables.
    pub(crate) fn table_info(&self) -> TableInfoRef {
        match &self.tables {
            Some(header) => header.info(),
            None => Arc::new(TableInfo::new([0; 0x2D], 0, 0)),
        }
    }

    /// Open a typed reader over `table`, or `None` if the image lacks it.
    pub(crate) fn table<T: RowReadable>(&self, table: TableId) -> Result<Option<MetadataTable<T>>> {
        let Some(header) = &self.tables else {
            return Ok(None);
        };
        let Some((offset, rows)) = header.table(table) else {
            return Ok(None);
        };
        Ok(Some(MetadataTable::new(
            self.data.clone(),
            offset,
            rows,
            header.info(),
        )?))
    }

    /// Number of rows in `table`.
    #[must_use]
    pub fn row_count(&self, table: TableId) -> u32 {
        self.tables
            .as_ref()
            .map_or(0, |header| header.row_count(table))
    }

    /// Token → class lookup (`TypeDef`, `TypeRef`, `TypeSpec` class forms).
    #[must_use]
    pub fn class_by_token(&self, token: Token) -> Option<ClassRc> {
        self.classes.get(&token).map(|entry| entry.value().clone())
    }

    /// Token → field lookup.
    #[must_use]
    pub fn field_by_token(&self, token: Token) -> Option<Arc<Field>> {
        self.fields.get(&token).map(|entry| entry.value().clone())
    }

    /// Token → method lookup.
    #[must_use]
    pub fn method_by_token(&self, token: Token) -> Option<Arc<Method>> {
        self.methods.get(&token).map(|entry| entry.value().clone())
    }

    /// Token → constructed type lookup (`TypeSpec`).
    #[must_use]
    pub fn type_spec_by_token(&self, token: Token) -> Option<Arc<TypeDesc>> {
        self.type_specs.get(&token).map(|entry| entry.value().clone())
    }

    /// Token → member reference lookup.
    #[must_use]
    pub fn member_ref_by_token(&self, token: Token) -> Option<Arc<MemberRefInfo>> {
        self.member_refs.get(&token).map(|entry| entry.value().clone())
    }

    /// Token → stand-alone signature lookup.
    #[must_use]
    pub fn standalone_sig_by_token(&self, token: Token) -> Option<Arc<StandaloneSig>> {
        self.standalone_sigs
            .get(&token)
            .map(|entry| entry.value().clone())
    }

    /// All classes of this image, in token order.
    pub fn classes(&self) -> impl Iterator<Item = ClassRc> + '_ {
        self.classes.iter().map(|entry| entry.value().clone())
    }

    /// Decode a `#US` user string by heap offset (`ldstr`-style lookup).
    ///
    /// # Errors
    /// Returns [`crate::Error::NotSupported`] when the image has no `#US`
    /// heap, or a malformed-data error for bad offsets.
    pub fn user_string(&self, offset: usize) -> Result<widestring::U16String> {
        self.user_strings
            .as_ref()
            .ok_or(crate::Error::NotSupported)?
            .get(offset)
    }

    /// File declarations of a multi-file assembly: `(token, name, flags)`.
    pub fn files(&self) -> impl Iterator<Item = (Token, String, u32)> + '_ {
        self.files
            .iter()
            .map(|entry| (*entry.key(), entry.value().0.clone(), entry.value().1))
    }

    /// Types re-exported from other files: `(token, namespace, name,
    /// implementation token)`.
    pub fn exported_types(&self) -> impl Iterator<Item = (Token, String, String, Token)> + '_ {
        self.exported_types.iter().map(|entry| {
            let (namespace, name, implementation) = entry.value().clone();
            (*entry.key(), namespace, name, implementation)
        })
    }

    /// Manifest resources: `(token, name, flags, data offset)`.
    pub fn resources(&self) -> impl Iterator<Item = (Token, String, u32, u32)> + '_ {
        self.resources.iter().map(|entry| {
            let (name, flags, offset) = entry.value().clone();
            (*entry.key(), name, flags, offset)
        })
    }
}

/// Find the metadata root inside a PE image via the CLR runtime header.
fn clr_metadata_offset(data: &[u8]) -> Result<usize> {
    let pe = goblin::pe::PE::parse(data)?;
    let optional = pe
        .header
        .optional_header
        .ok_or(crate::Error::NotSupported)?;
    let clr_dir = optional
        .data_directories
        .get_clr_runtime_header()
        .ok_or(crate::Error::NotSupported)?;

    let cor20_offset = rva_to_offset(&pe.sections, clr_dir.virtual_address)?;
    // IMAGE_COR20_HEADER: metadata directory lives at offset 8
    let mut cursor = cor20_offset + 8;
    let metadata_rva = crate::file::io::read_le_at::<u32>(data, &mut cursor)?;
    let _metadata_size = crate::file::io::read_le_at::<u32>(data, &mut cursor)?;
    rva_to_offset(&pe.sections, metadata_rva)
}

/// Translate an RVA to a file offset through the section table.
fn rva_to_offset(sections: &[goblin::pe::section_table::SectionTable], rva: u32) -> Result<usize> {
    for section in sections {
        let start = section.virtual_address;
        let size = section.virtual_size.max(section.size_of_raw_data);
        if rva >= start && rva < start + size {
            return Ok((rva - start + section.pointer_to_raw_data) as usize);
        }
    }
    Err(malformed_error!("RVA 0x{:08x} outside all sections", rva))
}

impl std::fmt::Debug for Image {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Image")
            .field("id", &self.id.get())
            .field("module", &self.module_name.get())
            .field("classes", &self.classes.len())
            .finish()
    }
}
