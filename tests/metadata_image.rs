//! End-to-end image loading against crafted metadata roots.

use cilrun::metadata::image::Image;
use cilrun::metadata::token::Token;
use cilrun::typesystem::Context;

/// Assemble a metadata root ("BSJB" header) from named stream payloads.
fn build_root(streams: &[(&str, &[u8])]) -> Vec<u8> {
    let version = b"v4.0.30319\0\0";
    let mut header = Vec::new();
    header.extend_from_slice(&0x424A_5342u32.to_le_bytes());
    header.extend_from_slice(&1u16.to_le_bytes());
    header.extend_from_slice(&1u16.to_le_bytes());
    header.extend_from_slice(&0u32.to_le_bytes());
    header.extend_from_slice(&(version.len() as u32).to_le_bytes());
    header.extend_from_slice(version);
    header.extend_from_slice(&0u16.to_le_bytes());
    header.extend_from_slice(&(streams.len() as u16).to_le_bytes());

    let mut dir_len = 0;
    for (name, _) in streams {
        dir_len += 8 + (name.len() + 1).div_ceil(4) * 4;
    }
    let mut payload_offset = header.len() + dir_len;
    let mut payloads = Vec::new();
    for (name, bytes) in streams {
        header.extend_from_slice(&(payload_offset as u32).to_le_bytes());
        header.extend_from_slice(&(bytes.len() as u32).to_le_bytes());
        let mut name_bytes = name.as_bytes().to_vec();
        name_bytes.push(0);
        while name_bytes.len() % 4 != 0 {
            name_bytes.push(0);
        }
        header.extend_from_slice(&name_bytes);
        payloads.extend_from_slice(bytes);
        payload_offset += bytes.len();
    }
    header.extend_from_slice(&payloads);
    header
}

/// Build a `#~` stream with the given `(table_tag, rows)` pairs followed
/// by the packed row payload.
fn build_tables(tables: &[(u8, u32)], rows: &[u8]) -> Vec<u8> {
    let mut data = Vec::new();
    data.extend_from_slice(&0u32.to_le_bytes());
    data.push(2);
    data.push(0);
    data.push(0); // small heaps
    data.push(1);
    let mut valid = 0u64;
    for (tag, _) in tables {
        valid |= 1 << tag;
    }
    data.extend_from_slice(&valid.to_le_bytes());
    data.extend_from_slice(&0u64.to_le_bytes()); // nothing sorted
    for (_, count) in tables {
        data.extend_from_slice(&count.to_le_bytes());
    }
    data.extend_from_slice(rows);
    data
}

/// #Strings heap: `\0 A \0 B \0 <Module> \0 x \0`
const STRINGS: &[u8] = b"\0A\0B\0<Module>\0x\0";
const NAME_A: u16 = 1;
const NAME_B: u16 = 3;
const NAME_MODULE: u16 = 5;
const NAME_X: u16 = 14;

fn module_row() -> Vec<u8> {
    let mut row = Vec::new();
    row.extend_from_slice(&0u16.to_le_bytes()); // generation
    row.extend_from_slice(&NAME_MODULE.to_le_bytes());
    row.extend_from_slice(&1u16.to_le_bytes()); // mvid
    row.extend_from_slice(&0u16.to_le_bytes());
    row.extend_from_slice(&0u16.to_le_bytes());
    row
}

#[test]
fn forward_base_type_resolves_after_phase_two() {
    // class A : B {} where B is defined later in the same token stream,
    // spelled through a module-scoped TypeRef
    let mut rows = module_row();

    // TypeRef row 1: scope = Module (tag 0, row 1), name "B"
    rows.extend_from_slice(&4u16.to_le_bytes()); // (1 << 2) | 0
    rows.extend_from_slice(&NAME_B.to_le_bytes());
    rows.extend_from_slice(&0u16.to_le_bytes());

    // TypeDef row 1: "A" extends TypeRef row 1
    rows.extend_from_slice(&1u32.to_le_bytes()); // public
    rows.extend_from_slice(&NAME_A.to_le_bytes());
    rows.extend_from_slice(&0u16.to_le_bytes());
    rows.extend_from_slice(&5u16.to_le_bytes()); // (1 << 2) | 1 = TypeRef 1
    rows.extend_from_slice(&1u16.to_le_bytes()); // field_list
    rows.extend_from_slice(&1u16.to_le_bytes()); // method_list

    // TypeDef row 2: "B" extends nothing
    rows.extend_from_slice(&1u32.to_le_bytes());
    rows.extend_from_slice(&NAME_B.to_le_bytes());
    rows.extend_from_slice(&0u16.to_le_bytes());
    rows.extend_from_slice(&0u16.to_le_bytes());
    rows.extend_from_slice(&1u16.to_le_bytes());
    rows.extend_from_slice(&1u16.to_le_bytes());

    let tables = build_tables(&[(0x00, 1), (0x01, 1), (0x02, 2)], &rows);
    let mut guid = vec![0u8; 16];
    guid[0] = 0x42;
    let image_bytes = build_root(&[("#~", &tables), ("#Strings", STRINGS), ("#GUID", &guid)]);

    let context = Context::new();
    let image = Image::from_slice(&context, &image_bytes).expect("image loads");

    assert_eq!(image.module_name.get().map(String::as_str), Some("<Module>"));

    let class_a = image.class_by_token(Token::new(0x0200_0001)).unwrap();
    let class_b = image.class_by_token(Token::new(0x0200_0002)).unwrap();
    assert_eq!(class_a.name(), "A");
    assert_eq!(class_b.name(), "B");
    assert!(!class_b.is_ref());

    // The forward reference resolved to the real definition: A's parent
    // IS the class object for B, and the TypeRef token reaches it too
    let parent = class_a.parent().unwrap();
    assert!(std::sync::Arc::ptr_eq(&parent, &class_b));
    let via_ref = image.class_by_token(Token::new(0x0100_0001)).unwrap();
    assert!(std::sync::Arc::ptr_eq(&via_ref.resolve(), &class_b));

    // Same outcome as if B had been defined first: inheritance works
    assert!(class_a.inherits_from(&class_b));
}

#[test]
fn backward_member_range_is_metadata_corruption() {
    let mut rows = module_row();

    // TypeDef row 1 claims fields starting at 2, row 2 at 1: backward
    rows.extend_from_slice(&1u32.to_le_bytes());
    rows.extend_from_slice(&NAME_A.to_le_bytes());
    rows.extend_from_slice(&0u16.to_le_bytes());
    rows.extend_from_slice(&0u16.to_le_bytes());
    rows.extend_from_slice(&2u16.to_le_bytes()); // field_list
    rows.extend_from_slice(&1u16.to_le_bytes());

    rows.extend_from_slice(&1u32.to_le_bytes());
    rows.extend_from_slice(&NAME_B.to_le_bytes());
    rows.extend_from_slice(&0u16.to_le_bytes());
    rows.extend_from_slice(&0u16.to_le_bytes());
    rows.extend_from_slice(&1u16.to_le_bytes()); // backward
    rows.extend_from_slice(&1u16.to_le_bytes());

    // Field rows 1 and 2: public, named "x", field signature I4
    for _ in 0..2 {
        rows.extend_from_slice(&6u16.to_le_bytes());
        rows.extend_from_slice(&NAME_X.to_le_bytes());
        rows.extend_from_slice(&1u16.to_le_bytes()); // blob offset 1
    }

    let tables = build_tables(&[(0x00, 1), (0x02, 2), (0x04, 2)], &rows);
    let guid = vec![0u8; 16];
    // Blob heap: empty blob at 0, field signature (0x06 0x08) at 1
    let blob = [0x00u8, 0x02, 0x06, 0x08];
    let image_bytes = build_root(&[
        ("#~", &tables),
        ("#Strings", STRINGS),
        ("#GUID", &guid),
        ("#Blob", &blob),
    ]);

    let context = Context::new();
    let result = Image::from_slice(&context, &image_bytes);
    assert!(matches!(result, Err(cilrun::Error::BadMemberRange(_))));
}

#[test]
fn fields_and_methods_load_with_signatures() {
    let mut rows = module_row();

    // TypeDef row 1: "A" with one field and one method
    rows.extend_from_slice(&1u32.to_le_bytes());
    rows.extend_from_slice(&NAME_A.to_le_bytes());
    rows.extend_from_slice(&0u16.to_le_bytes());
    rows.extend_from_slice(&0u16.to_le_bytes());
    rows.extend_from_slice(&1u16.to_le_bytes());
    rows.extend_from_slice(&1u16.to_le_bytes());

    // Field row 1: named "x", signature I4
    rows.extend_from_slice(&6u16.to_le_bytes());
    rows.extend_from_slice(&NAME_X.to_le_bytes());
    rows.extend_from_slice(&1u16.to_le_bytes());

    // MethodDef row 1: named "B" (reusing the string), static,
    // signature int32(int32)
    rows.extend_from_slice(&0u32.to_le_bytes()); // rva
    rows.extend_from_slice(&0u16.to_le_bytes()); // impl flags
    rows.extend_from_slice(&0x0016u16.to_le_bytes()); // public | static
    rows.extend_from_slice(&NAME_B.to_le_bytes());
    rows.extend_from_slice(&4u16.to_le_bytes()); // blob offset 4
    rows.extend_from_slice(&1u16.to_le_bytes()); // param_list

    let tables = build_tables(&[(0x00, 1), (0x02, 1), (0x04, 1), (0x06, 1)], &rows);
    let guid = vec![0u8; 16];
    // Blob: [0]=empty, [1]=field sig I4, [4]=method sig default 1 param I4 -> I4
    let blob = [
        0x00u8, 0x02, 0x06, 0x08, 0x04, 0x00, 0x01, 0x08, 0x08,
    ];
    let image_bytes = build_root(&[
        ("#~", &tables),
        ("#Strings", STRINGS),
        ("#GUID", &guid),
        ("#Blob", &blob),
    ]);

    let context = Context::new();
    let image = Image::from_slice(&context, &image_bytes).expect("image loads");

    let class = image.class_by_token(Token::new(0x0200_0001)).unwrap();
    assert_eq!(class.fields.iter().count(), 1);
    assert_eq!(class.methods.iter().count(), 1);

    let field = image.field_by_token(Token::new(0x0400_0001)).unwrap();
    assert_eq!(field.name, "x");
    assert!(!field.is_static());

    let method = image.method_by_token(Token::new(0x0600_0001)).unwrap();
    assert_eq!(method.name, "B");
    assert!(method.is_static());
    assert_eq!(method.signature().params.len(), 1);
}
