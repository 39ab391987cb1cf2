//! The six concrete pipeline scenarios (`spec` §8), each run end to end
//! through [`hexpat::run`] against the shared 16-byte fixture
//! `B = 01 00 00 00 02 00 00 00 41 42 43 00 FF FF FF FF`.

use hexpat::{run, EvalConfig, PatternKind, SliceSource, Value};

const B: [u8; 16] = [0x01, 0, 0, 0, 0x02, 0, 0, 0, b'A', b'B', b'C', 0, 0xFF, 0xFF, 0xFF, 0xFF];

fn eval(src: &str) -> hexpat::EvalOutcome {
    let source = SliceSource::new(&B, 0);
    run(src, &source, EvalConfig::default()).expect("pipeline should succeed")
}

#[test]
fn scenario_1_struct_with_scalar_and_string_fields() {
    let outcome = eval("struct H { u32 a; u32 b; char name[4]; }; H hdr @ 0x00;");
    assert_eq!(outcome.patterns.len(), 1);
    let hdr = &outcome.patterns[0];
    assert_eq!(hdr.meta.offset, 0);
    assert_eq!(hdr.meta.size, 12);
    let PatternKind::Struct { children } = &hdr.kind else { panic!("expected struct") };
    assert_eq!(children.len(), 3);
    assert_eq!(children[0].kind, PatternKind::Unsigned(1));
    assert_eq!(children[1].kind, PatternKind::Unsigned(2));
    assert_eq!(children[2].kind, PatternKind::String("ABC".to_string()));
}

#[test]
fn scenario_2_dynamic_array_grows_until_the_while_condition_fails() {
    let outcome = eval("u8 bytes[while($ < 4)] @ 0x00;");
    assert_eq!(outcome.patterns.len(), 1);
    let array = &outcome.patterns[0];
    assert_eq!(array.meta.size, 4);
    let PatternKind::DynamicArray { children } = &array.kind else { panic!("expected dynamic array") };
    let values: Vec<_> = children.iter().map(|c| c.kind.clone()).collect();
    assert_eq!(
        values,
        vec![PatternKind::Unsigned(1), PatternKind::Unsigned(0), PatternKind::Unsigned(0), PatternKind::Unsigned(0)]
    );
}

#[test]
fn scenario_3_bitfield_splits_one_byte_into_two_nibbles() {
    let outcome = eval("bitfield F { lo : 4; hi : 4; }; F f @ 0x00;");
    let f = &outcome.patterns[0];
    assert_eq!(f.meta.size, 1);
    let PatternKind::Bitfield { children } = &f.kind else { panic!("expected bitfield") };
    let PatternKind::BitfieldField { value: lo, .. } = children[0].kind.clone() else { panic!("expected field") };
    let PatternKind::BitfieldField { value: hi, .. } = children[1].kind.clone() else { panic!("expected field") };
    assert_eq!(lo, 1);
    assert_eq!(hi, 0);
}

#[test]
fn scenario_4_pointer_reads_address_then_dereferences_it() {
    let outcome = eval("u32 *p : u32 @ 0x00;");
    let PatternKind::Pointer { address, pointee } = &outcome.patterns[0].kind else { panic!("expected pointer") };
    assert_eq!(*address, 1);
    assert_eq!(pointee.meta.offset, 1);
    assert_eq!(pointee.kind, PatternKind::Unsigned(0x0200_0000));
}

#[test]
fn scenario_5_enum_variant_resolves_by_matching_value() {
    let outcome = eval("enum E : u8 { A = 1, B, C }; E e @ 0x00;");
    let PatternKind::Enum { value, variant_name } = &outcome.patterns[0].kind else { panic!("expected enum") };
    assert_eq!(*value, 1);
    assert_eq!(variant_name.as_deref(), Some("A"));
}

#[test]
fn scenario_6_main_result_reads_the_same_bytes_as_the_sibling_pattern() {
    let outcome = eval("fn main() { return std::mem::read_unsigned($, 4); } u32 v @ 0x00;");
    assert_eq!(outcome.main_result, Some(Value::Unsigned(1)));
    assert_eq!(outcome.patterns.len(), 1);
    assert_eq!(outcome.patterns[0].kind, PatternKind::Unsigned(1));
}
