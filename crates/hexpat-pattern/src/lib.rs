//! hexpat-pattern — the tree an evaluator run produces: owned, typed nodes
//! plus the handful of read-only operations a host runs over them (visit,
//! lookup, formatted_value, highlighted_ranges, sort).
//!
//! A pattern never borrows from the byte source it was read from: scalar
//! kinds carry their decoded value inline, so the tree outlives the
//! evaluator run and the byte source that produced it (invariant I5 — no
//! back-edges, so the tree is always acyclic even with `Pointer` nodes).

#![deny(missing_docs)]

use std::fmt;
use std::ops::Range;

use hexpat_core::Endianness;

/// An auto-assigned or user-chosen display colour, stored as packed RGBA.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Color(pub u32);

impl Color {
    /// Renders as `#RRGGBBAA`, the textual stand-in for a GUI colour button.
    #[must_use]
    pub fn to_hex(self) -> String {
        format!("#{:08X}", self.0)
    }
}

/// Display/bookkeeping fields every pattern carries regardless of kind.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PatternMeta {
    /// Byte offset in the source (or synthetic section) this pattern reads
    /// from; meaningless (but still present, set to the stack slot index)
    /// when `local` is true.
    pub offset: u64,
    /// Size in bytes. `0` for `BitfieldField` (its extent is in bits, not
    /// bytes — invariant I4).
    pub size: u64,
    /// Forced endianness, or `None` to inherit the evaluator's default.
    pub endianness: Option<Endianness>,
    /// The name this pattern is shown under (the declared variable name,
    /// array index, or struct member name).
    pub display_name: String,
    /// The declared type's name (builtin or user-defined).
    pub type_name: String,
    /// `comment("...")`, if attached.
    pub comment: Option<String>,
    /// Display colour.
    pub color: Color,
    /// `hidden` attribute — excluded from `lookup` results and the default
    /// hex-view row list.
    pub hidden: bool,
    /// `inline` attribute — shown merged into its parent's row rather than
    /// as its own row.
    pub inlined: bool,
    /// `sealed` attribute — children are not independently browsable.
    pub sealed: bool,
    /// `transform(fn_name)` — rewrites the displayed value; invoked by the
    /// evaluator, which owns the function registry this crate doesn't have.
    pub transform_fn: Option<String>,
    /// `format(fn_name)` — replaces `formatted_value`'s default rendering;
    /// same division of responsibility as `transform_fn`.
    pub formatter_fn: Option<String>,
    /// True for function locals: `offset` indexes the evaluator's value
    /// stack, not the byte source.
    pub local: bool,
}

impl PatternMeta {
    /// A meta record with placeholder name/type and no attributes attached,
    /// for call sites that only care about structural fields.
    #[must_use]
    pub fn new(offset: u64, size: u64, display_name: impl Into<String>, type_name: impl Into<String>) -> Self {
        Self {
            offset,
            size,
            endianness: None,
            display_name: display_name.into(),
            type_name: type_name.into(),
            comment: None,
            color: Color(0),
            hidden: false,
            inlined: false,
            sealed: false,
            transform_fn: None,
            formatter_fn: None,
            local: false,
        }
    }
}

/// The pattern's own decoded content, beyond the shared [`PatternMeta`].
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum PatternKind {
    /// An unsigned integer of `meta.size` bytes.
    Unsigned(u128),
    /// A signed integer of `meta.size` bytes.
    Signed(i128),
    /// `float` or `double`.
    Float(f64),
    /// `bool`.
    Boolean(bool),
    /// A single ASCII byte.
    Character(char),
    /// A single 2-byte character.
    WideCharacter(char),
    /// A length-prefixed or NUL-terminated byte run, decoded as text.
    String(String),
    /// The `Character16` analogue of `String`.
    WideString(String),
    /// Reserved bytes that are never read.
    Padding,
    /// `Type name[N]` where `Type` is scalar and homogeneous — kept compact
    /// as one template plus a count rather than materializing every
    /// element, per invariant I2 (`size == template.size * count`).
    StaticArray {
        /// The shared element pattern.
        template: Box<Pattern>,
        /// Element count.
        count: u64,
    },
    /// `Type name[while(...)]` or `Type name[]` — each element is
    /// independently materialized since later elements may depend on
    /// earlier ones (e.g. `this.count`).
    DynamicArray {
        /// Elements in source order.
        children: Vec<Pattern>,
    },
    /// A `struct` instance.
    Struct {
        /// Member patterns in declaration order.
        children: Vec<Pattern>,
    },
    /// A `union` instance — every member shares the same starting offset.
    Union {
        /// Member patterns in declaration order.
        children: Vec<Pattern>,
    },
    /// A `bitfield` instance.
    Bitfield {
        /// Field patterns (always `BitfieldField`) in declaration order.
        children: Vec<Pattern>,
    },
    /// One field of a `Bitfield`. `meta.size` is always `0`; the field's
    /// actual extent is carried here.
    BitfieldField {
        /// Offset in bits from the start of the enclosing bitfield.
        bit_offset: u32,
        /// Width in bits.
        bit_size: u32,
        /// The field's decoded value, already sign/zero-extended to 128
        /// bits as the bitfield's underlying type dictates.
        value: u128,
    },
    /// An `enum` instance.
    Enum {
        /// The underlying integer value.
        value: i128,
        /// The matching variant's name, or `None` if no variant matches
        /// (a valid, if unusual, enum value).
        variant_name: Option<String>,
    },
    /// A typed pointer: an address plus the pattern it resolves to.
    Pointer {
        /// The pointer's own value (the address it was read as).
        address: u64,
        /// The pattern at the pointee's location.
        pointee: Box<Pattern>,
    },
}

/// One node of the pattern tree (the `Pattern` sum type). Equality is
/// custom — see the `impl PartialEq` below — so this does not derive it.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Pattern {
    /// Shared display/bookkeeping fields.
    pub meta: PatternMeta,
    /// This pattern's own content.
    pub kind: PatternKind,
}

impl Pattern {
    /// Builds a pattern from its parts.
    #[must_use]
    pub const fn new(meta: PatternMeta, kind: PatternKind) -> Self {
        Self { meta, kind }
    }

    /// The byte range this pattern covers, ignoring `local`/hidden status.
    #[must_use]
    pub fn byte_range(&self) -> Range<u64> {
        self.meta.offset..self.meta.offset + self.meta.size
    }

    /// Whether `offset` falls inside this pattern's byte range. Always
    /// false for local patterns, which have no byte-source presence.
    #[must_use]
    pub fn covers(&self, offset: u64) -> bool {
        !self.meta.local && self.byte_range().contains(&offset)
    }

    /// This pattern's structurally nested children, if any. `StaticArray`
    /// intentionally yields none — see [`PatternKind::StaticArray`].
    #[must_use]
    pub fn children(&self) -> &[Pattern] {
        match &self.kind {
            PatternKind::DynamicArray { children }
            | PatternKind::Struct { children }
            | PatternKind::Union { children }
            | PatternKind::Bitfield { children } => children,
            _ => &[],
        }
    }

    /// Dispatches to the matching method of `visitor` (`spec` §4.5's
    /// `visit`).
    pub fn accept(&self, visitor: &mut dyn PatternVisitor) {
        match &self.kind {
            PatternKind::Unsigned(_) => visitor.visit_unsigned(self),
            PatternKind::Signed(_) => visitor.visit_signed(self),
            PatternKind::Float(_) => visitor.visit_float(self),
            PatternKind::Boolean(_) => visitor.visit_boolean(self),
            PatternKind::Character(_) => visitor.visit_character(self),
            PatternKind::WideCharacter(_) => visitor.visit_wide_character(self),
            PatternKind::String(_) => visitor.visit_string(self),
            PatternKind::WideString(_) => visitor.visit_wide_string(self),
            PatternKind::Padding => visitor.visit_padding(self),
            PatternKind::StaticArray { .. } => visitor.visit_array_static(self),
            PatternKind::DynamicArray { .. } => visitor.visit_array_dynamic(self),
            PatternKind::Struct { .. } => visitor.visit_struct(self),
            PatternKind::Union { .. } => visitor.visit_union(self),
            PatternKind::Bitfield { .. } => visitor.visit_bitfield(self),
            PatternKind::BitfieldField { .. } => visitor.visit_bitfield_field(self),
            PatternKind::Enum { .. } => visitor.visit_enum(self),
            PatternKind::Pointer { .. } => visitor.visit_pointer(self),
        }
    }

    /// Visits this pattern, then recurses into its children in order.
    pub fn walk(&self, visitor: &mut dyn PatternVisitor) {
        self.accept(visitor);
        for child in self.children() {
            child.walk(visitor);
        }
        if let PatternKind::StaticArray { template, .. } = &self.kind {
            template.walk(visitor);
        }
        if let PatternKind::Pointer { pointee, .. } = &self.kind {
            pointee.walk(visitor);
        }
    }

    /// The innermost non-hidden pattern in this subtree covering
    /// `byte_offset`, or `None` if no visible pattern covers it
    /// (`spec` §4.5's `lookup`).
    #[must_use]
    pub fn lookup(&self, byte_offset: u64) -> Option<&Pattern> {
        if !self.covers(byte_offset) {
            return None;
        }
        for child in self.children() {
            if let Some(found) = child.lookup(byte_offset) {
                return Some(found);
            }
        }
        if let PatternKind::Pointer { pointee, .. } = &self.kind {
            if let Some(found) = pointee.lookup(byte_offset) {
                return Some(found);
            }
        }
        if self.meta.hidden {
            None
        } else {
            Some(self)
        }
    }

    /// Default textual rendering of this pattern's value (`spec` §4.5's
    /// `formatted_value`). Does not invoke `meta.formatter_fn` — running a
    /// user function needs the evaluator's function registry, which this
    /// crate deliberately doesn't depend on; a host calls the evaluator's
    /// own formatting entry point first and falls back to this one.
    #[must_use]
    pub fn formatted_value(&self) -> String {
        match &self.kind {
            PatternKind::Unsigned(v) => format!("0x{:0width$X}", v, width = (self.meta.size.max(1) * 2) as usize),
            PatternKind::Signed(v) => v.to_string(),
            PatternKind::Float(v) => format!("{v}"),
            PatternKind::Boolean(v) => v.to_string(),
            PatternKind::Character(c) | PatternKind::WideCharacter(c) => escape_display_char(*c),
            PatternKind::String(s) | PatternKind::WideString(s) => escape_printable(s),
            PatternKind::Padding => "<padding>".to_string(),
            PatternKind::StaticArray { count, template } => format!("{}[{count}]", template.meta.type_name),
            PatternKind::DynamicArray { children } => format!("[{} elements]", children.len()),
            PatternKind::Struct { children } => format!("{{ {} fields }}", children.len()),
            PatternKind::Union { children } => format!("union {{ {} fields }}", children.len()),
            PatternKind::Bitfield { children } => format!("bitfield {{ {} fields }}", children.len()),
            PatternKind::BitfieldField { value, bit_size, .. } => format!("0x{value:X} ({bit_size} bits)"),
            PatternKind::Enum { value, variant_name } => {
                variant_name.clone().unwrap_or_else(|| value.to_string())
            },
            PatternKind::Pointer { address, .. } => format!("0x{address:X}"),
        }
    }

    /// A single best-effort numeric projection of this pattern's value,
    /// used to sort by the `Value` column across heterogeneous kinds.
    #[must_use]
    pub fn numeric_value(&self) -> f64 {
        match &self.kind {
            PatternKind::Unsigned(v) => *v as f64,
            PatternKind::Signed(v) | PatternKind::Enum { value: v, .. } => *v as f64,
            PatternKind::Float(v) => *v,
            PatternKind::Boolean(v) => f64::from(u8::from(*v)),
            PatternKind::Character(c) | PatternKind::WideCharacter(c) => f64::from(*c as u32),
            PatternKind::BitfieldField { value, .. } => *value as f64,
            PatternKind::Pointer { address, .. } => *address as f64,
            PatternKind::String(_)
            | PatternKind::WideString(_)
            | PatternKind::Padding
            | PatternKind::StaticArray { .. }
            | PatternKind::DynamicArray { .. }
            | PatternKind::Struct { .. }
            | PatternKind::Union { .. }
            | PatternKind::Bitfield { .. } => 0.0,
        }
    }

    /// Collects `(byte_range, color)` for every non-hidden pattern in this
    /// subtree, in traversal order, for the hex view to paint (`spec`
    /// §4.5's `highlighted_ranges`; returned as a `Vec` rather than a `Map`
    /// since `Range<u64>` has no total order to key a map by — later
    /// entries, from more deeply nested patterns, are meant to take
    /// priority when the host paints overlapping ranges).
    #[must_use]
    pub fn highlighted_ranges(&self) -> Vec<(Range<u64>, Color)> {
        let mut out = Vec::new();
        self.collect_ranges(&mut out);
        out
    }

    fn collect_ranges(&self, out: &mut Vec<(Range<u64>, Color)>) {
        if self.meta.hidden || self.meta.local {
            return;
        }
        out.push((self.byte_range(), self.meta.color));
        for child in self.children() {
            child.collect_ranges(out);
        }
        if let PatternKind::Pointer { pointee, .. } = &self.kind {
            pointee.collect_ranges(out);
        }
    }
}

/// Equality compares: kind (variant only, not nested content), offset,
/// size, hidden flag, endianness (an unset forced endianness compares
/// equal to an explicit `Native`), display name, type name, comment, and
/// local flag. Colour, `inlined`/`sealed`, attached formatter/transform,
/// and child patterns are deliberately excluded — two structurally
/// different instances of "the same declared field" still compare equal.
impl PartialEq for Pattern {
    fn eq(&self, other: &Self) -> bool {
        std::mem::discriminant(&self.kind) == std::mem::discriminant(&other.kind)
            && self.meta.offset == other.meta.offset
            && self.meta.size == other.meta.size
            && self.meta.hidden == other.meta.hidden
            && endianness_for_compare(self.meta.endianness) == endianness_for_compare(other.meta.endianness)
            && self.meta.display_name == other.meta.display_name
            && self.meta.type_name == other.meta.type_name
            && self.meta.comment == other.meta.comment
            && self.meta.local == other.meta.local
    }
}

impl Eq for Pattern {}

fn endianness_for_compare(e: Option<Endianness>) -> Endianness {
    e.unwrap_or(Endianness::Native)
}

/// Visitor interface for double-dispatch over [`PatternKind`] (`spec`
/// §4.5's `visit`). Every method defaults to doing nothing, so a visitor
/// only implements the variants it cares about.
#[allow(unused_variables)]
pub trait PatternVisitor {
    /// `PatternUnsigned`
    fn visit_unsigned(&mut self, pattern: &Pattern) {}
    /// `PatternSigned`
    fn visit_signed(&mut self, pattern: &Pattern) {}
    /// `PatternFloat`
    fn visit_float(&mut self, pattern: &Pattern) {}
    /// `PatternBoolean`
    fn visit_boolean(&mut self, pattern: &Pattern) {}
    /// `PatternCharacter`
    fn visit_character(&mut self, pattern: &Pattern) {}
    /// `PatternWideCharacter`
    fn visit_wide_character(&mut self, pattern: &Pattern) {}
    /// `PatternString`
    fn visit_string(&mut self, pattern: &Pattern) {}
    /// `PatternWideString`
    fn visit_wide_string(&mut self, pattern: &Pattern) {}
    /// `PatternPadding`
    fn visit_padding(&mut self, pattern: &Pattern) {}
    /// `PatternArrayStatic`
    fn visit_array_static(&mut self, pattern: &Pattern) {}
    /// `PatternArrayDynamic`
    fn visit_array_dynamic(&mut self, pattern: &Pattern) {}
    /// `PatternStruct`
    fn visit_struct(&mut self, pattern: &Pattern) {}
    /// `PatternUnion`
    fn visit_union(&mut self, pattern: &Pattern) {}
    /// `PatternBitfield`
    fn visit_bitfield(&mut self, pattern: &Pattern) {}
    /// `PatternBitfieldField`
    fn visit_bitfield_field(&mut self, pattern: &Pattern) {}
    /// `PatternEnum`
    fn visit_enum(&mut self, pattern: &Pattern) {}
    /// `PatternPointer`
    fn visit_pointer(&mut self, pattern: &Pattern) {}
}

/// A visitor that counts how many patterns of each kind it sees; mostly
/// useful as a cheap sanity check and as a reference implementation.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CountingVisitor {
    /// Total patterns visited, across every kind.
    pub total: u64,
}

impl PatternVisitor for CountingVisitor {
    fn visit_unsigned(&mut self, _: &Pattern) {
        self.total += 1;
    }
    fn visit_signed(&mut self, _: &Pattern) {
        self.total += 1;
    }
    fn visit_float(&mut self, _: &Pattern) {
        self.total += 1;
    }
    fn visit_boolean(&mut self, _: &Pattern) {
        self.total += 1;
    }
    fn visit_character(&mut self, _: &Pattern) {
        self.total += 1;
    }
    fn visit_wide_character(&mut self, _: &Pattern) {
        self.total += 1;
    }
    fn visit_string(&mut self, _: &Pattern) {
        self.total += 1;
    }
    fn visit_wide_string(&mut self, _: &Pattern) {
        self.total += 1;
    }
    fn visit_padding(&mut self, _: &Pattern) {
        self.total += 1;
    }
    fn visit_array_static(&mut self, _: &Pattern) {
        self.total += 1;
    }
    fn visit_array_dynamic(&mut self, _: &Pattern) {
        self.total += 1;
    }
    fn visit_struct(&mut self, _: &Pattern) {
        self.total += 1;
    }
    fn visit_union(&mut self, _: &Pattern) {
        self.total += 1;
    }
    fn visit_bitfield(&mut self, _: &Pattern) {
        self.total += 1;
    }
    fn visit_bitfield_field(&mut self, _: &Pattern) {
        self.total += 1;
    }
    fn visit_enum(&mut self, _: &Pattern) {
        self.total += 1;
    }
    fn visit_pointer(&mut self, _: &Pattern) {
        self.total += 1;
    }
}

fn escape_display_char(c: char) -> String {
    match c {
        '\n' => "'\\n'".to_string(),
        '\r' => "'\\r'".to_string(),
        '\t' => "'\\t'".to_string(),
        c if c.is_control() => format!("'\\x{:02X}'", c as u32),
        c => format!("'{c}'"),
    }
}

fn escape_printable(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('"');
    for c in s.chars() {
        match c {
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            '"' => out.push_str("\\\""),
            c if c.is_control() => out.push_str(&format!("\\x{:02X}", c as u32)),
            c => out.push(c),
        }
    }
    out.push('"');
    out
}

/// Which field [`sort_patterns`] orders by.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortColumn {
    /// `meta.display_name`.
    Name,
    /// `meta.offset`.
    Offset,
    /// `meta.size`.
    Size,
    /// [`Pattern::numeric_value`].
    Value,
    /// `meta.type_name`.
    Type,
    /// `meta.color`.
    Color,
}

/// Ascending or descending.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortDirection {
    /// Smallest/earliest first.
    Ascending,
    /// Largest/latest first.
    Descending,
}

/// Stably sorts `patterns` in place by `column` (`spec` §4.5's `sort`).
/// Values were already decoded honouring each pattern's own endianness, so
/// sorting by `Value` naturally respects it without any extra byte-order
/// handling here.
pub fn sort_patterns(patterns: &mut [Pattern], column: SortColumn, direction: SortDirection) {
    patterns.sort_by(|a, b| {
        let ord = match column {
            SortColumn::Name => a.meta.display_name.cmp(&b.meta.display_name),
            SortColumn::Offset => a.meta.offset.cmp(&b.meta.offset),
            SortColumn::Size => a.meta.size.cmp(&b.meta.size),
            SortColumn::Value => a.numeric_value().total_cmp(&b.numeric_value()),
            SortColumn::Type => a.meta.type_name.cmp(&b.meta.type_name),
            SortColumn::Color => a.meta.color.0.cmp(&b.meta.color.0),
        };
        match direction {
            SortDirection::Ascending => ord,
            SortDirection::Descending => ord.reverse(),
        }
    });
}

impl fmt::Display for Pattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {} = {}", self.meta.display_name, self.meta.type_name, self.formatted_value())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn leaf(offset: u64, size: u64, value: u128) -> Pattern {
        Pattern::new(PatternMeta::new(offset, size, "x", "u32"), PatternKind::Unsigned(value))
    }

    #[test]
    fn lookup_finds_innermost_visible_field() {
        let inner = leaf(4, 4, 7);
        let outer = Pattern::new(
            PatternMeta::new(0, 8, "s", "S"),
            PatternKind::Struct { children: vec![leaf(0, 4, 1), inner.clone()] },
        );
        let found = outer.lookup(5).unwrap();
        assert_eq!(found.meta.offset, 4);
        assert_eq!(found.kind, inner.kind);
    }

    #[test]
    fn lookup_skips_hidden_leaf_but_not_its_siblings() {
        let mut hidden = leaf(0, 4, 1);
        hidden.meta.hidden = true;
        let visible = leaf(4, 4, 2);
        let outer = Pattern::new(
            PatternMeta::new(0, 8, "s", "S"),
            PatternKind::Struct { children: vec![hidden, visible] },
        );
        assert!(outer.lookup(1).is_none());
        assert!(outer.lookup(5).is_some());
    }

    #[test]
    fn static_array_is_not_recursed_into() {
        let template = leaf(0, 4, 0);
        let array = Pattern::new(
            PatternMeta::new(0, 16, "arr", "u32"),
            PatternKind::StaticArray { template: Box::new(template), count: 4 },
        );
        assert!(array.lookup(4).is_some());
        let found = array.lookup(4).unwrap();
        assert_eq!(found.meta.offset, 0);
    }

    #[test]
    fn equality_ignores_color_and_value_but_not_offset() {
        let a = leaf(0, 4, 1);
        let mut b = leaf(0, 4, 99);
        b.meta.color = Color(0xFF_00_00_FF);
        assert_eq!(a, b, "differing value/colour shouldn't break equality");

        let mut c = leaf(4, 4, 1);
        c.meta.color = Color(0);
        assert_ne!(a, c, "differing offset must break equality");
    }

    #[test]
    fn equality_treats_unset_endianness_as_native() {
        let mut a = leaf(0, 4, 1);
        let mut b = leaf(0, 4, 1);
        a.meta.endianness = None;
        b.meta.endianness = Some(Endianness::Native);
        assert_eq!(a, b);
    }

    #[test]
    fn sort_by_offset_is_stable_and_respects_direction() {
        let mut patterns = vec![leaf(8, 4, 0), leaf(0, 4, 0), leaf(4, 4, 0)];
        sort_patterns(&mut patterns, SortColumn::Offset, SortDirection::Ascending);
        let offsets: Vec<u64> = patterns.iter().map(|p| p.meta.offset).collect();
        assert_eq!(offsets, vec![0, 4, 8]);

        sort_patterns(&mut patterns, SortColumn::Offset, SortDirection::Descending);
        let offsets: Vec<u64> = patterns.iter().map(|p| p.meta.offset).collect();
        assert_eq!(offsets, vec![8, 4, 0]);
    }

    #[test]
    fn highlighted_ranges_skip_hidden_patterns() {
        let mut hidden = leaf(4, 4, 0);
        hidden.meta.hidden = true;
        let outer = Pattern::new(
            PatternMeta::new(0, 8, "s", "S"),
            PatternKind::Struct { children: vec![leaf(0, 4, 0), hidden] },
        );
        let ranges = outer.highlighted_ranges();
        assert_eq!(ranges.len(), 2); // the struct itself, plus the one visible field
    }

    #[test]
    fn bitfield_field_has_zero_byte_size() {
        let field = Pattern::new(
            PatternMeta::new(0, 0, "flag", "bit"),
            PatternKind::BitfieldField { bit_offset: 0, bit_size: 1, value: 1 },
        );
        assert_eq!(field.meta.size, 0);
    }

    #[test]
    fn counting_visitor_walks_the_whole_subtree() {
        let outer = Pattern::new(
            PatternMeta::new(0, 8, "s", "S"),
            PatternKind::Struct { children: vec![leaf(0, 4, 0), leaf(4, 4, 0)] },
        );
        let mut visitor = CountingVisitor::default();
        outer.walk(&mut visitor);
        assert_eq!(visitor.total, 3); // struct + 2 children
    }

    #[cfg(feature = "serde")]
    #[test]
    fn struct_pattern_round_trips_through_json() {
        let outer = Pattern::new(
            PatternMeta::new(0, 8, "hdr", "Header"),
            PatternKind::Struct { children: vec![leaf(0, 4, 1), leaf(4, 4, 2)] },
        );
        let snapshot = serde_json::to_string(&outer).expect("pattern tree should serialize");
        let restored: Pattern = serde_json::from_str(&snapshot).expect("snapshot should deserialize");
        assert_eq!(restored.meta.offset, outer.meta.offset);
        assert_eq!(restored.kind, outer.kind);
    }
}
