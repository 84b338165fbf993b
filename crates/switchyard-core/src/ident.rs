// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Signatures, signature digests, and interned labels.

use std::any::{type_name, TypeId};
use std::fmt;
use std::rc::Rc;

use blake3::Hasher;
use rustc_hash::FxHashMap;

use crate::args::ArgList;

/// Domain-separated BLAKE3 digest of a signature's type names.
///
/// Stable across runs of the same build; used only for logging and graph
/// tooling. Equality checks go through [`Signature::same_as`].
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SignatureId(pub [u8; 32]);

impl SignatureId {
    /// First six bytes as lowercase hex, the form used in log fields.
    pub fn short_hex(&self) -> String {
        hex::encode(&self.0[..6])
    }
}

impl fmt::Debug for SignatureId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SignatureId({})", self.short_hex())
    }
}

impl fmt::Display for SignatureId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.short_hex())
    }
}

/// Produces a stable, domain-separated signature digest (prefix `b"sig:"`).
pub fn make_signature_id(args: &[&str], ret: &str) -> SignatureId {
    let mut hasher = Hasher::new();
    hasher.update(b"sig:");
    for name in args {
        hasher.update(name.as_bytes());
        hasher.update(b",");
    }
    hasher.update(b"->");
    hasher.update(ret.as_bytes());
    SignatureId(hasher.finalize().into())
}

/// Argument list plus return type of a channel, fixed at first use of a name.
#[derive(Clone, Debug)]
pub struct Signature {
    key: TypeId,
    args: Vec<TypeId>,
    arg_names: Vec<&'static str>,
    ret: TypeId,
    ret_name: &'static str,
    id: SignatureId,
}

impl Signature {
    /// Signature of a channel carrying `A` and returning `R`.
    pub fn of<A: ArgList, R: 'static>() -> Self {
        let arg_names = A::type_names();
        let ret_name = type_name::<R>();
        let id = make_signature_id(&arg_names, ret_name);
        Self {
            key: TypeId::of::<fn(A) -> R>(),
            args: A::type_ids(),
            arg_names,
            ret: TypeId::of::<R>(),
            ret_name,
            id,
        }
    }

    /// True when both signatures name the same argument and return types.
    pub fn same_as(&self, other: &Self) -> bool {
        self.key == other.key
    }

    /// Argument `TypeId`s in declaration order.
    pub fn args(&self) -> &[TypeId] {
        &self.args
    }

    /// Argument type names in declaration order.
    pub fn arg_names(&self) -> &[&'static str] {
        &self.arg_names
    }

    /// Number of declared arguments.
    pub fn arity(&self) -> usize {
        self.args.len()
    }

    /// Return type.
    pub fn ret(&self) -> TypeId {
        self.ret
    }

    /// Return type name.
    pub fn ret_name(&self) -> &'static str {
        self.ret_name
    }

    /// True when the channel returns `()`.
    pub fn returns_unit(&self) -> bool {
        self.ret == TypeId::of::<()>()
    }

    /// Digest used in logs.
    pub fn id(&self) -> SignatureId {
        self.id
    }
}

impl PartialEq for Signature {
    fn eq(&self, other: &Self) -> bool {
        self.same_as(other)
    }
}

impl Eq for Signature {}

impl fmt::Display for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "fn({})", self.arg_names.join(", "))?;
        if !self.returns_unit() {
            write!(f, " -> {}", self.ret_name)?;
        }
        Ok(())
    }
}

/// Interned label id. `0` is reserved for the empty label.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NameId(pub u64);

impl NameId {
    /// Id of the empty label.
    pub const EMPTY: Self = Self(0);

    /// True for the empty label.
    pub fn is_empty(self) -> bool {
        self == Self::EMPTY
    }
}

/// Interned diagnostic label: subscriber names and handle sources.
#[derive(Clone, Debug)]
pub struct Label {
    id: NameId,
    text: Rc<str>,
}

impl Label {
    /// The empty label (anonymous subscriber).
    pub fn empty() -> Self {
        Self {
            id: NameId::EMPTY,
            text: Rc::from(""),
        }
    }

    /// Interned id within the table that produced this label.
    pub fn id(&self) -> NameId {
        self.id
    }

    /// Label text.
    pub fn as_str(&self) -> &str {
        &self.text
    }

    /// True for the empty label.
    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }
}

// Labels from different tables may share ids, so equality is by text.
impl PartialEq for Label {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.text, &other.text) || self.text == other.text
    }
}

impl Eq for Label {}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}

/// Explicit string interner owned by a registrar.
///
/// Ids are dense and start at 1. [`NameTable::reset`] forgets every entry;
/// labels handed out earlier stay valid because they own their text.
#[derive(Debug, Default)]
pub struct NameTable {
    ids: FxHashMap<Rc<str>, NameId>,
    names: Vec<Rc<str>>,
}

impl NameTable {
    /// Empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the label for `text`, allocating an id on first sight.
    pub fn intern(&mut self, text: &str) -> Label {
        if text.is_empty() {
            return Label::empty();
        }
        if let Some((stored, id)) = self.ids.get_key_value(text) {
            return Label {
                id: *id,
                text: Rc::clone(stored),
            };
        }
        let stored: Rc<str> = Rc::from(text);
        self.names.push(Rc::clone(&stored));
        let id = NameId(self.names.len() as u64);
        self.ids.insert(Rc::clone(&stored), id);
        Label { id, text: stored }
    }

    /// Text for `id`, or `None` when unknown. The empty id resolves to `""`.
    pub fn resolve(&self, id: NameId) -> Option<&str> {
        if id.is_empty() {
            return Some("");
        }
        let index = usize::try_from(id.0 - 1).ok()?;
        self.names.get(index).map(|name| &**name)
    }

    /// Number of interned (non-empty) labels.
    pub fn len(&self) -> usize {
        self.names.len()
    }

    /// True when nothing has been interned.
    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// Forgets every interned label.
    pub fn reset(&mut self) {
        self.ids.clear();
        self.names.clear();
    }
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn signature_display_omits_unit_return() {
        assert_eq!(Signature::of::<(i32, bool), ()>().to_string(), "fn(i32, bool)");
        assert_eq!(Signature::of::<(), u8>().to_string(), "fn() -> u8");
    }

    #[test]
    fn signatures_compare_by_type() {
        let a = Signature::of::<(i32,), ()>();
        let b = Signature::of::<(i32,), ()>();
        let c = Signature::of::<(f64,), ()>();
        let d = Signature::of::<(i32,), bool>();
        assert!(a.same_as(&b));
        assert_ne!(a, c);
        assert_ne!(a, d);
        assert_eq!(a.id(), b.id());
        assert_ne!(a.id(), c.id());
    }

    #[test]
    fn signature_id_is_domain_separated() {
        let sig = make_signature_id(&["i32"], "()");
        let mut hasher = Hasher::new();
        hasher.update(b"i32,->()");
        let bare: [u8; 32] = hasher.finalize().into();
        assert_ne!(sig.0, bare);
        assert_eq!(sig.short_hex().len(), 12);
    }

    #[test]
    fn name_table_interns_and_resets() {
        let mut table = NameTable::new();
        let a = table.intern("alpha");
        let b = table.intern("beta");
        let a2 = table.intern("alpha");
        assert_eq!(a.id(), NameId(1));
        assert_eq!(b.id(), NameId(2));
        assert_eq!(a, a2);
        assert_eq!(table.resolve(NameId(2)), Some("beta"));
        assert_eq!(table.resolve(NameId::EMPTY), Some(""));
        assert!(table.intern("").id().is_empty());

        table.reset();
        assert!(table.is_empty());
        assert_eq!(table.resolve(NameId(1)), None);
        assert_eq!(a.as_str(), "alpha");
    }
}
