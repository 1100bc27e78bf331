//! The type algebra shared by inference, resolution and the type index.
//!
//! Types are plain values. Substitution and union build new values and never
//! mutate their inputs, so a type can be cloned into any number of cache
//! entries.

pub mod compat;
pub mod format;
pub mod generics;

pub use compat::{TypeCompatibility, TypeHierarchy};
pub use format::{format_type, FormatOptions};

use crate::syntax::SyntaxRef;
use std::sync::Arc;

/// Value of a literal type
#[derive(Debug, Clone)]
pub enum LiteralValue {
    Integer(i64),
    Float(f64),
    String(String),
    Boolean(bool),
}

impl PartialEq for LiteralValue {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (LiteralValue::Integer(a), LiteralValue::Integer(b)) => a == b,
            (LiteralValue::Float(a), LiteralValue::Float(b)) => a == b,
            // numeric literals compare by value
            (LiteralValue::Integer(a), LiteralValue::Float(b))
            | (LiteralValue::Float(b), LiteralValue::Integer(a)) => (*a as f64) == *b,
            (LiteralValue::String(a), LiteralValue::String(b)) => a == b,
            (LiteralValue::Boolean(a), LiteralValue::Boolean(b)) => a == b,
            _ => false,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SignatureParam {
    pub name: String,
    pub ty: LuaType,
    pub optional: bool,
}

impl SignatureParam {
    pub fn new(name: impl Into<String>, ty: LuaType) -> Self {
        Self {
            name: name.into(),
            ty,
            optional: false,
        }
    }
}

/// A function type with its overloads
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Signature {
    pub params: Vec<SignatureParam>,
    /// Type of `...` when the function is variadic
    pub variadic: Option<LuaType>,
    /// Every value the function returns, in order
    pub returns: Vec<LuaType>,
    pub overloads: Vec<Arc<Signature>>,
    /// Template parameter names bound per call
    pub generics: Vec<String>,
    /// Defined with `:`, so `self` is implicit
    pub colon_define: bool,
    pub is_async: bool,
    /// Closure the signature was inferred from
    pub origin: Option<SyntaxRef>,
}

impl Signature {
    pub fn new(params: Vec<SignatureParam>, returns: Vec<LuaType>) -> Self {
        Self {
            params,
            returns,
            ..Default::default()
        }
    }

    /// Return values as a single type: nothing is `nil`, several are a multi-return
    pub fn return_type(&self) -> LuaType {
        match self.returns.len() {
            0 => LuaType::Nil,
            1 => self.returns[0].clone(),
            _ => LuaType::MultiReturn(self.returns.clone()),
        }
    }

    /// Minimum number of arguments a call must supply
    pub fn required_params(&self) -> usize {
        self.params
            .iter()
            .rposition(|p| !p.optional && !p.ty.is_nullable())
            .map(|i| i + 1)
            .unwrap_or(0)
    }

    pub fn accepts_arity(&self, args: usize) -> bool {
        args >= self.required_params() && (self.variadic.is_some() || args <= self.params.len())
    }

    /// Declared type of the argument at `index`, taking `...` into account
    pub fn param_type(&self, index: usize) -> Option<&LuaType> {
        self.params
            .get(index)
            .map(|p| &p.ty)
            .or(self.variadic.as_ref())
    }

    /// This signature followed by its overloads
    pub fn candidates(self: &Arc<Self>) -> Vec<Arc<Signature>> {
        let mut out = Vec::with_capacity(1 + self.overloads.len());
        out.push(self.clone());
        out.extend(self.overloads.iter().cloned());
        out
    }
}

/// A static type
#[derive(Debug, Clone)]
pub enum LuaType {
    /// No information; never an error
    Unknown,
    Any,
    Nil,
    Boolean,
    Number,
    Integer,
    String,
    /// Class, enum, interface or alias, resolved lazily against the type index
    Named { name: String, args: Vec<LuaType> },
    /// Generic parameter leaf
    TemplateRef(String),
    Array(Box<LuaType>),
    Tuple(Vec<LuaType>),
    /// Set of alternatives; use [`LuaType::union`] to build
    Union(Vec<LuaType>),
    Table { key: Box<LuaType>, value: Box<LuaType> },
    /// Shape given by a table constructor or a `{ k: T }` annotation
    TableLiteral(SyntaxRef),
    Signature(Arc<Signature>),
    Literal(LiteralValue),
    MultiReturn(Vec<LuaType>),
}

impl PartialEq for LuaType {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (LuaType::Unknown, LuaType::Unknown)
            | (LuaType::Any, LuaType::Any)
            | (LuaType::Nil, LuaType::Nil)
            | (LuaType::Boolean, LuaType::Boolean)
            | (LuaType::Number, LuaType::Number)
            | (LuaType::Integer, LuaType::Integer)
            | (LuaType::String, LuaType::String) => true,
            (
                LuaType::Named { name: a, args: a_args },
                LuaType::Named { name: b, args: b_args },
            ) => a == b && a_args == b_args,
            (LuaType::TemplateRef(a), LuaType::TemplateRef(b)) => a == b,
            (LuaType::Array(a), LuaType::Array(b)) => a == b,
            (LuaType::Tuple(a), LuaType::Tuple(b)) => a == b,
            // order-insensitive set equality
            (LuaType::Union(a), LuaType::Union(b)) => {
                a.len() == b.len() && a.iter().all(|t| b.contains(t))
            }
            (
                LuaType::Table { key: ak, value: av },
                LuaType::Table { key: bk, value: bv },
            ) => ak == bk && av == bv,
            (LuaType::TableLiteral(a), LuaType::TableLiteral(b)) => a == b,
            (LuaType::Signature(a), LuaType::Signature(b)) => Arc::ptr_eq(a, b) || a == b,
            (LuaType::Literal(a), LuaType::Literal(b)) => a == b,
            (LuaType::MultiReturn(a), LuaType::MultiReturn(b)) => a == b,
            _ => false,
        }
    }
}

impl LuaType {
    pub fn named(name: impl Into<String>) -> Self {
        LuaType::Named {
            name: name.into(),
            args: Vec::new(),
        }
    }

    pub fn array(elem: LuaType) -> Self {
        LuaType::Array(Box::new(elem))
    }

    pub fn table(key: LuaType, value: LuaType) -> Self {
        LuaType::Table {
            key: Box::new(key),
            value: Box::new(value),
        }
    }

    pub fn signature(sig: Signature) -> Self {
        LuaType::Signature(Arc::new(sig))
    }

    pub fn integer_literal(value: i64) -> Self {
        LuaType::Literal(LiteralValue::Integer(value))
    }

    pub fn string_literal(value: impl Into<String>) -> Self {
        LuaType::Literal(LiteralValue::String(value.into()))
    }

    pub fn is_unknown(&self) -> bool {
        matches!(self, LuaType::Unknown)
    }

    pub fn is_nil(&self) -> bool {
        matches!(self, LuaType::Nil)
    }

    /// `nil` or a union containing `nil`
    pub fn is_nullable(&self) -> bool {
        match self {
            LuaType::Nil => true,
            LuaType::Union(items) => items.iter().any(|t| t.is_nil()),
            _ => false,
        }
    }

    /// Union of `a` and `b` with set semantics.
    ///
    /// Nested unions are flattened, exact duplicates dropped, and a union of
    /// one member collapses to that member. `unknown` is absorbed by any
    /// other type.
    pub fn union(a: LuaType, b: LuaType) -> LuaType {
        if a == b {
            return a;
        }
        let mut items = Vec::new();
        push_flattened(&mut items, a);
        push_flattened(&mut items, b);
        if items.len() > 1 {
            items.retain(|t| !t.is_unknown());
        }
        match items.len() {
            0 => LuaType::Unknown,
            1 => items.pop().unwrap_or(LuaType::Unknown),
            _ => LuaType::Union(items),
        }
    }

    /// Fold an iterator of types into one union; empty input is `unknown`
    pub fn union_all(types: impl IntoIterator<Item = LuaType>) -> LuaType {
        let mut iter = types.into_iter();
        let Some(first) = iter.next() else {
            return LuaType::Unknown;
        };
        iter.fold(first, LuaType::union)
    }

    /// Literal types widened to their primitive, as stored in mutable slots
    pub fn widen(&self) -> LuaType {
        match self {
            LuaType::Literal(LiteralValue::Integer(_)) => LuaType::Integer,
            LuaType::Literal(LiteralValue::Float(_)) => LuaType::Number,
            LuaType::Literal(LiteralValue::String(_)) => LuaType::String,
            LuaType::Literal(LiteralValue::Boolean(_)) => LuaType::Boolean,
            LuaType::Union(items) => LuaType::union_all(items.iter().map(LuaType::widen)),
            other => other.clone(),
        }
    }

    /// The same type with `nil` removed from it
    pub fn without_nil(&self) -> LuaType {
        match self {
            LuaType::Union(items) => {
                LuaType::union_all(items.iter().filter(|t| !t.is_nil()).cloned())
            }
            other => other.clone(),
        }
    }

    /// The value at `index` of a multi-value type, `nil` past the end
    pub fn value_at(&self, index: usize) -> LuaType {
        match self {
            LuaType::MultiReturn(values) => values.get(index).cloned().unwrap_or(LuaType::Nil),
            LuaType::Unknown | LuaType::Any => self.clone(),
            other if index == 0 => other.clone(),
            _ => LuaType::Nil,
        }
    }

    /// The first value of a multi-value type
    pub fn first_value(&self) -> LuaType {
        self.value_at(0)
    }

    /// Union members, or the type itself as a single member
    pub fn members(&self) -> Vec<&LuaType> {
        match self {
            LuaType::Union(items) => items.iter().collect(),
            other => vec![other],
        }
    }

    pub fn as_signature(&self) -> Option<&Arc<Signature>> {
        match self {
            LuaType::Signature(sig) => Some(sig),
            LuaType::Union(items) => items.iter().find_map(LuaType::as_signature),
            _ => None,
        }
    }

    /// Builtin class that carries methods for primitive values
    pub fn builtin_class(&self) -> Option<&'static str> {
        match self {
            LuaType::String | LuaType::Literal(LiteralValue::String(_)) => Some("string"),
            _ => None,
        }
    }
}

fn push_flattened(items: &mut Vec<LuaType>, ty: LuaType) {
    match ty {
        LuaType::Union(members) => {
            for member in members {
                push_flattened(items, member);
            }
        }
        other => {
            if !items.contains(&other) {
                items.push(other);
            }
        }
    }
}

impl std::fmt::Display for LuaType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&format_type(self, &FormatOptions::default()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_union_idempotent() {
        let a = LuaType::String;
        assert_eq!(LuaType::union(a.clone(), a.clone()), a);
    }

    #[test]
    fn test_union_commutative_as_set() {
        let ab = LuaType::union(LuaType::String, LuaType::Integer);
        let ba = LuaType::union(LuaType::Integer, LuaType::String);
        assert_eq!(ab, ba);
    }

    #[test]
    fn test_union_flattens_nested() {
        let ab = LuaType::union(LuaType::String, LuaType::Integer);
        let abc = LuaType::union(ab, LuaType::union(LuaType::Boolean, LuaType::String));
        match &abc {
            LuaType::Union(items) => {
                assert_eq!(items.len(), 3);
                assert!(items.iter().all(|t| !matches!(t, LuaType::Union(_))));
            }
            other => panic!("expected union, got {:?}", other),
        }
    }

    #[test]
    fn test_union_absorbs_unknown() {
        assert_eq!(
            LuaType::union(LuaType::Unknown, LuaType::Integer),
            LuaType::Integer
        );
        assert_eq!(
            LuaType::union(LuaType::Unknown, LuaType::Unknown),
            LuaType::Unknown
        );
    }

    #[test]
    fn test_numeric_literals_compare_by_value() {
        assert_eq!(
            LuaType::Literal(LiteralValue::Integer(1)),
            LuaType::Literal(LiteralValue::Float(1.0))
        );
        assert_ne!(LuaType::Literal(LiteralValue::Integer(1)), LuaType::Integer);
    }

    #[test]
    fn test_widen_literals() {
        assert_eq!(LuaType::integer_literal(3).widen(), LuaType::Integer);
        assert_eq!(
            LuaType::Literal(LiteralValue::Float(0.5)).widen(),
            LuaType::Number
        );
        assert_eq!(LuaType::string_literal("s").widen(), LuaType::String);
        let mixed = LuaType::union(LuaType::integer_literal(1), LuaType::integer_literal(2));
        assert_eq!(mixed.widen(), LuaType::Integer);
    }

    #[test]
    fn test_value_at_multi_return() {
        let multi = LuaType::MultiReturn(vec![LuaType::String, LuaType::Integer]);
        assert_eq!(multi.value_at(1), LuaType::Integer);
        assert_eq!(multi.value_at(2), LuaType::Nil);
        assert_eq!(LuaType::Boolean.value_at(1), LuaType::Nil);
    }

    #[test]
    fn test_required_params() {
        let mut sig = Signature::new(
            vec![
                SignatureParam::new("a", LuaType::Integer),
                SignatureParam::new("b", LuaType::union(LuaType::String, LuaType::Nil)),
            ],
            vec![],
        );
        assert_eq!(sig.required_params(), 1);
        assert!(sig.accepts_arity(1));
        assert!(!sig.accepts_arity(3));
        sig.variadic = Some(LuaType::Any);
        assert!(sig.accepts_arity(5));
    }
}
