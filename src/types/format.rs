//! Human-readable rendering of types for hover and diagnostics.
//!
//! `T | nil` renders as `T?`; unions longer than the limit are cut with a
//! `...(+n)` suffix. Alias collapse needs the type index and lives on the
//! search context.

use super::{LiteralValue, LuaType, Signature};

#[derive(Debug, Clone, Copy, Default)]
pub struct FormatOptions {
    /// Union members shown before truncation; `None` shows all
    pub union_limit: Option<usize>,
}

impl FormatOptions {
    pub fn truncated(limit: usize) -> Self {
        Self {
            union_limit: Some(limit),
        }
    }
}

/// Format a type for display
///
/// - `Union([String, Nil])` → `"string?"`
/// - `Signature` → `"fun(x: integer): string"`
/// - `Array(Named("Foo"))` → `"Foo[]"`
pub fn format_type(ty: &LuaType, options: &FormatOptions) -> String {
    match ty {
        LuaType::Unknown => "unknown".to_string(),
        LuaType::Any => "any".to_string(),
        LuaType::Nil => "nil".to_string(),
        LuaType::Boolean => "boolean".to_string(),
        LuaType::Number => "number".to_string(),
        LuaType::Integer => "integer".to_string(),
        LuaType::String => "string".to_string(),
        LuaType::Named { name, args } => {
            if args.is_empty() {
                name.clone()
            } else {
                let args: Vec<String> = args.iter().map(|a| format_type(a, options)).collect();
                format!("{}<{}>", name, args.join(", "))
            }
        }
        LuaType::TemplateRef(name) => name.clone(),
        LuaType::Array(elem) => {
            let inner = format_type(elem, options);
            if matches!(**elem, LuaType::Union(_) | LuaType::Signature(_)) {
                format!("({})[]", inner)
            } else {
                format!("{}[]", inner)
            }
        }
        LuaType::Tuple(items) => {
            let items: Vec<String> = items.iter().map(|t| format_type(t, options)).collect();
            format!("[{}]", items.join(", "))
        }
        LuaType::Union(items) => format_union(items, options),
        LuaType::Table { key, value } => format!(
            "table<{}, {}>",
            format_type(key, options),
            format_type(value, options)
        ),
        LuaType::TableLiteral(_) => "table".to_string(),
        LuaType::Signature(sig) => format_signature(sig, options),
        LuaType::Literal(lit) => format_literal(lit),
        LuaType::MultiReturn(items) => {
            let items: Vec<String> = items.iter().map(|t| format_type(t, options)).collect();
            items.join(", ")
        }
    }
}

fn format_union(items: &[LuaType], options: &FormatOptions) -> String {
    let non_nil: Vec<&LuaType> = items.iter().filter(|t| !t.is_nil()).collect();
    let nullable = non_nil.len() < items.len();
    if nullable && non_nil.len() == 1 {
        let inner = format_type(non_nil[0], options);
        return if matches!(non_nil[0], LuaType::Signature(_)) {
            format!("({})?", inner)
        } else {
            format!("{}?", inner)
        };
    }
    let limit = options.union_limit.unwrap_or(usize::MAX);
    let mut parts: Vec<String> = items
        .iter()
        .take(limit)
        .map(|t| format_type(t, options))
        .collect();
    if items.len() > limit {
        parts.push(format!("...(+{})", items.len() - limit));
    }
    parts.join(" | ")
}

fn format_signature(sig: &Signature, options: &FormatOptions) -> String {
    let mut params: Vec<String> = sig
        .params
        .iter()
        .map(|p| {
            let optional = if p.optional { "?" } else { "" };
            format!("{}{}: {}", p.name, optional, format_type(&p.ty, options))
        })
        .collect();
    if let Some(variadic) = &sig.variadic {
        params.push(format!("...: {}", format_type(variadic, options)));
    }
    let prefix = if sig.is_async { "async fun" } else { "fun" };
    let mut out = format!("{}({})", prefix, params.join(", "));
    if !sig.returns.is_empty() {
        let returns: Vec<String> = sig.returns.iter().map(|r| format_type(r, options)).collect();
        out.push_str(": ");
        out.push_str(&returns.join(", "));
    }
    out
}

fn format_literal(lit: &LiteralValue) -> String {
    match lit {
        LiteralValue::Integer(value) => value.to_string(),
        LiteralValue::Float(value) => {
            if value.fract() == 0.0 && value.is_finite() {
                format!("{:.1}", value)
            } else {
                value.to_string()
            }
        }
        LiteralValue::String(value) => format!("{:?}", value),
        LiteralValue::Boolean(value) => value.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::SignatureParam;

    fn render(ty: &LuaType) -> String {
        format_type(ty, &FormatOptions::default())
    }

    #[test]
    fn test_nullable_renders_question_mark() {
        let ty = LuaType::union(LuaType::String, LuaType::Nil);
        assert_eq!(render(&ty), "string?");
    }

    #[test]
    fn test_union_truncation() {
        let ty = LuaType::union_all((1..=5).map(LuaType::integer_literal));
        assert_eq!(
            format_type(&ty, &FormatOptions::truncated(2)),
            "1 | 2 | ...(+3)"
        );
        assert_eq!(render(&ty), "1 | 2 | 3 | 4 | 5");
    }

    #[test]
    fn test_signature_and_generics() {
        let mut sig = Signature::new(
            vec![SignatureParam::new("x", LuaType::Integer)],
            vec![LuaType::String, LuaType::Boolean],
        );
        sig.variadic = Some(LuaType::Any);
        assert_eq!(
            render(&LuaType::signature(sig)),
            "fun(x: integer, ...: any): string, boolean"
        );
        let list = LuaType::Named {
            name: "List".to_string(),
            args: vec![LuaType::Integer],
        };
        assert_eq!(render(&list), "List<integer>");
    }

    #[test]
    fn test_arrays_and_literals() {
        let ty = LuaType::array(LuaType::union(LuaType::String, LuaType::Integer));
        assert_eq!(render(&ty), "(string | integer)[]");
        assert_eq!(render(&LuaType::string_literal("ok")), "\"ok\"");
        assert_eq!(
            render(&LuaType::Literal(LiteralValue::Float(2.0))),
            "2.0"
        );
    }
}
