use super::{LuaType, Signature, SignatureParam};
use rustc_hash::FxHashMap;
use std::sync::Arc;

/// Template name → bound type
pub type Substitution = FxHashMap<String, LuaType>;

/// Build the substitution for `params` instantiated with `args`.
///
/// Missing arguments bind to `unknown`; extra arguments are ignored.
pub fn substitution_for(params: &[String], args: &[LuaType]) -> Substitution {
    let mut substitutions =
        FxHashMap::with_capacity_and_hasher(params.len(), Default::default());
    for (index, param) in params.iter().enumerate() {
        let arg = args.get(index).cloned().unwrap_or(LuaType::Unknown);
        substitutions.insert(param.clone(), arg);
    }
    substitutions
}

impl LuaType {
    /// Rewrite every generic-parameter leaf bound in `substitutions`.
    ///
    /// Bare `Named` types without arguments are treated as parameter leaves
    /// too, since class generics are written as plain names inside member
    /// annotations. The receiver is left untouched.
    pub fn instantiate(&self, substitutions: &Substitution) -> LuaType {
        if substitutions.is_empty() {
            return self.clone();
        }
        match self {
            LuaType::TemplateRef(name) => substitutions
                .get(name)
                .cloned()
                .unwrap_or_else(|| self.clone()),
            LuaType::Named { name, args } => {
                if args.is_empty() {
                    if let Some(bound) = substitutions.get(name) {
                        return bound.clone();
                    }
                    return self.clone();
                }
                LuaType::Named {
                    name: name.clone(),
                    args: args.iter().map(|a| a.instantiate(substitutions)).collect(),
                }
            }
            LuaType::Array(elem) => LuaType::array(elem.instantiate(substitutions)),
            LuaType::Tuple(items) => {
                LuaType::Tuple(items.iter().map(|t| t.instantiate(substitutions)).collect())
            }
            LuaType::Union(items) => {
                LuaType::union_all(items.iter().map(|t| t.instantiate(substitutions)))
            }
            LuaType::MultiReturn(items) => LuaType::MultiReturn(
                items.iter().map(|t| t.instantiate(substitutions)).collect(),
            ),
            LuaType::Table { key, value } => LuaType::table(
                key.instantiate(substitutions),
                value.instantiate(substitutions),
            ),
            LuaType::Signature(sig) => {
                LuaType::Signature(Arc::new(instantiate_signature(sig, substitutions)))
            }
            LuaType::Unknown
            | LuaType::Any
            | LuaType::Nil
            | LuaType::Boolean
            | LuaType::Number
            | LuaType::Integer
            | LuaType::String
            | LuaType::TableLiteral(_)
            | LuaType::Literal(_) => self.clone(),
        }
    }

    /// Does any template parameter leaf occur inside this type
    pub fn contains_template(&self) -> bool {
        match self {
            LuaType::TemplateRef(_) => true,
            LuaType::Named { args, .. } => args.iter().any(LuaType::contains_template),
            LuaType::Array(elem) => elem.contains_template(),
            LuaType::Tuple(items) | LuaType::Union(items) | LuaType::MultiReturn(items) => {
                items.iter().any(LuaType::contains_template)
            }
            LuaType::Table { key, value } => key.contains_template() || value.contains_template(),
            LuaType::Signature(sig) => {
                sig.params.iter().any(|p| p.ty.contains_template())
                    || sig.returns.iter().any(LuaType::contains_template)
            }
            _ => false,
        }
    }
}

/// Copy of `sig` with `substitutions` applied; its own generics are dropped
/// when all of them are bound.
pub fn instantiate_signature(sig: &Signature, substitutions: &Substitution) -> Signature {
    let generics: Vec<String> = sig
        .generics
        .iter()
        .filter(|g| !substitutions.contains_key(*g))
        .cloned()
        .collect();
    Signature {
        params: sig
            .params
            .iter()
            .map(|p| SignatureParam {
                name: p.name.clone(),
                ty: p.ty.instantiate(substitutions),
                optional: p.optional,
            })
            .collect(),
        variadic: sig.variadic.as_ref().map(|v| v.instantiate(substitutions)),
        returns: sig
            .returns
            .iter()
            .map(|r| r.instantiate(substitutions))
            .collect(),
        overloads: sig
            .overloads
            .iter()
            .map(|o| Arc::new(instantiate_signature(o, substitutions)))
            .collect(),
        generics,
        colon_define: sig.colon_define,
        is_async: sig.is_async,
        origin: sig.origin,
    }
}

/// Structurally match a declared parameter type against an argument type,
/// recording bindings for template leaves named in `templates`.
///
/// The first binding for a template wins; later matches union into it.
pub fn bind_templates(
    param: &LuaType,
    arg: &LuaType,
    templates: &[String],
    bindings: &mut Substitution,
) {
    match (param, arg) {
        (_, LuaType::Unknown) => {}
        (LuaType::TemplateRef(name), _) => bind_one(name, arg, templates, bindings),
        (LuaType::Named { name, args }, _) if args.is_empty() && templates.contains(name) => {
            bind_one(name, arg, templates, bindings)
        }
        (LuaType::Named { name: p, args: p_args }, LuaType::Named { name: a, args: a_args })
            if p == a =>
        {
            for (p_arg, a_arg) in p_args.iter().zip(a_args) {
                bind_templates(p_arg, a_arg, templates, bindings);
            }
        }
        (LuaType::Array(p_elem), LuaType::Array(a_elem)) => {
            bind_templates(p_elem, a_elem, templates, bindings)
        }
        (LuaType::Table { key, value }, LuaType::Array(a_elem)) => {
            bind_templates(key, &LuaType::Integer, templates, bindings);
            bind_templates(value, a_elem, templates, bindings);
        }
        (LuaType::Table { key: pk, value: pv }, LuaType::Table { key: ak, value: av }) => {
            bind_templates(pk, ak, templates, bindings);
            bind_templates(pv, av, templates, bindings);
        }
        (LuaType::Tuple(p_items), LuaType::Tuple(a_items)) => {
            for (p_item, a_item) in p_items.iter().zip(a_items) {
                bind_templates(p_item, a_item, templates, bindings);
            }
        }
        (LuaType::Union(p_items), _) => {
            // `T | nil` binds T to the argument without its nil
            let open: Vec<&LuaType> = p_items.iter().filter(|t| t.contains_template()).collect();
            if open.len() == 1 {
                bind_templates(open[0], &arg.without_nil(), templates, bindings);
            }
        }
        (LuaType::Signature(p_sig), LuaType::Signature(a_sig)) => {
            for (p_param, a_param) in p_sig.params.iter().zip(&a_sig.params) {
                bind_templates(&p_param.ty, &a_param.ty, templates, bindings);
            }
            for (p_ret, a_ret) in p_sig.returns.iter().zip(&a_sig.returns) {
                bind_templates(p_ret, a_ret, templates, bindings);
            }
        }
        _ => {}
    }
}

fn bind_one(name: &str, arg: &LuaType, templates: &[String], bindings: &mut Substitution) {
    if !templates.iter().any(|t| t == name) {
        return;
    }
    let widened = arg.widen();
    match bindings.get_mut(name) {
        Some(existing) => {
            *existing = LuaType::union(existing.clone(), widened);
        }
        None => {
            bindings.insert(name.to_string(), widened);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn templates(names: &[&str]) -> Vec<String> {
        names.iter().map(|n| n.to_string()).collect()
    }

    #[test]
    fn test_instantiate_leaves_original_unchanged() {
        let original = LuaType::array(LuaType::TemplateRef("T".to_string()));
        let subs = substitution_for(&templates(&["T"]), &[LuaType::String]);
        let instantiated = original.instantiate(&subs);
        assert_eq!(instantiated, LuaType::array(LuaType::String));
        assert_eq!(original, LuaType::array(LuaType::TemplateRef("T".to_string())));
    }

    #[test]
    fn test_instantiate_named_arguments() {
        let list = LuaType::Named {
            name: "List".to_string(),
            args: vec![LuaType::named("T")],
        };
        let subs = substitution_for(&templates(&["T"]), &[LuaType::Integer]);
        assert_eq!(
            list.instantiate(&subs),
            LuaType::Named {
                name: "List".to_string(),
                args: vec![LuaType::Integer],
            }
        );
    }

    #[test]
    fn test_instantiate_signature_drops_bound_generics() {
        let mut sig = Signature::new(
            vec![SignatureParam::new("x", LuaType::TemplateRef("T".to_string()))],
            vec![LuaType::TemplateRef("T".to_string())],
        );
        sig.generics = templates(&["T"]);
        let subs = substitution_for(&templates(&["T"]), &[LuaType::Boolean]);
        let result = instantiate_signature(&sig, &subs);
        assert!(result.generics.is_empty());
        assert_eq!(result.returns, vec![LuaType::Boolean]);
    }

    #[test]
    fn test_missing_arguments_bind_unknown() {
        let subs = substitution_for(&templates(&["K", "V"]), &[LuaType::String]);
        assert_eq!(subs.get("V"), Some(&LuaType::Unknown));
    }

    #[test]
    fn test_bind_through_array_and_table() {
        let names = templates(&["K", "V"]);
        let param = LuaType::table(
            LuaType::TemplateRef("K".to_string()),
            LuaType::TemplateRef("V".to_string()),
        );
        let mut bindings = Substitution::default();
        bind_templates(&param, &LuaType::array(LuaType::String), &names, &mut bindings);
        assert_eq!(bindings.get("K"), Some(&LuaType::Integer));
        assert_eq!(bindings.get("V"), Some(&LuaType::String));
    }

    #[test]
    fn test_bind_widens_literals_and_strips_nil() {
        let names = templates(&["T"]);
        let param = LuaType::union(LuaType::TemplateRef("T".to_string()), LuaType::Nil);
        let arg = LuaType::union(LuaType::integer_literal(4), LuaType::Nil);
        let mut bindings = Substitution::default();
        bind_templates(&param, &arg, &names, &mut bindings);
        assert_eq!(bindings.get("T"), Some(&LuaType::Integer));
    }
}
