use super::{LiteralValue, LuaType, Signature};
use rustc_hash::FxHashSet;

/// Access to declared supertypes, implemented by the type index
pub trait TypeHierarchy {
    /// Names of the direct supertypes of `name`
    fn super_names(&self, name: &str) -> Vec<String>;

    /// Origin of an alias, if `name` is one
    fn alias_origin(&self, _name: &str) -> Option<LuaType> {
        None
    }
}

/// A hierarchy without any declared types
pub struct NoHierarchy;

impl TypeHierarchy for NoHierarchy {
    fn super_names(&self, _name: &str) -> Vec<String> {
        Vec::new()
    }
}

/// Type compatibility checker used by overload selection
pub struct TypeCompatibility;

impl TypeCompatibility {
    /// Check if `source` is assignable to `target`
    pub fn is_assignable(source: &LuaType, target: &LuaType, hierarchy: &dyn TypeHierarchy) -> bool {
        let mut visited: FxHashSet<(String, String)> = FxHashSet::default();
        Self::is_assignable_recursive(source, target, hierarchy, &mut visited)
    }

    fn is_assignable_recursive(
        source: &LuaType,
        target: &LuaType,
        hierarchy: &dyn TypeHierarchy,
        visited: &mut FxHashSet<(String, String)>,
    ) -> bool {
        // Unknown and any are compatible both ways
        if matches!(source, LuaType::Unknown | LuaType::Any)
            || matches!(target, LuaType::Unknown | LuaType::Any)
        {
            return true;
        }

        match (source, target) {
            (LuaType::MultiReturn(_), _) => {
                Self::is_assignable_recursive(&source.first_value(), target, hierarchy, visited)
            }

            (LuaType::Literal(s), LuaType::Literal(t)) => s == t,
            (LuaType::Literal(lit), _) => {
                Self::is_literal_assignable(lit, target)
                    || matches!(target, LuaType::Union(_) | LuaType::Named { .. })
                        && Self::is_assignable_recursive(&source.widen(), target, hierarchy, visited)
            }

            // Union source: every member must fit
            (LuaType::Union(sources), _) => sources
                .iter()
                .all(|s| Self::is_assignable_recursive(s, target, hierarchy, visited)),
            // Union target: some member must accept
            (_, LuaType::Union(targets)) => targets
                .iter()
                .any(|t| Self::is_assignable_recursive(source, t, hierarchy, visited)),

            (LuaType::Integer, LuaType::Number) => true,

            (LuaType::Named { name: s, args: s_args }, LuaType::Named { name: t, args: t_args }) => {
                if s == t {
                    return s_args.len() != t_args.len()
                        || s_args.iter().zip(t_args).all(|(a, b)| {
                            Self::is_assignable_recursive(a, b, hierarchy, visited)
                        });
                }
                Self::is_subtype(s, t, hierarchy, visited)
            }
            (LuaType::Named { name, .. }, _) => match hierarchy.alias_origin(name) {
                Some(origin) => {
                    let key = (name.clone(), String::from("<alias>"));
                    if !visited.insert(key.clone()) {
                        return false;
                    }
                    let ok = Self::is_assignable_recursive(&origin, target, hierarchy, visited);
                    visited.remove(&key);
                    ok
                }
                // classes are tables
                None => matches!(target, LuaType::Table { .. }),
            },
            (_, LuaType::Named { name, .. }) => match hierarchy.alias_origin(name) {
                Some(origin) => {
                    let key = (String::from("<alias>"), name.clone());
                    if !visited.insert(key.clone()) {
                        return false;
                    }
                    let ok = Self::is_assignable_recursive(source, &origin, hierarchy, visited);
                    visited.remove(&key);
                    ok
                }
                // structural table shapes may satisfy a class
                None => matches!(source, LuaType::TableLiteral(_)),
            },

            (LuaType::Array(s_elem), LuaType::Array(t_elem)) => {
                Self::is_assignable_recursive(s_elem, t_elem, hierarchy, visited)
            }
            (LuaType::Array(s_elem), LuaType::Table { key, value }) => {
                Self::is_assignable_recursive(&LuaType::Integer, key, hierarchy, visited)
                    && Self::is_assignable_recursive(s_elem, value, hierarchy, visited)
            }
            (LuaType::Tuple(s_items), LuaType::Tuple(t_items)) => {
                s_items.len() == t_items.len()
                    && s_items
                        .iter()
                        .zip(t_items)
                        .all(|(s, t)| Self::is_assignable_recursive(s, t, hierarchy, visited))
            }
            (LuaType::Tuple(s_items), LuaType::Array(t_elem)) => s_items
                .iter()
                .all(|s| Self::is_assignable_recursive(s, t_elem, hierarchy, visited)),
            (LuaType::Table { key: sk, value: sv }, LuaType::Table { key: tk, value: tv }) => {
                Self::is_assignable_recursive(sk, tk, hierarchy, visited)
                    && Self::is_assignable_recursive(sv, tv, hierarchy, visited)
            }
            (LuaType::TableLiteral(_), LuaType::Table { .. } | LuaType::Array(_) | LuaType::TableLiteral(_)) => {
                true
            }

            (LuaType::Signature(s_sig), LuaType::Signature(t_sig)) => {
                Self::is_signature_assignable(s_sig, t_sig, hierarchy, visited)
            }

            (LuaType::TemplateRef(_), _) | (_, LuaType::TemplateRef(_)) => true,

            _ => source == target,
        }
    }

    fn is_literal_assignable(lit: &LiteralValue, target: &LuaType) -> bool {
        matches!(
            (lit, target),
            (LiteralValue::Integer(_), LuaType::Integer | LuaType::Number)
                | (LiteralValue::Float(_), LuaType::Number)
                | (LiteralValue::String(_), LuaType::String)
                | (LiteralValue::Boolean(_), LuaType::Boolean)
        )
    }

    fn is_subtype(
        source: &str,
        target: &str,
        hierarchy: &dyn TypeHierarchy,
        visited: &mut FxHashSet<(String, String)>,
    ) -> bool {
        // pairs on the current path only; siblings may share ancestors
        let key = (source.to_string(), target.to_string());
        if !visited.insert(key.clone()) {
            return false;
        }
        let found = hierarchy
            .super_names(source)
            .iter()
            .any(|parent| parent == target || Self::is_subtype(parent, target, hierarchy, visited));
        visited.remove(&key);
        found
    }

    /// Parameters are checked contravariantly, returns covariantly
    fn is_signature_assignable(
        source: &Signature,
        target: &Signature,
        hierarchy: &dyn TypeHierarchy,
        visited: &mut FxHashSet<(String, String)>,
    ) -> bool {
        if source.required_params() > target.params.len() && target.variadic.is_none() {
            return false;
        }
        let params_ok = source
            .params
            .iter()
            .zip(&target.params)
            .all(|(s, t)| Self::is_assignable_recursive(&t.ty, &s.ty, hierarchy, visited));
        let returns_ok = source
            .returns
            .iter()
            .zip(&target.returns)
            .all(|(s, t)| Self::is_assignable_recursive(s, t, hierarchy, visited));
        params_ok && returns_ok
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::SignatureParam;

    struct Hierarchy;

    impl TypeHierarchy for Hierarchy {
        fn super_names(&self, name: &str) -> Vec<String> {
            match name {
                "Dog" | "Cat" => vec!["Animal".to_string()],
                "Animal" => vec!["Object".to_string()],
                // cyclic declaration
                "A" => vec!["B".to_string()],
                "B" => vec!["A".to_string()],
                _ => vec![],
            }
        }

        fn alias_origin(&self, name: &str) -> Option<LuaType> {
            match name {
                "Id" => Some(LuaType::union(LuaType::String, LuaType::Integer)),
                "Ping" => Some(LuaType::named("Pong")),
                "Pong" => Some(LuaType::named("Ping")),
                _ => None,
            }
        }
    }

    fn assignable(source: &LuaType, target: &LuaType) -> bool {
        TypeCompatibility::is_assignable(source, target, &Hierarchy)
    }

    #[test]
    fn test_primitives_and_literals() {
        assert!(assignable(&LuaType::Integer, &LuaType::Number));
        assert!(!assignable(&LuaType::Number, &LuaType::Integer));
        assert!(assignable(&LuaType::integer_literal(1), &LuaType::Integer));
        assert!(assignable(&LuaType::string_literal("a"), &LuaType::String));
        assert!(!assignable(&LuaType::string_literal("a"), &LuaType::Number));
        assert!(assignable(&LuaType::Unknown, &LuaType::String));
        assert!(assignable(&LuaType::Boolean, &LuaType::Any));
    }

    #[test]
    fn test_unions() {
        let target = LuaType::union(LuaType::String, LuaType::Nil);
        assert!(assignable(&LuaType::Nil, &target));
        assert!(assignable(&LuaType::string_literal("x"), &target));
        assert!(!assignable(&LuaType::Integer, &target));
        let source = LuaType::union(LuaType::Integer, LuaType::String);
        assert!(!assignable(&source, &LuaType::String));
    }

    #[test]
    fn test_named_subtypes() {
        assert!(assignable(&LuaType::named("Dog"), &LuaType::named("Object")));
        assert!(!assignable(&LuaType::named("Animal"), &LuaType::named("Dog")));
        assert!(!assignable(&LuaType::named("A"), &LuaType::named("C")));
    }

    #[test]
    fn test_alias_expands() {
        assert!(assignable(&LuaType::Integer, &LuaType::named("Id")));
        assert!(!assignable(&LuaType::Boolean, &LuaType::named("Id")));
    }

    #[test]
    fn test_alias_cycle_terminates() {
        assert!(!assignable(&LuaType::Integer, &LuaType::named("Ping")));
        assert!(!assignable(&LuaType::named("Pong"), &LuaType::String));
    }

    #[test]
    fn test_union_of_siblings_reaches_shared_ancestor() {
        let pets = LuaType::union(LuaType::named("Dog"), LuaType::named("Cat"));
        assert!(assignable(&pets, &LuaType::named("Object")));
        assert!(assignable(&pets, &LuaType::named("Animal")));
    }

    #[test]
    fn test_signatures() {
        let takes_number = LuaType::signature(Signature::new(
            vec![SignatureParam::new("x", LuaType::Number)],
            vec![LuaType::Integer],
        ));
        let takes_integer = LuaType::signature(Signature::new(
            vec![SignatureParam::new("x", LuaType::Integer)],
            vec![LuaType::Number],
        ));
        assert!(assignable(&takes_number, &takes_integer));
        assert!(!assignable(&takes_integer, &takes_number));
    }
}
