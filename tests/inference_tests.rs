mod test_utils;

use luanext_analysis::{AnalysisOptions, LuaType};
use test_utils::AnalysisHarness;

#[test]
fn test_literals_widen_when_stored() {
    let mut harness = AnalysisHarness::bare();
    let doc = harness.add(
        "a.lua",
        "local i = 1\nlocal f = 1.5\nlocal s = 'x'\nlocal b = true\nlocal n = nil",
    );
    assert_eq!(harness.decl_type(doc, "i"), LuaType::Integer);
    assert_eq!(harness.decl_type(doc, "f"), LuaType::Number);
    assert_eq!(harness.decl_type(doc, "s"), LuaType::String);
    assert_eq!(harness.decl_type(doc, "b"), LuaType::Boolean);
    assert_eq!(harness.decl_type(doc, "n"), LuaType::Nil);
    assert_eq!(harness.type_of(doc, "1"), LuaType::integer_literal(1));
}

#[test]
fn test_repeated_inference_hits_the_cache() {
    let mut harness = AnalysisHarness::bare();
    let doc = harness.add("a.lua", "local t = { x = 1 }\nlocal y = t.x + 2");
    let expr = harness.expr(doc, "t.x + 2");

    let mut ctx = harness.context();
    let first = ctx.infer(expr);
    let misses = ctx.stats().cache_misses;
    let second = ctx.infer(expr);

    assert_eq!(first, LuaType::Integer);
    assert_eq!(first, second);
    assert!(ctx.is_cached(expr));
    assert_eq!(ctx.stats().cache_misses, misses);
    assert!(ctx.stats().cache_hits >= 1);
}

#[test]
fn test_union_members_are_a_set() {
    let a = LuaType::union(LuaType::Integer, LuaType::String);
    let b = LuaType::union(LuaType::String, LuaType::Integer);
    assert_eq!(a, b);
    assert_eq!(LuaType::union(a.clone(), LuaType::Integer), a);
    assert_eq!(LuaType::union(LuaType::Nil, LuaType::Nil), LuaType::Nil);
}

#[test]
fn test_logical_operators() {
    let mut harness = AnalysisHarness::bare();
    let doc = harness.add(
        "a.lua",
        r#"
---@type string?
local maybe
local fallback = maybe or 0
local both = maybe and 1
local flag = 1 < 2
"#,
    );
    assert_eq!(
        harness.decl_type(doc, "fallback"),
        LuaType::union(LuaType::String, LuaType::Integer)
    );
    assert_eq!(harness.decl_type(doc, "both"), LuaType::Integer);
    assert_eq!(harness.decl_type(doc, "flag"), LuaType::Boolean);
}

#[test]
fn test_arithmetic_rules() {
    let mut harness = AnalysisHarness::bare();
    let doc = harness.add(
        "a.lua",
        "local a = 1 + 2\nlocal b = 1 + 2.5\nlocal c = 4 / 2\nlocal d = 'a' .. 1\nlocal e = #'abc'\nlocal g = -3",
    );
    assert_eq!(harness.decl_type(doc, "a"), LuaType::Integer);
    assert_eq!(harness.decl_type(doc, "b"), LuaType::Number);
    assert_eq!(harness.decl_type(doc, "c"), LuaType::Number);
    assert_eq!(harness.decl_type(doc, "d"), LuaType::String);
    assert_eq!(harness.decl_type(doc, "e"), LuaType::Integer);
    assert_eq!(harness.type_of(doc, "-3"), LuaType::integer_literal(-3));
}

#[test]
fn test_table_shapes() {
    let mut harness = AnalysisHarness::bare();
    let doc = harness.add(
        "a.lua",
        r#"
local t = { x = 1, y = "s" }
local arr = { 1, 2, 3 }
local map = { [1] = "a", [2] = "b" }
local a = t.x
local b = arr[1]
local c = map[5]
"#,
    );
    assert_eq!(harness.decl_type(doc, "a"), LuaType::Integer);
    assert_eq!(harness.decl_type(doc, "b"), LuaType::Integer);
    assert_eq!(harness.decl_type(doc, "c"), LuaType::String);
    assert_eq!(
        harness.decl_type(doc, "arr"),
        LuaType::array(LuaType::Integer)
    );
}

#[test]
fn test_missing_member_has_no_declaration() {
    let mut harness = AnalysisHarness::bare();
    let doc = harness.add("a.lua", "local t = { x = 1 }\nprint(t.x, t.z)");

    let mut ctx = harness.context();
    let present = ctx.find_member_declaration(harness.expr(doc, "t.x"));
    let missing = ctx.find_member_declaration(harness.expr(doc, "t.z"));

    let present = present.expect("t.x should have a declaration");
    assert_eq!(harness.compilation.decl(present).unwrap().name, "x");
    assert!(missing.is_none());
    assert_eq!(ctx.infer(harness.expr(doc, "t.z")), LuaType::Unknown);
}

#[test]
fn test_depth_limit_degrades_to_unknown() {
    let mut harness = AnalysisHarness::with_options(AnalysisOptions {
        load_builtins: false,
        max_infer_depth: 4,
        ..Default::default()
    });
    let doc = harness.add("a.lua", "local x = ((((((((1))))))))");
    let expr = harness.expr(doc, "((((((((1))))))))");

    let mut ctx = harness.context();
    assert_eq!(ctx.infer(expr), LuaType::Unknown);
    assert!(ctx.stats().depth_limit_hits > 0);
}

#[test]
fn test_multiple_returns_and_assignment() {
    let mut harness = AnalysisHarness::bare();
    let doc = harness.add(
        "a.lua",
        r#"
local function pair()
    return 1, "two"
end
local a, b, c = pair()
local t = { pair() }
"#,
    );
    assert_eq!(harness.decl_type(doc, "a"), LuaType::Integer);
    assert_eq!(harness.decl_type(doc, "b"), LuaType::String);
    assert_eq!(harness.decl_type(doc, "c"), LuaType::Nil);
}

#[test]
fn test_returns_union_over_branches() {
    let mut harness = AnalysisHarness::bare();
    let doc = harness.add(
        "a.lua",
        r#"
local function pick(flag)
    if flag then
        return 1
    end
    return "none"
end
local function maybe(flag)
    if flag then
        return 1
    end
end
local p = pick(true)
local m = maybe(true)
"#,
    );
    assert_eq!(
        harness.decl_type(doc, "p"),
        LuaType::union(LuaType::Integer, LuaType::String)
    );
    assert_eq!(
        harness.decl_type(doc, "m"),
        LuaType::union(LuaType::Integer, LuaType::Nil)
    );
}

#[test]
fn test_generic_call_binds_template() {
    let mut harness = AnalysisHarness::bare();
    let doc = harness.add(
        "a.lua",
        r#"
---@generic T
---@param x T
---@return T
local function id(x)
    return x
end
local s = id("a")
local n = id(3)
"#,
    );
    assert_eq!(harness.decl_type(doc, "s"), LuaType::String);
    assert_eq!(harness.decl_type(doc, "n"), LuaType::Integer);
}

#[test]
fn test_overload_selected_by_argument_type() {
    let mut harness = AnalysisHarness::bare();
    let doc = harness.add(
        "a.lua",
        r#"
---@param x integer
---@return integer
---@overload fun(x: string): string
local function conv(x)
    return x
end
local a = conv(1)
local b = conv("s")
"#,
    );
    assert_eq!(harness.decl_type(doc, "a"), LuaType::Integer);
    assert_eq!(harness.decl_type(doc, "b"), LuaType::String);
}

#[test]
fn test_class_members_and_supers() {
    let mut harness = AnalysisHarness::bare();
    let doc = harness.add(
        "a.lua",
        r#"
---@class Animal
---@field name string
local Animal = {}

---@class Dog : Animal
---@field breed string
local Dog = {}

---@type Dog
local d
local name = d.name
local breed = d.breed
"#,
    );
    assert_eq!(harness.decl_type(doc, "name"), LuaType::String);
    assert_eq!(harness.decl_type(doc, "breed"), LuaType::String);
}

#[test]
fn test_generic_class_member_is_instantiated() {
    let mut harness = AnalysisHarness::bare();
    let doc = harness.add(
        "a.lua",
        r#"
---@class Box<T>
---@field value T
local Box = {}

---@type Box<integer>
local b
local v = b.value
"#,
    );
    assert_eq!(harness.decl_type(doc, "v"), LuaType::Integer);
}

#[test]
fn test_union_members_instantiate_their_own_supers() {
    let mut harness = AnalysisHarness::bare();
    let doc = harness.add(
        "a.lua",
        r#"
---@class Base<T>
---@field value T
local Base = {}

---@class B : Base<integer>
local B = {}

---@class C : Base<string>
local C = {}

---@type B | C
local x
local v = x.value
"#,
    );
    assert_eq!(
        harness.type_of(doc, "x.value"),
        LuaType::union(LuaType::Integer, LuaType::String)
    );
}

#[test]
fn test_self_referential_field_chain() {
    let mut harness = AnalysisHarness::bare();
    let doc = harness.add(
        "a.lua",
        r#"
---@class Node
---@field next Node
local Node = {}

---@type Node
local a
local tail = a.next.next.next
"#,
    );
    assert_eq!(harness.type_of(doc, "a.next.next.next"), LuaType::named("Node"));
}

#[test]
fn test_alias_cycle_member_is_unknown() {
    let mut harness = AnalysisHarness::bare();
    let doc = harness.add(
        "a.lua",
        r#"
---@alias Ping Pong
---@alias Pong Ping

---@type Ping
local p
local m = p.field
"#,
    );
    assert_eq!(harness.type_of(doc, "p.field"), LuaType::Unknown);
}

#[test]
fn test_super_cycle_member_is_unknown() {
    let mut harness = AnalysisHarness::bare();
    let doc = harness.add(
        "a.lua",
        r#"
---@class Left : Right
local Left = {}

---@class Right : Left
local Right = {}

---@type Left
local x
local m = x.missing
"#,
    );
    assert_eq!(harness.type_of(doc, "x.missing"), LuaType::Unknown);
}

#[test]
fn test_alias_renders_its_origin() {
    let mut harness = AnalysisHarness::bare();
    let doc = harness.add(
        "a.lua",
        "---@alias Id integer | string\n\n---@type Id\nlocal id",
    );
    let ty = harness.decl_type(doc, "id");
    assert_eq!(ty, LuaType::named("Id"));
    assert_eq!(harness.render(&ty), "integer | string");
}

#[test]
fn test_operator_overload() {
    let mut harness = AnalysisHarness::bare();
    let doc = harness.add(
        "a.lua",
        r#"
---@class Vec
---@operator add(Vec): Vec
---@operator unm: Vec
local Vec = {}

---@type Vec
local v
local sum = v + v
local neg = -v
"#,
    );
    assert_eq!(harness.decl_type(doc, "sum"), LuaType::named("Vec"));
    assert_eq!(harness.decl_type(doc, "neg"), LuaType::named("Vec"));
}

#[test]
fn test_builtin_string_methods() {
    let mut harness = AnalysisHarness::new();
    let doc = harness.add(
        "a.lua",
        r#"
local s = "abc"
local upper = s:upper()
local len = string.len(s)
local formatted = string.format("%d", 1)
"#,
    );
    assert_eq!(harness.decl_type(doc, "upper"), LuaType::String);
    assert_eq!(harness.decl_type(doc, "len"), LuaType::Integer);
    assert_eq!(harness.decl_type(doc, "formatted"), LuaType::String);
}
