mod test_utils;

use luanext_analysis::{DeclKind, LuaType};
use test_utils::AnalysisHarness;

#[test]
fn test_local_is_not_visible_in_its_own_initializer() {
    let mut harness = AnalysisHarness::bare();
    let doc = harness.add("a.lua", "local x = 1\nlocal x = x");

    let reference = harness.expr(doc, "x");
    let ctx = harness.context();
    let decl = ctx.find_declaration(reference).expect("x should resolve");
    let declaration = harness.compilation.decl(decl).unwrap();
    assert_eq!(declaration.position, 6);
    assert_eq!(harness.decl_type(doc, "x"), LuaType::Integer);
}

#[test]
fn test_shadowing_in_nested_block() {
    let mut harness = AnalysisHarness::bare();
    let doc = harness.add(
        "a.lua",
        r#"
local v = "outer"
do
    local v = 1
    local inner = v
end
local outer = v
"#,
    );
    assert_eq!(harness.decl_type(doc, "inner"), LuaType::Integer);
    assert_eq!(harness.decl_type(doc, "outer"), LuaType::String);
}

#[test]
fn test_numeric_for_variable() {
    let mut harness = AnalysisHarness::bare();
    let doc = harness.add("a.lua", "for i = 1, 10 do\n    local y = i\nend");
    assert_eq!(harness.decl_type(doc, "i"), LuaType::Integer);
    assert_eq!(harness.decl_type(doc, "y"), LuaType::Integer);
}

#[test]
fn test_for_range_generators_do_not_see_loop_variables() {
    let mut harness = AnalysisHarness::bare();
    let doc = harness.add(
        "a.lua",
        "local k = {}\nfor k in next, k do\nend",
    );
    // `k` in the generator list is the outer table, not the loop variable
    let generator = harness.expr(doc, "k");
    let decl = harness.context().find_declaration(generator).unwrap();
    let declaration = harness.compilation.decl(decl).unwrap();
    assert_eq!(declaration.position, 6);
}

#[test]
fn test_repeat_condition_sees_body_locals() {
    let mut harness = AnalysisHarness::bare();
    let doc = harness.add("a.lua", "repeat\n    local done = true\nuntil done");
    let condition = harness.expr(doc, "done");
    let decl = harness.context().find_declaration(condition);
    assert!(decl.is_some());
}

#[test]
fn test_unknown_name_falls_back_to_globals() {
    let mut harness = AnalysisHarness::bare();
    let doc = harness.add("a.lua", "counter = 0\nlocal c = counter\nlocal m = missing");
    assert_eq!(harness.decl_type(doc, "c"), LuaType::Integer);
    assert_eq!(harness.decl_type(doc, "m"), LuaType::Unknown);

    let global = harness.decl(doc, "counter");
    let kind = harness.compilation.decl(global).unwrap().kind;
    assert_eq!(kind, DeclKind::Global);
}

#[test]
fn test_function_parameters_are_scoped_to_body() {
    let mut harness = AnalysisHarness::bare();
    let doc = harness.add(
        "a.lua",
        r#"
---@param n integer
local function double(n)
    return n * 2
end
local after = n
"#,
    );
    assert_eq!(harness.type_of(doc, "n * 2"), LuaType::Integer);
    assert_eq!(harness.decl_type(doc, "after"), LuaType::Unknown);
}
