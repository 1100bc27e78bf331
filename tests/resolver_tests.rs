mod test_utils;

use luanext_analysis::{AnalysisOptions, LuaType};
use std::path::PathBuf;
use test_utils::AnalysisHarness;

#[test]
fn test_mutual_dependency_terminates() {
    let mut harness = AnalysisHarness::bare();
    let doc = harness.add("a.lua", "local a = b\nlocal b = a");

    let report = *harness.compilation.last_report();
    assert_eq!(report.items, 2);
    assert_eq!(report.forced, 2);
    assert!(!report.hit_round_cap);
    assert_eq!(harness.decl_type(doc, "a"), LuaType::Unknown);
    assert_eq!(harness.decl_type(doc, "b"), LuaType::Unknown);
}

#[test]
fn test_forced_round_cap() {
    let mut harness = AnalysisHarness::with_options(AnalysisOptions {
        load_builtins: false,
        max_forced_rounds: 1,
        ..Default::default()
    });
    harness.add("a.lua", "local a = x\nlocal b = y\nlocal c = z");

    let report = harness.compilation.last_report();
    assert!(report.hit_round_cap);
    assert_eq!(report.forced_rounds, 1);
    assert_eq!(report.forced, 3);
}

#[test]
fn test_forward_global_reference_resolves() {
    let mut harness = AnalysisHarness::bare();
    let doc = harness.add("a.lua", "local early = Config.port\nConfig = { port = 8080 }");
    assert_eq!(harness.decl_type(doc, "early"), LuaType::Integer);
    assert_eq!(harness.compilation.last_report().forced, 0);
}

#[test]
fn test_batch_order_does_not_matter() {
    for order in [[0usize, 1], [1, 0]] {
        let sources = [
            ("user.lua", "local port = Settings.port"),
            ("settings.lua", "Settings = { port = 80 }"),
        ];
        let mut harness = AnalysisHarness::bare();
        let batch: Vec<(PathBuf, String)> = order
            .iter()
            .map(|i| (PathBuf::from(sources[*i].0), sources[*i].1.to_string()))
            .collect();
        let ids = harness.compilation.add_documents(batch);
        let user = ids[order.iter().position(|i| *i == 0).unwrap()];
        assert_eq!(harness.decl_type(user, "port"), LuaType::Integer, "order {:?}", order);
    }
}

#[test]
fn test_methods_and_self() {
    let mut harness = AnalysisHarness::bare();
    let doc = harness.add(
        "a.lua",
        r#"
---@class Point
---@field x number
local Point = {}

function Point:getX()
    return self.x
end

function Point.new()
    return 1
end

local p = Point
local x = p:getX()
local n = Point.new()
"#,
    );
    assert_eq!(harness.decl_type(doc, "x"), LuaType::Number);
    assert_eq!(harness.decl_type(doc, "n"), LuaType::Integer);
    let entry = harness.compilation.index().find_type_info("Point").unwrap();
    assert_eq!(entry.member("getX").len(), 1);
    assert_eq!(entry.member("new").len(), 1);
}

#[test]
fn test_index_assignments_extend_tables() {
    let mut harness = AnalysisHarness::bare();
    let doc = harness.add(
        "a.lua",
        r#"
local M = {}
M.count = 0
function M.name()
    return "m"
end
local c = M.count
local s = M.name()
"#,
    );
    assert_eq!(harness.decl_type(doc, "c"), LuaType::Integer);
    assert_eq!(harness.decl_type(doc, "s"), LuaType::String);
}

#[test]
fn test_require_uses_module_export() {
    let mut harness = AnalysisHarness::bare();
    harness.add(
        "util.lua",
        "local M = {}\nfunction M.greet()\n    return 'hi'\nend\nreturn M",
    );
    let main = harness.add("main.lua", "local util = require('util')\nlocal s = util.greet()");
    assert_eq!(harness.decl_type(main, "s"), LuaType::String);

    let missing = harness.add("other.lua", "local m = require('nope')");
    assert_eq!(harness.decl_type(missing, "m"), LuaType::Unknown);
}

#[test]
fn test_callback_parameters_from_callee() {
    let mut harness = AnalysisHarness::bare();
    let doc = harness.add(
        "a.lua",
        r#"
---@param f fun(x: integer): integer
local function apply(f)
    return f(1)
end
local r = apply(function(v) return v end)
"#,
    );
    assert_eq!(harness.type_of(doc, "v"), LuaType::Integer);
    assert_eq!(harness.decl_type(doc, "r"), LuaType::Integer);
}

#[test]
fn test_generic_for_over_pairs_and_ipairs() {
    let mut harness = AnalysisHarness::new();
    let doc = harness.add(
        "a.lua",
        r#"
local t = { a = 1, b = 2 }
for k, v in pairs(t) do
    print(k, v)
end
local list = { "x", "y" }
for i, item in ipairs(list) do
    print(i, item)
end
"#,
    );
    assert_eq!(harness.decl_type(doc, "k"), LuaType::String);
    assert_eq!(harness.decl_type(doc, "v"), LuaType::Integer);
    assert_eq!(harness.decl_type(doc, "i"), LuaType::Integer);
    assert_eq!(harness.decl_type(doc, "item"), LuaType::String);
}

#[test]
fn test_enum_members() {
    let mut harness = AnalysisHarness::bare();
    let doc = harness.add(
        "a.lua",
        r#"
---@enum Color
local Color = { Red = 1, Green = 2 }
local c = Color.Red
"#,
    );
    assert_eq!(harness.decl_type(doc, "c"), LuaType::Integer);
    let entry = harness.compilation.index().find_type_info("Color").unwrap();
    assert_eq!(entry.members().len(), 2);
}

#[test]
fn test_update_document_reanalyzes() {
    let mut harness = AnalysisHarness::bare();
    let doc = harness.add("a.lua", "local v = 1");
    assert_eq!(harness.decl_type(doc, "v"), LuaType::Integer);

    harness.compilation.update_document(doc, "local v = 'text'").unwrap();
    assert_eq!(harness.decl_type(doc, "v"), LuaType::String);
}

#[test]
fn test_update_keeps_members_attached_elsewhere() {
    let mut harness = AnalysisHarness::bare();
    let point_source = "---@class Point\nPoint = {}\n";
    let point = harness.add("point.lua", point_source);
    let ext = harness.add(
        "ext.lua",
        "function Point.norm() return 1 end\nlocal n = Point.norm()\n",
    );
    assert_eq!(harness.type_of(ext, "Point.norm()"), LuaType::Integer);

    harness
        .compilation
        .update_document(point, &format!("{}\n", point_source))
        .unwrap();
    let entry = harness.compilation.index().find_type_info("Point").unwrap();
    assert_eq!(entry.member("norm").len(), 1);
    assert_eq!(harness.type_of(ext, "Point.norm()"), LuaType::Integer);

    harness.compilation.remove_document(ext).unwrap();
    harness
        .compilation
        .update_document(point, point_source)
        .unwrap();
    let entry = harness.compilation.index().find_type_info("Point").unwrap();
    assert!(entry.member("norm").is_empty());
}

fn global_chain(length: usize) -> String {
    let mut source = String::new();
    for i in 0..length {
        source.push_str(&format!("g{} = g{}\n", i, i + 1));
    }
    source.push_str(&format!("g{} = 1\n", length));
    source
}

#[test]
fn test_chain_longer_than_depth_guard_resolves() {
    let mut harness = AnalysisHarness::bare();
    let doc = harness.add("chain.lua", &global_chain(1000));

    let report = *harness.compilation.last_report();
    assert_eq!(report.forced, 0);
    assert!(report.passes > 1);
    assert_eq!(harness.decl_type(doc, "g0"), LuaType::Integer);
}

#[test]
fn test_configured_depth_is_clamped() {
    let mut harness = AnalysisHarness::with_options(AnalysisOptions {
        load_builtins: false,
        max_infer_depth: 100_000,
        ..Default::default()
    });
    let doc = harness.add("chain.lua", &global_chain(1000));
    assert_eq!(harness.decl_type(doc, "g0"), LuaType::Integer);
}
