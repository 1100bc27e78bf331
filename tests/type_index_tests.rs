mod test_utils;

use luanext_analysis::{LuaType, NamedKind};
use test_utils::AnalysisHarness;

const PART_A: &str = r#"
---@class (partial) Shape
---@field area number
local Shape = {}
"#;

const PART_B: &str = r#"
---@class (partial) Shape
---@field name string
local Shape = {}
"#;

#[test]
fn test_partial_type_merges_contributions() {
    let mut harness = AnalysisHarness::bare();
    harness.add("a.lua", PART_A);
    harness.add("b.lua", PART_B);

    let entry = harness.compilation.index().find_type_info("Shape").unwrap();
    assert!(entry.is_partial());
    assert_eq!(entry.contributors().count(), 2);
    assert_eq!(entry.member("area").len(), 1);
    assert_eq!(entry.member("name").len(), 1);
}

#[test]
fn test_removing_a_contributor_keeps_the_rest() {
    let mut harness = AnalysisHarness::bare();
    let a = harness.add("a.lua", PART_A);
    let b = harness.add("b.lua", PART_B);

    harness.compilation.remove_document(a).unwrap();
    let entry = harness.compilation.index().find_type_info("Shape").unwrap();
    assert!(entry.member("area").is_empty());
    assert_eq!(entry.member("name").len(), 1);
    assert_eq!(entry.contributors().collect::<Vec<_>>(), vec![b]);

    harness.compilation.remove_document(b).unwrap();
    assert!(harness.compilation.index().find_type_info("Shape").is_none());
}

#[test]
fn test_subtypes_pruned_with_their_document() {
    let mut harness = AnalysisHarness::bare();
    harness.add("base.lua", "---@class Base\nlocal Base = {}");
    let derived = harness.add("derived.lua", "---@class Derived : Base\nlocal Derived = {}");

    let index = harness.compilation.index();
    assert_eq!(index.subtypes("Base").collect::<Vec<_>>(), vec!["Derived"]);
    assert_eq!(
        index.find_type_info("Derived").unwrap().supers()[0].ty,
        LuaType::named("Base")
    );

    harness.compilation.remove_document(derived).unwrap();
    assert_eq!(harness.compilation.index().subtypes("Base").count(), 0);
}

#[test]
fn test_members_assigned_elsewhere_leave_with_their_document() {
    let mut harness = AnalysisHarness::bare();
    harness.add("point.lua", "---@class Point\nPoint = {}");
    let ext = harness.add("ext.lua", "function Point.norm()\n    return 1\nend");

    let entry = harness.compilation.index().find_type_info("Point").unwrap();
    assert_eq!(entry.member("norm").len(), 1);

    harness.compilation.remove_document(ext).unwrap();
    let entry = harness.compilation.index().find_type_info("Point").unwrap();
    assert!(entry.member("norm").is_empty());
}

#[test]
fn test_alias_and_enum_entries() {
    let mut harness = AnalysisHarness::bare();
    harness.add(
        "a.lua",
        "---@alias Handler fun(x: integer): boolean\n\n---@enum Mode : string\nlocal Mode = { Fast = 'fast' }",
    );
    let index = harness.compilation.index();

    let alias = index.find_type_info("Handler").unwrap();
    assert_eq!(alias.kind, NamedKind::Alias);
    assert!(matches!(alias.alias_origin(), Some(LuaType::Signature(_))));

    let mode = index.find_type_info("Mode").unwrap();
    assert_eq!(mode.kind, NamedKind::Enum);
    assert_eq!(mode.enum_base(), Some(&LuaType::String));
}

#[test]
fn test_globals_and_exports_are_pruned() {
    let mut harness = AnalysisHarness::bare();
    let doc = harness.add("lib.lua", "shared = 1\nreturn { version = 2 }");
    assert_eq!(harness.compilation.index().globals("shared").len(), 1);
    assert!(harness.compilation.index().export_type(doc).is_some());

    harness.compilation.remove_document(doc).unwrap();
    assert!(harness.compilation.index().globals("shared").is_empty());
    assert!(harness.compilation.index().export_type(doc).is_none());
}
