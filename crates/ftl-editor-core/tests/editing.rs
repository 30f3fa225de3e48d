use ftl_editor_core::{
    AutoEditStrategy, CompletionContext, DocumentEdit, EditorConfig, HyperlinkTarget, PassOutcome,
    PartitionType, ReconcileEvent, TemplateEditor,
};
use parking_lot::Mutex;
use pretty_assertions::assert_eq;
use std::fs;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

fn quiet(text: &str) -> TemplateEditor {
    TemplateEditor::with_config(
        text,
        EditorConfig::default().with_reconcile_delay(Duration::from_secs(3600)),
    )
}

/// Render the text with `|` at `caret`.
fn with_caret(editor: &TemplateEditor, caret: usize) -> String {
    let mut text = editor.text().clone();
    text.insert(caret, "|");
    text.to_string()
}

fn wait_for(mut done: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + Duration::from_secs(5);
    while Instant::now() < deadline {
        if done() {
            return true;
        }
        thread::sleep(Duration::from_millis(10));
    }
    done()
}

#[test]
fn test_tag_closer_and_double_closing_prevention() {
    let mut editor = quiet("Hi ");
    let mut caret = 3;
    caret = editor.type_text(caret, 0, "<").unwrap();
    caret = editor.type_text(caret, 0, "#").unwrap();
    assert_eq!(with_caret(&editor, caret), "Hi <#|>");

    caret = editor.type_text(caret, 0, ">").unwrap();
    assert_eq!(with_caret(&editor, caret), "Hi <#>|");
}

#[test]
fn test_typing_a_directive_with_closers() {
    let mut editor = quiet("");
    let mut caret = 0;
    for typed in ["<", "#", "i", "f", " ", "x", ">", "$", "{", "x", "}"] {
        caret = editor.type_text(caret, 0, typed).unwrap();
    }
    assert_eq!(with_caret(&editor, caret), "<#if x>${x}|");
    assert_eq!(
        editor.partitions().iter().map(|p| p.partition_type).collect::<Vec<_>>(),
        vec![PartitionType::DirectiveStart, PartitionType::DollarInterpolation]
    );
}

#[test]
fn test_comment_closer_replaces_tag_closer() {
    let mut editor = quiet("");
    let mut caret = 0;
    for typed in ["<", "#", "-", "-"] {
        caret = editor.type_text(caret, 0, typed).unwrap();
    }
    assert_eq!(with_caret(&editor, caret), "<#-- | -->");
    assert_eq!(editor.partitions()[0].partition_type, PartitionType::Comment);
}

#[test]
fn test_newline_keeps_indentation() {
    let mut editor = quiet("<#list xs as x>\n    ${x}");
    let end = editor.text().len_chars();
    let caret = editor.type_text(end, 0, "\n").unwrap();
    assert_eq!(with_caret(&editor, caret), "<#list xs as x>\n    ${x}\n    |");
}

#[test]
fn test_strategy_order_per_partition_type() {
    let editor = quiet("");
    assert_eq!(
        editor.auto_edit_strategies_for(PartitionType::DollarInterpolation),
        &[
            AutoEditStrategy::InterpolationDoubleClosingPrevention,
            AutoEditStrategy::AutoIndent
        ]
    );
    assert_eq!(
        editor.auto_edit_strategies_for(PartitionType::DirectiveStart)[0],
        AutoEditStrategy::TagDoubleClosingPrevention
    );
}

#[test]
fn test_include_without_file_has_no_link() {
    let dir = tempfile::tempdir().unwrap();
    let editor = quiet("<#include \"a.ftl\">").with_template_path(dir.path().join("main.ftl"));
    for offset in 0..=editor.text().len_chars() {
        assert_eq!(editor.detect_hyperlink(offset), None, "offset {offset}");
    }
}

#[test]
fn test_include_and_imported_macro_links() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("lib.ftl"), "<#macro card></#macro>").unwrap();
    let text = "<#import \"lib.ftl\" as lib>\n<@lib.card/>";
    let editor = quiet(text).with_template_path(dir.path().join("main.ftl"));

    let link = editor.detect_hyperlink(12).unwrap();
    assert_eq!(link.target, HyperlinkTarget::File(dir.path().join("lib.ftl")));

    let link = editor.detect_hyperlink(30).unwrap();
    assert_eq!(link.target_range, 29..37);
    assert_eq!(
        link.target,
        HyperlinkTarget::MacroInFile {
            path: dir.path().join("lib.ftl"),
            name: "card".to_string()
        }
    );
}

#[test]
fn test_end_tag_completion_offers_innermost_block_first() {
    let mut editor = quiet("<#list xs as x><#if x>");
    editor.apply_edit(DocumentEdit::insert(22, "</#")).unwrap();
    let list = editor.completions_at(25);
    assert_eq!(list.context, CompletionContext::EndTagName { sigil: Some('#') });
    assert_eq!(list.labels(), vec!["if", "list"]);
}

#[test]
fn test_reconciling_twice_is_idempotent() {
    let editor = quiet("<#macro a x y></#macro><#list xs as x>${x}</#list><#include \"b.ftl\">");
    assert_eq!(editor.reconcile_now(), PassOutcome::Published);
    let first = editor.structure();
    assert_eq!(editor.reconcile_now(), PassOutcome::Published);
    assert_eq!(*editor.structure(), *first);
}

#[test]
fn test_burst_of_edits_reconciles_once() {
    let config = EditorConfig::default().with_reconcile_delay(Duration::from_millis(200));
    let mut editor = TemplateEditor::with_config("", config);
    let versions = Arc::new(Mutex::new(Vec::new()));
    let seen = Arc::clone(&versions);
    editor.subscribe(move |event: &ReconcileEvent| seen.lock().push(event.version));

    for (offset, c) in "<#macro greet name>".chars().enumerate() {
        editor
            .apply_edit(DocumentEdit::insert(offset, c.to_string()))
            .unwrap();
    }
    let last_version = editor.version();

    assert!(wait_for(|| editor.reconciler_stats().published == 2));
    thread::sleep(Duration::from_millis(400));

    let stats = editor.reconciler_stats();
    assert_eq!((stats.passes, stats.published), (2, 2));
    assert_eq!(*versions.lock(), vec![last_version]);
    assert_eq!(editor.structure().macros[0].name, "greet");
}
