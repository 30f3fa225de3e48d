//! Edit session example
//!
//! Types a small template keystroke by keystroke, then prints partitions, completions and
//! the reconciled structure.

use ftl_editor_core::{EditorConfig, TemplateEditor};
use std::time::Duration;

fn main() {
    let config = EditorConfig::default().with_reconcile_delay(Duration::from_millis(50));
    let mut editor = TemplateEditor::with_config("", config);
    editor.subscribe(|event| {
        println!(
            "reconciled v{}: {} macro(s), {} diagnostic(s)",
            event.version,
            event.structure.macros.len(),
            event.structure.diagnostics.len()
        );
    });

    // Closers are inserted and skipped by the auto-edit strategies, so this is what a user
    // would actually type.
    let keystrokes = "<#macro greet name>\nHello ${name}!\n</#macro>\n<@gr";
    let mut caret = 0;
    for c in keystrokes.chars() {
        caret = match editor.type_text(caret, 0, &c.to_string()) {
            Ok(caret) => caret,
            Err(err) => {
                eprintln!("edit rejected: {err}");
                return;
            }
        };
    }
    println!("text:\n{}\n", editor.text());

    println!("partitions:");
    for partition in editor.partitions().iter() {
        println!(
            "  {:<22} {:>3}..{:<3} depth {}",
            partition.partition_type.to_string(),
            partition.start,
            partition.end,
            partition.nesting_depth
        );
    }

    let list = editor.completions_at(caret);
    println!("\ncompletions at {caret} ({:?}): {:?}", list.context, list.labels());

    std::thread::sleep(Duration::from_millis(200));
    let structure = editor.structure();
    for definition in &structure.macros {
        println!("macro {}({})", definition.name, definition.parameters.join(", "));
    }
}
