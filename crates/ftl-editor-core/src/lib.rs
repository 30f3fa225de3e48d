#![warn(missing_docs)]
//! FTL Editor Core - Headless FreeMarker Template Editing Kernel
//!
//! # Overview
//!
//! `ftl-editor-core` keeps a FreeMarker template partitioned, colored and understood while it is
//! being edited. It owns no UI: hosts feed it edit notifications and keystrokes, and query it
//! for partitions, style intervals, completion proposals, hyperlinks and auto-edit decisions.
//!
//! # Core Features
//!
//! - **Partitioning**: the text is tiled into text, directive, macro-call, interpolation and
//!   comment partitions, repaired incrementally after each edit
//! - **Coloring**: per-partition lexing into style intervals, restyled only where damaged
//! - **Reconciliation**: macro, include and binding structure derived on a background thread
//!   once typing pauses, with stale results dropped
//! - **Content Assist**: scope-aware completion of directives, end tags, macros, parameters,
//!   variables, built-ins and special variables
//! - **Hyperlinks**: include paths to files, macro calls to their definitions
//! - **Auto-Edit**: closing `>`/`}`/`-->` insertion, closer skipping and indentation
//!
//! # Architecture Layers
//!
//! ```text
//! ┌─────────────────────────────────────────────┐
//! │  TemplateEditor facade                      │  ← Public API
//! ├─────────────────────────────────────────────┤
//! │  Content Assist / Hyperlinks / Auto-Edit    │  ← Queries
//! ├─────────────────────────────────────────────┤
//! │  Reconciler (debounced, background)         │  ← Structure
//! ├─────────────────────────────────────────────┤
//! │  Presentation (Lexer + Style Intervals)     │  ← Coloring
//! ├─────────────────────────────────────────────┤
//! │  Partitioner / Repairer / Damager           │  ← Partitions
//! ├─────────────────────────────────────────────┤
//! │  Document (Rope + edit counter)             │  ← Text Storage
//! └─────────────────────────────────────────────┘
//! ```
//!
//! # Quick Start
//!
//! ```rust
//! use ftl_editor_core::{DocumentEdit, TemplateEditor};
//! use ftl_editor_core::assist::CompletionContext;
//!
//! let mut editor = TemplateEditor::new("<#list users as user>\n</#list>");
//! editor.apply_edit(DocumentEdit::insert(22, "${u}")).unwrap();
//!
//! let list = editor.completions_at(25);
//! assert_eq!(list.context, CompletionContext::Interpolation);
//! assert_eq!(list.labels(), vec!["user"]);
//! ```
//!
//! # Module Description
//!
//! - [`document`] - Rope text plus edit counter
//! - [`partition`] / [`partitioner`] - Partition model, full scan and incremental repair
//! - [`lexer`] - Per-partition tokenizer
//! - [`damage`] - Damaged-region computation
//! - [`presentation`] - Style intervals and renderer registration
//! - [`structure`] - Template structure extraction
//! - [`reconciler`] - Debounced background reconciliation
//! - [`assist`] - Content assist
//! - [`hyperlink`] - Hyperlink detection
//! - [`autoedit`] - Auto-edit strategies
//! - [`editor`] - The [`TemplateEditor`] facade

pub mod assist;
pub mod autoedit;
pub mod config;
pub mod damage;
pub mod delta;
pub mod diagnostics;
pub mod document;
pub mod editor;
pub mod error;
pub mod hyperlink;
pub mod intervals;
pub mod lexer;
pub mod partition;
pub mod partitioner;
pub mod presentation;
pub mod reconciler;
pub mod structure;

pub use assist::{CompletionContext, CompletionItem, CompletionKind, CompletionList, ContentAssist};
pub use autoedit::{AutoEditStrategy, DocumentCommand};
pub use config::EditorConfig;
pub use delta::{DamageRegion, DocumentEdit};
pub use diagnostics::{Diagnostic, DiagnosticCode, DiagnosticSeverity};
pub use editor::TemplateEditor;
pub use error::{EngineError, Result};
pub use hyperlink::{
    FsIncludeResolver, Hyperlink, HyperlinkDetector, HyperlinkTarget, IncludeResolver,
};
pub use intervals::{Interval, IntervalTree, StyleId, StyleLayerId};
pub use lexer::{Token, TokenKind};
pub use partition::{Partition, PartitionSnapshot, PartitionType};
pub use partitioner::RepairMode;
pub use presentation::{PresentationReconciler, StyleTheme, StylingRenderer};
pub use reconciler::{PassOutcome, ReconcileEvent, ReconcilerStats};
pub use structure::{OutlineStrategy, ReconcilingStrategy, TemplateStructure};
