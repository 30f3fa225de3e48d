//! The editing facade.
//!
//! [`TemplateEditor`] owns one template document and keeps everything derived from it current:
//!
//! - on every edit, synchronously: the document text, the partition list (repaired
//!   incrementally), and the syntax coloring of the damaged region;
//! - after edits settle, on the `ftl-reconciler` thread: the [`TemplateStructure`] that content
//!   assist and hyperlinking read.
//!
//! # Example
//!
//! ```rust
//! use ftl_editor_core::{DocumentEdit, PartitionType, TemplateEditor};
//!
//! let mut editor = TemplateEditor::new("Hello ${name}!");
//! let types: Vec<_> = editor.partitions().iter().map(|p| p.partition_type).collect();
//! assert_eq!(
//!     types,
//!     [PartitionType::Text, PartitionType::DollarInterpolation, PartitionType::Text]
//! );
//!
//! // Typing `<` then `#` inserts the closing `>` and leaves the caret in front of it.
//! let caret = editor.type_text(0, 0, "<").unwrap();
//! let caret = editor.type_text(caret, 0, "#").unwrap();
//! assert_eq!(caret, 2);
//! assert!(editor.text().to_string().starts_with("<#>"));
//!
//! editor.apply_edit(DocumentEdit::delete(0, 3)).unwrap();
//! assert_eq!(editor.text().to_string(), "Hello ${name}!");
//! ```

use crate::assist::{CompletionList, ContentAssist, auto_activates};
use crate::autoedit::{
    AutoEditStrategy, DocumentCommand, customize_command, partition_at_caret, strategies_for,
};
use crate::config::EditorConfig;
use crate::damage::damaged_region;
use crate::delta::DocumentEdit;
use crate::diagnostics::{Diagnostic, diagnostic_intervals};
use crate::document::Document;
use crate::error::{EngineError, Result};
use crate::hyperlink::{FsIncludeResolver, Hyperlink, HyperlinkDetector, Hyperlinks};
use crate::intervals::{Interval, IntervalTree};
use crate::partition::{Partition, PartitionSnapshot, PartitionType, validate_tiling};
use crate::partitioner::{RepairMode, compute_partitions, full_outcome, repair};
use crate::presentation::{PresentationReconciler, StyleTheme, StylingRenderer};
use crate::reconciler::{
    BackgroundReconciler, PassOutcome, ReconcileEvent, ReconcilerStats, SharedState,
};
use crate::structure::{OutlineStrategy, ReconcilingStrategy, TemplateStructure};
use ropey::Rope;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{error, trace};

/// A FreeMarker template being edited.
#[derive(Debug)]
pub struct TemplateEditor {
    config: EditorConfig,
    document: Document,
    presentation: PresentationReconciler,
    shared: Arc<SharedState>,
    background: Option<BackgroundReconciler>,
    assist: Arc<ContentAssist>,
    hyperlinks: Hyperlinks,
    template_path: Option<PathBuf>,
    last_repair: RepairMode,
}

impl TemplateEditor {
    /// Open `text` with the default configuration.
    pub fn new(text: &str) -> Self {
        Self::with_config(text, EditorConfig::default())
    }

    /// Open `text` with `config`.
    pub fn with_config(text: &str, config: EditorConfig) -> Self {
        Self::with_strategy(text, config, Box::new(OutlineStrategy))
    }

    /// Open `text` with a custom reconciling strategy.
    pub fn with_strategy(
        text: &str,
        config: EditorConfig,
        strategy: Box<dyn ReconcilingStrategy>,
    ) -> Self {
        let document = Document::new(text);
        let rope = document.text().clone();
        let partitions = compute_partitions(&rope);

        let mut presentation = PresentationReconciler::new(StyleTheme::default());
        presentation.highlight_all(&rope, &partitions);

        let len = rope.len_chars();
        let shared = Arc::new(SharedState::new(
            PartitionSnapshot {
                version: document.version(),
                text: rope,
                partitions: partitions.into(),
            },
            strategy,
        ));
        shared.run_pass(0..len);

        let assist = Arc::new(ContentAssist::new(&config));
        let cache = Arc::clone(&assist);
        shared.subscribe(Box::new(move |event: &ReconcileEvent| cache.invalidate(event)));

        let background =
            match BackgroundReconciler::spawn(Arc::clone(&shared), config.reconcile_delay()) {
                Ok(background) => Some(background),
                Err(err) => {
                    error!(error = %err, "failed to start reconciler thread");
                    None
                }
            };

        let hyperlinks = Hyperlinks::new(FsIncludeResolver::new(config.template_root.clone()));

        Self {
            config,
            document,
            presentation,
            shared,
            background,
            assist,
            hyperlinks,
            template_path: None,
            last_repair: RepairMode::Full,
        }
    }

    /// Set the file this template was loaded from; relative includes resolve against it.
    pub fn with_template_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.template_path = Some(path.into());
        self
    }

    /// Active configuration.
    pub fn config(&self) -> &EditorConfig {
        &self.config
    }

    /// The template's file, if known.
    pub fn template_path(&self) -> Option<&Path> {
        self.template_path.as_deref()
    }

    /// Apply an edit notification and return the style intervals recomputed for it.
    ///
    /// The partition list and coloring are current when this returns. Structure follows once
    /// the reconcile delay has passed without further edits.
    pub fn apply_edit(&mut self, edit: DocumentEdit) -> Result<Vec<Interval>> {
        if edit.is_noop() {
            return Ok(Vec::new());
        }
        let old = self.shared.snapshot();
        let damage = self.document.apply(&edit)?;
        let text = self.document.text().clone();
        let outcome = repair(&old.partitions, &text, &damage)?;
        self.last_repair = outcome.mode;

        let len = text.len_chars();
        let region = damaged_region(&old.partitions, &damage, &outcome, len);
        trace!(
            version = self.document.version(),
            start = region.start,
            end = region.end,
            mode = ?outcome.mode,
            "edit applied"
        );
        let intervals =
            self.presentation
                .apply_damage(&damage, &text, &outcome.partitions, region.clone());

        self.shared.commit(PartitionSnapshot {
            version: self.document.version(),
            text,
            partitions: outcome.partitions.into(),
        });
        if let Some(background) = &self.background {
            background.notify_edit(damage, region);
        }
        Ok(intervals)
    }

    /// Replace the whole text, as on reload.
    pub fn set_text(&mut self, text: &str) -> Vec<Interval> {
        let damage = self.document.set_text(text);
        let rope = self.document.text().clone();
        let outcome = full_outcome(&rope);
        self.last_repair = outcome.mode;

        let intervals = self.presentation.highlight_all(&rope, &outcome.partitions);
        let region = outcome.changed.clone();
        self.shared.commit(PartitionSnapshot {
            version: self.document.version(),
            text: rope,
            partitions: outcome.partitions.into(),
        });
        if let Some(background) = &self.background {
            background.notify_edit(damage, region);
        }
        intervals
    }

    /// A keystroke: `length` chars at `offset` replaced by `text`, after the auto-edit
    /// strategies for the partition at the caret had their say. Returns the new caret offset.
    pub fn type_text(&mut self, offset: usize, length: usize, text: &str) -> Result<usize> {
        let snapshot = self.shared.snapshot();
        let len = snapshot.text.len_chars();
        if offset.checked_add(length).is_none_or(|end| end > len) {
            error!(offset, removed = length, len, "keystroke outside document bounds");
            return Err(EngineError::EditOutOfBounds {
                offset,
                removed: length,
                len,
            });
        }

        let mut command = DocumentCommand::new(offset, length, text);
        if let Some(partition) = partition_at_caret(&snapshot.partitions, offset) {
            let strategies =
                strategies_for(partition.partition_type, self.config.auto_closers_enabled);
            if let Some(strategy) =
                customize_command(strategies, &snapshot.text, partition, &mut command)
            {
                trace!(offset, ?strategy, text = %command.text, "keystroke customized");
            }
        }

        let caret = command.caret_offset();
        self.apply_edit(command.to_edit())?;
        Ok(caret)
    }

    /// Current text.
    pub fn text(&self) -> &Rope {
        self.document.text()
    }

    /// Edit counter; bumped by every applied edit.
    pub fn version(&self) -> u64 {
        self.document.version()
    }

    /// The committed partition list.
    pub fn partitions(&self) -> Arc<[Partition]> {
        Arc::clone(&self.shared.snapshot().partitions)
    }

    /// The committed `(text, partitions)` pair.
    pub fn snapshot(&self) -> Arc<PartitionSnapshot> {
        self.shared.snapshot()
    }

    /// The latest published structure. Its `version` may lag behind [`version`](Self::version).
    pub fn structure(&self) -> Arc<TemplateStructure> {
        self.shared.structure()
    }

    /// How the last edit's partitions were derived.
    pub fn last_repair_mode(&self) -> RepairMode {
        self.last_repair
    }

    /// Syntax style intervals of the whole document.
    pub fn styles(&self) -> &IntervalTree {
        self.presentation.styles()
    }

    /// Diagnostics of the latest published structure.
    pub fn diagnostics(&self) -> Vec<Diagnostic> {
        self.structure().diagnostics.clone()
    }

    /// Overlay intervals for the latest diagnostics.
    pub fn diagnostic_intervals(&self) -> Vec<Interval> {
        diagnostic_intervals(&self.structure().diagnostics)
    }

    /// Completion proposals at `offset`.
    pub fn completions_at(&self, offset: usize) -> CompletionList {
        let snapshot = self.shared.snapshot();
        let structure = self.shared.structure();
        self.assist.completions_at(&snapshot, &structure, offset)
    }

    /// Whether completion should pop up on its own with the caret at `offset`.
    pub fn auto_activates(&self, offset: usize) -> bool {
        self.config.auto_activation && auto_activates(self.text(), offset)
    }

    /// Hyperlink under `offset`, if any.
    pub fn detect_hyperlink(&self, offset: usize) -> Option<Hyperlink> {
        let snapshot = self.shared.snapshot();
        let structure = self.shared.structure();
        self.hyperlinks
            .detect(&snapshot, &structure, self.template_path.as_deref(), offset)
    }

    /// Auto-edit strategies for `partition_type` under the current configuration.
    pub fn auto_edit_strategies_for(
        &self,
        partition_type: PartitionType,
    ) -> &'static [AutoEditStrategy] {
        strategies_for(partition_type, self.config.auto_closers_enabled)
    }

    /// Register the styling renderer for `partition_type`, returning the one it replaces.
    pub fn register_renderer(
        &mut self,
        partition_type: PartitionType,
        renderer: impl StylingRenderer + 'static,
    ) -> Option<Box<dyn StylingRenderer>> {
        self.presentation.register_renderer(partition_type, renderer)
    }

    /// Append a hyperlink detector after the built-in ones.
    pub fn add_hyperlink_detector(&mut self, detector: impl HyperlinkDetector + 'static) {
        self.hyperlinks.add_detector(detector);
    }

    /// Call `callback` after each published reconcile pass.
    ///
    /// Callbacks run on whichever thread ran the pass.
    pub fn subscribe<F>(&self, callback: F)
    where
        F: FnMut(&ReconcileEvent) + Send + 'static,
    {
        self.shared.subscribe(Box::new(callback));
    }

    /// Reconcile the whole document now, on the calling thread.
    pub fn reconcile_now(&self) -> PassOutcome {
        self.shared.run_pass(0..self.document.len_chars())
    }

    /// Counters for reconcile passes so far, including the initial one.
    pub fn reconciler_stats(&self) -> ReconcilerStats {
        self.shared.stats()
    }

    /// Check the committed partitions tile the document.
    pub fn validate(&self) -> Result<()> {
        let snapshot = self.shared.snapshot();
        validate_tiling(&snapshot.partitions, snapshot.text.len_chars())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assist::CompletionContext;
    use crate::hyperlink::HyperlinkTarget;
    use parking_lot::Mutex;
    use pretty_assertions::assert_eq;
    use std::time::Duration;

    fn quiet_config() -> EditorConfig {
        EditorConfig::default().with_reconcile_delay(Duration::from_secs(3600))
    }

    fn editor(text: &str) -> TemplateEditor {
        TemplateEditor::with_config(text, quiet_config())
    }

    #[test]
    fn test_structure_is_ready_on_open() {
        let editor = editor("<#macro box title></#macro><@box/>");
        let structure = editor.structure();
        assert_eq!(structure.version, 0);
        assert_eq!(structure.macros.len(), 1);
        assert_eq!(editor.reconciler_stats().published, 1);
    }

    #[test]
    fn test_apply_edit_keeps_partitions_current() {
        let mut editor = editor("Hello ${name}!");
        editor.apply_edit(DocumentEdit::insert(6, "<#if x>")).unwrap();
        let types: Vec<_> = editor.partitions().iter().map(|p| p.partition_type).collect();
        assert_eq!(
            types,
            vec![
                PartitionType::Text,
                PartitionType::DirectiveStart,
                PartitionType::DollarInterpolation,
                PartitionType::Text
            ]
        );
        assert_eq!(editor.version(), 1);
        assert_eq!(editor.snapshot().version, 1);
        editor.validate().unwrap();
    }

    #[test]
    fn test_noop_edit_keeps_version() {
        let mut editor = editor("abc");
        assert!(editor.apply_edit(DocumentEdit::insert(1, "")).unwrap().is_empty());
        assert_eq!(editor.version(), 0);
    }

    #[test]
    fn test_out_of_bounds_edit_is_rejected() {
        let mut editor = editor("abc");
        let err = editor.apply_edit(DocumentEdit::delete(2, 5)).unwrap_err();
        assert!(matches!(err, EngineError::EditOutOfBounds { len: 3, .. }));
        assert!(editor.type_text(9, 0, "x").is_err());
        let err = editor.type_text(1, usize::MAX, "x").unwrap_err();
        assert!(matches!(err, EngineError::EditOutOfBounds { offset: 1, len: 3, .. }));
        assert!(editor.apply_edit(DocumentEdit::delete(1, usize::MAX)).is_err());
        assert_eq!(editor.text().to_string(), "abc");
        assert_eq!(editor.version(), 0);
    }

    #[test]
    fn test_type_text_runs_auto_edit() {
        let mut editor = editor("");
        let mut caret = 0;
        for typed in ["<", "#"] {
            caret = editor.type_text(caret, 0, typed).unwrap();
        }
        assert_eq!((editor.text().to_string(), caret), ("<#>".to_string(), 2));

        caret = editor.type_text(caret, 0, ">").unwrap();
        assert_eq!((editor.text().to_string(), caret), ("<#>".to_string(), 3));
    }

    #[test]
    fn test_type_text_without_closers() {
        let config = EditorConfig {
            auto_closers_enabled: false,
            ..quiet_config()
        };
        let mut editor = TemplateEditor::with_config("<", config);
        let caret = editor.type_text(1, 0, "#").unwrap();
        assert_eq!((editor.text().to_string(), caret), ("<#".to_string(), 2));
        assert_eq!(
            editor.auto_edit_strategies_for(PartitionType::Text),
            &[AutoEditStrategy::AutoIndent]
        );
    }

    #[test]
    fn test_reconcile_now_publishes_new_structure() {
        let mut editor = editor("");
        let events = Arc::new(Mutex::new(Vec::new()));
        let seen = Arc::clone(&events);
        editor.subscribe(move |event: &ReconcileEvent| seen.lock().push(event.version));

        editor.apply_edit(DocumentEdit::insert(0, "<#macro m></#macro>")).unwrap();
        assert!(editor.structure().macros.is_empty());
        assert_eq!(editor.reconcile_now(), PassOutcome::Published);
        assert_eq!(editor.structure().macros[0].name, "m");
        assert_eq!(*events.lock(), vec![1]);
    }

    #[test]
    fn test_completions_and_hyperlinks_through_facade() {
        let mut editor = editor("<#macro box></#macro>\n");
        editor.apply_edit(DocumentEdit::insert(22, "<@b")).unwrap();

        let list = editor.completions_at(25);
        assert_eq!(list.context, CompletionContext::MacroName);
        assert_eq!(list.labels(), vec!["box"]);

        // `b` names no macro yet.
        assert!(editor.detect_hyperlink(24).is_none());

        editor.apply_edit(DocumentEdit::insert(25, "ox")).unwrap();
        let link = editor.detect_hyperlink(24).unwrap();
        assert_eq!(link.target, HyperlinkTarget::Offset(8));
    }

    #[test]
    fn test_auto_activation_respects_config() {
        let editor = editor("${");
        assert!(editor.auto_activates(2));

        let config = EditorConfig {
            auto_activation: false,
            ..quiet_config()
        };
        let editor = TemplateEditor::with_config("${", config);
        assert!(!editor.auto_activates(2));
    }

    #[test]
    fn test_renderer_sees_damaged_partitions() {
        let mut editor = editor("a ${b} c");
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        editor.register_renderer(
            PartitionType::DollarInterpolation,
            move |partition: &Partition, _: &[Interval]| sink.lock().push(partition.range()),
        );
        editor.apply_edit(DocumentEdit::insert(4, "x")).unwrap();
        assert_eq!(*seen.lock(), vec![2..7]);
    }

    #[test]
    fn test_set_text_rescans() {
        let mut editor = editor("plain");
        editor.set_text("${a}");
        assert_eq!(editor.last_repair_mode(), RepairMode::Full);
        assert_eq!(editor.partitions().len(), 1);
        assert_eq!(editor.version(), 1);
    }

    #[test]
    fn test_diagnostics_follow_structure() {
        let editor = editor("<#if x>");
        assert!(!editor.diagnostics().is_empty());
        assert_eq!(editor.diagnostic_intervals().len(), editor.diagnostics().len());
    }
}
