//! Content assist.
//!
//! [`ContentAssist::completions_at`] finds the partition under the caret and works out what is
//! being typed there from the partition text before the caret. It then builds a ranked
//! [`CompletionList`]:
//!
//! | Caret in | Context | Candidates |
//! |----------|---------|------------|
//! | `<#na\|` | directive name | directives, with clauses of the innermost block first |
//! | `<#ftl \|` | directive attribute | the directive's known attributes |
//! | `<#if \|` | expression | variables in scope, functions, keywords |
//! | `</#\|` | end tag | open blocks, innermost first |
//! | `<@\|` | macro name | macros and import namespaces |
//! | `<@m \|` | macro parameter | parameters of `m` not given yet |
//! | `${\|` | expression | variables in scope, functions |
//! | `x?\|` | built-in | built-ins |
//! | `.\|` | special variable | `.now`, `.vars`, ... |
//!
//! Variables visible at the caret are found by walking the enclosing block openers outward
//! (via [`Partition::nesting_depth`]) and collecting the names they bind: loop variables of
//! `<#list>`/`<#items>` and parameters of `<#macro>`/`<#function>`. The bindings of each opener
//! are cached by its offset and validated against its text, and cache entries overlapping the
//! changed range of a [`ReconcileEvent`] are dropped.

use crate::config::EditorConfig;
use crate::partition::{Partition, PartitionSnapshot, PartitionType, partition_index_at};
use crate::reconciler::ReconcileEvent;
use crate::structure::{
    BindingKind, DefinitionKind, IncludeKind, MacroDefinition, StartTag, TemplateStructure,
    scan_definitions,
};
use ftl_lang::{
    BUILTINS, DIRECTIVES, DirectiveKind, DirectiveSpec, EXPRESSION_KEYWORDS, SPECIAL_VARIABLES,
    is_identifier_char, is_name_char, is_trigger_sequence,
};
use parking_lot::Mutex;
use ropey::Rope;
use std::collections::{HashMap, HashSet};
use std::ops::Range;

/// What a proposal inserts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CompletionKind {
    /// Directive name after `<#`.
    Directive,
    /// Named attribute of a directive.
    Attribute,
    /// Name of an open block after `</#` or `</@`.
    EndTag,
    /// User-defined macro.
    Macro,
    /// Import namespace (`lib.`).
    Namespace,
    /// Parameter of a called macro.
    Parameter,
    /// Variable in scope.
    Variable,
    /// User-defined function.
    Function,
    /// Built-in after `?`.
    Builtin,
    /// Special variable after `.`.
    SpecialVariable,
    /// Expression keyword.
    Keyword,
}

/// One proposal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletionItem {
    /// Text shown in the list and used for prefix filtering.
    pub label: String,
    /// Text that replaces [`CompletionList::replace_range`].
    pub insert_text: String,
    /// Category.
    pub kind: CompletionKind,
    /// Short description.
    pub detail: Option<String>,
    /// Primary rank; lower sorts first. Ties are broken by label.
    pub sort_order: u32,
}

impl CompletionItem {
    /// A proposal that inserts its label.
    pub fn new(label: impl Into<String>, kind: CompletionKind, sort_order: u32) -> Self {
        let label = label.into();
        Self {
            insert_text: label.clone(),
            label,
            kind,
            detail: None,
            sort_order,
        }
    }

    /// Set the inserted text.
    pub fn with_insert_text(mut self, text: impl Into<String>) -> Self {
        self.insert_text = text.into();
        self
    }

    /// Set the description.
    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }
}

/// What the caret is in the middle of typing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CompletionContext {
    /// Nothing to complete (plain text, comments, string literals).
    None,
    /// `<#na|`
    DirectiveName,
    /// Attribute position of a directive with known attributes.
    DirectiveAttribute {
        /// Directive name.
        directive: String,
    },
    /// Expression inside a directive tag.
    DirectiveExpression,
    /// `</#na|` or `</@na|`; `sigil` is `#` or `@`, `None` right after `</` in text.
    EndTagName {
        /// Which kind of end tag.
        sigil: Option<char>,
    },
    /// `<@na|`
    MacroName,
    /// Parameter position of a macro call.
    MacroParameter {
        /// Called macro.
        macro_name: String,
    },
    /// Expression inside `${...}` or `#{...}`.
    Interpolation,
    /// After `?`.
    Builtin,
    /// After a leading `.`.
    SpecialVariable,
}

/// Ranked proposals for one caret position.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletionList {
    /// Detected context.
    pub context: CompletionContext,
    /// The identifier fragment before the caret; accepting a proposal replaces it.
    pub replace_range: Range<usize>,
    /// Proposals, best first.
    pub items: Vec<CompletionItem>,
    /// Exactly one proposal is left and may be inserted without showing a list.
    pub auto_insert: bool,
}

impl CompletionList {
    fn empty(offset: usize) -> Self {
        Self {
            context: CompletionContext::None,
            replace_range: offset..offset,
            items: Vec::new(),
            auto_insert: false,
        }
    }

    /// `true` when there is nothing to propose.
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Labels in rank order.
    pub fn labels(&self) -> Vec<&str> {
        self.items.iter().map(|item| item.label.as_str()).collect()
    }
}

/// Whether the two characters before `offset` form a trigger sequence such as `<#` or `${`.
pub fn auto_activates(text: &Rope, offset: usize) -> bool {
    if offset < 2 || offset > text.len_chars() {
        return false;
    }
    let pair = text.slice(offset - 2..offset).to_string();
    is_trigger_sequence(&pair)
}

#[derive(Debug, Clone)]
struct CachedScope {
    opener_text: String,
    bindings: Vec<(String, BindingKind)>,
}

/// Content-assist engine for one document.
#[derive(Debug)]
pub struct ContentAssist {
    scopes: Mutex<HashMap<usize, CachedScope>>,
    max_completions: usize,
    auto_insert: bool,
}

impl Default for ContentAssist {
    fn default() -> Self {
        Self::new(&EditorConfig::default())
    }
}

impl ContentAssist {
    /// Create an engine with the limits of `config`.
    pub fn new(config: &EditorConfig) -> Self {
        Self {
            scopes: Mutex::new(HashMap::new()),
            max_completions: config.max_completions,
            auto_insert: config.auto_insert,
        }
    }

    /// Number of cached opener scopes.
    pub fn cached_scopes(&self) -> usize {
        self.scopes.lock().len()
    }

    /// Drop cached scopes whose opener overlaps the range a reconcile pass reports as changed.
    pub fn invalidate(&self, event: &ReconcileEvent) {
        let changed = &event.changed_range;
        self.scopes.lock().retain(|&start, scope| {
            let end = start + scope.opener_text.chars().count();
            end < changed.start || start > changed.end
        });
    }

    /// Ranked proposals at `offset`.
    ///
    /// `structure` may lag behind `snapshot`; only names are taken from it then, never
    /// offsets.
    pub fn completions_at(
        &self,
        snapshot: &PartitionSnapshot,
        structure: &TemplateStructure,
        offset: usize,
    ) -> CompletionList {
        let offset = offset.min(snapshot.text.len_chars());
        let Some(idx) = caret_partition(&snapshot.partitions, offset) else {
            return CompletionList::empty(offset);
        };
        let partition = &snapshot.partitions[idx];
        let before = snapshot.slice(partition.start..offset);
        let (context, prefix) = analyze(&before, partition.partition_type);

        let mut items = match &context {
            CompletionContext::None => Vec::new(),
            CompletionContext::DirectiveName => directive_items(partition),
            CompletionContext::DirectiveAttribute { directive } => {
                ftl_lang::directive(directive)
                    .map(|spec| attribute_items(spec, &before))
                    .unwrap_or_default()
            }
            CompletionContext::DirectiveExpression => {
                let mut items = self.variable_items(snapshot, structure, idx, offset);
                items.extend(
                    EXPRESSION_KEYWORDS
                        .iter()
                        .map(|kw| CompletionItem::new(*kw, CompletionKind::Keyword, 3)),
                );
                items
            }
            CompletionContext::Interpolation => {
                self.variable_items(snapshot, structure, idx, offset)
            }
            CompletionContext::EndTagName { sigil } => end_tag_items(partition, *sigil),
            CompletionContext::MacroName => macro_items(snapshot, structure),
            CompletionContext::MacroParameter { macro_name } => {
                parameter_items(snapshot, structure, macro_name, &before)
            }
            CompletionContext::Builtin => BUILTINS
                .iter()
                .map(|name| CompletionItem::new(*name, CompletionKind::Builtin, 0))
                .collect(),
            CompletionContext::SpecialVariable => SPECIAL_VARIABLES
                .iter()
                .map(|name| CompletionItem::new(*name, CompletionKind::SpecialVariable, 0))
                .collect(),
        };

        items.retain(|item| item.label.starts_with(prefix.as_str()));
        items.sort_by(|a, b| (a.sort_order, &a.label).cmp(&(b.sort_order, &b.label)));
        let mut seen = HashSet::new();
        items.retain(|item| seen.insert(item.label.clone()));
        items.truncate(self.max_completions);

        let prefix_len = prefix.chars().count();
        CompletionList {
            auto_insert: self.auto_insert && items.len() == 1,
            context,
            replace_range: offset - prefix_len..offset,
            items,
        }
    }

    /// Loop variables and parameters of the enclosing blocks, then template-wide names.
    fn variable_items(
        &self,
        snapshot: &PartitionSnapshot,
        structure: &TemplateStructure,
        idx: usize,
        offset: usize,
    ) -> Vec<CompletionItem> {
        let mut items = Vec::new();
        for (rank, opener) in enclosing_openers(&snapshot.partitions, idx).into_iter().enumerate()
        {
            for (name, kind) in self.opener_bindings(snapshot, &snapshot.partitions[opener]) {
                items.push(
                    CompletionItem::new(name, CompletionKind::Variable, rank as u32)
                        .with_detail(binding_detail(kind)),
                );
            }
        }

        let outer = items.len() as u32 + 1;
        let fresh = structure.version == snapshot.version;
        for binding in &structure.bindings {
            let visible = if fresh {
                binding.scope_range.start <= offset && offset <= binding.scope_range.end
            } else {
                matches!(
                    binding.kind,
                    BindingKind::Assign | BindingKind::Global | BindingKind::ImportNamespace
                )
            };
            if visible {
                items.push(
                    CompletionItem::new(binding.name.clone(), CompletionKind::Variable, outer)
                        .with_detail(binding_detail(binding.kind)),
                );
            }
        }
        for definition in definitions(snapshot, structure).iter() {
            if definition.kind == DefinitionKind::Function {
                items.push(
                    CompletionItem::new(definition.name.clone(), CompletionKind::Function, outer)
                        .with_detail(format!("function({})", definition.parameters.join(", "))),
                );
            }
        }
        items
    }

    fn opener_bindings(
        &self,
        snapshot: &PartitionSnapshot,
        opener: &Partition,
    ) -> Vec<(String, BindingKind)> {
        let text = snapshot.text_of(opener);
        let mut scopes = self.scopes.lock();
        scopes.retain(|&start, _| is_opener_start(&snapshot.partitions, start));
        if let Some(cached) = scopes.get(&opener.start)
            && cached.opener_text == text
        {
            return cached.bindings.clone();
        }

        let bindings: Vec<_> = StartTag::parse(&text, opener)
            .bindings()
            .into_iter()
            .filter(|(_, kind, _)| {
                matches!(kind, BindingKind::LoopVariable | BindingKind::MacroParameter)
            })
            .map(|(name, kind, _)| (name, kind))
            .collect();
        scopes.insert(
            opener.start,
            CachedScope {
                opener_text: text,
                bindings: bindings.clone(),
            },
        );
        bindings
    }
}

/// Partition the caret belongs to: the one holding the character before it, unless that
/// construct is already closed.
fn caret_partition(partitions: &[Partition], offset: usize) -> Option<usize> {
    let idx = partition_index_at(partitions, offset.saturating_sub(1))?;
    let partition = &partitions[idx];
    if partition.end == offset
        && partition.partition_type != PartitionType::Text
        && !partition.unterminated
    {
        return Some((idx + 1).min(partitions.len() - 1)).filter(|&next| next != idx);
    }
    Some(idx)
}

/// Whether a start tag of `partitions` begins at `offset`.
fn is_opener_start(partitions: &[Partition], offset: usize) -> bool {
    partitions
        .binary_search_by_key(&offset, |p| p.start)
        .is_ok_and(|idx| {
            matches!(
                partitions[idx].partition_type,
                PartitionType::DirectiveStart | PartitionType::MacroInstanceStart
            )
        })
}

/// Indices of the block openers enclosing partition `idx`, innermost first.
fn enclosing_openers(partitions: &[Partition], idx: usize) -> Vec<usize> {
    let mut depth = partitions[idx].nesting_depth;
    let mut openers = Vec::new();
    for i in (0..idx).rev() {
        if depth == 0 {
            break;
        }
        let partition = &partitions[i];
        if partition.nesting_depth < depth
            && matches!(
                partition.partition_type,
                PartitionType::DirectiveStart | PartitionType::MacroInstanceStart
            )
        {
            openers.push(i);
            depth = partition.nesting_depth;
        }
    }
    openers
}

fn binding_detail(kind: BindingKind) -> &'static str {
    match kind {
        BindingKind::LoopVariable => "loop variable",
        BindingKind::MacroParameter => "parameter",
        BindingKind::Assign => "assign",
        BindingKind::Global => "global",
        BindingKind::Local => "local",
        BindingKind::ImportNamespace => "namespace",
    }
}

fn definitions<'a>(
    snapshot: &PartitionSnapshot,
    structure: &'a TemplateStructure,
) -> std::borrow::Cow<'a, [MacroDefinition]> {
    if structure.version == snapshot.version {
        std::borrow::Cow::Borrowed(&structure.macros)
    } else {
        std::borrow::Cow::Owned(scan_definitions(snapshot))
    }
}

/// Work out the context from the partition text before the caret.
///
/// Returns the context and the identifier fragment being typed.
fn analyze(before: &str, partition_type: PartitionType) -> (CompletionContext, String) {
    let Some(rest) = before.strip_prefix(partition_type.opener()) else {
        return (CompletionContext::None, String::new());
    };
    let all_name = |s: &str| s.chars().all(is_name_char);

    match partition_type {
        PartitionType::Text => {
            if before.ends_with("</") {
                (CompletionContext::EndTagName { sigil: None }, String::new())
            } else {
                (CompletionContext::None, String::new())
            }
        }
        PartitionType::Comment => (CompletionContext::None, String::new()),
        PartitionType::DirectiveEnd | PartitionType::MacroInstanceEnd => {
            if !all_name(rest) {
                return (CompletionContext::None, String::new());
            }
            let sigil = if partition_type == PartitionType::DirectiveEnd {
                '#'
            } else {
                '@'
            };
            (
                CompletionContext::EndTagName { sigil: Some(sigil) },
                rest.to_string(),
            )
        }
        PartitionType::DirectiveStart | PartitionType::MacroInstanceStart => {
            if all_name(rest) {
                let context = if partition_type == PartitionType::DirectiveStart {
                    CompletionContext::DirectiveName
                } else {
                    CompletionContext::MacroName
                };
                return (context, rest.to_string());
            }
            let name: String = rest.chars().take_while(|&c| is_name_char(c)).collect();
            let body = &rest[name.len()..];
            expression_context(body, |at_attribute| {
                if partition_type == PartitionType::MacroInstanceStart {
                    if at_attribute {
                        CompletionContext::MacroParameter { macro_name: name }
                    } else {
                        CompletionContext::DirectiveExpression
                    }
                } else if at_attribute
                    && ftl_lang::directive(&name).is_some_and(|spec| !spec.attributes.is_empty())
                {
                    CompletionContext::DirectiveAttribute { directive: name }
                } else {
                    CompletionContext::DirectiveExpression
                }
            })
        }
        PartitionType::DollarInterpolation | PartitionType::HashInterpolation => {
            expression_context(rest, |_| CompletionContext::Interpolation)
        }
    }
}

/// Context inside an expression body: built-in, special variable, or whatever `fallback`
/// decides for a plain identifier. `fallback` is told whether the identifier starts a new
/// space-separated item (an attribute or parameter name position).
fn expression_context(
    body: &str,
    fallback: impl FnOnce(bool) -> CompletionContext,
) -> (CompletionContext, String) {
    if in_string(body) {
        return (CompletionContext::None, String::new());
    }
    let chars: Vec<char> = body.chars().collect();
    let word_start = chars
        .iter()
        .rposition(|&c| !is_identifier_char(c))
        .map_or(0, |i| i + 1);
    let prefix: String = chars[word_start..].iter().collect();
    let before_word = word_start.checked_sub(1).map(|i| chars[i]);

    let context = match before_word {
        Some('?') => CompletionContext::Builtin,
        Some('.') => {
            let member_access = word_start
                .checked_sub(2)
                .map(|i| chars[i])
                .is_some_and(|c| is_identifier_char(c) || matches!(c, ')' | ']' | '"' | '\''));
            if member_access {
                return (CompletionContext::None, String::new());
            }
            CompletionContext::SpecialVariable
        }
        Some(c) if c.is_whitespace() => {
            let previous = chars[..word_start].iter().rev().find(|c| !c.is_whitespace());
            let at_attribute = previous.is_none_or(|&c| {
                !matches!(
                    c,
                    '=' | '(' | '[' | '{' | ',' | '+' | '-' | '*' | '/' | '%' | '!' | '<' | '&'
                        | '|' | ':' | '?'
                )
            });
            fallback(at_attribute)
        }
        _ => fallback(false),
    };
    (context, prefix)
}

/// Whether `body` ends inside an unclosed string literal.
fn in_string(body: &str) -> bool {
    let mut quote = None;
    let mut chars = body.chars();
    while let Some(c) = chars.next() {
        match quote {
            Some(_) if c == '\\' => {
                chars.next();
            }
            Some(open) if c == open => quote = None,
            Some(_) => {}
            None if matches!(c, '"' | '\'') => quote = Some(c),
            None => {}
        }
    }
    quote.is_some()
}

/// Clauses that continue the given block.
fn clauses_of(block: &str) -> &'static [&'static str] {
    match block {
        "if" => &["else", "elseif"],
        "list" => &["else", "items", "sep"],
        "items" => &["sep"],
        "switch" => &["case", "default"],
        "attempt" => &["recover"],
        _ => &[],
    }
}

fn directive_items(partition: &Partition) -> Vec<CompletionItem> {
    let clauses = partition
        .scope()
        .names()
        .find(|name| !name.starts_with('@'))
        .map(clauses_of)
        .unwrap_or_default();
    DIRECTIVES
        .iter()
        .map(|spec: &DirectiveSpec| {
            let sort_order = if clauses.contains(&spec.name) {
                0
            } else if spec.kind == DirectiveKind::Clause {
                2
            } else {
                1
            };
            CompletionItem::new(spec.name, CompletionKind::Directive, sort_order)
                .with_detail(spec.description)
        })
        .collect()
}

fn attribute_items(spec: &DirectiveSpec, before: &str) -> Vec<CompletionItem> {
    spec.attributes
        .iter()
        .filter(|attr| !before.contains(&format!("{attr}=")))
        .map(|attr| {
            CompletionItem::new(*attr, CompletionKind::Attribute, 0)
                .with_insert_text(format!("{attr}="))
                .with_detail(format!("<#{}> attribute", spec.name))
        })
        .collect()
}

fn end_tag_items(partition: &Partition, sigil: Option<char>) -> Vec<CompletionItem> {
    partition
        .scope()
        .names()
        .enumerate()
        .filter_map(|(rank, open)| {
            let (label, is_macro) = match open.strip_prefix('@') {
                Some(name) => (name, true),
                None => (open, false),
            };
            let insert_text = match sigil {
                Some('#') if !is_macro => label.to_string(),
                Some('@') if is_macro => label.to_string(),
                None => format!("{}{label}>", if is_macro { '@' } else { '#' }),
                _ => return None,
            };
            Some(
                CompletionItem::new(label, CompletionKind::EndTag, rank as u32)
                    .with_insert_text(insert_text),
            )
        })
        .collect()
}

fn macro_items(snapshot: &PartitionSnapshot, structure: &TemplateStructure) -> Vec<CompletionItem> {
    let mut items: Vec<_> = definitions(snapshot, structure)
        .iter()
        .filter(|d| d.kind == DefinitionKind::Macro)
        .map(|d| {
            CompletionItem::new(d.name.clone(), CompletionKind::Macro, 0)
                .with_detail(format!("macro({})", d.parameters.join(", ")))
        })
        .collect();
    items.extend(
        structure
            .includes
            .iter()
            .filter(|i| i.kind == IncludeKind::Import)
            .filter_map(|i| {
                let namespace = i.namespace.as_deref()?;
                Some(
                    CompletionItem::new(format!("{namespace}."), CompletionKind::Namespace, 1)
                        .with_detail(i.path.clone()),
                )
            }),
    );
    items
}

fn parameter_items(
    snapshot: &PartitionSnapshot,
    structure: &TemplateStructure,
    macro_name: &str,
    before: &str,
) -> Vec<CompletionItem> {
    let definitions = definitions(snapshot, structure);
    let Some(definition) = definitions
        .iter()
        .find(|d| d.kind == DefinitionKind::Macro && d.name == macro_name)
    else {
        return Vec::new();
    };
    definition
        .parameters
        .iter()
        .enumerate()
        .filter(|(_, param)| !before.contains(&format!(" {param}=")))
        .map(|(i, param)| {
            CompletionItem::new(param.clone(), CompletionKind::Parameter, i as u32)
                .with_insert_text(format!("{param}="))
                .with_detail(format!("parameter of {macro_name}"))
        })
        .collect()
}
