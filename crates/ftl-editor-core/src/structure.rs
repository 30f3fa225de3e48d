//! Template structure extraction.
//!
//! The reconciler runs a [`ReconcilingStrategy`] over a committed [`PartitionSnapshot`] once edits
//! settle. The default [`OutlineStrategy`] derives the structure content assist and hyperlinking
//! need and that is too costly to keep live per keystroke: macro/function definitions with their
//! bodies, macro calls, include/import references, variable bindings with the range they are
//! visible in, and advisory diagnostics.

use crate::diagnostics::{Diagnostic, DiagnosticCode, DiagnosticRange, DiagnosticSeverity};
use crate::lexer::{TokenKind, tokenize};
use crate::partition::{Partition, PartitionSnapshot, PartitionType};
use crate::partitioner::opens_block;
use ftl_lang::is_name_char;
use std::ops::Range;

/// `<#macro>` or `<#function>`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DefinitionKind {
    /// Callable with `<@name/>`.
    Macro,
    /// Callable from expressions.
    Function,
}

/// A macro or function definition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MacroDefinition {
    /// Defined name.
    pub name: String,
    /// Macro or function.
    pub kind: DefinitionKind,
    /// Parameter names in declaration order.
    pub parameters: Vec<String>,
    /// Range of the `<#macro ...>` tag.
    pub tag_range: Range<usize>,
    /// Range of the name inside the tag.
    pub name_range: Range<usize>,
    /// Range between the start tag and the end tag (to end of document when unclosed).
    pub body_range: Range<usize>,
}

/// A `<@name ...>` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MacroCall {
    /// Called name, possibly namespaced (`lib.page`).
    pub name: String,
    /// Range of the name.
    pub name_range: Range<usize>,
    /// Range of the whole tag.
    pub tag_range: Range<usize>,
}

impl MacroCall {
    /// `(namespace, macro)` for a namespaced call such as `<@lib.page>`.
    pub fn namespace(&self) -> Option<(&str, &str)> {
        self.name.split_once('.')
    }
}

/// `<#include>` or `<#import>`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IncludeKind {
    /// `<#include "path">`
    Include,
    /// `<#import "path" as ns>`
    Import,
}

/// A reference to another template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IncludeRef {
    /// Include or import.
    pub kind: IncludeKind,
    /// Path literal without quotes.
    pub path: String,
    /// Range of the string literal, quotes included.
    pub literal_range: Range<usize>,
    /// Range of the whole tag.
    pub tag_range: Range<usize>,
    /// Namespace bound by an import.
    pub namespace: Option<String>,
}

/// How a variable got its name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BindingKind {
    /// `<#list xs as x>` / `<#items as x>`
    LoopVariable,
    /// Parameter of the enclosing macro or function.
    MacroParameter,
    /// `<#assign>`
    Assign,
    /// `<#global>`
    Global,
    /// `<#local>`
    Local,
    /// `<#import ... as ns>`
    ImportNamespace,
}

/// A named variable and where it is visible.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VariableBinding {
    /// Variable name.
    pub name: String,
    /// Binding form.
    pub kind: BindingKind,
    /// Offset of the declaring name.
    pub declared_at: usize,
    /// Range in which the name is visible.
    pub scope_range: Range<usize>,
}

/// Everything the reconciler derives from one snapshot.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TemplateStructure {
    /// Document version this structure belongs to.
    pub version: u64,
    /// Macro and function definitions.
    pub macros: Vec<MacroDefinition>,
    /// Macro calls.
    pub calls: Vec<MacroCall>,
    /// Includes and imports.
    pub includes: Vec<IncludeRef>,
    /// Variable bindings.
    pub bindings: Vec<VariableBinding>,
    /// Advisory diagnostics.
    pub diagnostics: Vec<Diagnostic>,
}

impl TemplateStructure {
    /// Definition of the macro called `name`.
    pub fn macro_named(&self, name: &str) -> Option<&MacroDefinition> {
        self.macros.iter().find(|m| m.name == name)
    }

    /// Bindings whose scope contains `offset`.
    pub fn bindings_at(&self, offset: usize) -> impl Iterator<Item = &VariableBinding> {
        self.bindings
            .iter()
            .filter(move |b| b.scope_range.start <= offset && offset <= b.scope_range.end)
    }

    /// The import that binds `namespace`.
    pub fn import_for(&self, namespace: &str) -> Option<&IncludeRef> {
        self.includes
            .iter()
            .find(|i| i.kind == IncludeKind::Import && i.namespace.as_deref() == Some(namespace))
    }
}

/// Strategy run by the reconciler after edits settle.
pub trait ReconcilingStrategy: Send {
    /// Derive the structure of `snapshot`.
    fn reconcile(&mut self, snapshot: &PartitionSnapshot) -> TemplateStructure;
}

/// Default strategy: [`extract_structure`].
#[derive(Debug, Clone, Copy, Default)]
pub struct OutlineStrategy;

impl ReconcilingStrategy for OutlineStrategy {
    fn reconcile(&mut self, snapshot: &PartitionSnapshot) -> TemplateStructure {
        extract_structure(snapshot)
    }
}

/// A non-white-space token of a tag body, with its bracket depth.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct TagToken {
    pub kind: TokenKind,
    pub text: String,
    pub range: Range<usize>,
    pub depth: usize,
}

/// A lexed start tag (`<#name ...>` or `<@name ...>`).
#[derive(Debug, Clone)]
pub(crate) struct StartTag {
    pub name: String,
    pub name_range: Range<usize>,
    pub body: Vec<TagToken>,
    pub self_closing: bool,
    pub terminated: bool,
}

const ASSIGNMENT_OPERATORS: &[&str] = &["=", "+=", "-=", "*=", "/=", "%=", "++", "--"];

impl StartTag {
    pub fn parse(text: &str, partition: &Partition) -> Self {
        let chars: Vec<char> = text.chars().collect();
        let slice = |range: &Range<usize>| -> String {
            let start = range.start.saturating_sub(partition.start).min(chars.len());
            let end = range.end.saturating_sub(partition.start).min(chars.len());
            chars[start..end].iter().collect()
        };

        let mut name = String::new();
        let mut name_range = partition.start..partition.start;
        let mut body = Vec::new();
        let mut depth = 0usize;
        for token in tokenize(text, partition.partition_type, partition.start) {
            match token.kind {
                TokenKind::DirectiveName | TokenKind::MacroName => {
                    name = slice(&token.range);
                    name_range = token.range;
                }
                TokenKind::TagDelimiter | TokenKind::Whitespace | TokenKind::Comment => {}
                kind => {
                    let text = slice(&token.range);
                    if kind == TokenKind::Punctuation && matches!(text.as_str(), ")" | "]" | "}") {
                        depth = depth.saturating_sub(1);
                    }
                    let opens =
                        kind == TokenKind::Punctuation && matches!(text.as_str(), "(" | "[" | "{");
                    body.push(TagToken {
                        kind,
                        text,
                        range: token.range,
                        depth,
                    });
                    if opens {
                        depth += 1;
                    }
                }
            }
        }

        Self {
            name,
            name_range,
            body,
            self_closing: text.ends_with("/>"),
            terminated: !partition.unterminated,
        }
    }

    /// Any `=`-bearing operator at bracket depth 0 (`x = 1`, `x += 1`, `a == b`).
    pub fn has_assignment(&self) -> bool {
        self.body
            .iter()
            .any(|t| t.depth == 0 && t.kind == TokenKind::Operator && t.text.contains('='))
    }

    /// Whether this tag opens a block closed by a later end tag.
    pub fn opens_block(&self, partition_type: PartitionType) -> bool {
        if self.name.is_empty() || self.self_closing || !self.terminated {
            return false;
        }
        match partition_type {
            PartitionType::MacroInstanceStart => true,
            _ => opens_block(&self.name, self.has_assignment()),
        }
    }

    /// First string literal of the body.
    pub fn first_string(&self) -> Option<&TagToken> {
        self.body.iter().find(|t| t.kind == TokenKind::String)
    }

    /// Identifiers listed after a top-level `as` keyword (`as k, v`).
    fn names_after_as(&self) -> Vec<&TagToken> {
        let Some(as_idx) = self
            .body
            .iter()
            .position(|t| t.depth == 0 && t.kind == TokenKind::Keyword && t.text == "as")
        else {
            return Vec::new();
        };
        self.body[as_idx + 1..]
            .iter()
            .take_while(|t| t.kind == TokenKind::Identifier || t.text == ",")
            .filter(|t| t.kind == TokenKind::Identifier)
            .collect()
    }

    /// Name, name range and parameters of a `<#macro>` / `<#function>` tag.
    pub fn signature(&self) -> Option<(String, Range<usize>, Vec<String>)> {
        let first = self.body.first()?;
        let name = match first.kind {
            TokenKind::Identifier | TokenKind::Keyword => first.text.clone(),
            TokenKind::String => unquote(&first.text),
            _ => return None,
        };
        let function = self.name == "function";
        let mut parameters = Vec::new();
        for pair in self.body.windows(2) {
            let (prev, token) = (&pair[0], &pair[1]);
            if token.kind != TokenKind::Identifier {
                continue;
            }
            let is_parameter = if function {
                token.depth == 1 && matches!(prev.text.as_str(), "(" | ",")
            } else {
                token.depth == 0
                    && !matches!(
                        prev.kind,
                        TokenKind::Operator | TokenKind::Punctuation | TokenKind::Builtin
                    )
            };
            if is_parameter {
                parameters.push(token.text.clone());
            }
        }
        Some((name, first.range.clone(), parameters))
    }

    /// Names bound by this tag, with their binding kind and declaration offset.
    pub fn bindings(&self) -> Vec<(String, BindingKind, usize)> {
        let named = |tokens: Vec<&TagToken>, kind| {
            tokens
                .into_iter()
                .map(|t| (t.text.clone(), kind, t.range.start))
                .collect::<Vec<_>>()
        };
        match self.name.as_str() {
            "list" | "items" => named(self.names_after_as(), BindingKind::LoopVariable),
            "import" => named(self.names_after_as(), BindingKind::ImportNamespace),
            "macro" | "function" => self
                .signature()
                .map(|(_, _, params)| {
                    params
                        .into_iter()
                        .filter_map(|param| {
                            let token = self.body.iter().find(|t| t.text == param)?;
                            Some((param, BindingKind::MacroParameter, token.range.start))
                        })
                        .collect()
                })
                .unwrap_or_default(),
            "assign" | "global" | "local" => {
                let kind = match self.name.as_str() {
                    "assign" => BindingKind::Assign,
                    "global" => BindingKind::Global,
                    _ => BindingKind::Local,
                };
                let declares = |t: &TagToken| {
                    matches!(t.kind, TokenKind::Identifier | TokenKind::String) && t.depth == 0
                };
                if !self.has_assignment() {
                    return self
                        .body
                        .first()
                        .filter(|t| declares(t))
                        .map(|t| vec![(unquote(&t.text), kind, t.range.start)])
                        .unwrap_or_default();
                }
                self.body
                    .windows(2)
                    .filter(|pair| {
                        declares(&pair[0])
                            && pair[1].kind == TokenKind::Operator
                            && ASSIGNMENT_OPERATORS.contains(&pair[1].text.as_str())
                    })
                    .map(|pair| (unquote(&pair[0].text), kind, pair[0].range.start))
                    .collect()
            }
            _ => Vec::new(),
        }
    }
}

/// Strip the quotes (and raw prefix) from a string literal.
pub(crate) fn unquote(literal: &str) -> String {
    let literal = match literal.strip_prefix('r') {
        Some(rest) if rest.starts_with(['"', '\'']) => rest,
        _ => literal,
    };
    match (literal.chars().next(), literal.chars().last()) {
        (Some(open @ ('"' | '\'')), Some(close)) if open == close && literal.len() >= 2 => {
            literal[1..literal.len() - 1].to_string()
        }
        (Some(open @ ('"' | '\'')), _) => literal[open.len_utf8()..].to_string(),
        _ => literal.to_string(),
    }
}

/// Name written after `</#` or `</@`.
pub(crate) fn end_tag_name(text: &str, partition_type: PartitionType) -> String {
    text.strip_prefix(partition_type.opener())
        .unwrap_or_default()
        .chars()
        .take_while(|&c| is_name_char(c))
        .collect()
}

/// Macro and function definitions found from their start tags alone.
///
/// Much cheaper than [`extract_structure`], so queries use it while the published structure
/// lags behind the snapshot. Body ranges are not known and are left empty after the tag.
pub(crate) fn scan_definitions(snapshot: &PartitionSnapshot) -> Vec<MacroDefinition> {
    snapshot
        .partitions
        .iter()
        .filter(|p| p.partition_type == PartitionType::DirectiveStart)
        .filter_map(|partition| {
            let text = snapshot.text_of(partition);
            if !(text.starts_with("<#macro") || text.starts_with("<#function")) {
                return None;
            }
            let tag = StartTag::parse(&text, partition);
            let kind = match tag.name.as_str() {
                "macro" => DefinitionKind::Macro,
                "function" => DefinitionKind::Function,
                _ => return None,
            };
            let (name, name_range, parameters) = tag.signature()?;
            Some(MacroDefinition {
                name,
                kind,
                parameters,
                tag_range: partition.range(),
                name_range,
                body_range: partition.end..partition.end,
            })
        })
        .collect()
}

struct OpenBlock {
    name: String,
    tag_range: Range<usize>,
    body_start: usize,
    definition: Option<usize>,
    scoped_bindings: Vec<usize>,
}

impl OpenBlock {
    fn is_callable_body(&self) -> bool {
        matches!(self.name.as_str(), "macro" | "function")
    }
}

/// Run the default structure extraction over a snapshot.
pub fn extract_structure(snapshot: &PartitionSnapshot) -> TemplateStructure {
    let len = snapshot.text.len_chars();
    let mut structure = TemplateStructure {
        version: snapshot.version,
        ..TemplateStructure::default()
    };
    let mut open: Vec<OpenBlock> = Vec::new();

    for partition in snapshot.partitions.iter() {
        if partition.unterminated {
            structure.diagnostics.push(Diagnostic::new(
                DiagnosticRange::new(partition.start, partition.end),
                DiagnosticSeverity::Warning,
                DiagnosticCode::Unterminated,
                format!("{} is not closed before end of template", partition.partition_type),
            ));
        }

        match partition.partition_type {
            PartitionType::DirectiveStart | PartitionType::MacroInstanceStart => {
                let tag = StartTag::parse(&snapshot.text_of(partition), partition);
                let mut block = OpenBlock {
                    name: tag.name.clone(),
                    tag_range: partition.range(),
                    body_start: partition.end,
                    definition: None,
                    scoped_bindings: Vec::new(),
                };

                if partition.partition_type == PartitionType::MacroInstanceStart {
                    if !tag.name.is_empty() {
                        structure.calls.push(MacroCall {
                            name: tag.name.clone(),
                            name_range: tag.name_range.clone(),
                            tag_range: partition.range(),
                        });
                        block.name = format!("@{}", tag.name);
                    }
                } else {
                    record_directive(&tag, partition, len, &mut open, &mut block, &mut structure);
                }

                if tag.opens_block(partition.partition_type) {
                    open.push(block);
                }
            }
            PartitionType::DirectiveEnd | PartitionType::MacroInstanceEnd => {
                let name = end_tag_name(&snapshot.text_of(partition), partition.partition_type);
                let target = if partition.partition_type == PartitionType::DirectiveEnd {
                    open.iter()
                        .rposition(|b| !name.is_empty() && b.name == name)
                } else if name.is_empty() {
                    open.iter().rposition(|b| b.name.starts_with('@'))
                } else {
                    open.iter()
                        .rposition(|b| b.name.strip_prefix('@') == Some(name.as_str()))
                };
                match target {
                    Some(idx) => {
                        while open.len() > idx + 1 {
                            if let Some(block) = open.pop() {
                                report_unclosed(&block, &mut structure);
                                close_block(block, partition.start, &mut structure);
                            }
                        }
                        if let Some(block) = open.pop() {
                            close_block(block, partition.start, &mut structure);
                        }
                    }
                    None => structure.diagnostics.push(Diagnostic::new(
                        DiagnosticRange::new(partition.start, partition.end),
                        DiagnosticSeverity::Warning,
                        DiagnosticCode::UnmatchedEndTag,
                        format!("end tag closes no open `{name}` block"),
                    )),
                }
            }
            _ => {}
        }
    }

    while let Some(block) = open.pop() {
        report_unclosed(&block, &mut structure);
        close_block(block, len, &mut structure);
    }
    structure
}

fn record_directive(
    tag: &StartTag,
    partition: &Partition,
    len: usize,
    open: &mut [OpenBlock],
    block: &mut OpenBlock,
    structure: &mut TemplateStructure,
) {
    match tag.name.as_str() {
        "include" | "import" => {
            if let Some(literal) = tag.first_string() {
                let import = tag.name == "import";
                structure.includes.push(IncludeRef {
                    kind: if import {
                        IncludeKind::Import
                    } else {
                        IncludeKind::Include
                    },
                    path: unquote(&literal.text),
                    literal_range: literal.range.clone(),
                    tag_range: partition.range(),
                    namespace: import
                        .then(|| tag.names_after_as().first().map(|t| t.text.clone()))
                        .flatten(),
                });
            }
        }
        "macro" | "function" => {
            if let Some((name, name_range, parameters)) = tag.signature() {
                block.definition = Some(structure.macros.len());
                structure.macros.push(MacroDefinition {
                    name,
                    kind: if tag.name == "macro" {
                        DefinitionKind::Macro
                    } else {
                        DefinitionKind::Function
                    },
                    parameters,
                    tag_range: partition.range(),
                    name_range,
                    body_range: partition.end..len,
                });
            }
        }
        _ => {}
    }

    for (name, kind, declared_at) in tag.bindings() {
        let index = structure.bindings.len();
        let scope_range = match kind {
            BindingKind::LoopVariable | BindingKind::MacroParameter => {
                block.scoped_bindings.push(index);
                partition.end..len
            }
            BindingKind::Local => match open.iter_mut().rev().find(|b| b.is_callable_body()) {
                Some(callable) => {
                    callable.scoped_bindings.push(index);
                    declared_at..len
                }
                None => declared_at..len,
            },
            BindingKind::Assign | BindingKind::Global | BindingKind::ImportNamespace => {
                declared_at..len
            }
        };
        structure.bindings.push(VariableBinding {
            name,
            kind,
            declared_at,
            scope_range,
        });
    }
}

fn report_unclosed(block: &OpenBlock, structure: &mut TemplateStructure) {
    let shown = block.name.strip_prefix('@').unwrap_or(&block.name);
    structure.diagnostics.push(Diagnostic::new(
        DiagnosticRange::new(block.tag_range.start, block.tag_range.end),
        DiagnosticSeverity::Warning,
        DiagnosticCode::UnclosedBlock,
        format!("`{shown}` is never closed"),
    ));
}

fn close_block(block: OpenBlock, end: usize, structure: &mut TemplateStructure) {
    if let Some(definition) = block.definition.and_then(|idx| structure.macros.get_mut(idx)) {
        definition.body_range = block.body_start..end;
    }
    for idx in block.scoped_bindings {
        if let Some(binding) = structure.bindings.get_mut(idx) {
            binding.scope_range.end = end;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::partitioner::compute_partitions;
    use pretty_assertions::assert_eq;
    use ropey::Rope;
    use std::sync::Arc;

    fn snapshot(text: &str) -> PartitionSnapshot {
        let rope = Rope::from_str(text);
        let partitions: Arc<[Partition]> = compute_partitions(&rope).into();
        PartitionSnapshot {
            version: 7,
            text: rope,
            partitions,
        }
    }

    #[test]
    fn test_macro_definition_and_call() {
        let text = "<#macro card title size=1 extra...>[${title}]</#macro><@card title='x'/>";
        let structure = extract_structure(&snapshot(text));
        assert_eq!(structure.version, 7);
        let card = structure.macro_named("card").unwrap();
        assert_eq!(card.kind, DefinitionKind::Macro);
        assert_eq!(card.parameters, vec!["title", "size", "extra"]);
        assert_eq!(&text[card.name_range.clone()], "card");
        assert_eq!(&text[card.body_range.clone()], "[${title}]");
        assert_eq!(structure.calls.len(), 1);
        assert_eq!(structure.calls[0].name, "card");
        assert!(structure.diagnostics.is_empty());
    }

    #[test]
    fn test_function_parameters() {
        let structure = extract_structure(&snapshot(
            "<#function avg(a, b=f(x), c)><#return (a+b)/2></#function>",
        ));
        assert_eq!(structure.macros[0].kind, DefinitionKind::Function);
        assert_eq!(structure.macros[0].parameters, vec!["a", "b", "c"]);
    }

    #[test]
    fn test_includes_and_imports() {
        let text = "<#include \"header.ftl\"><#import '/lib/util.ftl' as u><@u.box/>";
        let structure = extract_structure(&snapshot(text));
        assert_eq!(structure.includes.len(), 2);
        assert_eq!(structure.includes[0].path, "header.ftl");
        assert_eq!(&text[structure.includes[0].literal_range.clone()], "\"header.ftl\"");
        let import = structure.import_for("u").unwrap();
        assert_eq!(import.path, "/lib/util.ftl");
        assert_eq!(structure.calls[0].namespace(), Some(("u", "box")));
    }

    #[test]
    fn test_loop_variable_scope() {
        let text = "<#list users as user>${user}</#list>${after}";
        let structure = extract_structure(&snapshot(text));
        let user = &structure.bindings[0];
        assert_eq!(user.name, "user");
        assert_eq!(user.kind, BindingKind::LoopVariable);
        assert_eq!(&text[user.scope_range.clone()], "${user}");
        assert_eq!(structure.bindings_at(23).count(), 1);
        assert_eq!(structure.bindings_at(40).count(), 0);
    }

    #[test]
    fn test_assignments() {
        let text = "<#assign a = 1 b += 2><#global g = a == b><#assign cap>x</#assign>";
        let structure = extract_structure(&snapshot(text));
        let names: Vec<_> = structure
            .bindings
            .iter()
            .map(|b| (b.name.as_str(), b.kind))
            .collect();
        assert_eq!(
            names,
            vec![
                ("a", BindingKind::Assign),
                ("b", BindingKind::Assign),
                ("g", BindingKind::Global),
                ("cap", BindingKind::Assign),
            ]
        );
    }

    #[test]
    fn test_local_is_scoped_to_macro_body() {
        let text = "<#macro m><#local tmp = 1>${tmp}</#macro>${tmp}";
        let structure = extract_structure(&snapshot(text));
        let tmp = structure.bindings.iter().find(|b| b.name == "tmp").unwrap();
        assert_eq!(tmp.kind, BindingKind::Local);
        assert_eq!(tmp.scope_range.end, text.find("</#macro>").unwrap());
    }

    #[test]
    fn test_structural_diagnostics() {
        let text = "<#list xs as x><#if x></#list></#switch>${oops";
        let structure = extract_structure(&snapshot(text));
        let codes: Vec<_> = structure.diagnostics.iter().map(|d| d.code).collect();
        assert_eq!(
            codes,
            vec![
                DiagnosticCode::UnclosedBlock,
                DiagnosticCode::UnmatchedEndTag,
                DiagnosticCode::Unterminated,
            ]
        );
    }

    #[test]
    fn test_scan_definitions_matches_full_extraction_names() {
        let text = "<#macros><#macro a x></#macro><#function f(y)></#function><#macro>";
        let scanned = scan_definitions(&snapshot(text));
        let names: Vec<_> = scanned.iter().map(|d| (d.name.as_str(), d.kind)).collect();
        assert_eq!(
            names,
            vec![("a", DefinitionKind::Macro), ("f", DefinitionKind::Function)]
        );
        assert_eq!(scanned[1].parameters, vec!["y"]);
        assert_eq!(&text[scanned[0].name_range.clone()], "a");
    }

    #[test]
    fn test_unquote() {
        assert_eq!(unquote("\"a.ftl\""), "a.ftl");
        assert_eq!(unquote("r'C:\\x'"), "C:\\x");
        assert_eq!(unquote("\"open"), "open");
        assert_eq!(unquote("plain"), "plain");
        assert_eq!(unquote("rabbit"), "rabbit");
    }
}
