//! The FreeMarker directive table.

/// How a directive participates in block structure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DirectiveKind {
    /// Opens a block that must be closed by a matching end tag (`<#if>` ... `</#if>`).
    Block,
    /// Opens a block only in its capture form, i.e. when the tag has no `=` (`<#assign x>...</#assign>`).
    CaptureBlock,
    /// A clause inside an enclosing block (`<#else>`, `<#case>`, `<#recover>`).
    Clause,
    /// A standalone directive with no body.
    Single,
}

/// Static description of one directive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DirectiveSpec {
    /// Directive name as written after `<#`.
    pub name: &'static str,
    /// Block participation.
    pub kind: DirectiveKind,
    /// Named attributes (`name=value`) accepted by the directive.
    pub attributes: &'static [&'static str],
    /// One-line description, shown next to completion proposals.
    pub description: &'static str,
}

impl DirectiveSpec {
    const fn new(
        name: &'static str,
        kind: DirectiveKind,
        attributes: &'static [&'static str],
        description: &'static str,
    ) -> Self {
        Self {
            name,
            kind,
            attributes,
            description,
        }
    }

    /// Returns `true` if the directive always opens a block.
    pub fn is_block(&self) -> bool {
        matches!(self.kind, DirectiveKind::Block)
    }
}

use DirectiveKind::{Block, CaptureBlock, Clause, Single};

const SETTING_NAMES: &[&str] = &[
    "locale",
    "number_format",
    "boolean_format",
    "date_format",
    "time_format",
    "datetime_format",
    "time_zone",
    "sql_date_and_time_time_zone",
    "url_escaping_charset",
    "output_encoding",
    "classic_compatible",
];

/// All directives known to the editor, sorted by name.
pub const DIRECTIVES: &[DirectiveSpec] = &[
    DirectiveSpec::new("assign", CaptureBlock, &[], "Creates or replaces a namespace variable"),
    DirectiveSpec::new("attempt", Block, &[], "Runs a block, falling back to <#recover> on error"),
    DirectiveSpec::new("autoesc", Block, &[], "Turns on auto-escaping in the block"),
    DirectiveSpec::new("break", Single, &[], "Leaves a list or switch"),
    DirectiveSpec::new("case", Clause, &[], "A branch of <#switch>"),
    DirectiveSpec::new("compress", Block, &[], "Removes superfluous white-space"),
    DirectiveSpec::new("continue", Single, &[], "Skips to the next list item"),
    DirectiveSpec::new("default", Clause, &[], "The fallback branch of <#switch>"),
    DirectiveSpec::new("else", Clause, &[], "The fallback branch of <#if> or <#list>"),
    DirectiveSpec::new("elseif", Clause, &[], "A conditional branch of <#if>"),
    DirectiveSpec::new("escape", Block, &[], "Applies an escaping expression to interpolations"),
    DirectiveSpec::new("fallback", Single, &[], "Calls the next visitor handler"),
    DirectiveSpec::new("flush", Single, &[], "Flushes the output buffer"),
    DirectiveSpec::new(
        "ftl",
        Single,
        &[
            "encoding",
            "strip_whitespace",
            "strip_text",
            "ns_prefixes",
            "attributes",
            "output_format",
            "auto_esc",
        ],
        "Template header",
    ),
    DirectiveSpec::new("function", Block, &[], "Defines a method variable"),
    DirectiveSpec::new("global", CaptureBlock, &[], "Creates or replaces a global variable"),
    DirectiveSpec::new("if", Block, &[], "Conditional block"),
    DirectiveSpec::new("import", Single, &[], "Imports a library under a namespace"),
    DirectiveSpec::new(
        "include",
        Single,
        &["parse", "encoding", "ignore_missing"],
        "Inserts another template",
    ),
    DirectiveSpec::new("items", Block, &[], "Iterates the items of the enclosing <#list>"),
    DirectiveSpec::new("list", Block, &[], "Iterates a sequence or hash"),
    DirectiveSpec::new("local", CaptureBlock, &[], "Creates or replaces a local variable"),
    DirectiveSpec::new("lt", Single, &[], "Strips leading white-space of the line"),
    DirectiveSpec::new("macro", Block, &[], "Defines a macro"),
    DirectiveSpec::new("nested", Single, &[], "Runs the body of the macro call"),
    DirectiveSpec::new("noautoesc", Block, &[], "Turns off auto-escaping in the block"),
    DirectiveSpec::new("noescape", Block, &[], "Disables the enclosing <#escape>"),
    DirectiveSpec::new("nt", Single, &[], "Disables white-space stripping for the line"),
    DirectiveSpec::new("outputformat", Block, &[], "Sets the output format of the block"),
    DirectiveSpec::new("recover", Clause, &[], "The fallback branch of <#attempt>"),
    DirectiveSpec::new("recurse", Single, &["using"], "Visits the children of a node"),
    DirectiveSpec::new("return", Single, &[], "Leaves a macro or function"),
    DirectiveSpec::new("rt", Single, &[], "Strips trailing white-space of the line"),
    DirectiveSpec::new("sep", Clause, &[], "Separator printed between list items"),
    DirectiveSpec::new("setting", Single, SETTING_NAMES, "Changes a processing setting"),
    DirectiveSpec::new("stop", Single, &[], "Aborts template processing"),
    DirectiveSpec::new("switch", Block, &[], "Multi-way branch"),
    DirectiveSpec::new("t", Single, &[], "Strips white-space of the line"),
    DirectiveSpec::new("visit", Single, &["using"], "Visits a node"),
];

/// Look up a directive by name.
pub fn directive(name: &str) -> Option<&'static DirectiveSpec> {
    DIRECTIVES
        .binary_search_by(|spec| spec.name.cmp(name))
        .ok()
        .map(|idx| &DIRECTIVES[idx])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_directive_table_is_sorted() {
        for pair in DIRECTIVES.windows(2) {
            assert!(pair[0].name < pair[1].name, "{} >= {}", pair[0].name, pair[1].name);
        }
    }

    #[test]
    fn test_directive_lookup() {
        assert_eq!(directive("list").map(|d| d.kind), Some(DirectiveKind::Block));
        assert_eq!(directive("assign").map(|d| d.kind), Some(DirectiveKind::CaptureBlock));
        assert_eq!(directive("else").map(|d| d.kind), Some(DirectiveKind::Clause));
        assert!(directive("include").is_some_and(|d| d.attributes.contains(&"parse")));
        assert!(directive("nope").is_none());
    }
}
