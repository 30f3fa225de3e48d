//! Built-ins, special variables and expression keywords.

/// Special variables, written after a leading dot (`${.now}`).
pub const SPECIAL_VARIABLES: &[&str] = &[
    "auto_esc",
    "caller_template_name",
    "current_template_name",
    "data_model",
    "error",
    "get_optional_template",
    "globals",
    "incompatible_improvements",
    "lang",
    "locale",
    "locale_object",
    "locals",
    "main",
    "main_template_name",
    "namespace",
    "node",
    "now",
    "output_encoding",
    "output_format",
    "pass",
    "template_name",
    "url_escaping_charset",
    "vars",
    "version",
];

/// Built-ins, written after `?` (`${name?upper_case}`).
pub const BUILTINS: &[&str] = &[
    "abs",
    "ancestors",
    "boolean",
    "c",
    "cap_first",
    "capitalize",
    "ceiling",
    "children",
    "chop_linebreak",
    "chunk",
    "contains",
    "counter",
    "date",
    "datetime",
    "drop_while",
    "ends_with",
    "ensure_ends_with",
    "ensure_starts_with",
    "esc",
    "eval",
    "exists",
    "filter",
    "first",
    "floor",
    "groups",
    "has_content",
    "has_next",
    "html",
    "if_exists",
    "index",
    "index_of",
    "int",
    "interpret",
    "is_boolean",
    "is_date",
    "is_even_item",
    "is_first",
    "is_hash",
    "is_last",
    "is_number",
    "is_odd_item",
    "is_sequence",
    "is_string",
    "item_cycle",
    "item_parity",
    "j_string",
    "join",
    "js_string",
    "json_string",
    "keep_after",
    "keep_after_last",
    "keep_before",
    "keep_before_last",
    "keys",
    "last",
    "last_index_of",
    "left_pad",
    "length",
    "lower_abc",
    "lower_case",
    "map",
    "matches",
    "max",
    "min",
    "no_esc",
    "node_name",
    "number",
    "parent",
    "remove_beginning",
    "remove_ending",
    "replace",
    "reverse",
    "right_pad",
    "round",
    "seq_contains",
    "seq_index_of",
    "size",
    "sort",
    "sort_by",
    "split",
    "starts_with",
    "string",
    "take_while",
    "time",
    "trim",
    "uncap_first",
    "upper_abc",
    "upper_case",
    "url",
    "url_path",
    "values",
    "word_list",
    "xhtml",
    "xml",
];

/// Words with a fixed meaning inside expressions and directive tags.
pub const EXPRESSION_KEYWORDS: &[&str] = &[
    "as", "false", "gt", "gte", "in", "lt", "lte", "true", "using",
];

/// Returns `true` if `word` is an expression keyword.
pub fn is_expression_keyword(word: &str) -> bool {
    EXPRESSION_KEYWORDS.binary_search(&word).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tables_are_sorted() {
        for table in [SPECIAL_VARIABLES, BUILTINS, EXPRESSION_KEYWORDS] {
            for pair in table.windows(2) {
                assert!(pair[0] < pair[1], "{} >= {}", pair[0], pair[1]);
            }
        }
    }

    #[test]
    fn test_keywords() {
        assert!(is_expression_keyword("as"));
        assert!(is_expression_keyword("gte"));
        assert!(!is_expression_keyword("list"));
    }
}
