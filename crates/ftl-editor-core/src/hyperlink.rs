//! Hyperlink detection.
//!
//! Detectors are tried in registration order and the first hit wins. The two built-in
//! detectors link
//!
//! - the path literal of `<#include "...">` / `<#import "...">` to the file it names, and
//! - the name in `<@name>` / `</@name>` to the `<#macro name>` that defines it, or for a
//!   namespaced call `<@lib.name>` to the template imported as `lib`.
//!
//! A target that cannot be resolved is not an error; the detector just reports no link.

use crate::partition::{PartitionSnapshot, PartitionType};
use crate::structure::{DefinitionKind, TemplateStructure, scan_definitions};
use ftl_lang::is_name_char;
use regex::Regex;
use std::ops::Range;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

/// Where a hyperlink leads.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HyperlinkTarget {
    /// Another template.
    File(PathBuf),
    /// An offset in this document.
    Offset(usize),
    /// A macro defined in another template.
    MacroInFile {
        /// Template that defines the macro.
        path: PathBuf,
        /// Macro name inside that template.
        name: String,
    },
}

/// A detected link.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Hyperlink {
    /// Range of the link text in this document.
    pub target_range: Range<usize>,
    /// Destination.
    pub target: HyperlinkTarget,
}

/// Resolves an include path literal to a file.
pub trait IncludeResolver: Send + Sync {
    /// Resolve `path` as written in the template at `from` (if the template has a path).
    fn resolve(&self, from: Option<&Path>, path: &str) -> Option<PathBuf>;
}

/// Resolves include paths against the file system.
///
/// Relative paths are looked up next to the including template; `/`-absolute paths are looked
/// up under the template root. Only existing files resolve.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FsIncludeResolver {
    template_root: Option<PathBuf>,
}

impl FsIncludeResolver {
    /// Create a resolver; `template_root` anchors `/`-absolute paths.
    pub fn new(template_root: Option<PathBuf>) -> Self {
        Self { template_root }
    }
}

impl IncludeResolver for FsIncludeResolver {
    fn resolve(&self, from: Option<&Path>, path: &str) -> Option<PathBuf> {
        if path.is_empty() {
            return None;
        }
        let candidate = match path.strip_prefix('/') {
            Some(absolute) => self.template_root.as_ref()?.join(absolute),
            None => from
                .and_then(Path::parent)
                .map(Path::to_path_buf)
                .or_else(|| self.template_root.clone())?
                .join(path),
        };
        candidate.is_file().then_some(candidate)
    }
}

/// Everything a detector may look at.
pub struct HyperlinkContext<'a> {
    /// Current partitions and text.
    pub snapshot: &'a PartitionSnapshot,
    /// Latest published structure; may be older than `snapshot`.
    pub structure: &'a TemplateStructure,
    /// Include path resolution.
    pub resolver: &'a dyn IncludeResolver,
    /// Path of the edited template, if it has one.
    pub template_path: Option<&'a Path>,
}

/// Finds a link at an offset.
pub trait HyperlinkDetector: Send + Sync {
    /// The link at `offset`, if any.
    fn detect(&self, context: &HyperlinkContext<'_>, offset: usize) -> Option<Hyperlink>;
}

static INCLUDE_LITERAL: LazyLock<Option<Regex>> = LazyLock::new(|| {
    Regex::new(
        r#"^<#(?:include|import)\s+(?P<literal>r?(?:"(?P<dq>(?:[^"\\]|\\.)*)"|'(?P<sq>(?:[^'\\]|\\.)*)'))"#,
    )
    .ok()
});

/// Links the path literal of `<#include>` and `<#import>`.
#[derive(Debug, Clone, Copy, Default)]
pub struct IncludeHyperlinkDetector;

impl HyperlinkDetector for IncludeHyperlinkDetector {
    fn detect(&self, context: &HyperlinkContext<'_>, offset: usize) -> Option<Hyperlink> {
        let partition = context.snapshot.partition_at(offset)?;
        if partition.partition_type != PartitionType::DirectiveStart {
            return None;
        }
        let text = context.snapshot.text_of(partition);
        let captures = INCLUDE_LITERAL.as_ref()?.captures(&text)?;
        let literal = captures.name("literal")?;
        let path = captures.name("dq").or_else(|| captures.name("sq"))?.as_str();

        let char_offset = |byte: usize| partition.start + text[..byte].chars().count();
        let target_range = char_offset(literal.start())..char_offset(literal.end());
        if !target_range.contains(&offset) {
            return None;
        }
        let file = context.resolver.resolve(context.template_path, path)?;
        Some(Hyperlink {
            target_range,
            target: HyperlinkTarget::File(file),
        })
    }
}

/// Links macro call names to their definitions.
#[derive(Debug, Clone, Copy, Default)]
pub struct MacroHyperlinkDetector;

impl HyperlinkDetector for MacroHyperlinkDetector {
    fn detect(&self, context: &HyperlinkContext<'_>, offset: usize) -> Option<Hyperlink> {
        let snapshot = context.snapshot;
        let partition = snapshot.partition_at(offset)?;
        if !matches!(
            partition.partition_type,
            PartitionType::MacroInstanceStart | PartitionType::MacroInstanceEnd
        ) {
            return None;
        }
        let name: String = snapshot
            .text_of(partition)
            .chars()
            .skip(partition.partition_type.opener().chars().count())
            .take_while(|&c| is_name_char(c))
            .collect();
        if name.is_empty() {
            return None;
        }
        let name_start = partition.start + partition.partition_type.opener().chars().count();
        let target_range = name_start..name_start + name.chars().count();
        if offset < target_range.start || offset > target_range.end {
            return None;
        }

        let target = match name.split_once('.') {
            Some((namespace, macro_name)) => {
                let import = context.structure.import_for(namespace)?;
                let path = context.resolver.resolve(context.template_path, &import.path)?;
                HyperlinkTarget::MacroInFile {
                    path,
                    name: macro_name.to_string(),
                }
            }
            None => {
                let is_macro = |kind: DefinitionKind| kind == DefinitionKind::Macro;
                let definition_at = if context.structure.version == snapshot.version {
                    context
                        .structure
                        .macros
                        .iter()
                        .find(|d| is_macro(d.kind) && d.name == name)
                        .map(|d| d.name_range.start)
                } else {
                    scan_definitions(snapshot)
                        .into_iter()
                        .find(|d| is_macro(d.kind) && d.name == name)
                        .map(|d| d.name_range.start)
                };
                HyperlinkTarget::Offset(definition_at?)
            }
        };
        Some(Hyperlink {
            target_range,
            target,
        })
    }
}

/// The registered detectors plus the include resolver they share.
pub struct Hyperlinks {
    detectors: Vec<Box<dyn HyperlinkDetector>>,
    resolver: Box<dyn IncludeResolver>,
}

impl std::fmt::Debug for Hyperlinks {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Hyperlinks")
            .field("detectors", &self.detectors.len())
            .finish_non_exhaustive()
    }
}

impl Hyperlinks {
    /// The built-in detectors (include, then macro) over `resolver`.
    pub fn new(resolver: impl IncludeResolver + 'static) -> Self {
        Self {
            detectors: vec![
                Box::new(IncludeHyperlinkDetector),
                Box::new(MacroHyperlinkDetector),
            ],
            resolver: Box::new(resolver),
        }
    }

    /// Append a detector; it is tried after the ones already registered.
    pub fn add_detector(&mut self, detector: impl HyperlinkDetector + 'static) {
        self.detectors.push(Box::new(detector));
    }

    /// Number of registered detectors.
    pub fn len(&self) -> usize {
        self.detectors.len()
    }

    /// Returns `true` if no detector is registered.
    pub fn is_empty(&self) -> bool {
        self.detectors.is_empty()
    }

    /// First link any detector finds at `offset`.
    pub fn detect(
        &self,
        snapshot: &PartitionSnapshot,
        structure: &TemplateStructure,
        template_path: Option<&Path>,
        offset: usize,
    ) -> Option<Hyperlink> {
        let context = HyperlinkContext {
            snapshot,
            structure,
            resolver: self.resolver.as_ref(),
            template_path,
        };
        self.detectors
            .iter()
            .find_map(|detector| detector.detect(&context, offset))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::partition::Partition;
    use crate::partitioner::compute_partitions;
    use crate::structure::extract_structure;
    use ropey::Rope;
    use std::fs;
    use std::sync::Arc;

    fn snapshot(text: &str, version: u64) -> PartitionSnapshot {
        let rope = Rope::from_str(text);
        let partitions: Arc<[Partition]> = compute_partitions(&rope).into();
        PartitionSnapshot {
            version,
            text: rope,
            partitions,
        }
    }

    #[test]
    fn test_include_link_requires_existing_file() {
        let dir = tempfile::tempdir().unwrap();
        let template = dir.path().join("page.ftl");
        let text = "<#include \"a.ftl\">";
        let snap = snapshot(text, 1);
        let structure = extract_structure(&snap);
        let links = Hyperlinks::new(FsIncludeResolver::default());

        for offset in 10..17 {
            assert_eq!(links.detect(&snap, &structure, Some(&template), offset), None);
        }

        fs::write(dir.path().join("a.ftl"), "").unwrap();
        let link = links.detect(&snap, &structure, Some(&template), 12).unwrap();
        assert_eq!(link.target_range, 10..17);
        assert_eq!(link.target, HyperlinkTarget::File(dir.path().join("a.ftl")));
        assert_eq!(links.detect(&snap, &structure, Some(&template), 3), None);
    }

    #[test]
    fn test_absolute_include_uses_template_root() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir(dir.path().join("lib")).unwrap();
        fs::write(dir.path().join("lib").join("util.ftl"), "").unwrap();

        let resolver = FsIncludeResolver::new(Some(dir.path().to_path_buf()));
        assert_eq!(
            resolver.resolve(None, "/lib/util.ftl"),
            Some(dir.path().join("lib/util.ftl"))
        );
        assert_eq!(FsIncludeResolver::default().resolve(None, "/lib/util.ftl"), None);
        assert_eq!(resolver.resolve(None, ""), None);
    }

    #[test]
    fn test_macro_call_links_to_definition() {
        let text = "<#macro card></#macro><@card/>x</@card>";
        let links = Hyperlinks::new(FsIncludeResolver::default());
        for version in [1, 0] {
            // Version 0: the structure lags behind and definitions are scanned instead.
            let snap = snapshot(text, 1);
            let mut structure = extract_structure(&snap);
            structure.version = version;
            let link = links.detect(&snap, &structure, None, 24).unwrap();
            assert_eq!(link.target_range, 24..28);
            assert_eq!(link.target, HyperlinkTarget::Offset(8));
        }
        let snap = snapshot(text, 1);
        let structure = extract_structure(&snap);
        assert!(links.detect(&snap, &structure, None, 34).is_some());
        assert_eq!(links.detect(&snap, &structure, None, 30), None);
    }

    #[test]
    fn test_namespaced_macro_links_to_imported_file() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("lib.ftl"), "<#macro box></#macro>").unwrap();
        let template = dir.path().join("page.ftl");
        let text = "<#import \"lib.ftl\" as l><@l.box/>";
        let snap = snapshot(text, 1);
        let structure = extract_structure(&snap);
        let links = Hyperlinks::new(FsIncludeResolver::default());

        let link = links.detect(&snap, &structure, Some(&template), 27).unwrap();
        assert_eq!(
            link.target,
            HyperlinkTarget::MacroInFile {
                path: dir.path().join("lib.ftl"),
                name: "box".to_string(),
            }
        );
    }

    #[test]
    fn test_unknown_macro_has_no_link() {
        let snap = snapshot("<@nowhere/>", 1);
        let structure = extract_structure(&snap);
        let links = Hyperlinks::new(FsIncludeResolver::default());
        assert_eq!(links.detect(&snap, &structure, None, 4), None);
    }

    struct Everywhere;

    impl HyperlinkDetector for Everywhere {
        fn detect(&self, _context: &HyperlinkContext<'_>, offset: usize) -> Option<Hyperlink> {
            Some(Hyperlink {
                target_range: offset..offset,
                target: HyperlinkTarget::Offset(0),
            })
        }
    }

    #[test]
    fn test_detectors_run_in_registration_order() {
        let text = "<#macro m></#macro><@m/> plain";
        let snap = snapshot(text, 1);
        let structure = extract_structure(&snap);
        let mut links = Hyperlinks::new(FsIncludeResolver::default());
        links.add_detector(Everywhere);
        assert_eq!(links.len(), 3);

        let builtin = links.detect(&snap, &structure, None, 21).unwrap();
        assert_eq!(builtin.target_range, 21..22);
        let fallback = links.detect(&snap, &structure, None, 27).unwrap();
        assert_eq!(fallback.target_range, 27..27);
    }
}
