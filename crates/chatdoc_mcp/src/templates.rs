//! Template Resolver
//!
//! Templates live in `templates/` directly under the allowed root. They are
//! re-scanned on every call so operators can add or remove files without a
//! restart. Listing order is filename ascending (byte order), and labels
//! are assigned from that order: `A`..`Z`, `AA`..`ZZ`, `AAA`..`ZZZ`, then
//! `T{n}`.

use crate::config::SelectionPolicy;
use chatdoc_protocol::{ErrorCode, TemplateKind};
use chatdoc_security::{CanonicalPath, PathGuard, PathViolation};
use std::fs;
use std::path::Path;
use thiserror::Error;
use tracing::{debug, warn};

/// Directory under the allowed root that holds templates
pub const TEMPLATES_DIR: &str = "templates";

const ALPHABET: &[u8; 26] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ";

/// A discovered template
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Template {
    /// Display label (`A`, `B`, ...)
    pub label: String,
    /// File name, e.g. `corporate.docx`
    pub name: String,
    pub kind: TemplateKind,
    pub path: CanonicalPath,
}

impl Template {
    /// Path relative to the allowed root, with `/` separators
    pub fn relative_path(&self) -> String {
        self.path
            .relative()
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/")
    }

    fn stem(&self) -> &str {
        Path::new(&self.name)
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or(&self.name)
    }
}

#[derive(Debug, Error)]
pub enum TemplateError {
    #[error(
        "{label} output requires a template, but no .{ext} templates were found in {dir}/. \
         Add one there and try again.",
        label = kind_name(.0),
        ext = .0.extension(),
        dir = TEMPLATES_DIR
    )]
    Required(TemplateKind),

    #[error(
        "{count} {label} templates are available. Choose one with the {param} parameter \
         (call list-templates to see the options).",
        label = kind_name(.kind),
        param = .kind.parameter()
    )]
    SelectionRequired { kind: TemplateKind, count: usize },

    #[error(
        "Template '{selection}' was not found. Call list-templates to see the available {label} templates.",
        label = kind_name(.kind)
    )]
    NotFound { kind: TemplateKind, selection: String },

    #[error(transparent)]
    Path(#[from] PathViolation),

    #[error("templates directory could not be read")]
    Unreadable(#[source] std::io::Error),
}

impl TemplateError {
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::Required(_) => ErrorCode::TemplateRequired,
            Self::SelectionRequired { .. } => ErrorCode::TemplateSelectionRequired,
            Self::NotFound { .. } => ErrorCode::TemplateNotFound,
            Self::Path(_) => ErrorCode::PathViolation,
            Self::Unreadable(_) => ErrorCode::InternalError,
        }
    }
}

/// Upper-case name used in messages
pub fn kind_name(kind: &TemplateKind) -> &'static str {
    match kind {
        TemplateKind::StyleDocument => "DOCX",
        TemplateKind::Stylesheet => "PDF",
    }
}

/// Label for the template at `index` in listing order.
pub fn label_for(index: usize) -> String {
    let letter = |i: usize| char::from(ALPHABET[i]);
    if index < 26 {
        return letter(index).to_string();
    }
    let index2 = index - 26;
    if index2 < 26 * 26 {
        return [letter(index2 / 26), letter(index2 % 26)].iter().collect();
    }
    let index3 = index2 - 26 * 26;
    if index3 < 26 * 26 * 26 {
        return [
            letter(index3 / (26 * 26)),
            letter((index3 / 26) % 26),
            letter(index3 % 26),
        ]
        .iter()
        .collect();
    }
    format!("T{}", index + 1)
}

/// Discovers templates and binds a selection to one of them
#[derive(Debug, Clone)]
pub struct TemplateResolver {
    guard: PathGuard,
    policy: SelectionPolicy,
}

impl TemplateResolver {
    pub fn new(guard: PathGuard, policy: SelectionPolicy) -> Self {
        Self { guard, policy }
    }

    pub fn policy(&self) -> SelectionPolicy {
        self.policy
    }

    /// The templates directory, if it exists
    pub fn templates_dir(&self) -> Result<Option<CanonicalPath>, TemplateError> {
        let dir = self.guard.validate(TEMPLATES_DIR)?;
        Ok(dir.as_path().is_dir().then_some(dir))
    }

    /// Templates of `kind`, in listing order. A missing directory lists nothing.
    pub fn list(&self, kind: TemplateKind) -> Result<Vec<Template>, TemplateError> {
        let Some(dir) = self.templates_dir()? else {
            debug!("No templates directory");
            return Ok(Vec::new());
        };

        let mut names: Vec<String> = Vec::new();
        for entry in fs::read_dir(dir.as_path()).map_err(TemplateError::Unreadable)? {
            let entry = entry.map_err(TemplateError::Unreadable)?;
            let Ok(name) = entry.file_name().into_string() else {
                continue;
            };
            if name.starts_with('.') || !has_extension(&name, kind.extension()) {
                continue;
            }
            names.push(name);
        }
        names.sort();

        let mut templates = Vec::with_capacity(names.len());
        for name in names {
            let path = match self.guard.validate(dir.as_path().join(&name)) {
                Ok(path) => path,
                Err(_) => {
                    warn!(template = %name, "Skipping template that resolves outside the allowed root");
                    continue;
                }
            };
            if !path.as_path().is_file() {
                continue;
            }
            templates.push(Template {
                label: label_for(templates.len()),
                name,
                kind,
                path,
            });
        }
        Ok(templates)
    }

    /// Bind `selection` (or the policy default) to a template of `kind`.
    pub fn resolve(
        &self,
        kind: TemplateKind,
        selection: Option<&str>,
    ) -> Result<Template, TemplateError> {
        let mut templates = self.list(kind)?;
        if templates.is_empty() {
            return Err(TemplateError::Required(kind));
        }

        let selection = selection.map(str::trim).filter(|s| !s.is_empty());
        let Some(selection) = selection else {
            return match self.policy {
                SelectionPolicy::Single if templates.len() == 1 => Ok(templates.remove(0)),
                SelectionPolicy::First => Ok(templates.remove(0)),
                SelectionPolicy::Single | SelectionPolicy::Explicit => {
                    Err(TemplateError::SelectionRequired {
                        kind,
                        count: templates.len(),
                    })
                }
            };
        };

        let index = self.find(&templates, selection)?.ok_or_else(|| TemplateError::NotFound {
            kind,
            selection: selection.to_string(),
        })?;
        Ok(templates.swap_remove(index))
    }

    /// Label first, then file name or stem, then path.
    fn find(&self, templates: &[Template], selection: &str) -> Result<Option<usize>, TemplateError> {
        if let Some(i) = templates
            .iter()
            .position(|t| t.label.eq_ignore_ascii_case(selection))
        {
            return Ok(Some(i));
        }
        if let Some(i) = templates
            .iter()
            .position(|t| t.name == selection || t.stem() == selection)
        {
            return Ok(Some(i));
        }
        if let Some(i) = templates.iter().position(|t| {
            t.name.eq_ignore_ascii_case(selection) || t.stem().eq_ignore_ascii_case(selection)
        }) {
            return Ok(Some(i));
        }

        if selection.contains('/') || selection.contains('\\') || Path::new(selection).is_absolute() {
            let requested = self.guard.validate(selection.replace('\\', "/"))?;
            return Ok(templates.iter().position(|t| t.path == requested));
        }
        Ok(None)
    }
}

fn has_extension(name: &str, extension: &str) -> bool {
    Path::new(name)
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case(extension))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::collections::HashSet;
    use tempfile::TempDir;

    fn setup(files: &[&str]) -> (TempDir, TemplateResolver) {
        let temp = TempDir::new().unwrap();
        let dir = temp.path().join(TEMPLATES_DIR);
        fs::create_dir(&dir).unwrap();
        for file in files {
            fs::write(dir.join(file), b"template").unwrap();
        }
        let guard = PathGuard::new(temp.path()).unwrap();
        (temp, TemplateResolver::new(guard, SelectionPolicy::Single))
    }

    fn with_policy(resolver: TemplateResolver, policy: SelectionPolicy) -> TemplateResolver {
        TemplateResolver { policy, ..resolver }
    }

    #[test]
    fn test_labels() {
        assert_eq!(label_for(0), "A");
        assert_eq!(label_for(25), "Z");
        assert_eq!(label_for(26), "AA");
        assert_eq!(label_for(27), "AB");
        assert_eq!(label_for(26 + 26 * 26 - 1), "ZZ");
        assert_eq!(label_for(26 + 26 * 26), "AAA");
        assert_eq!(label_for(26 + 26 * 26 + 26 * 26 * 26), "T18279");
    }

    #[test]
    fn test_list_filters_and_sorts() {
        let (_temp, resolver) = setup(&[
            "zeta.docx",
            "Alpha.DOCX",
            "beta.docx",
            "style.css",
            "notes.txt",
            ".~lock.beta.docx",
        ]);
        let listed = resolver.list(TemplateKind::StyleDocument).unwrap();
        let names: Vec<_> = listed.iter().map(|t| (t.label.as_str(), t.name.as_str())).collect();
        assert_eq!(names, vec![("A", "Alpha.DOCX"), ("B", "beta.docx"), ("C", "zeta.docx")]);
        assert_eq!(listed[1].relative_path(), "templates/beta.docx");

        let css = resolver.list(TemplateKind::Stylesheet).unwrap();
        assert_eq!(css.len(), 1);
        assert_eq!(css[0].name, "style.css");
    }

    #[test]
    fn test_directories_are_not_templates() {
        let (temp, resolver) = setup(&["one.docx"]);
        fs::create_dir(temp.path().join(TEMPLATES_DIR).join("folder.docx")).unwrap();
        assert_eq!(resolver.list(TemplateKind::StyleDocument).unwrap().len(), 1);
    }

    #[test]
    fn test_missing_directory_lists_nothing() {
        let temp = TempDir::new().unwrap();
        let resolver =
            TemplateResolver::new(PathGuard::new(temp.path()).unwrap(), SelectionPolicy::Single);
        assert!(resolver.list(TemplateKind::StyleDocument).unwrap().is_empty());
        let err = resolver.resolve(TemplateKind::StyleDocument, None).unwrap_err();
        assert!(matches!(err, TemplateError::Required(TemplateKind::StyleDocument)));
        assert_eq!(err.code(), ErrorCode::TemplateRequired);
    }

    #[test]
    fn test_required_even_with_selection() {
        let (_temp, resolver) = setup(&["style.css"]);
        let err = resolver
            .resolve(TemplateKind::StyleDocument, Some("A"))
            .unwrap_err();
        assert!(matches!(err, TemplateError::Required(_)));
    }

    #[test]
    fn test_single_policy() {
        let (_temp, resolver) = setup(&["only.docx"]);
        let template = resolver.resolve(TemplateKind::StyleDocument, None).unwrap();
        assert_eq!(template.name, "only.docx");

        let (_temp, resolver) = setup(&["a.docx", "b.docx"]);
        let err = resolver.resolve(TemplateKind::StyleDocument, None).unwrap_err();
        assert!(matches!(err, TemplateError::SelectionRequired { count: 2, .. }));
        assert_eq!(err.code(), ErrorCode::TemplateSelectionRequired);
        assert!(err.to_string().contains("reference_doc"));
    }

    #[test]
    fn test_explicit_and_first_policies() {
        let (_temp, resolver) = setup(&["b.css", "a.css"]);
        let first = with_policy(resolver.clone(), SelectionPolicy::First);
        assert_eq!(first.resolve(TemplateKind::Stylesheet, None).unwrap().name, "a.css");

        let (_temp, resolver) = setup(&["only.css"]);
        let explicit = with_policy(resolver, SelectionPolicy::Explicit);
        assert!(matches!(
            explicit.resolve(TemplateKind::Stylesheet, None),
            Err(TemplateError::SelectionRequired { count: 1, .. })
        ));
        assert_eq!(
            explicit.resolve(TemplateKind::Stylesheet, Some("a")).unwrap().name,
            "only.css"
        );
    }

    #[test]
    fn test_selection_forms() {
        let (temp, resolver) = setup(&["corporate.docx", "memo.docx"]);
        let kind = TemplateKind::StyleDocument;

        assert_eq!(resolver.resolve(kind, Some("b")).unwrap().name, "memo.docx");
        assert_eq!(resolver.resolve(kind, Some("memo.docx")).unwrap().name, "memo.docx");
        assert_eq!(resolver.resolve(kind, Some("Corporate")).unwrap().name, "corporate.docx");
        assert_eq!(
            resolver.resolve(kind, Some("templates/memo.docx")).unwrap().name,
            "memo.docx"
        );
        let absolute = temp.path().join("templates").join("corporate.docx");
        assert_eq!(
            resolver
                .resolve(kind, Some(absolute.to_str().unwrap()))
                .unwrap()
                .name,
            "corporate.docx"
        );
    }

    #[test]
    fn test_unknown_selection() {
        let (_temp, resolver) = setup(&["corporate.docx"]);
        let err = resolver
            .resolve(TemplateKind::StyleDocument, Some("Q"))
            .unwrap_err();
        assert!(matches!(err, TemplateError::NotFound { .. }));
        assert_eq!(err.code(), ErrorCode::TemplateNotFound);
    }

    #[test]
    fn test_path_selection_outside_root_is_violation() {
        let (_temp, resolver) = setup(&["corporate.docx"]);
        let err = resolver
            .resolve(TemplateKind::StyleDocument, Some("../../etc/passwd"))
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::PathViolation);
        assert_eq!(err.to_string(), "invalid path");
    }

    #[test]
    fn test_path_selection_must_be_a_template() {
        let (temp, resolver) = setup(&["corporate.docx"]);
        fs::write(temp.path().join("other.docx"), b"x").unwrap();
        let err = resolver
            .resolve(TemplateKind::StyleDocument, Some("./other.docx"))
            .unwrap_err();
        assert!(matches!(err, TemplateError::NotFound { .. }));
    }

    #[test]
    fn test_listing_is_deterministic() {
        let (_temp, resolver) = setup(&["c.docx", "a.docx", "b.docx"]);
        let first = resolver.list(TemplateKind::StyleDocument).unwrap();
        let second = resolver.list(TemplateKind::StyleDocument).unwrap();
        assert_eq!(first, second);
    }

    #[cfg(unix)]
    #[test]
    fn test_symlink_out_of_root_is_skipped() {
        let outside = TempDir::new().unwrap();
        let target = outside.path().join("evil.docx");
        fs::write(&target, b"x").unwrap();

        let (temp, resolver) = setup(&["good.docx"]);
        std::os::unix::fs::symlink(&target, temp.path().join(TEMPLATES_DIR).join("evil.docx"))
            .unwrap();
        let listed = resolver.list(TemplateKind::StyleDocument).unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].name, "good.docx");
    }

    proptest! {
        #[test]
        fn prop_labels_unique_and_ordered(count in 1usize..1500) {
            let labels: Vec<String> = (0..count).map(label_for).collect();
            let unique: HashSet<&String> = labels.iter().collect();
            prop_assert_eq!(unique.len(), labels.len());
            for pair in labels.windows(2) {
                let (a, b) = (&pair[0], &pair[1]);
                prop_assert!(a.len() < b.len() || (a.len() == b.len() && a < b));
            }
        }
    }
}
