use std::path::PathBuf;

use tracing::{debug, info, warn};

use crate::buffer::LineBuffer;
use crate::document::Document;
use crate::error::Error;
use crate::smali::{self, Variant};

/// Default number of lines searched for `.end method` before falling back to
/// scanning the rest of the document.
pub const END_METHOD_WINDOW: usize = 100;

/// A non-fatal problem met while patching. The document is still persisted.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Warning {
    NoLocalsDeclaration,
    UnparsableLocals { line: usize, value: String },
    LocalsOverflow { line: usize, value: u32 },
    PersistFailed { path: PathBuf, reason: String },
}

impl std::fmt::Display for Warning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Warning::NoLocalsDeclaration => {
                f.write_str("couldn't determine any .locals for the target constructor")
            }
            Warning::UnparsableLocals { line, value } => write!(
                f,
                "couldn't parse .locals value {value:?} on line {} for the injected constructor",
                line + 1
            ),
            Warning::LocalsOverflow { line, value } => write!(
                f,
                ".locals {value} on line {} can't be raised any further",
                line + 1
            ),
            Warning::PersistFailed { path, reason } => {
                write!(f, "failed to write smali file {}: {reason}", path.display())
            }
        }
    }
}

/// The `.locals` line that was repaired.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub struct LocalsChange {
    pub line: usize,
    pub before: u32,
    pub after: u32,
}

/// What a successful injection did to one document.
#[derive(Debug, Clone, serde::Serialize)]
pub struct InjectionReport {
    pub path: PathBuf,
    pub library: String,
    pub variant: Variant,
    pub anchor: usize,
    pub inserted_at: usize,
    pub inserted_lines: usize,
    pub locals: Option<LocalsChange>,
    pub warnings: Vec<Warning>,
}

/// `[start, end)` bounds of one method body. `terminator` is the
/// `.end method` line; `end` stops before a trailing return.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MethodRegion {
    pub start: usize,
    pub end: usize,
    pub terminator: usize,
}

impl MethodRegion {
    /// Adjust for `count` lines inserted at `at`.
    fn shifted(self, at: usize, count: usize) -> Self {
        let bump = |i: usize| if i >= at { i + count } else { i };
        Self {
            start: if self.start > at { self.start + count } else { self.start },
            end: bump(self.end),
            terminator: bump(self.terminator),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegionError {
    #[error("couldn't find the end of the existing constructor")]
    NoTerminator,
    #[error("method starting on line {} opens another method on line {} before `.end method`", start + 1, nested + 1)]
    NestedMethod { start: usize, nested: usize },
}

/// Index of the first `# direct methods` comment.
pub fn find_anchor(buf: &LineBuffer) -> Option<usize> {
    buf.find_from(0, |line| line.contains(smali::DIRECT_METHODS_MARKER))
}

/// Walk forward from `start` to the first executable line and return the
/// index just before it.
///
/// `.locals`, other directives and blank lines are stepped over; annotation
/// bodies are skipped whole, so the result never points inside one.
pub fn find_inject_point(buf: &LineBuffer, start: usize) -> Option<usize> {
    let mut in_annotation = false;
    for (pos, line) in buf.iter().skip(start + 1) {
        if smali::is_blank(line) || smali::is_locals(line) {
            continue;
        }
        if smali::is_annotation_open(line) {
            in_annotation = true;
            continue;
        }
        if smali::is_annotation_close(line) {
            in_annotation = false;
            continue;
        }
        if in_annotation {
            continue;
        }
        if !smali::is_directive(line) {
            return Some(pos - 1);
        }
    }
    None
}

/// Bound the method that starts at `start`.
///
/// The terminator is searched within `window` lines first, then in the rest
/// of the document. Another `.method` before the terminator means the input
/// can't be bounded safely.
pub fn find_method_region(
    buf: &LineBuffer,
    start: usize,
    window: usize,
) -> Result<MethodRegion, RegionError> {
    let bounded_end = start.saturating_add(window);
    let terminator = buf
        .scan_bounded(start, bounded_end, smali::is_method_end)
        .or_else(|| buf.find_from(bounded_end, smali::is_method_end))
        .ok_or(RegionError::NoTerminator)?;

    if let Some(nested) = buf.scan_bounded(start + 1, terminator, smali::is_method_open) {
        return Err(RegionError::NestedMethod { start, nested });
    }

    let mut end = terminator;
    if terminator > start && buf.line(terminator - 1).is_some_and(smali::is_return) {
        end -= 1;
    }
    Ok(MethodRegion {
        start,
        end,
        terminator,
    })
}

/// Increment the first `.locals` declaration inside `region`.
pub fn repair_locals(buf: &mut LineBuffer, region: MethodRegion) -> Result<LocalsChange, Warning> {
    let line = buf
        .scan_bounded(region.start, region.end, smali::is_locals)
        .ok_or(Warning::NoLocalsDeclaration)?;
    let content = buf.line(line).unwrap_or_default().to_string();
    let token = content.split_whitespace().last().unwrap_or_default();
    let before: u32 = token.parse().map_err(|_| Warning::UnparsableLocals {
        line,
        value: token.to_string(),
    })?;
    let after = before
        .checked_add(1)
        .ok_or(Warning::LocalsOverflow {
            line,
            value: before,
        })?;

    let at = content.rfind(token).unwrap_or(content.len());
    let repaired = format!("{}{after}{}", &content[..at], &content[at + token.len()..]);
    buf.replace_at(line, &repaired);
    Ok(LocalsChange {
        line,
        before,
        after,
    })
}

/// Patches documents with a load-library call.
#[derive(Debug, Clone)]
pub struct Injector {
    window: usize,
}

impl Default for Injector {
    fn default() -> Self {
        Self {
            window: END_METHOD_WINDOW,
        }
    }
}

impl Injector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Override the `.end method` search window.
    pub fn with_window(mut self, window: usize) -> Self {
        self.window = window.max(1);
        self
    }

    /// Insert the load call for `library` and repair the locals count.
    ///
    /// Not idempotent: a second call adds a second snippet and bumps the
    /// locals again. Structural failures are detected before anything is
    /// inserted, so a failed call leaves the buffer unchanged.
    pub fn inject(&self, doc: &mut Document, library: &str) -> Result<InjectionReport, Error> {
        let path = doc.path().to_path_buf();
        let library = smali::sanitize_library_name(library).to_string();
        info!("injecting loadLibrary(\"{library}\") into {}", path.display());

        let buf = doc.buffer_mut();
        let anchor = find_anchor(buf).ok_or_else(|| Error::NoAnchor { path: path.clone() })?;
        // inject right below the comment
        let marker = anchor + 1;
        let variant = Variant::for_marker_line(buf.line(marker).unwrap_or_default());
        let malformed = |e: RegionError| Error::MalformedMethod {
            path: path.clone(),
            reason: e.to_string(),
        };

        let (inserted_at, existing) = match variant {
            Variant::Partial => {
                debug!("<init> is present in entry activity");
                let region = find_method_region(buf, marker, self.window).map_err(malformed)?;
                let point = find_inject_point(buf, marker)
                    .filter(|&p| p < region.terminator)
                    .ok_or_else(|| Error::UnresolvedInjectionPoint { path: path.clone() })?;
                // never ahead of the directive the prologue ends on
                let at = if buf.line(point).is_some_and(smali::is_directive) {
                    point + 1
                } else {
                    point
                };
                (at, Some(region))
            }
            Variant::Full => {
                debug!("<init> is NOT present in entry activity");
                (marker.min(buf.len()), None)
            }
        };

        let inserted_lines = buf.insert_before(inserted_at, variant.render(&library));
        debug!(
            variant = %variant,
            line = inserted_at + 1,
            count = inserted_lines,
            "inserted snippet"
        );

        let region = match existing {
            Some(region) => region.shifted(inserted_at, inserted_lines),
            None => find_method_region(buf, marker, self.window).map_err(malformed)?,
        };

        let mut warnings = Vec::new();
        let locals = match repair_locals(buf, region) {
            Ok(change) => {
                debug!(
                    "updated .locals {} -> {} on line {}",
                    change.before,
                    change.after,
                    change.line + 1
                );
                Some(change)
            }
            Err(warning) => {
                warn!("{warning}");
                warnings.push(warning);
                None
            }
        };

        Ok(InjectionReport {
            path,
            library,
            variant,
            anchor,
            inserted_at,
            inserted_lines,
            locals,
            warnings,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn buf(lines: &[&str]) -> LineBuffer {
        let mut text = lines.join("\n");
        text.push('\n');
        LineBuffer::parse(&text)
    }

    fn doc(lines: &[&str]) -> Document {
        Document::from_buffer(PathBuf::from("Test.smali"), buf(lines))
    }

    const CTOR: &[&str] = &[
        ".class public Lcom/example/MainActivity;",
        ".super Landroid/app/Activity;",
        "",
        "# direct methods",
        ".method public constructor <init>()V",
        "    .locals 1",
        "",
        "    invoke-direct {p0}, Landroid/app/Activity;-><init>()V",
        "",
        "    return-void",
        ".end method",
    ];

    #[test]
    fn anchor_is_first_direct_methods_comment() {
        let b = buf(&["a", "# direct methods", "b", "# direct methods"]);
        assert_eq!(find_anchor(&b), Some(1));
        assert_eq!(find_anchor(&buf(&["# virtual methods"])), None);
    }

    #[test]
    fn inject_point_skips_prologue() {
        let b = buf(CTOR);
        assert_eq!(find_inject_point(&b, 4), Some(6));
    }

    #[test]
    fn inject_point_at_start_when_no_prologue() {
        let b = buf(&[
            ".method public constructor <init>()V",
            "    invoke-direct {p0}, Ljava/lang/Object;-><init>()V",
            ".end method",
        ]);
        assert_eq!(find_inject_point(&b, 0), Some(0));
    }

    #[test]
    fn inject_point_skips_annotation_bodies() {
        let b = buf(&[
            ".method public constructor <init>()V",
            "    .locals 0",
            "    .annotation build Landroidx/annotation/Keep;",
            "        value = something",
            "    .end annotation",
            "",
            "    return-void",
            ".end method",
        ]);
        assert_eq!(find_inject_point(&b, 0), Some(5));
    }

    #[test]
    fn inject_point_skips_param_blocks() {
        let b = buf(&[
            ".method public constructor <init>(I)V",
            "    .locals 0",
            "    .param p1, \"x\"",
            "    .annotation runtime Ljava/lang/Deprecated;",
            "    .end annotation",
            "    .end param",
            "    return-void",
            ".end method",
        ]);
        assert_eq!(find_inject_point(&b, 0), Some(5));
    }

    #[test]
    fn inject_point_unresolved_without_statements() {
        let b = buf(&[".method foo()V", "    .locals 0", "", ".end method"]);
        assert_eq!(find_inject_point(&b, 0), None);
    }

    #[test]
    fn region_stops_before_return() {
        let b = buf(CTOR);
        let region = find_method_region(&b, 4, END_METHOD_WINDOW).unwrap();
        assert_eq!(region.terminator, 10);
        assert_eq!(region.end, 9);
    }

    #[test]
    fn region_without_return_ends_at_terminator() {
        let b = buf(&[".method foo()V", "    .locals 0", "    throw v0", ".end method"]);
        let region = find_method_region(&b, 0, END_METHOD_WINDOW).unwrap();
        assert_eq!(region.end, 3);
        assert_eq!(region.terminator, 3);
    }

    #[test]
    fn region_falls_back_past_window() {
        let mut lines = vec![".method foo()V", "    .locals 0"];
        lines.extend(std::iter::repeat_n("    nop", 10));
        lines.push(".end method");
        let b = buf(&lines);
        let region = find_method_region(&b, 0, 3).unwrap();
        assert_eq!(region.terminator, 12);
    }

    #[test]
    fn region_missing_terminator() {
        let b = buf(&[".method foo()V", "    .locals 0", "    return-void"]);
        assert_eq!(
            find_method_region(&b, 0, END_METHOD_WINDOW),
            Err(RegionError::NoTerminator)
        );
    }

    #[test]
    fn region_with_nested_method_is_malformed() {
        let b = buf(&[
            ".method foo()V",
            "    .locals 0",
            ".method bar()V",
            "    return-void",
            ".end method",
        ]);
        assert_eq!(
            find_method_region(&b, 0, END_METHOD_WINDOW),
            Err(RegionError::NestedMethod {
                start: 0,
                nested: 2
            })
        );
    }

    #[test]
    fn repair_bumps_first_locals_only() {
        let mut b = buf(&[
            ".method foo()V",
            "    .locals 12",
            "    .locals 7",
            "    return-void",
            ".end method",
        ]);
        let region = find_method_region(&b, 0, END_METHOD_WINDOW).unwrap();
        let change = repair_locals(&mut b, region).unwrap();
        assert_eq!(
            change,
            LocalsChange {
                line: 1,
                before: 12,
                after: 13
            }
        );
        assert_eq!(b.line(1), Some("    .locals 13"));
        assert_eq!(b.line(2), Some("    .locals 7"));
    }

    #[test]
    fn repair_warns_without_locals() {
        let mut b = buf(&[".method foo()V", "    return-void", ".end method"]);
        let region = find_method_region(&b, 0, END_METHOD_WINDOW).unwrap();
        assert_eq!(
            repair_locals(&mut b, region),
            Err(Warning::NoLocalsDeclaration)
        );
    }

    #[test]
    fn repair_warns_on_unparsable_value() {
        let mut b = buf(&[".method foo()V", "    .locals 0x2", "    return-void", ".end method"]);
        let region = find_method_region(&b, 0, END_METHOD_WINDOW).unwrap();
        assert_eq!(
            repair_locals(&mut b, region),
            Err(Warning::UnparsableLocals {
                line: 1,
                value: "0x2".into()
            })
        );
        assert_eq!(b.line(1), Some("    .locals 0x2"));
    }

    #[test]
    fn repair_warns_when_locals_would_overflow() {
        let mut b = buf(&[
            ".method foo()V",
            "    .locals 4294967295",
            "    return-void",
            ".end method",
        ]);
        let region = find_method_region(&b, 0, END_METHOD_WINDOW).unwrap();
        assert_eq!(
            repair_locals(&mut b, region),
            Err(Warning::LocalsOverflow {
                line: 1,
                value: u32::MAX
            })
        );
        assert_eq!(b.line(1), Some("    .locals 4294967295"));
    }

    #[test]
    fn max_locals_constructor_is_patched_with_warning() {
        let mut d = doc(&[
            "# direct methods",
            ".method public constructor <init>()V",
            "    .locals 4294967295",
            "",
            "    invoke-direct {p0}, Ljava/lang/Object;-><init>()V",
            "    return-void",
            ".end method",
        ]);
        let report = Injector::new().inject(&mut d, "foo").unwrap();
        assert_eq!(report.locals, None);
        assert_eq!(
            report.warnings,
            vec![Warning::LocalsOverflow {
                line: 2,
                value: u32::MAX
            }]
        );
        assert_eq!(d.buffer().line(4), Some(r#"    const-string v0, "foo""#));
    }

    #[test]
    fn partial_injection_lands_after_prologue() {
        let mut d = doc(CTOR);
        let before = d.buffer().len();
        let report = Injector::new().inject(&mut d, "libfoo.so").unwrap();

        assert_eq!(report.variant, Variant::Partial);
        assert_eq!(report.library, "foo");
        assert_eq!(report.inserted_at, 6);
        assert_eq!(d.buffer().len(), before + Variant::Partial.line_count());
        assert_eq!(d.buffer().line(5), Some("    .locals 2"));
        assert_eq!(d.buffer().line(7), Some(r#"    const-string v0, "foo""#));
        assert!(report.warnings.is_empty());
    }

    #[test]
    fn directive_directly_before_statement_keeps_snippet_below_it() {
        let mut d = doc(&[
            "# direct methods",
            ".method public constructor <init>()V",
            "    .locals 0",
            "    invoke-direct {p0}, Ljava/lang/Object;-><init>()V",
            "    return-void",
            ".end method",
        ]);
        let report = Injector::new().inject(&mut d, "foo").unwrap();
        assert_eq!(report.inserted_at, 3);
        assert_eq!(d.buffer().line(2), Some("    .locals 1"));
        assert_eq!(
            d.buffer().line(7),
            Some("    invoke-direct {p0}, Ljava/lang/Object;-><init>()V")
        );
    }

    #[test]
    fn statement_right_after_method_header_goes_below_header() {
        let mut d = doc(&[
            "# direct methods",
            ".method public constructor <init>()V",
            "    invoke-direct {p0}, Ljava/lang/Object;-><init>()V",
            "    return-void",
            ".end method",
        ]);
        let report = Injector::new().inject(&mut d, "foo").unwrap();

        assert_eq!(report.variant, Variant::Partial);
        assert_eq!(report.inserted_at, 2);
        let b = d.buffer();
        assert_eq!(b.line(1), Some(".method public constructor <init>()V"));
        assert_eq!(b.line(3), Some(r#"    const-string v0, "foo""#));
        assert_eq!(
            b.line(6),
            Some("    invoke-direct {p0}, Ljava/lang/Object;-><init>()V")
        );
        assert_eq!(report.warnings, vec![Warning::NoLocalsDeclaration]);
    }

    #[test]
    fn full_injection_adds_static_initializer() {
        let mut d = doc(&[
            ".class public Lcom/example/Main;",
            "",
            "# direct methods",
            ".method public static helper()V",
            "    .locals 0",
            "    return-void",
            ".end method",
        ]);
        let report = Injector::new().inject(&mut d, "libgadget.so").unwrap();

        assert_eq!(report.variant, Variant::Full);
        assert_eq!(report.inserted_at, 3);
        let b = d.buffer();
        assert_eq!(b.line(3), Some(".method static constructor <clinit>()V"));
        assert_eq!(b.line(4), Some("    .locals 1"));
        assert_eq!(b.line(6), Some(r#"    const-string v0, "gadget""#));
        assert_eq!(b.line(11), Some(".end method"));
        // the existing method is untouched
        assert_eq!(b.line(12), Some(".method public static helper()V"));
        assert_eq!(b.line(13), Some("    .locals 0"));
        assert_eq!(report.locals.map(|c| c.line), Some(4));
    }

    #[test]
    fn full_injection_leaves_later_constructor_alone() {
        let mut d = doc(&[
            ".class public final Lcom/example/Main;",
            ".super Landroidx/appcompat/app/AppCompatActivity;",
            "",
            "# direct methods",
            ".method public static synthetic $r8$lambda$abc()V",
            "    .locals 0",
            "    return-void",
            ".end method",
            "",
            ".method public constructor <init>()V",
            "    .locals 0",
            "",
            "    invoke-direct {p0}, Landroidx/appcompat/app/AppCompatActivity;-><init>()V",
            "",
            "    return-void",
            ".end method",
        ]);
        let report = Injector::new().inject(&mut d, "foo").unwrap();
        let text = d.buffer().to_text();

        assert_eq!(report.variant, Variant::Full);
        assert_eq!(text.matches("constructor <init>()V").count(), 1);
        assert_eq!(text.matches("constructor <clinit>()V").count(), 1);
        assert!(!text.contains("Landroid/app/Activity;-><init>"));
    }

    #[test]
    fn no_anchor_is_fatal_and_untouched() {
        let mut d = doc(&[".class public LA;", "# virtual methods"]);
        let original = d.buffer().clone();
        let err = Injector::new().inject(&mut d, "foo").unwrap_err();
        assert!(matches!(err, Error::NoAnchor { .. }));
        assert_eq!(d.buffer(), &original);
    }

    #[test]
    fn missing_terminator_is_malformed_and_untouched() {
        let mut d = doc(&[
            "# direct methods",
            ".method public constructor <init>()V",
            "    .locals 0",
            "",
            "    return-void",
        ]);
        let original = d.buffer().clone();
        let err = Injector::new().inject(&mut d, "foo").unwrap_err();
        assert!(matches!(err, Error::MalformedMethod { .. }));
        assert_eq!(d.buffer(), &original);
    }

    #[test]
    fn empty_constructor_is_unresolved() {
        let mut d = doc(&[
            "# direct methods",
            ".method public constructor <init>()V",
            "    .locals 0",
            ".end method",
        ]);
        let err = Injector::new().inject(&mut d, "foo").unwrap_err();
        assert!(matches!(err, Error::UnresolvedInjectionPoint { .. }));
    }

    #[test]
    fn missing_locals_is_a_warning() {
        let mut d = doc(&[
            "# direct methods",
            ".method public constructor <init>()V",
            "",
            "    invoke-direct {p0}, Ljava/lang/Object;-><init>()V",
            "    return-void",
            ".end method",
        ]);
        let report = Injector::new().inject(&mut d, "foo").unwrap();
        assert_eq!(report.locals, None);
        assert_eq!(report.warnings, vec![Warning::NoLocalsDeclaration]);
    }
}
