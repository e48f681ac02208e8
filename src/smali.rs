/// Comment emitted by the disassembler ahead of constructors and static methods.
pub const DIRECT_METHODS_MARKER: &str = "# direct methods";

pub const DIRECTIVE_PREFIX: &str = ".";
pub const LOCALS: &str = ".locals";
pub const ANNOTATION_OPEN: &str = ".annotation";
pub const ANNOTATION_CLOSE: &str = ".end annotation";
pub const METHOD_OPEN: &str = ".method";
pub const METHOD_END: &str = ".end method";
pub const RETURN: &str = "return";

/// Marker-line substring meaning the class already has an initializer.
pub const INITIALIZER: &str = "init";

/// Placeholder replaced by the sanitised library name.
const LIBRARY_SLOT: &str = "{library}";

/// A static initializer that loads the library. It makes no superclass call,
/// so it is valid whatever the class extends. `.locals 0` is raised to 1 by
/// the locals repair, covering its only temporary `v0`.
const FULL_LOAD_LIBRARY: &str = r#".method static constructor <clinit>()V
    .locals 0

    const-string v0, "{library}"

    invoke-static {v0}, Ljava/lang/System;->loadLibrary(Ljava/lang/String;)V

    return-void
.end method
"#;

/// Just the load call, for constructors that already exist. Uses `v0`, made
/// free by the locals repair.
const PARTIAL_LOAD_LIBRARY: &str = r#"
    const-string v0, "{library}"

    invoke-static {v0}, Ljava/lang/System;->loadLibrary(Ljava/lang/String;)V
"#;

/// Which of the two load-library snippets is inserted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Variant {
    /// No initializer at the marker: a static initializer is added.
    Full,
    /// An initializer exists: only the load call is spliced into it.
    Partial,
}

impl Variant {
    /// Pick the variant from the text of the line after the marker comment.
    pub fn for_marker_line(line: &str) -> Self {
        if line.contains(INITIALIZER) {
            Variant::Partial
        } else {
            Variant::Full
        }
    }

    fn template(self) -> &'static str {
        match self {
            Variant::Full => FULL_LOAD_LIBRARY,
            Variant::Partial => PARTIAL_LOAD_LIBRARY,
        }
    }

    /// Snippet lines with `library` substituted, without terminators.
    pub fn render(self, library: &str) -> Vec<String> {
        self.template()
            .replace(LIBRARY_SLOT, library)
            .lines()
            .map(String::from)
            .collect()
    }

    /// Number of lines [`Variant::render`] produces.
    pub fn line_count(self) -> usize {
        self.template().lines().count()
    }
}

impl std::fmt::Display for Variant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Variant::Full => f.write_str("full"),
            Variant::Partial => f.write_str("partial"),
        }
    }
}

/// Strip the platform decorations from a shared-object name:
/// `libfoo.so` becomes `foo`, `foo` stays `foo`.
pub fn sanitize_library_name(name: &str) -> &str {
    let name = name.strip_prefix("lib").unwrap_or(name);
    name.strip_suffix(".so").unwrap_or(name)
}

pub fn is_blank(line: &str) -> bool {
    line.trim().is_empty()
}

pub fn is_directive(line: &str) -> bool {
    line.trim_start().starts_with(DIRECTIVE_PREFIX)
}

/// `.locals N`; the keyword must be followed by whitespace.
pub fn is_locals(line: &str) -> bool {
    line.trim_start()
        .strip_prefix(LOCALS)
        .is_some_and(|rest| rest.starts_with(char::is_whitespace))
}

pub fn is_annotation_open(line: &str) -> bool {
    line.trim_start()
        .strip_prefix(ANNOTATION_OPEN)
        .is_some_and(|rest| rest.starts_with(char::is_whitespace))
}

pub fn is_annotation_close(line: &str) -> bool {
    line.trim_start().starts_with(ANNOTATION_CLOSE)
}

pub fn is_method_open(line: &str) -> bool {
    line.trim_start()
        .strip_prefix(METHOD_OPEN)
        .is_some_and(|rest| rest.is_empty() || rest.starts_with(char::is_whitespace))
}

pub fn is_method_end(line: &str) -> bool {
    line.contains(METHOD_END)
}

pub fn is_return(line: &str) -> bool {
    line.contains(RETURN)
}
