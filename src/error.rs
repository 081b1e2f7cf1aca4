use thiserror::Error;

/// The result type used throughout this crate for encode/decode operations.
pub type Result<T> = std::result::Result<T, CodecError>;

/// Error type for all encoding and decoding operations in this crate.
///
/// Every variant carries a `path` locating the failure inside the decoded
/// structure (`<root>.user[2].name`); fields decoded without a schema render
/// as `<tag:N>`. Errors produced below the schema layer start out at
/// `<root>` and are re-pathed as they bubble up.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CodecError {
    /// The buffer ended in the middle of a value.
    #[error("buffer ended early at {path} (offset {offset})")]
    Truncated { path: String, offset: usize },

    /// A head carried a type code outside 0..=13, or the inner head of a
    /// SimpleList was malformed.
    #[error("invalid wire type {type_id} at {path} (offset {offset})")]
    BadType {
        path: String,
        offset: usize,
        type_id: u8,
    },

    /// The observed wire type (or runtime value, on encode) cannot populate
    /// the declared field kind.
    #[error("{found} cannot populate {expected} at {path}")]
    TypeMismatch {
        path: String,
        expected: String,
        found: String,
    },

    /// Integer narrowing failed, or a tag left the 0..=255 range.
    #[error("value {value} does not fit {target} at {path}")]
    OutOfRange {
        path: String,
        value: i64,
        target: &'static str,
    },

    /// The recursion limit was hit while descending into nested containers.
    #[error("nesting deeper than {limit} at {path}")]
    DepthExceeded { path: String, limit: usize },

    /// A declared container/string/bytes length exceeded the configured
    /// limit or the remaining buffer.
    #[error("declared length {declared} exceeds limit {limit} at {path}")]
    LimitExceeded {
        path: String,
        declared: usize,
        limit: usize,
    },

    /// A tag with no slot in the schema was seen while `forbid_unknown` is
    /// set.
    #[error("unknown tag {tag} at {path}")]
    UnknownTag { path: String, tag: u8 },

    /// The same tag was routed to a slot twice within one struct.
    #[error("tag {tag} appears more than once at {path}")]
    DuplicateTag { path: String, tag: u8 },

    /// A required slot was still unset when the struct ended.
    #[error("required field '{field}' (tag {tag}) missing at {path}")]
    MissingRequired {
        path: String,
        field: String,
        tag: u8,
    },

    /// A field constraint (`gt`/`lt`/`ge`/`le`/`min_len`/`max_len`/
    /// `pattern`) or another value-level check failed.
    #[error("validation failed at {path}: {reason}")]
    Validation { path: String, reason: String },

    /// A schema registration or resolution problem surfaced during an
    /// encode/decode call.
    #[error("schema error: {0}")]
    Schema(#[from] SchemaError),
}

impl CodecError {
    /// The structural path at which this error occurred.
    pub fn path(&self) -> &str {
        match self {
            Self::Truncated { path, .. }
            | Self::BadType { path, .. }
            | Self::TypeMismatch { path, .. }
            | Self::OutOfRange { path, .. }
            | Self::DepthExceeded { path, .. }
            | Self::LimitExceeded { path, .. }
            | Self::UnknownTag { path, .. }
            | Self::DuplicateTag { path, .. }
            | Self::MissingRequired { path, .. }
            | Self::Validation { path, .. } => path,
            Self::Schema(_) => "<root>",
        }
    }

    fn path_slot(&mut self) -> Option<&mut String> {
        match self {
            Self::Truncated { path, .. }
            | Self::BadType { path, .. }
            | Self::TypeMismatch { path, .. }
            | Self::OutOfRange { path, .. }
            | Self::DepthExceeded { path, .. }
            | Self::LimitExceeded { path, .. }
            | Self::UnknownTag { path, .. }
            | Self::DuplicateTag { path, .. }
            | Self::MissingRequired { path, .. }
            | Self::Validation { path, .. } => Some(path),
            Self::Schema(_) => None,
        }
    }

    /// Attach `path` to an error that has not yet been located.
    ///
    /// Errors raised by the raw reader/writer start at `<root>`; the first
    /// layer that knows the logical position fills it in. An already
    /// located error is left untouched, so the innermost annotation wins.
    pub(crate) fn at(mut self, path: &FieldPath) -> Self {
        if let Some(slot) = self.path_slot() {
            if slot.is_empty() || slot.as_str() == FieldPath::ROOT {
                *slot = path.render();
            }
        }
        self
    }
}

/// Error type for schema registration and compilation.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SchemaError {
    /// Two fields of one struct share a tag.
    #[error("duplicate tag {tag} in struct '{schema}' (fields '{first}' and '{second}')")]
    DuplicateTag {
        schema: String,
        tag: u16,
        first: String,
        second: String,
    },

    /// Two fields of one struct share a name.
    #[error("duplicate field name '{name}' in struct '{schema}'")]
    DuplicateName { schema: String, name: String },

    /// A field tag falls outside the protocol's 0..=255 range.
    #[error("tag {tag} out of range 0..=255 for field '{field}' in struct '{schema}'")]
    TagOutOfRange {
        schema: String,
        field: String,
        tag: u16,
    },

    /// A `pattern` constraint failed to compile.
    #[error("invalid pattern for field '{field}': {reason}")]
    InvalidPattern { field: String, reason: String },

    /// An encode/decode call referenced a schema id the registry has never
    /// handed out.
    #[error("schema id {id} is not registered")]
    UnknownId { id: u32 },

    /// A schema was declared (e.g. as a forward reference) but never
    /// defined before use.
    #[error("schema '{name}' is declared but not defined")]
    Undefined { name: String },

    /// `define` was called twice for the same id.
    #[error("schema '{name}' is already defined")]
    AlreadyDefined { name: String },

    /// A record accessor used a field name the schema does not contain.
    #[error("struct '{schema}' has no field named '{name}'")]
    UnknownField { schema: String, name: String },
}

/// A stack of path segments tracked while walking a structure.
///
/// Rendering is deferred until an error actually needs the string.
#[derive(Debug, Clone, Default)]
pub(crate) struct FieldPath {
    segments: Vec<PathSegment>,
}

#[derive(Debug, Clone)]
pub(crate) enum PathSegment {
    Field(String),
    Tag(u8),
    Index(usize),
    Key(String),
}

impl FieldPath {
    pub(crate) const ROOT: &'static str = "<root>";

    pub(crate) fn root() -> Self {
        Self::default()
    }

    pub(crate) fn push_field(&mut self, name: &str) {
        self.segments.push(PathSegment::Field(name.to_owned()));
    }

    pub(crate) fn push_tag(&mut self, tag: u8) {
        self.segments.push(PathSegment::Tag(tag));
    }

    pub(crate) fn push_index(&mut self, index: usize) {
        self.segments.push(PathSegment::Index(index));
    }

    pub(crate) fn push_key(&mut self, key: impl Into<String>) {
        self.segments.push(PathSegment::Key(key.into()));
    }

    pub(crate) fn pop(&mut self) {
        self.segments.pop();
    }

    pub(crate) fn render(&self) -> String {
        use std::fmt::Write;

        let mut out = String::from(Self::ROOT);
        for segment in &self.segments {
            match segment {
                PathSegment::Field(name) => {
                    let _ = write!(out, ".{name}");
                }
                PathSegment::Tag(tag) => {
                    let _ = write!(out, ".<tag:{tag}>");
                }
                PathSegment::Index(index) => {
                    let _ = write!(out, "[{index}]");
                }
                PathSegment::Key(key) => {
                    let _ = write!(out, "[{key}]");
                }
            }
        }
        out
    }
}
