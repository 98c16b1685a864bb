/*!
Errors raised while compiling a pattern.

A compile error carries the failure class, the offending location in the
pattern source, and a short message. Its [`Display`] form renders the
80-column chunk of the pattern containing the location with a caret
underneath, so errors in long machine-generated patterns stay readable.
*/

use std::fmt;
use std::fmt::{Display, Formatter};
use std::io;

use bstr::BStr;
use thiserror::Error;

use crate::options::Options;
use crate::Location;

/// Classes of pattern compilation failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Malformed pattern syntax: unbalanced `(`, `[`, `"`, bad escapes,
    /// empty subpatterns, stray `}`.
    RegexSyntax,
    /// Invalid `{n,m}` repetition range: overflow or `n > m`.
    RegexRange,
    /// Inverted range inside a bracket list, e.g. `[z-a]`.
    RegexList,
    /// The encoded opcode table exceeds the addressable index range.
    CodeOverflow,
}

/// An error produced while compiling a pattern.
#[derive(Error, Debug)]
pub struct Error {
    kind: ErrorKind,
    message: &'static str,
    loc: usize,
    window: String,
}

impl Error {
    pub(crate) fn new(
        kind: ErrorKind,
        message: &'static str,
        loc: Location,
        rex: &[u8],
    ) -> Self {
        let loc = loc as usize;
        // The 80-column chunk of the pattern that contains `loc`.
        let start = loc / 80 * 80;
        let end = rex.len().min(start + 79);
        let window = if start < rex.len() {
            BStr::new(&rex[start..end]).to_string()
        } else {
            String::new()
        };
        Error { kind, message, loc, window }
    }

    /// The class of the failure.
    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    /// Offset into the pattern source where the failure was detected.
    pub fn loc(&self) -> usize {
        self.loc
    }

    /// Short failure message.
    pub fn message(&self) -> &'static str {
        self.message
    }
}

impl Display for Error {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "pattern error ")?;
        if self.loc != 0 {
            writeln!(f, "at {}", self.loc)?;
            writeln!(f, "{}", self.window)?;
            write!(f, "{:>width$}", "^~~ ", width = self.loc % 80 + 4)?;
        }
        write!(f, "{}", self.message)
    }
}

/// Applies the error policy: display under `w`, raise under `r`.
/// [`ErrorKind::CodeOverflow`] is raised unconditionally; any other error
/// without `r` is swallowed and compilation continues best-effort.
pub(crate) fn report(
    opt: &Options,
    rex: &[u8],
    kind: ErrorKind,
    message: &'static str,
    loc: Location,
) -> Result<(), Error> {
    let err = Error::new(kind, message, loc, rex);
    if opt.w {
        eprintln!("{err}");
    }
    if opt.r || kind == ErrorKind::CodeOverflow {
        return Err(err);
    }
    Ok(())
}

/// Errors returned while saving or loading a compiled pattern.
#[derive(Error, Debug)]
pub enum SerializationError {
    /// The data does not start with the compiled-pattern magic.
    #[error("not a redfa compiled pattern file")]
    InvalidFormat,

    /// The data has the right magic but the payload is corrupted.
    #[error("invalid compiled pattern file")]
    InvalidEncoding(#[from] bincode::Error),

    /// I/O error while reading or writing serialized data.
    #[error(transparent)]
    IoError(#[from] io::Error),
}

#[cfg(test)]
mod tests {
    use super::{Error, ErrorKind};

    #[test]
    fn display_renders_window_and_caret() {
        let err = Error::new(ErrorKind::RegexList, "inverted character range in list", 2, b"[z-a]");
        let text = err.to_string();
        assert!(text.contains("at 2"));
        assert!(text.contains("[z-a]"));
        assert!(text.ends_with("^~~ inverted character range in list"));
    }

    #[test]
    fn display_without_location() {
        let err = Error::new(ErrorKind::CodeOverflow, "out of code memory", 0, b"abc");
        assert_eq!(err.to_string(), "pattern error out of code memory");
    }

    #[test]
    fn window_is_chunked_to_80_columns() {
        let mut rex = vec![b'a'; 200];
        rex[100] = b'!';
        let err = Error::new(ErrorKind::RegexSyntax, "test", 100, &rex);
        // The second 80-column chunk holds locations 80..159.
        assert_eq!(err.to_string().lines().nth(1).unwrap().len(), 79);
    }
}
