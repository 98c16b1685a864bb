/*!
Compile-time options for the pattern compiler.

Options are given as a compact string, e.g. `"imx"` or
`"r;n=lexer;f=lexer.gv,lexer.h"`. Single letters toggle behavior, `e=C`
rebinds the escape character (`e=;` disables escape processing), and
`f=`/`n=` route a list of names: names containing a dot become output
files, any other name becomes the generated table name.
*/

/// Options controlling pattern compilation.
///
/// Every field corresponds to one option letter. Unknown letters are
/// ignored, so option strings can be shared with front ends that accept
/// a superset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Options {
    /// Byte-raw mode: no escape processing inside bracket lists.
    pub b: bool,
    /// Case-insensitive matching.
    pub i: bool,
    /// Lexer mode: `/` lookahead operator, `/* */` comments under `x`.
    pub l: bool,
    /// Multi-line: `^` and `$` match at line boundaries.
    pub m: bool,
    /// `"…"` quotes a literal string.
    pub q: bool,
    /// Raise errors to the caller.
    pub r: bool,
    /// Dot-all: `.` matches any byte including newline.
    pub s: bool,
    /// Write errors to stderr.
    pub w: bool,
    /// Free-spacing: whitespace and `#` comments are ignored.
    pub x: bool,
    /// Escape character, `0` when escapes are disabled.
    pub e: u8,
    /// Output files collected from `f=`/`n=` lists.
    pub f: Vec<String>,
    /// Generated table name collected from `f=`/`n=` lists.
    pub n: String,
}

impl Default for Options {
    fn default() -> Self {
        Options {
            b: false,
            i: false,
            l: false,
            m: false,
            q: false,
            r: false,
            s: false,
            w: false,
            x: false,
            e: b'\\',
            f: Vec::new(),
            n: String::new(),
        }
    }
}

impl Options {
    /// Parses an option string. Never fails; unrecognized letters are
    /// skipped.
    pub fn parse(opt: &str) -> Options {
        let mut options = Options::default();
        let s = opt.as_bytes();
        let at = |k: usize| s.get(k).copied().unwrap_or(0);
        let mut k = 0;
        while k < s.len() {
            match s[k] {
                b'b' => options.b = true,
                b'i' => options.i = true,
                b'l' => options.l = true,
                b'm' => options.m = true,
                b'q' => options.q = true,
                b'r' => options.r = true,
                b's' => options.s = true,
                b'w' => options.w = true,
                b'x' => options.x = true,
                b'e' => {
                    k += usize::from(at(k + 1) == b'=') + 1;
                    options.e = match at(k) {
                        b';' | 0 => 0,
                        c => c,
                    };
                }
                b'f' | b'n' => {
                    // A list of names terminated by `;` or the end of the
                    // string, separated by commas or whitespace. Names with
                    // a dot are files, the rest set the table name.
                    let mut lo = k + usize::from(at(k + 1) == b'=');
                    let mut t = lo;
                    while at(lo) != b';' && at(lo) != 0 {
                        let c = at(t);
                        if c == b',' || c == b';' || c == 0 || c.is_ascii_whitespace() {
                            if t > lo + 1 {
                                let name = String::from_utf8_lossy(&s[lo + 1..t]).into_owned();
                                if name.contains('.') {
                                    options.f.push(name);
                                } else {
                                    options.n = name;
                                }
                            }
                            lo = t;
                        }
                        t += 1;
                    }
                    k = lo;
                }
                _ => {}
            }
            k += 1;
        }
        options
    }
}
