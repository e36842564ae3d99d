//! Rewriting of legacy set syntax into canonical pattern expressions.
//!
//! Older signature files write byte sets the way many regex dialects do:
//! `[00-7f]` for a range and `^[00]` (or `[^00]`) for an inverted set. The
//! canonical grammar uses `[00:7f]` and `[!00]`. Everything else, including any
//! text inside `'...'` or `` `...` ``, is copied unchanged.

use crate::ir::SignatureExpression;

const QUOTE: char = '\'';
const BACKTICK: char = '`';
const OPEN_SET: char = '[';
const CLOSE_SET: char = ']';

/// Normalize a raw pattern expression.
///
/// The rewrite is total and idempotent: malformed input is passed through
/// (the compiler reports it), and normalizing a canonical expression returns it
/// unchanged.
///
/// # Examples
///
/// ```rust
/// use container_sig_engine::compiler::normalize;
///
/// assert_eq!(normalize("[00-7f]").as_str(), "[00:7f]");
/// assert_eq!(normalize("^[00]").as_str(), "[!00]");
/// assert_eq!(normalize("[!00]").as_str(), "[!00]");
/// ```
pub fn normalize(raw: &str) -> SignatureExpression {
    let chars: Vec<char> = raw.chars().collect();
    let mut out = String::with_capacity(raw.len() + 2);

    let mut in_quote = false;
    let mut in_backtick = false;
    let mut set_depth = 0usize;
    let mut i = 0;

    while i < chars.len() {
        let ch = chars[i];

        if in_quote || in_backtick {
            if ch == QUOTE && in_quote {
                in_quote = false;
            } else if ch == BACKTICK && in_backtick {
                in_backtick = false;
            }
            out.push(ch);
            i += 1;
            continue;
        }

        match ch {
            QUOTE => in_quote = true,
            BACKTICK => in_backtick = true,
            '^' if set_depth == 0
                && chars.get(i + 1) == Some(&OPEN_SET)
                && chars.get(i + 2) != Some(&'!') =>
            {
                // `^[..]` is an inverted set, written `[!..]`
                out.push(OPEN_SET);
                out.push('!');
                set_depth += 1;
                i += 2;
                continue;
            }
            '^' if set_depth > 0 && i > 0 && chars[i - 1] == OPEN_SET => {
                out.push('!');
                i += 1;
                continue;
            }
            '-' if set_depth > 0 => {
                out.push(':');
                i += 1;
                continue;
            }
            OPEN_SET => set_depth += 1,
            CLOSE_SET => set_depth = set_depth.saturating_sub(1),
            _ => {}
        }

        out.push(ch);
        i += 1;
    }

    SignatureExpression::from_canonical(out)
}
