//! Query and document text canonicalization shared by every recall engine.

use unicode_normalization::{UnicodeNormalization, char::is_combining_mark};

/// Turkish letters kept as-is. After NFKD only `ı` can still appear in
/// precomposed form; the others decompose into a base letter plus a mark.
const EXTRA_LETTERS: [char; 6] = ['ç', 'ğ', 'ı', 'ö', 'ş', 'ü'];

const fn is_separator(c: char) -> bool {
   matches!(c, '_' | '-' | '/' | '\\')
}

fn is_kept(c: char) -> bool {
   c.is_ascii_digit() || c.is_ascii_lowercase() || EXTRA_LETTERS.contains(&c)
}

/// Canonicalizes text into a space-separated token string.
///
/// Decomposes (NFKD), lowercases, turns `_ - / \` into spaces, strips the
/// combining marks left by decomposition and replaces every other character
/// outside `[0-9a-zçğıöşü]` with a space before collapsing whitespace.
/// Idempotent; blank input yields an empty string.
pub fn normalize(text: &str) -> String {
   let mut out = String::with_capacity(text.len());
   let mut pending_space = false;

   for c in text.nfkd().flat_map(char::to_lowercase) {
      if is_combining_mark(c) {
         continue;
      }

      if is_separator(c) || c.is_whitespace() || !is_kept(c) {
         pending_space = true;
         continue;
      }

      if pending_space && !out.is_empty() {
         out.push(' ');
      }
      pending_space = false;
      out.push(c);
   }

   out
}

/// Splits normalized text into its tokens.
pub fn tokens(normalized: &str) -> impl Iterator<Item = &str> {
   normalized.split(' ').filter(|t| !t.is_empty())
}
