//! Reversible filename encoding.
//!
//! Characters the remote cannot store are swapped for look-alike code points
//! (fullwidth punctuation, control pictures). A literal look-alike in a local
//! name that would otherwise be decoded is prefixed with [`QUOTE`].

use std::fmt;
use std::str::FromStr;

use thiserror::Error;

pub const QUOTE: char = '\u{201B}';

const FLAG_NAMES: [(&str, u16); 8] = [
    ("Zero", Encoder::ZERO),
    ("Slash", Encoder::SLASH),
    ("BackSlash", Encoder::BACK_SLASH),
    ("Ctl", Encoder::CTL),
    ("Del", Encoder::DEL),
    ("Dot", Encoder::DOT),
    ("LeftSpace", Encoder::LEFT_SPACE),
    ("RightSpace", Encoder::RIGHT_SPACE),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Encoder {
    bits: u16,
}

impl Encoder {
    pub const ZERO: u16 = 1 << 0;
    pub const SLASH: u16 = 1 << 1;
    pub const BACK_SLASH: u16 = 1 << 2;
    pub const CTL: u16 = 1 << 3;
    pub const DEL: u16 = 1 << 4;
    pub const DOT: u16 = 1 << 5;
    pub const LEFT_SPACE: u16 = 1 << 6;
    pub const RIGHT_SPACE: u16 = 1 << 7;

    pub const fn from_bits(bits: u16) -> Self {
        Self { bits }
    }

    pub const fn none() -> Self {
        Self { bits: 0 }
    }

    pub fn contains(&self, flag: u16) -> bool {
        self.bits & flag == flag
    }

    /// Converts a local name into the form stored on the remote.
    pub fn from_standard_name(&self, name: &str) -> String {
        if self.bits == 0 {
            return name.to_string();
        }
        if self.contains(Self::DOT) {
            match name {
                "." => return "\u{FF0E}".to_string(),
                ".." => return "\u{FF0E}\u{FF0E}".to_string(),
                "\u{FF0E}"
                | "\u{FF0E}\u{FF0E}"
                | "\u{201B}\u{FF0E}"
                | "\u{201B}\u{FF0E}\u{FF0E}" => return format!("{QUOTE}{name}"),
                _ => {}
            }
        }
        let chars: Vec<char> = name.chars().collect();
        let n = chars.len();
        let mut out = String::with_capacity(name.len());
        for (i, &ch) in chars.iter().enumerate() {
            let first = i == 0;
            let last = i + 1 == n;
            if let Some(glyph) = self.encode_char(ch, first, last) {
                out.push(glyph);
            } else if self.decode_char(ch, first, last).is_some() {
                out.push(QUOTE);
                out.push(ch);
            } else {
                if ch == QUOTE && i + 1 < n {
                    let next = chars[i + 1];
                    let next_last = i + 2 == n;
                    if next == QUOTE
                        || self.encode_char(next, false, next_last).is_some()
                        || self.decode_char(next, i == 0, next_last).is_some()
                    {
                        out.push(QUOTE);
                    }
                }
                out.push(ch);
            }
        }
        out
    }

    /// Converts a remote name back into its local form.
    pub fn to_standard_name(&self, name: &str) -> String {
        if self.bits == 0 {
            return name.to_string();
        }
        if self.contains(Self::DOT) {
            match name {
                "\u{FF0E}" => return ".".to_string(),
                "\u{FF0E}\u{FF0E}" => return "..".to_string(),
                _ => {
                    if let Some(rest) = name.strip_prefix(QUOTE) {
                        if rest == "\u{FF0E}" || rest == "\u{FF0E}\u{FF0E}" {
                            return rest.to_string();
                        }
                    }
                }
            }
        }
        let chars: Vec<char> = name.chars().collect();
        let n = chars.len();
        let mut out = String::with_capacity(name.len());
        let mut i = 0;
        while i < n {
            let ch = chars[i];
            if ch == QUOTE && i + 1 < n {
                let next = chars[i + 1];
                let first = out.is_empty();
                let last = i + 2 == n;
                if next == QUOTE || self.decode_char(next, first, last).is_some() {
                    out.push(next);
                    i += 2;
                    continue;
                }
            }
            let first = out.is_empty();
            let last = i + 1 == n;
            out.push(self.decode_char(ch, first, last).unwrap_or(ch));
            i += 1;
        }
        out
    }

    fn encode_char(&self, ch: char, first: bool, last: bool) -> Option<char> {
        match ch {
            '\0' if self.contains(Self::ZERO) => Some('\u{2400}'),
            '/' if self.contains(Self::SLASH) => Some('\u{FF0F}'),
            '\\' if self.contains(Self::BACK_SLASH) => Some('\u{FF3C}'),
            '\u{1}'..='\u{1F}' if self.contains(Self::CTL) => char::from_u32(0x2400 + ch as u32),
            '\u{7F}' if self.contains(Self::DEL) => Some('\u{2421}'),
            ' ' if (first && self.contains(Self::LEFT_SPACE))
                || (last && self.contains(Self::RIGHT_SPACE)) =>
            {
                Some('\u{2420}')
            }
            _ => None,
        }
    }

    fn decode_char(&self, glyph: char, first: bool, last: bool) -> Option<char> {
        match glyph {
            '\u{2400}' if self.contains(Self::ZERO) => Some('\0'),
            '\u{FF0F}' if self.contains(Self::SLASH) => Some('/'),
            '\u{FF3C}' if self.contains(Self::BACK_SLASH) => Some('\\'),
            '\u{2401}'..='\u{241F}' if self.contains(Self::CTL) => {
                char::from_u32(glyph as u32 - 0x2400)
            }
            '\u{2421}' if self.contains(Self::DEL) => Some('\u{7F}'),
            '\u{2420}'
                if (first && self.contains(Self::LEFT_SPACE))
                    || (last && self.contains(Self::RIGHT_SPACE)) =>
            {
                Some(' ')
            }
            _ => None,
        }
    }
}

impl Default for Encoder {
    fn default() -> Self {
        Self::from_bits(
            Self::SLASH | Self::BACK_SLASH | Self::CTL | Self::DEL | Self::DOT | Self::RIGHT_SPACE,
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown encoding flag {0:?}")]
pub struct UnknownEncoding(pub String);

impl FromStr for Encoder {
    type Err = UnknownEncoding;

    /// Parses a comma separated flag list such as `Slash,Ctl,RightSpace`.
    /// `None` clears all flags; `InvalidUtf8` is accepted and ignored since
    /// names are always valid UTF-8 here.
    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let mut bits = 0;
        for part in value.split(',').map(str::trim).filter(|part| !part.is_empty()) {
            if part.eq_ignore_ascii_case("None") || part.eq_ignore_ascii_case("InvalidUtf8") {
                continue;
            }
            let (_, flag) = FLAG_NAMES
                .iter()
                .find(|(name, _)| name.eq_ignore_ascii_case(part))
                .ok_or_else(|| UnknownEncoding(part.to_string()))?;
            bits |= flag;
        }
        Ok(Self::from_bits(bits))
    }
}

impl fmt::Display for Encoder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = FLAG_NAMES
            .iter()
            .filter(|(_, flag)| self.contains(*flag))
            .map(|(name, _)| *name)
            .collect();
        if names.is_empty() {
            f.write_str("None")
        } else {
            f.write_str(&names.join(","))
        }
    }
}
