//! Decoding of entry names and comments.
//!
//! ZIP stores names and comments as raw bytes. General-purpose bit 11 marks
//! them as UTF-8; without it, the historical encoding is IBM code page 437.
//! Many writers ignore the flag, so the default strategy guesses.
//!
//! Raw bytes are always kept; decoding happens on access.

use crate::checksum::Crc32;
use crate::format::extra::UnicodeExtra;

/// Strategy for turning raw name and comment bytes into text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum StringDecoding {
    /// Trust the UTF-8 flag or a matching Unicode extra field, then accept
    /// plain ASCII, then valid UTF-8, and fall back to CP437.
    #[default]
    Guess,
    /// UTF-8 if the flag says so, CP437 otherwise.
    Strict,
    /// Lossy UTF-8 without any guessing.
    Raw,
}

/// Code points for CP437 bytes `0x80..=0xFF`.
const CP437_HIGH: [char; 128] = [
    'Ç', 'ü', 'é', 'â', 'ä', 'à', 'å', 'ç', 'ê', 'ë', 'è', 'ï', 'î', 'ì', 'Ä', 'Å', //
    'É', 'æ', 'Æ', 'ô', 'ö', 'ò', 'û', 'ù', 'ÿ', 'Ö', 'Ü', '¢', '£', '¥', '₧', 'ƒ', //
    'á', 'í', 'ó', 'ú', 'ñ', 'Ñ', 'ª', 'º', '¿', '⌐', '¬', '½', '¼', '¡', '«', '»', //
    '░', '▒', '▓', '│', '┤', '╡', '╢', '╖', '╕', '╣', '║', '╗', '╝', '╜', '╛', '┐', //
    '└', '┴', '┬', '├', '─', '┼', '╞', '╟', '╚', '╔', '╩', '╦', '╠', '═', '╬', '╧', //
    '╨', '╤', '╥', '╙', '╘', '╒', '╓', '╫', '╪', '┘', '┌', '█', '▄', '▌', '▐', '▀', //
    'α', 'ß', 'Γ', 'π', 'Σ', 'σ', 'µ', 'τ', 'Φ', 'Θ', 'Ω', 'δ', '∞', 'φ', 'ε', '∩', //
    '≡', '±', '≥', '≤', '⌠', '⌡', '÷', '≈', '°', '∙', '·', '√', 'ⁿ', '²', '■', '\u{00A0}',
];

/// Decodes CP437 bytes. The lower half maps to ASCII.
pub fn decode_cp437(raw: &[u8]) -> String {
    raw.iter()
        .map(|&b| {
            if b < 0x80 {
                char::from(b)
            } else {
                CP437_HIGH[usize::from(b - 0x80)]
            }
        })
        .collect()
}

/// Decodes raw name or comment bytes.
///
/// `utf8_flag` is general-purpose bit 11; `unicode` is the matching InfoZIP
/// Unicode path or comment extra field, if present.
pub(crate) fn decode(
    raw: &[u8],
    utf8_flag: bool,
    unicode: Option<&UnicodeExtra>,
    strategy: StringDecoding,
) -> String {
    match strategy {
        StringDecoding::Raw => String::from_utf8_lossy(raw).into_owned(),
        StringDecoding::Strict => {
            if utf8_flag {
                String::from_utf8_lossy(raw).into_owned()
            } else {
                decode_cp437(raw)
            }
        }
        StringDecoding::Guess => {
            if utf8_flag {
                return String::from_utf8_lossy(raw).into_owned();
            }
            if let Some(extra) = unicode {
                if extra.header_crc == Crc32::compute(raw) {
                    if let Ok(text) = std::str::from_utf8(&extra.text) {
                        return text.to_owned();
                    }
                }
            }
            match std::str::from_utf8(raw) {
                Ok(text) => text.to_owned(),
                Err(_) => decode_cp437(raw),
            }
        }
    }
}

/// Returns true if `raw` must be flagged as UTF-8 when written: valid UTF-8
/// with at least one non-ASCII byte.
pub(crate) fn needs_utf8_flag(raw: &[u8]) -> bool {
    !raw.is_ascii() && std::str::from_utf8(raw).is_ok()
}
