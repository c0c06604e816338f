//! Output file naming.
//!
//! Filename expressions are rendered with HTML escaping, so the raw result is decoded back
//! to plain text before it is made safe for the filesystem.

use lazy_static::lazy_static;
use regex::{Captures, Regex};

lazy_static! {
    static ref ENTITY: Regex = Regex::new(r"&(#[0-9]+|#[xX][0-9a-fA-F]+|[A-Za-z][A-Za-z0-9]*);")
        .expect("entity pattern is valid");
}

/// Named entities understood by [`decode_html_entities`]: everything the template engine
/// escapes, Latin-1 letters and common typographic punctuation. Any other named entity
/// (the full HTML5 table has over two thousand) is kept verbatim; numeric references always
/// decode.
fn named_entity(name: &str) -> Option<char> {
    let ch = match name {
        "amp" => '&',
        "lt" => '<',
        "gt" => '>',
        "quot" => '"',
        "apos" => '\'',
        "nbsp" => '\u{a0}',
        "copy" => '©',
        "reg" => '®',
        "trade" => '™',
        "deg" => '°',
        "euro" => '€',
        "pound" => '£',
        "sect" => '§',
        "middot" => '·',
        "ndash" => '–',
        "mdash" => '—',
        "hellip" => '…',
        "lsquo" => '‘',
        "rsquo" => '’',
        "ldquo" => '“',
        "rdquo" => '”',
        "laquo" => '«',
        "raquo" => '»',
        "szlig" => 'ß',
        _ => return latin1_letter(name),
    };
    Some(ch)
}

/// Accented Latin-1 letters such as `eacute`, `Ouml` or `ccedil`.
fn latin1_letter(name: &str) -> Option<char> {
    let mut chars = name.chars();
    let base = chars.next()?;
    let accent = chars.as_str();

    let ch = match (base, accent) {
        ('a', "grave") => 'à',
        ('a', "acute") => 'á',
        ('a', "circ") => 'â',
        ('a', "tilde") => 'ã',
        ('a', "uml") => 'ä',
        ('a', "ring") => 'å',
        ('e', "grave") => 'è',
        ('e', "acute") => 'é',
        ('e', "circ") => 'ê',
        ('e', "uml") => 'ë',
        ('i', "grave") => 'ì',
        ('i', "acute") => 'í',
        ('i', "circ") => 'î',
        ('i', "uml") => 'ï',
        ('o', "grave") => 'ò',
        ('o', "acute") => 'ó',
        ('o', "circ") => 'ô',
        ('o', "tilde") => 'õ',
        ('o', "uml") => 'ö',
        ('o', "slash") => 'ø',
        ('u', "grave") => 'ù',
        ('u', "acute") => 'ú',
        ('u', "circ") => 'û',
        ('u', "uml") => 'ü',
        ('y', "acute") => 'ý',
        ('y', "uml") => 'ÿ',
        ('n', "tilde") => 'ñ',
        ('c', "cedil") => 'ç',
        ('A', "grave") => 'À',
        ('A', "acute") => 'Á',
        ('A', "circ") => 'Â',
        ('A', "tilde") => 'Ã',
        ('A', "uml") => 'Ä',
        ('A', "ring") => 'Å',
        ('E', "grave") => 'È',
        ('E', "acute") => 'É',
        ('E', "circ") => 'Ê',
        ('E', "uml") => 'Ë',
        ('I', "grave") => 'Ì',
        ('I', "acute") => 'Í',
        ('I', "circ") => 'Î',
        ('I', "uml") => 'Ï',
        ('O', "grave") => 'Ò',
        ('O', "acute") => 'Ó',
        ('O', "circ") => 'Ô',
        ('O', "tilde") => 'Õ',
        ('O', "uml") => 'Ö',
        ('O', "slash") => 'Ø',
        ('U', "grave") => 'Ù',
        ('U', "acute") => 'Ú',
        ('U', "circ") => 'Û',
        ('U', "uml") => 'Ü',
        ('Y', "acute") => 'Ý',
        ('N', "tilde") => 'Ñ',
        ('C', "cedil") => 'Ç',
        _ => return None,
    };
    Some(ch)
}

/// Decode named and numeric HTML entities. Unknown entities are left untouched.
pub fn decode_html_entities(value: &str) -> String {
    ENTITY
        .replace_all(value, |caps: &Captures| {
            let body = &caps[1];
            let decoded = if let Some(hex) = body
                .strip_prefix("#x")
                .or_else(|| body.strip_prefix("#X"))
            {
                u32::from_str_radix(hex, 16).ok().and_then(char::from_u32)
            } else if let Some(dec) = body.strip_prefix('#') {
                dec.parse::<u32>().ok().and_then(char::from_u32)
            } else {
                named_entity(body)
            };

            match decoded {
                Some(ch) => ch.to_string(),
                None => caps[0].to_string(),
            }
        })
        .into_owned()
}

/// Turn a rendered filename into a filesystem-safe base name.
///
/// Falls back to `fallback` when nothing usable is left.
pub fn output_file_name(rendered: &str, fallback: &str) -> String {
    let decoded = decode_html_entities(rendered.trim());
    let safe = sanitize_filename::sanitize(decoded.trim());
    let safe = safe.trim();

    if safe.is_empty() {
        fallback.to_string()
    } else {
        safe.to_string()
    }
}
