// 🏷️ Name Normalizer - storage form vs display form for site/location names
//
// "Main Site" → "MAIN..SITE" (stored)  →  "MAIN SITE" (displayed)
//
// The two forms are inverses only when the raw input does not already contain
// the separator: "A..B" normalizes to "A..B" and displays as "A B".

/// Default two-character separator replacing spaces in stored names
pub const SEPARATOR: &str = "..";

/// Canonical storage form: trimmed, upper-cased, spaces → separator
pub fn normalize_with(name: &str, separator: &str) -> String {
    name.trim().to_uppercase().replace(' ', separator)
}

/// Display form: trimmed, separator → space
pub fn denormalize_with(name: &str, separator: &str) -> String {
    name.trim().replace(separator, " ")
}

pub fn normalize(name: &str) -> String {
    normalize_with(name, SEPARATOR)
}

pub fn denormalize(name: &str) -> String {
    denormalize_with(name, SEPARATOR)
}
