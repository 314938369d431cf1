//! Wiki file-title conventions.
//!
//! File pages on the wiki are named after the English display text with
//! Latin diacritics folded to ASCII and a handful of characters removed.

/// Fold Latin diacritics to their ASCII base letters and drop characters the
/// wiki omits from file names.
///
/// # Examples
///
/// ```
/// use heroes_data::enrich::file_title::asciify;
///
/// assert_eq!(asciify("Líf: Dead Lord"), "Lif Dead Lord");
/// assert_eq!(asciify("Þjazi"), "Thjazi");
/// ```
#[must_use]
pub fn asciify(text: &str) -> String {
    let mut folded = String::with_capacity(text.len());
    for ch in text.chars() {
        match fold(ch) {
            Folded::Keep => folded.push(ch),
            Folded::Drop => {}
            Folded::Replace(replacement) => folded.push_str(replacement),
        }
    }
    folded
}

enum Folded {
    Keep,
    Drop,
    Replace(&'static str),
}

fn fold(ch: char) -> Folded {
    let replacement = match ch {
        '"' | ':' | '?' | '/' | '\\' | '*' | '<' | '>' | '|' => return Folded::Drop,
        'á' | 'à' | 'â' | 'ä' | 'ã' | 'å' | 'ā' => "a",
        'Á' | 'À' | 'Â' | 'Ä' | 'Ã' | 'Å' | 'Ā' => "A",
        'é' | 'è' | 'ê' | 'ë' | 'ē' => "e",
        'É' | 'È' | 'Ê' | 'Ë' | 'Ē' => "E",
        'í' | 'ì' | 'î' | 'ï' | 'ī' => "i",
        'Í' | 'Ì' | 'Î' | 'Ï' | 'Ī' => "I",
        'ó' | 'ò' | 'ô' | 'ö' | 'õ' | 'ø' | 'ō' => "o",
        'Ó' | 'Ò' | 'Ô' | 'Ö' | 'Õ' | 'Ø' | 'Ō' => "O",
        'ú' | 'ù' | 'û' | 'ü' | 'ū' => "u",
        'Ú' | 'Ù' | 'Û' | 'Ü' | 'Ū' => "U",
        'ý' | 'ÿ' => "y",
        'Ý' => "Y",
        'ñ' => "n",
        'Ñ' => "N",
        'ç' => "c",
        'Ç' => "C",
        'ð' => "d",
        'Ð' => "D",
        'þ' => "th",
        'Þ' => "Th",
        'æ' => "ae",
        'Æ' => "AE",
        'œ' => "oe",
        'Œ' => "OE",
        'ß' => "ss",
        _ => return Folded::Keep,
    };
    Folded::Replace(replacement)
}

/// Title of a hero's face portrait, e.g. `File:Alfonse Prince of Askr Face FC.webp`.
#[must_use]
pub fn face_title(name: &str, epithet: &str) -> String {
    format!("File:{} Face FC.webp", asciify(&format!("{name} {epithet}")))
}

/// Title of a hero's resplendent face portrait.
#[must_use]
pub fn resplendent_face_title(name: &str, epithet: &str) -> String {
    format!(
        "File:{} Resplendent Face FC.webp",
        asciify(&format!("{name} {epithet}"))
    )
}

/// Title of a passive skill icon, e.g. `File:Fury 3.png`.
#[must_use]
pub fn icon_title(skill_name: &str) -> String {
    format!("File:{}.png", asciify(skill_name))
}
