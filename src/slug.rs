//! URL slugs derived from display names.

/// Lowercase ASCII alphanumerics joined by single hyphens.
///
/// Common Latin accents are folded (`é` -> `e`), `&` becomes `and`, and
/// every other run of non-alphanumerics collapses into one hyphen.
pub fn slugify(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut pending_dash = false;
    for c in input.chars() {
        let folded: &str = match c {
            'à' | 'á' | 'â' | 'ã' | 'ä' | 'å' | 'À' | 'Á' | 'Â' | 'Ã' | 'Ä' | 'Å' => "a",
            'è' | 'é' | 'ê' | 'ë' | 'È' | 'É' | 'Ê' | 'Ë' => "e",
            'ì' | 'í' | 'î' | 'ï' | 'Ì' | 'Í' | 'Î' | 'Ï' => "i",
            'ò' | 'ó' | 'ô' | 'õ' | 'ö' | 'Ò' | 'Ó' | 'Ô' | 'Õ' | 'Ö' => "o",
            'ù' | 'ú' | 'û' | 'ü' | 'Ù' | 'Ú' | 'Û' | 'Ü' => "u",
            'ñ' | 'Ñ' => "n",
            'ç' | 'Ç' => "c",
            '&' => "and",
            _ => "",
        };
        if !folded.is_empty() {
            push_word(&mut out, folded, &mut pending_dash);
        } else if c.is_ascii_alphanumeric() {
            let lower = c.to_ascii_lowercase();
            let mut buf = [0u8; 4];
            push_word(&mut out, lower.encode_utf8(&mut buf), &mut pending_dash);
        } else if c == '\'' || c == '\u{2019}' {
            // Apostrophes join rather than split: "o'brien" -> "obrien".
        } else {
            pending_dash = true;
        }
    }
    out
}

fn push_word(out: &mut String, s: &str, pending_dash: &mut bool) {
    if *pending_dash && !out.is_empty() {
        out.push('-');
    }
    *pending_dash = false;
    out.push_str(s);
}

/// True when `s` is already a well-formed slug.
pub fn is_valid_slug(s: &str) -> bool {
    !s.is_empty()
        && !s.starts_with('-')
        && !s.ends_with('-')
        && !s.contains("--")
        && s.chars().all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn basic_names() {
        assert_eq!(slugify("Modular Office Buildings!"), "modular-office-buildings");
        assert_eq!(slugify("  Healthcare & Medical  "), "healthcare-and-medical");
        assert_eq!(slugify("K-12 Education"), "k-12-education");
        assert_eq!(slugify("Café Décor"), "cafe-decor");
        assert_eq!(slugify("Contractor's Trailers"), "contractors-trailers");
    }

    #[test]
    fn degenerate_input() {
        assert_eq!(slugify(""), "");
        assert_eq!(slugify("---"), "");
        assert_eq!(slugify("日本"), "");
    }

    #[test]
    fn slugify_output_is_valid() {
        for name in ["Ground-Level Offices", "10x40 Storage / Rental", "Q&A"] {
            assert!(is_valid_slug(&slugify(name)), "{}", name);
        }
        assert!(!is_valid_slug("Bad Slug"));
        assert!(!is_valid_slug("-lead"));
        assert!(!is_valid_slug("double--dash"));
    }
}
