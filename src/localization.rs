use serde::{Deserialize, Serialize};

/// Languages the catalog is maintained in.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize, strum::Display, strum::EnumString)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum Locale {
    #[default]
    En,
    Ar,
}

/// A bilingual text pair resolved through a [`Locale`] rather than read
/// field-by-field, so domain code never branches on a concrete language.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Localized {
    pub en: String,
    pub ar: String,
}

impl Localized {
    pub fn new(en: impl Into<String>, ar: impl Into<String>) -> Self {
        Self {
            en: en.into(),
            ar: ar.into(),
        }
    }

    /// Resolve the text for a locale, falling back to the other language
    /// when the requested one is empty.
    pub fn get(&self, locale: Locale) -> &str {
        let (preferred, fallback) = match locale {
            Locale::En => (&self.en, &self.ar),
            Locale::Ar => (&self.ar, &self.en),
        };
        if preferred.is_empty() {
            fallback
        } else {
            preferred
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn resolves_requested_locale() {
        let text = Localized::new("Resistor kit", "طقم مقاومات");
        assert_eq!(text.get(Locale::En), "Resistor kit");
        assert_eq!(text.get(Locale::Ar), "طقم مقاومات");
    }

    #[test]
    fn falls_back_when_translation_missing() {
        let text = Localized::new("Breadboard", "");
        assert_eq!(text.get(Locale::Ar), "Breadboard");
    }

    #[test]
    fn parses_locale_tags() {
        assert_eq!(Locale::from_str("ar").unwrap(), Locale::Ar);
        assert_eq!(Locale::from_str("EN").unwrap(), Locale::En);
        assert!(Locale::from_str("fr").is_err());
    }
}
