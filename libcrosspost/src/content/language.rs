//! Language detection backed by `whatlang`

use whatlang::Lang;

use super::validator::LanguageDetector;

/// Trigram-based detector. Returns ISO 639-1 codes for languages that have
/// one, and whatlang's ISO 639-3 code otherwise.
#[derive(Debug, Clone, Copy, Default)]
pub struct WhatlangDetector;

impl LanguageDetector for WhatlangDetector {
    fn detect(&self, content: &str) -> Option<String> {
        let info = whatlang::detect(content)?;
        Some(iso_639_1(info.lang()).to_string())
    }
}

fn iso_639_1(lang: Lang) -> &'static str {
    match lang {
        Lang::Eng => "en",
        Lang::Spa => "es",
        Lang::Fra => "fr",
        Lang::Deu => "de",
        Lang::Ita => "it",
        Lang::Por => "pt",
        Lang::Nld => "nl",
        Lang::Rus => "ru",
        Lang::Ukr => "uk",
        Lang::Pol => "pl",
        Lang::Jpn => "ja",
        Lang::Cmn => "zh",
        Lang::Kor => "ko",
        Lang::Ara => "ar",
        Lang::Heb => "he",
        Lang::Hin => "hi",
        Lang::Tur => "tr",
        Lang::Swe => "sv",
        other => other.code(),
    }
}
