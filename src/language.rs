//! ISO 639 language codes.
//!
//! Pipeline-facing language codes are ISO 639-3 (`eng`, `cat`). Backends that
//! speak ISO 639-1 (`en`, `ca`) convert at their boundary with
//! [`to_iso_639_1`].

/// A language known to the dubbing pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Language {
    pub iso_639_3: &'static str,
    pub iso_639_1: &'static str,
    pub name: &'static str,
}

const fn lang(iso_639_3: &'static str, iso_639_1: &'static str, name: &'static str) -> Language {
    Language {
        iso_639_3,
        iso_639_1,
        name,
    }
}

pub const LANGUAGES: &[Language] = &[
    lang("afr", "af", "Afrikaans"),
    lang("amh", "am", "Amharic"),
    lang("ara", "ar", "Arabic"),
    lang("arg", "an", "Aragonese"),
    lang("ast", "", "Asturian"),
    lang("bel", "be", "Belarusian"),
    lang("ben", "bn", "Bengali"),
    lang("bul", "bg", "Bulgarian"),
    lang("cat", "ca", "Catalan"),
    lang("ces", "cs", "Czech"),
    lang("cym", "cy", "Welsh"),
    lang("dan", "da", "Danish"),
    lang("deu", "de", "German"),
    lang("ell", "el", "Greek"),
    lang("eng", "en", "English"),
    lang("epo", "eo", "Esperanto"),
    lang("est", "et", "Estonian"),
    lang("eus", "eu", "Basque"),
    lang("fas", "fa", "Persian"),
    lang("fin", "fi", "Finnish"),
    lang("fra", "fr", "French"),
    lang("gle", "ga", "Irish"),
    lang("glg", "gl", "Galician"),
    lang("guj", "gu", "Gujarati"),
    lang("heb", "he", "Hebrew"),
    lang("hin", "hi", "Hindi"),
    lang("hrv", "hr", "Croatian"),
    lang("hun", "hu", "Hungarian"),
    lang("hye", "hy", "Armenian"),
    lang("ind", "id", "Indonesian"),
    lang("isl", "is", "Icelandic"),
    lang("ita", "it", "Italian"),
    lang("jpn", "ja", "Japanese"),
    lang("kat", "ka", "Georgian"),
    lang("kaz", "kk", "Kazakh"),
    lang("kor", "ko", "Korean"),
    lang("lav", "lv", "Latvian"),
    lang("lit", "lt", "Lithuanian"),
    lang("mal", "ml", "Malayalam"),
    lang("mar", "mr", "Marathi"),
    lang("mkd", "mk", "Macedonian"),
    lang("mlt", "mt", "Maltese"),
    lang("msa", "ms", "Malay"),
    lang("nld", "nl", "Dutch"),
    lang("nno", "nn", "Norwegian Nynorsk"),
    lang("nob", "nb", "Norwegian Bokmål"),
    lang("oci", "oc", "Occitan"),
    lang("pol", "pl", "Polish"),
    lang("por", "pt", "Portuguese"),
    lang("ron", "ro", "Romanian"),
    lang("rus", "ru", "Russian"),
    lang("slk", "sk", "Slovak"),
    lang("slv", "sl", "Slovenian"),
    lang("spa", "es", "Spanish"),
    lang("sqi", "sq", "Albanian"),
    lang("srp", "sr", "Serbian"),
    lang("swa", "sw", "Swahili"),
    lang("swe", "sv", "Swedish"),
    lang("tam", "ta", "Tamil"),
    lang("tel", "te", "Telugu"),
    lang("tha", "th", "Thai"),
    lang("tur", "tr", "Turkish"),
    lang("ukr", "uk", "Ukrainian"),
    lang("urd", "ur", "Urdu"),
    lang("vie", "vi", "Vietnamese"),
    lang("zho", "zh", "Chinese"),
];

pub fn find(iso_639_3: &str) -> Option<&'static Language> {
    let code = iso_639_3.trim().to_ascii_lowercase();
    LANGUAGES.iter().find(|l| l.iso_639_3 == code)
}

/// Two-letter code for a three-letter one, when one exists.
pub fn to_iso_639_1(iso_639_3: &str) -> Option<&'static str> {
    find(iso_639_3)
        .map(|l| l.iso_639_1)
        .filter(|code| !code.is_empty())
}

/// Three-letter code for a two-letter one.
pub fn from_iso_639_1(iso_639_1: &str) -> Option<&'static str> {
    let code = iso_639_1.trim().to_ascii_lowercase();
    if code.is_empty() {
        return None;
    }
    LANGUAGES
        .iter()
        .find(|l| l.iso_639_1 == code)
        .map(|l| l.iso_639_3)
}

/// True for a three-letter lowercase ASCII code.
pub fn is_iso_639_3_shaped(code: &str) -> bool {
    code.len() == 3 && code.chars().all(|c| c.is_ascii_lowercase())
}

pub fn display_name(iso_639_3: &str) -> String {
    find(iso_639_3)
        .map(|l| l.name.to_string())
        .unwrap_or_else(|| iso_639_3.to_string())
}
