//! Query language detection for picking the search locale.
//!
//! Only two locales are searched: Malay (Indonesian queries are served by
//! the same locale) and English. Detection counts function words from a
//! small list per language; queries that look like another Latin-script
//! language, or are not written in Latin script, get no locale.

use std::collections::HashSet;

use once_cell::sync::Lazy;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Locale {
    Malay,
    English,
}

impl Locale {
    /// Value of the provider's `hl` parameter
    pub fn hl(&self) -> &'static str {
        match self {
            Locale::Malay => "ms",
            Locale::English => "en",
        }
    }
}

static MALAY_WORDS: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    [
        "yang", "dan", "di", "ke", "dari", "untuk", "dengan", "ini", "itu", "adalah", "adakah",
        "akan", "tidak", "ada", "dalam", "pada", "oleh", "kepada", "atau", "juga", "telah",
        "sudah", "bagi", "kerana", "karena", "apa", "apakah", "siapa", "bagaimana", "mengapa",
        "kenapa", "bila", "bilakah", "berapa", "mana", "saya", "kami", "kita", "mereka", "dia",
        "ia", "tentang", "selepas", "sebelum", "masih", "lebih", "baru", "kerajaan", "negeri",
        "terhadap", "antara", "semasa", "boleh", "bisa", "sebagai", "tahun", "hari", "berita",
        "terkini", "terbaru", "terlibat", "terbabit", "kes",
    ]
    .into_iter()
    .collect()
});

static ENGLISH_WORDS: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    [
        "the", "a", "an", "is", "are", "was", "were", "be", "been", "of", "and", "to", "in",
        "on", "for", "with", "what", "who", "how", "why", "when", "where", "which", "does", "do",
        "did", "has", "have", "had", "this", "that", "these", "those", "it", "its", "from", "by",
        "about", "at", "as", "latest", "news", "will", "can", "not", "or", "after", "before",
        "any", "there", "their", "new", "today",
    ]
    .into_iter()
    .collect()
});

/// French, Spanish, German, Italian, Portuguese and Dutch function words.
static OTHER_LATIN_WORDS: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    [
        // fr
        "le", "la", "les", "des", "est", "une", "et", "du", "pour", "dans", "qui", "que", "sur",
        "avec", "pas", "sont", "quelle", "quel", "où",
        // es
        "el", "los", "las", "es", "y", "por", "para", "con", "una", "del", "qué", "cómo",
        "cuál", "está", "dónde",
        // de
        "der", "das", "und", "ist", "nicht", "ein", "eine", "mit", "von", "wie", "auf", "für",
        "wer", "warum",
        // it
        "il", "gli", "della", "che", "è", "sono", "perché", "chi", "quando",
        // pt
        "os", "um", "uma", "não", "com", "são", "em", "onde", "quem",
        // nl
        "het", "een", "van", "niet", "zijn", "wat", "waar",
    ]
    .into_iter()
    .collect()
});

/// Pick the search locale for `text`, `None` when it should not be searched.
///
/// Latin-script text with no recognizable function words is treated as
/// English, so bare keyword queries ("MCMC initiatives") still search.
pub fn detect_locale(text: &str) -> Option<Locale> {
    let letters = text.chars().filter(|c| c.is_alphabetic()).count();
    if letters == 0 {
        return None;
    }
    let latin = text.chars().filter(|c| is_latin_letter(*c)).count();
    if latin * 2 < letters {
        log::debug!("query is not in Latin script, skipping web search");
        return None;
    }

    let lowered = text.to_lowercase();
    let words: Vec<&str> = lowered
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .collect();

    let count = |list: &HashSet<&'static str>| words.iter().filter(|w| list.contains(*w)).count();
    let malay = count(&MALAY_WORDS);
    let english = count(&ENGLISH_WORDS);
    let other = count(&OTHER_LATIN_WORDS);

    log::debug!("language votes ms={malay} en={english} other={other}");

    if other > malay && other > english {
        None
    } else if malay > english {
        Some(Locale::Malay)
    } else {
        Some(Locale::English)
    }
}

fn is_latin_letter(c: char) -> bool {
    c.is_ascii_alphabetic() || ('\u{00C0}'..='\u{024F}').contains(&c)
}
