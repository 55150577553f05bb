//! Value sets decided by code syntax
//!
//! `all-languages` admits every BCP-47 language tag and `ucum-units` every
//! UCUM expression. Neither can be enumerated, so membership is a check of
//! the code's form rather than a terminology lookup.

use std::sync::OnceLock;

use regex::Regex;

use crate::context::UCUM_URL;
use crate::term::{CodedValue, ValidationOutcome};

pub const ALL_LANGUAGES_VALUE_SET: &str = "http://hl7.org/fhir/ValueSet/all-languages";
pub const UCUM_UNITS_VALUE_SET: &str = "http://hl7.org/fhir/ValueSet/ucum-units";
pub const BCP_47_SYSTEM: &str = "urn:ietf:bcp:47";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyntaxValueSet {
    AllLanguages,
    UcumUnits,
}

impl SyntaxValueSet {
    /// The syntax-checked value set named by a canonical, ignoring `|version`.
    pub fn from_url(url: &str) -> Option<Self> {
        let url = url.split_once('|').map_or(url, |(url, _)| url);
        match url {
            ALL_LANGUAGES_VALUE_SET => Some(Self::AllLanguages),
            UCUM_UNITS_VALUE_SET => Some(Self::UcumUnits),
            _ => None,
        }
    }

    pub fn url(self) -> &'static str {
        match self {
            Self::AllLanguages => ALL_LANGUAGES_VALUE_SET,
            Self::UcumUnits => UCUM_UNITS_VALUE_SET,
        }
    }

    /// The code system every member code belongs to.
    pub fn system(self) -> &'static str {
        match self {
            Self::AllLanguages => BCP_47_SYSTEM,
            Self::UcumUnits => UCUM_URL,
        }
    }

    pub fn is_valid_code(self, code: &str) -> bool {
        match self {
            Self::AllLanguages => is_language_tag(code),
            Self::UcumUnits => is_ucum_code(code),
        }
    }

    /// Member when any coding has no system or this value set's system, and a
    /// well-formed code.
    pub fn validate(self, coded: &CodedValue) -> ValidationOutcome {
        let member = coded.codings().iter().any(|coding| {
            coding.system.as_deref().map_or(true, |s| s == self.system())
                && self.is_valid_code(&coding.code)
        });
        if member {
            ValidationOutcome::valid(None)
        } else {
            ValidationOutcome::invalid(format!("Code is not valid for value set '{}'", self.url()))
        }
    }
}

/// Well-formed BCP-47 tag (RFC 5646 `langtag` or private use). Two-letter
/// primary subtags must be ISO 639-1 codes; three-letter ones are checked for
/// form only.
pub fn is_language_tag(tag: &str) -> bool {
    static LANGTAG: OnceLock<Regex> = OnceLock::new();
    let pattern = LANGTAG.get_or_init(|| {
        Regex::new(
            r"(?i)^(?:(?P<language>[a-z]{2,3})(?:-[a-z]{3}){0,3}(?:-[a-z]{4})?(?:-(?:[a-z]{2}|[0-9]{3}))?(?:-(?:[a-z0-9]{5,8}|[0-9][a-z0-9]{3}))*(?:-[0-9a-wyz](?:-[a-z0-9]{2,8})+)*(?:-x(?:-[a-z0-9]{1,8})+)?|x(?:-[a-z0-9]{1,8})+)$",
        )
        .expect("language tag pattern is valid")
    });
    let Some(caps) = pattern.captures(tag) else {
        return false;
    };
    match caps.name("language").map(|m| m.as_str().to_ascii_lowercase()) {
        Some(language) if language.len() == 2 => ISO_639_1.contains(language.as_str()),
        _ => true,
    }
}

/// Valid UCUM expression.
pub fn is_ucum_code(code: &str) -> bool {
    !code.is_empty() && octofhir_ucum::validate(code).is_ok()
}

static ISO_639_1: phf::Set<&'static str> = phf::phf_set! {
    "aa", "ab", "ae", "af", "ak", "am", "an", "ar", "as", "av", "ay", "az",
    "ba", "be", "bg", "bh", "bi", "bm", "bn", "bo", "br", "bs",
    "ca", "ce", "ch", "co", "cr", "cs", "cu", "cv", "cy",
    "da", "de", "dv", "dz",
    "ee", "el", "en", "eo", "es", "et", "eu",
    "fa", "ff", "fi", "fj", "fo", "fr", "fy",
    "ga", "gd", "gl", "gn", "gu", "gv",
    "ha", "he", "hi", "ho", "hr", "ht", "hu", "hy", "hz",
    "ia", "id", "ie", "ig", "ii", "ik", "io", "is", "it", "iu",
    "ja", "jv",
    "ka", "kg", "ki", "kj", "kk", "kl", "km", "kn", "ko", "kr", "ks", "ku", "kv", "kw", "ky",
    "la", "lb", "lg", "li", "ln", "lo", "lt", "lu", "lv",
    "mg", "mh", "mi", "mk", "ml", "mn", "mr", "ms", "mt", "my",
    "na", "nb", "nd", "ne", "ng", "nl", "nn", "no", "nr", "nv", "ny",
    "oc", "oj", "om", "or", "os",
    "pa", "pi", "pl", "ps", "pt",
    "qu",
    "rm", "rn", "ro", "ru", "rw",
    "sa", "sc", "sd", "se", "sg", "si", "sk", "sl", "sm", "sn", "so", "sq", "sr", "ss", "st", "su", "sv", "sw",
    "ta", "te", "tg", "th", "ti", "tk", "tl", "tn", "to", "tr", "ts", "tt", "tw", "ty",
    "ug", "uk", "ur", "uz",
    "ve", "vi", "vo",
    "wa", "wo",
    "xh",
    "yi", "yo",
    "za", "zh", "zu",
};
