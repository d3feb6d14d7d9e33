//! # Language Codes
//!
//! Central mapping between the language codes used by the different
//! collaborators. Clients declare a language with a speech-service style
//! code ("Kor", "Eng", ...), the speech recognizer expects that same code,
//! and the translation collaborator expects a short ISO-style code
//! ("ko", "en", ...). Keeping the table in one enum avoids scattering
//! string comparisons through the handlers.

/// A language supported by the session protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lang {
    Kor,
    Eng,
    Jpn,
    Chn,
}

impl Lang {
    /// Parse the client-declared code ("Kor", "Eng", "Jpn", "Chn").
    pub fn from_client_code(code: &str) -> Option<Lang> {
        match code {
            "Kor" => Some(Lang::Kor),
            "Eng" => Some(Lang::Eng),
            "Jpn" => Some(Lang::Jpn),
            "Chn" => Some(Lang::Chn),
            _ => None,
        }
    }

    /// Code sent to the speech-recognition collaborator.
    pub fn speech_code(&self) -> &'static str {
        match self {
            Lang::Kor => "Kor",
            Lang::Eng => "Eng",
            Lang::Jpn => "Jpn",
            Lang::Chn => "Chn",
        }
    }

    /// Code sent to the translation collaborator.
    pub fn translation_code(&self) -> &'static str {
        match self {
            Lang::Kor => "ko",
            Lang::Eng => "en",
            Lang::Jpn => "ja",
            Lang::Chn => "zh-CN",
        }
    }

    /// IETF BCP 47 tag for this language.
    pub fn bcp47(&self) -> &'static str {
        match self {
            Lang::Kor => "ko-KR",
            Lang::Eng => "en-US",
            Lang::Jpn => "ja-JP",
            Lang::Chn => "zh-CN",
        }
    }
}

/// Map an optional client-declared code to a translation-service code.
///
/// Unknown or missing codes fall back to the pivot language, which makes
/// the forward-translation stage an identity short-circuit for them.
pub fn translation_code_or_pivot(code: Option<&str>, pivot: &str) -> String {
    code.and_then(Lang::from_client_code)
        .map(|l| l.translation_code().to_string())
        .unwrap_or_else(|| pivot.to_string())
}
