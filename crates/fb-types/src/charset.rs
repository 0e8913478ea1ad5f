//! Character set lookup.
//!
//! Server charset names are resolved to `encoding_rs` encodings through the
//! [`CharsetLookup`] trait so applications can plug in their own tables.

use encoding_rs::Encoding;

/// Resolves a server character set name to an encoding.
pub trait CharsetLookup: Send + Sync {
    /// Encoding for `charset`, or `None` if the name is unknown.
    fn encoding_for(&self, charset: &str) -> Option<&'static Encoding>;
}

/// Built-in table covering the common server character sets.
///
/// Names not in the table fall back to WHATWG label lookup.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultCharsets;

impl CharsetLookup for DefaultCharsets {
    fn encoding_for(&self, charset: &str) -> Option<&'static Encoding> {
        let upper = charset.to_ascii_uppercase();
        let encoding = match upper.as_str() {
            "UTF8" | "UNICODE_FSS" | "NONE" => encoding_rs::UTF_8,
            "WIN1250" => encoding_rs::WINDOWS_1250,
            "WIN1251" => encoding_rs::WINDOWS_1251,
            "WIN1252" | "ISO8859_1" => encoding_rs::WINDOWS_1252,
            "WIN1253" => encoding_rs::WINDOWS_1253,
            "WIN1254" | "ISO8859_9" => encoding_rs::WINDOWS_1254,
            "WIN1255" => encoding_rs::WINDOWS_1255,
            "WIN1256" => encoding_rs::WINDOWS_1256,
            "WIN1257" => encoding_rs::WINDOWS_1257,
            "WIN1258" => encoding_rs::WINDOWS_1258,
            "ISO8859_2" => encoding_rs::ISO_8859_2,
            "ISO8859_3" => encoding_rs::ISO_8859_3,
            "ISO8859_4" => encoding_rs::ISO_8859_4,
            "ISO8859_5" => encoding_rs::ISO_8859_5,
            "ISO8859_6" => encoding_rs::ISO_8859_6,
            "ISO8859_7" => encoding_rs::ISO_8859_7,
            "ISO8859_8" => encoding_rs::ISO_8859_8,
            "ISO8859_13" => encoding_rs::ISO_8859_13,
            "KOI8R" => encoding_rs::KOI8_R,
            "KOI8U" => encoding_rs::KOI8_U,
            "DOS866" => encoding_rs::IBM866,
            "TIS620" | "WIN874" => encoding_rs::WINDOWS_874,
            "SJIS_0208" => encoding_rs::SHIFT_JIS,
            "EUCJ_0208" => encoding_rs::EUC_JP,
            "GB_2312" | "GBK" => encoding_rs::GBK,
            "GB18030" => encoding_rs::GB18030,
            "BIG_5" => encoding_rs::BIG5,
            "KSC_5601" => encoding_rs::EUC_KR,
            "OCTETS" => return None,
            _ => return Encoding::for_label(charset.as_bytes()),
        };
        Some(encoding)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_server_names() {
        let lookup = DefaultCharsets;
        assert_eq!(lookup.encoding_for("utf8"), Some(encoding_rs::UTF_8));
        assert_eq!(lookup.encoding_for("WIN1251"), Some(encoding_rs::WINDOWS_1251));
        assert_eq!(lookup.encoding_for("ISO8859_1"), Some(encoding_rs::WINDOWS_1252));
        assert_eq!(lookup.encoding_for("OCTETS"), None);
    }

    #[test]
    fn test_label_fallback() {
        assert_eq!(
            DefaultCharsets.encoding_for("shift_jis"),
            Some(encoding_rs::SHIFT_JIS)
        );
        assert_eq!(DefaultCharsets.encoding_for("NO_SUCH_CHARSET"), None);
    }
}
