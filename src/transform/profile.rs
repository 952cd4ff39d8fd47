//! Compliance profile selection.

use axum::http::HeaderMap;

/// Request header naming the envelope variant.
pub const COMPLIANCE_PROFILE_HEADER: &str = "x-compliance-profile";

/// Response envelope variant chosen by the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ComplianceProfile {
    #[default]
    Default,
    /// Hides status codes; renames `data` → `payload`, trace → `correlationId`.
    Owasp,
    /// Fixed `lti_*` field names.
    Lti,
}

/// Recognized header values (compared case-insensitively).
/// Anything else selects [`ComplianceProfile::Default`].
pub const PROFILE_TABLE: &[(&str, ComplianceProfile)] = &[
    ("OWASP", ComplianceProfile::Owasp),
    ("LTI", ComplianceProfile::Lti),
];

impl ComplianceProfile {
    pub fn from_value(value: Option<&str>) -> Self {
        let Some(value) = value.map(str::trim) else {
            return Self::Default;
        };
        PROFILE_TABLE
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case(value))
            .map(|(_, profile)| *profile)
            .unwrap_or_default()
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Default => "DEFAULT",
            Self::Owasp => "OWASP",
            Self::Lti => "LTI",
        }
    }
}

/// Pick the envelope variant for a request.
pub fn select_profile(headers: &HeaderMap) -> ComplianceProfile {
    ComplianceProfile::from_value(
        headers
            .get(COMPLIANCE_PROFILE_HEADER)
            .and_then(|v| v.to_str().ok()),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_selection_table() {
        let cases = [
            (Some("OWASP"), ComplianceProfile::Owasp),
            (Some("owasp"), ComplianceProfile::Owasp),
            (Some(" Lti "), ComplianceProfile::Lti),
            (Some("LTI"), ComplianceProfile::Lti),
            (Some("HIPAA"), ComplianceProfile::Default),
            (Some(""), ComplianceProfile::Default),
            (None, ComplianceProfile::Default),
        ];
        for (value, expected) in cases {
            assert_eq!(ComplianceProfile::from_value(value), expected, "value {value:?}");
        }
    }

    #[test]
    fn test_select_from_headers() {
        let mut headers = HeaderMap::new();
        assert_eq!(select_profile(&headers), ComplianceProfile::Default);

        headers.insert(COMPLIANCE_PROFILE_HEADER, HeaderValue::from_static("oWaSp"));
        assert_eq!(select_profile(&headers), ComplianceProfile::Owasp);
    }
}
