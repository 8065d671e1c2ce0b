//! Authorization postures and the keep/drop decision.
//!
//! | posture | relationship present | verdict |
//! |---|---|---|
//! | `DEFAULT_DENY` | yes | keep |
//! | `DEFAULT_DENY` | no | drop |
//! | `DEFAULT_ALLOW_WITH_EXPLICIT_DENY` | yes | drop |
//! | `DEFAULT_ALLOW_WITH_EXPLICIT_DENY` | no | keep |

use crate::error::PolicyError;
use rootcause::prelude::Report;
use std::fmt;
use std::str::FromStr;

/// Default visibility of a data source absent a matching relationship.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Posture {
    /// Items are hidden unless the relationship grants them.
    DefaultDeny,
    /// Items are visible unless the relationship excludes them.
    DefaultAllowWithExplicitDeny,
}

/// Outcome of the posture decision for one item.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Keep,
    Drop,
}

impl Posture {
    /// Returns the configuration name of the posture.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::DefaultDeny => "DEFAULT_DENY",
            Self::DefaultAllowWithExplicitDeny => "DEFAULT_ALLOW_WITH_EXPLICIT_DENY",
        }
    }

    /// Decides whether an item is kept given whether the relationship holds.
    #[must_use]
    pub fn decide(self, relationship_present: bool) -> Verdict {
        match (self, relationship_present) {
            (Self::DefaultDeny, true) | (Self::DefaultAllowWithExplicitDeny, false) => {
                Verdict::Keep
            }
            (Self::DefaultDeny, false) | (Self::DefaultAllowWithExplicitDeny, true) => {
                Verdict::Drop
            }
        }
    }
}

impl fmt::Display for Posture {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Accepts the configuration names, ignoring ASCII case.
impl FromStr for Posture {
    type Err = Report<PolicyError>;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        [Self::DefaultDeny, Self::DefaultAllowWithExplicitDeny]
            .into_iter()
            .find(|posture| posture.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| {
                PolicyError::InvalidPosture {
                    value: s.to_string(),
                }
                .into()
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_deny_keeps_related_items() {
        assert_eq!(Posture::DefaultDeny.decide(true), Verdict::Keep);
    }

    #[test]
    fn default_deny_drops_unrelated_items() {
        assert_eq!(Posture::DefaultDeny.decide(false), Verdict::Drop);
    }

    #[test]
    fn default_allow_drops_excluded_items() {
        assert_eq!(
            Posture::DefaultAllowWithExplicitDeny.decide(true),
            Verdict::Drop
        );
    }

    #[test]
    fn default_allow_keeps_unexcluded_items() {
        assert_eq!(
            Posture::DefaultAllowWithExplicitDeny.decide(false),
            Verdict::Keep
        );
    }

    #[test]
    fn parses_configuration_names() {
        assert_eq!(
            "DEFAULT_DENY".parse::<Posture>().unwrap(),
            Posture::DefaultDeny
        );
        assert_eq!(
            "default_allow_with_explicit_deny".parse::<Posture>().unwrap(),
            Posture::DefaultAllowWithExplicitDeny
        );
    }

    #[test]
    fn unknown_posture_is_rejected() {
        let err = "DEFAULT_ALLOW".parse::<Posture>().unwrap_err();
        assert_eq!(
            err.current_context(),
            &PolicyError::InvalidPosture {
                value: "DEFAULT_ALLOW".to_string()
            }
        );
    }

    #[test]
    fn display_matches_configuration_name() {
        for posture in [Posture::DefaultDeny, Posture::DefaultAllowWithExplicitDeny] {
            assert_eq!(posture.to_string().parse::<Posture>().unwrap(), posture);
        }
    }
}
