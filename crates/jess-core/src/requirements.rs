//! The security requirement algebra.
//!
//! Four properties describe what a suite delivers over a message:
//! confidentiality, integrity, recipient authentication, and sender
//! authentication. Suites claim a set, the session compiler computes the set
//! the tools actually provide, and compliance checks compare the two.

use std::fmt;

/// A single security property.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Requirement {
    /// Only the recipients can read the message.
    Confidentiality,
    /// Changes to the message are detected.
    Integrity,
    /// Only the intended recipients can open the message.
    RecipientAuthentication,
    /// The sender of the message is authenticated.
    SenderAuthentication,
}

impl Requirement {
    const ALL: [Requirement; 4] = [
        Requirement::Confidentiality,
        Requirement::Integrity,
        Requirement::RecipientAuthentication,
        Requirement::SenderAuthentication,
    ];

    const fn bit(self) -> u8 {
        match self {
            Requirement::Confidentiality => 0b0001,
            Requirement::Integrity => 0b0010,
            Requirement::RecipientAuthentication => 0b0100,
            Requirement::SenderAuthentication => 0b1000,
        }
    }

    const fn letter(self) -> char {
        match self {
            Requirement::Confidentiality => 'C',
            Requirement::Integrity => 'I',
            Requirement::RecipientAuthentication => 'R',
            Requirement::SenderAuthentication => 'S',
        }
    }

    fn name(self) -> &'static str {
        match self {
            Requirement::Confidentiality => "Confidentiality",
            Requirement::Integrity => "Integrity",
            Requirement::RecipientAuthentication => "RecipientAuthentication",
            Requirement::SenderAuthentication => "SenderAuthentication",
        }
    }
}

/// A set of security properties.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Requirements {
    bits: u8,
}

impl Requirements {
    /// The empty set.
    pub const fn none() -> Self {
        Self { bits: 0 }
    }

    /// All four properties.
    pub const fn all() -> Self {
        Self { bits: 0b1111 }
    }

    /// Returns whether the set contains the given property.
    pub const fn has(self, requirement: Requirement) -> bool {
        self.bits & requirement.bit() != 0
    }

    /// Adds a property in place.
    pub fn add(&mut self, requirement: Requirement) -> &mut Self {
        self.bits |= requirement.bit();
        self
    }

    /// Removes a property in place.
    pub fn remove(&mut self, requirement: Requirement) -> &mut Self {
        self.bits &= !requirement.bit();
        self
    }

    /// Returns the set with the property added.
    pub const fn with(self, requirement: Requirement) -> Self {
        Self { bits: self.bits | requirement.bit() }
    }

    /// Returns the set with the property removed.
    pub const fn without(self, requirement: Requirement) -> Self {
        Self { bits: self.bits & !requirement.bit() }
    }

    /// Returns whether the set is empty.
    pub const fn is_empty(self) -> bool {
        self.bits == 0
    }

    /// Checks whether this set fulfills all required properties.
    ///
    /// Returns the missing subset on failure.
    pub fn check_compliance_to(self, required: Requirements) -> Result<(), Requirements> {
        let missing = Requirements { bits: required.bits & !self.bits };
        if missing.is_empty() {
            Ok(())
        } else {
            Err(missing)
        }
    }

    /// Four character projection over `CIRS`, listing present properties.
    pub fn short_string(self) -> String {
        Requirement::ALL
            .iter()
            .filter(|r| self.has(**r))
            .map(|r| r.letter())
            .collect()
    }

    /// Complement projection listing absent letters, as consumed by the CLI
    /// `--no` flag.
    pub fn to_no_spec(self) -> String {
        Requirement::ALL
            .iter()
            .filter(|r| !self.has(**r))
            .map(|r| r.letter())
            .collect()
    }

    /// Parses a negated `CIRS` spec: starts from the full set and subtracts
    /// every listed letter.
    pub fn parse_from_no_spec(spec: &str) -> Result<Self, char> {
        let mut requirements = Self::all();
        for letter in spec.chars() {
            match letter {
                'C' => requirements.remove(Requirement::Confidentiality),
                'I' => requirements.remove(Requirement::Integrity),
                'R' => requirements.remove(Requirement::RecipientAuthentication),
                'S' => requirements.remove(Requirement::SenderAuthentication),
                unknown => return Err(unknown),
            };
        }
        Ok(requirements)
    }
}

impl fmt::Display for Requirements {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<_> =
            Requirement::ALL.iter().filter(|r| self.has(**r)).map(|r| r.name()).collect();
        write!(f, "{}", names.join(", "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_and_remove_are_monotonic() {
        let mut set = Requirements::none();
        set.add(Requirement::Integrity);
        assert!(set.has(Requirement::Integrity));

        set.remove(Requirement::Integrity);
        assert!(!set.has(Requirement::Integrity));
    }

    #[test]
    fn self_compliance_always_holds() {
        for bits in 0..16u8 {
            let set = Requirements { bits };
            assert!(set.check_compliance_to(set).is_ok());
        }
    }

    #[test]
    fn superset_is_compliant_to_subset() {
        let superset = Requirements::all();
        let subset = Requirements::all().without(Requirement::SenderAuthentication);
        assert!(superset.check_compliance_to(subset).is_ok());

        let missing = subset.check_compliance_to(superset).unwrap_err();
        assert!(missing.has(Requirement::SenderAuthentication));
        assert_eq!(missing.short_string(), "S");
    }

    #[test]
    fn short_string_lists_present_letters() {
        assert_eq!(Requirements::all().short_string(), "CIRS");
        assert_eq!(Requirements::none().short_string(), "");
        assert_eq!(
            Requirements::none().with(Requirement::Integrity).short_string(),
            "I"
        );
    }

    #[test]
    fn no_spec_roundtrip() {
        let set = Requirements::all().without(Requirement::SenderAuthentication);
        assert_eq!(set.to_no_spec(), "S");
        assert_eq!(Requirements::parse_from_no_spec("S").unwrap(), set);
        assert_eq!(Requirements::parse_from_no_spec("").unwrap(), Requirements::all());
    }

    #[test]
    fn no_spec_rejects_unknown_letters() {
        assert_eq!(Requirements::parse_from_no_spec("CX"), Err('X'));
    }

    #[test]
    fn display_names_properties() {
        let set = Requirements::none().with(Requirement::Confidentiality).with(Requirement::Integrity);
        assert_eq!(set.to_string(), "Confidentiality, Integrity");
    }
}
