use crate::db::DatabaseError;
use serde::{Deserialize, Serialize};

/// Macro to generate enum with as_str + std::str::FromStr pattern
macro_rules! str_enum {
    ($name:ident { $($variant:ident => $s:literal),+ $(,)? }) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub enum $name {
            $($variant),+
        }

        impl $name {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $(Self::$variant => $s),+
                }
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl std::str::FromStr for $name {
            type Err = DatabaseError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($s => Ok(Self::$variant)),+,
                    _ => Err(DatabaseError::InvalidEnum {
                        field: stringify!($name).into(),
                        value: s.into(),
                    }),
                }
            }
        }
    };
}

str_enum!(DoseStatus {
    Pending => "pending",
    Taken => "taken",
    Skipped => "skipped",
});

impl Default for DoseStatus {
    fn default() -> Self {
        Self::Pending
    }
}

impl DoseStatus {
    /// Status a "tap" on a dose chip moves to: taken doses go back to
    /// pending, everything else becomes taken.
    pub fn toggled(self) -> Self {
        match self {
            Self::Taken => Self::Pending,
            Self::Pending | Self::Skipped => Self::Taken,
        }
    }
}

str_enum!(DoseForm {
    Tablet => "Tablet",
    Capsule => "Capsule",
    Syrup => "Syrup",
    Injection => "Injection",
    Drops => "Drops",
});

impl DoseForm {
    pub const ALL: [DoseForm; 5] = [
        DoseForm::Tablet,
        DoseForm::Capsule,
        DoseForm::Syrup,
        DoseForm::Injection,
        DoseForm::Drops,
    ];
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn dose_status_round_trip() {
        for (variant, s) in [
            (DoseStatus::Pending, "pending"),
            (DoseStatus::Taken, "taken"),
            (DoseStatus::Skipped, "skipped"),
        ] {
            assert_eq!(variant.as_str(), s);
            assert_eq!(DoseStatus::from_str(s).unwrap(), variant);
        }
    }

    #[test]
    fn dose_status_defaults_to_pending() {
        assert_eq!(DoseStatus::default(), DoseStatus::Pending);
    }

    #[test]
    fn toggle_flips_taken_and_pending() {
        assert_eq!(DoseStatus::Pending.toggled(), DoseStatus::Taken);
        assert_eq!(DoseStatus::Taken.toggled(), DoseStatus::Pending);
        assert_eq!(DoseStatus::Skipped.toggled(), DoseStatus::Taken);
    }

    #[test]
    fn dose_form_display_matches_label() {
        assert_eq!(DoseForm::Tablet.to_string(), "Tablet");
        assert_eq!(DoseForm::from_str("Drops").unwrap(), DoseForm::Drops);
        assert_eq!(DoseForm::ALL.len(), 5);
    }

    #[test]
    fn invalid_enum_returns_error() {
        assert!(DoseStatus::from_str("TAKEN").is_err());
        assert!(DoseForm::from_str("tablet").is_err());
        assert!(DoseStatus::from_str("").is_err());
    }
}
