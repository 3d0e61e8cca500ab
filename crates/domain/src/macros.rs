//! Macro for string conversions on status-like enums
//!
//! Markers, run statuses and task statuses are persisted as lowercase
//! strings. One macro invocation gives each enum a `&'static str` form for
//! SQL binding, `Display`, and case-insensitive `FromStr`.
//!
//! # Example
//!
//! ```rust
//! use calsync_domain::impl_domain_status_conversions;
//!
//! #[derive(Debug, Clone, Copy, PartialEq, Eq)]
//! pub enum ReconcileState {
//!     Queued,
//!     Applying,
//!     Settled,
//! }
//!
//! impl_domain_status_conversions!(ReconcileState {
//!     Queued => "queued",
//!     Applying => "applying",
//!     Settled => "settled",
//! });
//!
//! assert_eq!(ReconcileState::Applying.as_str(), "applying");
//! assert_eq!(ReconcileState::Applying.to_string(), "applying");
//! assert_eq!("SETTLED".parse::<ReconcileState>(), Ok(ReconcileState::Settled));
//! assert_eq!(ReconcileState::ALL.len(), 3);
//! ```

/// Implements `as_str`, `ALL`, `Display` and `FromStr` for status enums
///
/// Parsing is case-insensitive; unknown values produce
/// `"Invalid <EnumName>: <value>"`.
#[macro_export]
macro_rules! impl_domain_status_conversions {
    ($enum_name:ident { $($variant:ident => $str:expr),+ $(,)? }) => {
        impl $enum_name {
            /// Every variant, in declaration order
            pub const ALL: &'static [$enum_name] = &[$(Self::$variant),+];

            /// Stable lowercase representation used for storage and wire formats
            pub const fn as_str(&self) -> &'static str {
                match self {
                    $(Self::$variant => $str,)+
                }
            }
        }

        impl ::std::fmt::Display for $enum_name {
            fn fmt(&self, f: &mut ::std::fmt::Formatter<'_>) -> ::std::fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl ::std::str::FromStr for $enum_name {
            type Err = String;

            fn from_str(s: &str) -> ::std::result::Result<Self, Self::Err> {
                match s.trim().to_lowercase().as_str() {
                    $($str => Ok(Self::$variant),)+
                    _ => Err(format!("Invalid {}: {}", stringify!($enum_name), s)),
                }
            }
        }
    };
}
