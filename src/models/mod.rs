// Domain models, state machines and versioned documents

/// Declares a wire-visible integer enum stored as SMALLINT.
///
/// Values serialize as bare integers in JSON and decode from the `i16`
/// column; unknown integers are rejected rather than mapped to a default.
macro_rules! int_enum {
    (
        $(#[$meta:meta])*
        pub enum $name:ident {
            $($(#[$vmeta:meta])* $variant:ident = $value:literal),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize, sqlx::Type)]
        #[serde(into = "i16", try_from = "i16")]
        #[repr(i16)]
        pub enum $name {
            $($(#[$vmeta])* $variant = $value),+
        }

        impl From<$name> for i16 {
            fn from(value: $name) -> i16 {
                value as i16
            }
        }

        impl TryFrom<i16> for $name {
            type Error = String;

            fn try_from(value: i16) -> Result<Self, Self::Error> {
                match value {
                    $($value => Ok($name::$variant),)+
                    other => Err(format!("invalid {} value {}", stringify!($name), other)),
                }
            }
        }
    };
}

pub mod coach;
pub mod exam;
pub mod gift_card;
pub mod pagination;
pub mod subscription;
pub mod workout_day;
pub mod workout_details;
pub mod workout_plan;
pub mod workout_schedule;

pub use coach::*;
pub use exam::*;
pub use gift_card::*;
pub use pagination::*;
pub use subscription::*;
pub use workout_day::*;
pub use workout_details::*;
pub use workout_plan::*;
pub use workout_schedule::*;
