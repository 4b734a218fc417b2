//! Status helper enums mapping to SMALLINT lookup tables.
//!
//! Each enum variant's discriminant matches the seed data in the
//! corresponding `*_statuses` database table. Decoding an id that has no
//! variant fails, so unknown values are rejected at the store boundary.

use serde::{Deserialize, Serialize};

/// Status ID type matching SMALLINT in the database.
pub type StatusId = i16;

/// Returned when a stored status id has no matching variant.
#[derive(Debug, thiserror::Error)]
#[error("unknown {kind} id {id}")]
pub struct UnknownStatus {
    pub kind: &'static str,
    pub id: StatusId,
}

macro_rules! define_status_enum {
    (
        $(#[$meta:meta])*
        $name:ident {
            $( $(#[$vmeta:meta])* $variant:ident = $val:literal => $label:literal ),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[repr(i16)]
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub enum $name {
            $( $(#[$vmeta])* $variant = $val ),+
        }

        impl $name {
            /// Return the database status ID.
            pub fn id(self) -> StatusId {
                self as StatusId
            }

            /// Return the seeded `name` column value.
            pub fn name(self) -> &'static str {
                match self {
                    $( Self::$variant => $label ),+
                }
            }
        }

        impl From<$name> for StatusId {
            fn from(value: $name) -> Self {
                value as StatusId
            }
        }

        impl TryFrom<StatusId> for $name {
            type Error = UnknownStatus;

            fn try_from(id: StatusId) -> Result<Self, Self::Error> {
                match id {
                    $( $val => Ok(Self::$variant), )+
                    _ => Err(UnknownStatus { kind: stringify!($name), id }),
                }
            }
        }
    };
}

define_status_enum! {
    /// Conversion job lifecycle status.
    ///
    /// `Pending -> Processing -> {Success, Failed}` is the only legal path;
    /// `Processing -> Processing` is allowed when a task is redelivered.
    #[derive(Serialize, Deserialize)]
    #[serde(rename_all = "SCREAMING_SNAKE_CASE")]
    JobStatus {
        Pending = 1 => "PENDING",
        Processing = 2 => "PROCESSING",
        Success = 3 => "SUCCESS",
        Failed = 4 => "FAILED",
    }
}

impl JobStatus {
    /// `Success` and `Failed` end the lifecycle.
    pub fn is_terminal(self) -> bool {
        match self {
            Self::Success | Self::Failed => true,
            Self::Pending | Self::Processing => false,
        }
    }

    /// Whether moving from `self` to `next` is a legal transition.
    pub fn can_transition_to(self, next: JobStatus) -> bool {
        match (self, next) {
            (Self::Pending, Self::Processing) => true,
            (Self::Processing, Self::Processing) => true,
            (Self::Processing, Self::Success) => true,
            (Self::Processing, Self::Failed) => true,
            (Self::Pending, _) | (Self::Processing, _) => false,
            (Self::Success, _) | (Self::Failed, _) => false,
        }
    }

    /// Statuses from which a transition into `next` is legal.
    pub fn legal_sources(next: JobStatus) -> &'static [JobStatus] {
        match next {
            Self::Pending => &[],
            Self::Processing => &[Self::Pending, Self::Processing],
            Self::Success | Self::Failed => &[Self::Processing],
        }
    }
}
