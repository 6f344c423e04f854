use crate::db::DatabaseError;
use serde::{Deserialize, Serialize};

/// Macro to generate enum with as_str + std::str::FromStr pattern.
/// The wire name doubles as the serde name so JSON and rows agree.
macro_rules! str_enum {
    ($name:ident { $($variant:ident => $s:literal),+ $(,)? }) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub enum $name {
            $(#[serde(rename = $s)] $variant),+
        }

        impl $name {
            pub const ALL: &'static [$name] = &[$(Self::$variant),+];

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

str_enum!(Role {
    SuperAdmin => "super_admin",
    ClinicianAdmin => "clinician_admin",
    Doctor => "doctor",
    Nurse => "nurse",
    Receptionist => "receptionist",
    LabTechnician => "lab_technician",
    Pharmacist => "pharmacist",
    Patient => "patient",
});

impl Role {
    /// super_admin and clinician_admin.
    pub fn is_admin(&self) -> bool {
        matches!(self, Self::SuperAdmin | Self::ClinicianAdmin)
    }

    pub fn is_staff(&self) -> bool {
        !matches!(self, Self::Patient)
    }

    /// Roles that can be the assigned clinician on an appointment.
    pub fn is_clinician(&self) -> bool {
        matches!(self, Self::ClinicianAdmin | Self::Doctor | Self::Nurse)
    }

    /// Roles created through staff registration; each owns a profile table.
    pub fn is_registrable_staff(&self) -> bool {
        matches!(
            self,
            Self::Doctor | Self::Nurse | Self::Receptionist | Self::LabTechnician | Self::Pharmacist
        )
    }
}

str_enum!(AppointmentStatus {
    Scheduled => "scheduled",
    InProgress => "in_progress",
    Completed => "completed",
    Cancelled => "cancelled",
});

impl AppointmentStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled)
    }

    /// scheduled → in_progress → completed, and any open state → cancelled.
    pub fn can_transition_to(&self, next: AppointmentStatus) -> bool {
        matches!(
            (self, next),
            (Self::Scheduled, Self::InProgress)
                | (Self::InProgress, Self::Completed)
                | (Self::Scheduled, Self::Cancelled)
                | (Self::InProgress, Self::Cancelled)
        )
    }
}

str_enum!(PrescriptionStatus {
    Pending => "pending",
    Approved => "approved",
    Fulfilled => "fulfilled",
});

impl PrescriptionStatus {
    /// The only status this one may move to.
    pub fn next(&self) -> Option<PrescriptionStatus> {
        match self {
            Self::Pending => Some(Self::Approved),
            Self::Approved => Some(Self::Fulfilled),
            Self::Fulfilled => None,
        }
    }
}

str_enum!(PaymentStatus {
    Pending => "pending",
    Processing => "processing",
    Completed => "completed",
    Failed => "failed",
});

str_enum!(PaymentMethod {
    Card => "card",
    Mpesa => "mpesa",
    BankTransfer => "bank_transfer",
});

str_enum!(VideoStatus {
    Waiting => "waiting",
    Active => "active",
    Ended => "ended",
});

str_enum!(EducationType {
    Degree => "degree",
    Certification => "certification",
    License => "license",
});

str_enum!(Weekday {
    Monday => "Monday",
    Tuesday => "Tuesday",
    Wednesday => "Wednesday",
    Thursday => "Thursday",
    Friday => "Friday",
    Saturday => "Saturday",
    Sunday => "Sunday",
});

impl Weekday {
    pub fn index(&self) -> i64 {
        match self {
            Self::Monday => 0,
            Self::Tuesday => 1,
            Self::Wednesday => 2,
            Self::Thursday => 3,
            Self::Friday => 4,
            Self::Saturday => 5,
            Self::Sunday => 6,
        }
    }

    pub fn is_weekend(&self) -> bool {
        matches!(self, Self::Saturday | Self::Sunday)
    }
}

str_enum!(GameKind {
    Memory => "memory",
    Reaction => "reaction",
    Color => "color",
    Focus => "focus",
});

str_enum!(MessageType {
    Text => "text",
    Image => "image",
    File => "file",
});

str_enum!(CodePurpose {
    EmailVerification => "email_verification",
    PasswordReset => "password_reset",
});
