//! Role and ownership rules for clinic records.
//!
//! Checked in order, default deny:
//! 1. Patient → own records only
//! 2. Doctor / clinician_admin → records where they are the assigned clinician
//! 3. super_admin and front-office / pharmacy / lab staff → all records
//!
//! Administrative endpoints use `require_role` instead and skip ownership.

use uuid::Uuid;

use crate::models::{Appointment, AppointmentStatus, PrescriptionStatus, Role};

/// The authenticated caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Actor {
    pub user_id: Uuid,
    pub role: Role,
}

/// Why access was granted (or denied).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessReason {
    OwnRecord,
    AssignedClinician,
    StaffWide,
    Administrator,
    Denied,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AccessDecision {
    pub allowed: bool,
    pub reason: AccessReason,
}

impl AccessDecision {
    fn allow(reason: AccessReason) -> Self {
        Self {
            allowed: true,
            reason,
        }
    }

    fn deny() -> Self {
        Self {
            allowed: false,
            reason: AccessReason::Denied,
        }
    }
}

/// Which appointments a caller may list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordScope {
    All,
    Patient(Uuid),
    Clinician(Uuid),
}

impl RecordScope {
    pub fn for_actor(actor: &Actor) -> Self {
        match actor.role {
            Role::Patient => Self::Patient(actor.user_id),
            Role::Doctor | Role::ClinicianAdmin => Self::Clinician(actor.user_id),
            _ => Self::All,
        }
    }

    pub fn patient_id(&self) -> Option<Uuid> {
        match self {
            Self::Patient(id) => Some(*id),
            _ => None,
        }
    }

    pub fn clinician_id(&self) -> Option<Uuid> {
        match self {
            Self::Clinician(id) => Some(*id),
            _ => None,
        }
    }
}

pub fn require_role(actor: &Actor, allowed: &[Role]) -> bool {
    allowed.contains(&actor.role)
}

pub fn check_appointment_access(actor: &Actor, appt: &Appointment) -> AccessDecision {
    match RecordScope::for_actor(actor) {
        RecordScope::Patient(id) if appt.patient_id == id => {
            AccessDecision::allow(AccessReason::OwnRecord)
        }
        RecordScope::Clinician(id) if appt.clinician_id == id => {
            AccessDecision::allow(AccessReason::AssignedClinician)
        }
        RecordScope::All if actor.role == Role::SuperAdmin => {
            AccessDecision::allow(AccessReason::Administrator)
        }
        RecordScope::All => AccessDecision::allow(AccessReason::StaffWide),
        _ => AccessDecision::deny(),
    }
}

/// Booking: front office, doctors and admins for anyone; patients for themselves.
pub fn can_book_for(actor: &Actor, patient_id: &Uuid) -> bool {
    match actor.role {
        Role::SuperAdmin | Role::ClinicianAdmin | Role::Receptionist | Role::Doctor => true,
        Role::Patient => &actor.user_id == patient_id,
        _ => false,
    }
}

/// Visit type, triage, cost and specialization edits.
pub fn can_edit_appointment(actor: &Actor, appt: &Appointment) -> bool {
    actor.role.is_admin() && check_appointment_access(actor, appt).allowed
}

/// Status moves other than cancellation, made by whoever runs the visit.
pub fn can_set_appointment_status(
    actor: &Actor,
    appt: &Appointment,
    next: AppointmentStatus,
) -> bool {
    if actor.role == Role::Patient {
        return false;
    }
    if next == AppointmentStatus::Cancelled {
        return check_appointment_access(actor, appt).allowed;
    }
    actor.role.is_clinician() || actor.role == Role::SuperAdmin
}

/// Super admins prescribe on any appointment; doctors and clinician admins on their own.
pub fn can_prescribe(actor: &Actor, appt: &Appointment) -> bool {
    match actor.role {
        Role::SuperAdmin => true,
        Role::Doctor | Role::ClinicianAdmin => appt.clinician_id == actor.user_id,
        _ => false,
    }
}

/// pending → approved by clinicians/admins; approved → fulfilled by pharmacy/admins.
pub fn can_move_prescription(actor: &Actor, to: PrescriptionStatus) -> bool {
    match to {
        PrescriptionStatus::Approved => matches!(
            actor.role,
            Role::SuperAdmin | Role::ClinicianAdmin | Role::Doctor
        ),
        PrescriptionStatus::Fulfilled => matches!(
            actor.role,
            Role::SuperAdmin | Role::ClinicianAdmin | Role::Pharmacist
        ),
        PrescriptionStatus::Pending => false,
    }
}

/// Self, or an administrator.
pub fn can_view_user(actor: &Actor, user_id: &Uuid) -> bool {
    &actor.user_id == user_id || actor.role.is_admin()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::now;

    fn actor(role: Role) -> Actor {
        Actor {
            user_id: Uuid::new_v4(),
            role,
        }
    }

    fn appointment(patient: Uuid, clinician: Uuid) -> Appointment {
        Appointment {
            id: Uuid::new_v4(),
            patient_id: patient,
            clinician_id: clinician,
            visit_type: "consultation".into(),
            specialization: None,
            scheduled_at: now(),
            status: AppointmentStatus::Scheduled,
            triage_notes: None,
            cost: None,
            cancellation_reason: None,
            created_at: now(),
            updated_at: None,
        }
    }

    #[test]
    fn patient_sees_only_own() {
        let patient = actor(Role::Patient);
        let mine = appointment(patient.user_id, Uuid::new_v4());
        let theirs = appointment(Uuid::new_v4(), Uuid::new_v4());
        assert_eq!(
            check_appointment_access(&patient, &mine).reason,
            AccessReason::OwnRecord
        );
        assert!(!check_appointment_access(&patient, &theirs).allowed);
    }

    #[test]
    fn clinician_admin_limited_to_assigned() {
        let admin = actor(Role::ClinicianAdmin);
        let assigned = appointment(Uuid::new_v4(), admin.user_id);
        let other = appointment(Uuid::new_v4(), Uuid::new_v4());
        assert_eq!(
            check_appointment_access(&admin, &assigned).reason,
            AccessReason::AssignedClinician
        );
        assert!(!check_appointment_access(&admin, &other).allowed);
    }

    #[test]
    fn super_admin_and_front_office_see_all() {
        let appt = appointment(Uuid::new_v4(), Uuid::new_v4());
        assert_eq!(
            check_appointment_access(&actor(Role::SuperAdmin), &appt).reason,
            AccessReason::Administrator
        );
        assert_eq!(
            check_appointment_access(&actor(Role::Receptionist), &appt).reason,
            AccessReason::StaffWide
        );
    }

    #[test]
    fn scope_matches_role() {
        let p = actor(Role::Patient);
        assert_eq!(RecordScope::for_actor(&p).patient_id(), Some(p.user_id));
        let d = actor(Role::Doctor);
        assert_eq!(RecordScope::for_actor(&d).clinician_id(), Some(d.user_id));
        assert_eq!(RecordScope::for_actor(&actor(Role::Nurse)), RecordScope::All);
    }

    #[test]
    fn booking_rules() {
        let patient = actor(Role::Patient);
        assert!(can_book_for(&patient, &patient.user_id));
        assert!(!can_book_for(&patient, &Uuid::new_v4()));
        assert!(can_book_for(&actor(Role::Receptionist), &Uuid::new_v4()));
        assert!(!can_book_for(&actor(Role::Pharmacist), &Uuid::new_v4()));
    }

    #[test]
    fn prescribing_rules() {
        let doctor = actor(Role::Doctor);
        let own = appointment(Uuid::new_v4(), doctor.user_id);
        let other = appointment(Uuid::new_v4(), Uuid::new_v4());
        assert!(can_prescribe(&doctor, &own));
        assert!(!can_prescribe(&doctor, &other));
        assert!(can_prescribe(&actor(Role::SuperAdmin), &other));
        assert!(!can_prescribe(&actor(Role::Nurse), &own));
    }

    #[test]
    fn prescription_transition_roles() {
        assert!(can_move_prescription(&actor(Role::Doctor), PrescriptionStatus::Approved));
        assert!(!can_move_prescription(&actor(Role::Pharmacist), PrescriptionStatus::Approved));
        assert!(can_move_prescription(&actor(Role::Pharmacist), PrescriptionStatus::Fulfilled));
        assert!(!can_move_prescription(&actor(Role::Doctor), PrescriptionStatus::Fulfilled));
        assert!(!can_move_prescription(&actor(Role::SuperAdmin), PrescriptionStatus::Pending));
    }

    #[test]
    fn status_changes_exclude_patients() {
        let patient = actor(Role::Patient);
        let appt = appointment(patient.user_id, Uuid::new_v4());
        assert!(!can_set_appointment_status(&patient, &appt, AppointmentStatus::InProgress));
        assert!(can_set_appointment_status(&actor(Role::Nurse), &appt, AppointmentStatus::InProgress));
        assert!(!can_set_appointment_status(&actor(Role::Receptionist), &appt, AppointmentStatus::Completed));
        assert!(can_set_appointment_status(&actor(Role::Receptionist), &appt, AppointmentStatus::Cancelled));
    }

    #[test]
    fn user_visibility() {
        let me = actor(Role::Doctor);
        assert!(can_view_user(&me, &me.user_id));
        assert!(!can_view_user(&me, &Uuid::new_v4()));
        assert!(can_view_user(&actor(Role::ClinicianAdmin), &Uuid::new_v4()));
    }
}
