//! Repository layer: entity-scoped database operations.
//!
//! Every function takes a borrowed `Connection` so handlers can run
//! several calls on one per-request connection. All public functions are
//! re-exported here.

mod activity;
mod address;
mod appointment;
mod chat;
mod consultation;
mod dashboard;
mod doctor_profile;
mod medical_history;
mod medication;
mod mental_health;
mod patient_profile;
mod payment;
mod prescription;
mod staff;
mod staff_role;
mod user;
mod verification_code;
mod wishlist;

pub use activity::*;
pub use address::*;
pub use appointment::*;
pub use chat::*;
pub use consultation::*;
pub use dashboard::*;
pub use doctor_profile::*;
pub use medical_history::*;
pub use medication::*;
pub use mental_health::*;
pub use patient_profile::*;
pub use payment::*;
pub use prescription::*;
pub use staff::*;
pub use staff_role::*;
pub use user::*;
pub use verification_code::*;
pub use wishlist::*;

/// Row builders shared by the repository tests.
#[cfg(test)]
pub(crate) mod fixtures {
    use chrono::Duration;
    use rusqlite::Connection;
    use uuid::Uuid;

    use super::*;
    use crate::db::{now, open_memory_database};
    use crate::models::*;

    pub fn test_db() -> Connection {
        open_memory_database().unwrap()
    }

    pub fn make_user(conn: &Connection, email: &str, role: Role) -> User {
        let user = User {
            id: Uuid::new_v4(),
            full_name: "Test User".into(),
            email: email.into(),
            password_hash: "pbkdf2-sha256$1$c2FsdA$aGFzaA".into(),
            phone: None,
            gender: None,
            date_of_birth: None,
            address: None,
            profile_picture: None,
            role,
            staff_role_id: None,
            is_active: true,
            is_verified: true,
            last_login: None,
            created_at: now(),
            updated_at: None,
        };
        insert_user(conn, &user).unwrap();
        user
    }

    pub fn make_doctor(conn: &Connection, email: &str, specialization: &str) -> (User, Doctor) {
        let user = make_user(conn, email, Role::Doctor);
        let doctor = Doctor {
            id: Uuid::new_v4(),
            user_id: user.id,
            specialization: specialization.into(),
            bio: None,
            rating: 4.5,
            license_number: Some(format!("LIC-{}", &user.id.to_string()[..8])),
            is_available: true,
            consultation_fee: Some(50.0),
            created_at: now(),
            updated_at: None,
        };
        insert_doctor(conn, &doctor).unwrap();
        (user, doctor)
    }

    pub fn make_appointment(conn: &Connection, patient_id: Uuid, clinician_id: Uuid) -> Appointment {
        let appt = Appointment {
            id: Uuid::new_v4(),
            patient_id,
            clinician_id,
            visit_type: "consultation".into(),
            specialization: Some("General".into()),
            scheduled_at: now() + Duration::days(1),
            status: AppointmentStatus::Scheduled,
            triage_notes: None,
            cost: Some(50.0),
            cancellation_reason: None,
            created_at: now(),
            updated_at: None,
        };
        insert_appointment(conn, &appt).unwrap();
        appt
    }

    pub fn make_prescription(conn: &Connection, appointment_id: Uuid, doctor_user_id: Uuid) -> Prescription {
        let rx = Prescription {
            id: Uuid::new_v4(),
            appointment_id,
            issued_by_doctor_id: doctor_user_id,
            pharmacy_name: Some("Kiangombe Pharmacy".into()),
            medications: vec![PrescribedMedication {
                name: "Amoxicillin".into(),
                dosage: "500mg".into(),
                frequency: "3x daily".into(),
                duration: Some("7 days".into()),
                instructions: Some("After meals".into()),
            }],
            status: PrescriptionStatus::Pending,
            issued_date: now(),
            expiry_date: None,
            verified: false,
            created_at: now(),
            updated_at: None,
        };
        insert_prescription(conn, &rx).unwrap();
        rx
    }

    pub fn make_medication(conn: &Connection, name: &str, category: &str, stock: i64) -> Medication {
        let med = Medication {
            id: Uuid::new_v4(),
            name: name.into(),
            category: category.into(),
            dosage: Some("500mg".into()),
            price: 120.0,
            stock,
            description: Some(format!("{name} tablets")),
            prescription_required: false,
            expiry_date: None,
            batch_number: None,
            supplier: None,
            image_url: None,
            in_stock: stock > 0,
            created_at: now(),
            updated_at: None,
        };
        insert_medication(conn, &med).unwrap();
        med
    }
}

#[cfg(test)]
mod tests {
    use super::fixtures::*;
    use super::*;
    use crate::models::*;

    #[test]
    fn dashboard_counts_reflect_rows() {
        let conn = test_db();
        let patient = make_user(&conn, "pat@example.com", Role::Patient);
        let (doc, _) = make_doctor(&conn, "doc@example.com", "General");
        let a1 = make_appointment(&conn, patient.id, doc.id);
        let mut a2 = make_appointment(&conn, patient.id, doc.id);
        a2.status = AppointmentStatus::Completed;
        update_appointment(&conn, &a2).unwrap();
        make_prescription(&conn, a1.id, doc.id);

        let counts = dashboard_counts(&conn).unwrap();
        assert_eq!(counts.total_users, 2);
        assert_eq!(counts.total_appointments, 2);
        assert_eq!(counts.total_prescriptions, 1);
        assert_eq!(counts.upcoming_appointments, 1);
    }

    #[test]
    fn deleting_a_user_cascades_to_owned_rows() {
        let conn = test_db();
        let patient = make_user(&conn, "pat@example.com", Role::Patient);
        let (doc, _) = make_doctor(&conn, "doc@example.com", "General");
        make_appointment(&conn, patient.id, doc.id);

        conn.execute("DELETE FROM users WHERE id = ?1", [patient.id.to_string()])
            .unwrap();
        assert_eq!(count_appointments(&conn, None).unwrap(), 0);
    }
}
