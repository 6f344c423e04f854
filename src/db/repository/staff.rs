use rusqlite::{params, Connection, OptionalExtension, Row};
use uuid::Uuid;

use crate::db::{fmt_datetime, get_datetime, get_enum, get_opt_datetime, get_uuid, now, DatabaseError};
use crate::models::*;

const DOCTOR_COLUMNS: &str = "d.id, d.user_id, d.specialization, d.bio, d.rating, d.license_number,
     d.is_available, d.consultation_fee, d.created_at, d.updated_at";

fn doctor_from_row(row: &Row) -> rusqlite::Result<Doctor> {
    Ok(Doctor {
        id: get_uuid(row, 0)?,
        user_id: get_uuid(row, 1)?,
        specialization: row.get(2)?,
        bio: row.get(3)?,
        rating: row.get(4)?,
        license_number: row.get(5)?,
        is_available: row.get(6)?,
        consultation_fee: row.get(7)?,
        created_at: get_datetime(row, 8)?,
        updated_at: get_opt_datetime(row, 9)?,
    })
}

/// Doctor columns followed by the joined account columns at 10..=13.
fn listing_from_row(row: &Row) -> rusqlite::Result<DoctorListing> {
    Ok(DoctorListing {
        doctor: doctor_from_row(row)?,
        full_name: row.get(10)?,
        email: row.get(11)?,
        phone: row.get(12)?,
        profile_picture: row.get(13)?,
    })
}

pub fn insert_doctor(conn: &Connection, doctor: &Doctor) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT INTO doctors (id, user_id, specialization, bio, rating, license_number,
         is_available, consultation_fee, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
        params![
            doctor.id.to_string(),
            doctor.user_id.to_string(),
            doctor.specialization,
            doctor.bio,
            doctor.rating,
            doctor.license_number,
            doctor.is_available,
            doctor.consultation_fee,
            fmt_datetime(&doctor.created_at),
            doctor.updated_at.as_ref().map(fmt_datetime),
        ],
    )?;
    Ok(())
}

pub fn get_doctor(conn: &Connection, id: &Uuid) -> Result<Option<Doctor>, DatabaseError> {
    Ok(conn
        .query_row(
            &format!("SELECT {DOCTOR_COLUMNS} FROM doctors d WHERE d.id = ?1"),
            params![id.to_string()],
            doctor_from_row,
        )
        .optional()?)
}

pub fn get_doctor_by_user(conn: &Connection, user_id: &Uuid) -> Result<Option<Doctor>, DatabaseError> {
    Ok(conn
        .query_row(
            &format!("SELECT {DOCTOR_COLUMNS} FROM doctors d WHERE d.user_id = ?1"),
            params![user_id.to_string()],
            doctor_from_row,
        )
        .optional()?)
}

pub fn license_number_taken(conn: &Connection, license: &str) -> Result<bool, DatabaseError> {
    let count: i64 = conn.query_row(
        "SELECT (SELECT COUNT(*) FROM doctors WHERE license_number = ?1)
              + (SELECT COUNT(*) FROM nurses WHERE license_number = ?1)
              + (SELECT COUNT(*) FROM lab_technicians WHERE license_number = ?1)
              + (SELECT COUNT(*) FROM pharmacists WHERE license_number = ?1)",
        params![license],
        |row| row.get(0),
    )?;
    Ok(count > 0)
}

#[derive(Debug, Default, Clone)]
pub struct DoctorFilter {
    pub specialization: Option<String>,
    pub is_available: Option<bool>,
}

/// Doctors joined with their active accounts, best rated first.
pub fn list_doctors(
    conn: &Connection,
    filter: &DoctorFilter,
) -> Result<Vec<DoctorListing>, DatabaseError> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {DOCTOR_COLUMNS}, u.full_name, u.email, u.phone, u.profile_picture
         FROM doctors d JOIN users u ON u.id = d.user_id
         WHERE u.is_active = 1
           AND (?1 IS NULL OR d.specialization LIKE '%' || ?1 || '%')
           AND (?2 IS NULL OR d.is_available = ?2)
         ORDER BY d.rating DESC, u.full_name"
    ))?;
    let rows = stmt.query_map(
        params![filter.specialization, filter.is_available],
        listing_from_row,
    )?;
    rows.map(|r| r.map_err(DatabaseError::from)).collect()
}

pub fn get_doctor_listing(
    conn: &Connection,
    id: &Uuid,
) -> Result<Option<DoctorListing>, DatabaseError> {
    Ok(conn
        .query_row(
            &format!(
                "SELECT {DOCTOR_COLUMNS}, u.full_name, u.email, u.phone, u.profile_picture
                 FROM doctors d JOIN users u ON u.id = d.user_id
                 WHERE d.id = ?1"
            ),
            params![id.to_string()],
            listing_from_row,
        )
        .optional()?)
}

pub fn update_doctor(conn: &Connection, doctor: &Doctor) -> Result<(), DatabaseError> {
    let changed = conn.execute(
        "UPDATE doctors SET specialization = ?2, bio = ?3, rating = ?4, license_number = ?5,
         is_available = ?6, consultation_fee = ?7, updated_at = ?8
         WHERE id = ?1",
        params![
            doctor.id.to_string(),
            doctor.specialization,
            doctor.bio,
            doctor.rating,
            doctor.license_number,
            doctor.is_available,
            doctor.consultation_fee,
            fmt_datetime(&now()),
        ],
    )?;
    if changed == 0 {
        return Err(DatabaseError::not_found("Doctor", doctor.id));
    }
    Ok(())
}

/// Profile table for the non-doctor staff roles.
fn staff_table(role: Role) -> Result<&'static str, DatabaseError> {
    match role {
        Role::Nurse => Ok("nurses"),
        Role::Receptionist => Ok("receptionists"),
        Role::LabTechnician => Ok("lab_technicians"),
        Role::Pharmacist => Ok("pharmacists"),
        other => Err(DatabaseError::InvalidEnum {
            field: "staff profile role".into(),
            value: other.as_str().into(),
        }),
    }
}

pub fn insert_staff_profile(conn: &Connection, profile: &StaffProfile) -> Result<(), DatabaseError> {
    let table = staff_table(profile.role)?;
    conn.execute(
        &format!(
            "INSERT INTO {table} (id, user_id, specialization, bio, license_number, is_available,
             created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)"
        ),
        params![
            profile.id.to_string(),
            profile.user_id.to_string(),
            profile.specialization,
            profile.bio,
            profile.license_number,
            profile.is_available,
            fmt_datetime(&profile.created_at),
            profile.updated_at.as_ref().map(fmt_datetime),
        ],
    )?;
    Ok(())
}

pub fn get_staff_profile(
    conn: &Connection,
    role: Role,
    user_id: &Uuid,
) -> Result<Option<StaffProfile>, DatabaseError> {
    let table = staff_table(role)?;
    Ok(conn
        .query_row(
            &format!(
                "SELECT id, user_id, specialization, bio, license_number, is_available,
                 created_at, updated_at
                 FROM {table} WHERE user_id = ?1"
            ),
            params![user_id.to_string()],
            |row| {
                Ok(StaffProfile {
                    id: get_uuid(row, 0)?,
                    user_id: get_uuid(row, 1)?,
                    role,
                    specialization: row.get(2)?,
                    bio: row.get(3)?,
                    license_number: row.get(4)?,
                    is_available: row.get(5)?,
                    created_at: get_datetime(row, 6)?,
                    updated_at: get_opt_datetime(row, 7)?,
                })
            },
        )
        .optional()?)
}

/// All non-patient accounts with whatever role profile they carry.
pub fn list_staff(conn: &Connection, role: Option<Role>) -> Result<Vec<StaffMember>, DatabaseError> {
    let mut stmt = conn.prepare(
        "SELECT u.id, u.full_name, u.email, u.phone, u.role, u.staff_role_id, u.is_active,
                COALESCE(d.specialization, n.specialization, r.specialization,
                         l.specialization, p.specialization),
                COALESCE(d.license_number, n.license_number, r.license_number,
                         l.license_number, p.license_number),
                COALESCE(d.is_available, n.is_available, r.is_available,
                         l.is_available, p.is_available, 1)
         FROM users u
         LEFT JOIN doctors d ON d.user_id = u.id
         LEFT JOIN nurses n ON n.user_id = u.id
         LEFT JOIN receptionists r ON r.user_id = u.id
         LEFT JOIN lab_technicians l ON l.user_id = u.id
         LEFT JOIN pharmacists p ON p.user_id = u.id
         WHERE u.role != 'patient' AND (?1 IS NULL OR u.role = ?1)
         ORDER BY u.role, u.full_name",
    )?;
    let rows = stmt.query_map(params![role.map(|r| r.as_str())], |row| {
        Ok(StaffMember {
            user_id: get_uuid(row, 0)?,
            full_name: row.get(1)?,
            email: row.get(2)?,
            phone: row.get(3)?,
            role: get_enum(row, 4)?,
            staff_role_id: row.get(5)?,
            is_active: row.get(6)?,
            specialization: row.get(7)?,
            license_number: row.get(8)?,
            is_available: row.get(9)?,
        })
    })?;
    rows.map(|r| r.map_err(DatabaseError::from)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repository::fixtures::{make_doctor, make_user, test_db};

    #[test]
    fn doctor_lookup_by_user_and_listing() {
        let conn = test_db();
        let (user, doctor) = make_doctor(&conn, "house@example.com", "Cardiology");

        let by_user = get_doctor_by_user(&conn, &user.id).unwrap().unwrap();
        assert_eq!(by_user.id, doctor.id);

        let listing = get_doctor_listing(&conn, &doctor.id).unwrap().unwrap();
        assert_eq!(listing.email, "house@example.com");
        assert_eq!(listing.doctor.specialization, "Cardiology");
    }

    #[test]
    fn list_doctors_filters_specialization_and_availability() {
        let conn = test_db();
        make_doctor(&conn, "a@example.com", "Cardiology");
        let (_, mut busy) = make_doctor(&conn, "b@example.com", "Pediatrics");
        busy.is_available = false;
        update_doctor(&conn, &busy).unwrap();

        let cardio = list_doctors(
            &conn,
            &DoctorFilter {
                specialization: Some("cardio".into()),
                is_available: Some(true),
            },
        )
        .unwrap();
        assert_eq!(cardio.len(), 1);

        let available = list_doctors(
            &conn,
            &DoctorFilter {
                specialization: None,
                is_available: Some(true),
            },
        )
        .unwrap();
        assert_eq!(available.len(), 1);
        assert_eq!(list_doctors(&conn, &DoctorFilter::default()).unwrap().len(), 2);
    }

    #[test]
    fn staff_profile_round_trip_and_listing() {
        let conn = test_db();
        let nurse = make_user(&conn, "nurse@example.com", Role::Nurse);
        insert_staff_profile(
            &conn,
            &StaffProfile {
                id: Uuid::new_v4(),
                user_id: nurse.id,
                role: Role::Nurse,
                specialization: Some("ICU".into()),
                bio: None,
                license_number: Some("RN-1".into()),
                is_available: true,
                created_at: now(),
                updated_at: None,
            },
        )
        .unwrap();
        make_user(&conn, "patient@example.com", Role::Patient);

        let profile = get_staff_profile(&conn, Role::Nurse, &nurse.id).unwrap().unwrap();
        assert_eq!(profile.specialization.as_deref(), Some("ICU"));
        assert!(license_number_taken(&conn, "RN-1").unwrap());

        let staff = list_staff(&conn, None).unwrap();
        assert_eq!(staff.len(), 1);
        assert_eq!(staff[0].license_number.as_deref(), Some("RN-1"));
    }

    #[test]
    fn doctor_role_has_no_generic_profile_table() {
        let conn = test_db();
        let err = get_staff_profile(&conn, Role::Doctor, &Uuid::new_v4()).unwrap_err();
        assert!(matches!(err, DatabaseError::InvalidEnum { .. }));
    }
}
