use rusqlite::{params, Connection, OptionalExtension, Row};

use crate::db::{fmt_datetime, get_datetime, get_json, get_opt_datetime, now, DatabaseError};
use crate::models::*;

/// Seed record for one of the built-in staff categories.
struct DefaultRole {
    id: &'static str,
    name: &'static str,
    description: &'static str,
    permissions: &'static [&'static str],
    requires_specialization: bool,
    requires_license: bool,
    default_consultation_fee: Option<f64>,
}

const DEFAULT_ROLES: &[DefaultRole] = &[
    DefaultRole {
        id: "role_doctor_default",
        name: "Doctor",
        description: "Medical doctor who can diagnose, treat patients, and prescribe medication",
        permissions: &[
            "view_patients",
            "create_appointments",
            "prescribe_medication",
            "view_medical_records",
            "manage_schedule",
            "update_vitals",
            "assist_procedures",
        ],
        requires_specialization: true,
        requires_license: true,
        default_consultation_fee: Some(50.0),
    },
    DefaultRole {
        id: "role_nurse_default",
        name: "Nurse",
        description: "Nursing staff who assists doctors and provides patient care",
        permissions: &[
            "view_patients",
            "update_vitals",
            "assist_procedures",
            "view_medical_records",
            "manage_schedule",
        ],
        requires_specialization: false,
        requires_license: true,
        default_consultation_fee: Some(25.0),
    },
    DefaultRole {
        id: "role_receptionist_default",
        name: "Receptionist",
        description: "Front desk staff who handles appointments and patient registration",
        permissions: &[
            "create_appointments",
            "manage_schedule",
            "patient_registration",
            "view_patients",
        ],
        requires_specialization: false,
        requires_license: false,
        default_consultation_fee: None,
    },
    DefaultRole {
        id: "role_lab_technician_default",
        name: "Lab Technician",
        description: "Laboratory staff who conducts medical tests and analyses",
        permissions: &[
            "view_test_requests",
            "conduct_tests",
            "update_results",
            "view_patients",
        ],
        requires_specialization: false,
        requires_license: true,
        default_consultation_fee: None,
    },
    DefaultRole {
        id: "role_pharmacist_default",
        name: "Pharmacist",
        description: "Pharmacy staff who dispenses medication and provides drug information",
        permissions: &[
            "view_prescriptions",
            "dispense_medication",
            "manage_inventory",
            "view_patients",
        ],
        requires_specialization: false,
        requires_license: true,
        default_consultation_fee: None,
    },
];

/// Id of the seeded staff role record for a registrable staff role.
pub fn default_staff_role_id(role: Role) -> Option<&'static str> {
    match role {
        Role::Doctor => Some("role_doctor_default"),
        Role::Nurse => Some("role_nurse_default"),
        Role::Receptionist => Some("role_receptionist_default"),
        Role::LabTechnician => Some("role_lab_technician_default"),
        Role::Pharmacist => Some("role_pharmacist_default"),
        _ => None,
    }
}

/// Insert the built-in staff roles when the table is empty.
/// Returns the number of rows created.
pub fn seed_default_staff_roles(conn: &Connection) -> Result<usize, DatabaseError> {
    let existing: i64 = conn.query_row("SELECT COUNT(*) FROM staff_roles", [], |row| row.get(0))?;
    if existing > 0 {
        return Ok(0);
    }

    let created_at = now();
    for role in DEFAULT_ROLES {
        insert_staff_role(
            conn,
            &StaffRole {
                id: role.id.into(),
                name: role.name.into(),
                description: Some(role.description.into()),
                permissions: role.permissions.iter().map(|p| p.to_string()).collect(),
                is_active: true,
                requires_specialization: role.requires_specialization,
                requires_license: role.requires_license,
                default_consultation_fee: role.default_consultation_fee,
                created_at,
                updated_at: None,
            },
        )?;
    }
    tracing::info!(count = DEFAULT_ROLES.len(), "Seeded default staff roles");
    Ok(DEFAULT_ROLES.len())
}

fn staff_role_from_row(row: &Row) -> rusqlite::Result<StaffRole> {
    Ok(StaffRole {
        id: row.get(0)?,
        name: row.get(1)?,
        description: row.get(2)?,
        permissions: get_json(row, 3)?,
        is_active: row.get(4)?,
        requires_specialization: row.get(5)?,
        requires_license: row.get(6)?,
        default_consultation_fee: row.get(7)?,
        created_at: get_datetime(row, 8)?,
        updated_at: get_opt_datetime(row, 9)?,
    })
}

const STAFF_ROLE_COLUMNS: &str = "id, name, description, permissions, is_active,
     requires_specialization, requires_license, default_consultation_fee, created_at, updated_at";

pub fn insert_staff_role(conn: &Connection, role: &StaffRole) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT INTO staff_roles (id, name, description, permissions, is_active,
         requires_specialization, requires_license, default_consultation_fee, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
        params![
            role.id,
            role.name,
            role.description,
            serde_json::to_string(&role.permissions)?,
            role.is_active,
            role.requires_specialization,
            role.requires_license,
            role.default_consultation_fee,
            fmt_datetime(&role.created_at),
            role.updated_at.as_ref().map(fmt_datetime),
        ],
    )?;
    Ok(())
}

pub fn get_staff_role(conn: &Connection, id: &str) -> Result<Option<StaffRole>, DatabaseError> {
    Ok(conn
        .query_row(
            &format!("SELECT {STAFF_ROLE_COLUMNS} FROM staff_roles WHERE id = ?1"),
            params![id],
            staff_role_from_row,
        )
        .optional()?)
}

pub fn get_staff_role_by_name(
    conn: &Connection,
    name: &str,
) -> Result<Option<StaffRole>, DatabaseError> {
    Ok(conn
        .query_row(
            &format!("SELECT {STAFF_ROLE_COLUMNS} FROM staff_roles WHERE name = ?1"),
            params![name],
            staff_role_from_row,
        )
        .optional()?)
}

pub fn list_staff_roles(
    conn: &Connection,
    active_only: bool,
) -> Result<Vec<StaffRole>, DatabaseError> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {STAFF_ROLE_COLUMNS} FROM staff_roles
         WHERE (?1 = 0 OR is_active = 1)
         ORDER BY name"
    ))?;
    let rows = stmt.query_map(params![active_only], staff_role_from_row)?;
    rows.map(|r| r.map_err(DatabaseError::from)).collect()
}

pub fn update_staff_role(conn: &Connection, role: &StaffRole) -> Result<(), DatabaseError> {
    let changed = conn.execute(
        "UPDATE staff_roles SET name = ?2, description = ?3, permissions = ?4, is_active = ?5,
         requires_specialization = ?6, requires_license = ?7, default_consultation_fee = ?8,
         updated_at = ?9
         WHERE id = ?1",
        params![
            role.id,
            role.name,
            role.description,
            serde_json::to_string(&role.permissions)?,
            role.is_active,
            role.requires_specialization,
            role.requires_license,
            role.default_consultation_fee,
            fmt_datetime(&now()),
        ],
    )?;
    if changed == 0 {
        return Err(DatabaseError::not_found("StaffRole", &role.id));
    }
    Ok(())
}
