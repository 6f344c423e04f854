//! One-row-per-user patient sections. Reads return `None` until the
//! first write; writes are upserts keyed on `user_id`.

use rusqlite::{params, Connection, OptionalExtension};
use uuid::Uuid;

use crate::db::{fmt_datetime, get_json, now, DatabaseError};
use crate::models::*;

pub fn get_medical_info(conn: &Connection, user_id: &Uuid) -> Result<Option<MedicalInfo>, DatabaseError> {
    Ok(conn
        .query_row(
            "SELECT blood_type, height, weight, allergies, conditions, medications
             FROM medical_info WHERE user_id = ?1",
            params![user_id.to_string()],
            |row| {
                Ok(MedicalInfo {
                    blood_type: row.get(0)?,
                    height: row.get(1)?,
                    weight: row.get(2)?,
                    allergies: get_json(row, 3)?,
                    conditions: get_json(row, 4)?,
                    medications: get_json(row, 5)?,
                })
            },
        )
        .optional()?)
}

pub fn upsert_medical_info(
    conn: &Connection,
    user_id: &Uuid,
    info: &MedicalInfo,
) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT INTO medical_info (user_id, blood_type, height, weight, allergies, conditions,
         medications, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
         ON CONFLICT(user_id) DO UPDATE SET
             blood_type = excluded.blood_type, height = excluded.height,
             weight = excluded.weight, allergies = excluded.allergies,
             conditions = excluded.conditions, medications = excluded.medications,
             updated_at = excluded.updated_at",
        params![
            user_id.to_string(),
            info.blood_type,
            info.height,
            info.weight,
            serde_json::to_string(&info.allergies)?,
            serde_json::to_string(&info.conditions)?,
            serde_json::to_string(&info.medications)?,
            fmt_datetime(&now()),
        ],
    )?;
    Ok(())
}

pub fn get_emergency_contact(
    conn: &Connection,
    user_id: &Uuid,
) -> Result<Option<EmergencyContact>, DatabaseError> {
    Ok(conn
        .query_row(
            "SELECT name, phone, relation FROM emergency_contacts WHERE user_id = ?1",
            params![user_id.to_string()],
            |row| {
                Ok(EmergencyContact {
                    name: row.get(0)?,
                    phone: row.get(1)?,
                    relation: row.get(2)?,
                })
            },
        )
        .optional()?)
}

pub fn upsert_emergency_contact(
    conn: &Connection,
    user_id: &Uuid,
    contact: &EmergencyContact,
) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT INTO emergency_contacts (user_id, name, phone, relation, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5)
         ON CONFLICT(user_id) DO UPDATE SET
             name = excluded.name, phone = excluded.phone,
             relation = excluded.relation, updated_at = excluded.updated_at",
        params![
            user_id.to_string(),
            contact.name,
            contact.phone,
            contact.relation,
            fmt_datetime(&now()),
        ],
    )?;
    Ok(())
}

pub fn get_insurance(conn: &Connection, user_id: &Uuid) -> Result<Option<Insurance>, DatabaseError> {
    Ok(conn
        .query_row(
            "SELECT provider, policy_number, group_number, holder_name
             FROM insurance WHERE user_id = ?1",
            params![user_id.to_string()],
            |row| {
                Ok(Insurance {
                    provider: row.get(0)?,
                    policy_number: row.get(1)?,
                    group_number: row.get(2)?,
                    holder_name: row.get(3)?,
                })
            },
        )
        .optional()?)
}

pub fn upsert_insurance(
    conn: &Connection,
    user_id: &Uuid,
    insurance: &Insurance,
) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT INTO insurance (user_id, provider, policy_number, group_number, holder_name,
         updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)
         ON CONFLICT(user_id) DO UPDATE SET
             provider = excluded.provider, policy_number = excluded.policy_number,
             group_number = excluded.group_number, holder_name = excluded.holder_name,
             updated_at = excluded.updated_at",
        params![
            user_id.to_string(),
            insurance.provider,
            insurance.policy_number,
            insurance.group_number,
            insurance.holder_name,
            fmt_datetime(&now()),
        ],
    )?;
    Ok(())
}

/// Defaults apply when nothing has been saved yet.
pub fn get_notification_settings(
    conn: &Connection,
    user_id: &Uuid,
) -> Result<NotificationSettings, DatabaseError> {
    let stored = conn
        .query_row(
            "SELECT email_notifications, sms_notifications, appointment_reminders, lab_results
             FROM notification_settings WHERE user_id = ?1",
            params![user_id.to_string()],
            |row| {
                Ok(NotificationSettings {
                    email_notifications: row.get(0)?,
                    sms_notifications: row.get(1)?,
                    appointment_reminders: row.get(2)?,
                    lab_results: row.get(3)?,
                })
            },
        )
        .optional()?;
    Ok(stored.unwrap_or_default())
}

pub fn upsert_notification_settings(
    conn: &Connection,
    user_id: &Uuid,
    settings: &NotificationSettings,
) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT INTO notification_settings (user_id, email_notifications, sms_notifications,
         appointment_reminders, lab_results, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)
         ON CONFLICT(user_id) DO UPDATE SET
             email_notifications = excluded.email_notifications,
             sms_notifications = excluded.sms_notifications,
             appointment_reminders = excluded.appointment_reminders,
             lab_results = excluded.lab_results,
             updated_at = excluded.updated_at",
        params![
            user_id.to_string(),
            settings.email_notifications,
            settings.sms_notifications,
            settings.appointment_reminders,
            settings.lab_results,
            fmt_datetime(&now()),
        ],
    )?;
    Ok(())
}

pub fn get_security_settings(
    conn: &Connection,
    user_id: &Uuid,
) -> Result<SecuritySettings, DatabaseError> {
    let stored = conn
        .query_row(
            "SELECT two_factor_enabled, login_alerts FROM security_settings WHERE user_id = ?1",
            params![user_id.to_string()],
            |row| {
                Ok(SecuritySettings {
                    two_factor_enabled: row.get(0)?,
                    login_alerts: row.get(1)?,
                })
            },
        )
        .optional()?;
    Ok(stored.unwrap_or_default())
}

pub fn upsert_security_settings(
    conn: &Connection,
    user_id: &Uuid,
    settings: &SecuritySettings,
) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT INTO security_settings (user_id, two_factor_enabled, login_alerts, updated_at)
         VALUES (?1, ?2, ?3, ?4)
         ON CONFLICT(user_id) DO UPDATE SET
             two_factor_enabled = excluded.two_factor_enabled,
             login_alerts = excluded.login_alerts,
             updated_at = excluded.updated_at",
        params![
            user_id.to_string(),
            settings.two_factor_enabled,
            settings.login_alerts,
            fmt_datetime(&now()),
        ],
    )?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repository::fixtures::{make_user, test_db};

    #[test]
    fn medical_info_upsert_overwrites() {
        let conn = test_db();
        let user = make_user(&conn, "pat@example.com", Role::Patient);
        assert!(get_medical_info(&conn, &user.id).unwrap().is_none());

        let mut info = MedicalInfo {
            blood_type: Some("O+".into()),
            height: Some(172.0),
            weight: Some(68.5),
            allergies: vec!["penicillin".into()],
            conditions: vec![],
            medications: vec![],
        };
        upsert_medical_info(&conn, &user.id, &info).unwrap();
        info.allergies.push("latex".into());
        upsert_medical_info(&conn, &user.id, &info).unwrap();

        let loaded = get_medical_info(&conn, &user.id).unwrap().unwrap();
        assert_eq!(loaded.allergies, vec!["penicillin", "latex"]);
        assert_eq!(loaded.blood_type.as_deref(), Some("O+"));
    }

    #[test]
    fn settings_default_until_saved() {
        let conn = test_db();
        let user = make_user(&conn, "pat@example.com", Role::Patient);
        assert_eq!(
            get_notification_settings(&conn, &user.id).unwrap(),
            NotificationSettings::default()
        );
        let security = get_security_settings(&conn, &user.id).unwrap();
        assert!(!security.two_factor_enabled);
        assert!(security.login_alerts);

        upsert_security_settings(
            &conn,
            &user.id,
            &SecuritySettings {
                two_factor_enabled: true,
                login_alerts: false,
            },
        )
        .unwrap();
        assert!(get_security_settings(&conn, &user.id).unwrap().two_factor_enabled);
    }

    #[test]
    fn contact_and_insurance_round_trip() {
        let conn = test_db();
        let user = make_user(&conn, "pat@example.com", Role::Patient);
        upsert_emergency_contact(
            &conn,
            &user.id,
            &EmergencyContact {
                name: "Wanjiru".into(),
                phone: "0700000000".into(),
                relation: "sister".into(),
            },
        )
        .unwrap();
        upsert_insurance(
            &conn,
            &user.id,
            &Insurance {
                provider: "NHIF".into(),
                policy_number: "P-1".into(),
                group_number: None,
                holder_name: "Amina".into(),
            },
        )
        .unwrap();

        assert_eq!(get_emergency_contact(&conn, &user.id).unwrap().unwrap().relation, "sister");
        assert_eq!(get_insurance(&conn, &user.id).unwrap().unwrap().provider, "NHIF");
    }
}
