use rusqlite::Connection;
use serde::Serialize;

use crate::db::DatabaseError;
use crate::models::AppointmentStatus;

use super::{count_appointments, count_prescriptions, count_users};

#[derive(Debug, Clone, Serialize)]
pub struct DashboardCounts {
    pub total_users: i64,
    pub total_appointments: i64,
    pub total_prescriptions: i64,
    /// Appointments still in `scheduled`.
    pub upcoming_appointments: i64,
}

pub fn dashboard_counts(conn: &Connection) -> Result<DashboardCounts, DatabaseError> {
    Ok(DashboardCounts {
        total_users: count_users(conn)?,
        total_appointments: count_appointments(conn, None)?,
        total_prescriptions: count_prescriptions(conn)?,
        upcoming_appointments: count_appointments(conn, Some(AppointmentStatus::Scheduled))?,
    })
}
