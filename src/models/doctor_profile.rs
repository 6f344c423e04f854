use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::enums::{EducationType, Weekday};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DoctorEducation {
    pub id: Uuid,
    pub doctor_id: Uuid,
    pub title: String,
    pub institution: String,
    pub year: i64,
    pub education_type: EducationType,
    pub license_number: Option<String>,
    pub expiry_date: Option<NaiveDate>,
    pub created_at: NaiveDateTime,
    pub updated_at: Option<NaiveDateTime>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DoctorContactInfo {
    pub hospital: Option<String>,
    pub department: Option<String>,
    pub location: Option<String>,
    pub languages: Vec<String>,
    pub consultation_fee: Option<f64>,
    pub response_rate: f64,
    pub on_time_rate: f64,
    pub patient_satisfaction: f64,
}

impl Default for DoctorContactInfo {
    fn default() -> Self {
        Self {
            hospital: None,
            department: None,
            location: None,
            languages: Vec::new(),
            consultation_fee: None,
            response_rate: 98.0,
            on_time_rate: 95.0,
            patient_satisfaction: 4.9,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DoctorAvailability {
    pub id: Uuid,
    pub doctor_id: Uuid,
    pub day: Weekday,
    pub is_open: bool,
    pub start_time: Option<String>,
    pub end_time: Option<String>,
    pub break_start: Option<String>,
    pub break_end: Option<String>,
    pub appointment_duration: i64,
    pub buffer_time: i64,
    pub max_appointments_per_day: i64,
}

impl DoctorAvailability {
    /// Weekdays open 09:00-17:00 with a lunch break; weekends closed.
    pub fn default_for(doctor_id: Uuid, day: Weekday) -> Self {
        let open = !day.is_weekend();
        let when_open = |t: &str| open.then(|| t.to_string());
        Self {
            id: Uuid::new_v4(),
            doctor_id,
            day,
            is_open: open,
            start_time: Some("09:00".into()),
            end_time: when_open("17:00"),
            break_start: when_open("12:00"),
            break_end: when_open("13:00"),
            appointment_duration: 30,
            buffer_time: 10,
            max_appointments_per_day: 20,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DoctorSettings {
    pub show_profile_to_patients: bool,
    pub show_rating_reviews: bool,
    pub allow_online_booking: bool,
    pub show_availability: bool,
    pub email_notifications: bool,
    pub sms_notifications: bool,
    pub appointment_reminders: bool,
    pub new_appointment_requests: bool,
    pub cancellation_alerts: bool,
    pub patient_messages: bool,
    pub weekly_summary: bool,
    pub marketing_emails: bool,
    pub in_person_consultations: bool,
    pub video_consultations: bool,
    pub phone_consultations: bool,
    pub chat_consultations: bool,
}

impl Default for DoctorSettings {
    fn default() -> Self {
        Self {
            show_profile_to_patients: true,
            show_rating_reviews: true,
            allow_online_booking: true,
            show_availability: true,
            email_notifications: true,
            sms_notifications: true,
            appointment_reminders: true,
            new_appointment_requests: true,
            cancellation_alerts: true,
            patient_messages: true,
            weekly_summary: false,
            marketing_emails: false,
            in_person_consultations: true,
            video_consultations: true,
            phone_consultations: true,
            chat_consultations: false,
        }
    }
}
