use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::enums::{MessageType, VideoStatus};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VideoConsultation {
    pub id: Uuid,
    pub appointment_id: Uuid,
    pub room_id: String,
    pub doctor_id: Uuid,
    pub patient_id: Uuid,
    pub status: VideoStatus,
    pub start_time: Option<NaiveDateTime>,
    pub end_time: Option<NaiveDateTime>,
    pub recording_url: Option<String>,
    pub notes: Option<String>,
    pub created_at: NaiveDateTime,
}

impl VideoConsultation {
    pub fn is_participant(&self, user_id: &Uuid) -> bool {
        &self.doctor_id == user_id || &self.patient_id == user_id
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatRoom {
    pub id: Uuid,
    pub patient_id: Uuid,
    pub doctor_id: Uuid,
    pub appointment_id: Option<Uuid>,
    pub is_active: bool,
    pub last_message_at: Option<NaiveDateTime>,
    pub created_at: NaiveDateTime,
}

impl ChatRoom {
    pub fn is_member(&self, user_id: &Uuid) -> bool {
        &self.patient_id == user_id || &self.doctor_id == user_id
    }

    /// The other member of the room, seen from `user_id`.
    pub fn counterpart(&self, user_id: &Uuid) -> Uuid {
        if &self.patient_id == user_id {
            self.doctor_id
        } else {
            self.patient_id
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub id: Uuid,
    pub room_id: Uuid,
    pub sender_id: Uuid,
    pub recipient_id: Uuid,
    pub message: String,
    pub message_type: MessageType,
    pub is_read: bool,
    pub created_at: NaiveDateTime,
}
