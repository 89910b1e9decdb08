use chrono::{NaiveDate, NaiveTime, Utc};
use reqwest::Method;
use serde_json::{json, Value};
use tracing::{debug, info, warn};
use uuid::Uuid;

use shared_config::AppConfig;
use shared_database::supabase::{return_representation, SupabaseClient};

use crate::models::{
    CreateSlotRequest, PhysicianError, ScheduleSlot, SlotKind, UpdateSlotRequest,
};
use crate::services::availability::intervals_overlap;

/// Shape of a slot as it would be written, used for validation before any I/O.
#[derive(Debug, Clone, PartialEq)]
pub struct SlotShape {
    pub kind: SlotKind,
    pub day_of_week: Option<i32>,
    pub specific_date: Option<NaiveDate>,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
}

impl SlotShape {
    pub fn validate(&self) -> Result<(), PhysicianError> {
        if self.start_time >= self.end_time {
            return Err(PhysicianError::Validation("Start time must be before end time".to_string()));
        }

        match self.kind {
            SlotKind::Recurring => {
                match self.day_of_week {
                    Some(day) if (0..=6).contains(&day) => {}
                    Some(_) => return Err(PhysicianError::Validation(
                        "Day of week must be between 0 (Sunday) and 6 (Saturday)".to_string()
                    )),
                    None => return Err(PhysicianError::Validation(
                        "Recurring slots require a day of week".to_string()
                    )),
                }
                if self.specific_date.is_some() {
                    return Err(PhysicianError::Validation(
                        "Recurring slots cannot carry a specific date".to_string()
                    ));
                }
            }
            SlotKind::SpecificDate => {
                if self.specific_date.is_none() {
                    return Err(PhysicianError::Validation(
                        "Date-specific slots require a date".to_string()
                    ));
                }
                if self.day_of_week.is_some() {
                    return Err(PhysicianError::Validation(
                        "Date-specific slots cannot carry a day of week".to_string()
                    ));
                }
            }
        }

        Ok(())
    }

    /// Same kind, same weekday or date, and overlapping times.
    pub fn conflicts_with(&self, other: &ScheduleSlot) -> bool {
        let same_day = match self.kind {
            SlotKind::Recurring => other.kind == SlotKind::Recurring && other.day_of_week == self.day_of_week,
            SlotKind::SpecificDate => other.kind == SlotKind::SpecificDate && other.specific_date == self.specific_date,
        };
        same_day && intervals_overlap(self.start_time, self.end_time, other.start_time, other.end_time)
    }
}

impl From<&CreateSlotRequest> for SlotShape {
    fn from(request: &CreateSlotRequest) -> Self {
        Self {
            kind: request.kind,
            day_of_week: request.day_of_week,
            specific_date: request.specific_date,
            start_time: request.start_time,
            end_time: request.end_time,
        }
    }
}

pub struct ScheduleService {
    supabase: SupabaseClient,
}

impl ScheduleService {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            supabase: SupabaseClient::new(config),
        }
    }

    pub async fn create_slot(
        &self,
        physician_id: Uuid,
        request: CreateSlotRequest,
        auth_token: &str,
    ) -> Result<ScheduleSlot, PhysicianError> {
        debug!("Creating {} slot for physician: {}", request.kind.as_str(), physician_id);

        let shape = SlotShape::from(&request);
        shape.validate()?;
        self.check_slot_conflicts(physician_id, &shape, None, auth_token).await?;

        let slot_data = json!({
            "physician_id": physician_id,
            "kind": shape.kind,
            "day_of_week": shape.day_of_week,
            "specific_date": shape.specific_date,
            "start_time": shape.start_time.format("%H:%M:%S").to_string(),
            "end_time": shape.end_time.format("%H:%M:%S").to_string(),
            "is_available": request.is_available.unwrap_or(true),
            "created_at": Utc::now().to_rfc3339(),
            "updated_at": Utc::now().to_rfc3339()
        });

        let result: Vec<Value> = self.supabase.request_with_headers(
            Method::POST,
            "/rest/v1/schedule_slots",
            Some(auth_token),
            Some(slot_data),
            Some(return_representation()),
        ).await?;

        let row = result.into_iter().next()
            .ok_or_else(|| PhysicianError::Database("Failed to create schedule slot".to_string()))?;
        let slot: ScheduleSlot = serde_json::from_value(row)?;

        info!("Schedule slot {} created for physician {}", slot.id, physician_id);
        Ok(slot)
    }

    pub async fn list_slots(
        &self,
        physician_id: Uuid,
        auth_token: &str,
    ) -> Result<Vec<ScheduleSlot>, PhysicianError> {
        let path = format!(
            "/rest/v1/schedule_slots?physician_id=eq.{}&order=kind.asc,day_of_week.asc,specific_date.asc,start_time.asc",
            physician_id
        );
        let result: Vec<Value> = self.supabase.request(
            Method::GET,
            &path,
            Some(auth_token),
            None,
        ).await?;

        Ok(result.into_iter()
            .map(serde_json::from_value)
            .collect::<std::result::Result<Vec<ScheduleSlot>, _>>()?)
    }

    pub async fn get_slot(
        &self,
        physician_id: Uuid,
        slot_id: Uuid,
        auth_token: &str,
    ) -> Result<ScheduleSlot, PhysicianError> {
        let path = format!("/rest/v1/schedule_slots?id=eq.{}&physician_id=eq.{}", slot_id, physician_id);
        let result: Vec<Value> = self.supabase.request(
            Method::GET,
            &path,
            Some(auth_token),
            None,
        ).await?;

        let row = result.into_iter().next().ok_or(PhysicianError::SlotNotFound)?;
        Ok(serde_json::from_value(row)?)
    }

    pub async fn update_slot(
        &self,
        physician_id: Uuid,
        slot_id: Uuid,
        request: UpdateSlotRequest,
        auth_token: &str,
    ) -> Result<ScheduleSlot, PhysicianError> {
        debug!("Updating schedule slot: {}", slot_id);

        let existing = self.get_slot(physician_id, slot_id, auth_token).await?;

        // The kind is fixed; only the day/date matching that kind may move
        let shape = SlotShape {
            kind: existing.kind,
            day_of_week: match existing.kind {
                SlotKind::Recurring => request.day_of_week.or(existing.day_of_week),
                SlotKind::SpecificDate => existing.day_of_week,
            },
            specific_date: match existing.kind {
                SlotKind::Recurring => existing.specific_date,
                SlotKind::SpecificDate => request.specific_date.or(existing.specific_date),
            },
            start_time: request.start_time.unwrap_or(existing.start_time),
            end_time: request.end_time.unwrap_or(existing.end_time),
        };
        shape.validate()?;
        self.check_slot_conflicts(physician_id, &shape, Some(existing.id), auth_token).await?;

        let mut update_data = serde_json::Map::new();
        update_data.insert("day_of_week".to_string(), json!(shape.day_of_week));
        update_data.insert("specific_date".to_string(), json!(shape.specific_date));
        update_data.insert("start_time".to_string(), json!(shape.start_time.format("%H:%M:%S").to_string()));
        update_data.insert("end_time".to_string(), json!(shape.end_time.format("%H:%M:%S").to_string()));
        if let Some(available) = request.is_available {
            update_data.insert("is_available".to_string(), json!(available));
        }
        update_data.insert("updated_at".to_string(), json!(Utc::now().to_rfc3339()));

        let path = format!("/rest/v1/schedule_slots?id=eq.{}&physician_id=eq.{}", slot_id, physician_id);
        let result: Vec<Value> = self.supabase.request_with_headers(
            Method::PATCH,
            &path,
            Some(auth_token),
            Some(Value::Object(update_data)),
            Some(return_representation()),
        ).await?;

        let row = result.into_iter().next().ok_or(PhysicianError::SlotNotFound)?;
        Ok(serde_json::from_value(row)?)
    }

    /// Deleting a slot leaves already booked appointments untouched.
    pub async fn delete_slot(
        &self,
        physician_id: Uuid,
        slot_id: Uuid,
        auth_token: &str,
    ) -> Result<(), PhysicianError> {
        debug!("Deleting schedule slot: {}", slot_id);

        let path = format!("/rest/v1/schedule_slots?id=eq.{}&physician_id=eq.{}", slot_id, physician_id);
        let deleted: Vec<Value> = self.supabase.request_with_headers(
            Method::DELETE,
            &path,
            Some(auth_token),
            None,
            Some(return_representation()),
        ).await?;

        if deleted.is_empty() {
            return Err(PhysicianError::SlotNotFound);
        }

        info!("Schedule slot {} deleted", slot_id);
        Ok(())
    }

    async fn check_slot_conflicts(
        &self,
        physician_id: Uuid,
        shape: &SlotShape,
        exclude_id: Option<Uuid>,
        auth_token: &str,
    ) -> Result<(), PhysicianError> {
        let mut path = format!(
            "/rest/v1/schedule_slots?physician_id=eq.{}&kind=eq.{}",
            physician_id,
            shape.kind.as_str()
        );
        match shape.kind {
            SlotKind::Recurring => {
                if let Some(day) = shape.day_of_week {
                    path.push_str(&format!("&day_of_week=eq.{}", day));
                }
            }
            SlotKind::SpecificDate => {
                if let Some(date) = shape.specific_date {
                    path.push_str(&format!("&specific_date=eq.{}", date));
                }
            }
        }
        if let Some(id) = exclude_id {
            path.push_str(&format!("&id=neq.{}", id));
        }

        let result: Vec<Value> = self.supabase.request(
            Method::GET,
            &path,
            Some(auth_token),
            None,
        ).await?;

        for row in result {
            let existing: ScheduleSlot = serde_json::from_value(row)?;
            if Some(existing.id) != exclude_id && shape.conflicts_with(&existing) {
                warn!("Slot {}-{} overlaps existing slot {} for physician {}",
                      shape.start_time, shape.end_time, existing.id, physician_id);
                return Err(PhysicianError::Conflict(format!(
                    "Slot overlaps existing slot {} ({} - {})",
                    existing.id, existing.start_time, existing.end_time
                )));
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    fn t(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    fn recurring(day: i32, start: NaiveTime, end: NaiveTime) -> SlotShape {
        SlotShape { kind: SlotKind::Recurring, day_of_week: Some(day), specific_date: None, start_time: start, end_time: end }
    }

    fn existing(shape: &SlotShape) -> ScheduleSlot {
        ScheduleSlot {
            id: Uuid::new_v4(),
            physician_id: Uuid::new_v4(),
            kind: shape.kind,
            day_of_week: shape.day_of_week,
            specific_date: shape.specific_date,
            start_time: shape.start_time,
            end_time: shape.end_time,
            is_available: true,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn start_must_precede_end() {
        assert_matches!(recurring(1, t(10, 0), t(10, 0)).validate(), Err(PhysicianError::Validation(_)));
        assert_matches!(recurring(1, t(11, 0), t(10, 0)).validate(), Err(PhysicianError::Validation(_)));
        assert!(recurring(1, t(9, 0), t(9, 30)).validate().is_ok());
    }

    #[test]
    fn kind_determines_required_fields() {
        assert!(recurring(7, t(9, 0), t(9, 30)).validate().is_err());

        let mut missing_day = recurring(1, t(9, 0), t(9, 30));
        missing_day.day_of_week = None;
        assert!(missing_day.validate().is_err());

        let specific = SlotShape {
            kind: SlotKind::SpecificDate,
            day_of_week: None,
            specific_date: NaiveDate::from_ymd_opt(2025, 3, 10),
            start_time: t(9, 0),
            end_time: t(9, 30),
        };
        assert!(specific.validate().is_ok());

        let both = SlotShape { day_of_week: Some(1), ..specific.clone() };
        assert!(both.validate().is_err());
    }

    #[test]
    fn conflicts_only_on_same_day_and_overlap() {
        let shape = recurring(1, t(9, 0), t(10, 0));

        assert!(shape.conflicts_with(&existing(&recurring(1, t(9, 30), t(10, 30)))));
        assert!(!shape.conflicts_with(&existing(&recurring(1, t(10, 0), t(10, 30)))));
        assert!(!shape.conflicts_with(&existing(&recurring(2, t(9, 0), t(10, 0)))));
    }
}
