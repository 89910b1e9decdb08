use chrono::{DateTime, Utc};
use tracing::{debug, warn};
use uuid::Uuid;

use physician_cell::models::{AvailableSlot, BookedInterval};
use physician_cell::services::{intervals_overlap, AvailabilityService};
use shared_config::AppConfig;

use crate::models::AppointmentError;

pub struct ConflictDetectionService {
    availability: AvailabilityService,
}

impl ConflictDetectionService {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            availability: AvailabilityService::new(config),
        }
    }

    /// Scheduled appointments of the physician overlapping `[start_time, end_time)`.
    pub async fn check_conflicts(
        &self,
        physician_id: Uuid,
        start_time: DateTime<Utc>,
        end_time: DateTime<Utc>,
        exclude_appointment_id: Option<Uuid>,
        auth_token: &str,
    ) -> Result<Vec<BookedInterval>, AppointmentError> {
        debug!("Checking conflicts for physician {} from {} to {}",
               physician_id, start_time, end_time);

        let booked = self.availability.get_booked_intervals(
            physician_id,
            start_time,
            end_time,
            exclude_appointment_id,
            Some(auth_token),
        ).await?;

        let conflicting: Vec<BookedInterval> = booked.into_iter()
            .filter(|b| intervals_overlap(start_time, end_time, b.start_time, b.end_time))
            .collect();

        if !conflicting.is_empty() {
            warn!("Conflict detected for physician {} - {} conflicting appointments",
                  physician_id, conflicting.len());
        }

        Ok(conflicting)
    }

    /// The physician's offered windows for the day `start_time` falls on.
    pub async fn schedule_windows(
        &self,
        physician_id: Uuid,
        start_time: DateTime<Utc>,
        auth_token: &str,
    ) -> Result<Vec<AvailableSlot>, AppointmentError> {
        let windows = self.availability.get_candidate_windows(
            physician_id,
            start_time.date_naive(),
            Some(auth_token),
        ).await?;
        Ok(windows)
    }
}

/// Whether `[start, end)` lies inside one of the offered windows.
pub fn fits_schedule(windows: &[AvailableSlot], start: DateTime<Utc>, end: DateTime<Utc>) -> bool {
    windows.iter().any(|w| w.contains(start, end))
}

/// The first overlapping scheduled booking other than `own_id`.
///
/// A rival seen after a write means the write is backed out. No winner is
/// picked: when two writers collide, both back out.
pub fn overlapping_rival(own_id: Uuid, overlapping: &[BookedInterval]) -> Option<&BookedInterval> {
    overlapping.iter().find(|other| other.id != own_id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(h: u32, m: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 10, h, m, 0).unwrap()
    }

    fn interval(id: Uuid) -> BookedInterval {
        BookedInterval {
            id,
            start_time: at(9, 0),
            end_time: at(9, 30),
        }
    }

    #[test]
    fn window_must_contain_whole_interval() {
        let windows = vec![AvailableSlot::new(at(9, 0), at(10, 0))];
        assert!(fits_schedule(&windows, at(9, 0), at(9, 30)));
        assert!(fits_schedule(&windows, at(9, 30), at(10, 0)));
        assert!(!fits_schedule(&windows, at(9, 45), at(10, 15)));
        assert!(!fits_schedule(&[], at(9, 0), at(9, 30)));
    }

    #[test]
    fn booking_may_start_inside_a_partly_booked_window() {
        // availability hides the whole 09:00-12:00 window once 09:30 is taken,
        // but a free 10:00 consultation inside it is still bookable
        let window = AvailableSlot::new(at(9, 0), at(12, 0));
        let taken = BookedInterval { id: Uuid::new_v4(), start_time: at(9, 30), end_time: at(10, 0) };

        assert!(physician_cell::services::available_slots(std::slice::from_ref(&window), std::slice::from_ref(&taken)).is_empty());
        assert!(fits_schedule(std::slice::from_ref(&window), at(10, 0), at(10, 30)));
        assert!(!intervals_overlap(at(10, 0), at(10, 30), taken.start_time, taken.end_time));
    }

    #[test]
    fn any_other_overlapping_booking_is_a_rival() {
        let own = Uuid::new_v4();
        let other = interval(Uuid::new_v4());

        assert_eq!(overlapping_rival(own, std::slice::from_ref(&other)).map(|b| b.id), Some(other.id));
        assert!(overlapping_rival(own, &[]).is_none());
    }

    #[test]
    fn own_row_is_never_a_rival() {
        let own = Uuid::new_v4();
        assert!(overlapping_rival(own, &[interval(own)]).is_none());
    }
}
