use std::collections::HashSet;

use anyhow::Result;
use chrono::{DateTime, Duration, NaiveDate, NaiveTime, Utc};
use reqwest::Method;
use serde_json::Value;
use tracing::{debug, warn};
use uuid::Uuid;

use shared_config::AppConfig;
use shared_database::supabase::SupabaseClient;

use crate::models::{
    day_of_week, AvailableSlot, BookedInterval, PhysicianError, ScheduleSlot,
};

/// Three-way overlap test on half-open intervals `[start, end)`.
///
/// `a` overlaps `b` when a's start falls inside b, a's end falls inside b, or
/// a fully contains b. Touching intervals (`a_end == b_start` or
/// `a_start == b_end`) do not overlap.
pub fn intervals_overlap<T: PartialOrd>(a_start: T, a_end: T, b_start: T, b_end: T) -> bool {
    let start_inside = b_start <= a_start && a_start < b_end;
    let end_inside = b_start < a_end && a_end <= b_end;
    let contains = a_start <= b_start && b_end <= a_end;
    start_inside || end_inside || contains
}

/// Candidate windows offered on `date`: date-specific slots for that date plus
/// recurring slots for its weekday, available ones only, de-duplicated by
/// (start, end) and ordered by start.
pub fn candidate_windows(slots: &[ScheduleSlot], date: NaiveDate) -> Vec<AvailableSlot> {
    let mut seen: HashSet<(NaiveTime, NaiveTime)> = HashSet::new();
    let mut windows: Vec<AvailableSlot> = slots.iter()
        .filter(|slot| slot.is_available && slot.applies_to(date))
        .filter(|slot| {
            if slot.start_time >= slot.end_time {
                warn!("Skipping schedule slot {} with start {} not before end {}",
                      slot.id, slot.start_time, slot.end_time);
                return false;
            }
            seen.insert((slot.start_time, slot.end_time))
        })
        .map(|slot| AvailableSlot::new(
            date.and_time(slot.start_time).and_utc(),
            date.and_time(slot.end_time).and_utc(),
        ))
        .collect();

    windows.sort_by(|a, b| a.start_time.cmp(&b.start_time).then(a.end_time.cmp(&b.end_time)));
    windows
}

/// Keeps the candidates that overlap none of the booked intervals.
///
/// Pure: the output only depends on the inputs and keeps the candidates' order.
/// Malformed windows (start not before end) are dropped from the candidates
/// and ignored among the booked intervals.
pub fn available_slots(candidates: &[AvailableSlot], booked: &[BookedInterval]) -> Vec<AvailableSlot> {
    let valid_booked: Vec<&BookedInterval> = booked.iter()
        .filter(|b| {
            let ok = b.start_time < b.end_time;
            if !ok {
                warn!("Ignoring booked interval {} with start {} not before end {}",
                      b.id, b.start_time, b.end_time);
            }
            ok
        })
        .collect();

    candidates.iter()
        .filter(|c| c.start_time < c.end_time)
        .filter(|c| !valid_booked.iter().any(|b| {
            intervals_overlap(c.start_time, c.end_time, b.start_time, b.end_time)
        }))
        .cloned()
        .collect()
}

pub struct AvailabilityService {
    supabase: SupabaseClient,
}

impl AvailabilityService {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            supabase: SupabaseClient::new(config),
        }
    }

    /// Bookable windows for a physician on `date`, excluding windows that
    /// already started at `now`.
    pub async fn get_available_slots(
        &self,
        physician_id: Uuid,
        date: NaiveDate,
        now: DateTime<Utc>,
        auth_token: Option<&str>,
    ) -> Result<Vec<AvailableSlot>, PhysicianError> {
        debug!("Calculating available slots for physician {} on {}", physician_id, date);

        let (day_start, day_end) = day_bounds(date);
        let (candidates, booked) = tokio::try_join!(
            self.get_candidate_windows(physician_id, date, auth_token),
            self.get_booked_intervals(physician_id, day_start, day_end, None, auth_token),
        )?;

        let slots: Vec<AvailableSlot> = available_slots(&candidates, &booked)
            .into_iter()
            .filter(|slot| slot.start_time > now)
            .collect();

        debug!("Found {} available slots out of {} candidates", slots.len(), candidates.len());
        Ok(slots)
    }

    pub async fn get_candidate_windows(
        &self,
        physician_id: Uuid,
        date: NaiveDate,
        auth_token: Option<&str>,
    ) -> Result<Vec<AvailableSlot>, PhysicianError> {
        let path = format!(
            "/rest/v1/schedule_slots?physician_id=eq.{}&is_available=eq.true&or=(day_of_week.eq.{},specific_date.eq.{})&order=start_time.asc",
            physician_id,
            day_of_week(date),
            date
        );

        let result: Vec<Value> = self.supabase.request(
            Method::GET,
            &path,
            auth_token,
            None,
        ).await?;

        let slots: Vec<ScheduleSlot> = result.into_iter()
            .map(serde_json::from_value)
            .collect::<std::result::Result<Vec<ScheduleSlot>, _>>()?;

        Ok(candidate_windows(&slots, date))
    }

    /// Scheduled appointments of the physician overlapping `[from, to)`.
    pub async fn get_booked_intervals(
        &self,
        physician_id: Uuid,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
        exclude_appointment_id: Option<Uuid>,
        auth_token: Option<&str>,
    ) -> Result<Vec<BookedInterval>, PhysicianError> {
        let mut path = format!(
            "/rest/v1/appointments?select=id,start_time,end_time&physician_id=eq.{}&status=eq.scheduled&start_time=lt.{}&end_time=gt.{}&order=start_time.asc",
            physician_id,
            urlencoding::encode(&to.to_rfc3339()),
            urlencoding::encode(&from.to_rfc3339()),
        );

        if let Some(id) = exclude_appointment_id {
            path.push_str(&format!("&id=neq.{}", id));
        }

        let result: Vec<Value> = self.supabase.request(
            Method::GET,
            &path,
            auth_token,
            None,
        ).await?;

        let booked = result.into_iter()
            .map(serde_json::from_value)
            .collect::<std::result::Result<Vec<BookedInterval>, _>>()?;

        Ok(booked)
    }
}

pub fn day_bounds(date: NaiveDate) -> (DateTime<Utc>, DateTime<Utc>) {
    let start = date.and_time(NaiveTime::MIN).and_utc();
    (start, start + Duration::days(1))
}
