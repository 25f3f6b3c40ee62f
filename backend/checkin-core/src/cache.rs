// src/cache.rs

use crate::api_client::{CheckinClient, CheckinError};
use crate::calendar::MonthKey;
use crate::models::{AttendanceRecord, Shift};
use async_trait::async_trait;
use chrono::NaiveDate;
use std::collections::HashMap;
use std::hash::Hash;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::{debug, info};

pub const WEEK_SHIFT_CACHE_TTL: Duration = Duration::from_secs(60);

pub type SharedShiftCache = Arc<Mutex<ShiftCache>>;

/// Where monthly attendance comes from.
#[async_trait]
pub trait AttendanceSource: Send + Sync {
    async fn fetch_month(
        &self,
        month: MonthKey,
        user_id: Option<&str>,
    ) -> Result<Vec<AttendanceRecord>, CheckinError>;
}

#[async_trait]
impl AttendanceSource for CheckinClient {
    /// `getAttendanceDetails`; without a user id the backend answers for everyone.
    async fn fetch_month(
        &self,
        month: MonthKey,
        user_id: Option<&str>,
    ) -> Result<Vec<AttendanceRecord>, CheckinError> {
        let mut params = vec![("month", month.to_string())];
        if let Some(user_id) = user_id {
            params.push(("userId", user_id.to_string()));
        }
        let response = self
            .call("getAttendanceDetails", &params)
            .await?
            .into_result("getAttendanceDetails")?;
        Ok(response.records())
    }
}

/// Plain month-keyed map. No eviction; cleared explicitly.
#[derive(Debug, Default, Clone)]
pub struct MonthCache {
    entries: HashMap<MonthKey, Vec<AttendanceRecord>>,
}

impl MonthCache {
    pub fn get(&self, month: &MonthKey) -> Option<&Vec<AttendanceRecord>> {
        self.entries.get(month)
    }

    pub fn insert(&mut self, month: MonthKey, records: Vec<AttendanceRecord>) {
        self.entries.insert(month, records);
    }

    pub fn contains(&self, month: &MonthKey) -> bool {
        self.entries.contains_key(month)
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Attendance for one user, fetched through a [`MonthCache`].
pub struct AttendanceBook<S: AttendanceSource> {
    source: S,
    user_id: Option<String>,
    cache: MonthCache,
}

impl<S: AttendanceSource> AttendanceBook<S> {
    pub fn new(source: S, user_id: Option<String>) -> Self {
        Self {
            source,
            user_id,
            cache: MonthCache::default(),
        }
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    /// Records for the month; repeated calls reuse the cached set.
    pub async fn month_records(&mut self, month: MonthKey) -> Result<&[AttendanceRecord], CheckinError> {
        if !self.cache.contains(&month) {
            info!("Fetching attendance for {} (not cached)...", month);
            let records = self
                .source
                .fetch_month(month, self.user_id.as_deref())
                .await?;
            self.cache.insert(month, records);
        } else {
            debug!("Using cached attendance for {}", month);
        }
        Ok(self.cache.get(&month).map(Vec::as_slice).unwrap_or(&[]))
    }

    /// Records for one date, read from that date's month cache.
    pub async fn records_for_day(&mut self, date: NaiveDate) -> Result<Vec<AttendanceRecord>, CheckinError> {
        let key = date.format("%Y-%m-%d").to_string();
        let records = self.month_records(MonthKey::of(date)).await?;
        Ok(records
            .iter()
            .filter(|r| r.date_key() == key)
            .cloned()
            .collect())
    }

    /// Dropped after actions that change attendance.
    pub fn invalidate(&mut self) {
        debug!("Clearing month cache ({} entries)", self.cache.len());
        self.cache.clear();
    }
}

/// Single-slot cache whose entry expires after a fixed age.
#[derive(Debug, Clone)]
pub struct TimedCache<K, V> {
    ttl: Duration,
    slot: Option<(K, V, Instant)>,
}

impl<K: PartialEq + Eq + Hash, V: Clone> TimedCache<K, V> {
    pub fn new(ttl: Duration) -> Self {
        Self { ttl, slot: None }
    }

    pub fn get(&self, key: &K) -> Option<V> {
        self.get_at(key, Instant::now())
    }

    pub fn get_at(&self, key: &K, now: Instant) -> Option<V> {
        match &self.slot {
            Some((cached_key, value, stored_at))
                if cached_key == key && now.saturating_duration_since(*stored_at) < self.ttl =>
            {
                Some(value.clone())
            }
            _ => None,
        }
    }

    pub fn put(&mut self, key: K, value: V) {
        self.put_at(key, value, Instant::now());
    }

    pub fn put_at(&mut self, key: K, value: V, now: Instant) {
        self.slot = Some((key, value, now));
    }

    pub fn clear(&mut self) {
        self.slot = None;
    }
}

/// Today's shift plus the upcoming week, both dropped after a punch-in.
#[derive(Debug, Clone)]
pub struct ShiftCache {
    pub today: Option<(NaiveDate, Option<Shift>)>,
    pub week: TimedCache<String, Vec<Shift>>,
}

impl Default for ShiftCache {
    fn default() -> Self {
        Self {
            today: None,
            week: TimedCache::new(WEEK_SHIFT_CACHE_TTL),
        }
    }
}

impl ShiftCache {
    pub fn shared() -> SharedShiftCache {
        Arc::new(Mutex::new(Self::default()))
    }

    pub fn week_key(start: NaiveDate, end: NaiveDate) -> String {
        format!("{}_{}", start.format("%Y-%m-%d"), end.format("%Y-%m-%d"))
    }

    pub fn clear(&mut self) {
        self.today = None;
        self.week.clear();
    }
}
