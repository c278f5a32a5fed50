use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

/// Display name for an instrument, always `"<name> - <kind>"`.
pub fn compound_name(name: &str, kind: &str) -> String {
    format!("{} - {}", name, kind)
}

#[derive(Serialize, Deserialize, Clone)]
pub struct Instrument {
    pub id: i64,
    pub user_id: i64,
    pub name: String,
    pub kind: String,
    pub compound_name: String,
}

#[derive(sqlx::FromRow, Clone)]
pub struct DbInstrument {
    pub id: Option<i64>,
    pub user_id: Option<i64>,
    pub name: Option<String>,
    pub kind: Option<String>,
    pub compound_name: Option<String>,
}

impl From<DbInstrument> for Instrument {
    fn from(instrument: DbInstrument) -> Self {
        Self {
            id: instrument.id.unwrap_or_default(),
            user_id: instrument.user_id.unwrap_or_default(),
            name: instrument.name.unwrap_or_default(),
            kind: instrument.kind.unwrap_or_default(),
            compound_name: instrument.compound_name.unwrap_or_default(),
        }
    }
}

#[derive(Serialize, Deserialize, Clone)]
pub struct InstrumentString {
    pub id: i64,
    pub instrument_id: i64,
    pub name: String,
    pub cost: f64,
}

#[derive(sqlx::FromRow, Clone)]
pub struct DbInstrumentString {
    pub id: Option<i64>,
    pub instrument_id: Option<i64>,
    pub name: Option<String>,
    pub cost: Option<f64>,
}

impl From<DbInstrumentString> for InstrumentString {
    fn from(string: DbInstrumentString) -> Self {
        Self {
            id: string.id.unwrap_or_default(),
            instrument_id: string.instrument_id.unwrap_or_default(),
            name: string.name.unwrap_or_default(),
            cost: string.cost.unwrap_or_default(),
        }
    }
}

#[derive(Serialize, Deserialize, Clone)]
pub struct PracticeSession {
    pub id: i64,
    pub user_id: i64,
    pub instrument_id: i64,
    pub string_id: i64,
    pub playtime_minutes: i64,
    pub played_on: NaiveDate,
    pub created_at: DateTime<Utc>,
}

#[derive(sqlx::FromRow, Clone)]
pub struct DbPracticeSession {
    pub id: Option<i64>,
    pub user_id: Option<i64>,
    pub instrument_id: Option<i64>,
    pub string_id: Option<i64>,
    pub playtime_minutes: Option<i64>,
    pub played_on: Option<NaiveDate>,
    pub created_at: Option<NaiveDateTime>,
}

impl From<DbPracticeSession> for PracticeSession {
    fn from(db: DbPracticeSession) -> Self {
        Self {
            id: db.id.unwrap_or_default(),
            user_id: db.user_id.unwrap_or_default(),
            instrument_id: db.instrument_id.unwrap_or_default(),
            string_id: db.string_id.unwrap_or_default(),
            playtime_minutes: db.playtime_minutes.unwrap_or_default(),
            played_on: db.played_on.unwrap_or_else(|| Utc::now().date_naive()),
            created_at: db
                .created_at
                .map(|dt| {
                    chrono::DateTime::<chrono::Utc>::from_naive_utc_and_offset(dt, chrono::Utc)
                })
                .unwrap_or_else(chrono::Utc::now),
        }
    }
}

/// Every string is assumed to last this many hours of playtime.
pub const ASSUMED_LIFESPAN_HOURS: f64 = 100.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StringHealth {
    Low,
    Worn,
    Healthy,
}

impl StringHealth {
    /// Buckets cumulative playtime into the three health tiers. Remaining
    /// life is `1 - (minutes / 60) / ASSUMED_LIFESPAN_HOURS`; above 0.3 is
    /// healthy, above 0.10 is worn, anything below is low.
    pub fn from_total_minutes(total_minutes: i64) -> Self {
        let remaining = 1.0 - (total_minutes as f64 / 60.0) / ASSUMED_LIFESPAN_HOURS;

        if remaining > 0.3 {
            StringHealth::Healthy
        } else if remaining > 0.10 {
            StringHealth::Worn
        } else {
            StringHealth::Low
        }
    }

    pub fn level(&self) -> u8 {
        match self {
            StringHealth::Healthy => 3,
            StringHealth::Worn => 2,
            StringHealth::Low => 1,
        }
    }
}

/// Aggregated playtime per string, the input to the health buckets.
#[derive(sqlx::FromRow, Clone)]
pub struct DbStringPlaytime {
    pub string_id: Option<i64>,
    pub name: Option<String>,
    pub total_minutes: Option<i64>,
}

pub struct StringPlaytime {
    pub string_id: i64,
    pub name: String,
    pub total_minutes: i64,
}

impl From<DbStringPlaytime> for StringPlaytime {
    fn from(row: DbStringPlaytime) -> Self {
        Self {
            string_id: row.string_id.unwrap_or_default(),
            name: row.name.unwrap_or_default(),
            total_minutes: row.total_minutes.unwrap_or_default(),
        }
    }
}

#[derive(sqlx::FromRow, Clone)]
pub struct DbProfileStats {
    pub instrument_count: Option<i64>,
    pub session_count: Option<i64>,
    pub total_minutes: Option<i64>,
}

pub struct ProfileStats {
    pub instrument_count: i64,
    pub session_count: i64,
    pub total_minutes: i64,
}

impl From<DbProfileStats> for ProfileStats {
    fn from(row: DbProfileStats) -> Self {
        Self {
            instrument_count: row.instrument_count.unwrap_or_default(),
            session_count: row.session_count.unwrap_or_default(),
            total_minutes: row.total_minutes.unwrap_or_default(),
        }
    }
}
