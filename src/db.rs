use crate::{
    auth::{DbUser, DbUserSession, User, UserSession},
    error::AppError,
    models::{
        DbInstrument, DbInstrumentString, DbPracticeSession, DbProfileStats, DbStringPlaytime,
        Instrument, InstrumentString, PracticeSession, ProfileStats, StringPlaytime, compound_name,
    },
};
use chrono::{NaiveDate, NaiveDateTime, Utc};
use sqlx::{Pool, Sqlite};
use tracing::{info, instrument};

#[instrument]
pub async fn get_user(pool: &Pool<Sqlite>, id: i64) -> Result<User, AppError> {
    info!("Fetching user by ID");
    let row = sqlx::query_as::<_, DbUser>(
        "SELECT id, email, username, current_instrument_id FROM users WHERE id = ?",
    )
    .bind(id)
    .fetch_optional(pool)
    .await?;

    match row {
        Some(user) => Ok(User::from(user)),
        _ => Err(AppError::NotFound(format!(
            "User with id {} not found in database",
            id
        ))),
    }
}

#[instrument]
pub async fn find_user_by_email(
    pool: &Pool<Sqlite>,
    email: &str,
) -> Result<Option<User>, AppError> {
    info!("Looking up user by email");
    let row = sqlx::query_as::<_, DbUser>(
        "SELECT id, email, username, current_instrument_id FROM users WHERE email = ?",
    )
    .bind(email)
    .fetch_optional(pool)
    .await?;

    Ok(row.map(User::from))
}

#[instrument]
pub async fn find_user_by_username(
    pool: &Pool<Sqlite>,
    username: &str,
) -> Result<Option<User>, AppError> {
    info!("Looking up user by username");
    let row = sqlx::query_as::<_, DbUser>(
        "SELECT id, email, username, current_instrument_id FROM users WHERE username = ?",
    )
    .bind(username)
    .fetch_optional(pool)
    .await?;

    Ok(row.map(User::from))
}

#[instrument(skip(pool, password))]
pub async fn create_user(
    pool: &Pool<Sqlite>,
    email: &str,
    username: &str,
    password: &str,
) -> Result<i64, AppError> {
    info!("Creating new user");

    let existing_username =
        sqlx::query_scalar::<_, i64>("SELECT id FROM users WHERE username = ?")
            .bind(username)
            .fetch_optional(pool)
            .await?;

    if existing_username.is_some() {
        return Err(AppError::Validation(format!(
            "Username '{}' already exists",
            username
        )));
    }

    let existing_email = sqlx::query_scalar::<_, i64>("SELECT id FROM users WHERE email = ?")
        .bind(email)
        .fetch_optional(pool)
        .await?;

    if existing_email.is_some() {
        return Err(AppError::Validation(format!(
            "Email '{}' is already registered",
            email
        )));
    }

    let hashed_password = bcrypt::hash(password, bcrypt::DEFAULT_COST)?;

    let res = sqlx::query("INSERT INTO users (email, username, password) VALUES (?, ?, ?)")
        .bind(email)
        .bind(username)
        .bind(hashed_password)
        .execute(pool)
        .await?;

    Ok(res.last_insert_rowid())
}

#[derive(sqlx::FromRow)]
struct DbCredentials {
    id: Option<i64>,
    email: Option<String>,
    username: Option<String>,
    password: Option<String>,
    current_instrument_id: Option<i64>,
}

#[instrument(skip(pool, password))]
pub async fn authenticate_user(
    pool: &Pool<Sqlite>,
    email: &str,
    password: &str,
) -> Result<Option<User>, AppError> {
    info!("Authenticating user");
    let row = sqlx::query_as::<_, DbCredentials>(
        "SELECT id, email, username, password, current_instrument_id FROM users WHERE email = ?",
    )
    .bind(email)
    .fetch_optional(pool)
    .await?;

    match row {
        Some(credentials) => {
            let stored_hash = credentials.password.clone().unwrap_or_default();

            match bcrypt::verify(password, &stored_hash) {
                Ok(true) => Ok(Some(User {
                    id: credentials.id.unwrap_or_default(),
                    email: credentials.email.unwrap_or_default(),
                    username: credentials.username.unwrap_or_default(),
                    current_instrument_id: credentials.current_instrument_id,
                })),
                _ => Ok(None),
            }
        }
        _ => Ok(None),
    }
}

#[instrument(skip_all, fields(user_id))]
pub async fn update_user_password(
    pool: &Pool<Sqlite>,
    user_id: i64,
    new_password: &str,
) -> Result<(), AppError> {
    info!("Updating user password");
    let hashed_password = bcrypt::hash(new_password, bcrypt::DEFAULT_COST)?;

    sqlx::query("UPDATE users SET password = ? WHERE id = ?")
        .bind(hashed_password)
        .bind(user_id)
        .execute(pool)
        .await?;

    Ok(())
}

#[instrument]
pub async fn create_instrument(
    pool: &Pool<Sqlite>,
    user_id: i64,
    name: &str,
    kind: &str,
) -> Result<i64, AppError> {
    info!("Creating instrument");
    let compound = compound_name(name, kind);

    let res = sqlx::query(
        "INSERT INTO instruments (user_id, name, kind, compound_name) VALUES (?, ?, ?, ?)",
    )
    .bind(user_id)
    .bind(name)
    .bind(kind)
    .bind(compound)
    .execute(pool)
    .await?;

    Ok(res.last_insert_rowid())
}

#[instrument]
pub async fn get_instruments(pool: &Pool<Sqlite>, user_id: i64) -> Result<Vec<Instrument>, AppError> {
    info!("Getting instruments for user");
    let rows = sqlx::query_as::<_, DbInstrument>(
        "SELECT id, user_id, name, kind, compound_name
         FROM instruments
         WHERE user_id = ?
         ORDER BY id",
    )
    .bind(user_id)
    .fetch_all(pool)
    .await?;

    Ok(rows.into_iter().map(Instrument::from).collect())
}

/// Same-named instruments tie-break to the most recently added row, matching
/// how the current selection has always behaved after an add.
#[instrument]
pub async fn find_instrument_by_name(
    pool: &Pool<Sqlite>,
    user_id: i64,
    name: &str,
) -> Result<Option<Instrument>, AppError> {
    info!("Looking up instrument by name");
    let row = sqlx::query_as::<_, DbInstrument>(
        "SELECT id, user_id, name, kind, compound_name
         FROM instruments
         WHERE user_id = ? AND name = ?
         ORDER BY id DESC
         LIMIT 1",
    )
    .bind(user_id)
    .bind(name)
    .fetch_optional(pool)
    .await?;

    Ok(row.map(Instrument::from))
}

#[instrument]
pub async fn get_instrument_for_user(
    pool: &Pool<Sqlite>,
    user_id: i64,
    instrument_id: i64,
) -> Result<Instrument, AppError> {
    info!("Getting instrument");
    let row = sqlx::query_as::<_, DbInstrument>(
        "SELECT id, user_id, name, kind, compound_name
         FROM instruments
         WHERE id = ? AND user_id = ?",
    )
    .bind(instrument_id)
    .bind(user_id)
    .fetch_optional(pool)
    .await?;

    match row {
        Some(instrument) => Ok(Instrument::from(instrument)),
        _ => Err(AppError::NotFound(format!(
            "Instrument with id {} not found for user",
            instrument_id
        ))),
    }
}

#[instrument]
pub async fn set_current_instrument(
    pool: &Pool<Sqlite>,
    user_id: i64,
    instrument_id: i64,
) -> Result<(), AppError> {
    info!("Setting current instrument");
    sqlx::query("UPDATE users SET current_instrument_id = ? WHERE id = ?")
        .bind(instrument_id)
        .bind(user_id)
        .execute(pool)
        .await?;

    Ok(())
}

#[instrument]
pub async fn create_string(
    pool: &Pool<Sqlite>,
    instrument_id: i64,
    name: &str,
    cost: f64,
) -> Result<i64, AppError> {
    info!("Creating string");

    if cost < 0.0 {
        return Err(AppError::Validation(
            "String cost must not be negative".to_string(),
        ));
    }

    let res = sqlx::query("INSERT INTO strings (instrument_id, name, cost) VALUES (?, ?, ?)")
        .bind(instrument_id)
        .bind(name)
        .bind(cost)
        .execute(pool)
        .await?;

    Ok(res.last_insert_rowid())
}

#[instrument]
pub async fn get_strings_for_instrument(
    pool: &Pool<Sqlite>,
    user_id: i64,
    instrument_id: i64,
) -> Result<Vec<InstrumentString>, AppError> {
    info!("Getting strings for instrument");
    let rows = sqlx::query_as::<_, DbInstrumentString>(
        "SELECT s.id, s.instrument_id, s.name, s.cost
         FROM strings s
         JOIN instruments i ON i.id = s.instrument_id
         WHERE s.instrument_id = ? AND i.user_id = ?
         ORDER BY s.id",
    )
    .bind(instrument_id)
    .bind(user_id)
    .fetch_all(pool)
    .await?;

    Ok(rows.into_iter().map(InstrumentString::from).collect())
}

#[instrument]
pub async fn get_string_for_user(
    pool: &Pool<Sqlite>,
    user_id: i64,
    string_id: i64,
) -> Result<InstrumentString, AppError> {
    info!("Getting string");
    let row = sqlx::query_as::<_, DbInstrumentString>(
        "SELECT s.id, s.instrument_id, s.name, s.cost
         FROM strings s
         JOIN instruments i ON i.id = s.instrument_id
         WHERE s.id = ? AND i.user_id = ?",
    )
    .bind(string_id)
    .bind(user_id)
    .fetch_optional(pool)
    .await?;

    match row {
        Some(string) => Ok(InstrumentString::from(string)),
        _ => Err(AppError::NotFound(format!(
            "String with id {} not found for user",
            string_id
        ))),
    }
}

#[instrument]
pub async fn update_string(
    pool: &Pool<Sqlite>,
    user_id: i64,
    string_id: i64,
    name: &str,
    cost: f64,
) -> Result<(), AppError> {
    info!("Updating string");

    if cost < 0.0 {
        return Err(AppError::Validation(
            "String cost must not be negative".to_string(),
        ));
    }

    // Ownership check before the write
    get_string_for_user(pool, user_id, string_id).await?;

    sqlx::query("UPDATE strings SET name = ?, cost = ? WHERE id = ?")
        .bind(name)
        .bind(cost)
        .bind(string_id)
        .execute(pool)
        .await?;

    Ok(())
}

#[instrument]
pub async fn create_practice_session(
    pool: &Pool<Sqlite>,
    user_id: i64,
    instrument_id: i64,
    string_id: i64,
    playtime_minutes: i64,
    played_on: NaiveDate,
) -> Result<i64, AppError> {
    info!("Logging practice session");

    if playtime_minutes < 0 {
        return Err(AppError::Validation(
            "Playtime must not be negative".to_string(),
        ));
    }

    let res = sqlx::query(
        "INSERT INTO practice_sessions (user_id, instrument_id, string_id, playtime_minutes, played_on)
         VALUES (?, ?, ?, ?, ?)",
    )
    .bind(user_id)
    .bind(instrument_id)
    .bind(string_id)
    .bind(playtime_minutes)
    .bind(played_on)
    .execute(pool)
    .await?;

    Ok(res.last_insert_rowid())
}

#[instrument]
pub async fn get_practice_sessions(
    pool: &Pool<Sqlite>,
    user_id: i64,
) -> Result<Vec<PracticeSession>, AppError> {
    info!("Getting practice sessions");
    let rows = sqlx::query_as::<_, DbPracticeSession>(
        "SELECT id, user_id, instrument_id, string_id, playtime_minutes, played_on, created_at
         FROM practice_sessions
         WHERE user_id = ?
         ORDER BY played_on DESC, id DESC",
    )
    .bind(user_id)
    .fetch_all(pool)
    .await?;

    Ok(rows.into_iter().map(PracticeSession::from).collect())
}

/// All-time totals, recomputed per request. Strings without any logged
/// session come back with zero minutes.
#[instrument]
pub async fn string_playtime_totals(
    pool: &Pool<Sqlite>,
    user_id: i64,
    instrument_id: i64,
) -> Result<Vec<StringPlaytime>, AppError> {
    info!("Aggregating playtime per string");
    let rows = sqlx::query_as::<_, DbStringPlaytime>(
        "SELECT s.id AS string_id, s.name, COALESCE(SUM(p.playtime_minutes), 0) AS total_minutes
         FROM strings s
         JOIN instruments i ON i.id = s.instrument_id
         LEFT JOIN practice_sessions p ON p.string_id = s.id
         WHERE s.instrument_id = ? AND i.user_id = ?
         GROUP BY s.id, s.name
         ORDER BY s.id",
    )
    .bind(instrument_id)
    .bind(user_id)
    .fetch_all(pool)
    .await?;

    Ok(rows.into_iter().map(StringPlaytime::from).collect())
}

#[instrument]
pub async fn get_profile_stats(pool: &Pool<Sqlite>, user_id: i64) -> Result<ProfileStats, AppError> {
    info!("Getting profile stats");
    let row = sqlx::query_as::<_, DbProfileStats>(
        "SELECT
            (SELECT COUNT(*) FROM instruments WHERE user_id = ?1) AS instrument_count,
            (SELECT COUNT(*) FROM practice_sessions WHERE user_id = ?1) AS session_count,
            (SELECT COALESCE(SUM(playtime_minutes), 0) FROM practice_sessions WHERE user_id = ?1)
                AS total_minutes",
    )
    .bind(user_id)
    .fetch_one(pool)
    .await?;

    Ok(ProfileStats::from(row))
}

#[instrument(skip(pool, token))]
pub async fn create_user_session(
    pool: &Pool<Sqlite>,
    user_id: i64,
    token: &str,
    expires_at: NaiveDateTime,
) -> Result<i64, AppError> {
    info!("Creating user session");

    let res = sqlx::query("INSERT INTO user_sessions (user_id, token, expires_at) VALUES (?, ?, ?)")
        .bind(user_id)
        .bind(token)
        .bind(expires_at)
        .execute(pool)
        .await?;

    Ok(res.last_insert_rowid())
}

#[instrument(skip(pool, token))]
pub async fn get_session_by_token(
    pool: &Pool<Sqlite>,
    token: &str,
) -> Result<UserSession, AppError> {
    info!("Getting session by token");

    let session = sqlx::query_as::<_, DbUserSession>(
        "SELECT id, user_id, token, created_at, expires_at FROM user_sessions WHERE token = ?",
    )
    .bind(token)
    .fetch_optional(pool)
    .await?;

    match session {
        Some(session) => Ok(UserSession::from(session)),
        _ => Err(AppError::Authentication(
            "Invalid session token".to_string(),
        )),
    }
}

#[instrument(skip(pool, token))]
pub async fn invalidate_session(pool: &Pool<Sqlite>, token: &str) -> Result<(), AppError> {
    info!("Invalidating session");

    sqlx::query("DELETE FROM user_sessions WHERE token = ?")
        .bind(token)
        .execute(pool)
        .await?;

    Ok(())
}

#[instrument(skip(pool))]
pub async fn clean_expired_sessions(pool: &Pool<Sqlite>) -> Result<u64, AppError> {
    info!("Cleaning expired sessions");

    let now = Utc::now().naive_utc();

    let result = sqlx::query("DELETE FROM user_sessions WHERE expires_at < ?")
        .bind(now)
        .execute(pool)
        .await?;

    Ok(result.rows_affected())
}
