use chrono::{NaiveDate, Utc};
use rocket::State;
use rocket::http::{Cookie, CookieJar, SameSite, Status};
use rocket::response::Redirect;
use rocket::response::status::Custom;
use rocket::serde::json::Json;
use serde::{Deserialize, Serialize};
use sqlx::{Pool, Sqlite};
use validator::Validate;

use crate::auth::{User, UserSession};
use crate::db::{
    authenticate_user, create_instrument, create_practice_session, create_string,
    create_user, create_user_session, find_instrument_by_name, find_user_by_email,
    find_user_by_username, get_instrument_for_user, get_instruments, get_profile_stats,
    get_practice_sessions, get_string_for_user, get_strings_for_instrument, invalidate_session,
    set_current_instrument, string_playtime_totals, update_string, update_user_password,
};
use crate::email::EmailVerifier;
use crate::error::AppError;
use crate::models::{Instrument, InstrumentString, PracticeSession, StringHealth, StringPlaytime};
use crate::validation::{
    AppErrorExt, JsonValidateExt, ValidationResponse, validate_email_syntax,
    validate_password_strength,
};

#[derive(Deserialize, Validate, Clone)]
pub struct SignupRequest {
    #[validate(
        length(min = 1, message = "Email must not be empty"),
        custom(function = validate_email_syntax)
    )]
    email: String,
    #[validate(length(min = 1, message = "Username must not be empty"))]
    username: String,
    #[validate(
        length(min = 1, message = "Password must not be empty"),
        custom(function = validate_password_strength)
    )]
    password: String,
}

#[derive(Deserialize, Validate)]
pub struct LoginRequest {
    #[validate(length(min = 1, message = "Email must not be empty"))]
    email: String,
    #[validate(length(min = 1, message = "Password must not be empty"))]
    password: String,
}

#[derive(Serialize, Deserialize)]
pub struct LoginResponse {
    pub success: bool,
    pub user: Option<UserData>,
    pub error: Option<String>,
    pub redirect_url: Option<String>,
}

#[derive(Serialize, Deserialize, Debug)]
pub struct UserData {
    pub id: i64,
    pub email: String,
    pub username: String,
    pub current_instrument_id: Option<i64>,
}

impl From<User> for UserData {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            email: user.email.clone(),
            username: user.username.clone(),
            current_instrument_id: user.current_instrument_id,
        }
    }
}

#[post("/signup", data = "<signup>")]
pub async fn signup(
    signup: Json<SignupRequest>,
    verifier: &State<EmailVerifier>,
    db: &State<Pool<Sqlite>>,
) -> Result<Status, Custom<Json<ValidationResponse>>> {
    let validated = signup.validate_custom()?;

    if !verifier.verify(&validated.email).await.validate_custom()? {
        return Err(Custom(
            Status::UnprocessableEntity,
            Json(ValidationResponse::with_error(
                "email",
                "Email address does not appear to be deliverable",
            )),
        ));
    }

    let existing_user = find_user_by_username(db, &validated.username)
        .await
        .validate_custom()?;

    if existing_user.is_some() {
        return Err(Custom(
            Status::Conflict,
            Json(ValidationResponse::with_error(
                "username",
                "Username already exists",
            )),
        ));
    }

    let existing_email = find_user_by_email(db, &validated.email)
        .await
        .validate_custom()?;

    if existing_email.is_some() {
        return Err(Custom(
            Status::Conflict,
            Json(ValidationResponse::with_error(
                "email",
                "Email is already registered",
            )),
        ));
    }

    create_user(db, &validated.email, &validated.username, &validated.password)
        .await
        .validate_custom()?;

    Ok(Status::Created)
}

#[post("/login", data = "<login>")]
pub async fn login(
    login: Json<LoginRequest>,
    cookies: &CookieJar<'_>,
    db: &State<Pool<Sqlite>>,
) -> Result<Json<LoginResponse>, Custom<Json<ValidationResponse>>> {
    let validated = login.validate_custom()?;

    match authenticate_user(db, &validated.email, &validated.password)
        .await
        .validate_custom()?
    {
        Some(user) => {
            let token = UserSession::generate_token();
            let expires_at = Utc::now() + chrono::Duration::hours(1);

            create_user_session(db, user.id, &token, expires_at.naive_utc())
                .await
                .validate_custom()?;

            let cookie = Cookie::build(("session_token", token))
                .same_site(SameSite::Lax)
                .http_only(true)
                .max_age(rocket::time::Duration::hours(1));
            cookies.add_private(cookie);

            cookies.add_private(
                Cookie::build(("user_id", user.id.to_string()))
                    .same_site(SameSite::Lax)
                    .http_only(true)
                    .max_age(rocket::time::Duration::hours(1)),
            );

            cookies.add_private(
                Cookie::build(("logged_in", user.username.clone()))
                    .same_site(SameSite::Lax)
                    .max_age(rocket::time::Duration::hours(1)),
            );

            Ok(Json(LoginResponse {
                success: true,
                user: Some(UserData::from(user)),
                error: None,
                redirect_url: Some("/home".to_string()),
            }))
        }
        None => Ok(Json(LoginResponse {
            success: false,
            user: None,
            error: Some("Invalid email or password".to_string()),
            redirect_url: None,
        })),
    }
}

#[get("/logout")]
pub async fn logout(cookies: &CookieJar<'_>, db: &State<Pool<Sqlite>>) -> Redirect {
    let token = cookies
        .get_private("session_token")
        .map(|cookie| cookie.value().to_string());

    if let Some(token) = token {
        let _ = invalidate_session(db, &token).await;
    }

    cookies.remove_private(Cookie::build("session_token"));
    cookies.remove_private(Cookie::build("user_id"));
    cookies.remove_private(Cookie::build("logged_in"));

    Redirect::to("/login")
}

#[derive(Serialize, Deserialize)]
pub struct HomeResponse {
    pub user: UserData,
    pub current_instrument: Option<Instrument>,
    pub strings: Vec<InstrumentString>,
}

#[get("/home")]
pub async fn home(user: User, db: &State<Pool<Sqlite>>) -> Result<Json<HomeResponse>, Status> {
    let current_instrument = match user.current_instrument_id {
        Some(id) => Some(get_instrument_for_user(db, user.id, id).await?),
        None => None,
    };

    let strings = match &current_instrument {
        Some(instrument) => get_strings_for_instrument(db, user.id, instrument.id).await?,
        None => Vec::new(),
    };

    Ok(Json(HomeResponse {
        user: UserData::from(user),
        current_instrument,
        strings,
    }))
}

#[derive(Serialize, Deserialize)]
pub struct DatabaseResponse {
    pub instruments: Vec<Instrument>,
    pub current_instrument: Option<Instrument>,
    pub strings: Vec<InstrumentString>,
}

#[get("/database")]
pub async fn database(
    user: User,
    db: &State<Pool<Sqlite>>,
) -> Result<Json<DatabaseResponse>, Status> {
    let instruments = get_instruments(db, user.id).await?;

    let current_instrument = match user.current_instrument_id {
        Some(id) => Some(get_instrument_for_user(db, user.id, id).await?),
        None => None,
    };

    let strings = match &current_instrument {
        Some(instrument) => get_strings_for_instrument(db, user.id, instrument.id).await?,
        None => Vec::new(),
    };

    Ok(Json(DatabaseResponse {
        instruments,
        current_instrument,
        strings,
    }))
}

#[derive(Deserialize, Validate, Clone)]
pub struct AddInstrumentRequest {
    #[validate(length(min = 1, message = "Instrument name must not be empty"))]
    name: String,
    #[validate(length(min = 1, message = "Instrument type must not be empty"))]
    kind: String,
}

#[post("/database", data = "<instrument>")]
pub async fn add_instrument(
    instrument: Json<AddInstrumentRequest>,
    user: User,
    db: &State<Pool<Sqlite>>,
) -> Result<Status, Custom<Json<ValidationResponse>>> {
    let validated = instrument.validate_custom()?;

    create_instrument(db, user.id, &validated.name, &validated.kind)
        .await
        .validate_custom()?;

    // The new selection comes from a name re-scan, not the inserted row id
    if let Some(instrument) = find_instrument_by_name(db, user.id, &validated.name)
        .await
        .validate_custom()?
    {
        set_current_instrument(db, user.id, instrument.id)
            .await
            .validate_custom()?;
    }

    Ok(Status::Created)
}

#[derive(Deserialize, Validate)]
pub struct ChangeInstrumentRequest {
    #[validate(length(min = 1, message = "Instrument name must not be empty"))]
    name: String,
}

#[post("/changeinstr", data = "<request>")]
pub async fn change_instrument(
    request: Json<ChangeInstrumentRequest>,
    user: User,
    db: &State<Pool<Sqlite>>,
) -> Result<Status, Custom<Json<ValidationResponse>>> {
    let validated = request.validate_custom()?;

    match find_instrument_by_name(db, user.id, &validated.name)
        .await
        .validate_custom()?
    {
        Some(instrument) => {
            set_current_instrument(db, user.id, instrument.id)
                .await
                .validate_custom()?;

            Ok(Status::Ok)
        }
        None => Err(Custom(
            Status::NotFound,
            Json(ValidationResponse::with_error("name", "Instrument not found")),
        )),
    }
}

async fn require_current_instrument(
    db: &Pool<Sqlite>,
    user: &User,
) -> Result<Instrument, AppError> {
    match user.current_instrument_id {
        Some(id) => get_instrument_for_user(db, user.id, id).await,
        None => Err(AppError::Validation("No instrument selected".to_string())),
    }
}

#[derive(Deserialize, Validate)]
pub struct AddStringRequest {
    #[validate(length(min = 1, message = "String name must not be empty"))]
    name: String,
    #[validate(range(min = 0.0, message = "Cost must not be negative"))]
    cost: f64,
}

#[post("/add_strings", data = "<string>")]
pub async fn add_strings(
    string: Json<AddStringRequest>,
    user: User,
    db: &State<Pool<Sqlite>>,
) -> Result<Status, Custom<Json<ValidationResponse>>> {
    let validated = string.validate_custom()?;

    let instrument = require_current_instrument(db, &user).await.validate_custom()?;

    create_string(db, instrument.id, &validated.name, validated.cost)
        .await
        .validate_custom()?;

    Ok(Status::Created)
}

#[derive(Deserialize)]
pub struct ChangeStringRequest {
    string_id: i64,
    name: Option<String>,
    cost: Option<f64>,
}

#[post("/change_strings", data = "<request>")]
pub async fn change_strings(
    request: Json<ChangeStringRequest>,
    user: User,
    db: &State<Pool<Sqlite>>,
) -> Result<Status, Custom<Json<ValidationResponse>>> {
    let instrument = require_current_instrument(db, &user).await.validate_custom()?;

    let string = get_string_for_user(db, user.id, request.string_id)
        .await
        .validate_custom()?;

    if string.instrument_id != instrument.id {
        return Err(Custom(
            Status::NotFound,
            Json(ValidationResponse::with_error(
                "string_id",
                "String does not belong to the current instrument",
            )),
        ));
    }

    let name = request.name.clone().unwrap_or(string.name);
    let cost = request.cost.unwrap_or(string.cost);

    update_string(db, user.id, string.id, &name, cost)
        .await
        .validate_custom()?;

    Ok(Status::Ok)
}

#[derive(Deserialize, Validate)]
pub struct AddSessionRequest {
    string_id: i64,
    #[validate(range(min = 0, message = "Playtime must not be negative"))]
    playtime_minutes: i64,
    played_on: NaiveDate,
}

#[post("/addsession", data = "<session>")]
pub async fn add_session(
    session: Json<AddSessionRequest>,
    user: User,
    db: &State<Pool<Sqlite>>,
) -> Result<Status, Custom<Json<ValidationResponse>>> {
    let validated = session.validate_custom()?;

    let instrument = require_current_instrument(db, &user).await.validate_custom()?;

    let string = get_string_for_user(db, user.id, validated.string_id)
        .await
        .validate_custom()?;

    if string.instrument_id != instrument.id {
        return Err(Custom(
            Status::NotFound,
            Json(ValidationResponse::with_error(
                "string_id",
                "String does not belong to the current instrument",
            )),
        ));
    }

    create_practice_session(
        db,
        user.id,
        instrument.id,
        string.id,
        validated.playtime_minutes,
        validated.played_on,
    )
    .await
    .validate_custom()?;

    Ok(Status::Created)
}

#[derive(Serialize, Deserialize)]
pub struct StringHealthReport {
    pub string_id: i64,
    pub name: String,
    pub total_minutes: i64,
    pub health: StringHealth,
    pub level: u8,
}

impl From<StringPlaytime> for StringHealthReport {
    fn from(playtime: StringPlaytime) -> Self {
        let health = StringHealth::from_total_minutes(playtime.total_minutes);

        Self {
            string_id: playtime.string_id,
            name: playtime.name,
            total_minutes: playtime.total_minutes,
            health,
            level: health.level(),
        }
    }
}

#[derive(Serialize, Deserialize)]
pub struct AnalyticsResponse {
    pub instrument: Option<Instrument>,
    pub strings: Vec<StringHealthReport>,
}

#[get("/analytics")]
pub async fn analytics(
    user: User,
    db: &State<Pool<Sqlite>>,
) -> Result<Json<AnalyticsResponse>, Status> {
    let instrument = match user.current_instrument_id {
        Some(id) => Some(get_instrument_for_user(db, user.id, id).await?),
        None => None,
    };

    let strings = match &instrument {
        Some(instrument) => string_playtime_totals(db, user.id, instrument.id)
            .await?
            .into_iter()
            .map(StringHealthReport::from)
            .collect(),
        None => Vec::new(),
    };

    Ok(Json(AnalyticsResponse {
        instrument,
        strings,
    }))
}

#[derive(Serialize, Deserialize)]
pub struct SettingsResponse {
    pub email: String,
    pub username: String,
    pub current_instrument: Option<Instrument>,
}

#[get("/settings")]
pub async fn settings(
    user: User,
    db: &State<Pool<Sqlite>>,
) -> Result<Json<SettingsResponse>, Status> {
    let current_instrument = match user.current_instrument_id {
        Some(id) => Some(get_instrument_for_user(db, user.id, id).await?),
        None => None,
    };

    Ok(Json(SettingsResponse {
        email: user.email,
        username: user.username,
        current_instrument,
    }))
}

#[derive(Serialize, Deserialize)]
pub struct ProfileResponse {
    pub user: UserData,
    pub instrument_count: i64,
    pub session_count: i64,
    pub total_minutes: i64,
    pub sessions: Vec<PracticeSession>,
}

#[get("/profile")]
pub async fn profile(user: User, db: &State<Pool<Sqlite>>) -> Result<Json<ProfileResponse>, Status> {
    let stats = get_profile_stats(db, user.id).await?;
    let sessions = get_practice_sessions(db, user.id).await?;

    Ok(Json(ProfileResponse {
        user: UserData::from(user),
        instrument_count: stats.instrument_count,
        session_count: stats.session_count,
        total_minutes: stats.total_minutes,
        sessions,
    }))
}

#[derive(Deserialize, Validate)]
pub struct PasswordChangeRequest {
    #[validate(length(min = 1, message = "Current password must not be empty"))]
    current_password: String,
    #[validate(custom(function = validate_password_strength))]
    new_password: String,
}

#[post("/changePassword", data = "<password>")]
pub async fn change_password(
    password: Json<PasswordChangeRequest>,
    user: User,
    db: &State<Pool<Sqlite>>,
) -> Result<Status, Custom<Json<ValidationResponse>>> {
    let validated = password.validate_custom()?;

    let is_valid = authenticate_user(db, &user.email, &validated.current_password)
        .await
        .validate_custom()?;

    match is_valid {
        Some(_) => {
            update_user_password(db, user.id, &validated.new_password)
                .await
                .validate_custom()?;

            Ok(Status::Ok)
        }
        _ => Err(Custom(
            Status::Unauthorized,
            Json(ValidationResponse::with_error(
                "current_password",
                "Current password is incorrect",
            )),
        )),
    }
}

#[get("/health")]
pub fn health() -> &'static str {
    "OK"
}
