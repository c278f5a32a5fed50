use crate::db::{
    create_instrument, create_practice_session, create_string, create_user,
    find_instrument_by_name, set_current_instrument,
};
use crate::email::EmailVerifier;
use crate::error::AppError;
use chrono::NaiveDate;
use rocket::http::{ContentType, Status};
use rocket::local::asynchronous::Client;
use serde_json::json;
use sqlx::{Pool, Sqlite, SqlitePool};
use std::collections::HashMap;
use std::sync::Once;

static INIT: Once = Once::new();
pub static STANDARD_PASSWORD: &str = "Practice#123";

#[derive(Default)]
pub struct TestDbBuilder {
    users: Vec<TestUser>,
    instruments: Vec<TestInstrument>,
    strings: Vec<TestString>,
    sessions: Vec<TestPracticeSession>,
}

pub struct TestUser {
    pub email: String,
    pub username: String,
    pub password: String,
}

pub struct TestInstrument {
    pub owner_username: String,
    pub name: String,
    pub kind: String,
}

pub struct TestString {
    pub instrument_name: String,
    pub name: String,
    pub cost: f64,
}

pub struct TestPracticeSession {
    pub username: String,
    pub instrument_name: String,
    pub string_name: String,
    pub playtime_minutes: i64,
    pub played_on: NaiveDate,
}

impl TestDbBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn user(mut self, email: &str, username: &str) -> Self {
        self.users.push(TestUser {
            email: email.to_string(),
            username: username.to_string(),
            password: STANDARD_PASSWORD.to_string(),
        });
        self
    }

    /// Each added instrument becomes its owner's current selection, the same
    /// way the add route behaves.
    pub fn instrument(mut self, owner_username: &str, name: &str, kind: &str) -> Self {
        self.instruments.push(TestInstrument {
            owner_username: owner_username.to_string(),
            name: name.to_string(),
            kind: kind.to_string(),
        });
        self
    }

    pub fn string(mut self, instrument_name: &str, name: &str, cost: f64) -> Self {
        self.strings.push(TestString {
            instrument_name: instrument_name.to_string(),
            name: name.to_string(),
            cost,
        });
        self
    }

    pub fn practice_session(
        mut self,
        username: &str,
        instrument_name: &str,
        string_name: &str,
        playtime_minutes: i64,
        played_on: NaiveDate,
    ) -> Self {
        self.sessions.push(TestPracticeSession {
            username: username.to_string(),
            instrument_name: instrument_name.to_string(),
            string_name: string_name.to_string(),
            playtime_minutes,
            played_on,
        });
        self
    }

    pub async fn build(self) -> Result<TestDb, AppError> {
        INIT.call_once(|| {
            let _ = env_logger::builder().is_test(true).try_init();
        });

        let pool = SqlitePool::connect("sqlite::memory:").await?;

        sqlx::migrate!("./migrations").run(&pool).await?;

        let mut user_id_map: HashMap<String, i64> = HashMap::new();
        let mut instrument_id_map: HashMap<String, i64> = HashMap::new();
        let mut string_id_map: HashMap<String, i64> = HashMap::new();

        for user in &self.users {
            let user_id = create_user(&pool, &user.email, &user.username, &user.password).await?;

            user_id_map.insert(user.username.clone(), user_id);
        }

        for instrument in &self.instruments {
            let user_id = user_id_map
                .get(&instrument.owner_username)
                .copied()
                .ok_or_else(|| {
                    AppError::NotFound(format!("Unknown user {}", instrument.owner_username))
                })?;

            let instrument_id =
                create_instrument(&pool, user_id, &instrument.name, &instrument.kind).await?;

            instrument_id_map.insert(instrument.name.clone(), instrument_id);

            if let Some(found) = find_instrument_by_name(&pool, user_id, &instrument.name).await? {
                set_current_instrument(&pool, user_id, found.id).await?;
            }
        }

        for string in &self.strings {
            let instrument_id = instrument_id_map
                .get(&string.instrument_name)
                .copied()
                .ok_or_else(|| {
                    AppError::NotFound(format!("Unknown instrument {}", string.instrument_name))
                })?;

            let string_id = create_string(&pool, instrument_id, &string.name, string.cost).await?;

            string_id_map.insert(string.name.clone(), string_id);
        }

        for session in &self.sessions {
            let user_id = user_id_map
                .get(&session.username)
                .copied()
                .ok_or_else(|| AppError::NotFound(format!("Unknown user {}", session.username)))?;

            let instrument_id = instrument_id_map
                .get(&session.instrument_name)
                .copied()
                .ok_or_else(|| {
                    AppError::NotFound(format!("Unknown instrument {}", session.instrument_name))
                })?;

            let string_id = string_id_map
                .get(&session.string_name)
                .copied()
                .ok_or_else(|| {
                    AppError::NotFound(format!("Unknown string {}", session.string_name))
                })?;

            create_practice_session(
                &pool,
                user_id,
                instrument_id,
                string_id,
                session.playtime_minutes,
                session.played_on,
            )
            .await?;
        }

        Ok(TestDb {
            pool,
            user_id_map,
            instrument_id_map,
            string_id_map,
        })
    }
}

pub struct TestDb {
    pub pool: Pool<Sqlite>,
    pub user_id_map: HashMap<String, i64>,
    pub instrument_id_map: HashMap<String, i64>,
    pub string_id_map: HashMap<String, i64>,
}

impl TestDb {
    pub fn user_id(&self, username: &str) -> Option<i64> {
        self.user_id_map.get(username).copied()
    }

    pub fn instrument_id(&self, name: &str) -> Option<i64> {
        self.instrument_id_map.get(name).copied()
    }

    pub fn string_id(&self, name: &str) -> Option<i64> {
        self.string_id_map.get(name).copied()
    }
}

pub fn date(year: i32, month: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(year, month, day).expect("valid date")
}

/// Two users; alice ends up with "Les Paul" as her current instrument
/// because it is the last one added for her.
pub async fn create_standard_test_db() -> TestDb {
    TestDbBuilder::new()
        .user("alice@example.com", "alice")
        .user("bob@example.com", "bob")
        .instrument("alice", "Precision", "Bass")
        .instrument("alice", "Les Paul", "Guitar")
        .instrument("bob", "Cello", "Classical")
        .string("Les Paul", "High E", 12.5)
        .string("Les Paul", "Low E", 14.0)
        .string("Cello", "A String", 30.0)
        .practice_session("alice", "Les Paul", "High E", 45, date(2025, 6, 1))
        .practice_session("alice", "Les Paul", "High E", 30, date(2025, 6, 2))
        .build()
        .await
        .expect("Failed to build test database")
}

pub async fn setup_test_client(test_db: TestDb) -> (Client, TestDb) {
    let verifier = EmailVerifier::new("http://127.0.0.1:0".to_string(), None)
        .expect("Failed to build email verifier");

    let rocket = crate::init_rocket(test_db.pool.clone(), verifier).await;

    let client = Client::tracked(rocket)
        .await
        .expect("valid rocket instance");

    (client, test_db)
}

/// The tracked client carries the session cookies forward after this.
pub async fn login_test_user(client: &Client, email: &str, password: &str) {
    let response = client
        .post("/login")
        .header(ContentType::JSON)
        .body(json!({ "email": email, "password": password }).to_string())
        .dispatch()
        .await;

    assert_eq!(response.status(), Status::Ok);
}
