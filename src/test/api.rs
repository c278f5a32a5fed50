#[cfg(test)]
mod tests {
    use crate::api::{
        AnalyticsResponse, DatabaseResponse, HomeResponse, LoginResponse, ProfileResponse,
        SettingsResponse,
    };
    use crate::test::utils::{
        STANDARD_PASSWORD, TestDbBuilder, create_standard_test_db, login_test_user,
        setup_test_client,
    };
    use rocket::http::{ContentType, Cookie, Status};
    use serde_json::json;

    #[rocket::async_test]
    async fn test_login_api() {
        let test_db = create_standard_test_db().await;
        let (client, _) = setup_test_client(test_db).await;

        let response = client
            .post("/login")
            .header(ContentType::JSON)
            .body(
                json!({
                    "email": "alice@example.com",
                    "password": STANDARD_PASSWORD
                })
                .to_string(),
            )
            .dispatch()
            .await;

        assert_eq!(response.status(), Status::Ok);

        let body = response.into_string().await.unwrap();
        let login_response: LoginResponse = serde_json::from_str(&body).unwrap();

        assert!(login_response.success);
        assert!(login_response.user.is_some());
        assert_eq!(login_response.user.unwrap().username, "alice");
        assert_eq!(login_response.redirect_url.as_deref(), Some("/home"));

        let response = client
            .post("/login")
            .header(ContentType::JSON)
            .body(
                json!({
                    "email": "alice@example.com",
                    "password": "wrong_password"
                })
                .to_string(),
            )
            .dispatch()
            .await;

        assert_eq!(response.status(), Status::Ok);

        let body = response.into_string().await.unwrap();
        let login_response: LoginResponse = serde_json::from_str(&body).unwrap();

        assert!(!login_response.success);
        assert!(login_response.error.is_some());
    }

    #[rocket::async_test]
    async fn test_auth_required_apis() {
        let test_db = create_standard_test_db().await;
        let (client, _) = setup_test_client(test_db).await;

        let endpoints = vec!["/home", "/database", "/analytics", "/settings", "/profile"];

        for endpoint in endpoints {
            let response = client.get(endpoint).dispatch().await;
            assert_eq!(
                response.status(),
                Status::Unauthorized,
                "Endpoint {} did not require authentication",
                endpoint
            );
        }
    }

    #[rocket::async_test]
    async fn test_api_session_security() {
        let test_db = create_standard_test_db().await;
        let (client, _) = setup_test_client(test_db).await;

        let forged_cookie = Cookie::build(("session_token", "fake_token")).build();

        let response = client
            .get("/home")
            .private_cookie(forged_cookie)
            .dispatch()
            .await;

        assert_eq!(
            response.status(),
            Status::Unauthorized,
            "Forged session token was accepted"
        );

        login_test_user(&client, "alice@example.com", STANDARD_PASSWORD).await;

        let response = client.get("/home").dispatch().await;

        assert_eq!(response.status(), Status::Ok);
    }

    #[rocket::async_test]
    async fn test_signup_api() {
        let test_db = create_standard_test_db().await;
        let (client, _) = setup_test_client(test_db).await;

        let response = client
            .post("/signup")
            .header(ContentType::JSON)
            .body(
                json!({
                    "email": "carol@example.com",
                    "username": "carol",
                    "password": "Arpeggio#9"
                })
                .to_string(),
            )
            .dispatch()
            .await;

        assert_eq!(response.status(), Status::Created);

        login_test_user(&client, "carol@example.com", "Arpeggio#9").await;

        // Duplicate username
        let response = client
            .post("/signup")
            .header(ContentType::JSON)
            .body(
                json!({
                    "email": "other@example.com",
                    "username": "alice",
                    "password": "Arpeggio#9"
                })
                .to_string(),
            )
            .dispatch()
            .await;

        assert_eq!(response.status(), Status::Conflict);

        // Duplicate email
        let response = client
            .post("/signup")
            .header(ContentType::JSON)
            .body(
                json!({
                    "email": "alice@example.com",
                    "username": "alice2",
                    "password": "Arpeggio#9"
                })
                .to_string(),
            )
            .dispatch()
            .await;

        assert_eq!(response.status(), Status::Conflict);
    }

    #[rocket::async_test]
    async fn test_signup_rejects_bad_input() {
        let test_db = create_standard_test_db().await;
        let (client, _) = setup_test_client(test_db).await;

        let cases = vec![
            // Empty fields
            json!({ "email": "", "username": "", "password": "" }),
            // Weak password: no punctuation
            json!({ "email": "dave@example.com", "username": "dave", "password": "Abcdef12" }),
            // Malformed email
            json!({ "email": "not-an-email", "username": "dave", "password": "Arpeggio#9" }),
        ];

        for case in cases {
            let response = client
                .post("/signup")
                .header(ContentType::JSON)
                .body(case.to_string())
                .dispatch()
                .await;

            assert_eq!(
                response.status(),
                Status::UnprocessableEntity,
                "Signup accepted bad input: {}",
                case
            );
        }
    }

    #[rocket::async_test]
    async fn test_instrument_flow() {
        let test_db = create_standard_test_db().await;
        let (client, _) = setup_test_client(test_db).await;

        login_test_user(&client, "alice@example.com", STANDARD_PASSWORD).await;

        let response = client
            .post("/database")
            .header(ContentType::JSON)
            .body(json!({ "name": "Strat", "kind": "Guitar" }).to_string())
            .dispatch()
            .await;

        assert_eq!(response.status(), Status::Created);

        let response = client.get("/database").dispatch().await;
        assert_eq!(response.status(), Status::Ok);

        let body = response.into_string().await.unwrap();
        let database: DatabaseResponse = serde_json::from_str(&body).unwrap();

        assert_eq!(database.instruments.len(), 3);

        let current = database.current_instrument.expect("No current instrument");
        assert_eq!(current.name, "Strat");
        assert_eq!(current.compound_name, "Strat - Guitar");

        // Switch back to the seeded instrument
        let response = client
            .post("/changeinstr")
            .header(ContentType::JSON)
            .body(json!({ "name": "Les Paul" }).to_string())
            .dispatch()
            .await;

        assert_eq!(response.status(), Status::Ok);

        let response = client.get("/home").dispatch().await;
        let body = response.into_string().await.unwrap();
        let home: HomeResponse = serde_json::from_str(&body).unwrap();

        let current = home.current_instrument.expect("No current instrument");
        assert_eq!(current.name, "Les Paul");
        assert_eq!(home.strings.len(), 2);

        // Unknown instrument name
        let response = client
            .post("/changeinstr")
            .header(ContentType::JSON)
            .body(json!({ "name": "Theremin" }).to_string())
            .dispatch()
            .await;

        assert_eq!(response.status(), Status::NotFound);
    }

    #[rocket::async_test]
    async fn test_string_flow() {
        let test_db = create_standard_test_db().await;
        let (client, test_db) = setup_test_client(test_db).await;

        login_test_user(&client, "alice@example.com", STANDARD_PASSWORD).await;

        let response = client
            .post("/add_strings")
            .header(ContentType::JSON)
            .body(json!({ "name": "D String", "cost": 9.75 }).to_string())
            .dispatch()
            .await;

        assert_eq!(response.status(), Status::Created);

        let high_e = test_db.string_id("High E").expect("String not found");

        let response = client
            .post("/change_strings")
            .header(ContentType::JSON)
            .body(json!({ "string_id": high_e, "cost": 11.0 }).to_string())
            .dispatch()
            .await;

        assert_eq!(response.status(), Status::Ok);

        let response = client.get("/database").dispatch().await;
        let body = response.into_string().await.unwrap();
        let database: DatabaseResponse = serde_json::from_str(&body).unwrap();

        assert_eq!(database.strings.len(), 3);

        let updated = database
            .strings
            .iter()
            .find(|s| s.id == high_e)
            .expect("Updated string missing");
        assert_eq!(updated.name, "High E");
        assert_eq!(updated.cost, 11.0);

        // Negative cost is rejected before any write
        let response = client
            .post("/add_strings")
            .header(ContentType::JSON)
            .body(json!({ "name": "Broken", "cost": -1.0 }).to_string())
            .dispatch()
            .await;

        assert_eq!(response.status(), Status::UnprocessableEntity);
    }

    #[rocket::async_test]
    async fn test_practice_session_and_analytics() {
        let test_db = create_standard_test_db().await;
        let (client, test_db) = setup_test_client(test_db).await;

        login_test_user(&client, "alice@example.com", STANDARD_PASSWORD).await;

        let high_e = test_db.string_id("High E").expect("String not found");

        let response = client
            .post("/addsession")
            .header(ContentType::JSON)
            .body(
                json!({
                    "string_id": high_e,
                    "playtime_minutes": 60,
                    "played_on": "2025-06-03"
                })
                .to_string(),
            )
            .dispatch()
            .await;

        assert_eq!(response.status(), Status::Created);

        let response = client.get("/analytics").dispatch().await;
        assert_eq!(response.status(), Status::Ok);

        let body = response.into_string().await.unwrap();
        let analytics: AnalyticsResponse = serde_json::from_str(&body).unwrap();

        assert_eq!(
            analytics.instrument.expect("No current instrument").name,
            "Les Paul"
        );

        let high_e_report = analytics
            .strings
            .iter()
            .find(|s| s.string_id == high_e)
            .expect("High E missing from analytics");

        // 45 + 30 seeded plus the 60 just logged
        assert_eq!(high_e_report.total_minutes, 135);
        assert_eq!(high_e_report.level, 3);

        let low_e_report = analytics
            .strings
            .iter()
            .find(|s| s.name == "Low E")
            .expect("Low E missing from analytics");

        assert_eq!(low_e_report.total_minutes, 0);
        assert_eq!(low_e_report.level, 3);

        // Non-numeric playtime must not reach the database
        let response = client
            .post("/addsession")
            .header(ContentType::JSON)
            .body(
                json!({
                    "string_id": high_e,
                    "playtime_minutes": "lots",
                    "played_on": "2025-06-03"
                })
                .to_string(),
            )
            .dispatch()
            .await;

        assert_ne!(response.status(), Status::Created);

        let response = client
            .post("/addsession")
            .header(ContentType::JSON)
            .body(
                json!({
                    "string_id": high_e,
                    "playtime_minutes": -5,
                    "played_on": "2025-06-03"
                })
                .to_string(),
            )
            .dispatch()
            .await;

        assert_eq!(response.status(), Status::UnprocessableEntity);
    }

    #[rocket::async_test]
    async fn test_no_current_instrument() {
        let test_db = TestDbBuilder::new()
            .user("carol@example.com", "carol")
            .build()
            .await
            .expect("Failed to build test database");
        let (client, _) = setup_test_client(test_db).await;

        login_test_user(&client, "carol@example.com", STANDARD_PASSWORD).await;

        let response = client.get("/home").dispatch().await;
        assert_eq!(response.status(), Status::Ok);

        let body = response.into_string().await.unwrap();
        let home: HomeResponse = serde_json::from_str(&body).unwrap();

        assert!(home.current_instrument.is_none());
        assert!(home.strings.is_empty());

        let response = client
            .post("/add_strings")
            .header(ContentType::JSON)
            .body(json!({ "name": "High E", "cost": 10.0 }).to_string())
            .dispatch()
            .await;

        assert_eq!(response.status(), Status::BadRequest);
    }

    #[rocket::async_test]
    async fn test_settings_and_profile() {
        let test_db = create_standard_test_db().await;
        let (client, _) = setup_test_client(test_db).await;

        login_test_user(&client, "alice@example.com", STANDARD_PASSWORD).await;

        let response = client.get("/settings").dispatch().await;
        assert_eq!(response.status(), Status::Ok);

        let body = response.into_string().await.unwrap();
        let settings: SettingsResponse = serde_json::from_str(&body).unwrap();

        assert_eq!(settings.email, "alice@example.com");
        assert_eq!(settings.username, "alice");
        assert_eq!(
            settings.current_instrument.expect("No current instrument").name,
            "Les Paul"
        );

        let response = client.get("/profile").dispatch().await;
        assert_eq!(response.status(), Status::Ok);

        let body = response.into_string().await.unwrap();
        let profile: ProfileResponse = serde_json::from_str(&body).unwrap();

        assert_eq!(profile.user.username, "alice");
        assert_eq!(profile.instrument_count, 2);
        assert_eq!(profile.session_count, 2);
        assert_eq!(profile.total_minutes, 75);
        assert_eq!(profile.sessions.len(), 2);
    }

    #[rocket::async_test]
    async fn test_change_password_api() {
        let test_db = create_standard_test_db().await;
        let (client, _) = setup_test_client(test_db).await;

        login_test_user(&client, "alice@example.com", STANDARD_PASSWORD).await;

        let response = client
            .post("/changePassword")
            .header(ContentType::JSON)
            .body(
                json!({
                    "current_password": "wrong_password",
                    "new_password": "NewTune#2025"
                })
                .to_string(),
            )
            .dispatch()
            .await;

        assert_eq!(response.status(), Status::Unauthorized);

        // Weak replacement is rejected up front
        let response = client
            .post("/changePassword")
            .header(ContentType::JSON)
            .body(
                json!({
                    "current_password": STANDARD_PASSWORD,
                    "new_password": "weak"
                })
                .to_string(),
            )
            .dispatch()
            .await;

        assert_eq!(response.status(), Status::UnprocessableEntity);

        let response = client
            .post("/changePassword")
            .header(ContentType::JSON)
            .body(
                json!({
                    "current_password": STANDARD_PASSWORD,
                    "new_password": "NewTune#2025"
                })
                .to_string(),
            )
            .dispatch()
            .await;

        assert_eq!(response.status(), Status::Ok);

        // Old credentials no longer authenticate
        let response = client
            .post("/login")
            .header(ContentType::JSON)
            .body(
                json!({
                    "email": "alice@example.com",
                    "password": STANDARD_PASSWORD
                })
                .to_string(),
            )
            .dispatch()
            .await;

        let body = response.into_string().await.unwrap();
        let login_response: LoginResponse = serde_json::from_str(&body).unwrap();
        assert!(!login_response.success);

        login_test_user(&client, "alice@example.com", "NewTune#2025").await;
    }

    #[rocket::async_test]
    async fn test_logout_clears_session() {
        let test_db = create_standard_test_db().await;
        let (client, _) = setup_test_client(test_db).await;

        login_test_user(&client, "alice@example.com", STANDARD_PASSWORD).await;

        let response = client.get("/home").dispatch().await;
        assert_eq!(response.status(), Status::Ok);

        let response = client.get("/logout").dispatch().await;
        assert_eq!(response.status(), Status::SeeOther);

        let response = client.get("/home").dispatch().await;
        assert_eq!(response.status(), Status::Unauthorized);
    }

    #[rocket::async_test]
    async fn test_health_endpoint() {
        let test_db = create_standard_test_db().await;
        let (client, _) = setup_test_client(test_db).await;

        let response = client.get("/health").dispatch().await;
        assert_eq!(response.status(), Status::Ok);
        assert_eq!(response.into_string().await.unwrap(), "OK");
    }
}
