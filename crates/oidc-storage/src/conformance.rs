//! Behavioural test-suite shared by all [`Storage`] backends.
//!
//! Backends call [`run_tests`] from their own integration tests with a
//! factory producing a fresh, empty storage:
//!
//! ```ignore
//! #[tokio::test]
//! async fn conformance() {
//!     oidc_storage::conformance::run_tests(|| async { MyStorage::new() }).await;
//! }
//! ```
//!
//! Failures panic, like `assert!`.

use std::collections::BTreeMap;
use std::future::Future;

use time::{Duration, OffsetDateTime};

use crate::types::{
    AuthCode, AuthRequest, Claims, Client, Connector, JsonWebKey, Keys, OfflineSessions, Password,
    Pkce, RefreshToken, RefreshTokenRef, VerificationKey, new_id,
};
use crate::{Storage, StorageError};

/// Runs every conformance check, each against a fresh storage.
pub async fn run_tests<S, F, Fut>(new_storage: F)
where
    S: Storage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    test_client_crud(&new_storage().await).await;
    test_auth_request_crud(&new_storage().await).await;
    test_auth_code_crud(&new_storage().await).await;
    test_refresh_token_crud(&new_storage().await).await;
    test_password_crud(&new_storage().await).await;
    test_offline_sessions_crud(&new_storage().await).await;
    test_connector_crud(&new_storage().await).await;
    test_keys_crud(&new_storage().await).await;
    test_garbage_collection(&new_storage().await).await;
    test_close(&new_storage().await).await;
}

fn now() -> OffsetDateTime {
    OffsetDateTime::now_utc()
        .replace_nanosecond(0)
        .expect("zero nanoseconds is in range")
}

fn claims() -> Claims {
    Claims {
        user_id: "1".to_string(),
        username: "jane".to_string(),
        preferred_username: "jane.doe".to_string(),
        email: "jane.doe@example.com".to_string(),
        email_verified: true,
        groups: vec!["a".to_string(), "b".to_string()],
    }
}

fn assert_not_found<T: std::fmt::Debug>(result: Result<T, StorageError>, what: &str) {
    match result {
        Err(StorageError::NotFound) => {}
        other => panic!("{what}: expected NotFound, got {other:?}"),
    }
}

fn assert_already_exists(result: Result<(), StorageError>, what: &str) {
    match result {
        Err(StorageError::AlreadyExists) => {}
        other => panic!("{what}: expected AlreadyExists, got {other:?}"),
    }
}

fn auth_code(id: String, expiry: OffsetDateTime) -> AuthCode {
    AuthCode {
        id,
        client_id: "client1".to_string(),
        redirect_uri: "https://localhost:80/callback".to_string(),
        nonce: "foobar".to_string(),
        scopes: vec!["openid".to_string(), "email".to_string()],
        connector_id: "ldap".to_string(),
        connector_data: br#"{"some":"data"}"#.to_vec(),
        claims: claims(),
        expiry,
        pkce: Pkce {
            code_challenge: "12345".to_string(),
            code_challenge_method: "plain".to_string(),
        },
    }
}

fn auth_request(id: String, expiry: OffsetDateTime) -> AuthRequest {
    AuthRequest {
        id,
        client_id: "client1".to_string(),
        response_types: vec!["code".to_string()],
        scopes: vec!["openid".to_string(), "email".to_string()],
        redirect_uri: "https://localhost:80/callback".to_string(),
        nonce: "foo".to_string(),
        state: "bar".to_string(),
        force_approval_prompt: true,
        expiry,
        logged_in: false,
        claims: Claims::default(),
        connector_id: "ldap".to_string(),
        connector_data: br#"{"some":"data"}"#.to_vec(),
        pkce: Pkce::default(),
        hmac_key: b"hmac_key".to_vec(),
    }
}

fn refresh_token(id: String) -> RefreshToken {
    let created = now();
    RefreshToken {
        id,
        token: "bar".to_string(),
        obsolete_token: String::new(),
        created_at: created,
        last_used: created,
        client_id: "client_id".to_string(),
        connector_id: "client_secret".to_string(),
        connector_data: br#"{"some":"data"}"#.to_vec(),
        claims: claims(),
        scopes: vec!["openid".to_string()],
        nonce: "foo".to_string(),
    }
}

fn jwk(kid: &str) -> JsonWebKey {
    let mut params = BTreeMap::new();
    params.insert("n".to_string(), serde_json::json!("sXchDaQebHnPiGvyDOAT4saGEUetSyo9MKLOoWFsueri23bOdgWp4Dy1WlUzewbgBHod5pcM9H95GQRV3JDXboIRROSBigeC5yjU1hGzHHyXss8UDprecbAYxknTcQkhslANGRUZmdTOQ5qTRsLAt6BTYuyvVRdhS8exSZEy_c4gs_7svlJJQ4H9_NxsiIoLwAEk7-Q3UXERGYw_75IDrGA84-lA_-Ct4eTlXHBIY2EaV7t7LjJaynVJCpkv4LKjTTAumiGUIuQhrNhZLuF_RJLqHpM2kgWFLU7-VTdL1VbC2tejvcI2BlMkEpk1BzBZI0KQB0GaDWFLN-aEAw3vRw"));
    params.insert("e".to_string(), serde_json::json!("AQAB"));
    JsonWebKey {
        kty: "RSA".to_string(),
        key_use: Some("sig".to_string()),
        kid: Some(kid.to_string()),
        alg: Some("RS256".to_string()),
        params,
    }
}

/// Create, get, list, update and delete of [`Client`].
pub async fn test_client_crud(s: &dyn Storage) {
    let id = new_id();
    let client = Client {
        id: id.clone(),
        secret: "foobar".to_string(),
        redirect_uris: vec!["foo://bar.com/".to_string(), "https://auth.example.com".to_string()],
        trusted_peers: vec![],
        public: false,
        name: "dex client".to_string(),
        logo_url: "https://goo.gl/JIyzIC".to_string(),
    };

    assert_not_found(s.get_client(&id).await, "get missing client");
    assert_not_found(s.delete_client(&id).await, "delete missing client");
    assert_not_found(
        s.update_client(&id, Box::new(|old| Ok(old))).await,
        "update missing client",
    );

    s.create_client(&client).await.expect("create client");
    assert_already_exists(s.create_client(&client).await, "create duplicate client");

    let got = s.get_client(&id).await.expect("get client");
    assert_eq!(got, client);

    s.update_client(
        &id,
        Box::new(|mut old| {
            old.secret = "barfoo".to_string();
            old.redirect_uris.push("https://new.example.com".to_string());
            Ok(old)
        }),
    )
    .await
    .expect("update client");

    let got = s.get_client(&id).await.expect("get updated client");
    assert_eq!(got.secret, "barfoo");
    assert_eq!(got.redirect_uris.len(), 3);

    let err = s
        .update_client(
            &id,
            Box::new(|_| Err(StorageError::rejected("client is frozen"))),
        )
        .await
        .expect_err("failing updater must surface");
    assert!(err.is_rejected(), "unexpected error {err:?}");
    assert_eq!(s.get_client(&id).await.expect("get client"), got);

    let clients = s.list_clients().await.expect("list clients");
    assert_eq!(clients, vec![got]);

    s.delete_client(&id).await.expect("delete client");
    assert_not_found(s.get_client(&id).await, "get deleted client");
    assert!(s.list_clients().await.expect("list clients").is_empty());
}

/// Create, get, update and delete of [`AuthRequest`].
pub async fn test_auth_request_crud(s: &dyn Storage) {
    let id = new_id();
    let request = auth_request(id.clone(), now() + Duration::minutes(10));

    assert_not_found(s.get_auth_request(&id).await, "get missing auth request");

    s.create_auth_request(&request).await.expect("create auth request");
    assert_already_exists(
        s.create_auth_request(&request).await,
        "create duplicate auth request",
    );
    assert_eq!(
        s.get_auth_request(&id).await.expect("get auth request"),
        request
    );

    let identity = claims();
    let expected = identity.clone();
    s.update_auth_request(
        &id,
        Box::new(move |mut old| {
            old.logged_in = true;
            old.claims = identity;
            Ok(old)
        }),
    )
    .await
    .expect("update auth request");

    let got = s.get_auth_request(&id).await.expect("get auth request");
    assert!(got.logged_in);
    assert_eq!(got.claims, expected);

    s.delete_auth_request(&id).await.expect("delete auth request");
    assert_not_found(s.get_auth_request(&id).await, "get deleted auth request");
    assert_not_found(
        s.update_auth_request(&id, Box::new(|old| Ok(old))).await,
        "update missing auth request",
    );
}

/// Create, get and delete of [`AuthCode`].
pub async fn test_auth_code_crud(s: &dyn Storage) {
    let first = auth_code(new_id(), now() + Duration::minutes(10));
    let second = auth_code(new_id(), now() + Duration::minutes(10));

    s.create_auth_code(&first).await.expect("create auth code");
    s.create_auth_code(&second).await.expect("create second auth code");
    assert_already_exists(s.create_auth_code(&first).await, "create duplicate auth code");

    assert_eq!(s.get_auth_code(&first.id).await.expect("get auth code"), first);

    s.delete_auth_code(&first.id).await.expect("delete auth code");
    assert_not_found(s.get_auth_code(&first.id).await, "get deleted auth code");
    assert_not_found(
        s.delete_auth_code(&first.id).await,
        "delete deleted auth code",
    );
    assert_eq!(
        s.get_auth_code(&second.id).await.expect("get second auth code"),
        second
    );
}

/// Create, get, list, update and delete of [`RefreshToken`].
pub async fn test_refresh_token_crud(s: &dyn Storage) {
    let token = refresh_token(new_id());
    let id = token.id.clone();

    s.create_refresh(&token).await.expect("create refresh token");
    assert_already_exists(s.create_refresh(&token).await, "create duplicate refresh token");
    assert_eq!(s.get_refresh(&id).await.expect("get refresh token"), token);

    let used = now() + Duration::minutes(1);
    s.update_refresh_token(
        &id,
        Box::new(move |mut old| {
            old.obsolete_token = std::mem::take(&mut old.token);
            old.token = "baz".to_string();
            old.last_used = used;
            Ok(old)
        }),
    )
    .await
    .expect("update refresh token");

    let got = s.get_refresh(&id).await.expect("get refresh token");
    assert_eq!(got.token, "baz");
    assert_eq!(got.obsolete_token, "bar");
    assert_eq!(got.last_used, used);

    let tokens = s.list_refresh_tokens().await.expect("list refresh tokens");
    assert_eq!(tokens, vec![got]);

    s.delete_refresh(&id).await.expect("delete refresh token");
    assert_not_found(s.get_refresh(&id).await, "get deleted refresh token");
    assert_not_found(
        s.update_refresh_token(&id, Box::new(|old| Ok(old))).await,
        "update missing refresh token",
    );
}

/// Passwords are keyed by lowercased email.
pub async fn test_password_crud(s: &dyn Storage) {
    let password = Password {
        email: "Jane@Example.com".to_string(),
        hash: b"$2a$10$33EMT0cVYVlPy6WAMCLsceLYjWhuHpbz5yuZxu/GAFj03J9Lytjuy".to_vec(),
        username: "jane".to_string(),
        user_id: "foobar".to_string(),
    };

    s.create_password(&password).await.expect("create password");

    let mut duplicate = password.clone();
    duplicate.email = "JANE@example.COM".to_string();
    assert_already_exists(
        s.create_password(&duplicate).await,
        "create password differing only in case",
    );

    for email in ["jane@example.com", "JANE@EXAMPLE.COM", "Jane@Example.com"] {
        assert_eq!(
            s.get_password(email).await.expect("get password"),
            password,
            "lookup by {email}"
        );
    }

    s.update_password(
        "jane@example.com",
        Box::new(|mut old| {
            old.username = "jane.doe".to_string();
            Ok(old)
        }),
    )
    .await
    .expect("update password");
    assert_eq!(
        s.get_password("jane@example.com")
            .await
            .expect("get password")
            .username,
        "jane.doe"
    );

    let passwords = s.list_passwords().await.expect("list passwords");
    assert_eq!(passwords.len(), 1);

    s.delete_password("JANE@EXAMPLE.COM")
        .await
        .expect("delete password");
    assert_not_found(s.get_password("jane@example.com").await, "get deleted password");
}

/// Offline sessions round-trip their refresh map.
pub async fn test_offline_sessions_crud(s: &dyn Storage) {
    let user_id = new_id();
    let sessions = OfflineSessions {
        user_id: user_id.clone(),
        conn_id: "github".to_string(),
        refresh: BTreeMap::new(),
        connector_data: br#"{"some":"data"}"#.to_vec(),
    };

    assert_not_found(
        s.get_offline_sessions(&user_id, "github").await,
        "get missing offline sessions",
    );
    assert_not_found(
        s.update_offline_sessions(&user_id, "github", Box::new(|old| Ok(old)))
            .await,
        "update missing offline sessions",
    );

    s.create_offline_sessions(&sessions)
        .await
        .expect("create offline sessions");
    assert_already_exists(
        s.create_offline_sessions(&sessions).await,
        "create duplicate offline sessions",
    );
    assert_eq!(
        s.get_offline_sessions(&user_id, "github")
            .await
            .expect("get offline sessions"),
        sessions
    );

    let token = refresh_token(new_id());
    let token_ref = RefreshTokenRef::from(&token);
    let inserted = token_ref.clone();
    s.update_offline_sessions(
        &user_id,
        "github",
        Box::new(move |mut old| {
            old.refresh.insert(inserted.client_id.clone(), inserted);
            Ok(old)
        }),
    )
    .await
    .expect("update offline sessions");

    let got = s
        .get_offline_sessions(&user_id, "github")
        .await
        .expect("get offline sessions");
    assert_eq!(got.refresh.get(&token.client_id), Some(&token_ref));

    // Same user through another connector is a distinct row
    assert_not_found(
        s.get_offline_sessions(&user_id, "gitlab").await,
        "get offline sessions of other connector",
    );

    s.delete_offline_sessions(&user_id, "github")
        .await
        .expect("delete offline sessions");
    assert_not_found(
        s.get_offline_sessions(&user_id, "github").await,
        "get deleted offline sessions",
    );
}

/// Create, get, list, update and delete of [`Connector`].
pub async fn test_connector_crud(s: &dyn Storage) {
    let connector = Connector {
        id: new_id(),
        connector_type: "Default".to_string(),
        name: "Default".to_string(),
        resource_version: "1".to_string(),
        config: br#"{"issuer":"https://accounts.google.com"}"#.to_vec(),
    };
    let id = connector.id.clone();

    s.create_connector(&connector).await.expect("create connector");
    assert_already_exists(s.create_connector(&connector).await, "create duplicate connector");
    assert_eq!(s.get_connector(&id).await.expect("get connector"), connector);

    s.update_connector(
        &id,
        Box::new(|mut old| {
            old.name = "New Name".to_string();
            old.resource_version = "2".to_string();
            Ok(old)
        }),
    )
    .await
    .expect("update connector");

    let connectors = s.list_connectors().await.expect("list connectors");
    assert_eq!(connectors.len(), 1);
    assert_eq!(connectors[0].name, "New Name");

    s.delete_connector(&id).await.expect("delete connector");
    assert_not_found(s.get_connector(&id).await, "get deleted connector");
    assert_not_found(
        s.update_connector(&id, Box::new(|old| Ok(old))).await,
        "update missing connector",
    );
}

/// The key ring is created by its first update.
pub async fn test_keys_crud(s: &dyn Storage) {
    assert_not_found(s.get_keys().await, "get missing keys");

    let rotation = now() + Duration::hours(6);
    let keys = Keys {
        signing_key: Some(jwk("current")),
        signing_key_pub: Some(jwk("current")),
        verification_keys: vec![VerificationKey {
            public_key: jwk("previous"),
            expiry: now() + Duration::hours(1),
        }],
        next_rotation: rotation,
    };

    let written = keys.clone();
    s.update_keys(Box::new(move |old| {
        assert_eq!(old, Keys::default(), "first update must start from empty keys");
        Ok(written)
    }))
    .await
    .expect("update keys");

    assert_eq!(s.get_keys().await.expect("get keys"), keys);

    let err = s
        .update_keys(Box::new(|_| Err(StorageError::rejected("not yet"))))
        .await
        .expect_err("failing updater must surface");
    assert!(err.is_rejected(), "unexpected error {err:?}");
    assert_eq!(s.get_keys().await.expect("get keys"), keys);
}

/// Expired auth codes and requests are collected, live ones are kept.
pub async fn test_garbage_collection(s: &dyn Storage) {
    let expiry = now() + Duration::minutes(1);

    let expired_code = auth_code(new_id(), expiry);
    let live_code = auth_code(new_id(), expiry + Duration::hours(1));
    let expired_request = auth_request(new_id(), expiry);

    s.create_auth_code(&expired_code).await.expect("create auth code");
    s.create_auth_code(&live_code).await.expect("create auth code");
    s.create_auth_request(&expired_request)
        .await
        .expect("create auth request");

    let result = s
        .garbage_collect(expiry - Duration::hours(1))
        .await
        .expect("garbage collect");
    assert!(result.is_empty(), "nothing expired yet, got {result:?}");

    // Expiry exactly equal to now is not yet expired
    let result = s.garbage_collect(expiry).await.expect("garbage collect");
    assert!(result.is_empty(), "boundary is exclusive, got {result:?}");

    let result = s
        .garbage_collect(expiry + Duration::minutes(1))
        .await
        .expect("garbage collect");
    assert_eq!(result.auth_codes, 1);
    assert_eq!(result.auth_requests, 1);

    assert_not_found(s.get_auth_code(&expired_code.id).await, "get collected auth code");
    assert_not_found(
        s.get_auth_request(&expired_request.id).await,
        "get collected auth request",
    );
    assert_eq!(
        s.get_auth_code(&live_code.id).await.expect("get live auth code"),
        live_code
    );

    let result = s
        .garbage_collect(expiry + Duration::minutes(1))
        .await
        .expect("garbage collect");
    assert!(result.is_empty(), "second sweep must be empty, got {result:?}");
}

/// Operations after close fail.
pub async fn test_close(s: &dyn Storage) {
    s.close().await.expect("close");
    let result = s.list_clients().await;
    assert!(result.is_err(), "list after close returned {result:?}");
}
