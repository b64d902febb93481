use argon2::{
    Argon2, PasswordHasher,
    password_hash::{PasswordHash, PasswordVerifier, SaltString},
};
use chrono::{Duration, Utc};
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode};
use password_hash::rand_core::OsRng;
use uuid::Uuid;

use crate::{
    config::AppConfig,
    db::DbPool,
    dto::auth::{
        AuthSession, Claims, LoginRequest, MeResponse, RefreshRequest, SignupRequest, TokenKind,
        TokenPair,
    },
    error::{AppError, AppResult},
    models::{PublicUser, User},
    response::{ApiResponse, Meta},
    services::event_service::{category, record_domain_event},
    state::AppState,
};

const INVALID_CREDENTIALS: &str = "Invalid credentials";
const INVALID_REFRESH: &str = "Invalid refresh token";

pub fn validate_signup(payload: &SignupRequest) -> AppResult<()> {
    if payload.name.trim().chars().count() < 2 {
        return Err(AppError::BadRequest(
            "Name must be at least 2 characters".into(),
        ));
    }
    if !is_valid_email(&payload.email) {
        return Err(AppError::BadRequest(
            "Please enter a valid email address".into(),
        ));
    }
    if payload.phone.trim().chars().count() < 10 {
        return Err(AppError::BadRequest(
            "Phone number must be at least 10 digits".into(),
        ));
    }
    if payload.password.chars().count() < 6 {
        return Err(AppError::BadRequest(
            "Password must be at least 6 characters".into(),
        ));
    }
    if let Some(confirm) = &payload.confirm_password {
        if confirm != &payload.password {
            return Err(AppError::BadRequest("Passwords don't match".into()));
        }
    }
    Ok(())
}

pub fn validate_login(payload: &LoginRequest) -> AppResult<()> {
    if !is_valid_email(&payload.email) {
        return Err(AppError::BadRequest(
            "Please enter a valid email address".into(),
        ));
    }
    if payload.password.is_empty() {
        return Err(AppError::BadRequest("Password is required".into()));
    }
    Ok(())
}

pub fn is_valid_email(email: &str) -> bool {
    let email = email.trim();
    if email.chars().any(char::is_whitespace) {
        return false;
    }
    let Some((local, domain)) = email.split_once('@') else {
        return false;
    };
    !local.is_empty()
        && !domain.contains('@')
        && domain.contains('.')
        && domain.split('.').all(|label| !label.is_empty())
}

fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

pub fn hash_password(password: &str) -> AppResult<String> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| AppError::Internal(anyhow::anyhow!(e.to_string())))?
        .to_string();
    Ok(hash)
}

pub fn verify_password(password: &str, password_hash: &str) -> AppResult<bool> {
    let parsed_hash = PasswordHash::new(password_hash)
        .map_err(|_| AppError::Internal(anyhow::anyhow!("Invalid password hash")))?;
    Ok(Argon2::default()
        .verify_password(password.as_bytes(), &parsed_hash)
        .is_ok())
}

fn sign(user: &User, kind: TokenKind, ttl: Duration, secret: &str) -> AppResult<String> {
    let now = Utc::now();
    let expiration = now
        .checked_add_signed(ttl)
        .ok_or_else(|| AppError::Internal(anyhow::anyhow!("Failed to set expiration")))?;

    let claims = Claims {
        sub: user.id.to_string(),
        email: user.email.clone(),
        is_admin: user.is_admin,
        kind,
        iat: now.timestamp() as usize,
        exp: expiration.timestamp() as usize,
    };

    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .map_err(|e| AppError::Internal(anyhow::anyhow!(e.to_string())))
}

pub fn issue_tokens(user: &User, config: &AppConfig) -> AppResult<TokenPair> {
    Ok(TokenPair {
        access_token: sign(
            user,
            TokenKind::Access,
            Duration::minutes(config.access_token_ttl_minutes),
            &config.jwt_secret,
        )?,
        refresh_token: sign(
            user,
            TokenKind::Refresh,
            Duration::days(config.refresh_token_ttl_days),
            &config.jwt_secret,
        )?,
    })
}

/// Verify signature, expiry and token kind.
pub fn decode_token(token: &str, secret: &str, expected: TokenKind) -> AppResult<Claims> {
    let decoded = decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )
    .map_err(|_| AppError::Unauthorized("Invalid or expired token".into()))?;

    if decoded.claims.kind != expected {
        return Err(AppError::Unauthorized("Invalid token type".into()));
    }
    Ok(decoded.claims)
}

async fn find_by_email(pool: &DbPool, email: &str) -> AppResult<Option<User>> {
    let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE email = $1")
        .bind(email)
        .fetch_optional(pool)
        .await?;
    Ok(user)
}

async fn find_by_id(pool: &DbPool, id: Uuid) -> AppResult<Option<User>> {
    let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = $1")
        .bind(id)
        .fetch_optional(pool)
        .await?;
    Ok(user)
}

pub async fn signup(state: &AppState, payload: SignupRequest) -> AppResult<ApiResponse<AuthSession>> {
    validate_signup(&payload)?;
    let email = normalize_email(&payload.email);

    if find_by_email(&state.pool, &email).await?.is_some() {
        return Err(AppError::BadRequest(
            "User with this email already exists".into(),
        ));
    }

    let password_hash = hash_password(&payload.password)?;

    let user = sqlx::query_as::<_, User>(
        r#"
        INSERT INTO users (id, name, email, phone, password_hash)
        VALUES ($1, $2, $3, $4, $5)
        RETURNING *
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(payload.name.trim())
    .bind(&email)
    .bind(payload.phone.trim())
    .bind(password_hash)
    .fetch_one(&state.pool)
    .await
    .map_err(|err| match err {
        sqlx::Error::Database(db) if db.is_unique_violation() => {
            AppError::BadRequest("User with this email already exists".into())
        }
        other => AppError::DbError(other),
    })?;

    let tokens = issue_tokens(&user, &state.config)?;

    record_domain_event(
        &state.pool,
        "user_signup",
        category::AUTH,
        Some(user.id),
        serde_json::json!({ "user_id": user.id }),
    )
    .await;

    Ok(ApiResponse::success(
        "User created",
        AuthSession {
            user: user.into(),
            tokens,
        },
        Some(Meta::empty()),
    ))
}

pub async fn login(state: &AppState, payload: LoginRequest) -> AppResult<ApiResponse<AuthSession>> {
    validate_login(&payload)?;
    let email = normalize_email(&payload.email);

    let user = match find_by_email(&state.pool, &email).await? {
        Some(u) => u,
        None => return Err(AppError::Unauthorized(INVALID_CREDENTIALS.into())),
    };

    if !verify_password(&payload.password, &user.password_hash)? {
        return Err(AppError::Unauthorized(INVALID_CREDENTIALS.into()));
    }

    let tokens = issue_tokens(&user, &state.config)?;

    record_domain_event(
        &state.pool,
        "user_login",
        category::AUTH,
        Some(user.id),
        serde_json::json!({ "user_id": user.id }),
    )
    .await;

    Ok(ApiResponse::success(
        "Logged in",
        AuthSession {
            user: user.into(),
            tokens,
        },
        Some(Meta::empty()),
    ))
}

pub async fn refresh(state: &AppState, payload: RefreshRequest) -> AppResult<ApiResponse<TokenPair>> {
    if payload.refresh_token.trim().is_empty() {
        return Err(AppError::BadRequest("Refresh token is required".into()));
    }

    let claims = decode_token(
        payload.refresh_token.trim(),
        &state.config.jwt_secret,
        TokenKind::Refresh,
    )
    .map_err(|_| AppError::Unauthorized(INVALID_REFRESH.into()))?;

    let user_id = Uuid::parse_str(&claims.sub)
        .map_err(|_| AppError::Unauthorized(INVALID_REFRESH.into()))?;

    let user = match find_by_id(&state.pool, user_id).await? {
        Some(u) => u,
        None => return Err(AppError::Unauthorized("Invalid token".into())),
    };

    let tokens = issue_tokens(&user, &state.config)?;
    Ok(ApiResponse::success("Token refreshed", tokens, Some(Meta::empty())))
}

pub async fn me(pool: &DbPool, user_id: Uuid) -> AppResult<ApiResponse<MeResponse>> {
    let user = match find_by_id(pool, user_id).await? {
        Some(u) => u,
        None => return Err(AppError::NotFound("User")),
    };
    Ok(ApiResponse::success(
        "OK",
        MeResponse {
            user: PublicUser::from(user),
        },
        Some(Meta::empty()),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn signup_request() -> SignupRequest {
        SignupRequest {
            name: "John Doe".into(),
            email: "john@example.com".into(),
            phone: "+2341234567891".into(),
            password: "password".into(),
            confirm_password: Some("password".into()),
        }
    }

    fn user() -> User {
        User {
            id: Uuid::new_v4(),
            name: "John Doe".into(),
            email: "john@example.com".into(),
            phone: "+2341234567891".into(),
            password_hash: String::new(),
            is_admin: false,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn accepts_a_well_formed_signup() {
        assert!(validate_signup(&signup_request()).is_ok());
    }

    #[test]
    fn rejects_invalid_signup_fields() {
        let cases = [
            SignupRequest {
                name: "J".into(),
                ..signup_request()
            },
            SignupRequest {
                email: "not-an-email".into(),
                ..signup_request()
            },
            SignupRequest {
                phone: "12345".into(),
                ..signup_request()
            },
            SignupRequest {
                password: "abc".into(),
                confirm_password: None,
                ..signup_request()
            },
            SignupRequest {
                confirm_password: Some("different".into()),
                ..signup_request()
            },
        ];
        for case in cases {
            assert!(
                matches!(validate_signup(&case), Err(AppError::BadRequest(_))),
                "expected rejection for {case:?}"
            );
        }
    }

    #[test]
    fn email_validation() {
        assert!(is_valid_email("admin@vdmstore.com"));
        assert!(is_valid_email("  john@example.co.uk "));
        assert!(!is_valid_email("john@"));
        assert!(!is_valid_email("@example.com"));
        assert!(!is_valid_email("john@example"));
        assert!(!is_valid_email("john@@example.com"));
        assert!(!is_valid_email("jo hn@example.com"));
    }

    #[test]
    fn password_hash_verifies_only_the_hashed_password() {
        let hash = hash_password("password").unwrap();
        assert!(verify_password("password", &hash).unwrap());
        assert!(!verify_password("wrong-password", &hash).unwrap());
    }

    #[test]
    fn issued_tokens_decode_with_their_kind() {
        let config = AppConfig::for_tests("postgres://unused");
        let user = user();
        let tokens = issue_tokens(&user, &config).unwrap();

        let access = decode_token(&tokens.access_token, &config.jwt_secret, TokenKind::Access)
            .unwrap();
        assert_eq!(access.sub, user.id.to_string());
        assert_eq!(access.email, "john@example.com");
        assert!(!access.is_admin);

        let refresh =
            decode_token(&tokens.refresh_token, &config.jwt_secret, TokenKind::Refresh).unwrap();
        assert!(refresh.exp > access.exp);
    }

    #[test]
    fn refresh_token_is_not_an_access_token() {
        let config = AppConfig::for_tests("postgres://unused");
        let tokens = issue_tokens(&user(), &config).unwrap();
        let err = decode_token(&tokens.refresh_token, &config.jwt_secret, TokenKind::Access)
            .unwrap_err();
        assert!(matches!(err, AppError::Unauthorized(_)));
    }

    #[test]
    fn token_signed_with_another_secret_is_rejected() {
        let config = AppConfig::for_tests("postgres://unused");
        let tokens = issue_tokens(&user(), &config).unwrap();
        assert!(decode_token(&tokens.access_token, "other-secret", TokenKind::Access).is_err());
    }
}
