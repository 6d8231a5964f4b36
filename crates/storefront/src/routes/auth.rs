//! Authentication route handlers.
//!
//! Email-and-password login and registration backed by the local users
//! table. Form failures redirect back with an error code so the page
//! handler can render a message without putting details in the URL.

use askama::Template;
use askama_web::WebTemplate;
use axum::{
    Form,
    extract::{Query, State},
    response::{IntoResponse, Redirect, Response},
};
use serde::Deserialize;
use tower_sessions::Session;
use tracing::instrument;

use crate::error::{clear_sentry_user, set_sentry_user};
use crate::middleware::{clear_current_user, set_current_user};
use crate::models::session::CurrentUser;
use crate::models::user::User;
use crate::services::auth::{AuthError, AuthService};
use crate::state::AppState;

// =============================================================================
// Form Types
// =============================================================================

/// Login form data.
#[derive(Debug, Deserialize)]
pub struct LoginForm {
    pub email: String,
    pub password: String,
}

/// Registration form data.
#[derive(Debug, Deserialize)]
pub struct RegisterForm {
    pub email: String,
    pub password: String,
    pub password_confirm: String,
}

/// Query parameters for error display.
#[derive(Debug, Deserialize)]
pub struct MessageQuery {
    pub error: Option<String>,
}

/// Map an error code from the redirect query to display text.
fn error_message(code: Option<&str>) -> String {
    match code {
        Some("credentials") => "Invalid email or password".to_owned(),
        Some("email_taken") => "An account with this email already exists".to_owned(),
        Some("password_mismatch") => "Passwords do not match".to_owned(),
        Some("weak_password") => "Password must be at least 8 characters".to_owned(),
        Some("invalid_email") => "Please enter a valid email address".to_owned(),
        Some("session") => "Session error, please try again".to_owned(),
        Some(_) => "Something went wrong, please try again".to_owned(),
        None => String::new(),
    }
}

// =============================================================================
// Templates
// =============================================================================

/// Login page template.
#[derive(Template, WebTemplate)]
#[template(path = "auth/login.html")]
pub struct LoginTemplate {
    pub error: String,
}

/// Register page template.
#[derive(Template, WebTemplate)]
#[template(path = "auth/register.html")]
pub struct RegisterTemplate {
    pub error: String,
}

// =============================================================================
// Handlers
// =============================================================================

/// Display the login page.
pub async fn login_page(Query(query): Query<MessageQuery>) -> impl IntoResponse {
    LoginTemplate {
        error: error_message(query.error.as_deref()),
    }
}

/// Handle login form submission.
#[instrument(skip(state, session, form))]
pub async fn login(
    State(state): State<AppState>,
    session: Session,
    Form(form): Form<LoginForm>,
) -> Response {
    let auth = AuthService::new(state.pool());

    match auth.login(&form.email, &form.password).await {
        Ok(user) => establish_session(&session, &user).await,
        Err(AuthError::InvalidCredentials) => {
            Redirect::to("/auth/login?error=credentials").into_response()
        }
        Err(e) => {
            tracing::error!("Login failed: {e}");
            Redirect::to("/auth/login?error=failed").into_response()
        }
    }
}

/// Display the registration page.
pub async fn register_page(Query(query): Query<MessageQuery>) -> impl IntoResponse {
    RegisterTemplate {
        error: error_message(query.error.as_deref()),
    }
}

/// Handle registration form submission. A successful registration logs
/// the new user straight in.
#[instrument(skip(state, session, form))]
pub async fn register(
    State(state): State<AppState>,
    session: Session,
    Form(form): Form<RegisterForm>,
) -> Response {
    if form.password != form.password_confirm {
        return Redirect::to("/auth/register?error=password_mismatch").into_response();
    }

    let auth = AuthService::new(state.pool());

    match auth.register(&form.email, &form.password).await {
        Ok(user) => establish_session(&session, &user).await,
        Err(AuthError::UserAlreadyExists) => {
            Redirect::to("/auth/register?error=email_taken").into_response()
        }
        Err(AuthError::WeakPassword(_)) => {
            Redirect::to("/auth/register?error=weak_password").into_response()
        }
        Err(AuthError::InvalidEmail(_)) => {
            Redirect::to("/auth/register?error=invalid_email").into_response()
        }
        Err(e) => {
            tracing::error!("Registration failed: {e}");
            Redirect::to("/auth/register?error=failed").into_response()
        }
    }
}

/// Handle logout. Destroys the whole session, cart included.
#[instrument(skip(session))]
pub async fn logout(session: Session) -> Response {
    if let Err(e) = clear_current_user(&session).await {
        tracing::error!("Failed to clear session: {e}");
    }

    if let Err(e) = session.flush().await {
        tracing::error!("Failed to flush session: {e}");
    }

    clear_sentry_user();
    Redirect::to("/").into_response()
}

/// Store the logged-in user in the session and redirect home.
///
/// Rotating the session id on privilege change prevents fixation; the
/// cart survives because rotation only changes the id, not the data.
async fn establish_session(session: &Session, user: &User) -> Response {
    if let Err(e) = session.cycle_id().await {
        tracing::error!("Failed to rotate session id: {e}");
    }

    let current = CurrentUser {
        id: user.id,
        email: user.email.clone(),
        is_staff: user.is_staff,
    };

    if let Err(e) = set_current_user(session, &current).await {
        tracing::error!("Failed to set session: {e}");
        return Redirect::to("/auth/login?error=session").into_response();
    }

    set_sentry_user(&user.id, Some(user.email.as_str()));
    Redirect::to("/").into_response()
}
