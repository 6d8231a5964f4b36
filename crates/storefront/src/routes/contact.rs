//! Contact form route handlers.

use askama::Template;
use askama_web::WebTemplate;
use axum::{
    Form,
    extract::State,
    response::{IntoResponse, Redirect, Response},
};
use serde::Deserialize;
use tower_sessions::Session;
use tracing::instrument;

use greenstem_core::Email;

use crate::db::contact::ContactRepository;
use crate::error::Result;
use crate::models::session::{set_flash, take_flash};
use crate::state::AppState;

/// Longest accepted contact message body.
const MAX_MESSAGE_LENGTH: usize = 4000;

/// Contact form data.
#[derive(Debug, Deserialize)]
pub struct ContactForm {
    pub name: String,
    pub email: String,
    pub message: String,
}

/// Contact page template.
#[derive(Template, WebTemplate)]
#[template(path = "contact.html")]
pub struct ContactTemplate {
    pub message: String,
}

/// Display the contact form.
#[instrument(skip(session))]
pub async fn show(session: Session) -> impl IntoResponse {
    let message = take_flash(&session).await.unwrap_or_default();
    ContactTemplate { message }
}

/// Handle a contact form submission.
#[instrument(skip(state, session, form))]
pub async fn submit(
    State(state): State<AppState>,
    session: Session,
    Form(form): Form<ContactForm>,
) -> Result<Response> {
    let name = form.name.trim();
    let body = form.message.trim();

    if name.is_empty() || body.is_empty() {
        set_flash(&session, "Name and message are required").await;
        return Ok(Redirect::to("/contact").into_response());
    }
    if body.len() > MAX_MESSAGE_LENGTH {
        set_flash(&session, "Message is too long").await;
        return Ok(Redirect::to("/contact").into_response());
    }

    let Ok(email) = Email::parse(&form.email) else {
        set_flash(&session, "Please enter a valid email address").await;
        return Ok(Redirect::to("/contact").into_response());
    };

    let id = ContactRepository::new(state.pool())
        .create(name, email.as_str(), body)
        .await?;

    tracing::info!(message_id = %id, "Stored contact message");

    set_flash(&session, "Thanks! We'll get back to you soon.").await;
    Ok(Redirect::to("/contact").into_response())
}
