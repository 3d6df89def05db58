//! Server-rendered chat page.

use std::sync::LazyLock;

use minijinja::{Environment, context};
use serde::Serialize;

use super::model::ChatbotConfig;
use super::state::{Turn, TurnRole};

const CHAT_TEMPLATE: &str = include_str!("../../templates/chat.html");

static TEMPLATES: LazyLock<Environment<'static>> = LazyLock::new(|| {
    let mut env = Environment::new();
    // Compile-time constant; a syntax error is caught by the tests below.
    env.add_template("chat.html", CHAT_TEMPLATE).unwrap();
    env
});

#[derive(Debug, Serialize)]
struct PageTurn<'a> {
    role: &'static str,
    text: &'a str,
}

/// Render the chat page for `session_id`.
///
/// An empty transcript opens with the configured initial question. `notice`
/// is an extra bot line that is shown but not part of the transcript.
pub fn render_chat_page(
    session_id: &str,
    history: &[Turn],
    config: &ChatbotConfig,
    notice: Option<&str>,
    concluded: bool,
) -> Result<String, minijinja::Error> {
    let mut turns: Vec<PageTurn<'_>> = Vec::with_capacity(history.len() + 2);
    if history.is_empty() {
        turns.push(PageTurn {
            role: "bot",
            text: &config.initial_question,
        });
    }
    turns.extend(history.iter().map(|t| PageTurn {
        role: match t.role {
            TurnRole::User => "user",
            TurnRole::Model => "bot",
        },
        text: &t.text,
    }));
    if let Some(text) = notice {
        turns.push(PageTurn { role: "bot", text });
    }

    let ui = match &config.ui_config {
        serde_json::Value::Object(map) => map.clone(),
        _ => serde_json::Map::new(),
    };
    let title = ui
        .get("title")
        .and_then(|v| v.as_str())
        .unwrap_or("Feedback")
        .to_string();

    TEMPLATES.get_template("chat.html")?.render(context! {
        session_id,
        turns,
        title,
        concluded,
        ui,
    })
}
